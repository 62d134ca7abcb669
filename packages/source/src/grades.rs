//! Grades table schema.
//!
//! The header row names a group in every column from
//! `first_group_column` on. Each body row holds a subject code and one cell
//! per group; a cell may wrap the grade in a block labelled "Nota".

use std::collections::BTreeMap;

use campus_portal_models::GradeRecord;
use campus_portal_scraper::classify::{Classification, Classifier};
use campus_portal_scraper::table::{
    CellExtractor, TableSchema, digits, element_text, parse_rows, parse_selector,
};
use scraper::{ElementRef, Html, Selector};

use crate::ConfigError;
use crate::config::GradesConfig;

/// Parses the grades page.
#[derive(Debug, Clone)]
pub struct GradeSchema {
    classifier: Classifier,
    table: TableSchema,
    header: Selector,
    code_column: usize,
    first_group_column: usize,
    value: CellExtractor,
    ungraded_placeholder: String,
}

impl GradeSchema {
    /// Compiles the grades selectors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Selector`] if a selector is not valid CSS.
    pub fn from_config(config: &GradesConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            classifier: Classifier::new(&config.table_selector, None)?,
            table: TableSchema::new(&config.table_selector, config.code_column + 1)?,
            header: parse_selector(&config.header_selector)?,
            code_column: config.code_column,
            first_group_column: config.first_group_column,
            value: CellExtractor::labeled(
                &config.grade_block_selector,
                &config.grade_label_selector,
                &config.grade_label,
            )?,
            ungraded_placeholder: config.ungraded_placeholder.clone(),
        })
    }

    #[must_use]
    pub fn classify<'a>(&self, document: &'a Html) -> Classification<'a> {
        self.classifier.classify(document)
    }

    /// Whether `value` is the portal's "not graded yet" placeholder.
    #[must_use]
    pub fn is_ungraded(&self, value: &str) -> bool {
        value.trim() == self.ungraded_placeholder
    }

    /// One record per non-blank graded cell, in row then column order.
    /// Placeholder values are kept; reconciliation drops them.
    #[must_use]
    pub fn parse_table(&self, table: ElementRef<'_>) -> Vec<GradeRecord> {
        let groups = self.group_columns(table);
        if groups.is_empty() {
            log::warn!("Grades table has no group columns");
            return vec![];
        }

        parse_rows(table, &self.table, |cells| {
            let code = CellExtractor::Text.extract(cells[self.code_column]);
            if code.is_empty() {
                return None;
            }
            let records: Vec<GradeRecord> = groups
                .iter()
                .filter_map(|(&column, &group)| {
                    let value = self.value.extract(*cells.get(column)?);
                    (!value.is_empty()).then(|| GradeRecord {
                        code: code.clone(),
                        group,
                        value,
                    })
                })
                .collect();
            Some(records)
        })
        .into_iter()
        .flatten()
        .collect()
    }

    /// Maps column index to group number, from header cells whose text
    /// contains digits.
    fn group_columns(&self, table: ElementRef<'_>) -> BTreeMap<usize, u32> {
        table
            .select(&self.header)
            .enumerate()
            .filter(|(index, _)| *index >= self.first_group_column)
            .filter_map(|(index, th)| {
                digits(&element_text(th))
                    .parse()
                    .ok()
                    .map(|group| (index, group))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalConfig;

    fn schema() -> GradeSchema {
        GradeSchema::from_config(&PortalConfig::embedded().unwrap().grades).unwrap()
    }

    const PAGE: &str = r#"
        <table>
          <thead><tr><th>Matéria</th><th>Código</th><th>1º conj.</th><th>2º conj.</th><th>Média</th></tr></thead>
          <tbody>
            <tr>
              <td>Matemática</td><td>MAT101</td>
              <td>--</td>
              <td>
                <div class="d-flex flex-column"><span class="font-weight-bold">Peso</span>2</div>
                <div class="d-flex flex-column"><span class="font-weight-bold">Nota</span>: 8.5</div>
              </td>
              <td></td>
            </tr>
            <tr><td>Física</td><td></td><td>7,0</td><td>6,0</td><td></td></tr>
            <tr><td>Química</td><td>QUI202</td><td> 9,5 </td></tr>
          </tbody>
        </table>"#;

    fn parse(html: &str) -> Vec<GradeRecord> {
        let doc = Html::parse_document(html);
        let schema = schema();
        let Classification::HasTable(table) = schema.classify(&doc) else {
            panic!("expected a table");
        };
        schema.parse_table(table)
    }

    #[test]
    fn extracts_labeled_grade_and_keeps_placeholder() {
        let grades = parse(PAGE);
        assert_eq!(
            grades,
            vec![
                GradeRecord {
                    code: "MAT101".to_string(),
                    group: 1,
                    value: "--".to_string(),
                },
                GradeRecord {
                    code: "MAT101".to_string(),
                    group: 2,
                    value: "8.5".to_string(),
                },
                GradeRecord {
                    code: "QUI202".to_string(),
                    group: 1,
                    value: "9,5".to_string(),
                },
            ]
        );
    }

    #[test]
    fn placeholder_detection() {
        let schema = schema();
        assert!(schema.is_ungraded("--"));
        assert!(schema.is_ungraded(" -- "));
        assert!(!schema.is_ungraded("8.5"));
    }

    #[test]
    fn missing_table_is_unparseable() {
        let doc = Html::parse_document("<form id='login'></form>");
        assert!(matches!(
            schema().classify(&doc),
            Classification::Unparseable
        ));
    }

    #[test]
    fn headerless_table_yields_nothing() {
        assert!(parse("<table><tbody><tr><td>x</td><td>MAT</td><td>8</td></tr></tbody></table>")
            .is_empty());
    }
}
