//! Schema-driven HTML table parser.
//!
//! A [`TableSchema`] says where the table is, how to find its rows and
//! cells, and how many cells a row needs. [`parse_rows`] walks the rows and
//! hands each row's cells to a caller-supplied mapper; a row that is too
//! short or that the mapper rejects is skipped on its own, so one bad row
//! never aborts the table.
//!
//! [`CellExtractor`] covers the per-column extraction rules the portal
//! needs: plain text, the cell's own text, an attribute of a nested
//! element, digit-only text, and the text of a labelled sub-block.

use scraper::{ElementRef, Html, Selector};

/// A CSS selector that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CSS selector '{selector}': {message}")]
pub struct SelectorError {
    /// The selector text.
    pub selector: String,
    /// Parser message.
    pub message: String,
}

/// Parses a CSS selector string.
///
/// # Errors
///
/// Returns [`SelectorError`] if `selector` is not valid CSS.
pub fn parse_selector(selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        selector: selector.to_owned(),
        message: e.to_string(),
    })
}

/// Where a table lives and how its rows are shaped.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: Selector,
    rows: Selector,
    /// `None` means "direct element children of the row".
    cells: Option<Selector>,
    min_columns: usize,
    /// Locates the table inside a cached fragment, where the page-level
    /// selector no longer matches.
    fragment_table: Selector,
}

impl TableSchema {
    /// Creates a schema with `tbody > tr` rows whose cells are the row's
    /// direct children.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if `table_selector` is not valid CSS.
    pub fn new(table_selector: &str, min_columns: usize) -> Result<Self, SelectorError> {
        Ok(Self {
            table: parse_selector(table_selector)?,
            rows: parse_selector("tbody > tr")?,
            cells: None,
            min_columns,
            fragment_table: parse_selector("table")?,
        })
    }

    /// Selects cells with `selector` (searching descendants) instead of
    /// taking the row's direct children.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if `selector` is not valid CSS.
    pub fn with_cell_selector(mut self, selector: &str) -> Result<Self, SelectorError> {
        self.cells = Some(parse_selector(selector)?);
        Ok(self)
    }

    /// First element in `document` matching the table selector.
    #[must_use]
    pub fn find_table<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document.select(&self.table).next()
    }

    /// The table in a fragment previously stored with [`table_markup`].
    #[must_use]
    pub fn find_cached_table<'a>(&self, fragment: &'a Html) -> Option<ElementRef<'a>> {
        fragment.select(&self.fragment_table).next()
    }

    /// Body rows of `table`, in document order.
    pub fn rows<'a>(&'a self, table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        table.select(&self.rows)
    }

    /// Cells of `row`, per the cell rule.
    #[must_use]
    pub fn cells<'a>(&self, row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.cells.as_ref().map_or_else(
            || row.children().filter_map(ElementRef::wrap).collect(),
            |sel| row.select(sel).collect(),
        )
    }
}

/// Maps every row of `table` through `map_row`.
///
/// Rows with fewer cells than the schema's minimum are skipped
/// before `map_row` sees them; rows for which `map_row` returns `None` are
/// skipped after. Zero valid rows yields an empty `Vec`.
pub fn parse_rows<'a, R>(
    table: ElementRef<'a>,
    schema: &'a TableSchema,
    mut map_row: impl FnMut(&[ElementRef<'a>]) -> Option<R>,
) -> Vec<R> {
    let mut out = Vec::new();
    let mut skipped = 0_usize;

    for row in schema.rows(table) {
        let cells = schema.cells(row);
        if cells.len() < schema.min_columns {
            skipped += 1;
            continue;
        }
        match map_row(&cells) {
            Some(record) => out.push(record),
            None => {
                log::debug!("Skipping row: {}", element_text(row));
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::debug!("Parsed {} rows, skipped {skipped}", out.len());
    }

    out
}

/// Locates the table in `document` and maps its rows. Returns `None` when
/// no table matches the schema.
pub fn parse_document<'a, R>(
    document: &'a Html,
    schema: &'a TableSchema,
    map_row: impl FnMut(&[ElementRef<'a>]) -> Option<R>,
) -> Option<Vec<R>> {
    let table = schema.find_table(document)?;
    Some(parse_rows(table, schema, map_row))
}

/// Outer HTML of `table`, suitable for caching and for re-parsing with
/// [`Html::parse_fragment`] and [`TableSchema::find_cached_table`].
#[must_use]
pub fn table_markup(table: ElementRef<'_>) -> String {
    table.html()
}

/// How to turn a cell into a string.
#[derive(Debug, Clone)]
pub enum CellExtractor {
    /// All descendant text, whitespace-normalized.
    Text,
    /// Text nodes directly under the cell, ignoring nested elements.
    OwnText,
    /// Attribute of the first descendant matching `selector`.
    Attribute { selector: Selector, attribute: String },
    /// Only the ASCII digits of the cell text.
    Digits,
    /// Text of the first `block` whose `label` child reads `label_text`
    /// (case-insensitive), with the label itself removed. Falls back to the
    /// full cell text when no block carries the label.
    Labeled {
        block: Selector,
        label: Selector,
        label_text: String,
    },
}

impl CellExtractor {
    /// Builds an [`Self::Attribute`] extractor.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if `selector` is not valid CSS.
    pub fn attribute(selector: &str, attribute: &str) -> Result<Self, SelectorError> {
        Ok(Self::Attribute {
            selector: parse_selector(selector)?,
            attribute: attribute.to_owned(),
        })
    }

    /// Builds a [`Self::Labeled`] extractor.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if either selector is not valid CSS.
    pub fn labeled(block: &str, label: &str, label_text: &str) -> Result<Self, SelectorError> {
        Ok(Self::Labeled {
            block: parse_selector(block)?,
            label: parse_selector(label)?,
            label_text: label_text.to_owned(),
        })
    }

    /// Extracts the cell value. Missing attributes yield an empty string.
    #[must_use]
    pub fn extract(&self, cell: ElementRef<'_>) -> String {
        match self {
            Self::Text => element_text(cell),
            Self::OwnText => own_text(cell),
            Self::Attribute {
                selector,
                attribute,
            } => cell
                .select(selector)
                .next()
                .and_then(|el| el.value().attr(attribute))
                .map(str::trim)
                .unwrap_or_default()
                .to_owned(),
            Self::Digits => digits(&element_text(cell)),
            Self::Labeled {
                block,
                label,
                label_text,
            } => cell
                .select(block)
                .find(|b| {
                    b.select(label)
                        .next()
                        .is_some_and(|l| element_text(l).eq_ignore_ascii_case(label_text))
                })
                .map_or_else(
                    || element_text(cell),
                    |b| strip_label(&element_text(b), label_text),
                ),
        }
    }
}

/// All descendant text of `element`, whitespace-normalized.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_ws(&element.text().collect::<Vec<_>>().join(""))
}

/// Text nodes that are direct children of `element`, whitespace-normalized.
#[must_use]
pub fn own_text(element: ElementRef<'_>) -> String {
    let parts: Vec<&str> = element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect();
    normalize_ws(&parts.join(""))
}

/// Collapses runs of whitespace (including non-breaking spaces) to a single
/// space and trims the ends.
#[must_use]
pub fn normalize_ws(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keeps only ASCII digits.
#[must_use]
pub fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Whether `element` has `class` (ASCII case-insensitive).
#[must_use]
pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element
        .value()
        .classes()
        .any(|c| c.eq_ignore_ascii_case(class))
}

/// Case-insensitive substring test.
#[must_use]
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Removes every ASCII-case-insensitive occurrence of `label` from `text`,
/// then trims whitespace and a leading `:` separator.
fn strip_label(text: &str, label: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        let hit = rest.get(..label.len()).is_some_and(|head| head.eq_ignore_ascii_case(label));
        if hit && !label.is_empty() {
            rest = &rest[label.len()..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out.trim()
        .trim_start_matches(':')
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
        <table>
          <thead><tr><th>Data</th><th>Código</th><th>Tipo</th></tr></thead>
          <tbody>
            <tr><td>10/03 (seg)</td><td>MAT101 <a href="/provas/materia/1">ver</a></td><td>Prova</td></tr>
            <tr><td>only one</td></tr>
            <tr><td></td><td>FIS</td><td>Prova</td></tr>
            <tr><td>12/03</td><td>QUI202</td><td>Rec</td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn skips_short_and_rejected_rows_independently() {
        let doc = Html::parse_document(TABLE);
        let schema = TableSchema::new("table", 3).unwrap();
        let rows = parse_document(&doc, &schema, |cells| {
            let date = CellExtractor::Text.extract(cells[0]);
            if date.is_empty() {
                return None;
            }
            Some((date, CellExtractor::OwnText.extract(cells[1])))
        })
        .unwrap();

        assert_eq!(
            rows,
            vec![
                ("10/03 (seg)".to_string(), "MAT101".to_string()),
                ("12/03".to_string(), "QUI202".to_string()),
            ]
        );
    }

    #[test]
    fn missing_table_is_none_and_empty_table_is_empty() {
        let schema = TableSchema::new("table.grades", 1).unwrap();
        let doc = Html::parse_document("<p>nothing</p>");
        assert!(parse_document(&doc, &schema, |_| Some(())).is_none());

        let doc = Html::parse_document("<table class='grades'><tbody></tbody></table>");
        assert_eq!(parse_document(&doc, &schema, |_| Some(())), Some(vec![]));
    }

    #[test]
    fn cached_markup_reparses_without_page_selector() {
        let page = Html::parse_document(
            "<div id='wrap'><table class='x'><tbody><tr><td>a</td><td>b</td></tr></tbody></table></div>",
        );
        let schema = TableSchema::new("#wrap > table.x", 2).unwrap();
        let markup = table_markup(schema.find_table(&page).unwrap());

        let fragment = Html::parse_fragment(&markup);
        assert!(schema.find_table(&fragment).is_none());
        let table = schema.find_cached_table(&fragment).unwrap();
        let rows = parse_rows(table, &schema, |cells| Some(CellExtractor::Text.extract(cells[1])));
        assert_eq!(rows, vec!["b".to_string()]);
    }

    #[test]
    fn extracts_attribute_and_digits() {
        let doc = Html::parse_document(
            r#"<table><tbody><tr><td><a href=" /x/1 ">A</a></td><td>2º conjunto</td></tr></tbody></table>"#,
        );
        let schema = TableSchema::new("table", 2).unwrap();
        let link = CellExtractor::attribute("a", "href").unwrap();
        let rows = parse_document(&doc, &schema, |cells| {
            Some((link.extract(cells[0]), CellExtractor::Digits.extract(cells[1])))
        })
        .unwrap();
        assert_eq!(rows, vec![("/x/1".to_string(), "2".to_string())]);
    }

    #[test]
    fn labeled_block_prefers_label_and_falls_back_to_cell_text() {
        let extractor =
            CellExtractor::labeled("div.d-flex.flex-column", "span.font-weight-bold", "Nota")
                .unwrap();
        let doc = Html::parse_document(
            r#"<table><tbody><tr>
                <td>
                  <div class="d-flex flex-column"><span class="font-weight-bold">Peso</span> 2</div>
                  <div class="d-flex flex-column"><span class="font-weight-bold">NOTA</span>: 8.5</div>
                </td>
                <td>  7,0 </td>
            </tr></tbody></table>"#,
        );
        let schema = TableSchema::new("table", 2).unwrap();
        let rows = parse_document(&doc, &schema, |cells| {
            Some((extractor.extract(cells[0]), extractor.extract(cells[1])))
        })
        .unwrap();
        assert_eq!(rows, vec![("8.5".to_string(), "7,0".to_string())]);
    }

    #[test]
    fn cell_selector_searches_descendants() {
        let doc = Html::parse_document(
            "<table><tbody><tr><th>07:15</th><td>A</td><td>B</td></tr></tbody></table>",
        );
        let schema = TableSchema::new("table", 3)
            .unwrap()
            .with_cell_selector("td, th")
            .unwrap();
        let rows = parse_document(&doc, &schema, |cells| Some(cells.len())).unwrap();
        assert_eq!(rows, vec![3]);
    }

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_ws("  a \n\t b\u{a0}c  "), "a b c");
        assert_eq!(digits("3º conjunto"), "3");
        assert!(contains_ci("Nenhuma PROVA a ser mostrada", "prova a ser"));
    }

    #[test]
    fn strip_label_handles_case_and_separator() {
        assert_eq!(strip_label("Nota: 8.5", "nota"), "8.5");
        assert_eq!(strip_label("8.5 NOTA", "Nota"), "8.5");
        assert_eq!(strip_label("Média", "Nota"), "Média");
    }
}
