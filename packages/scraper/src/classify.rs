//! Session and empty-state classification of fetched documents.
//!
//! A successful HTTP response is not necessarily a useful one: the portal
//! answers "no records" with an informational banner, and an expired
//! session yields a page without the expected markup. [`Classifier`]
//! separates those cases so callers can tell "confirmed empty" apart from
//! "could not read the page".

use scraper::{ElementRef, Html, Selector};

use crate::table::{SelectorError, contains_ci, element_text, parse_selector};

/// Outcome of classifying a document.
#[derive(Debug, Clone, Copy)]
pub enum Classification<'a> {
    /// The expected data table is present.
    HasTable(ElementRef<'a>),
    /// The portal explicitly reported that there is nothing to show.
    ExplicitlyEmpty(ElementRef<'a>),
    /// Neither the banner nor the table was found.
    Unparseable,
}

impl Classification<'_> {
    /// Banner text for [`Self::ExplicitlyEmpty`].
    #[must_use]
    pub fn empty_message(&self) -> Option<String> {
        match self {
            Self::ExplicitlyEmpty(banner) => Some(element_text(*banner)),
            _ => None,
        }
    }
}

/// Rule recognizing the "no records" banner.
#[derive(Debug, Clone)]
pub struct BannerRule {
    selector: Selector,
    /// Phrases that must appear in the banner (case-insensitive, any of).
    /// An empty list accepts any banner matching the selector.
    phrases: Vec<String>,
}

impl BannerRule {
    /// Creates a rule.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if `selector` is not valid CSS.
    pub fn new(selector: &str, phrases: Vec<String>) -> Result<Self, SelectorError> {
        Ok(Self {
            selector: parse_selector(selector)?,
            phrases,
        })
    }

    /// First banner in `document` that satisfies the rule.
    #[must_use]
    pub fn find<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document.select(&self.selector).find(|banner| self.accepts(*banner))
    }

    fn accepts(&self, banner: ElementRef<'_>) -> bool {
        if self.phrases.is_empty() {
            return true;
        }
        let text = element_text(banner);
        self.phrases.iter().any(|phrase| contains_ci(&text, phrase))
    }
}

/// Classifies documents for one dataset.
#[derive(Debug, Clone)]
pub struct Classifier {
    banner: Option<BannerRule>,
    table: Selector,
}

impl Classifier {
    /// Creates a classifier that looks for `table_selector`, checking
    /// `banner` first when given.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if `table_selector` is not valid CSS.
    pub fn new(table_selector: &str, banner: Option<BannerRule>) -> Result<Self, SelectorError> {
        Ok(Self {
            banner,
            table: parse_selector(table_selector)?,
        })
    }

    /// Classifies `document`. The banner check runs before the table
    /// check, so a page carrying both is [`Classification::ExplicitlyEmpty`].
    #[must_use]
    pub fn classify<'a>(&self, document: &'a Html) -> Classification<'a> {
        if let Some(banner) = self.banner.as_ref().and_then(|rule| rule.find(document)) {
            return Classification::ExplicitlyEmpty(banner);
        }
        if let Some(table) = document.select(&self.table).next() {
            return Classification::HasTable(table);
        }
        Classification::Unparseable
    }
}

/// Checks whether a landing page belongs to an authenticated session by
/// looking for a single anchor element.
#[derive(Debug, Clone)]
pub struct SessionCheck {
    anchor: Selector,
}

impl SessionCheck {
    /// Creates a check for `anchor_selector`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if `anchor_selector` is not valid CSS.
    pub fn new(anchor_selector: &str) -> Result<Self, SelectorError> {
        Ok(Self {
            anchor: parse_selector(anchor_selector)?,
        })
    }

    #[must_use]
    pub fn is_valid_session(&self, document: &Html) -> bool {
        document.select(&self.anchor).next().is_some()
    }
}
