use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use tracing::debug;

use crate::error::{Result, ScrapeError};

/// An ordered list of alternative CSS selectors for one logical element.
/// Candidates are tried in order and the first match wins, which keeps the
/// orchestration code tolerant of markup drift across site revisions.
#[derive(Debug, Clone)]
pub struct Locator {
    name: &'static str,
    candidates: &'static [&'static str],
}

impl Locator {
    pub const fn new(name: &'static str, candidates: &'static [&'static str]) -> Self {
        Self { name, candidates }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolve against the page, trying each candidate in order.
    pub async fn resolve(&self, page: &Page) -> Result<Element> {
        for selector in self.candidates {
            match page.find_element(*selector).await {
                Ok(element) => {
                    debug!("Locator '{}' matched candidate '{}'", self.name, selector);
                    return Ok(element);
                }
                Err(_) => continue,
            }
        }
        Err(ScrapeError::Browser(format!(
            "Locator '{}' matched none of {} candidates",
            self.name,
            self.candidates.len()
        ))
        .into())
    }

    /// Like `resolve` but absence is an expected outcome, not an error.
    pub async fn try_resolve(&self, page: &Page) -> Option<Element> {
        for selector in self.candidates {
            if let Ok(element) = page.find_element(*selector).await {
                debug!("Locator '{}' matched candidate '{}'", self.name, selector);
                return Some(element);
            }
        }
        None
    }
}
