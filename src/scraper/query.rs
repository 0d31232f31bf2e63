use chrono::Utc;
use tracing::{info, warn};

use crate::browser::session::{ACTION_TIMEOUT, SETTLE_MEDIUM};
use crate::browser::{BrowserSession, Locator};
use crate::config;
use crate::error::Result;
use crate::parser::ResultsParser;
use crate::report::{QueryResult, ScreenshotArtifact};

const SEARCH_FIELD: Locator = Locator::new(
    "name search field",
    &["input#Form0Name", "div.tabs-content input"],
);

const SEARCH_SUBMIT: Locator = Locator::new("search submit", &["#nameSearchBtn"]);

const NEXT_PAGE: Locator = Locator::new(
    "next page control",
    &[r#"a[aria-label="Next"]"#, "i.fi-chevron-right"],
);

/// Markers that tell us a search round-trip has produced a page we can act
/// on, whether results are present or not.
const RESULT_MARKERS: &[&str] = &["table", ".results-container", ".no-results"];

/// One alphabetic wildcard query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub letter: char,
    pub term: String,
}

/// Enumerate the inclusive letter range as wildcard queries. Inverted or
/// out-of-alphabet bounds produce an empty set, not an error.
pub fn letter_queries(start: char, end: char) -> Vec<SearchQuery> {
    let alphabet = config::alphabet();
    let start = start.to_ascii_lowercase();
    let end = end.to_ascii_lowercase();

    let (Some(start_idx), Some(end_idx)) = (alphabet.find(start), alphabet.find(end)) else {
        return Vec::new();
    };
    if start_idx > end_idx {
        return Vec::new();
    }

    alphabet[start_idx..=end_idx]
        .chars()
        .map(|letter| SearchQuery {
            letter,
            term: format!("{}*", letter),
        })
        .collect()
}

/// Drives one query through the per-query state machine: submit, empty
/// check, page info, then a capped scrape-and-paginate loop.
pub struct PageScraper<'a> {
    session: &'a BrowserSession,
    parser: &'a ResultsParser,
    county: &'a str,
}

impl<'a> PageScraper<'a> {
    pub fn new(session: &'a BrowserSession, parser: &'a ResultsParser, county: &'a str) -> Self {
        Self {
            session,
            parser,
            county,
        }
    }

    pub async fn scrape_query(&self, query: &SearchQuery, max_pages: u32) -> Result<QueryResult> {
        info!("Searching for: {}", query.term);
        let mut result = QueryResult::new(query.letter, query.term.clone());

        self.submit(query).await?;

        let body_text = self.session.body_text().await?;
        let html = self.session.content().await?;
        if self.parser.is_no_results(&html, &body_text) {
            info!("No results for {}", query.term);
            return Ok(result);
        }

        let page_info = ResultsParser::parse_page_info(&body_text);
        result.total_pages = page_info.total;
        let pages_to_scrape = max_pages.min(page_info.total);

        for current_page in 1..=pages_to_scrape {
            info!(
                "Scraping page {} of {} for {}",
                current_page, pages_to_scrape, query.term
            );

            self.capture_page_screenshot(&mut result, current_page).await;

            let html = self.session.content().await?;
            result
                .pages
                .push(self.parser.parse_result_page(&html, current_page));
            result.pages_scraped += 1;

            if current_page < pages_to_scrape {
                // pagination failure keeps everything scraped so far
                if let Err(e) = self.next_page().await {
                    warn!(
                        "Could not advance past page {} for {}: {}",
                        current_page, query.term, e
                    );
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Clear the search field, enter the term, submit, and wait for either a
    /// navigation or a result marker, whichever comes first. Navigation is
    /// not guaranteed on every target layout.
    async fn submit(&self, query: &SearchQuery) -> Result<()> {
        self.session.type_into(&SEARCH_FIELD, &query.term).await?;
        self.session.click(&SEARCH_SUBMIT).await?;
        self.session
            .wait_for_navigation_or_any(RESULT_MARKERS, ACTION_TIMEOUT)
            .await?;
        self.session.wait_for_any(RESULT_MARKERS, ACTION_TIMEOUT).await?;
        Ok(())
    }

    async fn next_page(&self) -> Result<()> {
        self.session.click(&NEXT_PAGE).await?;
        self.session
            .wait_for_navigation_or_any(RESULT_MARKERS, ACTION_TIMEOUT)
            .await?;
        self.session.settle(SETTLE_MEDIUM).await;
        Ok(())
    }

    /// Screenshot capture is an audit aid; a failure is logged, never fatal
    /// to the query.
    async fn capture_page_screenshot(&self, result: &mut QueryResult, page_number: u32) {
        match self.session.screenshot_base64().await {
            Ok(data) => {
                let now = Utc::now();
                result.screenshots.push(ScreenshotArtifact {
                    filename: format!(
                        "{}-{}-p{}-{}.png",
                        self.county,
                        result.letter,
                        page_number,
                        now.timestamp_millis()
                    ),
                    description: format!("results page {}", page_number),
                    letter: Some(result.letter.clone()),
                    page_number: Some(page_number),
                    timestamp: now,
                    data,
                });
            }
            Err(e) => warn!(
                "Screenshot failed for {} page {}: {}",
                result.search_term, page_number, e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_alphabet() {
        let queries = letter_queries('a', 'z');
        assert_eq!(queries.len(), 26);
        assert_eq!(queries[0].term, "a*");
        assert_eq!(queries[25].term, "z*");
    }

    #[test]
    fn test_inclusive_slice() {
        let queries = letter_queries('c', 'f');
        let letters: Vec<char> = queries.iter().map(|q| q.letter).collect();
        assert_eq!(letters, vec!['c', 'd', 'e', 'f']);
    }

    #[test]
    fn test_single_letter_range() {
        let queries = letter_queries('m', 'm');
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].term, "m*");
    }

    #[test]
    fn test_case_insensitive_bounds() {
        assert_eq!(letter_queries('A', 'C'), letter_queries('a', 'c'));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        assert!(letter_queries('f', 'c').is_empty());
    }

    #[test]
    fn test_out_of_alphabet_bounds_are_empty() {
        assert!(letter_queries('3', 'z').is_empty());
        assert!(letter_queries('a', '!').is_empty());
        assert!(letter_queries('ä', 'z').is_empty());
    }

    #[test]
    fn test_query_keys_are_unique() {
        let queries = letter_queries('a', 'z');
        let mut letters: Vec<char> = queries.iter().map(|q| q.letter).collect();
        letters.dedup();
        assert_eq!(letters.len(), 26);
    }
}
