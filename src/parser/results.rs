use scraper::{Html, Selector};
use tracing::debug;

use crate::error::ScrapeError;
use crate::report::{PageRecords, RecordFields};

/// Rows with fewer cells than this cannot form a record and are skipped.
const MIN_RECORD_CELLS: usize = 3;

/// Phrasings the target site has used for an empty result set.
const NO_RESULT_PHRASES: &[&str] = &[
    "no results",
    "no records found",
    "no matching records",
    "your search returned no",
];

/// Parses result pages pulled off the remote session. All extraction happens
/// on an HTML snapshot, so none of this needs a live browser.
pub struct ResultsParser {
    row_selector: Selector,
    cell_selector: Selector,
    no_results_selector: Selector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub current: u32,
    pub total: u32,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self { current: 1, total: 1 }
    }
}

impl ResultsParser {
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            row_selector: Selector::parse("table tbody tr")
                .map_err(|e| ScrapeError::Parse(format!("Invalid row selector: {}", e)))?,
            cell_selector: Selector::parse("td")
                .map_err(|e| ScrapeError::Parse(format!("Invalid cell selector: {}", e)))?,
            no_results_selector: Selector::parse(".no-results")
                .map_err(|e| ScrapeError::Parse(format!("Invalid no-results selector: {}", e)))?,
        })
    }

    /// Extract every qualifying table row of a result page into record
    /// fields. Short rows are skipped, not errored.
    pub fn parse_result_page(&self, html: &str, page_number: u32) -> PageRecords {
        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for row in document.select(&self.row_selector) {
            let cells: Vec<String> = row
                .select(&self.cell_selector)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect();

            if cells.len() < MIN_RECORD_CELLS {
                debug!("Skipping row with {} cells on page {}", cells.len(), page_number);
                continue;
            }

            let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
            records.push(RecordFields {
                doc_number: cell(0),
                doc_type: cell(1),
                date: cell(2),
                book: cell(3),
                page: cell(4),
                number_of_pages: cell(5),
                grantor: cell(6),
                grantee: cell(7),
            });
        }

        debug!("Parsed {} records from page {}", records.len(), page_number);
        PageRecords {
            page_number,
            record_count: records.len() as u32,
            records,
        }
    }

    /// Detect an empty result set, tolerating the marker element as well as
    /// several textual phrasings.
    pub fn is_no_results(&self, html: &str, body_text: &str) -> bool {
        let document = Html::parse_document(html);
        if document.select(&self.no_results_selector).next().is_some() {
            return true;
        }
        let lowered = body_text.to_lowercase();
        NO_RESULT_PHRASES.iter().any(|phrase| lowered.contains(phrase))
    }

    /// Parse free text matching "Page <int> of <int>" (case-insensitive).
    /// Anything unparsable defaults to page 1 of 1.
    pub fn parse_page_info(text: &str) -> PageInfo {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        for window in tokens.windows(4) {
            if window[0].eq_ignore_ascii_case("page") && window[2].eq_ignore_ascii_case("of") {
                let current = strip_to_number(window[1]);
                let total = strip_to_number(window[3]);
                if let (Some(current), Some(total)) = (current, total) {
                    return PageInfo { current, total };
                }
            }
        }
        PageInfo::default()
    }
}

fn strip_to_number(token: &str) -> Option<u32> {
    token.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOCK_RESULTS_HTML: &str = r#"
    <html><body>
    <div class="results-container">
      <span>Page 1 of 4</span>
      <table>
        <thead><tr><th>Doc #</th><th>Type</th><th>Date</th></tr></thead>
        <tbody>
          <tr>
            <td>2024-001234</td><td>Deed of Trust</td><td>01/15/2024</td>
            <td>1042</td><td>17</td><td>8</td>
            <td>SMITH JOHN</td><td>FIRST NATIONAL BANK</td>
          </tr>
          <tr>
            <td>2024-001235</td><td>Deed of Trust</td><td>01/16/2024</td>
          </tr>
          <tr>
            <td colspan="8">advertisement</td>
          </tr>
        </tbody>
      </table>
    </div>
    </body></html>
    "#;

    const MOCK_NO_RESULTS_HTML: &str = r#"
    <html><body><div class="no-results">Your search returned no documents.</div></body></html>
    "#;

    #[test]
    fn test_parser_creation() {
        assert!(ResultsParser::new().is_ok());
    }

    #[test]
    fn test_parse_full_and_short_rows() {
        let parser = ResultsParser::new().unwrap();
        let page = parser.parse_result_page(MOCK_RESULTS_HTML, 1);

        assert_eq!(page.page_number, 1);
        assert_eq!(page.record_count, 3);

        let first = &page.records[0];
        assert_eq!(first.doc_number, "2024-001234");
        assert_eq!(first.doc_type, "Deed of Trust");
        assert_eq!(first.date, "01/15/2024");
        assert_eq!(first.book, "1042");
        assert_eq!(first.number_of_pages, "8");
        assert_eq!(first.grantor, "SMITH JOHN");
        assert_eq!(first.grantee, "FIRST NATIONAL BANK");

        // three cells is enough to form a record; missing columns stay empty
        let second = &page.records[1];
        assert_eq!(second.doc_number, "2024-001235");
        assert_eq!(second.grantor, "");
    }

    #[test]
    fn test_rows_below_cell_threshold_are_skipped() {
        let parser = ResultsParser::new().unwrap();
        let html = r#"
        <table><tbody>
          <tr><td>only</td><td>two</td></tr>
          <tr><td>a</td></tr>
        </tbody></table>
        "#;
        let page = parser.parse_result_page(html, 1);
        assert_eq!(page.record_count, 0);
    }

    #[test]
    fn test_empty_html() {
        let parser = ResultsParser::new().unwrap();
        let page = parser.parse_result_page("", 1);
        assert_eq!(page.record_count, 0);
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_no_results_detection() {
        let parser = ResultsParser::new().unwrap();

        assert!(parser.is_no_results(MOCK_NO_RESULTS_HTML, "Your search returned no documents."));
        assert!(parser.is_no_results("<html></html>", "Sorry, no records found for B*"));
        assert!(parser.is_no_results("<html></html>", "NO RESULTS"));
        assert!(!parser.is_no_results(MOCK_RESULTS_HTML, "Page 1 of 4"));
    }

    #[test]
    fn test_parse_page_info() {
        assert_eq!(
            ResultsParser::parse_page_info("Showing Page 2 of 17 results"),
            PageInfo { current: 2, total: 17 }
        );
        assert_eq!(
            ResultsParser::parse_page_info("PAGE 1 OF 3"),
            PageInfo { current: 1, total: 3 }
        );
        // punctuation around the numbers is tolerated
        assert_eq!(
            ResultsParser::parse_page_info("(Page 4 of 12)"),
            PageInfo { current: 4, total: 12 }
        );
    }

    #[test]
    fn test_unparsable_page_info_defaults_to_one_of_one() {
        assert_eq!(ResultsParser::parse_page_info(""), PageInfo::default());
        assert_eq!(ResultsParser::parse_page_info("no pagination here"), PageInfo::default());
        assert_eq!(
            ResultsParser::parse_page_info("Page x of y"),
            PageInfo { current: 1, total: 1 }
        );
    }
}
