use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The raw column values of one result row, before provenance is attached.
/// Rows with fewer than three cells never make it this far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFields {
    pub doc_number: String,
    pub doc_type: String,
    pub date: String,
    pub book: String,
    pub page: String,
    pub number_of_pages: String,
    pub grantor: String,
    pub grantee: String,
}

/// A fully annotated record as it appears in the flat report sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(flatten)]
    pub fields: RecordFields,
    pub search_letter: String,
    pub county: String,
    pub page_number: u32,
}

/// One scraped result page worth of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecords {
    pub page_number: u32,
    pub record_count: u32,
    pub records: Vec<RecordFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotArtifact {
    pub filename: String,
    pub description: String,
    #[serde(default)]
    pub letter: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
    /// Base64-encoded PNG payload.
    pub data: String,
}

/// Accumulated output of one query. Created when the query starts, mutated
/// only while that query is being processed, then frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub letter: String,
    pub search_term: String,
    pub total_pages: u32,
    pub pages_scraped: u32,
    pub pages: Vec<PageRecords>,
    pub screenshots: Vec<ScreenshotArtifact>,
}

impl QueryResult {
    pub fn new(letter: char, search_term: impl Into<String>) -> Self {
        Self {
            letter: letter.to_uppercase().to_string(),
            search_term: search_term.into(),
            total_pages: 0,
            pages_scraped: 0,
            pages: Vec::new(),
            screenshots: Vec::new(),
        }
    }

    pub fn record_count(&self) -> u32 {
        self.pages.iter().map(|p| p.record_count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportErrorKind {
    Fatal,
    Authentication,
    QueryProcessing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportError {
    #[serde(rename = "type")]
    pub kind: ReportErrorKind,
    /// Set for query-scoped errors, absent for execution-level ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter: Option<String>,
    pub message: String,
}

impl ReportError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ReportErrorKind::Fatal,
            letter: None,
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self {
            kind: ReportErrorKind::Authentication,
            letter: None,
            message: message.into(),
        }
    }

    /// The query key is recorded as iterated (lowercase), matching the
    /// letters callers configure the range with.
    pub fn query(letter: char, message: impl Into<String>) -> Self {
        Self {
            kind: ReportErrorKind::QueryProcessing,
            letter: Some(letter.to_ascii_lowercase().to_string()),
            message: message.into(),
        }
    }
}

/// The structure returned to the caller. Created once per execution, filled
/// in by each phase, sealed on completion or fatal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub login_performed: bool,
    pub was_already_logged_in: bool,
    pub needs_manual_login: bool,
    /// Reserved hook, never set by current logic.
    pub captcha_encountered: bool,
    pub total_pages: u32,
    pub pages_scraped: u32,
    pub total_records: u32,
    pub letter_searches: Vec<QueryResult>,
    pub flat_records: Vec<Record>,
    pub screenshots: Vec<ScreenshotArtifact>,
    pub errors: Vec<ReportError>,
}

impl ExecutionReport {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            login_performed: false,
            was_already_logged_in: false,
            needs_manual_login: false,
            captcha_encountered: false,
            total_pages: 0,
            pages_scraped: 0,
            total_records: 0,
            letter_searches: Vec::new(),
            flat_records: Vec::new(),
            screenshots: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Fold the completed query results into the report totals.
    pub fn absorb(&mut self, county: &str, results: Vec<QueryResult>) {
        let aggregates = aggregate(county, &results);
        self.total_pages = aggregates.total_pages;
        self.pages_scraped = aggregates.pages_scraped;
        self.total_records = aggregates.total_records;
        self.flat_records = aggregates.flat_records;
        self.screenshots.extend(aggregates.screenshots);
        self.letter_searches = results;
    }

    pub fn has_fatal_error(&self) -> bool {
        self.errors.iter().any(|e| e.kind == ReportErrorKind::Fatal)
    }
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub total_pages: u32,
    pub pages_scraped: u32,
    pub total_records: u32,
    pub flat_records: Vec<Record>,
    pub screenshots: Vec<ScreenshotArtifact>,
}

/// Pure merge of per-query outputs into global totals and one flat record
/// sequence. Ordering is query iteration order, then page order within a
/// query, then row order within a page. No side effects; identical inputs
/// always produce identical output.
pub fn aggregate(county: &str, results: &[QueryResult]) -> Aggregates {
    let mut flat_records = Vec::new();
    let mut screenshots = Vec::new();
    let mut total_pages = 0u32;
    let mut pages_scraped = 0u32;

    for query in results {
        total_pages += query.total_pages;
        pages_scraped += query.pages_scraped;

        for page in &query.pages {
            for fields in &page.records {
                flat_records.push(Record {
                    fields: fields.clone(),
                    search_letter: query.letter.clone(),
                    county: county.to_string(),
                    page_number: page.page_number,
                });
            }
        }
        screenshots.extend(query.screenshots.iter().cloned());
    }

    let total_records = flat_records.len() as u32;

    Aggregates {
        total_pages,
        pages_scraped,
        total_records,
        flat_records,
        screenshots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(doc_number: &str) -> RecordFields {
        RecordFields {
            doc_number: doc_number.to_string(),
            doc_type: "Deed of Trust".to_string(),
            date: "01/15/2024".to_string(),
            ..Default::default()
        }
    }

    fn page(page_number: u32, count: u32) -> PageRecords {
        PageRecords {
            page_number,
            record_count: count,
            records: (0..count).map(|i| fields(&format!("doc-{}-{}", page_number, i))).collect(),
        }
    }

    fn query_with_pages(letter: char, total_pages: u32, pages: Vec<PageRecords>) -> QueryResult {
        let mut q = QueryResult::new(letter, format!("{}*", letter));
        q.total_pages = total_pages;
        q.pages_scraped = pages.len() as u32;
        q.pages = pages;
        q
    }

    #[test]
    fn test_aggregate_totals_match_page_sums() {
        let results = vec![
            query_with_pages('a', 5, vec![page(1, 10), page(2, 7)]),
            query_with_pages('b', 1, vec![page(1, 3)]),
        ];

        let agg = aggregate("Travis", &results);

        assert_eq!(agg.total_pages, 6);
        assert_eq!(agg.pages_scraped, 3);
        assert_eq!(agg.total_records, 20);
        assert_eq!(agg.flat_records.len(), 20);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let results = vec![
            query_with_pages('a', 2, vec![page(1, 4), page(2, 2)]),
            query_with_pages('c', 3, vec![page(1, 1)]),
        ];

        let first = aggregate("Harris", &results);
        let second = aggregate("Harris", &results);

        assert_eq!(first, second);
    }

    #[test]
    fn test_aggregate_preserves_ordering_and_provenance() {
        let results = vec![
            query_with_pages('b', 1, vec![page(1, 2)]),
            query_with_pages('a', 2, vec![page(1, 1), page(2, 1)]),
        ];

        let agg = aggregate("Travis", &results);

        // query iteration order, not alphabetical
        assert_eq!(agg.flat_records[0].search_letter, "B");
        assert_eq!(agg.flat_records[1].search_letter, "B");
        assert_eq!(agg.flat_records[2].search_letter, "A");
        assert_eq!(agg.flat_records[2].page_number, 1);
        assert_eq!(agg.flat_records[3].page_number, 2);
        assert!(agg.flat_records.iter().all(|r| r.county == "Travis"));
    }

    #[test]
    fn test_aggregate_empty_input() {
        let agg = aggregate("Travis", &[]);
        assert_eq!(agg.total_records, 0);
        assert_eq!(agg.total_pages, 0);
        assert!(agg.flat_records.is_empty());
    }

    #[test]
    fn test_capped_query_and_empty_query_scenario() {
        // a* has two available pages but was capped to one; b* had no results
        let results = vec![
            query_with_pages('a', 2, vec![page(1, 10)]),
            query_with_pages('b', 0, vec![]),
        ];

        let agg = aggregate("Travis", &results);

        assert_eq!(agg.pages_scraped, 1);
        assert_eq!(agg.total_records, 10);
        assert_eq!(results[1].record_count(), 0);
        assert_eq!(results[1].total_pages, 0);
    }

    #[test]
    fn test_query_failure_isolation_in_report() {
        let mut report = ExecutionReport::new();
        let results: Vec<QueryResult> = ['a', 'b', 'n']
            .iter()
            .map(|&l| query_with_pages(l, 1, vec![page(1, 2)]))
            .collect();

        report.errors.push(ReportError::query('m', "submit timed out"));
        report.absorb("Travis", results);

        assert_eq!(report.total_records, 6);
        assert_eq!(report.letter_searches.len(), 3);
        let query_errors: Vec<_> = report
            .errors
            .iter()
            .filter(|e| e.kind == ReportErrorKind::QueryProcessing)
            .collect();
        assert_eq!(query_errors.len(), 1);
        assert_eq!(query_errors[0].letter.as_deref(), Some("m"));
        assert!(!report.has_fatal_error());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = ExecutionReport::new();
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("executionId").is_some());
        assert!(json.get("flatRecords").is_some());
        assert!(json.get("captchaEncountered").is_some());
        assert!(json.get("wasAlreadyLoggedIn").is_some());
    }

    #[test]
    fn test_error_entry_shape() {
        let err = ReportError::query('A', "boom");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "query_processing");
        assert_eq!(json["letter"], "a");

        let fatal = ReportError::fatal("connect failed");
        let json = serde_json::to_value(&fatal).unwrap();
        assert_eq!(json["type"], "fatal");
        assert!(json.get("letter").is_none());
    }
}
