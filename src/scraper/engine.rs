use chrono::Utc;
use tracing::{error, info};

use crate::browser::BrowserSession;
use crate::config::ScrapeConfig;
use crate::error::{Result, ScrapeError};
use crate::parser::ResultsParser;
use crate::report::{ExecutionReport, ReportError, ScreenshotArtifact};
use crate::scraper::auth::{AuthOutcome, AuthProbe};
use crate::scraper::filters::FilterConfigurator;
use crate::scraper::query::{letter_queries, PageScraper};

/// Sequential workflow controller for one scrape execution. Owns the remote
/// session end-to-end: the session is acquired at the start of `run` and
/// released on every exit path, including fatal ones.
pub struct ScrapeEngine {
    entry_url: String,
}

impl ScrapeEngine {
    pub fn new(entry_url: impl Into<String>) -> Self {
        Self {
            entry_url: entry_url.into(),
        }
    }

    /// Execute the full pipeline and return the sealed report. Never panics
    /// and never loses partial data; only a connector-level failure leaves
    /// the report with a fatal entry.
    pub async fn run(&self, connect_url: &str, config: &ScrapeConfig) -> ExecutionReport {
        let mut report = ExecutionReport::new();
        info!(execution_id = %report.execution_id, county = %config.county, "Starting scrape execution");

        let session = match BrowserSession::connect(connect_url).await {
            Ok(session) => session,
            Err(e) => {
                error!("Connection failed: {}", e);
                report.errors.push(ReportError::fatal(format!("Connection failed: {}", e)));
                return report;
            }
        };

        if let Err(e) = self.drive(&session, config, &mut report).await {
            error!("Fatal error during execution: {}", e);
            // best-effort diagnostic screenshot before the session goes away
            if let Ok(data) = session.screenshot_base64().await {
                report.screenshots.push(diagnostic_screenshot(&config.county, "fatal-error", data));
            }
            report.errors.push(ReportError::fatal(e.to_string()));
        }

        session.close().await;

        info!(
            execution_id = %report.execution_id,
            total_records = report.total_records,
            pages_scraped = report.pages_scraped,
            errors = report.errors.len(),
            "Execution complete"
        );
        report
    }

    async fn drive(
        &self,
        session: &BrowserSession,
        config: &ScrapeConfig,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        info!("Navigating to {}", self.entry_url);
        session
            .goto(&self.entry_url)
            .await
            .map_err(|e| ScrapeError::Connection(format!("Failed to reach entry point: {}", e)))?;

        let outcome = AuthProbe::probe(session, config.credentials.as_ref()).await;
        if !apply_auth_outcome(outcome, report) {
            info!("Manual login required, stopping before query phase");
            return Ok(());
        }

        // filters are advisory; sub-step failures are logged inside and
        // never abort the run
        FilterConfigurator::new(session, &self.entry_url)
            .configure(&config.county, config.start_date.as_deref(), &config.document_type)
            .await;

        let parser = ResultsParser::new()?;
        let scraper = PageScraper::new(session, &parser, &config.county);
        let queries = letter_queries(config.start_letter_char(), config.end_letter_char());
        info!(
            "Will search {} queries: {}",
            queries.len(),
            queries.iter().map(|q| q.term.as_str()).collect::<Vec<_>>().join(", ")
        );

        let mut results = Vec::with_capacity(queries.len());
        for query in &queries {
            match scraper.scrape_query(query, config.max_pages_per_query).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    // a single query's failure never aborts the batch
                    let err = ScrapeError::QueryProcessing(e.to_string());
                    error!("Query {} failed: {}", query.term, err);
                    report.errors.push(ReportError::query(query.letter, err.to_string()));
                    if let Ok(data) = session.screenshot_base64().await {
                        report.screenshots.push(diagnostic_screenshot(
                            &config.county,
                            &format!("query-{}-error", query.letter),
                            data,
                        ));
                    }
                }
            }
        }

        report.absorb(&config.county, results);
        Ok(())
    }
}

/// Fold the authentication outcome into the report. Returns `false` when the
/// run must stop for out-of-band operator login — a normal termination, not
/// an error.
fn apply_auth_outcome(outcome: AuthOutcome, report: &mut ExecutionReport) -> bool {
    match outcome {
        AuthOutcome::AlreadyLoggedIn => {
            report.was_already_logged_in = true;
            true
        }
        AuthOutcome::LoggedIn => {
            report.login_performed = true;
            true
        }
        AuthOutcome::NeedsManualLogin => {
            report.needs_manual_login = true;
            false
        }
        AuthOutcome::LoginFailed(err) => {
            report.errors.push(ReportError::authentication(err.to_string()));
            true
        }
    }
}

fn diagnostic_screenshot(county: &str, description: &str, data: String) -> ScreenshotArtifact {
    let now = Utc::now();
    ScreenshotArtifact {
        filename: format!("{}-{}-{}.png", county, description, now.timestamp_millis()),
        description: description.to_string(),
        letter: None,
        page_number: None,
        timestamp: now,
        data,
    }
}
