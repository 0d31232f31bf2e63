use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::browser::session::{ACTION_TIMEOUT, SETTLE_SHORT};
use crate::browser::{BrowserSession, Locator};
use crate::error::{Result, ScrapeError};

const DATE_INPUT: Locator = Locator::new(
    "date range input",
    &[
        "div.dateSelectorWithRange input",
        ".datepicker-input",
        r#"input[name*="date"]"#,
    ],
);

const NEXT_MONTH: Locator = Locator::new(
    "next month control",
    &[
        ".datepicker .next",
        "a.next",
        r#"button[aria-label="Next Month"]"#,
        ".picker__nav--next",
    ],
);

const DOC_TYPE_FALLBACK: Locator =
    Locator::new("document type fallback", &["label:nth-of-type(79) > span"]);

/// Calendar stepping bound; more than a year of "next month" clicks means
/// the widget is not behaving and we stop rather than loop.
const MAX_MONTH_STEPS: u32 = 12;

#[derive(Debug, Deserialize)]
struct MonthView {
    year: i32,
    month: u32,
}

/// Best-effort search filter configuration. Every sub-step failure is
/// swallowed and logged; later phases do not depend on filters succeeding.
pub struct FilterConfigurator<'a> {
    session: &'a BrowserSession,
    entry_url: &'a str,
}

impl<'a> FilterConfigurator<'a> {
    pub fn new(session: &'a BrowserSession, entry_url: &'a str) -> Self {
        Self { session, entry_url }
    }

    pub async fn configure(&self, county: &str, start_date: Option<&str>, document_type: &str) {
        info!("Configuring search filters");

        if let Err(e) = self.select_county(county).await {
            warn!("County selection failed, continuing: {}", e);
        }
        if let Some(date) = start_date {
            if let Err(e) = self.select_date(date).await {
                warn!("Date selection failed, continuing: {}", e);
            }
        }
        if let Err(e) = self.select_document_type(document_type).await {
            warn!("Document type selection failed, continuing: {}", e);
        }
    }

    /// Try the county link by visible text; fall back to the canonical
    /// county search URL.
    async fn select_county(&self, county: &str) -> Result<()> {
        info!("Selecting county: {}", county);
        let county_literal = serde_json::to_string(county)?;
        let script = format!(
            r#"(() => {{
                const links = Array.from(document.querySelectorAll('a'));
                const target = links.find(a => a.textContent.trim() === {county_literal});
                if (!target) return false;
                target.click();
                return true;
            }})()"#
        );

        let clicked = self
            .session
            .evaluate_value::<bool>(&script)
            .await
            .unwrap_or(false);

        if clicked {
            if self.session.wait_for_navigation(ACTION_TIMEOUT).await.is_err() {
                debug!("No navigation after county link click");
            }
            self.session.settle(SETTLE_SHORT).await;
            return Ok(());
        }

        let url = format!(
            "{}/{}/county-clerk-records/",
            self.entry_url.trim_end_matches('/'),
            county.to_lowercase()
        );
        info!("Could not select county by link text, navigating to {}", url);
        self.session.goto(&url).await
    }

    /// Open the date widget, pick the year by exact text, step months
    /// numerically, then pick the day excluding outside-month cells.
    async fn select_date(&self, date: &str) -> Result<()> {
        let target = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
            ScrapeError::FilterConfiguration(format!("Invalid startDate '{}': {}", date, e))
        })?;
        info!("Setting search date to {}", target);

        self.session.click(&DATE_INPUT).await?;
        self.session.settle(SETTLE_SHORT).await;

        self.select_year(target.year()).await?;
        self.step_to_month(target.year(), target.month()).await?;
        self.select_day(target.day()).await?;

        Ok(())
    }

    async fn select_year(&self, year: i32) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const select = document.querySelector('select.year, select[name*="year" i], .datepicker select');
                if (!select) return false;
                const option = Array.from(select.options).find(o => o.textContent.trim() === '{year}');
                if (!option) return false;
                select.value = option.value;
                select.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#
        );
        let selected = self.session.evaluate_value::<bool>(&script).await?;
        if !selected {
            return Err(ScrapeError::FilterConfiguration(format!(
                "No year option matching '{}'",
                year
            ))
            .into());
        }
        Ok(())
    }

    /// Compare the displayed year/month numerically and click "next month"
    /// until they match, bounded to a year's worth of steps.
    async fn step_to_month(&self, year: i32, month: u32) -> Result<()> {
        for step in 0..=MAX_MONTH_STEPS {
            let displayed = self.displayed_month().await?;
            if (displayed.year, displayed.month) == (year, month) {
                debug!("Reached target month after {} steps", step);
                return Ok(());
            }
            if step == MAX_MONTH_STEPS {
                break;
            }
            self.session.click(&NEXT_MONTH).await?;
            self.session.settle(SETTLE_SHORT).await;
        }
        Err(ScrapeError::FilterConfiguration(format!(
            "Could not reach {}-{:02} within {} month steps",
            year, month, MAX_MONTH_STEPS
        ))
        .into())
    }

    async fn displayed_month(&self) -> Result<MonthView> {
        let script = r#"(() => {
            const header = document.querySelector(
                '.datepicker-header, .datepicker-switch, .picker__month-year, .calendar-header');
            if (!header) return null;
            const parsed = new Date(header.textContent.trim() + ' 1');
            if (isNaN(parsed)) return null;
            return { year: parsed.getFullYear(), month: parsed.getMonth() + 1 };
        })()"#;

        let view: Option<MonthView> = self.session.evaluate_value(script).await?;
        view.ok_or_else(|| {
            ScrapeError::FilterConfiguration("Could not read calendar header".to_string()).into()
        })
    }

    async fn select_day(&self, day: u32) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const cells = Array.from(document.querySelectorAll('td.day, .datepicker td, .picker__day'));
                const target = cells.find(c =>
                    c.textContent.trim() === '{day}' &&
                    !/outside|old|new|disabled/.test(c.className));
                if (!target) return false;
                target.click();
                return true;
            }})()"#
        );
        let clicked = self.session.evaluate_value::<bool>(&script).await?;
        if !clicked {
            return Err(ScrapeError::FilterConfiguration(format!(
                "No selectable day cell for '{}'",
                day
            ))
            .into());
        }
        Ok(())
    }

    /// Match a checkbox label by case-sensitive substring of its visible
    /// text; fall back to the known positional selector.
    async fn select_document_type(&self, document_type: &str) -> Result<()> {
        info!("Selecting document type: {}", document_type);
        let type_literal = serde_json::to_string(document_type)?;
        let script = format!(
            r#"(() => {{
                const labels = Array.from(document.querySelectorAll('label'));
                const target = labels.find(l => l.textContent.includes({type_literal}));
                if (!target) return false;
                const input = target.querySelector('input') ||
                    (target.htmlFor ? document.getElementById(target.htmlFor) : null);
                (input || target).click();
                return true;
            }})()"#
        );

        let clicked = self
            .session
            .evaluate_value::<bool>(&script)
            .await
            .unwrap_or(false);
        if clicked {
            return Ok(());
        }

        debug!("Falling back to positional document type selector");
        self.session.click(&DOC_TYPE_FALLBACK).await
    }
}
