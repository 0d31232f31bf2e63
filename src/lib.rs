pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod parser;
pub mod report;
pub mod scraper;

pub use browser::{BrowserSession, Locator};
pub use config::{ScrapeConfig, ServerConfig};
pub use error::{Result, ScrapeError};
pub use report::ExecutionReport;
pub use scraper::ScrapeEngine;
