pub mod auth;
pub mod engine;
pub mod filters;
pub mod query;

pub use auth::{AuthOutcome, AuthProbe};
pub use engine::ScrapeEngine;
pub use filters::FilterConfigurator;
pub use query::{letter_queries, PageScraper, SearchQuery};
