pub mod results;

pub use results::{PageInfo, ResultsParser};
