pub mod errors;
pub mod summary;

pub use errors::ParserError;
pub use summary::{
    parse_ep_summary, ParsedSummary, MISSING_VALUE_SENTINEL, TIMESTAMP_COLUMN,
};
