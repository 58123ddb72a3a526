pub mod decode;
pub mod scan;

pub use decode::{open_batch, parse_log_line, DecodeError, ParseError};
pub use scan::{aggregate_batch, merge_batch, RuleAllowList, ScanError};
