pub mod record;

pub use record::{BlockCount, BlockedIp, HttpRequest, WafLog};
