pub mod batch_fetcher;
pub mod queue_poller;

pub use batch_fetcher::{BatchFetcher, FetchError, S3BatchFetcher};
pub use queue_poller::{QueueError, QueuePoller};
