pub mod store;

pub use store::{QueueRecord, QueueStore, RECORD_VERSION};
