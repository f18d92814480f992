//! In-memory adapters for release ports.

mod broker;
mod chart;
mod publisher;
mod source;
mod store;

pub use broker::{DEFAULT_RESULTS_EXPIRE_IN, InMemoryTaskBroker};
pub use chart::InMemoryChartManager;
pub use publisher::{PublishedMessage, RecordingEventPublisher};
pub use source::InMemoryReleaseConfigSource;
pub use store::InMemoryCacheStore;
