//! studio-core: Shared infrastructure for the generative studio client.
pub mod config;
pub mod error;
pub mod observability;
pub mod retry;
pub mod store;

pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
