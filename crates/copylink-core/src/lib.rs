pub mod config;
pub mod error;
pub mod link;
pub mod poller;
pub mod provider;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{ConfigError, LinkError, ProviderError, Result};
pub use poller::{wait_until, wait_until_connected, Outcome, PollPolicy, WaitCondition};
