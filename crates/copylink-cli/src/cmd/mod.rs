pub mod config;
pub mod serve;
pub mod status;
pub mod wait;

use copylink_core::config::ServiceConfig;
use copylink_core::provider::{HttpProvider, Providers};

pub(crate) fn http_providers(config: &ServiceConfig) -> anyhow::Result<Providers> {
    Ok(Providers::http(HttpProvider::new(config.endpoints())?))
}
