use anyhow::Context;
use clap::Args;
use copylink_core::config::ServiceConfig;
use std::path::{Path, PathBuf};

/// Settings that may come from flags or the environment and win over the
/// config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Provider API token
    #[arg(long, global = true, env = "COPYLINK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Provisioning API base URL
    #[arg(long, global = true, env = "COPYLINK_PROVISIONING_URL")]
    pub provisioning_url: Option<String>,

    /// Copy-trade configuration API base URL
    #[arg(long, global = true, env = "COPYLINK_COPYTRADE_URL")]
    pub copytrade_url: Option<String>,

    /// Trading data API base URL
    #[arg(long, global = true, env = "COPYLINK_TRADING_URL")]
    pub trading_url: Option<String>,

    /// Strategy used when a link request names none
    #[arg(long, global = true, env = "COPYLINK_STRATEGY_ID")]
    pub strategy_id: Option<String>,
}

/// Load the config file (or defaults when none is given) and apply overrides.
pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<ServiceConfig> {
    let mut config = match path {
        Some(p) => ServiceConfig::load(p)
            .with_context(|| format!("failed to load config from {}", p.display()))?,
        None => ServiceConfig::default(),
    };
    apply(&mut config, overrides);
    Ok(config)
}

fn apply(config: &mut ServiceConfig, o: &Overrides) {
    if let Some(v) = &o.token {
        config.provider.token = v.clone();
    }
    if let Some(v) = &o.provisioning_url {
        config.provider.provisioning_url = v.clone();
    }
    if let Some(v) = &o.copytrade_url {
        config.provider.copytrade_url = v.clone();
    }
    if let Some(v) = &o.trading_url {
        config.provider.trading_url = v.clone();
    }
    if let Some(v) = &o.strategy_id {
        config.link.default_strategy_id = Some(v.clone());
    }
}

/// Everything a command needs from the global flags.
pub struct Globals {
    pub config_path: Option<PathBuf>,
    pub overrides: Overrides,
    pub json: bool,
}

impl Globals {
    pub fn config(&self) -> anyhow::Result<ServiceConfig> {
        resolve(self.config_path.as_deref(), &self.overrides)
    }

    /// Resolved config that passed validation.
    pub fn valid_config(&self) -> anyhow::Result<ServiceConfig> {
        let config = self.config()?;
        config.ensure_valid()?;
        Ok(config)
    }
}
