use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Deployment stage of a provider account.
///
/// Serialized as the provider's SCREAMING_SNAKE_CASE string. Values the
/// provider adds later are kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    Created,
    Deploying,
    Deployed,
    DeployFailed,
    Undeploying,
    Undeployed,
    UndeployFailed,
    Deleting,
    Draft,
    Unknown(String),
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Deploying => "DEPLOYING",
            LifecycleState::Deployed => "DEPLOYED",
            LifecycleState::DeployFailed => "DEPLOY_FAILED",
            LifecycleState::Undeploying => "UNDEPLOYING",
            LifecycleState::Undeployed => "UNDEPLOYED",
            LifecycleState::UndeployFailed => "UNDEPLOY_FAILED",
            LifecycleState::Deleting => "DELETING",
            LifecycleState::Draft => "DRAFT",
            LifecycleState::Unknown(s) => s,
        }
    }
}

impl From<String> for LifecycleState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CREATED" => LifecycleState::Created,
            "DEPLOYING" => LifecycleState::Deploying,
            "DEPLOYED" => LifecycleState::Deployed,
            "DEPLOY_FAILED" => LifecycleState::DeployFailed,
            "UNDEPLOYING" => LifecycleState::Undeploying,
            "UNDEPLOYED" => LifecycleState::Undeployed,
            "UNDEPLOY_FAILED" => LifecycleState::UndeployFailed,
            "DELETING" => LifecycleState::Deleting,
            "DRAFT" => LifecycleState::Draft,
            _ => LifecycleState::Unknown(s),
        }
    }
}

impl From<LifecycleState> for String {
    fn from(s: LifecycleState) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ConnectionStatus
// ---------------------------------------------------------------------------

/// State of the live link between a deployed account and its trading server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    DisconnectedFromBroker,
    Unknown(String),
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::DisconnectedFromBroker => "DISCONNECTED_FROM_BROKER",
            ConnectionStatus::Unknown(s) => s,
        }
    }
}

impl From<String> for ConnectionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CONNECTED" => ConnectionStatus::Connected,
            "DISCONNECTED" => ConnectionStatus::Disconnected,
            "DISCONNECTED_FROM_BROKER" => ConnectionStatus::DisconnectedFromBroker,
            _ => ConnectionStatus::Unknown(s),
        }
    }
}

impl From<ConnectionStatus> for String {
    fn from(s: ConnectionStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AccountSnapshot
// ---------------------------------------------------------------------------

/// Lifecycle/connection pair taken from a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub lifecycle_state: LifecycleState,
    pub connection_status: ConnectionStatus,
}

/// One read of an account from the provisioning API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSnapshot {
    pub id: String,
    pub lifecycle_state: LifecycleState,
    pub connection_status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub raw: Value,
}

impl AccountSnapshot {
    /// Parse a provider account document, keeping the whole document in `raw`.
    ///
    /// The id is read from `_id` or `id`. A missing `connectionStatus` is read
    /// as `DISCONNECTED`; a missing `state` is an error.
    pub fn from_value(raw: Value) -> Result<Self, ProviderError> {
        let id = raw
            .get("_id")
            .or_else(|| raw.get("id"))
            .and_then(Value::as_str)
            .ok_or(ProviderError::MissingField("_id"))?
            .to_string();
        let lifecycle_state = raw
            .get("state")
            .and_then(Value::as_str)
            .map(|s| LifecycleState::from(s.to_string()))
            .ok_or(ProviderError::MissingField("state"))?;
        let connection_status = raw
            .get("connectionStatus")
            .and_then(Value::as_str)
            .map(|s| ConnectionStatus::from(s.to_string()))
            .unwrap_or(ConnectionStatus::Disconnected);
        let error_code = raw
            .get("errorCode")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            id,
            lifecycle_state,
            connection_status,
            error_code,
            raw,
        })
    }

    pub fn observed(&self) -> ObservedState {
        ObservedState {
            lifecycle_state: self.lifecycle_state.clone(),
            connection_status: self.connection_status.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Account creation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mt4,
    Mt5,
}

impl std::str::FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mt4" => Ok(Platform::Mt4),
            "mt5" => Ok(Platform::Mt5),
            _ => Err(format!("unknown platform '{s}': must be mt4 or mt5")),
        }
    }
}

/// Body of a create-account call against the provisioning API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub name: String,
    pub login: String,
    pub password: String,
    pub server: String,
    pub platform: Platform,
    #[serde(rename = "type")]
    pub account_type: String,
    pub magic: u64,
    pub application: String,
    pub copy_factory_roles: Vec<String>,
}

impl NewAccount {
    /// An account registered as a copy-trading subscriber.
    pub fn subscriber(
        name: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        server: impl Into<String>,
        platform: Platform,
        account_type: impl Into<String>,
        magic: u64,
    ) -> Self {
        Self {
            name: name.into(),
            login: login.into(),
            password: password.into(),
            server: server.into(),
            platform,
            account_type: account_type.into(),
            magic,
            application: "CopyFactory".to_string(),
            copy_factory_roles: vec!["SUBSCRIBER".to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// Copy-trading configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub strategy_id: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

/// Copy-trading subscriber. Its id is the trading account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl Subscriber {
    /// Add `sub`, replacing any existing entry for the same strategy.
    pub fn merge_subscription(&mut self, sub: Subscription) {
        match self
            .subscriptions
            .iter_mut()
            .find(|s| s.strategy_id == sub.strategy_id)
        {
            Some(existing) => *existing = sub,
            None => self.subscriptions.push(sub),
        }
    }

    /// Drop the subscription to `strategy_id`. Returns true if one was removed.
    pub fn remove_subscription(&mut self, strategy_id: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.strategy_id != strategy_id);
        self.subscriptions.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Trading data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInformation {
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub margin: f64,
    #[serde(default)]
    pub free_margin: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub leverage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub position_type: String,
    pub volume: f64,
    #[serde(default)]
    pub open_price: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
