use super::{AccountStatusSource, CopyTradeApi, ProviderResult, ProvisioningApi, TradingApi};
use crate::error::ProviderError;
use crate::types::{
    AccountInformation, AccountSnapshot, NewAccount, Position, Strategy, Subscriber,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const AUTH_HEADER: &str = "auth-token";

/// Base URLs and credentials for the three provider APIs.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub provisioning_url: String,
    pub copytrade_url: String,
    pub trading_url: String,
    pub token: String,
    pub request_timeout: Duration,
}

/// REST client for the provisioning, copy-trade and trading APIs.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    endpoints: ProviderEndpoints,
}

impl HttpProvider {
    pub fn new(endpoints: ProviderEndpoints) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(endpoints.request_timeout)
            .build()?;
        Ok(Self { client, endpoints })
    }

    /// `{base}/users/current/accounts/{account_id}/{tail..}`
    fn account_url(&self, base: &str, account_id: &str, tail: &[&str]) -> ProviderResult<Url> {
        let mut path = vec!["users", "current", "accounts", id(account_id)?];
        path.extend_from_slice(tail);
        endpoint(base, &path)
    }

    /// `{copytrade}/users/current/configuration/{kind}/{key}/{tail..}`
    fn configuration_url(&self, kind: &str, key: &str, tail: &[&str]) -> ProviderResult<Url> {
        let mut path = vec!["users", "current", "configuration", kind, id(key)?];
        path.extend_from_slice(tail);
        endpoint(&self.endpoints.copytrade_url, &path)
    }

    async fn send(&self, req: RequestBuilder) -> ProviderResult<Response> {
        let resp = req
            .header(AUTH_HEADER, &self.endpoints.token)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), %body, "provider rejected request");
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ProviderResult<T> {
        let text = self.send(req).await?.text().await?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn send_empty(&self, req: RequestBuilder) -> ProviderResult<()> {
        self.send(req).await.map(|_| ())
    }

    async fn find_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ProviderResult<Option<T>> {
        match self.send_json(req).await {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// `base` with `path` appended one percent-encoded segment at a time.
fn endpoint(base: &str, path: &[&str]) -> ProviderResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| ProviderError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(path);
    Ok(url)
}

/// An id that must stay inside its own path segment.
fn id(value: &str) -> ProviderResult<&str> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(&['/', '\\', '?', '#'][..]);
    if bad {
        return Err(ProviderError::InvalidId(value.to_string()));
    }
    Ok(value)
}

#[async_trait]
impl AccountStatusSource for HttpProvider {
    async fn fetch_snapshot(&self, account_id: &str) -> ProviderResult<AccountSnapshot> {
        let url = self.account_url(&self.endpoints.provisioning_url, account_id, &[])?;
        let raw: serde_json::Value = self.send_json(self.client.get(url)).await?;
        AccountSnapshot::from_value(raw)
    }
}

#[async_trait]
impl ProvisioningApi for HttpProvider {
    async fn create_account(&self, account: &NewAccount) -> ProviderResult<String> {
        let url = endpoint(&self.endpoints.provisioning_url, &["users", "current", "accounts"])?;
        let body: serde_json::Value = self
            .send_json(self.client.post(url).json(account))
            .await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(ProviderError::MissingField("id"))
    }

    async fn deploy(&self, account_id: &str) -> ProviderResult<()> {
        let url = self.account_url(&self.endpoints.provisioning_url, account_id, &["deploy"])?;
        self.send_empty(self.client.post(url)).await
    }

    async fn undeploy(&self, account_id: &str) -> ProviderResult<()> {
        let url = self.account_url(&self.endpoints.provisioning_url, account_id, &["undeploy"])?;
        self.send_empty(self.client.post(url)).await
    }

    async fn delete_account(&self, account_id: &str) -> ProviderResult<()> {
        let url = self.account_url(&self.endpoints.provisioning_url, account_id, &[])?;
        self.send_empty(self.client.delete(url)).await
    }
}

#[async_trait]
impl CopyTradeApi for HttpProvider {
    async fn find_subscriber(&self, subscriber_id: &str) -> ProviderResult<Option<Subscriber>> {
        let url = self.configuration_url("subscribers", subscriber_id, &[])?;
        self.find_json(self.client.get(url)).await
    }

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> ProviderResult<()> {
        let url = self.configuration_url("subscribers", &subscriber.id, &[])?;
        let body = serde_json::json!({
            "name": subscriber.name,
            "subscriptions": subscriber.subscriptions,
        });
        self.send_empty(self.client.put(url).json(&body)).await
    }

    async fn remove_subscription(
        &self,
        subscriber_id: &str,
        strategy_id: &str,
    ) -> ProviderResult<()> {
        let tail = ["subscriptions", id(strategy_id)?];
        let url = self.configuration_url("subscribers", subscriber_id, &tail)?;
        self.send_empty(self.client.delete(url)).await
    }

    async fn delete_subscriber(&self, subscriber_id: &str) -> ProviderResult<()> {
        let url = self.configuration_url("subscribers", subscriber_id, &[])?;
        self.send_empty(self.client.delete(url)).await
    }

    async fn find_strategy(&self, strategy_id: &str) -> ProviderResult<Option<Strategy>> {
        let url = self.configuration_url("strategies", strategy_id, &[])?;
        self.find_json(self.client.get(url)).await
    }
}

#[async_trait]
impl TradingApi for HttpProvider {
    async fn account_information(&self, account_id: &str) -> ProviderResult<AccountInformation> {
        let tail = ["account-information"];
        let url = self.account_url(&self.endpoints.trading_url, account_id, &tail)?;
        self.send_json(self.client.get(url)).await
    }

    async fn positions(&self, account_id: &str) -> ProviderResult<Vec<Position>> {
        let url = self.account_url(&self.endpoints.trading_url, account_id, &["positions"])?;
        self.send_json(self.client.get(url)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
