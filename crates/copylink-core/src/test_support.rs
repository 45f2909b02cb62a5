//! In-memory provider for tests.
//!
//! Accounts follow scripted state sequences: `deploy` and `undeploy` load the
//! configured script, and each snapshot fetch advances it by one step (the
//! last step repeats). Every call is recorded so tests can assert on order.

use crate::error::ProviderError;
use crate::provider::{
    AccountStatusSource, CopyTradeApi, ProviderResult, Providers, ProvisioningApi, TradingApi,
};
use crate::types::{
    AccountInformation, AccountSnapshot, NewAccount, Position, Strategy, Subscriber,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub enum FakeState {
    /// `(state, connectionStatus)`
    At(&'static str, &'static str),
    /// `(state, errorCode)` with a disconnected connection.
    Errored(&'static str, &'static str),
    /// Snapshot fetch fails with a 503.
    Unavailable,
}

impl FakeState {
    pub fn connected() -> Self {
        FakeState::At("DEPLOYED", "CONNECTED")
    }

    pub fn deploying() -> Self {
        FakeState::At("DEPLOYING", "DISCONNECTED")
    }

    pub fn undeployed() -> Self {
        FakeState::At("UNDEPLOYED", "DISCONNECTED")
    }
}

#[derive(Debug)]
struct FakeAccount {
    script: VecDeque<FakeState>,
    current: FakeState,
    positions: Vec<Position>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u32,
    accounts: HashMap<String, FakeAccount>,
    deploy_script: Vec<FakeState>,
    undeploy_script: Vec<FakeState>,
    subscribers: HashMap<String, Subscriber>,
    strategies: HashMap<String, Strategy>,
    created: Vec<NewAccount>,
    calls: Vec<String>,
    fail_upsert: bool,
}

#[derive(Debug, Default)]
pub struct FakeProvider {
    inner: Mutex<Inner>,
}

fn not_found(what: &str) -> ProviderError {
    ProviderError::Status {
        status: 404,
        body: format!("{what} not found"),
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.lock().deploy_script = vec![FakeState::connected()];
        fake.lock().undeploy_script = vec![FakeState::undeployed()];
        fake
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_strategy(self, id: &str) -> Self {
        self.lock().strategies.insert(
            id.to_string(),
            Strategy {
                id: id.to_string(),
                name: format!("strategy {id}"),
                account_id: None,
            },
        );
        self
    }

    /// States an account walks through after `deploy`.
    pub fn on_deploy(self, script: Vec<FakeState>) -> Self {
        self.lock().deploy_script = script;
        self
    }

    /// States an account walks through after `undeploy`.
    pub fn on_undeploy(self, script: Vec<FakeState>) -> Self {
        self.lock().undeploy_script = script;
        self
    }

    pub fn failing_upsert(self) -> Self {
        self.lock().fail_upsert = true;
        self
    }

    pub fn insert_account(&self, id: &str, current: FakeState) {
        self.lock().accounts.insert(
            id.to_string(),
            FakeAccount {
                script: VecDeque::new(),
                current,
                positions: Vec::new(),
            },
        );
    }

    /// An existing account that walks through `script` on later fetches,
    /// without waiting for a `deploy` or `undeploy` to load it.
    pub fn insert_account_scripted(&self, id: &str, current: FakeState, script: Vec<FakeState>) {
        self.insert_account(id, current);
        if let Some(acc) = self.lock().accounts.get_mut(id) {
            acc.script = script.into();
        }
    }

    pub fn insert_position(&self, account_id: &str, position: Position) {
        if let Some(acc) = self.lock().accounts.get_mut(account_id) {
            acc.positions.push(position);
        }
    }

    pub fn insert_subscriber(&self, subscriber: Subscriber) {
        self.lock()
            .subscribers
            .insert(subscriber.id.clone(), subscriber);
    }

    pub fn subscriber(&self, id: &str) -> Option<Subscriber> {
        self.lock().subscribers.get(id).cloned()
    }

    pub fn has_account(&self, id: &str) -> bool {
        self.lock().accounts.contains_key(id)
    }

    pub fn created(&self) -> Vec<NewAccount> {
        self.lock().created.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn providers(self: Arc<Self>) -> Providers {
        Providers {
            provisioning: self.clone(),
            copytrade: self.clone(),
            trading: self,
        }
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

fn render(id: &str, state: &FakeState) -> ProviderResult<AccountSnapshot> {
    let raw = match state {
        FakeState::At(state, conn) => json!({
            "_id": id, "state": state, "connectionStatus": conn,
        }),
        FakeState::Errored(state, code) => json!({
            "_id": id, "state": state, "connectionStatus": "DISCONNECTED", "errorCode": code,
        }),
        FakeState::Unavailable => {
            return Err(ProviderError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            })
        }
    };
    AccountSnapshot::from_value(raw)
}

#[async_trait]
impl AccountStatusSource for FakeProvider {
    async fn fetch_snapshot(&self, account_id: &str) -> ProviderResult<AccountSnapshot> {
        let mut inner = self.lock();
        inner.calls.push(format!("get {account_id}"));
        let acc = inner
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| not_found("account"))?;
        if let Some(next) = acc.script.pop_front() {
            acc.current = next;
        }
        render(account_id, &acc.current)
    }
}

#[async_trait]
impl ProvisioningApi for FakeProvider {
    async fn create_account(&self, account: &NewAccount) -> ProviderResult<String> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("acc-{}", inner.next_id);
        inner.calls.push(format!("create {id}"));
        inner.created.push(account.clone());
        inner.accounts.insert(
            id.clone(),
            FakeAccount {
                script: VecDeque::new(),
                current: FakeState::At("CREATED", "DISCONNECTED"),
                positions: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn deploy(&self, account_id: &str) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("deploy {account_id}"));
        let script = inner.deploy_script.clone();
        let acc = inner
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| not_found("account"))?;
        acc.script = script.into();
        Ok(())
    }

    async fn undeploy(&self, account_id: &str) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("undeploy {account_id}"));
        let script = inner.undeploy_script.clone();
        let acc = inner
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| not_found("account"))?;
        acc.script = script.into();
        Ok(())
    }

    async fn delete_account(&self, account_id: &str) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("delete {account_id}"));
        inner
            .accounts
            .remove(account_id)
            .map(|_| ())
            .ok_or_else(|| not_found("account"))
    }
}

#[async_trait]
impl CopyTradeApi for FakeProvider {
    async fn find_subscriber(&self, subscriber_id: &str) -> ProviderResult<Option<Subscriber>> {
        self.record(format!("get-subscriber {subscriber_id}"));
        Ok(self.subscriber(subscriber_id))
    }

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("put-subscriber {}", subscriber.id));
        if inner.fail_upsert {
            return Err(ProviderError::Status {
                status: 500,
                body: "upsert rejected".to_string(),
            });
        }
        inner
            .subscribers
            .insert(subscriber.id.clone(), subscriber.clone());
        Ok(())
    }

    async fn remove_subscription(
        &self,
        subscriber_id: &str,
        strategy_id: &str,
    ) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner
            .calls
            .push(format!("remove-subscription {subscriber_id} {strategy_id}"));
        let sub = inner
            .subscribers
            .get_mut(subscriber_id)
            .ok_or_else(|| not_found("subscriber"))?;
        sub.remove_subscription(strategy_id);
        Ok(())
    }

    async fn delete_subscriber(&self, subscriber_id: &str) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("delete-subscriber {subscriber_id}"));
        inner
            .subscribers
            .remove(subscriber_id)
            .map(|_| ())
            .ok_or_else(|| not_found("subscriber"))
    }

    async fn find_strategy(&self, strategy_id: &str) -> ProviderResult<Option<Strategy>> {
        self.record(format!("get-strategy {strategy_id}"));
        Ok(self.lock().strategies.get(strategy_id).cloned())
    }
}

#[async_trait]
impl TradingApi for FakeProvider {
    async fn account_information(&self, account_id: &str) -> ProviderResult<AccountInformation> {
        if !self.has_account(account_id) {
            return Err(not_found("account"));
        }
        Ok(AccountInformation {
            balance: 10_000.0,
            equity: 10_250.5,
            margin: 120.0,
            free_margin: 10_130.5,
            currency: Some("USD".to_string()),
            leverage: Some(100.0),
        })
    }

    async fn positions(&self, account_id: &str) -> ProviderResult<Vec<Position>> {
        self.lock()
            .accounts
            .get(account_id)
            .map(|a| a.positions.clone())
            .ok_or_else(|| not_found("account"))
    }
}
