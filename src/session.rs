//! Wallet session
//!
//! Tracks the connected account, the signer and the chain, and publishes
//! every change on a watch channel so bindings can be rebuilt.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::config::{chain_id_hex, AddChainParams, DashboardConfig};
use crate::error::DashboardError;
use crate::gateway::abi;
use crate::rpc::JsonRpcClient;
use crate::units::parse_address;

/// Notification emitted by the wallet provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// Wallet boundary: account access, chain queries and chain switching
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>, DashboardError>;

    async fn chain_id(&self) -> Result<u64, DashboardError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), DashboardError>;

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), DashboardError>;

    /// Account/chain change notifications
    fn subscribe(&self) -> mpsc::Receiver<ProviderEvent>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSession {
    pub connected: Option<Address>,
    /// Account the wallet signs with; fixed at connect time
    pub signer: Option<Address>,
    pub chain_id: Option<u64>,
    pub accepted_chain_ids: BTreeSet<u64>,
}

impl AccountSession {
    pub fn new(accepted_chain_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            accepted_chain_ids: accepted_chain_ids.into_iter().collect(),
            ..Default::default()
        }
    }

    /// `None` while the chain id is unknown
    pub fn is_correct_network(&self) -> Option<bool> {
        self.chain_id
            .map(|id| self.accepted_chain_ids.contains(&id))
    }

    /// Apply a provider notification
    ///
    /// A new account list replaces the connected account but keeps the
    /// signer; an empty list drops both.
    pub fn apply(&mut self, event: &ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(first) => self.connected = Some(*first),
                None => {
                    self.connected = None;
                    self.signer = None;
                }
            },
            ProviderEvent::ChainChanged(id) => self.chain_id = Some(*id),
        }
    }
}

/// Shared wallet session
pub struct WalletSession {
    provider: Option<std::sync::Arc<dyn WalletProvider>>,
    preferred_chain_id: u64,
    add_chain_params: std::collections::BTreeMap<u64, AddChainParams>,
    state: watch::Sender<AccountSession>,
}

impl WalletSession {
    pub fn new(
        provider: Option<std::sync::Arc<dyn WalletProvider>>,
        config: &DashboardConfig,
    ) -> Self {
        let (state, _) = watch::channel(AccountSession::new(
            config.accepted_chain_ids.iter().copied(),
        ));
        Self {
            provider,
            preferred_chain_id: config.preferred_chain_id(),
            add_chain_params: config.chain_params.clone(),
            state,
        }
    }

    pub fn snapshot(&self) -> AccountSession {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AccountSession> {
        self.state.subscribe()
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&std::sync::Arc<dyn WalletProvider>, DashboardError> {
        self.provider.as_ref().ok_or_else(|| {
            DashboardError::NoProvider("no wallet provider configured".to_string())
        })
    }

    /// Ask the wallet for accounts and adopt the first one
    pub async fn connect(&self) -> Result<Address, DashboardError> {
        let provider = self.provider()?;
        let accounts = provider.request_accounts().await?;
        let account = *accounts
            .first()
            .ok_or_else(|| DashboardError::Provider("wallet returned no accounts".to_string()))?;

        let chain_id = match provider.chain_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Could not query chain id after connect: {}", e);
                None
            }
        };

        self.state.send_modify(|session| {
            session.connected = Some(account);
            session.signer = Some(account);
            if chain_id.is_some() {
                session.chain_id = chain_id;
            }
        });
        log::info!("Connected {} (chain {:?})", account, chain_id);
        Ok(account)
    }

    pub fn disconnect(&self) {
        self.state.send_modify(|session| {
            session.connected = None;
            session.signer = None;
        });
        log::info!("Wallet disconnected");
    }

    /// Re-read the chain id from the provider
    pub async fn refresh_chain_id(&self) -> Result<u64, DashboardError> {
        let id = self.provider()?.chain_id().await?;
        self.apply(&ProviderEvent::ChainChanged(id));
        Ok(id)
    }

    /// Switch the wallet to the preferred accepted chain
    ///
    /// If switching fails and add-chain parameters are known for the
    /// target, the chain is added and the switch retried once.
    pub async fn switch_network(&self) -> Result<u64, DashboardError> {
        let provider = self.provider()?;
        let target = self.preferred_chain_id;

        if let Err(switch_error) = provider.switch_chain(target).await {
            let params = match self.add_chain_params.get(&target) {
                Some(params) => params,
                None => return Err(switch_error),
            };
            log::info!(
                "Switch to chain {} failed ({}), adding it first",
                target,
                switch_error
            );
            provider.add_chain(params).await?;
            provider.switch_chain(target).await?;
        }

        self.apply(&ProviderEvent::ChainChanged(target));
        Ok(target)
    }

    /// Apply a provider notification and publish the new session
    pub fn apply(&self, event: &ProviderEvent) {
        self.state.send_if_modified(|session| {
            let before = session.clone();
            session.apply(event);
            *session != before
        });
    }
}

/// Wallet provider backed by a node's JSON-RPC
///
/// Change notifications are produced by polling `eth_accounts` and
/// `eth_chainId`.
pub struct RpcWalletProvider {
    rpc: JsonRpcClient,
    watch_interval: Duration,
}

impl RpcWalletProvider {
    pub fn new(rpc: JsonRpcClient, watch_interval: Duration) -> Self {
        Self {
            rpc,
            watch_interval,
        }
    }

    async fn accounts(rpc: &JsonRpcClient, method: &str) -> Result<Vec<Address>, DashboardError> {
        let raw: Vec<String> = rpc.request(method, json!([])).await?;
        raw.iter().map(|a| parse_address(a)).collect()
    }

    async fn query_chain_id(rpc: &JsonRpcClient) -> Result<u64, DashboardError> {
        let raw: String = rpc.request("eth_chainId", json!([])).await?;
        abi::parse_quantity(&raw)
    }
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, DashboardError> {
        match Self::accounts(&self.rpc, "eth_requestAccounts").await {
            Ok(accounts) => Ok(accounts),
            Err(DashboardError::Provider(reason)) => {
                // Plain nodes expose unlocked accounts without the EIP-1102 call
                log::debug!("eth_requestAccounts unavailable ({}), using eth_accounts", reason);
                Self::accounts(&self.rpc, "eth_accounts").await
            }
            Err(e) => Err(e),
        }
    }

    async fn chain_id(&self) -> Result<u64, DashboardError> {
        Self::query_chain_id(&self.rpc).await
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), DashboardError> {
        let _: serde_json::Value = self
            .rpc
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": chain_id_hex(chain_id) }]),
            )
            .await?;
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), DashboardError> {
        let _: serde_json::Value = self
            .rpc
            .request("wallet_addEthereumChain", json!([params]))
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<ProviderEvent> {
        let (tx, rx) = mpsc::channel(16);
        let rpc = self.rpc.clone();
        let interval = self.watch_interval;

        tokio::spawn(async move {
            let mut last_accounts = Self::accounts(&rpc, "eth_accounts").await.ok();
            let mut last_chain = Self::query_chain_id(&rpc).await.ok();

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                if let Ok(accounts) = Self::accounts(&rpc, "eth_accounts").await {
                    if last_accounts.as_ref() != Some(&accounts) {
                        last_accounts = Some(accounts.clone());
                        if tx.send(ProviderEvent::AccountsChanged(accounts)).await.is_err() {
                            break;
                        }
                    }
                }
                if let Ok(chain) = Self::query_chain_id(&rpc).await {
                    if last_chain != Some(chain) {
                        last_chain = Some(chain);
                        if tx.send(ProviderEvent::ChainChanged(chain)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            log::debug!("Wallet provider watcher stopped");
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::from(bytes)
    }

    #[test]
    fn test_network_correctness() {
        let mut session = AccountSession::new([31337, 1337]);
        assert_eq!(session.is_correct_network(), None);
        session.apply(&ProviderEvent::ChainChanged(1));
        assert_eq!(session.is_correct_network(), Some(false));
        session.apply(&ProviderEvent::ChainChanged(1337));
        assert_eq!(session.is_correct_network(), Some(true));
    }

    #[test]
    fn test_account_change_keeps_signer() {
        let mut session = AccountSession::new([31337]);
        session.connected = Some(addr(1));
        session.signer = Some(addr(1));

        session.apply(&ProviderEvent::AccountsChanged(vec![addr(2), addr(3)]));
        assert_eq!(session.connected, Some(addr(2)));
        assert_eq!(session.signer, Some(addr(1)));

        session.apply(&ProviderEvent::AccountsChanged(Vec::new()));
        assert_eq!(session.connected, None);
        assert_eq!(session.signer, None);
    }

    #[tokio::test]
    async fn test_session_without_provider() {
        let session = WalletSession::new(None, &DashboardConfig::default());
        assert!(!session.has_provider());
        assert!(matches!(
            session.connect().await,
            Err(DashboardError::NoProvider(_))
        ));
    }
}
