//! Remote contract gateway
//!
//! - `ContractGateway`: typed reads, two-phase writes and the `Consumed`
//!   event stream for one contract binding
//! - `GatewayFactory`: builds a gateway for each new binding
//! - `abi`: call encoding and return decoding
//! - `rpc`: JSON-RPC backed implementation

pub mod abi;
mod rpc;

pub use rpc::{GatewayOptions, RpcGateway, RpcGatewayFactory};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::DashboardError;
use crate::writes::WriteCall;

/// Contract address plus the signer calls are issued as
///
/// A new binding is built whenever either side changes; it is never
/// mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractBinding {
    pub address: Address,
    pub signer: Address,
}

/// `Consumed(address client, uint256 newFunding)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedEvent {
    pub client: Address,
    pub new_funding: U256,
    pub block_number: Option<u64>,
}

/// Handle to a submitted, not yet confirmed, transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub hash: B256,
    pub block_number: Option<u64>,
}

/// Outcome of calling an optional contract function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    Supported(T),
    /// The contract does not implement the function
    Absent,
    /// The function exists (or might) but the call failed
    Failed(String),
}

impl<T: Default> Capability<T> {
    /// Degrade absence and failure to the empty value
    pub fn or_empty(self) -> T {
        match self {
            Capability::Supported(value) => value,
            Capability::Absent => T::default(),
            Capability::Failed(reason) => {
                log::warn!("Optional contract call failed: {}", reason);
                T::default()
            }
        }
    }
}

/// Typed access to the usage contract under one binding
#[async_trait]
pub trait ContractGateway: Send + Sync {
    fn binding(&self) -> ContractBinding;

    async fn is_developer(&self) -> Result<bool, DashboardError>;

    async fn has_pending_registration_request(
        &self,
        who: Address,
    ) -> Result<bool, DashboardError>;

    async fn developer_balance(&self) -> Result<U256, DashboardError>;

    /// Optional capability: not every deployment lists pending candidates
    async fn pending_registrations(&self) -> Capability<Vec<Address>>;

    async fn client_funding(&self) -> Result<U256, DashboardError>;

    async fn has_valid_subscription(&self) -> Result<bool, DashboardError>;

    async fn subscription_price(&self) -> Result<U256, DashboardError>;

    /// First write phase: hand the call to the wallet
    async fn submit(&self, call: &WriteCall) -> Result<PendingTx, DashboardError>;

    /// Second write phase: wait until the transaction is mined
    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<Receipt, DashboardError>;

    /// Start delivering `Consumed` events
    ///
    /// Dropping the receiver ends the subscription.
    fn subscribe_consumed(&self) -> mpsc::Receiver<ConsumedEvent>;
}

pub trait GatewayFactory: Send + Sync {
    fn bind(&self, binding: ContractBinding) -> Arc<dyn ContractGateway>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_or_empty() {
        let listed = Capability::Supported(vec![Address::ZERO]);
        assert_eq!(listed.or_empty().len(), 1);
        assert!(Capability::<Vec<Address>>::Absent.or_empty().is_empty());
        assert!(Capability::<Vec<Address>>::Failed("boom".into())
            .or_empty()
            .is_empty());
    }
}
