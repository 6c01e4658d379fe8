//! ABI bindings for the usage contract
//!
//! The interface is declared once with `sol!`; encoding and decoding go
//! through `alloy-sol-types`. Hex and quantity helpers for the JSON-RPC
//! wire format live here too.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, Revert, SolCall, SolError, SolEvent};

use crate::error::DashboardError;

sol! {
    interface IBeaglegaze {
        function isDeveloper() external view returns (bool);
        function hasPendingRegistrationRequest(address account) external view returns (bool);
        function getDeveloperBalance() external view returns (uint256);
        function getPendingRegistrations() external view returns (address[]);
        function getClientFunding() external view returns (uint256);
        function hasValidSubscription() external view returns (bool);
        function subscriptionPriceInWei() external view returns (uint256);

        function fund() external payable;
        function purchaseSubscription() external payable;
        function requestPayout() external;
        function requestDeveloperRegistration() external;
        function withdrawBalance() external;
        function voteForDeveloper(address candidate, bool approve) external;

        event Consumed(address indexed client, uint256 newFunding);
    }
}

/// Deployments that emit `Consumed` without indexing `client`
mod unindexed {
    alloy_sol_types::sol! {
        event Consumed(address client, uint256 newFunding);
    }
}

pub use IBeaglegaze::*;

/// Topic hash of the `Consumed` event
pub fn consumed_topic() -> B256 {
    IBeaglegaze::Consumed::SIGNATURE_HASH
}

/// Decode the return data of `C`
pub fn decode_returns<C: SolCall>(data: &[u8]) -> Result<C::Return, DashboardError> {
    C::abi_decode_returns(data, true)
        .map_err(|e| DashboardError::Decode(format!("{} returned malformed data: {}", C::SIGNATURE, e)))
}

/// Decode `Error(string)` revert data
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data, true).ok().map(|revert| revert.reason)
}

/// Decode a `Consumed` log into `(client, new_funding)`
///
/// Handles both an indexed `client` (second topic) and a fully
/// non-indexed payload.
pub fn decode_consumed(topics: &[B256], data: &[u8]) -> Result<(Address, U256), DashboardError> {
    let malformed = |e: alloy_sol_types::Error| DashboardError::Decode(format!("Consumed log: {}", e));
    if topics.len() > 1 {
        let event = IBeaglegaze::Consumed::decode_raw_log(topics.iter().copied(), data, true)
            .map_err(malformed)?;
        Ok((event.client, event.newFunding))
    } else {
        let event = unindexed::Consumed::decode_raw_log(topics.iter().copied(), data, true)
            .map_err(malformed)?;
        Ok((event.client, event.newFunding))
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_hex(raw: &str) -> Result<Vec<u8>, DashboardError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped).map_err(|e| DashboardError::Decode(format!("invalid hex: {}", e)))
}

/// Hex quantity (`0x1a`) to integer
pub fn parse_quantity(raw: &str) -> Result<u64, DashboardError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| DashboardError::Decode(format!("invalid quantity {}: {}", raw, e)))
}

pub fn quantity(value: U256) -> String {
    if value.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", value)
    }
}
