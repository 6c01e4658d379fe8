//! Client configuration from environment variables
//!
//! Controls the default contract, polling cadence, accepted chains and the
//! RPC endpoints the wallet provider talks to. Invalid values fall back to
//! defaults with a warning.
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::gateway::GatewayOptions;
use crate::units::parse_address;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_FUNDING_POLL_MULTIPLIER: u32 = 5;
pub const DEFAULT_CHAIN_IDS: [u64; 2] = [31337, 1337];
pub const DEFAULT_RPC_URLS: [&str; 2] = ["http://127.0.0.1:8545", "http://localhost:8545"];
/// Bounds for poll periods; values outside fall back to the default
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 86_400_000;
pub const MAX_FUNDING_POLL_MULTIPLIER: u32 = 1_000;
pub const MAX_SETTLE_DELAY_MS: u64 = 60_000;
pub const MAX_CONFIRMATION_TIMEOUT_SECS: u64 = 86_400;
pub const DEFAULT_ADDRESS_BOOK_PATH: &str = "./data/beaglegaze.contracts.v1.json";
/// Chain a network switch targets when it is accepted
pub const PREFERRED_CHAIN_ID: u64 = 31337;

/// Whether an applied push notification defers the next poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollResetPolicy {
    /// Every applied push pushes the next poll a full period out
    ResetOnEvent,
    /// Polls fire on their own cadence regardless of pushes
    Fixed,
}

impl PollResetPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "reset-on-event" | "reset" => Some(Self::ResetOnEvent),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Parameters for `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// Hex chain id, e.g. `0x7a69`
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
}

impl AddChainParams {
    pub fn hardhat_local() -> Self {
        Self {
            chain_id: chain_id_hex(31337),
            chain_name: "Hardhat Local".to_string(),
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["http://localhost:8545".to_string()],
            block_explorer_urls: Vec::new(),
        }
    }
}

pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{:x}", chain_id)
}

/// Human readable chain name
pub fn chain_name(chain_id: u64) -> String {
    match chain_id {
        1 => "Ethereum Mainnet".to_string(),
        5 => "Goerli".to_string(),
        11155111 => "Sepolia".to_string(),
        31337 => "Hardhat".to_string(),
        1337 => "Localhost".to_string(),
        other => format!("Chain {}", other),
    }
}

#[derive(Clone, Debug)]
pub struct DashboardConfig {
    /// Contract used when the address book has no selection
    pub default_contract: Address,
    /// Base polling interval (developer panel cadence)
    pub poll_interval: Duration,
    /// Funding panel polls every `poll_interval * funding_poll_multiplier`
    pub funding_poll_multiplier: u32,
    pub poll_reset_policy: PollResetPolicy,
    /// Accepted chain ids, in preference order
    pub accepted_chain_ids: Vec<u64>,
    /// JSON-RPC endpoints, tried in order
    pub rpc_urls: Vec<String>,
    pub chain_params: BTreeMap<u64, AddChainParams>,
    pub address_book_path: PathBuf,
    /// How often the event subscription polls for new logs
    pub event_poll_interval: Duration,
    pub confirmation_timeout: Duration,
    /// Follow-up developer refresh after a rebind
    pub developer_settle_delay: Duration,
}

impl DashboardConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CONTRACT_ADDRESS`: default contract (zero address if unset)
    /// - `POLL_INTERVAL_MS`: base poll interval (default 10000)
    /// - `FUNDING_POLL_MULTIPLIER`: funding cadence multiplier (default 5)
    /// - `POLL_RESET_POLICY`: `reset-on-event` (default) or `fixed`
    /// - `EXPECTED_CHAIN_ID_LIST` / `EXPECTED_CHAIN_ID`: comma separated ids
    /// - `RPC_URLS`: comma separated JSON-RPC endpoints
    /// - `CHAIN_PARAMS`: JSON object of chain id to add-chain parameters
    /// - `ADDRESS_BOOK_PATH`, `EVENT_POLL_INTERVAL_MS`,
    ///   `CONFIRMATION_TIMEOUT_SECS`, `DEVELOPER_SETTLE_DELAY_MS`
    ///
    /// # Examples
    ///
    /// ```bash
    /// # Local Hardhat node with a deployed contract
    /// CONTRACT_ADDRESS=0x5FbDB2315678afecb367f032d93F642f64180aa3 cargo run -p dashboard
    /// ```
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_contract = match lookup("CONTRACT_ADDRESS") {
            Some(raw) => match parse_address(&raw) {
                Ok(address) => {
                    log::info!("📄 Default contract: {}", address);
                    address
                }
                Err(e) => {
                    log::warn!("⚠️  Invalid CONTRACT_ADDRESS ({}), using zero address", e);
                    Address::ZERO
                }
            },
            None => Address::ZERO,
        };

        let poll_interval = Duration::from_millis(parse_bounded(
            &lookup,
            "POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
            MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS,
        ));
        let funding_poll_multiplier = parse_bounded(
            &lookup,
            "FUNDING_POLL_MULTIPLIER",
            DEFAULT_FUNDING_POLL_MULTIPLIER,
            1..=MAX_FUNDING_POLL_MULTIPLIER,
        );

        let poll_reset_policy = match lookup("POLL_RESET_POLICY") {
            Some(raw) => PollResetPolicy::parse(&raw).unwrap_or_else(|| {
                log::warn!("⚠️  Unknown POLL_RESET_POLICY '{}', using reset-on-event", raw);
                PollResetPolicy::ResetOnEvent
            }),
            None => defaults.poll_reset_policy,
        };

        let accepted_chain_ids = lookup("EXPECTED_CHAIN_ID_LIST")
            .or_else(|| lookup("EXPECTED_CHAIN_ID"))
            .map(|raw| {
                raw.split(',')
                    .filter_map(|s| s.trim().parse::<u64>().ok())
                    .collect::<Vec<_>>()
            })
            .filter(|ids| !ids.is_empty())
            .unwrap_or(defaults.accepted_chain_ids);

        let rpc_urls = lookup("RPC_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or(defaults.rpc_urls);
        log::info!("📡 RPC endpoints: {}", rpc_urls.join(", "));

        let mut chain_params = defaults.chain_params;
        if let Some(raw) = lookup("CHAIN_PARAMS") {
            match serde_json::from_str::<BTreeMap<u64, AddChainParams>>(&raw) {
                Ok(custom) => chain_params.extend(custom),
                Err(e) => log::warn!("⚠️  Ignoring invalid CHAIN_PARAMS: {}", e),
            }
        }

        let address_book_path = lookup("ADDRESS_BOOK_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.address_book_path);

        let event_poll_interval = Duration::from_millis(parse_bounded(
            &lookup,
            "EVENT_POLL_INTERVAL_MS",
            defaults.event_poll_interval.as_millis() as u64,
            MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS,
        ));
        let confirmation_timeout = Duration::from_secs(parse_bounded(
            &lookup,
            "CONFIRMATION_TIMEOUT_SECS",
            defaults.confirmation_timeout.as_secs(),
            1..=MAX_CONFIRMATION_TIMEOUT_SECS,
        ));
        let developer_settle_delay = Duration::from_millis(parse_bounded(
            &lookup,
            "DEVELOPER_SETTLE_DELAY_MS",
            defaults.developer_settle_delay.as_millis() as u64,
            0..=MAX_SETTLE_DELAY_MS,
        ));

        Self {
            default_contract,
            poll_interval,
            funding_poll_multiplier,
            poll_reset_policy,
            accepted_chain_ids,
            rpc_urls,
            chain_params,
            address_book_path,
            event_poll_interval,
            confirmation_timeout,
            developer_settle_delay,
        }
    }

    /// Funding panel poll period
    ///
    /// Saturates at the maximum poll interval.
    pub fn funding_poll_period(&self) -> Duration {
        let max = Duration::from_millis(MAX_POLL_INTERVAL_MS);
        self.poll_interval
            .checked_mul(self.funding_poll_multiplier)
            .map_or(max, |period| period.min(max))
    }

    pub fn is_accepted_chain(&self, chain_id: u64) -> bool {
        self.accepted_chain_ids.contains(&chain_id)
    }

    /// Chain a network switch should target
    pub fn preferred_chain_id(&self) -> u64 {
        if self.is_accepted_chain(PREFERRED_CHAIN_ID) {
            PREFERRED_CHAIN_ID
        } else {
            self.accepted_chain_ids
                .first()
                .copied()
                .unwrap_or(PREFERRED_CHAIN_ID)
        }
    }

    pub fn add_chain_params(&self, chain_id: u64) -> Option<&AddChainParams> {
        self.chain_params.get(&chain_id)
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            event_poll_interval: self.event_poll_interval,
            confirmation_timeout: self.confirmation_timeout,
            ..GatewayOptions::default()
        }
    }
}

fn parse_bounded<F, T>(lookup: &F, key: &str, default: T, range: RangeInclusive<T>) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + fmt::Display + Copy,
{
    let raw = match lookup(key) {
        Some(raw) => raw,
        None => return default,
    };
    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => value,
        Ok(value) => {
            log::warn!(
                "⚠️  {} {} outside {}..={}, using {}",
                key,
                value,
                range.start(),
                range.end(),
                default
            );
            default
        }
        Err(_) => {
            log::warn!("⚠️  Invalid {} '{}', using {}", key, raw, default);
            default
        }
    }
}

impl Default for DashboardConfig {
    /// Local Hardhat defaults
    fn default() -> Self {
        let mut chain_params = BTreeMap::new();
        chain_params.insert(31337, AddChainParams::hardhat_local());
        Self {
            default_contract: Address::ZERO,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            funding_poll_multiplier: DEFAULT_FUNDING_POLL_MULTIPLIER,
            poll_reset_policy: PollResetPolicy::ResetOnEvent,
            accepted_chain_ids: DEFAULT_CHAIN_IDS.to_vec(),
            rpc_urls: DEFAULT_RPC_URLS.iter().map(|s| s.to_string()).collect(),
            chain_params,
            address_book_path: PathBuf::from(DEFAULT_ADDRESS_BOOK_PATH),
            event_poll_interval: Duration::from_millis(2_000),
            confirmation_timeout: Duration::from_secs(120),
            developer_settle_delay: Duration::from_millis(300),
        }
    }
}
