use alloy_primitives::U256;
use beaglegaze::units::{address_hex, shorten_address};
use beaglegaze::{
    AccountSession, AddressBook, BindingKey, CandidateState, DeveloperState, DisplayUnit,
    FundingState, PanelState, PollResetPolicy, RegistrationStatus, Toast, ToastKind, WriteKind,
    WritePhase,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::time::Instant;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub default_contract: String,
    pub active_contract: String,
    pub accepted_chain_ids: Vec<u64>,
    pub poll_interval_ms: u64,
    pub funding_poll_interval_ms: u64,
    pub poll_reset_policy: PollResetPolicy,
    pub started_at: String,
}

#[derive(Debug, Serialize)]
pub struct BindingInfo {
    pub contract: String,
    pub account: String,
    pub epoch: u64,
}

impl From<BindingKey> for BindingInfo {
    fn from(key: BindingKey) -> Self {
        Self {
            contract: address_hex(&key.contract),
            account: address_hex(&key.account),
            epoch: key.epoch,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub has_provider: bool,
    pub connected: Option<String>,
    pub connected_short: Option<String>,
    pub signer: Option<String>,
    pub chain_id: Option<u64>,
    pub chain_name: Option<String>,
    /// `null` while the chain is unknown
    pub correct_network: Option<bool>,
    pub binding: Option<BindingInfo>,
}

impl SessionResponse {
    pub fn new(session: &AccountSession, has_provider: bool, binding: Option<BindingKey>) -> Self {
        Self {
            has_provider,
            connected: session.connected.as_ref().map(address_hex),
            connected_short: session.connected.as_ref().map(shorten_address),
            signer: session.signer.as_ref().map(address_hex),
            chain_id: session.chain_id,
            chain_name: session.chain_id.map(beaglegaze::config::chain_name),
            correct_network: session.is_correct_network(),
            binding: binding.map(BindingInfo::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub account: String,
}

#[derive(Debug, Serialize)]
pub struct SwitchNetworkResponse {
    pub chain_id: u64,
    pub chain_name: String,
}

#[derive(Debug, Serialize)]
pub struct ContractEntryInfo {
    pub name: String,
    pub address: String,
    pub short_address: String,
    pub selected: bool,
}

#[derive(Debug, Serialize)]
pub struct ContractsResponse {
    pub contracts: Vec<ContractEntryInfo>,
    pub selected: Option<String>,
    /// Selection, or the configured default when nothing is selected
    pub active_contract: String,
}

impl ContractsResponse {
    pub fn new(book: &AddressBook, active: alloy_primitives::Address) -> Self {
        let contracts = book
            .entries()
            .iter()
            .map(|entry| ContractEntryInfo {
                name: entry.name.clone(),
                address: address_hex(&entry.address),
                short_address: shorten_address(&entry.address),
                selected: book.selected() == Some(entry.address),
            })
            .collect();
        Self {
            contracts,
            selected: book.selected().as_ref().map(address_hex),
            active_contract: address_hex(&active),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddContractRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveContractResponse {
    pub address: String,
    pub status: String,
}

/// Ether amount entered by the user, e.g. `"0.5"`
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct CandidateRequest {
    pub candidate: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub approve: bool,
}

/// One amount in every unit the front end can display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmountInfo {
    pub wei: String,
    pub gwei: String,
    pub eth: String,
}

impl From<U256> for AmountInfo {
    fn from(value: U256) -> Self {
        Self {
            wei: value.to_string(),
            gwei: DisplayUnit::Gwei.format(value),
            eth: DisplayUnit::Eth.format(value),
        }
    }
}

/// Fields common to both panels
#[derive(Debug, Serialize)]
pub struct PanelInfo {
    pub binding: Option<BindingInfo>,
    pub version: u64,
    pub loading: bool,
    pub error: Option<String>,
    pub writes: BTreeMap<WriteKind, WritePhase>,
    /// Seconds until the next scheduled poll
    pub next_refresh_secs: Option<u64>,
}

impl PanelInfo {
    pub fn new<T>(panel: &PanelState<T>, now: Instant) -> Self {
        Self {
            binding: panel.key.map(BindingInfo::from),
            version: panel.version,
            loading: panel.loading,
            error: panel.error.clone(),
            writes: panel.writes.clone(),
            next_refresh_secs: panel
                .next_poll_at
                .map(|at| at.saturating_duration_since(now).as_secs()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FundingResponse {
    #[serde(flatten)]
    pub panel: PanelInfo,
    pub amount: Option<AmountInfo>,
    pub subscription_active: Option<bool>,
    pub subscription_price: Option<AmountInfo>,
}

impl FundingResponse {
    pub fn new(state: &FundingState, now: Instant) -> Self {
        let snapshot = state.snapshot.as_ref();
        Self {
            panel: PanelInfo::new(state, now),
            amount: snapshot.map(|s| AmountInfo::from(s.amount)),
            subscription_active: snapshot.and_then(|s| s.subscription_active),
            subscription_price: snapshot
                .and_then(|s| s.subscription_price)
                .map(AmountInfo::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeveloperResponse {
    #[serde(flatten)]
    pub panel: PanelInfo,
    pub status: Option<RegistrationStatus>,
    pub balance: Option<AmountInfo>,
    pub pending_candidates: Vec<String>,
    pub candidate: CandidateState,
}

impl DeveloperResponse {
    pub fn new(state: &DeveloperState, now: Instant) -> Self {
        let snapshot = state.panel.snapshot.as_ref();
        Self {
            panel: PanelInfo::new(&state.panel, now),
            status: snapshot.map(|s| s.status()),
            balance: snapshot.map(|s| AmountInfo::from(s.balance)),
            pending_candidates: snapshot
                .map(|s| s.pending_candidates.iter().map(address_hex).collect())
                .unwrap_or_default(),
            candidate: state.candidate.clone(),
        }
    }
}

/// A write was handed to the wallet; progress shows up in the panel
#[derive(Debug, Serialize)]
pub struct WriteAccepted {
    pub kind: WriteKind,
    pub status: String,
}

impl WriteAccepted {
    pub fn new(kind: WriteKind) -> Self {
        Self {
            kind,
            status: "submitted".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToastInfo {
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
    pub remaining_ms: Option<u64>,
}

impl ToastInfo {
    pub fn new(toast: &Toast, now: Instant) -> Self {
        Self {
            id: toast.id,
            kind: toast.kind,
            message: toast.message.clone(),
            remaining_ms: toast.remaining(now).map(|d| d.as_millis() as u64),
        }
    }
}
