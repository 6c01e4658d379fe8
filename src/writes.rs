//! Two-phase contract writes
//!
//! Every state-changing call is submitted to the wallet, then awaited until
//! mined: `Idle → Submitting → AwaitingConfirmation → Settled | Failed`.
//! Nothing here retries; callers refresh from the chain once settled.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use serde::Serialize;

use crate::error::DashboardError;
use crate::gateway::abi::IBeaglegaze;
use crate::gateway::ContractGateway;
use crate::units::shorten_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Fund,
    PurchaseSubscription,
    RequestPayout,
    RequestDeveloperRegistration,
    WithdrawBalance,
    VoteForDeveloper,
}

impl WriteKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Fund => "Fund",
            Self::PurchaseSubscription => "Subscription purchase",
            Self::RequestPayout => "Payout",
            Self::RequestDeveloperRegistration => "Registration request",
            Self::WithdrawBalance => "Withdraw",
            Self::VoteForDeveloper => "Vote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCall {
    Fund { value: U256 },
    PurchaseSubscription { value: U256 },
    RequestPayout,
    RequestDeveloperRegistration,
    WithdrawBalance,
    VoteForDeveloper { candidate: Address, approve: bool },
}

impl WriteCall {
    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Fund { .. } => WriteKind::Fund,
            Self::PurchaseSubscription { .. } => WriteKind::PurchaseSubscription,
            Self::RequestPayout => WriteKind::RequestPayout,
            Self::RequestDeveloperRegistration => WriteKind::RequestDeveloperRegistration,
            Self::WithdrawBalance => WriteKind::WithdrawBalance,
            Self::VoteForDeveloper { .. } => WriteKind::VoteForDeveloper,
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            Self::Fund { .. } => IBeaglegaze::fundCall::SIGNATURE,
            Self::PurchaseSubscription { .. } => IBeaglegaze::purchaseSubscriptionCall::SIGNATURE,
            Self::RequestPayout => IBeaglegaze::requestPayoutCall::SIGNATURE,
            Self::RequestDeveloperRegistration => {
                IBeaglegaze::requestDeveloperRegistrationCall::SIGNATURE
            }
            Self::WithdrawBalance => IBeaglegaze::withdrawBalanceCall::SIGNATURE,
            Self::VoteForDeveloper { .. } => IBeaglegaze::voteForDeveloperCall::SIGNATURE,
        }
    }

    pub fn calldata(&self) -> Vec<u8> {
        match *self {
            Self::Fund { .. } => IBeaglegaze::fundCall {}.abi_encode(),
            Self::PurchaseSubscription { .. } => IBeaglegaze::purchaseSubscriptionCall {}.abi_encode(),
            Self::RequestPayout => IBeaglegaze::requestPayoutCall {}.abi_encode(),
            Self::RequestDeveloperRegistration => {
                IBeaglegaze::requestDeveloperRegistrationCall {}.abi_encode()
            }
            Self::WithdrawBalance => IBeaglegaze::withdrawBalanceCall {}.abi_encode(),
            Self::VoteForDeveloper { candidate, approve } => {
                IBeaglegaze::voteForDeveloperCall { candidate, approve }.abi_encode()
            }
        }
    }

    /// Wei attached to the call (payable methods only)
    pub fn value(&self) -> U256 {
        match self {
            Self::Fund { value } | Self::PurchaseSubscription { value } => *value,
            _ => U256::ZERO,
        }
    }

    /// Info toast shown once the wallet accepted the transaction
    pub fn submitted_message(&self) -> Option<String> {
        match self {
            Self::Fund { .. } | Self::PurchaseSubscription { .. } => None,
            Self::RequestPayout => Some("Payout requested, awaiting confirmation".to_string()),
            Self::RequestDeveloperRegistration => {
                Some("Registration requested, awaiting confirmation".to_string())
            }
            Self::WithdrawBalance => Some("Withdraw submitted, awaiting confirmation".to_string()),
            Self::VoteForDeveloper { candidate, approve } => Some(format!(
                "Voting {} for {} submitted, awaiting confirmation",
                if *approve { "approve" } else { "reject" },
                shorten_address(candidate)
            )),
        }
    }

    pub fn confirmed_message(&self) -> &'static str {
        match self {
            Self::Fund { .. } | Self::PurchaseSubscription { .. } => "Transaction confirmed",
            Self::RequestPayout => "Payout confirmed",
            Self::RequestDeveloperRegistration => "Registration request confirmed",
            Self::WithdrawBalance => "Withdrawal confirmed",
            Self::VoteForDeveloper { .. } => "Vote confirmed",
        }
    }

    pub fn failed_message(&self, error: &DashboardError) -> String {
        let prefix = match self {
            Self::Fund { .. } | Self::PurchaseSubscription { .. } => "Transaction failed",
            Self::RequestPayout => "Payout failed",
            Self::RequestDeveloperRegistration => "Registration request failed",
            Self::WithdrawBalance => "Withdraw failed",
            Self::VoteForDeveloper { .. } => "Vote failed",
        };
        format!("{}: {}", prefix, error.reason())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WritePhase {
    Idle,
    Submitting,
    AwaitingConfirmation { tx_hash: B256 },
    Settled { tx_hash: B256 },
    Failed { reason: String },
}

impl WritePhase {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Submitting | Self::AwaitingConfirmation { .. })
    }
}

/// Run both write phases, reporting each transition through `on_phase`
pub async fn run_two_phase<F>(
    gateway: &dyn ContractGateway,
    call: &WriteCall,
    mut on_phase: F,
) -> Result<B256, DashboardError>
where
    F: FnMut(WritePhase),
{
    on_phase(WritePhase::Submitting);
    let pending = match gateway.submit(call).await {
        Ok(pending) => pending,
        Err(e) => {
            log::warn!("{} submission failed: {}", call.kind().label(), e);
            on_phase(WritePhase::Failed { reason: e.reason() });
            return Err(e);
        }
    };

    on_phase(WritePhase::AwaitingConfirmation {
        tx_hash: pending.hash,
    });
    match gateway.wait_for_confirmation(&pending).await {
        Ok(receipt) => {
            log::info!(
                "{} confirmed in block {:?}: {}",
                call.kind().label(),
                receipt.block_number,
                receipt.hash
            );
            on_phase(WritePhase::Settled {
                tx_hash: receipt.hash,
            });
            Ok(receipt.hash)
        }
        Err(e) => {
            log::warn!("{} confirmation failed: {}", call.kind().label(), e);
            on_phase(WritePhase::Failed { reason: e.reason() });
            Err(e)
        }
    }
}
