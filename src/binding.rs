//! Contract bindings and their identity
//!
//! A binding is rebuilt whenever the contract address, the connected account,
//! the signer or the chain changes. Every rebuild gets a fresh epoch, so two
//! bindings with identical addresses are still told apart.

use alloy_primitives::Address;
use std::fmt;
use std::sync::Arc;

use crate::gateway::{ContractBinding, ContractGateway, GatewayFactory};
use crate::session::AccountSession;
use crate::units::shorten_address;

/// Identity a read is stamped with before it is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub contract: Address,
    pub account: Address,
    pub epoch: u64,
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            shorten_address(&self.account),
            shorten_address(&self.contract),
            self.epoch
        )
    }
}

/// A live binding: its key plus the gateway calls go through
#[derive(Clone)]
pub struct Bound {
    pub key: BindingKey,
    pub gateway: Arc<dyn ContractGateway>,
}

impl Bound {
    pub fn signer(&self) -> Address {
        self.gateway.binding().signer
    }
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("key", &self.key)
            .field("binding", &self.gateway.binding())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BindingInputs {
    contract: Address,
    account: Option<Address>,
    signer: Option<Address>,
    chain_id: Option<u64>,
    correct_network: Option<bool>,
}

/// Result of feeding new inputs to the binder
#[derive(Debug, Clone)]
pub enum BindingChange {
    Unchanged,
    /// Inputs changed; `None` means nothing can be bound right now
    Rebound(Option<Bound>),
}

/// Builds bindings and hands out epochs
pub struct Binder {
    factory: Arc<dyn GatewayFactory>,
    epoch: u64,
    last: Option<BindingInputs>,
    current: Option<Bound>,
}

impl Binder {
    pub fn new(factory: Arc<dyn GatewayFactory>) -> Self {
        Self {
            factory,
            epoch: 0,
            last: None,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Bound> {
        self.current.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Recompute the binding for the given session and contract
    ///
    /// A gateway is bound only with a signer, a connected account, a known
    /// accepted chain and a non-zero contract address.
    pub fn update(&mut self, session: &AccountSession, contract: Address) -> BindingChange {
        let inputs = BindingInputs {
            contract,
            account: session.connected,
            signer: session.signer,
            chain_id: session.chain_id,
            correct_network: session.is_correct_network(),
        };
        if self.last == Some(inputs) {
            return BindingChange::Unchanged;
        }
        self.last = Some(inputs);
        self.epoch += 1;

        let bound = match (inputs.account, inputs.signer, inputs.correct_network) {
            (Some(account), Some(signer), Some(true)) if !contract.is_zero() => {
                let gateway = self.factory.bind(ContractBinding {
                    address: contract,
                    signer,
                });
                Some(Bound {
                    key: BindingKey {
                        contract,
                        account,
                        epoch: self.epoch,
                    },
                    gateway,
                })
            }
            _ => None,
        };

        match &bound {
            Some(bound) => log::info!("Bound {}", bound.key),
            None => log::info!("Binding cleared (epoch {})", self.epoch),
        }
        self.current = bound.clone();
        BindingChange::Rebound(bound)
    }
}
