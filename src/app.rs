//! Dashboard orchestrator
//!
//! Owns the wallet session, the address book, the toast queue and both
//! reconciliation loops. Whenever the session or the selected contract
//! changes the binding is recomputed and pushed to the loops.

use alloy_primitives::Address;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc, watch};

use crate::address_book::{AddressBook, AddressBookStore, ContractEntry};
use crate::binding::{Binder, BindingChange, BindingKey};
use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::gateway::GatewayFactory;
use crate::reconcile::{DeveloperHandle, FundingHandle};
use crate::session::{AccountSession, ProviderEvent, WalletProvider, WalletSession};
use crate::toasts::ToastQueue;
use crate::units::parse_address;

pub struct Dashboard {
    config: DashboardConfig,
    session: WalletSession,
    book: Mutex<AddressBookStore>,
    binder: Mutex<Binder>,
    toasts: ToastQueue,
    funding: FundingHandle,
    developer: DeveloperHandle,
    shutdown: watch::Sender<bool>,
}

impl Dashboard {
    /// Build the dashboard and start its background tasks
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: DashboardConfig,
        provider: Option<Arc<dyn WalletProvider>>,
        factory: Arc<dyn GatewayFactory>,
        book: AddressBookStore,
    ) -> Arc<Self> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let toasts = ToastQueue::new();

        let funding = FundingHandle::spawn(
            config.funding_poll_period(),
            config.poll_reset_policy,
            toasts.clone(),
            shutdown_rx.clone(),
        );
        let developer = DeveloperHandle::spawn(
            config.poll_interval,
            config.poll_reset_policy,
            config.developer_settle_delay,
            toasts.clone(),
            shutdown_rx.clone(),
        );

        let dashboard = Arc::new(Self {
            session: WalletSession::new(provider.clone(), &config),
            config,
            book: Mutex::new(book),
            binder: Mutex::new(Binder::new(factory)),
            toasts,
            funding,
            developer,
            shutdown,
        });

        if let Some(provider) = provider {
            // Subscribe before returning so no early notification is missed
            let events = provider.subscribe();
            tokio::spawn(forward_provider_events(
                Arc::downgrade(&dashboard),
                events,
                shutdown_rx.clone(),
            ));
        }
        tokio::spawn(watch_session(
            Arc::downgrade(&dashboard),
            dashboard.session.watch(),
            shutdown_rx,
        ));

        dashboard.rebind();
        dashboard
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn session(&self) -> AccountSession {
        self.session.snapshot()
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    pub fn funding(&self) -> &FundingHandle {
        &self.funding
    }

    pub fn developer(&self) -> &DeveloperHandle {
        &self.developer
    }

    pub fn has_provider(&self) -> bool {
        self.session.has_provider()
    }

    /// Key of the live binding, if any
    pub fn binding(&self) -> Option<BindingKey> {
        self.binder().current().map(|b| b.key)
    }

    pub async fn connect(&self) -> Result<Address, DashboardError> {
        let account = self.session.connect().await?;
        self.rebind();
        Ok(account)
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
        self.rebind();
    }

    pub async fn switch_network(&self) -> Result<u64, DashboardError> {
        let chain_id = self.session.switch_network().await?;
        self.rebind();
        Ok(chain_id)
    }

    pub fn contracts(&self) -> AddressBook {
        self.book().book().clone()
    }

    /// Contract reads and writes go to: the selection, else the default
    pub fn active_contract(&self) -> Address {
        self.book().book().active_contract(self.config.default_contract)
    }

    pub fn add_contract(&self, name: &str, address: &str) -> Result<ContractEntry, DashboardError> {
        let name = name.trim();
        let address = parse_address(address)?;
        if name.is_empty() {
            return Err(DashboardError::Precondition(
                "Enter a valid name and address".to_string(),
            ));
        }
        let entry = ContractEntry {
            name: name.to_string(),
            address,
        };
        self.book().add(entry.clone())?;
        self.rebind();
        Ok(entry)
    }

    pub fn remove_contract(&self, address: &str) -> Result<bool, DashboardError> {
        let address = parse_address(address)?;
        let removed = self.book().remove(address)?;
        self.rebind();
        Ok(removed)
    }

    pub fn select_contract(&self, address: &str) -> Result<(), DashboardError> {
        let address = parse_address(address)?;
        {
            let mut book = self.book();
            if !book.book().entries().iter().any(|e| e.address == address) {
                return Err(DashboardError::Precondition(format!(
                    "{} is not in the address book",
                    address
                )));
            }
            book.select(Some(address))?;
        }
        self.rebind();
        Ok(())
    }

    /// Recompute the binding and hand it to both loops if it changed
    pub fn rebind(&self) {
        let session = self.session.snapshot();
        let contract = self.active_contract();

        let mut binder = self.binder();
        if let BindingChange::Rebound(bound) = binder.update(&session, contract) {
            // Sent under the binder lock so both loops see rebinds in order
            self.funding.rebind(bound.clone());
            self.developer.rebind(bound);
        }
    }

    /// Stop the loops and background tasks
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn book(&self) -> MutexGuard<'_, AddressBookStore> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn binder(&self) -> MutexGuard<'_, Binder> {
        self.binder.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn forward_provider_events(
    dashboard: Weak<Dashboard>,
    mut events: mpsc::Receiver<ProviderEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Some(event) => event,
                    None => break,
                };
                let dashboard = match dashboard.upgrade() {
                    Some(dashboard) => dashboard,
                    None => break,
                };
                log::info!("Wallet event: {:?}", event);
                dashboard.session.apply(&event);
            }
            _ = shutdown.changed() => break,
        }
    }
    log::debug!("Wallet event forwarder stopped");
}

async fn watch_session(
    dashboard: Weak<Dashboard>,
    mut session: watch::Receiver<AccountSession>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                match dashboard.upgrade() {
                    Some(dashboard) => dashboard.rebind(),
                    None => break,
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    log::debug!("Session watcher stopped");
}
