//! Beaglegaze: client for a usage/subscription contract
//!
//! Connects a wallet account to one on-chain usage contract and keeps a
//! locally cached view of its funding and developer state consistent with
//! the chain while polls, pushed events, user writes and account switches
//! all race each other.
//!
//! # Architecture
//!
//! - **Wallet Session**: connected account, signer and chain
//! - **Binder**: turns session + selected contract into a keyed binding
//! - **Contract Gateway**: typed JSON-RPC access to the contract
//! - **Reconciliation loops**: funding and developer panels, one task each
//! - **Address Book** and **Toasts**: local persistence and notifications
//!
//! # Example
//!
//! ```ignore
//! use beaglegaze::{AddressBookStore, Dashboard, DashboardConfig};
//!
//! let config = DashboardConfig::from_env();
//! let rpc = JsonRpcClient::new(config.rpc_urls.clone())?;
//! let factory = Arc::new(RpcGatewayFactory::new(rpc.clone(), config.gateway_options()));
//! let provider = Arc::new(RpcWalletProvider::new(rpc, config.event_poll_interval));
//! let book = AddressBookStore::open(&config.address_book_path);
//!
//! let dashboard = Dashboard::start(config, Some(provider), factory, book);
//! dashboard.connect().await?;
//! dashboard.funding().fund("0.5").await?;
//! ```

pub mod address_book;
pub mod app;
pub mod binding;
pub mod config;
pub mod error;
pub mod gateway;
pub mod reconcile;
pub mod rpc;
pub mod session;
pub mod toasts;
pub mod units;
pub mod writes;

pub use address_book::{AddressBook, AddressBookStore, ContractEntry, STORAGE_KEY};
pub use app::Dashboard;
pub use binding::{Binder, BindingChange, BindingKey, Bound};
pub use config::{AddChainParams, DashboardConfig, NativeCurrency, PollResetPolicy};
pub use error::{DashboardError, ErrorKind, StorageError};
pub use gateway::{
    Capability, ConsumedEvent, ContractBinding, ContractGateway, GatewayFactory, GatewayOptions,
    PendingTx, Receipt, RpcGateway, RpcGatewayFactory,
};
pub use reconcile::{
    CandidateState, DeveloperHandle, DeveloperSnapshot, DeveloperState, FundingHandle,
    FundingSnapshot, FundingState, PanelState, RegistrationStatus,
};
pub use rpc::JsonRpcClient;
pub use session::{AccountSession, ProviderEvent, RpcWalletProvider, WalletProvider, WalletSession};
pub use toasts::{Toast, ToastId, ToastKind, ToastQueue};
pub use units::DisplayUnit;
pub use writes::{WriteCall, WriteKind, WritePhase};

// Common result type
pub type Result<T> = std::result::Result<T, DashboardError>;
