//! In-memory chain, gateway and wallet used by the integration tests

#![allow(dead_code)]

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use beaglegaze::{
    AddChainParams, AddressBookStore, Capability, ConsumedEvent, ContractBinding,
    ContractGateway, Dashboard, DashboardConfig, DashboardError, GatewayFactory, PendingTx,
    ProviderEvent, Receipt, WalletProvider, WriteCall,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch, Semaphore};

pub fn addr(last: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = last;
    Address::from(bytes)
}

pub fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::from(1_000_000_000_000_000_000u64)
}

#[derive(Default)]
struct ChainState {
    funding: HashMap<(Address, Address), U256>,
    subscriptions: HashSet<(Address, Address)>,
    developers: HashSet<(Address, Address)>,
    pending_requests: HashSet<(Address, Address)>,
    balances: HashMap<(Address, Address), U256>,
    pending_txs: HashMap<B256, (ContractBinding, WriteCall)>,
    submitted: Vec<(ContractBinding, WriteCall)>,
    next_hash: u64,
    reject_next: Option<String>,
    revert_next: Option<String>,
    fail_reads: Option<String>,
}

/// Contract state shared by every gateway bound to it
pub struct MockChain {
    state: Mutex<ChainState>,
    subscribers: Mutex<Vec<(Address, mpsc::Sender<ConsumedEvent>)>>,
    gates: Mutex<HashMap<Address, Arc<Semaphore>>>,
    pub candidates_supported: std::sync::atomic::AtomicBool,
    pub price: U256,
    pub funding_reads: AtomicUsize,
    pub funding_reads_done: AtomicUsize,
    pub developer_reads: AtomicUsize,
    pub candidate_checks: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChainState::default()),
            subscribers: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            candidates_supported: std::sync::atomic::AtomicBool::new(true),
            price: ether(1) / U256::from(10u64),
            funding_reads: AtomicUsize::new(0),
            funding_reads_done: AtomicUsize::new(0),
            developer_reads: AtomicUsize::new(0),
            candidate_checks: AtomicUsize::new(0),
        })
    }

    pub fn set_funding(&self, contract: Address, account: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .funding
            .insert((contract, account), amount);
    }

    pub fn funding(&self, contract: Address, account: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .funding
            .get(&(contract, account))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_developer(&self, contract: Address, account: Address, balance: U256) {
        let mut state = self.state.lock().unwrap();
        state.developers.insert((contract, account));
        state.balances.insert((contract, account), balance);
    }

    pub fn is_developer(&self, contract: Address, account: Address) -> bool {
        self.state
            .lock()
            .unwrap()
            .developers
            .contains(&(contract, account))
    }

    pub fn add_pending_request(&self, contract: Address, account: Address) {
        self.state
            .lock()
            .unwrap()
            .pending_requests
            .insert((contract, account));
    }

    pub fn reject_next_write(&self, reason: &str) {
        self.state.lock().unwrap().reject_next = Some(reason.to_string());
    }

    pub fn revert_next_write(&self, reason: &str) {
        self.state.lock().unwrap().revert_next = Some(reason.to_string());
    }

    pub fn fail_reads(&self, reason: Option<&str>) {
        self.state.lock().unwrap().fail_reads = reason.map(str::to_string);
    }

    pub fn submitted(&self) -> Vec<(ContractBinding, WriteCall)> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Block reads and confirmations issued by, or against, `who` until
    /// released. A held candidate address also blocks checks on it.
    pub fn hold_reads(&self, who: Address) {
        self.gates
            .lock()
            .unwrap()
            .insert(who, Arc::new(Semaphore::new(0)));
    }

    pub fn release_reads(&self, who: Address) {
        if let Some(gate) = self.gates.lock().unwrap().remove(&who) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    async fn gate(&self, binding: &ContractBinding) {
        self.gate_on(&[binding.signer, binding.address]).await;
    }

    async fn gate_on(&self, keys: &[Address]) {
        let gate = {
            let gates = self.gates.lock().unwrap();
            keys.iter().find_map(|key| gates.get(key)).cloned()
        };
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
    }

    fn read_failure(&self) -> Option<DashboardError> {
        self.state
            .lock()
            .unwrap()
            .fail_reads
            .clone()
            .map(DashboardError::Provider)
    }

    /// Deliver a `Consumed` event to every live subscription on `contract`
    pub fn emit_consumed(&self, contract: Address, client: Address, new_funding: U256) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        for (address, tx) in subscribers.iter() {
            if *address == contract {
                let _ = tx.try_send(ConsumedEvent {
                    client,
                    new_funding,
                    block_number: None,
                });
            }
        }
    }

    pub fn live_subscriptions(&self, contract: Address) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(address, tx)| *address == contract && !tx.is_closed())
            .count()
    }

    fn apply(&self, binding: ContractBinding, call: WriteCall) {
        let mut state = self.state.lock().unwrap();
        let me = (binding.address, binding.signer);
        match call {
            WriteCall::Fund { value } => {
                let entry = state.funding.entry(me).or_default();
                *entry += value;
            }
            WriteCall::PurchaseSubscription { value } => {
                let entry = state.funding.entry(me).or_default();
                *entry += value;
                state.subscriptions.insert(me);
            }
            WriteCall::RequestPayout => {
                state.funding.insert(me, U256::ZERO);
            }
            WriteCall::RequestDeveloperRegistration => {
                state.pending_requests.insert(me);
            }
            WriteCall::WithdrawBalance => {
                state.balances.insert(me, U256::ZERO);
            }
            WriteCall::VoteForDeveloper { candidate, approve } => {
                let them = (binding.address, candidate);
                state.pending_requests.remove(&them);
                if approve {
                    state.developers.insert(them);
                }
            }
        }
    }
}

pub struct MockGateway {
    chain: Arc<MockChain>,
    binding: ContractBinding,
}

#[async_trait]
impl ContractGateway for MockGateway {
    fn binding(&self) -> ContractBinding {
        self.binding
    }

    async fn is_developer(&self) -> Result<bool, DashboardError> {
        self.chain.developer_reads.fetch_add(1, Ordering::SeqCst);
        self.chain.gate(&self.binding).await;
        if let Some(e) = self.chain.read_failure() {
            return Err(e);
        }
        Ok(self
            .chain
            .is_developer(self.binding.address, self.binding.signer))
    }

    async fn has_pending_registration_request(
        &self,
        who: Address,
    ) -> Result<bool, DashboardError> {
        if who != self.binding.signer {
            self.chain.candidate_checks.fetch_add(1, Ordering::SeqCst);
            self.chain.gate_on(&[who]).await;
        }
        let state = self.chain.state.lock().unwrap();
        Ok(state.pending_requests.contains(&(self.binding.address, who)))
    }

    async fn developer_balance(&self) -> Result<U256, DashboardError> {
        let state = self.chain.state.lock().unwrap();
        let me = (self.binding.address, self.binding.signer);
        if !state.developers.contains(&me) {
            return Err(DashboardError::Reverted("not a developer".to_string()));
        }
        Ok(state.balances.get(&me).copied().unwrap_or_default())
    }

    async fn pending_registrations(&self) -> Capability<Vec<Address>> {
        if !self.chain.candidates_supported.load(Ordering::SeqCst) {
            return Capability::Absent;
        }
        let state = self.chain.state.lock().unwrap();
        let mut list: Vec<Address> = state
            .pending_requests
            .iter()
            .filter(|(contract, _)| *contract == self.binding.address)
            .map(|(_, who)| *who)
            .collect();
        list.sort();
        Capability::Supported(list)
    }

    async fn client_funding(&self) -> Result<U256, DashboardError> {
        self.chain.funding_reads.fetch_add(1, Ordering::SeqCst);
        self.chain.gate(&self.binding).await;
        let result = match self.chain.read_failure() {
            Some(e) => Err(e),
            None => Ok(self
                .chain
                .funding(self.binding.address, self.binding.signer)),
        };
        self.chain.funding_reads_done.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn has_valid_subscription(&self) -> Result<bool, DashboardError> {
        let state = self.chain.state.lock().unwrap();
        Ok(state
            .subscriptions
            .contains(&(self.binding.address, self.binding.signer)))
    }

    async fn subscription_price(&self) -> Result<U256, DashboardError> {
        Ok(self.chain.price)
    }

    async fn submit(&self, call: &WriteCall) -> Result<PendingTx, DashboardError> {
        let mut state = self.chain.state.lock().unwrap();
        if let Some(reason) = state.reject_next.take() {
            return Err(DashboardError::UserRejected(reason));
        }
        state.next_hash += 1;
        let hash = B256::from(U256::from(state.next_hash).to_be_bytes::<32>());
        state.submitted.push((self.binding, *call));
        state.pending_txs.insert(hash, (self.binding, *call));
        Ok(PendingTx { hash })
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<Receipt, DashboardError> {
        tokio::task::yield_now().await;
        self.chain.gate(&self.binding).await;
        let pending = {
            let mut state = self.chain.state.lock().unwrap();
            if let Some(reason) = state.revert_next.take() {
                state.pending_txs.remove(&tx.hash);
                return Err(DashboardError::Reverted(reason));
            }
            state.pending_txs.remove(&tx.hash)
        };
        let (binding, call) = pending
            .ok_or_else(|| DashboardError::Provider("unknown transaction".to_string()))?;
        self.chain.apply(binding, call);
        Ok(Receipt {
            hash: tx.hash,
            block_number: Some(1),
        })
    }

    fn subscribe_consumed(&self) -> mpsc::Receiver<ConsumedEvent> {
        let (tx, rx) = mpsc::channel(16);
        self.chain
            .subscribers
            .lock()
            .unwrap()
            .push((self.binding.address, tx));
        rx
    }
}

pub struct MockFactory {
    pub chain: Arc<MockChain>,
    pub binds: AtomicUsize,
}

impl GatewayFactory for MockFactory {
    fn bind(&self, binding: ContractBinding) -> Arc<dyn ContractGateway> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockGateway {
            chain: self.chain.clone(),
            binding,
        })
    }
}

/// Wallet with a fixed account list and a switchable chain
pub struct MockProvider {
    pub accounts: Mutex<Vec<Address>>,
    pub chain_id: Mutex<u64>,
    pub known_chains: Mutex<HashSet<u64>>,
    pub switch_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    events: Mutex<Vec<mpsc::Sender<ProviderEvent>>>,
}

impl MockProvider {
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(accounts),
            chain_id: Mutex::new(chain_id),
            known_chains: Mutex::new([chain_id].into_iter().collect()),
            switch_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    /// Change accounts and notify subscribers, like a wallet UI switch
    pub fn switch_account(&self, accounts: Vec<Address>) {
        self.set_accounts(accounts.clone());
        self.emit(ProviderEvent::AccountsChanged(accounts));
    }

    pub fn emit(&self, event: ProviderEvent) {
        for tx in self.events.lock().unwrap().iter() {
            let _ = tx.try_send(event.clone());
        }
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, DashboardError> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn chain_id(&self) -> Result<u64, DashboardError> {
        Ok(*self.chain_id.lock().unwrap())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), DashboardError> {
        self.switch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.known_chains.lock().unwrap().contains(&chain_id) {
            return Err(DashboardError::Provider(format!(
                "Unrecognized chain ID {}",
                chain_id
            )));
        }
        *self.chain_id.lock().unwrap() = chain_id;
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), DashboardError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let id = u64::from_str_radix(params.chain_id.trim_start_matches("0x"), 16)
            .map_err(|e| DashboardError::Provider(e.to_string()))?;
        self.known_chains.lock().unwrap().insert(id);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<ProviderEvent> {
        let (tx, rx) = mpsc::channel(16);
        self.events.lock().unwrap().push(tx);
        rx
    }
}

pub fn test_config(contract: Address) -> DashboardConfig {
    DashboardConfig {
        default_contract: contract,
        poll_interval: Duration::from_secs(60),
        developer_settle_delay: Duration::from_millis(20),
        ..DashboardConfig::default()
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub factory: Arc<MockFactory>,
    pub provider: Arc<MockProvider>,
    pub dashboard: Arc<Dashboard>,
    pub dir: TempDir,
}

impl Harness {
    pub fn start(config: DashboardConfig, accounts: Vec<Address>) -> anyhow::Result<Self> {
        init_logging();
        let chain = MockChain::new();
        let factory = Arc::new(MockFactory {
            chain: chain.clone(),
            binds: AtomicUsize::new(0),
        });
        let provider = MockProvider::new(accounts, 31337);
        let dir = TempDir::new()?;
        let book = AddressBookStore::open_in_dir(dir.path());
        let wallet: Arc<dyn WalletProvider> = provider.clone();
        let dashboard = Dashboard::start(config, Some(wallet), factory.clone(), book);
        Ok(Self {
            chain,
            factory,
            provider,
            dashboard,
            dir,
        })
    }
}

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Wait until the watched value satisfies `predicate`
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> anyhow::Result<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for state"))??;
    Ok(value.clone())
}

/// Let spawned tasks and the loops drain their queues
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
}
