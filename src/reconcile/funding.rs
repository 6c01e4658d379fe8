// Funding/subscription reconciliation loop
//
// Sources: manual and polled refreshes, `Consumed` pushes for the bound
// contract and the fund/purchase/payout writes. The funding poll runs at a
// multiple of the base interval since pushes carry most updates.

use alloy_primitives::U256;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::{
    check_write, recv_opt, sleep_until_opt, spawn_write, Ack, Applied, PanelState, PollSchedule,
    WriteEvent,
};
use crate::binding::{BindingKey, Bound};
use crate::config::PollResetPolicy;
use crate::error::DashboardError;
use crate::gateway::{ConsumedEvent, ContractGateway};
use crate::toasts::ToastQueue;
use crate::units::{parse_ether, shorten_address};
use crate::writes::WriteCall;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FundingSnapshot {
    /// Raw wei
    pub amount: U256,
    pub subscription_active: Option<bool>,
    pub subscription_price: Option<U256>,
}

pub type FundingState = PanelState<FundingSnapshot>;

enum FundingCommand {
    Rebind(Option<Bound>),
    Refresh,
    Write { call: WriteCall, ack: Ack },
}

enum Completion {
    Read {
        stamp: BindingKey,
        result: Result<FundingSnapshot, DashboardError>,
    },
    Write(WriteEvent),
}

async fn read_funding(gateway: &dyn ContractGateway) -> Result<FundingSnapshot, DashboardError> {
    let (amount, active, price) = tokio::join!(
        gateway.client_funding(),
        gateway.has_valid_subscription(),
        gateway.subscription_price(),
    );
    let amount = amount?;

    let subscription_active = match active {
        Ok(active) => Some(active),
        Err(e) => {
            log::warn!("Subscription status unavailable: {}", e);
            None
        }
    };
    let subscription_price = match price {
        Ok(price) => Some(price),
        Err(e) => {
            log::warn!("Subscription price unavailable: {}", e);
            None
        }
    };

    Ok(FundingSnapshot {
        amount,
        subscription_active,
        subscription_price,
    })
}

/// Parse a payable amount; must be a positive ether value
fn positive_ether(amount: &str) -> Result<U256, DashboardError> {
    let value = parse_ether(amount)?;
    if value.is_zero() {
        return Err(DashboardError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Handle to a running funding loop
#[derive(Clone)]
pub struct FundingHandle {
    commands: mpsc::UnboundedSender<FundingCommand>,
    state: watch::Receiver<FundingState>,
}

impl FundingHandle {
    pub fn spawn(
        period: Duration,
        policy: PollResetPolicy,
        toasts: ToastQueue,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let (published, state) = watch::channel(FundingState::default());

        let panel = FundingLoop {
            state: FundingState::default(),
            bound: None,
            schedule: PollSchedule::new(period, policy),
            events: None,
            toasts,
            completions,
            published,
        };
        tokio::spawn(panel.run(commands_rx, completions_rx, shutdown));

        Self { commands, state }
    }

    pub fn state(&self) -> FundingState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FundingState> {
        self.state.clone()
    }

    pub fn rebind(&self, bound: Option<Bound>) {
        if self.commands.send(FundingCommand::Rebind(bound)).is_err() {
            log::warn!("Funding loop is gone; rebind ignored");
        }
    }

    /// Manual refresh; restarts the poll countdown
    pub fn refresh(&self) {
        let _ = self.commands.send(FundingCommand::Refresh);
    }

    pub async fn fund(&self, amount: &str) -> Result<(), DashboardError> {
        let value = positive_ether(amount)?;
        self.write(WriteCall::Fund { value }).await
    }

    pub async fn purchase_subscription(&self, amount: &str) -> Result<(), DashboardError> {
        let value = positive_ether(amount)?;
        self.write(WriteCall::PurchaseSubscription { value }).await
    }

    pub async fn request_payout(&self) -> Result<(), DashboardError> {
        self.write(WriteCall::RequestPayout).await
    }

    async fn write(&self, call: WriteCall) -> Result<(), DashboardError> {
        let (ack, accepted) = oneshot::channel();
        self.commands
            .send(FundingCommand::Write { call, ack })
            .map_err(|_| DashboardError::Internal("funding loop stopped".to_string()))?;
        accepted
            .await
            .map_err(|_| DashboardError::Internal("funding loop stopped".to_string()))?
    }
}

struct FundingLoop {
    state: FundingState,
    bound: Option<Bound>,
    schedule: PollSchedule,
    events: Option<mpsc::Receiver<ConsumedEvent>>,
    toasts: ToastQueue,
    completions: mpsc::UnboundedSender<Completion>,
    published: watch::Sender<FundingState>,
}

impl FundingLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<FundingCommand>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(done) = completions.recv() => self.handle_completion(done),
                event = recv_opt(&mut self.events) => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        log::warn!("Consumed subscription ended; relying on polling");
                        self.events = None;
                    }
                },
                _ = sleep_until_opt(self.schedule.next_wake()) => {
                    if self.schedule.take_due(Instant::now()) {
                        self.issue_refresh();
                    }
                }
                _ = shutdown.changed() => {
                    log::info!("Funding loop shutting down");
                    break;
                }
            }
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.state.next_poll_at = self.schedule.next_due();
        self.published.send_replace(self.state.clone());
    }

    fn handle_command(&mut self, command: FundingCommand) {
        match command {
            FundingCommand::Rebind(bound) => self.rebind(bound),
            FundingCommand::Refresh => self.issue_refresh(),
            FundingCommand::Write { call, ack } => {
                let result = self.start_write(call);
                self.publish();
                let _ = ack.send(result);
            }
        }
    }

    fn rebind(&mut self, bound: Option<Bound>) {
        // Dropping the receiver ends the old subscription
        self.events = None;
        self.schedule.stop();
        self.state.rebind(bound.as_ref().map(|b| b.key));
        self.bound = bound;

        if let Some(bound) = &self.bound {
            self.events = Some(bound.gateway.subscribe_consumed());
            self.issue_refresh();
        }
    }

    fn issue_refresh(&mut self) {
        let bound = match &self.bound {
            Some(bound) => bound.clone(),
            None => return,
        };
        let stamp = match self.state.begin_refresh() {
            Some(stamp) => stamp,
            None => return,
        };
        self.schedule.reset(Instant::now());

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = read_funding(bound.gateway.as_ref()).await;
            let _ = completions.send(Completion::Read { stamp, result });
        });
    }

    fn start_write(&mut self, call: WriteCall) -> Result<(), DashboardError> {
        let bound = check_write(self.bound.as_ref(), &self.state, call.kind())?;
        spawn_write(bound, call, &self.toasts, &self.completions, Completion::Write);
        Ok(())
    }

    fn handle_event(&mut self, event: ConsumedEvent) {
        let bound = match &self.bound {
            Some(bound) => bound,
            None => return,
        };
        if event.client != bound.signer() || event.client != bound.key.account {
            log::debug!(
                "Ignoring Consumed event for {}",
                shorten_address(&event.client)
            );
            return;
        }

        let stamp = bound.key;
        if self
            .state
            .apply_push(&stamp, |snapshot| snapshot.amount = event.new_funding)
        {
            log::debug!("Funding updated from Consumed event: {}", event.new_funding);
            self.schedule.on_push(Instant::now());
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Read { stamp, result } => {
                match self.state.finish_refresh(&stamp, result.map_err(|e| e.reason())) {
                    Applied::Updated => {}
                    Applied::Failed => {
                        log::warn!(
                            "Funding refresh failed: {}",
                            self.state.error.as_deref().unwrap_or_default()
                        );
                    }
                    Applied::Stale => log::debug!("Discarding funding read issued under {}", stamp),
                }
            }
            Completion::Write(WriteEvent::Phase { stamp, kind, phase }) => {
                self.state.set_write_phase(&stamp, kind, phase);
            }
            Completion::Write(WriteEvent::Done { stamp, call, result }) => {
                if !self.state.is_current(&stamp) {
                    log::debug!("{} settled under {}; binding moved on", call.kind().label(), stamp);
                    return;
                }
                if result.is_ok() {
                    self.issue_refresh();
                }
            }
        }
    }
}
