// Developer registration workflow
//
// Same discipline as the funding loop, without pushes: the registration
// state is derived by re-querying. A rebind triggers an immediate read and a
// follow-up read after a short settle delay, for wallets that report the new
// signer a moment late.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::{
    check_write, sleep_until_opt, spawn_write, Ack, Applied, PanelState, PollSchedule, WriteEvent,
};
use crate::binding::{BindingKey, Bound};
use crate::config::PollResetPolicy;
use crate::error::DashboardError;
use crate::gateway::ContractGateway;
use crate::toasts::ToastQueue;
use crate::units::{parse_address, shorten_address};
use crate::writes::{WriteCall, WriteKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Unregistered,
    RequestPending,
    Registered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeveloperSnapshot {
    pub is_developer: bool,
    pub has_pending_request: bool,
    /// Raw wei; zero for non-developers
    pub balance: U256,
    pub pending_candidates: Vec<Address>,
}

impl DeveloperSnapshot {
    pub fn status(&self) -> RegistrationStatus {
        if self.is_developer {
            RegistrationStatus::Registered
        } else if self.has_pending_request {
            RegistrationStatus::RequestPending
        } else {
            RegistrationStatus::Unregistered
        }
    }
}

/// Candidate the voter is acting on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateState {
    pub candidate: Option<Address>,
    /// Last known pending status; `None` until checked
    pub pending: Option<bool>,
    pub checking: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeveloperState {
    pub panel: PanelState<DeveloperSnapshot>,
    pub candidate: CandidateState,
}

enum DeveloperCommand {
    Rebind(Option<Bound>),
    Refresh,
    CheckCandidate { candidate: Address, ack: Ack },
    SelectCandidate { candidate: Address, ack: Ack },
    Vote { approve: bool, ack: Ack },
    Write { call: WriteCall, ack: Ack },
}

enum Completion {
    Read {
        stamp: BindingKey,
        result: Result<DeveloperSnapshot, DashboardError>,
    },
    Candidate {
        stamp: BindingKey,
        candidate: Address,
        result: Result<bool, DashboardError>,
    },
    Write(WriteEvent),
}

async fn read_developer(
    gateway: &dyn ContractGateway,
    account: Address,
) -> Result<DeveloperSnapshot, DashboardError> {
    let (is_developer, has_pending_request) = tokio::join!(
        gateway.is_developer(),
        gateway.has_pending_registration_request(account),
    );
    let is_developer = is_developer?;
    let has_pending_request = has_pending_request?;

    if !is_developer {
        return Ok(DeveloperSnapshot {
            is_developer,
            has_pending_request,
            ..Default::default()
        });
    }

    // Only developers may read a balance; a failure here keeps the panel usable
    let balance = match gateway.developer_balance().await {
        Ok(balance) => balance,
        Err(e) => {
            log::warn!("Developer balance unavailable: {}", e);
            U256::ZERO
        }
    };
    let pending_candidates = gateway.pending_registrations().await.or_empty();

    Ok(DeveloperSnapshot {
        is_developer,
        has_pending_request,
        balance,
        pending_candidates,
    })
}

/// Handle to a running developer loop
#[derive(Clone)]
pub struct DeveloperHandle {
    commands: mpsc::UnboundedSender<DeveloperCommand>,
    state: watch::Receiver<DeveloperState>,
    toasts: ToastQueue,
}

impl DeveloperHandle {
    pub fn spawn(
        period: Duration,
        policy: PollResetPolicy,
        settle_delay: Duration,
        toasts: ToastQueue,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let (published, state) = watch::channel(DeveloperState::default());

        let panel = DeveloperLoop {
            state: DeveloperState::default(),
            bound: None,
            schedule: PollSchedule::new(period, policy),
            settle_delay,
            toasts: toasts.clone(),
            completions,
            published,
        };
        tokio::spawn(panel.run(commands_rx, completions_rx, shutdown));

        Self {
            commands,
            state,
            toasts,
        }
    }

    pub fn state(&self) -> DeveloperState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DeveloperState> {
        self.state.clone()
    }

    pub fn rebind(&self, bound: Option<Bound>) {
        if self.commands.send(DeveloperCommand::Rebind(bound)).is_err() {
            log::warn!("Developer loop is gone; rebind ignored");
        }
    }

    pub fn refresh(&self) {
        let _ = self.commands.send(DeveloperCommand::Refresh);
    }

    pub async fn request_registration(&self) -> Result<(), DashboardError> {
        self.send(|ack| DeveloperCommand::Write {
            call: WriteCall::RequestDeveloperRegistration,
            ack,
        })
        .await
    }

    pub async fn withdraw_balance(&self) -> Result<(), DashboardError> {
        self.send(|ack| DeveloperCommand::Write {
            call: WriteCall::WithdrawBalance,
            ack,
        })
        .await
    }

    /// Validate `input` as an address and query its pending status
    ///
    /// Invalid input raises an error toast and makes no call.
    pub async fn check_candidate(&self, input: &str) -> Result<(), DashboardError> {
        let candidate = match parse_address(input) {
            Ok(candidate) => candidate,
            Err(e) => {
                self.toasts.error("Enter a valid candidate address");
                return Err(e);
            }
        };
        self.send(|ack| DeveloperCommand::CheckCandidate { candidate, ack })
            .await
    }

    /// Pick an address from the pending list; it is known to be pending
    pub async fn select_candidate(&self, candidate: Address) -> Result<(), DashboardError> {
        self.send(|ack| DeveloperCommand::SelectCandidate { candidate, ack })
            .await
    }

    pub async fn vote(&self, approve: bool) -> Result<(), DashboardError> {
        self.send(|ack| DeveloperCommand::Vote { approve, ack })
            .await
    }

    async fn send<F>(&self, command: F) -> Result<(), DashboardError>
    where
        F: FnOnce(Ack) -> DeveloperCommand,
    {
        let (ack, accepted) = oneshot::channel();
        self.commands
            .send(command(ack))
            .map_err(|_| DashboardError::Internal("developer loop stopped".to_string()))?;
        accepted
            .await
            .map_err(|_| DashboardError::Internal("developer loop stopped".to_string()))?
    }
}

struct DeveloperLoop {
    state: DeveloperState,
    bound: Option<Bound>,
    schedule: PollSchedule,
    settle_delay: Duration,
    toasts: ToastQueue,
    completions: mpsc::UnboundedSender<Completion>,
    published: watch::Sender<DeveloperState>,
}

impl DeveloperLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<DeveloperCommand>,
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
                _ = sleep_until_opt(self.schedule.next_wake()) => {
                    if self.schedule.take_due(Instant::now()) {
                        self.issue_refresh();
                    }
                }
                _ = shutdown.changed() => {
                    log::info!("Developer loop shutting down");
                    break;
                }
            }
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.state.panel.next_poll_at = self.schedule.next_due();
        self.published.send_replace(self.state.clone());
    }

    fn handle_command(&mut self, command: DeveloperCommand) {
        match command {
            DeveloperCommand::Rebind(bound) => self.rebind(bound),
            DeveloperCommand::Refresh => self.issue_refresh(),
            DeveloperCommand::CheckCandidate { candidate, ack } => {
                let result = self.check_candidate(candidate);
                self.acknowledge(ack, result);
            }
            DeveloperCommand::SelectCandidate { candidate, ack } => {
                let result = self.select_candidate(candidate);
                self.acknowledge(ack, result);
            }
            DeveloperCommand::Vote { approve, ack } => {
                let result = self.vote(approve);
                self.acknowledge(ack, result);
            }
            DeveloperCommand::Write { call, ack } => {
                let result = self.start_write(call);
                self.acknowledge(ack, result);
            }
        }
    }

    /// Publish before replying so callers observe the effect of their command
    fn acknowledge(&mut self, ack: Ack, result: Result<(), DashboardError>) {
        self.publish();
        let _ = ack.send(result);
    }

    fn rebind(&mut self, bound: Option<Bound>) {
        self.schedule.stop();
        self.state.panel.rebind(bound.as_ref().map(|b| b.key));
        self.state.candidate = CandidateState::default();
        self.bound = bound;

        if self.bound.is_some() {
            self.issue_refresh();
            if let Some(at) = Instant::now().checked_add(self.settle_delay) {
                self.schedule.schedule_once(at);
            }
        }
    }

    fn issue_refresh(&mut self) {
        let bound = match &self.bound {
            Some(bound) => bound.clone(),
            None => return,
        };
        let stamp = match self.state.panel.begin_refresh() {
            Some(stamp) => stamp,
            None => return,
        };
        self.schedule.reset(Instant::now());

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = read_developer(bound.gateway.as_ref(), stamp.account).await;
            let _ = completions.send(Completion::Read { stamp, result });
        });
    }

    fn check_candidate(&mut self, candidate: Address) -> Result<(), DashboardError> {
        let bound = self
            .bound
            .clone()
            .ok_or_else(DashboardError::not_connected)?;
        self.set_candidate(CandidateState {
            candidate: Some(candidate),
            pending: None,
            checking: true,
        });
        self.spawn_candidate_check(bound, candidate);
        Ok(())
    }

    /// Candidate changes count as panel mutations
    fn set_candidate(&mut self, candidate: CandidateState) {
        self.state.candidate = candidate;
        self.state.panel.version += 1;
    }

    fn spawn_candidate_check(&self, bound: Bound, candidate: Address) {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = bound
                .gateway
                .has_pending_registration_request(candidate)
                .await;
            let _ = completions.send(Completion::Candidate {
                stamp: bound.key,
                candidate,
                result,
            });
        });
    }

    fn select_candidate(&mut self, candidate: Address) -> Result<(), DashboardError> {
        if self.bound.is_none() {
            return Err(DashboardError::not_connected());
        }
        let listed = self
            .state
            .panel
            .snapshot
            .as_ref()
            .map_or(false, |s| s.pending_candidates.contains(&candidate));
        if !listed {
            return Err(DashboardError::Precondition(format!(
                "{} is not a pending candidate",
                shorten_address(&candidate)
            )));
        }
        self.set_candidate(CandidateState {
            candidate: Some(candidate),
            pending: Some(true),
            checking: false,
        });
        Ok(())
    }

    fn vote(&mut self, approve: bool) -> Result<(), DashboardError> {
        let candidate = match &self.state.candidate {
            CandidateState {
                candidate: Some(candidate),
                pending: Some(true),
                ..
            } => *candidate,
            CandidateState {
                candidate: None, ..
            } => {
                return Err(DashboardError::Precondition(
                    "no candidate selected".to_string(),
                ))
            }
            _ => {
                return Err(DashboardError::Precondition(
                    "candidate has no pending registration request".to_string(),
                ))
            }
        };
        self.start_write(WriteCall::VoteForDeveloper { candidate, approve })
    }

    fn start_write(&mut self, call: WriteCall) -> Result<(), DashboardError> {
        if call.kind() == WriteKind::WithdrawBalance {
            if let Some(snapshot) = &self.state.panel.snapshot {
                if snapshot.balance.is_zero() {
                    return Err(DashboardError::Precondition(
                        "no balance to withdraw".to_string(),
                    ));
                }
            }
        }
        let bound = check_write(self.bound.as_ref(), &self.state.panel, call.kind())?;
        spawn_write(bound, call, &self.toasts, &self.completions, Completion::Write);
        Ok(())
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Read { stamp, result } => {
                match self
                    .state
                    .panel
                    .finish_refresh(&stamp, result.map_err(|e| e.reason()))
                {
                    Applied::Updated => {}
                    Applied::Failed => log::warn!(
                        "Developer refresh failed: {}",
                        self.state.panel.error.as_deref().unwrap_or_default()
                    ),
                    Applied::Stale => {
                        log::debug!("Discarding developer read issued under {}", stamp)
                    }
                }
            }
            Completion::Candidate {
                stamp,
                candidate,
                result,
            } => {
                if !self.state.panel.is_current(&stamp)
                    || self.state.candidate.candidate != Some(candidate)
                {
                    log::debug!(
                        "Discarding candidate check for {}",
                        shorten_address(&candidate)
                    );
                    return;
                }
                let pending = match result {
                    Ok(pending) => Some(pending),
                    Err(e) => {
                        self.toasts.error(format!("Check failed: {}", e.reason()));
                        None
                    }
                };
                self.set_candidate(CandidateState {
                    candidate: Some(candidate),
                    pending,
                    checking: false,
                });
            }
            Completion::Write(WriteEvent::Phase { stamp, kind, phase }) => {
                self.state.panel.set_write_phase(&stamp, kind, phase);
            }
            Completion::Write(WriteEvent::Done {
                stamp,
                call,
                result,
            }) => {
                if !self.state.panel.is_current(&stamp) {
                    log::debug!(
                        "{} settled under {}; binding moved on",
                        call.kind().label(),
                        stamp
                    );
                    return;
                }
                if result.is_err() {
                    return;
                }
                if let WriteCall::VoteForDeveloper { candidate, .. } = call {
                    if let Some(bound) = self.bound.clone() {
                        if self.state.candidate.candidate == Some(candidate) {
                            let mut state = self.state.candidate.clone();
                            state.checking = true;
                            self.set_candidate(state);
                        }
                        self.spawn_candidate_check(bound, candidate);
                    }
                }
                self.issue_refresh();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_status() {
        let mut snapshot = DeveloperSnapshot::default();
        assert_eq!(snapshot.status(), RegistrationStatus::Unregistered);
        snapshot.has_pending_request = true;
        assert_eq!(snapshot.status(), RegistrationStatus::RequestPending);
        snapshot.is_developer = true;
        assert_eq!(snapshot.status(), RegistrationStatus::Registered);
    }
}
