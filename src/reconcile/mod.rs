//! Reconciliation loops
//!
//! Each panel is driven by one task that owns its state and consumes four
//! sources through `tokio::select!`: commands from handles, completions of
//! spawned reads and writes, pushed contract events and the poll timer.
//! Reads may overlap; every completion is checked against the panel's
//! current binding key before it is applied.

pub mod developer;
pub mod funding;
mod schedule;
mod view;

pub use developer::{
    CandidateState, DeveloperHandle, DeveloperSnapshot, DeveloperState, RegistrationStatus,
};
pub use funding::{FundingHandle, FundingSnapshot, FundingState};
pub use schedule::PollSchedule;
pub use view::{Applied, PanelState};

use alloy_primitives::B256;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::binding::{BindingKey, Bound};
use crate::error::DashboardError;
use crate::toasts::ToastQueue;
use crate::writes::{run_two_phase, WriteCall, WriteKind, WritePhase};

/// Reply channel for commands that can be refused up front
pub(crate) type Ack = oneshot::Sender<Result<(), DashboardError>>;

/// Progress of a spawned write, reported back to the owning loop
#[derive(Debug)]
pub(crate) enum WriteEvent {
    Phase {
        stamp: BindingKey,
        kind: WriteKind,
        phase: WritePhase,
    },
    Done {
        stamp: BindingKey,
        call: WriteCall,
        result: Result<B256, DashboardError>,
    },
}

pub(crate) async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub(crate) async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Refuse a write that cannot start under the current binding
pub(crate) fn check_write<'a, T>(
    bound: Option<&'a Bound>,
    state: &PanelState<T>,
    kind: WriteKind,
) -> Result<&'a Bound, DashboardError> {
    let bound = bound.ok_or_else(DashboardError::not_connected)?;
    if state.is_write_pending(kind) {
        return Err(DashboardError::Precondition(format!(
            "{} already in progress",
            kind.label()
        )));
    }
    Ok(bound)
}

/// Run a write in its own task
///
/// Toasts are raised from the task itself, so the outcome is reported even
/// if the binding changed meanwhile.
pub(crate) fn spawn_write<C, W>(
    bound: &Bound,
    call: WriteCall,
    toasts: &ToastQueue,
    completions: &mpsc::UnboundedSender<C>,
    wrap: W,
) where
    C: Send + 'static,
    W: Fn(WriteEvent) -> C + Send + Sync + 'static,
{
    let gateway = bound.gateway.clone();
    let stamp = bound.key;
    let toasts = toasts.clone();
    let completions = completions.clone();

    tokio::spawn(async move {
        let kind = call.kind();
        let result = run_two_phase(gateway.as_ref(), &call, |phase| {
            if matches!(phase, WritePhase::AwaitingConfirmation { .. }) {
                if let Some(message) = call.submitted_message() {
                    toasts.info(message);
                }
            }
            let _ = completions.send(wrap(WriteEvent::Phase { stamp, kind, phase }));
        })
        .await;

        match &result {
            Ok(_) => {
                toasts.success(call.confirmed_message());
            }
            Err(e) => {
                toasts.failure(call.failed_message(e));
            }
        }
        let _ = completions.send(wrap(WriteEvent::Done {
            stamp,
            call,
            result,
        }));
    });
}
