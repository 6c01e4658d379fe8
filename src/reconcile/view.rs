// Panel state shared by the reconciliation loops
//
// Every mutation that originates from a remote call carries the key it was
// issued under. A mutation whose key differs from the panel's current key is
// dropped without touching anything.

use std::collections::BTreeMap;
use tokio::time::Instant;

use crate::binding::BindingKey;
use crate::writes::{WriteKind, WritePhase};

/// Outcome of completing a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    Failed,
    Stale,
}

#[derive(Debug, Clone)]
pub struct PanelState<T> {
    pub key: Option<BindingKey>,
    pub snapshot: Option<T>,
    /// Incremented on every applied mutation
    pub version: u64,
    pub loading: bool,
    /// Inline error from the last failed read
    pub error: Option<String>,
    pub writes: BTreeMap<WriteKind, WritePhase>,
    pub next_poll_at: Option<Instant>,
    in_flight: usize,
}

impl<T> Default for PanelState<T> {
    fn default() -> Self {
        Self {
            key: None,
            snapshot: None,
            version: 0,
            loading: false,
            error: None,
            writes: BTreeMap::new(),
            next_poll_at: None,
            in_flight: 0,
        }
    }
}

impl<T> PanelState<T> {
    pub fn is_current(&self, stamp: &BindingKey) -> bool {
        self.key.as_ref() == Some(stamp)
    }

    /// Switch to a new binding, dropping everything tied to the old one
    pub fn rebind(&mut self, key: Option<BindingKey>) {
        self.key = key;
        self.snapshot = None;
        self.error = None;
        self.loading = false;
        self.writes.clear();
        self.in_flight = 0;
        self.version += 1;
    }

    /// Stamp a new read with the current key
    pub fn begin_refresh(&mut self) -> Option<BindingKey> {
        let key = self.key?;
        self.in_flight += 1;
        self.loading = true;
        Some(key)
    }

    pub fn finish_refresh(&mut self, stamp: &BindingKey, result: Result<T, String>) -> Applied {
        if !self.is_current(stamp) {
            return Applied::Stale;
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        self.loading = self.in_flight > 0;
        self.version += 1;
        match result {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
                self.error = None;
                Applied::Updated
            }
            Err(reason) => {
                self.error = Some(reason);
                Applied::Failed
            }
        }
    }

    /// Apply a pushed change to the snapshot
    pub fn apply_push<F>(&mut self, stamp: &BindingKey, update: F) -> bool
    where
        T: Default,
        F: FnOnce(&mut T),
    {
        if !self.is_current(stamp) {
            return false;
        }
        update(self.snapshot.get_or_insert_with(T::default));
        self.version += 1;
        true
    }

    /// Mutate the snapshot in place (stamp-checked)
    pub fn update_snapshot<F>(&mut self, stamp: &BindingKey, update: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        if !self.is_current(stamp) {
            return false;
        }
        match self.snapshot.as_mut() {
            Some(snapshot) => {
                update(snapshot);
                self.version += 1;
                true
            }
            None => false,
        }
    }

    pub fn set_write_phase(&mut self, stamp: &BindingKey, kind: WriteKind, phase: WritePhase) -> bool {
        if !self.is_current(stamp) {
            return false;
        }
        self.writes.insert(kind, phase);
        self.version += 1;
        true
    }

    pub fn write_phase(&self, kind: WriteKind) -> WritePhase {
        self.writes.get(&kind).cloned().unwrap_or(WritePhase::Idle)
    }

    pub fn is_write_pending(&self, kind: WriteKind) -> bool {
        self.writes.get(&kind).map_or(false, WritePhase::is_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    fn key(account: u8, epoch: u64) -> BindingKey {
        let mut bytes = [0u8; 20];
        bytes[19] = account;
        BindingKey {
            contract: Address::repeat_byte(0xcc),
            account: Address::from(bytes),
            epoch,
        }
    }

    #[test]
    fn test_stale_refresh_is_discarded() {
        let mut state = PanelState::<u64>::default();
        state.rebind(Some(key(1, 1)));
        let stamp = state.begin_refresh().unwrap();

        state.rebind(Some(key(2, 2)));
        let version = state.version;
        assert_eq!(state.finish_refresh(&stamp, Ok(42)), Applied::Stale);
        assert_eq!(state.snapshot, None);
        assert_eq!(state.version, version);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_same_addresses_new_epoch_is_stale() {
        let mut state = PanelState::<u64>::default();
        state.rebind(Some(key(1, 1)));
        let stamp = state.begin_refresh().unwrap();
        state.rebind(Some(key(1, 2)));
        assert_eq!(state.finish_refresh(&stamp, Ok(7)), Applied::Stale);
    }

    #[test]
    fn test_failure_sets_inline_error_until_next_success() {
        let mut state = PanelState::<u64>::default();
        state.rebind(Some(key(1, 1)));

        let stamp = state.begin_refresh().unwrap();
        assert_eq!(
            state.finish_refresh(&stamp, Err("rpc down".into())),
            Applied::Failed
        );
        assert_eq!(state.error.as_deref(), Some("rpc down"));

        let stamp = state.begin_refresh().unwrap();
        assert_eq!(state.finish_refresh(&stamp, Ok(5)), Applied::Updated);
        assert!(state.error.is_none());
        assert_eq!(state.snapshot, Some(5));
    }

    #[test]
    fn test_overlapping_refreshes_track_loading() {
        let mut state = PanelState::<u64>::default();
        state.rebind(Some(key(1, 1)));
        let first = state.begin_refresh().unwrap();
        let second = state.begin_refresh().unwrap();
        state.finish_refresh(&first, Ok(1));
        assert!(state.loading);
        state.finish_refresh(&second, Ok(2));
        assert!(!state.loading);
        assert_eq!(state.snapshot, Some(2));
    }

    #[test]
    fn test_unbound_panel_issues_nothing() {
        let mut state = PanelState::<u64>::default();
        assert!(state.begin_refresh().is_none());
        assert!(!state.loading);
    }

    #[test]
    fn test_push_and_write_phase_are_stamp_checked() {
        let mut state = PanelState::<u64>::default();
        state.rebind(Some(key(1, 1)));
        let old = key(1, 1);
        state.rebind(Some(key(1, 2)));

        assert!(!state.apply_push(&old, |v| *v = 9));
        assert!(!state.set_write_phase(&old, WriteKind::Fund, WritePhase::Submitting));
        assert_eq!(state.write_phase(WriteKind::Fund), WritePhase::Idle);

        let current = key(1, 2);
        assert!(state.apply_push(&current, |v| *v = 9));
        assert_eq!(state.snapshot, Some(9));
        assert!(state.set_write_phase(
            &current,
            WriteKind::Fund,
            WritePhase::AwaitingConfirmation { tx_hash: B256::ZERO }
        ));
        assert!(state.is_write_pending(WriteKind::Fund));
    }
}
