//! Endpoint lifecycle state machine.
//!
//! Every endpoint moves through at most three states, in one direction only:
//!
//! ```text
//! OPEN ──▶ CLOSING ──▶ CLOSED
//! ```
//!
//! The caller (or a worker error) requests shutdown by advancing to
//! `CLOSING`; the final step to `CLOSED` is performed exclusively by the
//! worker after it has released its OS resources.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle states of a TCP endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
#[allow(non_camel_case_types)]
pub enum EndpointState {
    /// The endpoint is live: its worker is pumping bytes or connections.
    OPEN,
    /// Shutdown was requested; the worker is draining its cleanup.
    CLOSING,
    /// The socket has been closed and the worker has terminated.
    CLOSED,
}

impl EndpointState {
    fn from_u8(value: u8) -> EndpointState {
        match value {
            0 => EndpointState::OPEN,
            1 => EndpointState::CLOSING,
            _ => EndpointState::CLOSED,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EndpointState::OPEN => 0,
            EndpointState::CLOSING => 1,
            EndpointState::CLOSED => 2,
        }
    }
}

/// Shared state holder for one endpoint.
///
/// The mutex-guarded value is authoritative. A relaxed atomic mirror serves
/// unlocked hint reads; any decision based on the hint must be reconfirmed
/// under the lock before mutating other endpoint data.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<EndpointState>,
    hint: AtomicU8,
}

impl StateCell {
    /// Creates a cell in the `OPEN` state.
    pub fn new() -> StateCell {
        StateCell {
            state: Mutex::new(EndpointState::OPEN),
            hint: AtomicU8::new(EndpointState::OPEN.as_u8()),
        }
    }

    /// Returns the current state, read under the lock.
    pub fn get(&self) -> EndpointState {
        *self.state.lock().unwrap()
    }

    /// Advances to `next` if it is further along the lifecycle than the
    /// current state. Transitions never move backwards.
    pub fn advance(&self, next: EndpointState) {
        let mut state = self.state.lock().unwrap();
        if next > *state {
            *state = next;
            self.hint.store(next.as_u8(), Ordering::Relaxed);
        }
    }

    /// Returns whether the endpoint is `OPEN`. Authoritative (locked).
    pub fn is_open(&self) -> bool {
        self.get() == EndpointState::OPEN
    }

    /// Returns whether the endpoint was `OPEN` at an unlocked glance.
    ///
    /// Cheap hint for hot paths; callers that act on it must reconfirm with
    /// [StateCell::is_open].
    pub fn may_be_open(&self) -> bool {
        EndpointState::from_u8(self.hint.load(Ordering::Relaxed)) == EndpointState::OPEN
    }
}

impl Default for StateCell {
    fn default() -> StateCell {
        StateCell::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_starts_open() {
        let cell = StateCell::new();

        assert_eq!(cell.get(), EndpointState::OPEN);
        assert!(cell.is_open());
        assert!(cell.may_be_open());
    }

    #[test]
    fn state_advances_forward() {
        let cell = StateCell::new();

        cell.advance(EndpointState::CLOSING);
        assert_eq!(cell.get(), EndpointState::CLOSING);
        assert!(!cell.is_open());
        assert!(!cell.may_be_open());

        cell.advance(EndpointState::CLOSED);
        assert_eq!(cell.get(), EndpointState::CLOSED);
    }

    #[test]
    fn state_never_moves_backwards() {
        let cell = StateCell::new();

        cell.advance(EndpointState::CLOSED);
        cell.advance(EndpointState::CLOSING);
        assert_eq!(cell.get(), EndpointState::CLOSED);

        cell.advance(EndpointState::OPEN);
        assert_eq!(cell.get(), EndpointState::CLOSED);
    }

    #[test]
    fn state_skipping_closing_is_allowed() {
        let cell = StateCell::new();

        cell.advance(EndpointState::CLOSED);
        assert_eq!(cell.get(), EndpointState::CLOSED);
        assert!(!cell.may_be_open());
    }

    #[test]
    fn state_repeated_advance_is_noop() {
        let cell = StateCell::new();

        cell.advance(EndpointState::CLOSING);
        cell.advance(EndpointState::CLOSING);
        assert_eq!(cell.get(), EndpointState::CLOSING);
    }
}
