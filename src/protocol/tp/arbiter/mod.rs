//! Bus arbiter: advertises when a broadcast transfer holds the bus so
//! single-frame traffic defers instead of interleaving with it.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::protocol::tp::session::MAX_CONCURRENT_SESSIONS;
use crate::protocol::tp::SessionKey;

/// Claims tracked at once: every receive slot plus our own transmission,
/// with one spare.
const MAX_ACTIVE_CLAIMS: usize = MAX_CONCURRENT_SESSIONS + 2;

/// Busy flag, latch deadline, and the set of claiming session keys.
#[derive(Debug)]
struct ArbiterState {
    busy: bool,
    busy_deadline_ms: u64,
    active: [Option<SessionKey>; MAX_ACTIVE_CLAIMS],
}

/// Shared bus-busy state. All accessors hold the internal mutex only for
/// O(1) bookkeeping; no I/O happens under the lock.
pub struct BusArbiter {
    state: Mutex<CriticalSectionRawMutex, RefCell<ArbiterState>>,
}

impl Default for BusArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl BusArbiter {
    /// Instantiate an idle arbiter.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(ArbiterState {
                busy: false,
                busy_deadline_ms: 0,
                active: [None; MAX_ACTIVE_CLAIMS],
            })),
        }
    }

    /// True when no broadcast holds the bus.
    ///
    /// A claim whose deadline has passed is treated as a timed-out session:
    /// the busy latch is dropped and every claim is cleared.
    pub fn is_available(&self, now_ms: u64) -> bool {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if !state.busy {
                return true;
            }
            if now_ms > state.busy_deadline_ms {
                #[cfg(feature = "defmt")]
                defmt::warn!("Broadcast session timed out, releasing bus");
                state.busy = false;
                state.active = [None; MAX_ACTIVE_CLAIMS];
                return true;
            }
            false
        })
    }

    /// Record `key` as holding the bus until `deadline_ms`.
    ///
    /// Claiming an already-claimed key only refreshes the deadline. Later
    /// claims overwrite earlier deadlines; the latch clears when the last
    /// holder releases or the newest deadline passes.
    pub fn claim(&self, key: SessionKey, deadline_ms: u64) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.busy = true;
            state.busy_deadline_ms = deadline_ms;

            if state.active.iter().any(|slot| *slot == Some(key)) {
                return;
            }
            match state.active.iter_mut().find(|slot| slot.is_none()) {
                Some(slot) => *slot = Some(key),
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Arbiter claim set full, dropping key {=u16:x}", key);
                }
            }
        });
    }

    /// Drop the claim held by `key`; the busy latch clears when no claims
    /// remain.
    pub fn release(&self, key: SessionKey) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            for slot in state.active.iter_mut() {
                if *slot == Some(key) {
                    *slot = None;
                }
            }
            if state.active.iter().all(|slot| slot.is_none()) {
                state.busy = false;
            }
        });
    }

    /// True when `key` currently holds a claim.
    pub fn holds(&self, key: SessionKey) -> bool {
        self.state.lock(|state| {
            state
                .borrow()
                .active
                .iter()
                .any(|slot| *slot == Some(key))
        })
    }

    /// Number of keys currently holding claims.
    pub fn active_claims(&self) -> usize {
        self.state.lock(|state| {
            state
                .borrow()
                .active
                .iter()
                .filter(|slot| slot.is_some())
                .count()
        })
    }
}
