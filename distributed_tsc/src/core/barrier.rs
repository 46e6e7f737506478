//! Reusable counting barrier for worker rendezvous.
//!
//! A run goes through two rendezvous phases with the same participant set:
//!
//! ```text
//! Learners: publish weights ──► wait() ── build agents ──────────► wait() ── train
//! Actors:   build networks ───► wait() ── read weights, offset ──► wait() ── act
//!                               phase 1                            phase 2
//! ```
//!
//! Each phase releases its cohort once the N-th participant arrives and
//! resets for the next cohort. There is no timeout: a participant that never
//! arrives stalls everyone else.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Outcome of a [`Barrier::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
    generation: u64,
}

impl BarrierWaitResult {
    /// True for exactly one participant per released cohort (the last arrival).
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Phase index this wait belonged to, starting at 0.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Multi-phase rendezvous for a fixed number of participants.
pub struct Barrier {
    participants: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl Barrier {
    /// Create a barrier for `participants` workers. Zero is treated as one.
    pub fn new(participants: usize) -> Self {
        Self {
            participants: participants.max(1),
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Number of participants per phase.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Number of completed phases.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Block until all participants of the current phase have arrived.
    pub fn wait(&self) -> BarrierWaitResult {
        let mut state = self.state.lock();
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.participants {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return BarrierWaitResult {
                is_leader: true,
                generation,
            };
        }

        // Spurious wakeups: only leave once the generation has moved on.
        while state.generation == generation {
            self.cvar.wait(&mut state);
        }

        BarrierWaitResult {
            is_leader: false,
            generation,
        }
    }
}

/// Shared handle to a barrier.
pub type SharedBarrier = Arc<Barrier>;

/// Create a new shared barrier.
pub fn barrier(participants: usize) -> SharedBarrier {
    Arc::new(Barrier::new(participants))
}
