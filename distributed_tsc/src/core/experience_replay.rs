//! Bounded per-agent trajectory replay shared by actors and one learner.
//!
//! # Access pattern
//!
//! ```text
//! Actor 0 ─┐ append()
//! Actor 1 ─┼────────────► VecDeque<Arc<Trajectory>> ◄──── sample() / trim()
//! Actor N ─┘                  (RwLock)                      owning Learner
//! ```
//!
//! Appends are unbounded between trims; the owning learner calls [`trim`]
//! after every training round to evict the oldest entries. A sample holds the
//! read guard while indexing, so concurrent appends and trims can only make
//! it observe a length that is one operation stale, never an out-of-range
//! index.
//!
//! [`trim`]: ExperienceReplay::trim

use crate::core::experience::Trajectory;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// FIFO trajectory buffer with capacity-based eviction.
pub struct ExperienceReplay {
    storage: RwLock<VecDeque<Arc<Trajectory>>>,
    capacity: usize,
    /// Monotonic count of every trajectory ever appended.
    total_appended: AtomicU64,
}

impl ExperienceReplay {
    /// Create an empty replay. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            total_appended: AtomicU64::new(0),
        }
    }

    /// Tail-insert a trajectory.
    pub fn append(&self, trajectory: Trajectory) {
        self.storage.write().push_back(Arc::new(trajectory));
        self.total_appended.fetch_add(1, Ordering::AcqRel);
    }

    /// Tail-insert many trajectories (checkpoint restore).
    pub fn extend<I: IntoIterator<Item = Trajectory>>(&self, trajectories: I) {
        let mut guard = self.storage.write();
        let before = guard.len();
        guard.extend(trajectories.into_iter().map(Arc::new));
        let added = (guard.len() - before) as u64;
        drop(guard);
        self.total_appended.fetch_add(added, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.storage.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the replay holds at least `capacity` trajectories.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended.load(Ordering::Acquire)
    }

    /// Draw `count` trajectories uniformly with replacement.
    ///
    /// Returns an empty vector when the replay is empty.
    pub fn sample(&self, count: usize) -> Vec<Arc<Trajectory>> {
        let guard = self.storage.read();
        let len = guard.len();
        if len == 0 {
            return Vec::new();
        }
        let mut rng = fastrand::Rng::new();
        (0..count)
            .map(|_| Arc::clone(&guard[rng.usize(0..len)]))
            .collect()
    }

    /// Evict the oldest `len - capacity` trajectories. Returns how many were removed.
    pub fn trim(&self) -> usize {
        let mut guard = self.storage.write();
        let excess = guard.len().saturating_sub(self.capacity);
        guard.drain(..excess);
        excess
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Trajectory> {
        self.storage
            .read()
            .iter()
            .map(|t| (**t).clone())
            .collect()
    }

    /// Largest absolute reward held in the replay.
    pub fn max_abs_reward(&self) -> f32 {
        self.storage
            .read()
            .iter()
            .map(|t| t.max_abs_reward())
            .fold(0.0, f32::max)
    }
}

/// Shared handle to a replay.
pub type SharedReplay = Arc<ExperienceReplay>;

/// Create a new shared replay with the given capacity.
pub fn shared_replay(capacity: usize) -> SharedReplay {
    Arc::new(ExperienceReplay::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::experience::{Action, Experience};
    use proptest::prelude::*;
    use std::thread;

    fn traj(tag: f32) -> Trajectory {
        Trajectory::from_steps(vec![Experience::new(
            vec![tag],
            Action::Discrete(0),
            vec![tag + 1.0],
            -tag,
            false,
        )])
    }

    #[test]
    fn test_append_and_len() {
        let replay = ExperienceReplay::new(4);
        assert!(replay.is_empty());
        replay.append(traj(1.0));
        replay.append(traj(2.0));
        assert_eq!(replay.len(), 2);
        assert_eq!(replay.total_appended(), 2);
        assert!(!replay.is_full());
    }

    #[test]
    fn test_zero_capacity_raised() {
        assert_eq!(ExperienceReplay::new(0).capacity(), 1);
    }

    #[test]
    fn test_trim_drops_oldest() {
        let replay = ExperienceReplay::new(3);
        for i in 0..5 {
            replay.append(traj(i as f32));
        }
        assert_eq!(replay.trim(), 2);
        assert_eq!(replay.len(), 3);
        let kept = replay.snapshot();
        assert_eq!(kept[0].steps()[0].state, vec![2.0]);
        assert_eq!(kept[2].steps()[0].state, vec![4.0]);
        assert_eq!(replay.trim(), 0);
        // Appends keep counting past trims.
        assert_eq!(replay.total_appended(), 5);
    }

    #[test]
    fn test_sample_empty() {
        let replay = ExperienceReplay::new(3);
        assert!(replay.sample(8).is_empty());
    }

    #[test]
    fn test_sample_with_replacement() {
        let replay = ExperienceReplay::new(10);
        replay.append(traj(1.0));
        let batch = replay.sample(5);
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|t| t.steps()[0].state == vec![1.0]));
    }

    #[test]
    fn test_sample_draws_from_contents() {
        let replay = ExperienceReplay::new(10);
        for i in 0..7 {
            replay.append(traj(i as f32));
        }
        let batch = replay.sample(100);
        assert_eq!(batch.len(), 100);
        assert!(batch.iter().all(|t| (0.0..7.0).contains(&t.steps()[0].state[0])));
    }

    #[test]
    fn test_extend_and_snapshot() {
        let replay = ExperienceReplay::new(10);
        replay.extend(vec![traj(1.0), traj(5.0)]);
        assert_eq!(replay.total_appended(), 2);
        let snap = replay.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(replay.max_abs_reward(), 5.0);
    }

    #[test]
    fn test_concurrent_appenders_and_trimmer() {
        let replay = shared_replay(50);
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let replay = Arc::clone(&replay);
                thread::spawn(move || {
                    for i in 0..500 {
                        replay.append(traj((w * 1000 + i) as f32));
                    }
                })
            })
            .collect();

        let reader = {
            let replay = Arc::clone(&replay);
            thread::spawn(move || {
                for _ in 0..500 {
                    let batch = replay.sample(8);
                    assert!(batch.len() == 8 || batch.is_empty());
                    replay.trim();
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        replay.trim();
        assert_eq!(replay.len(), 50);
        assert_eq!(replay.total_appended(), 2000);
    }

    proptest! {
        #[test]
        fn prop_len_within_capacity_after_trim(capacity in 1usize..64, appends in 0usize..256) {
            let replay = ExperienceReplay::new(capacity);
            for i in 0..appends {
                replay.append(traj(i as f32));
            }
            replay.trim();
            prop_assert!(replay.len() <= capacity);
            prop_assert_eq!(replay.len(), appends.min(capacity));
        }
    }
}
