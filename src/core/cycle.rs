//! Bounded retry state for dependency cycles
//!
//! A cycle is handled as one unit per pass. Each pass over a cycle advances
//! its pass counter; passes in which no member settles (starts building or
//! finishes) count towards the stall limit, unless the cycle is waiting on
//! running jobs or on a free builder. A stalled cycle is no longer
//! retried and its members stay `blocked`.

use std::collections::BTreeMap;

use crate::config::defaults;
use crate::core::resolver::Cycle;

/// Outcome of advancing a cycle by one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Members may be tried with intra-cycle dependencies relaxed
    Resolving {
        /// Pass number for this cycle, starting at 1
        pass: u32,
    },
    /// No progress within the pass limit
    Stalled {
        /// Passes without progress
        idle_passes: u32,
    },
}

/// Retry bookkeeping for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleState {
    passes: u32,
    last_progress: u32,
    settled: usize,
}

impl CycleState {
    /// Advance by one pass
    ///
    /// `settled` is the number of members that are building or finished,
    /// `waiting` is set while the cycle waits on a running job or a builder.
    pub fn advance(&mut self, settled: usize, waiting: bool, max_passes: u32) -> CyclePhase {
        self.passes += 1;
        if waiting || settled > self.settled {
            self.last_progress = self.passes;
        }
        self.settled = self.settled.max(settled);

        let idle_passes = self.passes - self.last_progress;
        if idle_passes >= max_passes {
            CyclePhase::Stalled { idle_passes }
        } else {
            CyclePhase::Resolving { pass: self.passes }
        }
    }

    /// Passes evaluated so far
    pub fn passes(&self) -> u32 {
        self.passes
    }
}

/// Cycle states of one engine run, keyed by member set
///
/// Cycle ids are only stable within one graph, so states are keyed by the
/// sorted member list and survive graph rebuilds.
#[derive(Debug, Clone)]
pub struct CycleTracker {
    max_passes: u32,
    states: BTreeMap<Vec<String>, CycleState>,
}

impl Default for CycleTracker {
    fn default() -> Self {
        Self::new(defaults::MAX_CYCLE_PASSES)
    }
}

impl CycleTracker {
    /// Create a tracker with the given stall limit (at least 1)
    pub fn new(max_passes: u32) -> Self {
        Self {
            max_passes: max_passes.max(1),
            states: BTreeMap::new(),
        }
    }

    /// Advance `cycle` by one pass
    pub fn advance(&mut self, cycle: &Cycle, settled: usize, waiting: bool) -> CyclePhase {
        let phase = self
            .states
            .entry(cycle.members.clone())
            .or_default()
            .advance(settled, waiting, self.max_passes);
        if let CyclePhase::Stalled { idle_passes } = phase {
            tracing::warn!(
                "Cycle {} made no progress in {} passes",
                cycle.describe(),
                idle_passes
            );
        }
        phase
    }

    /// State of `cycle`, if it was ever evaluated
    pub fn state(&self, cycle: &Cycle) -> Option<&CycleState> {
        self.states.get(&cycle.members)
    }

    /// Configured stall limit
    pub fn max_passes(&self) -> u32 {
        self.max_passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(members: &[&str]) -> Cycle {
        Cycle {
            id: 0,
            members: members.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_stalls_after_limit_without_progress() {
        let mut state = CycleState::default();
        assert_eq!(state.advance(0, false, 3), CyclePhase::Resolving { pass: 1 });
        assert_eq!(state.advance(0, false, 3), CyclePhase::Resolving { pass: 2 });
        assert_eq!(state.advance(0, false, 3), CyclePhase::Stalled { idle_passes: 3 });
        assert_eq!(state.passes(), 3);
    }

    #[test]
    fn test_progress_resets_idle_count() {
        let mut state = CycleState::default();
        state.advance(0, false, 2);
        assert_eq!(state.advance(1, false, 2), CyclePhase::Resolving { pass: 2 });
        assert_eq!(state.advance(1, false, 2), CyclePhase::Resolving { pass: 3 });
        assert!(matches!(state.advance(1, false, 2), CyclePhase::Stalled { .. }));
    }

    #[test]
    fn test_waiting_is_not_idle() {
        let mut state = CycleState::default();
        for _ in 0..10 {
            assert!(matches!(
                state.advance(0, true, 2),
                CyclePhase::Resolving { .. }
            ));
        }
    }

    #[test]
    fn test_tracker_survives_id_changes() {
        let mut tracker = CycleTracker::new(5);
        let mut first = cycle(&["a", "b"]);
        tracker.advance(&first, 0, false);
        first.id = 7;
        tracker.advance(&first, 0, false);

        assert_eq!(tracker.state(&cycle(&["a", "b"])).unwrap().passes(), 2);
        assert!(tracker.state(&cycle(&["c", "d"])).is_none());
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(CycleTracker::new(0).max_passes(), 1);
    }
}
