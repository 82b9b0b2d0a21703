use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tokio::time::Instant;

use super::schedule::{ProbeMessage, Schedule};

/// Pending probe timers for one session, ordered by due time then by
/// schedule position.
#[derive(Debug, Default)]
pub(crate) struct ProbeTimers {
    queue: BinaryHeap<Reverse<(Instant, usize)>>,
    probes: Vec<ProbeMessage>,
}

impl ProbeTimers {
    /// Arm one timer per probe at `opened_at + delay`.
    pub(crate) fn arm_all(&mut self, opened_at: Instant, schedule: &Schedule) {
        self.cancel_all();
        for (seq, probe) in schedule.iter().enumerate() {
            self.queue.push(Reverse((opened_at + probe.delay(), seq)));
            self.probes.push(probe.clone());
        }
    }

    /// When the next probe is due, if any.
    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.queue.peek().map(|Reverse((at, _))| *at)
    }

    /// Remove and return the earliest probe.
    pub(crate) fn pop_next(&mut self) -> Option<ProbeMessage> {
        let Reverse((_, seq)) = self.queue.pop()?;
        self.probes.get(seq).cloned()
    }

    pub(crate) fn cancel_all(&mut self) {
        self.queue.clear();
        self.probes.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
