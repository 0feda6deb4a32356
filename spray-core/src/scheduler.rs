//! Broadcast rotation: which queued message to offer next, and when to look again.

use std::time::Duration;

use crate::config::Config;
use crate::queue::{EntryId, ForwardQueue};

/// Outcome of one rotation timer fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Queue empty; nothing to offer.
    Idle,
    /// Entry has no copies left to spray; it stays queued waiting for the destination.
    Skip(EntryId),
    /// Offer this entry. `end_of_pass` when it is the tail of the rotation.
    Send { id: EntryId, end_of_pass: bool },
}

impl Step {
    /// Delay before the next rotation fire.
    pub fn next_delay(&self, config: &Config) -> Duration {
        match self {
            Step::Idle => config.queue_delay,
            Step::Skip(_) => config.packet_delay,
            Step::Send {
                end_of_pass: true, ..
            } => config.queue_delay,
            Step::Send {
                end_of_pass: false, ..
            } => config.packet_delay,
        }
    }
}

/// Round-robin cursor over the forward queue.
#[derive(Debug, Default)]
pub struct BroadcastScheduler {
    last_visited: Option<EntryId>,
}

impl BroadcastScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the entry after the last one visited and classify it.
    /// Skipped entries advance the cursor too, so one exhausted entry cannot stall the rotation.
    pub fn next(&mut self, queue: &ForwardQueue) -> Step {
        let Some(entry) = queue.next_after(self.last_visited) else {
            return Step::Idle;
        };
        let id = entry.id;
        self.last_visited = Some(id);
        if entry.header.num_copies < 1 {
            return Step::Skip(id);
        }
        Step::Send {
            id,
            end_of_pass: queue.is_last(id),
        }
    }

    pub fn last_visited(&self) -> Option<EntryId> {
        self.last_visited
    }

    pub fn reset(&mut self) {
        self.last_visited = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NodeAddr;
    use crate::protocol::{Header, Payload};

    fn queue_with(copies: &[u16]) -> (ForwardQueue, Vec<EntryId>) {
        let mut q = ForwardQueue::new(5);
        let ids = copies
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let h = Header::new(
                    NodeAddr::from_bytes([1, 0]),
                    NodeAddr::from_bytes([2, 0]),
                    i as u16,
                    c,
                );
                q.enqueue(h, Payload::new([0; 10]), Duration::from_secs(60))
                    .unwrap()
            })
            .collect();
        (q, ids)
    }

    #[test]
    fn empty_queue_is_idle() {
        let q = ForwardQueue::new(5);
        let mut s = BroadcastScheduler::new();
        let step = s.next(&q);
        assert_eq!(step, Step::Idle);
        assert_eq!(step.next_delay(&Config::default()), Config::default().queue_delay);
    }

    #[test]
    fn full_pass_visits_every_sprayable_entry_in_order() {
        let (q, ids) = queue_with(&[8, 0, 4, 2]);
        let mut s = BroadcastScheduler::new();
        let cfg = Config::default();

        let steps: Vec<Step> = (0..4).map(|_| s.next(&q)).collect();
        assert_eq!(
            steps,
            vec![
                Step::Send { id: ids[0], end_of_pass: false },
                Step::Skip(ids[1]),
                Step::Send { id: ids[2], end_of_pass: false },
                Step::Send { id: ids[3], end_of_pass: true },
            ]
        );
        assert_eq!(steps[0].next_delay(&cfg), cfg.packet_delay);
        assert_eq!(steps[1].next_delay(&cfg), cfg.packet_delay);
        assert_eq!(steps[3].next_delay(&cfg), cfg.queue_delay);

        // Second pass starts over at the head.
        assert_eq!(
            s.next(&q),
            Step::Send { id: ids[0], end_of_pass: false }
        );
    }

    #[test]
    fn retired_cursor_continues_with_successor() {
        let (mut q, ids) = queue_with(&[8, 8, 8, 8]);
        let mut s = BroadcastScheduler::new();
        s.next(&q);
        s.next(&q);
        assert_eq!(s.last_visited(), Some(ids[1]));
        q.remove(ids[1]);
        assert_eq!(
            s.next(&q),
            Step::Send { id: ids[2], end_of_pass: false }
        );
        assert_eq!(s.next(&q), Step::Send { id: ids[3], end_of_pass: true });

        // Tail retired under the cursor: the next pass starts at the head.
        q.remove(ids[3]);
        assert_eq!(
            s.next(&q),
            Step::Send { id: ids[0], end_of_pass: false }
        );
        s.reset();
        assert_eq!(s.last_visited(), None);
    }

    #[test]
    fn single_entry_is_always_end_of_pass() {
        let (q, ids) = queue_with(&[1]);
        let mut s = BroadcastScheduler::new();
        for _ in 0..3 {
            assert_eq!(s.next(&q), Step::Send { id: ids[0], end_of_pass: true });
        }
    }
}
