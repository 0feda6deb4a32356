//! Host-driven API: SprayWaitCore receives events from the host, returns actions.
//!
//! The host owns the link and the timers. It feeds one `Event` at a time into
//! [`SprayWaitCore::handle`] and performs the returned actions in order.

use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::copies;
use crate::identity::NodeAddr;
use crate::protocol::{Header, PacketKey, Payload};
use crate::queue::{Entry, EntryId, ForwardQueue, QueueFull};
use crate::scheduler::{BroadcastScheduler, Step};
use crate::wire;

/// Timers the engine asks the host to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// The single recurring rotation timer.
    Broadcast,
    /// Expiry of one queue entry.
    Lifetime(EntryId),
}

/// Input from the host: link receptions, reliable-link outcomes, timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BroadcastReceived { from: NodeAddr, bytes: Vec<u8> },
    UnicastReceived { from: NodeAddr, bytes: Vec<u8> },
    ReliableReceived { from: NodeAddr, bytes: Vec<u8> },
    /// The last reliable send was acknowledged.
    ReliableSent { to: NodeAddr },
    /// The last reliable send ran out of attempts.
    ReliableTimedOut { to: NodeAddr },
    TimerFired(Timer),
}

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send to every neighbour.
    Broadcast(Vec<u8>),
    /// Best-effort single-hop send.
    Unicast { to: NodeAddr, bytes: Vec<u8> },
    /// Acknowledged single-hop send; the host reports `ReliableSent` or `ReliableTimedOut`.
    Reliable {
        to: NodeAddr,
        bytes: Vec<u8>,
        max_attempts: u8,
    },
    /// Arm, or re-arm, a timer.
    SetTimer { timer: Timer, after: Duration },
    StopTimer(Timer),
    /// A message addressed to this node arrived.
    Deliver { header: Header, payload: Payload },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OriginateError {
    #[error(transparent)]
    QueueFull(#[from] QueueFull),
}

/// Main coordinator. One per node.
pub struct SprayWaitCore {
    address: NodeAddr,
    config: Config,
    open: bool,
    next_sequence_id: u16,
    queue: ForwardQueue,
    scheduler: BroadcastScheduler,
    /// Key of the entry behind the one reliable hand-off in flight.
    pending_handoff: Option<PacketKey>,
}

impl SprayWaitCore {
    pub fn new(address: NodeAddr) -> Self {
        Self::with_config(address, Config::default())
    }

    pub fn with_config(address: NodeAddr, config: Config) -> Self {
        Self {
            address,
            queue: ForwardQueue::new(config.queue_capacity),
            config,
            open: false,
            next_sequence_id: 0,
            scheduler: BroadcastScheduler::new(),
            pending_handoff: None,
        }
    }

    pub fn address(&self) -> NodeAddr {
        self.address
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Reset engine state and start the rotation timer.
    /// Anything still queued from a previous run is dropped and its timer stopped.
    pub fn init(&mut self) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .queue
            .clear()
            .into_iter()
            .map(|e| Action::StopTimer(Timer::Lifetime(e.id)))
            .collect();
        self.next_sequence_id = 0;
        self.scheduler.reset();
        self.pending_handoff = None;
        self.open = true;
        actions.push(Action::SetTimer {
            timer: Timer::Broadcast,
            after: self.config.queue_delay,
        });
        debug!(addr = %self.address, "spray-and-wait engine opened");
        actions
    }

    /// Stop taking link events and stop the rotation. The queue is left as it is;
    /// lifetime timers keep running so entries still expire.
    pub fn close(&mut self) -> Vec<Action> {
        if !self.open {
            return vec![];
        }
        self.open = false;
        debug!(addr = %self.address, queued = self.queue.len(), "spray-and-wait engine closed");
        vec![Action::StopTimer(Timer::Broadcast)]
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    /// Queued entries in rotation order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.queue.iter()
    }

    pub fn pending_handoff(&self) -> Option<PacketKey> {
        self.pending_handoff
    }

    /// Create a new message with the full copy budget and queue it.
    /// Refused when the queue is full; the sequence number is only consumed on success.
    pub fn originate(
        &mut self,
        payload: &Payload,
        destination: NodeAddr,
    ) -> Result<Vec<Action>, OriginateError> {
        let header = Header::new(
            self.address,
            destination,
            self.next_sequence_id,
            self.config.initial_copies,
        );
        let lifetime = self.config.lifetime_for(header.num_copies);
        let id = self.queue.enqueue(header, *payload, lifetime)?;
        self.next_sequence_id = self.next_sequence_id.wrapping_add(1);
        debug!(
            seq = header.sequence_id,
            destination = %destination,
            copies = header.num_copies,
            ?payload,
            "originated"
        );
        Ok(vec![Action::SetTimer {
            timer: Timer::Lifetime(id),
            after: lifetime,
        }])
    }

    /// Dispatch one event.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::BroadcastReceived { from, bytes } => self.on_broadcast(from, &bytes),
            Event::UnicastReceived { from, bytes } => self.on_unicast(from, &bytes),
            Event::ReliableReceived { from, bytes } => self.on_reliable(from, &bytes),
            Event::ReliableSent { to } => self.on_reliable_sent(to),
            Event::ReliableTimedOut { to } => self.on_reliable_timedout(to),
            Event::TimerFired(timer) => self.on_timer(timer),
        }
    }

    /// A neighbour offered a message.
    pub fn on_broadcast(&mut self, from: NodeAddr, bytes: &[u8]) -> Vec<Action> {
        if !self.open {
            return vec![];
        }
        let Ok(packet) = wire::decode_packet(bytes) else {
            return vec![];
        };
        let header = packet.header;
        let for_me = header.destination == self.address;

        // Copies exhausted and not for us, or our own message coming back.
        if (header.num_copies == 1 && !for_me) || header.origin == self.address {
            debug!(seq = header.sequence_id, from = %from, "offer ignored");
            return vec![];
        }

        let mut actions = Vec::new();
        if for_me {
            debug!(
                seq = header.sequence_id,
                origin = %header.origin,
                from = %from,
                "message reached destination"
            );
            if let Some(payload) = packet.payload {
                actions.push(Action::Deliver { header, payload });
            }
            actions.extend(self.request(from, &header));
            return actions;
        }

        let id = match self.queue.find(&header.key()) {
            Some(id) => {
                let held = self.queue.get(id).map(|e| e.header.num_copies).unwrap_or(0);
                if held > 0 {
                    debug!(seq = header.sequence_id, copies = held, "offer ignored, already holding copies");
                    return actions;
                }
                id
            }
            None => {
                let Some(payload) = packet.payload else {
                    return actions;
                };
                let mut stored = header;
                stored.num_copies = 0;
                let lifetime = self.config.timeout_unconfirmed;
                match self.queue.enqueue(stored, payload, lifetime) {
                    Ok(id) => {
                        actions.push(Action::SetTimer {
                            timer: Timer::Lifetime(id),
                            after: lifetime,
                        });
                        id
                    }
                    Err(_) => {
                        debug!(seq = header.sequence_id, from = %from, "queue full, offer dropped");
                        return actions;
                    }
                }
            }
        };

        if let Some(stored) = self.queue.get(id).map(|e| e.header) {
            actions.extend(self.request(from, &stored));
        }
        actions
    }

    /// A neighbour asked for a copy of a message we offered.
    pub fn on_unicast(&mut self, from: NodeAddr, bytes: &[u8]) -> Vec<Action> {
        if !self.open {
            return vec![];
        }
        let Ok(packet) = wire::decode_packet(bytes) else {
            return vec![];
        };
        let header = packet.header;
        let Some(id) = self.queue.find(&header.key()) else {
            debug!(seq = header.sequence_id, from = %from, "request for retired message");
            return vec![];
        };

        if header.destination == from {
            debug!(seq = header.sequence_id, destination = %from, "delivered, retiring");
            self.retire(id);
            return vec![Action::StopTimer(Timer::Lifetime(id))];
        }

        let Some(mut handoff) = self.queue.get(id).map(|e| e.header) else {
            return vec![];
        };
        handoff.num_copies = copies::handoff_copies(handoff.num_copies);
        let mut actions = Vec::new();
        if let Ok(bytes) = wire::encode_packet(&handoff, None) {
            debug!(
                seq = handoff.sequence_id,
                to = %from,
                copies = handoff.num_copies,
                "handoff"
            );
            if let Some(previous) = self.pending_handoff.replace(header.key()) {
                debug!(seq = previous.sequence_id, "replacing pending handoff");
            }
            actions.push(Action::Reliable {
                to: from,
                bytes,
                max_attempts: self.config.max_transmissions,
            });
        }
        actions
    }

    /// A neighbour handed us forwarding copies.
    pub fn on_reliable(&mut self, from: NodeAddr, bytes: &[u8]) -> Vec<Action> {
        if !self.open {
            return vec![];
        }
        let Ok(packet) = wire::decode_packet(bytes) else {
            return vec![];
        };
        let header = packet.header;
        if header.num_copies == 0 {
            return vec![];
        }
        let Some(id) = self.queue.find(&header.key()) else {
            return vec![];
        };
        let Some(entry) = self.queue.get_mut(id) else {
            return vec![];
        };
        entry.header.num_copies = header.num_copies;
        let lifetime = self.config.lifetime_for(header.num_copies);
        self.queue.rearm(id, lifetime);
        debug!(
            seq = header.sequence_id,
            from = %from,
            copies = header.num_copies,
            "handoff adopted"
        );
        vec![Action::SetTimer {
            timer: Timer::Lifetime(id),
            after: lifetime,
        }]
    }

    /// The pending hand-off was acknowledged: keep half.
    pub fn on_reliable_sent(&mut self, to: NodeAddr) -> Vec<Action> {
        if !self.open {
            return vec![];
        }
        let Some(key) = self.pending_handoff.take() else {
            return vec![];
        };
        let found = self.queue.find(&key);
        if let Some(entry) = found.and_then(|id| self.queue.get_mut(id)) {
            entry.header.num_copies = copies::retained_copies(entry.header.num_copies);
            debug!(
                seq = key.sequence_id,
                to = %to,
                copies = entry.header.num_copies,
                "handoff acknowledged"
            );
        }
        vec![]
    }

    /// The pending hand-off failed. The entry keeps its copies and its lifetime.
    pub fn on_reliable_timedout(&mut self, to: NodeAddr) -> Vec<Action> {
        if let Some(key) = self.pending_handoff.take() {
            debug!(seq = key.sequence_id, to = %to, "handoff timed out");
        }
        vec![]
    }

    pub fn on_timer(&mut self, timer: Timer) -> Vec<Action> {
        match timer {
            Timer::Broadcast => self.broadcast_next(),
            Timer::Lifetime(id) => {
                if let Some(entry) = self.retire(id) {
                    debug!(
                        seq = entry.header.sequence_id,
                        origin = %entry.header.origin,
                        copies = entry.header.num_copies,
                        "expired"
                    );
                }
                vec![]
            }
        }
    }

    fn broadcast_next(&mut self) -> Vec<Action> {
        if !self.open {
            return vec![];
        }
        let step = self.scheduler.next(&self.queue);
        let mut actions = Vec::new();
        if let Step::Send { id, .. } = step {
            if let Some(entry) = self.queue.get(id) {
                if let Ok(bytes) = wire::encode_packet(&entry.header, Some(&entry.payload)) {
                    debug!(
                        seq = entry.header.sequence_id,
                        origin = %entry.header.origin,
                        destination = %entry.header.destination,
                        copies = entry.header.num_copies,
                        "spray"
                    );
                    actions.push(Action::Broadcast(bytes));
                }
            }
        }
        actions.push(Action::SetTimer {
            timer: Timer::Broadcast,
            after: step.next_delay(&self.config),
        });
        actions
    }

    fn request(&self, to: NodeAddr, header: &Header) -> Option<Action> {
        let bytes = wire::encode_packet(header, None).ok()?;
        debug!(seq = header.sequence_id, to = %to, copies = header.num_copies, "request");
        Some(Action::Unicast { to, bytes })
    }

    fn retire(&mut self, id: EntryId) -> Option<Entry> {
        let entry = self.queue.remove(id)?;
        if self.pending_handoff == Some(entry.header.key()) {
            self.pending_handoff = None;
        }
        Some(entry)
    }
}
