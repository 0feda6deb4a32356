//! Node event loop: the only owner of the engine. Link events, application commands and
//! timer fires are handled strictly one at a time.

use std::collections::HashMap;

use spray_core::{Action, Event, NodeAddr, OriginateError, Payload, SprayWaitCore, Timer};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::link::Outbound;

/// Everything the node loop reacts to besides its own timers.
pub enum Input {
    Link(Event),
    Originate {
        destination: NodeAddr,
        payload: Payload,
        reply: oneshot::Sender<Result<(), OriginateError>>,
    },
    QueueSize(oneshot::Sender<usize>),
    Shutdown,
}

pub struct Node {
    core: SprayWaitCore,
    timers: HashMap<Timer, Instant>,
    link_tx: mpsc::UnboundedSender<Outbound>,
}

impl Node {
    pub fn new(core: SprayWaitCore, link_tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            core,
            timers: HashMap::new(),
            link_tx,
        }
    }

    pub async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<Input>) {
        let actions = self.core.init();
        self.apply(actions, Instant::now());

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                input = input_rx.recv() => match input {
                    None | Some(Input::Shutdown) => break,
                    Some(input) => self.on_input(input),
                },
                _ = sleep_until(deadline) => self.fire_due(Instant::now()),
            }
        }

        let actions = self.core.close();
        self.apply(actions, Instant::now());
        info!(queued = self.core.queue_size(), "node stopped");
    }

    fn on_input(&mut self, input: Input) {
        let now = Instant::now();
        match input {
            Input::Link(event) => {
                let actions = self.core.handle(event);
                self.apply(actions, now);
            }
            Input::Originate {
                destination,
                payload,
                reply,
            } => {
                let result = self.core.originate(&payload, destination).map(|actions| {
                    self.apply(actions, now);
                });
                let _ = reply.send(result);
            }
            Input::QueueSize(reply) => {
                let _ = reply.send(self.core.queue_size());
            }
            Input::Shutdown => {}
        }
    }

    /// Fire the timers that are due at `now`, earliest first. Timers re-armed by these
    /// fires wait for the next call, even when their new deadline has already passed.
    fn fire_due(&mut self, now: Instant) {
        for (at, timer) in self.due(now) {
            // An earlier fire in this batch may have stopped or moved it.
            if self.timers.get(&timer) != Some(&at) {
                continue;
            }
            self.timers.remove(&timer);
            let actions = self.core.on_timer(timer);
            self.apply(actions, now);
        }
    }

    fn due(&self, now: Instant) -> Vec<(Instant, Timer)> {
        let mut due: Vec<(Instant, Timer)> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(timer, at)| (*at, *timer))
            .collect();
        due.sort_by_key(|(at, _)| *at);
        due
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    fn apply(&mut self, actions: Vec<Action>, now: Instant) {
        for action in actions {
            let out = match action {
                Action::Broadcast(bytes) => Outbound::Broadcast(bytes),
                Action::Unicast { to, bytes } => Outbound::Unicast { to, bytes },
                Action::Reliable {
                    to,
                    bytes,
                    max_attempts,
                } => Outbound::Reliable {
                    to,
                    bytes,
                    max_attempts,
                },
                Action::SetTimer { timer, after } => {
                    self.timers.insert(timer, now + after);
                    continue;
                }
                Action::StopTimer(timer) => {
                    self.timers.remove(&timer);
                    continue;
                }
                Action::Deliver { header, payload } => {
                    info!(
                        origin = %header.origin,
                        seq = header.sequence_id,
                        message = %String::from_utf8_lossy(payload.trimmed()),
                        "message delivered"
                    );
                    continue;
                }
            };
            if self.link_tx.send(out).is_err() {
                warn!("link closed, dropping send");
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
