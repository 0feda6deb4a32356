//! UDP link: broadcast, unicast and reliable unicast emulated over one broadcast socket.
//!
//! Every frame goes to the segment broadcast address. Receivers drop their own frames and
//! frames addressed to someone else. Reliable frames are acked and retransmitted here; the
//! engine only sees the final outcome.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spray_core::{Event, NodeAddr};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::node::Input;

const MAX_DATAGRAM: usize = 1500;

/// Everything a node puts on the air.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFrame {
    Broadcast {
        from: NodeAddr,
        bytes: Vec<u8>,
    },
    Unicast {
        from: NodeAddr,
        to: NodeAddr,
        bytes: Vec<u8>,
    },
    Reliable {
        from: NodeAddr,
        to: NodeAddr,
        seq: u8,
        bytes: Vec<u8>,
    },
    Ack {
        from: NodeAddr,
        to: NodeAddr,
        seq: u8,
    },
}

impl LinkFrame {
    fn from(&self) -> NodeAddr {
        match self {
            LinkFrame::Broadcast { from, .. }
            | LinkFrame::Unicast { from, .. }
            | LinkFrame::Reliable { from, .. }
            | LinkFrame::Ack { from, .. } => *from,
        }
    }

    fn to(&self) -> Option<NodeAddr> {
        match self {
            LinkFrame::Broadcast { .. } => None,
            LinkFrame::Unicast { to, .. }
            | LinkFrame::Reliable { to, .. }
            | LinkFrame::Ack { to, .. } => Some(*to),
        }
    }
}

pub fn encode_frame(frame: &LinkFrame) -> Result<Vec<u8>, LinkError> {
    let bytes = bincode::serialize(frame)?;
    if bytes.len() > MAX_DATAGRAM {
        return Err(LinkError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

pub fn decode_frame(bytes: &[u8]) -> Result<LinkFrame, LinkError> {
    Ok(bincode::deserialize(bytes)?)
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("frame codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes does not fit a datagram")]
    TooLarge(usize),
}

/// Sends for the link task, mapped from engine actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Broadcast(Vec<u8>),
    Unicast {
        to: NodeAddr,
        bytes: Vec<u8>,
    },
    Reliable {
        to: NodeAddr,
        bytes: Vec<u8>,
        max_attempts: u8,
    },
}

struct Outstanding {
    frame: LinkFrame,
    to: NodeAddr,
    seq: u8,
    attempts_left: u8,
    next_retry: Instant,
}

/// Result of checking the outstanding reliable send.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryPoll {
    Idle,
    Retransmit(LinkFrame),
    TimedOut(NodeAddr),
}

/// One reliable send in flight at a time. A new send replaces the old one without
/// reporting it, matching the engine's single pending hand-off.
pub struct ReliableSender {
    me: NodeAddr,
    interval: Duration,
    next_seq: u8,
    outstanding: Option<Outstanding>,
}

impl ReliableSender {
    pub fn new(me: NodeAddr, interval: Duration) -> Self {
        Self {
            me,
            interval,
            next_seq: 0,
            outstanding: None,
        }
    }

    /// Start a reliable send; returns the frame to transmit now.
    pub fn send(&mut self, to: NodeAddr, bytes: Vec<u8>, max_attempts: u8, now: Instant) -> LinkFrame {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let frame = LinkFrame::Reliable {
            from: self.me,
            to,
            seq,
            bytes,
        };
        if let Some(old) = self.outstanding.take() {
            debug!(to = %old.to, seq = old.seq, "reliable send superseded");
        }
        self.outstanding = Some(Outstanding {
            frame: frame.clone(),
            to,
            seq,
            attempts_left: max_attempts.max(1) - 1,
            next_retry: now + self.interval,
        });
        frame
    }

    /// Ack received. Returns the peer to report as `ReliableSent` when it matches.
    pub fn on_ack(&mut self, from: NodeAddr, seq: u8) -> Option<NodeAddr> {
        match &self.outstanding {
            Some(o) if o.to == from && o.seq == seq => {
                self.outstanding = None;
                Some(from)
            }
            _ => None,
        }
    }

    pub fn poll(&mut self, now: Instant) -> RetryPoll {
        let Some(o) = &mut self.outstanding else {
            return RetryPoll::Idle;
        };
        if now < o.next_retry {
            return RetryPoll::Idle;
        }
        if o.attempts_left == 0 {
            let to = o.to;
            self.outstanding = None;
            return RetryPoll::TimedOut(to);
        }
        o.attempts_left -= 1;
        o.next_retry = now + self.interval;
        RetryPoll::Retransmit(o.frame.clone())
    }
}

/// Duplicate suppression for received reliable frames: last sequence seen per sender.
#[derive(Default)]
pub struct ReliableReceiver {
    last_seq: HashMap<NodeAddr, u8>,
}

impl ReliableReceiver {
    /// True the first time (sender, seq) is seen in a row; retransmissions return false.
    pub fn accept(&mut self, from: NodeAddr, seq: u8) -> bool {
        self.last_seq.insert(from, seq) != Some(seq)
    }
}

/// Bind the shared link socket with broadcast enabled.
pub fn bind(port: u16) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind(("0.0.0.0", port))?;
    std_sock.set_broadcast(true)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

/// Run the link until the outbound channel or the node input closes.
/// Receive errors are logged and the loop carries on.
pub async fn run_link(
    socket: UdpSocket,
    me: NodeAddr,
    dest: SocketAddrV4,
    retransmit: Duration,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    input_tx: mpsc::UnboundedSender<Input>,
) {
    let mut buf = vec![0u8; 65536];
    let mut sender = ReliableSender::new(me, retransmit);
    let mut receiver = ReliableReceiver::default();
    let mut ticker = tokio::time::interval(retransmit / 2);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            r = socket.recv_from(&mut buf) => {
                let (n, peer) = match r {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "link receive failed");
                        continue;
                    }
                };
                let frame = match decode_frame(&buf[..n]) {
                    Ok(f) => f,
                    Err(e) => {
                        trace!(%peer, error = %e, "undecodable datagram");
                        continue;
                    }
                };
                if frame.from() == me || frame.to().is_some_and(|to| to != me) {
                    continue;
                }
                let event = match frame {
                    LinkFrame::Broadcast { from, bytes } => Some(Event::BroadcastReceived { from, bytes }),
                    LinkFrame::Unicast { from, bytes, .. } => Some(Event::UnicastReceived { from, bytes }),
                    LinkFrame::Reliable { from, seq, bytes, .. } => {
                        send_frame(&socket, dest, &LinkFrame::Ack { from: me, to: from, seq }).await;
                        receiver
                            .accept(from, seq)
                            .then_some(Event::ReliableReceived { from, bytes })
                    }
                    LinkFrame::Ack { from, seq, .. } => sender
                        .on_ack(from, seq)
                        .map(|to| Event::ReliableSent { to }),
                };
                if let Some(ev) = event {
                    if input_tx.send(Input::Link(ev)).is_err() {
                        return;
                    }
                }
            }
            cmd = outbound_rx.recv() => {
                let frame = match cmd {
                    None => return,
                    Some(Outbound::Broadcast(bytes)) => LinkFrame::Broadcast { from: me, bytes },
                    Some(Outbound::Unicast { to, bytes }) => LinkFrame::Unicast { from: me, to, bytes },
                    Some(Outbound::Reliable { to, bytes, max_attempts }) => {
                        sender.send(to, bytes, max_attempts, Instant::now())
                    }
                };
                send_frame(&socket, dest, &frame).await;
            }
            _ = ticker.tick() => {
                match sender.poll(Instant::now()) {
                    RetryPoll::Idle => {}
                    RetryPoll::Retransmit(frame) => send_frame(&socket, dest, &frame).await,
                    RetryPoll::TimedOut(to) => {
                        if input_tx.send(Input::Link(Event::ReliableTimedOut { to })).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn send_frame(socket: &UdpSocket, dest: SocketAddrV4, frame: &LinkFrame) {
    match encode_frame(frame) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, dest).await {
                warn!(error = %e, "link send failed");
            }
        }
        Err(e) => warn!(error = %e, "link frame not sent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> NodeAddr {
        NodeAddr::from_bytes([b, 0])
    }

    #[test]
    fn frame_codec_and_addressing() {
        let frame = LinkFrame::Reliable {
            from: addr(1),
            to: addr(2),
            seq: 9,
            bytes: vec![1, 2, 3],
        };
        let bytes = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.from(), addr(1));
        assert_eq!(decoded.to(), Some(addr(2)));
        assert!(decode_frame(&[0xff, 0xff, 0xff, 0xff]).is_err());
        assert!(matches!(
            encode_frame(&LinkFrame::Broadcast { from: addr(1), bytes: vec![0; 2000] }),
            Err(LinkError::TooLarge(_))
        ));
    }

    #[test]
    fn reliable_ack_reports_once() {
        let now = Instant::now();
        let mut s = ReliableSender::new(addr(1), Duration::from_millis(100));
        let frame = s.send(addr(2), vec![7], 3, now);
        let LinkFrame::Reliable { seq, .. } = frame else {
            panic!("expected reliable frame");
        };
        assert_eq!(s.on_ack(addr(3), seq), None);
        assert_eq!(s.on_ack(addr(2), seq.wrapping_add(1)), None);
        assert_eq!(s.on_ack(addr(2), seq), Some(addr(2)));
        assert_eq!(s.on_ack(addr(2), seq), None);
        assert_eq!(s.poll(now + Duration::from_secs(10)), RetryPoll::Idle);
    }

    #[test]
    fn reliable_retransmits_then_times_out() {
        let start = Instant::now();
        let step = Duration::from_millis(100);
        let mut s = ReliableSender::new(addr(1), step);
        s.send(addr(2), vec![7], 3, start);

        assert_eq!(s.poll(start), RetryPoll::Idle);
        assert!(matches!(s.poll(start + step), RetryPoll::Retransmit(_)));
        assert!(matches!(s.poll(start + step * 2), RetryPoll::Retransmit(_)));
        assert_eq!(s.poll(start + step * 3), RetryPoll::TimedOut(addr(2)));
        assert_eq!(s.poll(start + step * 4), RetryPoll::Idle);
    }

    #[test]
    fn new_send_supersedes_old() {
        let now = Instant::now();
        let mut s = ReliableSender::new(addr(1), Duration::from_millis(100));
        let LinkFrame::Reliable { seq: first, .. } = s.send(addr(2), vec![1], 3, now) else {
            panic!("expected reliable frame");
        };
        s.send(addr(3), vec![2], 3, now);
        assert_eq!(s.on_ack(addr(2), first), None);
    }

    #[test]
    fn receiver_drops_retransmissions() {
        let mut r = ReliableReceiver::default();
        assert!(r.accept(addr(1), 0));
        assert!(!r.accept(addr(1), 0));
        assert!(r.accept(addr(2), 0));
        assert!(r.accept(addr(1), 1));
    }
}
