//! Stdin application: `DEST TEXT` originates a message, `queue` prints the queue size.

use spray_core::{AddrParseError, NodeAddr, Payload, PayloadTooLong};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::node::Input;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Send {
        destination: NodeAddr,
        payload: Payload,
    },
    QueueSize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: DEST TEXT | queue")]
    Usage,
    #[error("bad destination: {0}")]
    Destination(#[from] AddrParseError),
    #[error(transparent)]
    Payload(#[from] PayloadTooLong),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line == "queue" {
        return Ok(Some(Command::QueueSize));
    }
    let (dest, text) = line.split_once(char::is_whitespace).ok_or(CommandError::Usage)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(CommandError::Usage);
    }
    Ok(Some(Command::Send {
        destination: dest.parse()?,
        payload: Payload::from_slice(text.as_bytes())?,
    }))
}

pub async fn run_app(input_tx: mpsc::UnboundedSender<Input>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "bad command");
                continue;
            }
        };
        match cmd {
            Command::Send {
                destination,
                payload,
            } => {
                let (reply, rx) = oneshot::channel();
                let input = Input::Originate {
                    destination,
                    payload,
                    reply,
                };
                if input_tx.send(input).is_err() {
                    break;
                }
                match rx.await {
                    Ok(Ok(())) => info!(%destination, "message queued"),
                    Ok(Err(e)) => warn!(%destination, error = %e, "message refused"),
                    Err(_) => break,
                }
            }
            Command::QueueSize => {
                let (reply, rx) = oneshot::channel();
                if input_tx.send(Input::QueueSize(reply)).is_err() {
                    break;
                }
                match rx.await {
                    Ok(n) => println!("queue: {n}"),
                    Err(_) => break,
                }
            }
        }
    }
    Ok(())
}
