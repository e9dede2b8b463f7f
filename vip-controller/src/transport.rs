//! The seam between the engine and the switch transport.
//!
//! The engine only knows [`FlowSink`]. The bundled adapter speaks
//! line-delimited JSON: one [`PacketIn`] per stdin line, one
//! [`TransportMessage`] per stdout line.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use vip_core::domain::{AddressReply, FlowIntent, PacketIn};

/// Receives everything the engine wants sent to the switch.
///
/// Implementations must not block; delivery is fire-and-forget.
pub trait FlowSink: Send {
    /// Install a flow rule.
    fn install_flow(&self, intent: FlowIntent);
    /// Inject an ARP reply.
    fn send_reply(&self, reply: AddressReply);
}

/// A message for the switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportMessage {
    /// Rule installation.
    FlowMod(FlowIntent),
    /// Packet injection.
    PacketOut(AddressReply),
}

/// A [`FlowSink`] that queues messages for a writer task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransportMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiving end for the writer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, message: TransportMessage) {
        if self.tx.send(message).is_err() {
            trace!("transport writer gone, message discarded");
        }
    }
}

impl FlowSink for ChannelSink {
    fn install_flow(&self, intent: FlowIntent) {
        self.push(TransportMessage::FlowMod(intent));
    }

    fn send_reply(&self, reply: AddressReply) {
        self.push(TransportMessage::PacketOut(reply));
    }
}

/// Parse one inbound line. Blank lines yield `None`.
pub fn parse_event(line: &str) -> Option<Result<PacketIn, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(serde_json::from_str(line))
    }
}

/// Spawn a task feeding stdin events to the engine until EOF.
pub fn spawn_stdin_reader(events: mpsc::Sender<PacketIn>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!("Failed to read event stream: {}", err);
                    break;
                }
            };

            match parse_event(&line) {
                None => continue,
                Some(Ok(packet)) => {
                    if events.send(packet).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => debug!("Skipping unparseable event: {}", err),
            }
        }

        debug!("Event stream reached EOF");
    })
}

/// Spawn a task writing queued messages to stdout, one JSON object per line.
pub fn spawn_stdout_writer(mut messages: mpsc::UnboundedReceiver<TransportMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();

        while let Some(message) = messages.recv().await {
            let mut line = match serde_json::to_vec(&message) {
                Ok(line) => line,
                Err(err) => {
                    warn!("Failed to encode transport message: {}", err);
                    continue;
                }
            };
            line.push(b'\n');

            if let Err(err) = write_line(&mut stdout, &line).await {
                warn!("Transport output closed: {}", err);
                break;
            }
        }
    })
}

/// Write one framed line and push it through to the reader.
async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &[u8]) -> std::io::Result<()> {
    out.write_all(line).await?;
    out.flush().await
}
