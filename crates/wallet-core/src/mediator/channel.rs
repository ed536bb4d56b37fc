//! Logical streams and the multiplexer that carries them.
//!
//! A physical connection moves [`Frame`]s, each tagged with the name of the
//! logical sub-stream it belongs to. The multiplexer fans incoming frames out
//! to per-name streams and tags outgoing messages with their stream name.
//! When the physical stream ends every sub-stream sees its incoming half
//! close.

use super::rpc::Outbound;
use crate::error::{Result, WalletError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default per-stream buffer
pub const STREAM_CAPACITY: usize = 64;

/// One logical, ordered, bidirectional message stream.
#[derive(Debug)]
pub struct LogicalStream {
    pub incoming: mpsc::Receiver<Value>,
    pub outgoing: mpsc::Sender<Outbound>,
}

/// The transport's side of a [`LogicalStream`].
#[derive(Debug)]
pub struct StreamPeer {
    pub sender: mpsc::Sender<Value>,
    pub receiver: mpsc::Receiver<Outbound>,
}

impl LogicalStream {
    /// A stream and the peer end that feeds it.
    pub fn pair(capacity: usize) -> (LogicalStream, StreamPeer) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (
            LogicalStream {
                incoming: in_rx,
                outgoing: out_tx,
            },
            StreamPeer {
                sender: in_tx,
                receiver: out_rx,
            },
        )
    }
}

/// Unit on the physical stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub data: Value,
}

/// Splits one frame stream into named logical streams.
pub struct Multiplexer {
    routes: HashMap<String, mpsc::Sender<Value>>,
    outgoing: mpsc::Sender<Frame>,
}

impl Multiplexer {
    pub fn new(outgoing: mpsc::Sender<Frame>) -> Self {
        Self {
            routes: HashMap::new(),
            outgoing,
        }
    }

    /// Open the sub-stream called `name`. Each name can be opened once.
    pub fn substream(&mut self, name: &str) -> Result<LogicalStream> {
        if self.routes.contains_key(name) {
            return Err(WalletError::InvalidParams(format!(
                "substream {} already open",
                name
            )));
        }

        let (stream, peer) = LogicalStream::pair(STREAM_CAPACITY);
        self.routes.insert(name.to_string(), peer.sender);

        let outgoing = self.outgoing.clone();
        let stream_name = name.to_string();
        let mut receiver = peer.receiver;
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let data = match serde_json::to_value(&message) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(stream = %stream_name, "dropping unserializable message: {}", e);
                        continue;
                    }
                };
                let frame = Frame {
                    name: stream_name.clone(),
                    data,
                };
                if outgoing.send(frame).await.is_err() {
                    debug!(stream = %stream_name, "physical stream closed");
                    break;
                }
            }
        });

        Ok(stream)
    }

    /// Route `incoming` frames until the physical stream ends.
    pub fn spawn(self, mut incoming: mpsc::Receiver<Frame>) -> JoinHandle<()> {
        let mut routes = self.routes;
        tokio::spawn(async move {
            while let Some(frame) = incoming.recv().await {
                match routes.get(&frame.name).cloned() {
                    Some(route) => {
                        if route.send(frame.data).await.is_err() {
                            debug!(stream = %frame.name, "substream receiver dropped");
                            routes.remove(&frame.name);
                        }
                    }
                    None => warn!(stream = %frame.name, "frame for unknown substream"),
                }
            }
            // Dropping the routes closes every sub-stream
            routes.clear();
            debug!("physical stream ended");
        })
    }
}
