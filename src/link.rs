//! WebSocket links to external hardware
//!
//! A [`ConnectionManager`] owns one socket, the queue of messages waiting for
//! it, and the reconnect timer. Messages sent while the link is down are
//! delivered in order once it comes back.

use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Commands understood by the GPIO device server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    On,
    Off,
}

impl DeviceCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceCommand::On => "on",
            DeviceCommand::Off => "off",
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link '{0}' has shut down")]
    Closed(String),
}

pub struct ConnectionManager {
    name: String,
    outbound: mpsc::UnboundedSender<String>,
    inbound: broadcast::Sender<String>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Start connecting in the background. Never fails: an unreachable peer
    /// just means messages queue up until it appears.
    pub fn spawn(name: impl Into<String>, url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let name = name.into();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(64);
        let (connected_tx, connected) = watch::channel(false);
        let cancel = CancellationToken::new();

        let task = LinkTask {
            name: name.clone(),
            url: url.into(),
            reconnect_delay,
            outbound_rx,
            inbound: inbound.clone(),
            connected: connected_tx,
            cancel: cancel.clone(),
            queue: VecDeque::new(),
        };
        tokio::spawn(task.run());

        Self {
            name,
            outbound,
            inbound,
            connected,
            cancel,
        }
    }

    /// Send now if connected, otherwise queue for the next connection
    pub fn send(&self, message: impl Into<String>) -> Result<(), LinkError> {
        self.outbound
            .send(message.into())
            .map_err(|_| LinkError::Closed(self.name.clone()))
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Text messages received from the peer
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inbound.subscribe()
    }

    /// Wait until the link reaches the given connection state
    #[cfg(test)]
    pub async fn wait_for(&self, connected: bool) {
        let mut rx = self.connected.clone();
        let _ = rx.wait_for(|state| *state == connected).await;
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct LinkTask {
    name: String,
    url: String,
    reconnect_delay: Duration,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    inbound: broadcast::Sender<String>,
    connected: watch::Sender<bool>,
    cancel: CancellationToken,
    queue: VecDeque<String>,
}

impl LinkTask {
    async fn run(mut self) {
        loop {
            let result = {
                let connect = connect_async(self.url.as_str());
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        () = self.cancel.cancelled() => return,
                        Some(message) = self.outbound_rx.recv() => self.queue.push_back(message),
                        result = &mut connect => break result,
                    }
                }
            };

            match result {
                Ok((socket, _)) => {
                    tracing::info!(link = %self.name, url = %self.url, "Link connected");
                    self.connected.send_replace(true);
                    let keep_running = self.serve(socket).await;
                    self.connected.send_replace(false);
                    if !keep_running {
                        return;
                    }
                    tracing::warn!(link = %self.name, "Link dropped");
                }
                Err(e) => {
                    tracing::warn!(link = %self.name, url = %self.url, error = %e, "Link connection failed");
                }
            }

            let delay = tokio::time::sleep(self.reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => return,
                    Some(message) = self.outbound_rx.recv() => self.queue.push_back(message),
                    () = &mut delay => break,
                }
            }
            tracing::debug!(link = %self.name, queued = self.queue.len(), "Reconnecting");
        }
    }

    /// Pump messages over a live socket. Returns false when the link should
    /// stop for good.
    async fn serve<S>(&mut self, socket: tokio_tungstenite::WebSocketStream<S>) -> bool
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = socket.split();

        while let Some(message) = self.queue.pop_front() {
            if let Err(e) = sink.send(Message::Text(message.clone().into())).await {
                tracing::warn!(link = %self.name, error = %e, "Flushing queue failed");
                self.queue.push_front(message);
                return true;
            }
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = sink.close().await;
                    return false;
                }
                outgoing = self.outbound_rx.recv() => {
                    let Some(message) = outgoing else {
                        return false;
                    };
                    if let Err(e) = sink.send(Message::Text(message.clone().into())).await {
                        tracing::warn!(link = %self.name, error = %e, "Send failed, queueing");
                        self.queue.push_back(message);
                        return true;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(link = %self.name, message = %text, "Link message");
                        let _ = self.inbound.send(text.to_string());
                    }
                    Some(Ok(Message::Close(_))) | None => return true,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(link = %self.name, error = %e, "Link read failed");
                        return true;
                    }
                }
            }
        }
    }
}
