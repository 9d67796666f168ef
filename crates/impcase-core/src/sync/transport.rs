//! Packet transport between a client and the collaboration server

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};

use crate::error::TransportError;

/// One end of a bidirectional packet channel.
#[derive(Debug)]
pub struct Connection {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Connection {
    /// Two connected in-process ends.
    pub fn pair() -> (Connection, Connection) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Connection { tx: a_tx, rx: b_rx },
            Connection { tx: b_tx, rx: a_rx },
        )
    }

    pub fn send(&self, packet: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(packet)
            .map_err(|_| TransportError::ConnectionLost)
    }

    /// Next packet, or `None` once the peer is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Handle for sending from another task.
    pub fn sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        self.tx.clone()
    }
}

/// Connect to a collaboration server over websocket.
pub async fn connect(url: &str) -> Result<Connection, TransportError> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    tracing::info!("Connected to collaboration server {}", url);
    Ok(bridge(ws))
}

/// Pump binary websocket messages through a [`Connection`].
pub fn bridge<S>(ws: WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (local, remote) = Connection::pair();
    let Connection { tx, mut rx } = remote;
    let (mut sink, mut stream) = ws.split();

    tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            if let Err(e) = sink.send(Message::binary(packet)).await {
                tracing::warn!("Websocket send failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    if tx.send(data.to_vec()).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Websocket receive failed: {}", e);
                    break;
                }
            }
        }
    });

    local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair() {
        let (a, mut b) = Connection::pair();
        a.send(vec![1, 2, 3]).unwrap();
        assert_eq!(b.recv().await, Some(vec![1, 2, 3]));

        drop(a);
        assert_eq!(b.recv().await, None);
        assert!(matches!(b.send(vec![0]), Err(TransportError::ConnectionLost)));
    }
}
