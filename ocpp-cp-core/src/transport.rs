//! Transports carrying OCPP-J frames
//!
//! A transport opens a link to the CSMS and exposes it as a pair of channels:
//! text frames to send, and events (frames, close) received. The connection
//! only ever hands frames to the outgoing channel, so sending never waits on
//! the socket.
//!
//! - `WsTransport`: WebSocket client with OCPP subprotocol negotiation
//! - `ChannelTransport`: in-memory transport for tests and embedding

use std::future::Future;

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{header, HeaderValue},
        protocol::WebSocketConfig,
        Message,
    },
};
use tracing::{debug, error, info, warn};

/// Close code reported when the link drops without a close handshake
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Static credentials for HTTP Basic authentication
#[derive(Debug, Clone)]
pub struct Credentials {
    pub identity: String,
    pub password: String,
}

impl Credentials {
    /// Value of the `Authorization` header
    pub fn basic_auth(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.identity, self.password));
        format!("Basic {}", token)
    }
}

/// Something that happened on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Closed { code: u16, reason: String },
}

/// An open link
#[derive(Debug)]
pub struct TransportLink {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Errors opening a link
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid URL {0}")]
    InvalidUrl(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    #[error("transport already opened")]
    AlreadyOpened,
}

/// Opens links to a CSMS
pub trait Transport: Send + Sync {
    fn open(
        &self,
        url: &str,
        subprotocol: &str,
        credentials: Option<&Credentials>,
    ) -> impl Future<Output = Result<TransportLink, TransportError>> + Send;
}

/// Build the full OCPP WebSocket URL
pub fn build_ocpp_url(base_url: &str, identity: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), identity)
}

// ============================================================================
// WebSocket
// ============================================================================

/// WebSocket transport (tokio-tungstenite)
#[derive(Debug, Clone)]
pub struct WsTransport {
    max_message_size: usize,
    max_frame_size: usize,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024,
            max_frame_size: 16 * 1024,
        }
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WsTransport {
    async fn open(
        &self,
        url: &str,
        subprotocol: &str,
        credentials: Option<&Credentials>,
    ) -> Result<TransportLink, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        let headers = request.headers_mut();
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(subprotocol)
                .map_err(|e| TransportError::InvalidHeader(e.to_string()))?,
        );
        if let Some(credentials) = credentials {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&credentials.basic_auth())
                    .map_err(|e| TransportError::InvalidHeader(e.to_string()))?,
            );
        }

        let ws_config = WebSocketConfig {
            max_message_size: Some(self.max_message_size),
            max_frame_size: Some(self.max_frame_size),
            ..Default::default()
        };

        let (ws_stream, response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| {
                error!("WebSocket connection failed: {}", e);
                TransportError::Connect(e.to_string())
            })?;

        let accepted_protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());

        if accepted_protocol != Some(subprotocol) {
            warn!(
                "CSMS did not accept subprotocol {}, got: {:?}",
                subprotocol, accepted_protocol
            );
        }

        info!("WebSocket connected to {}", url);

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        // Writer: runs until the connection drops its sender
        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                debug!("Sending: {}", text);
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
            if let Err(e) = ws_tx.send(Message::Close(None)).await {
                debug!("Close frame not sent: {}", e);
            }
        });

        tokio::spawn(async move {
            let closed = loop {
                match ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received: {}", text);
                        if incoming_tx.send(TransportEvent::Message(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("WebSocket closed by server");
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: u16::from(frame.code),
                                reason: frame.reason.to_string(),
                            },
                            None => TransportEvent::Closed {
                                code: 1005,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: "stream ended".to_string(),
                        };
                    }
                }
            };
            let _ = incoming_tx.send(closed);
        });

        Ok(TransportLink {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Parameters a `ChannelTransport` was opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub url: String,
    pub subprotocol: String,
    pub authorization: Option<String>,
}

/// In-memory transport; the far end is a [`ChannelPeer`]
pub struct ChannelTransport {
    link: Mutex<Option<TransportLink>>,
    opened: Mutex<Option<OpenRequest>>,
}

/// CSMS side of a [`ChannelTransport`]
pub struct ChannelPeer {
    sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelTransport {
    /// Create a transport and the peer end it talks to
    pub fn pair() -> (Self, ChannelPeer) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let transport = Self {
            link: Mutex::new(Some(TransportLink {
                outgoing: outgoing_tx,
                incoming: incoming_rx,
            })),
            opened: Mutex::new(None),
        };
        let peer = ChannelPeer {
            sent: outgoing_rx,
            inbound: incoming_tx,
        };
        (transport, peer)
    }

    /// How the transport was opened, if it was
    pub fn opened(&self) -> Option<OpenRequest> {
        self.opened.lock().clone()
    }
}

impl Transport for ChannelTransport {
    async fn open(
        &self,
        url: &str,
        subprotocol: &str,
        credentials: Option<&Credentials>,
    ) -> Result<TransportLink, TransportError> {
        let link = self.link.lock().take().ok_or(TransportError::AlreadyOpened)?;
        *self.opened.lock() = Some(OpenRequest {
            url: url.to_string(),
            subprotocol: subprotocol.to_string(),
            authorization: credentials.map(Credentials::basic_auth),
        });
        Ok(link)
    }
}

impl ChannelPeer {
    /// Next frame the charge point sent, waiting for it
    pub async fn next_frame(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Next frame the charge point sent, if one is queued
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Every queued frame
    pub fn drain_frames(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_next_frame()).collect()
    }

    /// Deliver a frame to the charge point
    pub fn send_frame(&self, text: impl Into<String>) -> bool {
        self.inbound.send(TransportEvent::Message(text.into())).is_ok()
    }

    /// Close the link from the CSMS side
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.inbound
            .send(TransportEvent::Closed {
                code,
                reason: reason.into(),
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ocpp_url() {
        let url = build_ocpp_url("ws://localhost:8180/steve/websocket/CentralSystemService", "EK3-001");
        assert_eq!(
            url,
            "ws://localhost:8180/steve/websocket/CentralSystemService/EK3-001"
        );

        let url = build_ocpp_url("ws://localhost:8180/steve/websocket/CentralSystemService/", "EK3-001");
        assert_eq!(
            url,
            "ws://localhost:8180/steve/websocket/CentralSystemService/EK3-001"
        );
    }

    #[test]
    fn test_basic_auth_header() {
        let credentials = Credentials {
            identity: "CP001".into(),
            password: "secret".into(),
        };
        assert_eq!(credentials.basic_auth(), "Basic Q1AwMDE6c2VjcmV0");
    }

    #[tokio::test]
    async fn test_channel_transport_opens_once() {
        let (transport, mut peer) = ChannelTransport::pair();

        let link = transport.open("ws://csms/CP001", "ocpp1.6", None).await.unwrap();
        assert_eq!(
            transport.opened().unwrap().subprotocol,
            "ocpp1.6".to_string()
        );
        assert!(matches!(
            transport.open("ws://csms/CP001", "ocpp1.6", None).await,
            Err(TransportError::AlreadyOpened)
        ));

        link.outgoing.send("[2,\"1\",\"Heartbeat\",{}]".into()).unwrap();
        assert_eq!(peer.next_frame().await.unwrap(), "[2,\"1\",\"Heartbeat\",{}]");

        let mut incoming = link.incoming;
        assert!(peer.close(1000, "bye"));
        assert_eq!(
            incoming.recv().await.unwrap(),
            TransportEvent::Closed {
                code: 1000,
                reason: "bye".into()
            }
        );
    }
}
