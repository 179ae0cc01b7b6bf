//! Relay connections.

use std::future::Future;

use feedcast_proto::{ClientFrame, RelayFrame, SignedMessage};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::EndpointError;

/// Opens connections to relays.
pub trait RelayConnector {
    /// Connection type produced.
    type Link: RelayLink;

    /// Open a connection to `url`.
    fn connect(&self, url: &Url) -> impl Future<Output = Result<Self::Link, EndpointError>> + Send;
}

/// An open relay connection.
pub trait RelayLink: Send {
    /// Send the event and wait for the relay's verdict.
    fn publish(
        &mut self,
        event: &SignedMessage,
    ) -> impl Future<Output = Result<(), EndpointError>> + Send;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Connects to relays over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl RelayConnector for WsConnector {
    type Link = WsLink;

    fn connect(&self, url: &Url) -> impl Future<Output = Result<WsLink, EndpointError>> + Send {
        let target = url.to_string();
        async move {
            let (stream, _response) = connect_async(target.as_str())
                .await
                .map_err(|e| EndpointError::Connect(e.to_string()))?;
            debug!(relay = %target, "relay connected");
            Ok(WsLink { stream })
        }
    }
}

/// A WebSocket connection to one relay.
pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayLink for WsLink {
    fn publish(
        &mut self,
        event: &SignedMessage,
    ) -> impl Future<Output = Result<(), EndpointError>> + Send {
        async move {
            let frame = ClientFrame::Event(event).to_json()?;
            self.stream
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| EndpointError::Transport(e.to_string()))?;

            // Wait for the OK that names our event; anything else is noise.
            loop {
                let Some(message) = self.stream.next().await else {
                    return Err(EndpointError::Closed);
                };
                match message.map_err(|e| EndpointError::Transport(e.to_string()))? {
                    Message::Text(text) => match RelayFrame::parse(&text) {
                        Ok(frame) => match &frame {
                            RelayFrame::Ok {
                                event_id, message, ..
                            } if *event_id == event.id => {
                                if frame.is_stored() {
                                    return Ok(());
                                }
                                return Err(EndpointError::Rejected(message.clone()));
                            }
                            RelayFrame::Notice(notice) => {
                                debug!(notice = %notice, "relay notice");
                            }
                            other => {
                                debug!(frame = ?other, "skipping relay frame");
                            }
                        },
                        Err(e) => {
                            debug!(error = %e, "ignoring unparsable relay frame");
                        }
                    },
                    Message::Ping(data) => {
                        self.stream
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| EndpointError::Transport(e.to_string()))?;
                    }
                    Message::Close(_) => return Err(EndpointError::Closed),
                    _ => {}
                }
            }
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(e) = self.stream.close(None).await {
                debug!(error = %e, "relay close failed");
            }
        }
    }
}
