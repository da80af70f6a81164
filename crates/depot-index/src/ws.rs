//! # WebSocket Change Feed
//!
//! [`ChangeFeed`] implementation over one WebSocket per subscription.
//!
//! ## Frame Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      WebSocket Subscription                             │
//! │                                                                         │
//! │  subscribe("t-a", "items")                                              │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  wss://feed.depot.example/changes?tenant=t-a&table=items               │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  pump task: text frame → RawChange → mpsc → FeedSubscription::next()   │
//! │                                                                         │
//! │  Socket close or read error ends the pump; the dropped sender closes   │
//! │  the channel, which the store observes as a disconnect.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use depot_core::RawChange;

use crate::config::FeedSettings;
use crate::error::{IndexError, IndexResult};
use crate::feed::{ChangeFeed, FeedSubscription, SUBSCRIPTION_BUFFER};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Change feed speaking the portal's WebSocket protocol.
#[derive(Debug, Clone)]
pub struct WsChangeFeed {
    url: Url,
    connect_timeout: Duration,
}

impl WsChangeFeed {
    /// Builds a feed from settings.
    pub fn new(settings: &FeedSettings) -> IndexResult<Self> {
        let url = Url::parse(&settings.url)?;
        Ok(WsChangeFeed {
            url,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
        })
    }

    fn subscription_url(&self, tenant: &str, table: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("tenant", tenant)
            .append_pair("table", table);
        url
    }

    /// Reads frames off the socket and forwards parsed changes.
    ///
    /// Malformed frames are skipped, not fatal. Any socket error ends the
    /// pump, which closes the channel and signals disconnect downstream.
    async fn pump(mut stream: WsStream, tx: mpsc::Sender<RawChange>, table: String) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<RawChange>(&text) {
                    Ok(change) => {
                        if tx.send(change).await.is_err() {
                            // Subscription dropped; stop reading.
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(table = %table, error = %e, "Skipping malformed change frame");
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!(table = %table, "Change stream closed by server");
                    break;
                }
                Ok(Message::Binary(_)) => {
                    warn!(table = %table, "Ignoring unexpected binary frame");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => {
                    let err = IndexError::from(e);
                    warn!(table = %table, error = %err, "Change stream read error");
                    break;
                }
            }
        }
        debug!(table = %table, "Change stream pump ended");
    }
}

#[async_trait]
impl ChangeFeed for WsChangeFeed {
    async fn subscribe(&self, tenant: &str, table: &str) -> IndexResult<FeedSubscription> {
        let url = self.subscription_url(tenant, table);
        debug!(url = %url, "Opening change stream");

        let connect = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await;
        let (stream, _response) = match connect {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(IndexError::SubscribeFailed {
                    table: table.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(IndexError::SubscribeFailed {
                    table: table.to_string(),
                    reason: format!("connect timed out after {:?}", self.connect_timeout),
                })
            }
        };

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(Self::pump(stream, tx, table.to_string()));
        Ok(FeedSubscription::new(rx))
    }
}
