//! # WebSocket Session
//!
//! One persistent bidirectional connection to the upstream endpoint,
//! carrying both the head subscription and correlated request/response
//! calls. Head notifications that arrive while a request is in flight are
//! buffered and handed out by [`WsSession::next_head`].
//!
//! Liveness: the session pings every `ping_interval` and requires the pong
//! within `pong_timeout`; a missed pong surfaces as a transport error so
//! the producer reconnects.

use crate::rpc::{Incoming, RawBlock, RawHead, RpcRequest};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use shared_types::{BlockRecord, IngestError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live connection with an optional head subscription.
pub struct WsSession {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    next_request_id: u64,
    subscription_id: Option<String>,
    pending_heads: VecDeque<RawHead>,
    ping_timer: tokio::time::Interval,
    pong_timeout: Duration,
    awaiting_pong_since: Option<Instant>,
}

impl WsSession {
    /// Dial the endpoint.
    pub async fn connect(
        url: &str,
        ping_interval: Duration,
        pong_timeout: Duration,
    ) -> Result<Self, IngestError> {
        let (stream, _) = connect_async(url).await.map_err(IngestError::transport)?;
        let (write, read) = stream.split();
        let mut ping_timer = tokio::time::interval(ping_interval);
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Ok(Self {
            write,
            read,
            next_request_id: 1,
            subscription_id: None,
            pending_heads: VecDeque::new(),
            ping_timer,
            pong_timeout,
            awaiting_pong_since: None,
        })
    }

    /// Subscribe to new block headers; returns the subscription id.
    pub async fn subscribe_new_heads(&mut self) -> Result<String, IngestError> {
        let result = self.request("eth_subscribe", json!(["newHeads"])).await?;
        let id = result
            .as_str()
            .ok_or_else(|| IngestError::Transport("subscription id is not a string".into()))?
            .to_string();
        self.subscription_id = Some(id.clone());
        debug!("[stream] subscribed to new heads: {}", id);
        Ok(id)
    }

    /// Current chain tip via a plain request on the open connection.
    pub async fn latest_block_number(&mut self) -> Result<u64, IngestError> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| IngestError::Transport("block number is not a string".into()))?;
        crate::rpc::parse_hex_u64("number", raw)
    }

    /// Fetch one full block, bodies included.
    ///
    /// A block the node does not have yet (`null` result) is reported as a
    /// transport error so the caller's retry covers the race with the
    /// chain tip.
    pub async fn fetch_block(&mut self, number: u64) -> Result<BlockRecord, IngestError> {
        let params = json!([format!("0x{number:x}"), true]);
        let result = self.request("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Err(IngestError::Transport(format!(
                "block {number} not yet available upstream"
            )));
        }
        let raw: RawBlock = serde_json::from_value(result).map_err(|e| IngestError::Validation {
            field: "block".to_string(),
            reason: format!("block {number} payload does not match schema: {e}"),
        })?;
        raw.into_record()
    }

    /// Next head notification, honoring the keepalive.
    pub async fn next_head(&mut self) -> Result<RawHead, IngestError> {
        loop {
            if let Some(head) = self.pending_heads.pop_front() {
                return Ok(head);
            }
            let awaiting = self.awaiting_pong_since.is_some();
            let pong_deadline = self
                .awaiting_pong_since
                .map(|since| since + self.pong_timeout)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

            tokio::select! {
                _ = self.ping_timer.tick() => {
                    if self.awaiting_pong_since.is_none() {
                        self.write
                            .send(Message::Ping(Vec::new().into()))
                            .await
                            .map_err(IngestError::transport)?;
                        self.awaiting_pong_since = Some(Instant::now());
                    }
                }
                _ = tokio::time::sleep_until(pong_deadline), if awaiting => {
                    return Err(IngestError::Transport(
                        "keepalive pong not received in time".into(),
                    ));
                }
                message = self.read.next() => {
                    self.handle_message(message, None)?;
                }
            }
        }
    }

    /// Close the subscription and the socket. Best-effort; errors on a
    /// dying connection are irrelevant at this point.
    pub async fn close(&mut self) {
        if let Some(subscription) = self.subscription_id.take() {
            let unsubscribe = self.request("eth_unsubscribe", json!([subscription]));
            let _ = tokio::time::timeout(Duration::from_secs(2), unsubscribe).await;
        }
        let _ = self.write.send(Message::Close(None)).await;
    }

    /// Send a request and wait for the matching response, buffering any
    /// notifications that arrive in between.
    async fn request(
        &mut self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, IngestError> {
        let id = self.next_request_id;
        self.next_request_id += 1;
        let text =
            serde_json::to_string(&RpcRequest::new(method, params, id)).map_err(IngestError::transport)?;
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(IngestError::transport)?;

        loop {
            let message = self.read.next().await;
            if let Some(value) = self.handle_message(message, Some(id))? {
                return Ok(value);
            }
        }
    }

    /// Process one frame. Returns the response payload when it matches
    /// `want_id`.
    fn handle_message(
        &mut self,
        message: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        want_id: Option<u64>,
    ) -> Result<Option<serde_json::Value>, IngestError> {
        let message = message
            .ok_or_else(|| IngestError::Transport("connection closed".into()))?
            .map_err(IngestError::transport)?;
        match message {
            Message::Text(text) => self.handle_text(text.as_str(), want_id),
            Message::Ping(_payload) => {
                // The read half cannot reply here; tungstenite queues the
                // pong on the next write. Nothing to do.
                Ok(None)
            }
            Message::Pong(_) => {
                self.awaiting_pong_since = None;
                Ok(None)
            }
            Message::Close(_) => Err(IngestError::Transport("connection closed by peer".into())),
            _ => Ok(None),
        }
    }

    fn handle_text(
        &mut self,
        text: &str,
        want_id: Option<u64>,
    ) -> Result<Option<serde_json::Value>, IngestError> {
        let Ok(incoming) = serde_json::from_str::<Incoming>(text) else {
            warn!("[stream] unparseable frame dropped ({} bytes)", text.len());
            return Ok(None);
        };

        if incoming.method.as_deref() == Some("eth_subscription") {
            if let Some(params) = incoming.params {
                if Some(&params.subscription) == self.subscription_id.as_ref() {
                    match serde_json::from_value::<RawHead>(params.result) {
                        Ok(head) => self.pending_heads.push_back(head),
                        Err(e) => warn!("[stream] head notification dropped: {}", e),
                    }
                }
            }
            return Ok(None);
        }

        if incoming.id == want_id && want_id.is_some() {
            if let Some(error) = incoming.error {
                return Err(IngestError::Transport(format!(
                    "rpc error {}: {}",
                    error.code, error.message
                )));
            }
            return Ok(Some(incoming.result.unwrap_or(serde_json::Value::Null)));
        }

        if let Some(error) = incoming.error {
            warn!("[stream] unsolicited rpc error {}: {}", error.code, error.message);
        }
        Ok(None)
    }
}
