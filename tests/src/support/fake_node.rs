//! A minimal upstream node speaking the subscription protocol over a real
//! WebSocket: `eth_subscribe`/`eth_unsubscribe`, `eth_blockNumber`, and
//! `eth_getBlockByNumber` served from the deterministic sample chain.
//!
//! Connections can be kicked to exercise the producer's reconnect path.

use block_sink::test_utils::sample_block;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

const SUBSCRIPTION_ID: &str = "0xfeedc0de";

/// Handle to a running fake node.
pub struct FakeNode {
    addr: SocketAddr,
    chain_tip: Arc<RwLock<u64>>,
    heads_tx: broadcast::Sender<u64>,
    kick_tx: broadcast::Sender<()>,
    _accept_loop: JoinHandle<()>,
}

impl FakeNode {
    /// Start a node whose chain currently ends at `chain_tip`.
    pub async fn start(chain_tip: u64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let tip = Arc::new(RwLock::new(chain_tip));
        let (heads_tx, _) = broadcast::channel(64);
        let (kick_tx, _) = broadcast::channel(4);

        let accept_tip = Arc::clone(&tip);
        let accept_heads = heads_tx.clone();
        let accept_kick = kick_tx.clone();
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(
                    stream,
                    Arc::clone(&accept_tip),
                    accept_heads.subscribe(),
                    accept_kick.subscribe(),
                ));
            }
        });

        Self {
            addr,
            chain_tip: tip,
            heads_tx,
            kick_tx,
            _accept_loop: accept_loop,
        }
    }

    /// WebSocket URL of the node.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Extend the chain to `number` and notify subscribers.
    pub fn announce(&self, number: u64) {
        *self.chain_tip.write() = number;
        let _ = self.heads_tx.send(number);
    }

    /// Move the chain tip without notifying anyone, as if notifications
    /// were missed.
    pub fn set_tip_silently(&self, number: u64) {
        *self.chain_tip.write() = number;
    }

    /// Re-announce an existing number, as a short reorg would.
    pub fn reannounce(&self, number: u64) {
        let _ = self.heads_tx.send(number);
    }

    /// Drop every open connection.
    pub fn kick_connections(&self) {
        let _ = self.kick_tx.send(());
    }
}

async fn serve_connection(
    stream: TcpStream,
    chain_tip: Arc<RwLock<u64>>,
    mut heads_rx: broadcast::Receiver<u64>,
    mut kick_rx: broadcast::Receiver<()>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let mut subscribed = false;

    loop {
        tokio::select! {
            _ = kick_rx.recv() => {
                return;
            }
            head = heads_rx.recv() => {
                if let (true, Ok(number)) = (subscribed, head) {
                    let notification = json!({
                        "jsonrpc": "2.0",
                        "method": "eth_subscription",
                        "params": {
                            "subscription": SUBSCRIPTION_ID,
                            "result": { "number": format!("0x{number:x}") }
                        }
                    });
                    if write
                        .send(Message::Text(notification.to_string().into()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            message = read.next() => {
                let Some(Ok(message)) = message else { return };
                match message {
                    Message::Text(text) => {
                        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        let response = respond(&request, &chain_tip, &mut subscribed);
                        if write
                            .send(Message::Text(response.to_string().into()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Message::Ping(payload) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            return;
                        }
                    }
                    Message::Close(_) => return,
                    _ => {}
                }
            }
        }
    }
}

fn respond(request: &Value, chain_tip: &RwLock<u64>, subscribed: &mut bool) -> Value {
    let id = request["id"].clone();
    let result = match request["method"].as_str() {
        Some("eth_subscribe") => {
            *subscribed = true;
            json!(SUBSCRIPTION_ID)
        }
        Some("eth_unsubscribe") => {
            *subscribed = false;
            json!(true)
        }
        Some("eth_blockNumber") => json!(format!("0x{:x}", *chain_tip.read())),
        Some("eth_getBlockByNumber") => {
            let requested = request["params"][0]
                .as_str()
                .and_then(|raw| u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok());
            match requested {
                Some(number) if number <= *chain_tip.read() => block_json(number),
                _ => Value::Null,
            }
        }
        _ => {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" }
            })
        }
    };
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// The sample chain's block, in the upstream hex wire form.
fn block_json(number: u64) -> Value {
    let block = sample_block(number);
    let transactions: Vec<Value> = (0..block.transaction_count).map(|_| json!({})).collect();
    json!({
        "number": format!("0x{:x}", block.number),
        "timestamp": format!("0x{:x}", block.unix_timestamp()),
        "gasLimit": format!("0x{:x}", block.gas_limit),
        "gasUsed": format!("0x{:x}", block.gas_used),
        "baseFeePerGas": format!("0x{:x}", block.base_fee_per_gas),
        "difficulty": format!("0x{:x}", block.difficulty),
        "totalDifficulty": format!("0x{:x}", block.total_difficulty),
        "size": format!("0x{:x}", block.size),
        "blobGasUsed": block.blob_gas_used.map(|v| format!("0x{v:x}")),
        "excessBlobGas": block.excess_blob_gas.map(|v| format!("0x{v:x}")),
        "transactions": transactions,
    })
}
