//! Mock JSON-RPC exchange for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections and record every request
//! - Answer the requests the quoter sends with plausible results
//! - Push channel notifications and drop connections on demand

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Touch returned by `public/ticker`.
pub const BEST_BID: f64 = 99_990.0;
pub const BEST_ASK: f64 = 100_010.0;

#[derive(Debug, Clone)]
enum Push {
    Text(String),
    Drop,
}

/// A mock exchange.
pub struct MockExchange {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    push_tx: broadcast::Sender<Push>,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockExchange {
    /// Start a new mock exchange on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (push_tx, _) = broadcast::channel::<Push>(64);

        let requests_clone = requests.clone();
        let connections_clone = connections.clone();
        let push_clone = push_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            requests_clone.clone(),
                            connections_clone.clone(),
                            push_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            push_tx,
            requests,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// All requests received so far, in arrival order.
    pub async fn requests(&self) -> Vec<Value> {
        self.requests.lock().await.clone()
    }

    /// Requests for one method.
    pub async fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r["method"] == method)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` requests for `method` have arrived.
    pub async fn wait_for(&self, method: &str, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            loop {
                if self.requests_for(method).await.len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Send a channel notification to every open connection.
    pub fn notify(&self, channel: &str, notification: Value) {
        let text = json!({ "channel_name": channel, "notification": notification }).to_string();
        let _ = self.push_tx.send(Push::Text(text));
    }

    /// Drop every open connection without a close frame.
    pub fn drop_connections(&self) {
        let _ = self.push_tx.send(Push::Drop);
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<Mutex<u32>>,
    mut push_rx: broadcast::Receiver<Push>,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    requests.lock().await.push(request.clone());
                    let response = respond(&request);
                    let _ = write.send(Message::Text(response.to_string())).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            push = push_rx.recv() => match push {
                Ok(Push::Text(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Ok(Push::Drop) | Err(_) => break,
            },
        }
    }
}

/// Answer a JSON-RPC request the way the exchange would.
fn respond(request: &Value) -> Value {
    let id = request["id"].clone();
    let params = &request["params"];
    let method = request["method"].as_str().unwrap_or_default();

    let result = match method {
        "public/ticker" => json!({
            "best_bid_price": BEST_BID,
            "best_ask_price": BEST_ASK,
            "mark_price": (BEST_BID + BEST_ASK) / 2.0,
        }),
        "private/open_orders" => json!([]),
        "private/insert" => json!({
            "client_order_id": params["client_order_id"],
            "instrument_name": params["instrument_name"],
            "direction": params["direction"],
            "price": params["price"],
            "amount": params["amount"],
            "filled_amount": 0,
            "label": params["label"],
            "status": "open",
        }),
        "private/amend" => json!({
            "client_order_id": params["client_order_id"],
            "price": params["price"],
            "amount": params["amount"],
            "filled_amount": 0,
            "status": "open",
        }),
        "private/cancel" => json!({
            "client_order_id": params["client_order_id"],
            "status": "cancelled",
        }),
        "private/cancel_all" => json!(0),
        "private/account_summary" => json!({
            "unrealised_pnl": 0.0,
            "session_realised_pnl": 0.0,
        }),
        _ => Value::Null,
    };
    json!({ "id": id, "result": result })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_exchange_starts() {
        let server = MockExchange::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }

    #[test]
    fn test_insert_echoes_order() {
        let response = respond(&json!({
            "id": 7,
            "method": "private/insert",
            "params": { "client_order_id": 1, "direction": "buy", "price": 10.0, "amount": 1.0 }
        }));
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"]["status"], "open");
        assert_eq!(response["result"]["client_order_id"], 1);
    }
}
