// One server per test binary, booted on an ephemeral port with fast timeouts.
#![allow(dead_code)]

use battle_server::SchedulerSettings;
use battle_server::domain::GameSetup;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

pub fn test_settings() -> SchedulerSettings {
    SchedulerSettings {
        setup: GameSetup {
            ready_timeout_ms: 2_000,
            turn_timeout_ms: 500,
            ..GameSetup::default()
        },
        expected_participants: 2,
    }
}

/// Returns the base URL (`http://host:port`) of the shared test server.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // The server thread owns its runtime so it outlives each `#[tokio::test]` runtime.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));
                battle_server::run_with_settings(listener, test_settings())
                    .await
                    .expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server did not become ready in time");
}

pub async fn connect(role: &str) -> Ws {
    let base = ensure_server().replacen("http://", "ws://", 1);
    let (ws, _) = connect_async(format!("{base}/ws?role={role}"))
        .await
        .expect("websocket connect");
    ws
}

pub async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("websocket send");
}

/// Reads messages until one of the given `type` arrives and returns its `data`.
pub async fn wait_for(ws: &mut Ws, message_type: &str) -> Value {
    let read = async {
        loop {
            let msg = ws
                .next()
                .await
                .expect("socket open")
                .expect("websocket recv");
            if !msg.is_text() {
                continue;
            }
            let value: Value = serde_json::from_str(msg.to_text().expect("text frame"))
                .expect("server sends JSON");
            if value["type"] == message_type {
                return value["data"].clone();
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {message_type}"))
}
