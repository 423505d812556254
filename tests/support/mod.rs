// Shared helpers for driving a real server over WebSockets.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tank_battle::network::server::{GameServer, PortSetting, ServerConfig};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(10);

// Start a server on an ephemeral loopback port and return it with its URL.
pub async fn start_server(config: ServerConfig) -> (Arc<GameServer>, String) {
    let config = ServerConfig { host: "127.0.0.1".into(), port: PortSetting::Fixed(0), ..config };
    let server = Arc::new(GameServer::bind(config).await.expect("bind test server"));
    let url = format!("ws://{}", server.local_addr().expect("local addr"));
    let runner = server.clone();
    tokio::spawn(async move { runner.run().await });
    (server, url)
}

pub async fn connect(url: &str) -> Socket {
    let (socket, _) = connect_async(url).await.expect("connect");
    socket
}

pub async fn send(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.expect("send");
}

// Next JSON message, whatever its type.
pub async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket open")
            .expect("socket error");
        match message {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid json"),
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => {}
        }
    }
}

// Next message of the given type, skipping others.
pub async fn expect_type(socket: &mut Socket, kind: &str) -> Value {
    loop {
        let value = next_json(socket).await;
        if value["type"] == kind {
            return value;
        }
    }
}

// Reason of the close frame the server sends.
pub async fn expect_close_reason(socket: &mut Socket) -> String {
    loop {
        let message = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for close");
        match message {
            Some(Ok(Message::Close(Some(frame)))) => return frame.reason.to_string(),
            Some(Ok(Message::Close(None))) | None => return String::new(),
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("socket error before close: {e}"),
        }
    }
}

pub fn bot_handshake(name: &str, secret: Option<&str>) -> Value {
    let mut hs = serde_json::json!({
        "type": "BotHandshake",
        "name": name,
        "version": "1.0",
        "authors": ["Test"],
        "gameTypes": ["classic"],
    });
    if let Some(secret) = secret {
        hs["secret"] = secret.into();
    }
    hs
}

pub fn controller_handshake(secret: Option<&str>) -> Value {
    let mut hs = serde_json::json!({ "type": "ControllerHandshake", "name": "Test Controller", "version": "1.0" });
    if let Some(secret) = secret {
        hs["secret"] = secret.into();
    }
    hs
}
