//! Shared helpers for the loopback integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::SinkExt;
use rtl433_net::config::ConfigModel;
use rtl433_net::core::codec::FrameCodec;
use rtl433_net::protocol::handshake::client_await_config;
use rtl433_net::protocol::message::{Fields, Message};
use rtl433_net::{ClientIdentity, Dispatcher, Listener, Result, ServerIdentity, SessionRegistry};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

pub type Wire = Framed<TcpStream, FrameCodec>;

/// Everything the handler saw, in call order.
pub type Calls = Arc<Mutex<Vec<(ServerIdentity, ClientIdentity, Fields)>>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: SessionRegistry,
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl TestServer {
    pub async fn start(config: ConfigModel, dispatcher: Dispatcher) -> Self {
        let listener = Listener::bind(Arc::new(config), dispatcher)
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().addr();
        let registry = listener.registry();
        let (shutdown, rx) = mpsc::channel(1);
        let task = tokio::spawn(listener.serve(rx));

        Self {
            addr,
            registry,
            shutdown,
            task,
        }
    }

    /// Signal shutdown and wait for `serve` to return.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.send(()).await.expect("server still running");
        self.task.await.expect("serve task panicked")
    }
}

/// Loopback config on an ephemeral port.
pub fn loopback_config() -> ConfigModel {
    let mut config = ConfigModel::default();
    config.server.interface = "127.0.0.1".into();
    config.server.port = 0;
    config.server.idle_timeout = Duration::from_secs(5);
    config
}

/// A dispatcher that records every call.
pub fn recording_dispatcher() -> (Dispatcher, Calls) {
    let calls: Calls = Arc::default();
    let sink = calls.clone();
    let dispatcher = Dispatcher::from_fn(move |server, client, packet| {
        sink.lock()
            .unwrap()
            .push((*server, *client, packet.fields.clone()));
        Ok(())
    });
    (dispatcher, calls)
}

/// Connect and consume the CONFIG frame.
pub async fn connect(addr: SocketAddr) -> (Wire, ConfigModel) {
    let stream = TcpStream::connect(addr).await.expect("connect");
    let mut wire = Framed::new(stream, FrameCodec::default());
    let config = client_await_config(&mut wire, Duration::from_secs(5))
        .await
        .expect("config frame");
    (wire, config)
}

pub fn record(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        other => panic!("not an object: {other}"),
    }
}

pub async fn send_packet(wire: &mut Wire, value: Value) {
    let frame = Message::Packet(record(value)).to_frame().unwrap();
    wire.send(frame).await.expect("send packet");
}

pub fn identity_of(wire: &Wire) -> ClientIdentity {
    ClientIdentity::new(wire.get_ref().local_addr().unwrap())
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F: FnMut() -> bool>(what: &str, mut check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn models(calls: &Calls) -> Vec<Value> {
    calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, _, fields)| fields.get("model").cloned().unwrap_or(Value::Null))
        .collect()
}

/// Wait until the registry holds exactly `n` sessions.
pub async fn wait_for_sessions(registry: &SessionRegistry, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let len = registry.len().await;
        if len == n {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {n} sessions, have {len}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
