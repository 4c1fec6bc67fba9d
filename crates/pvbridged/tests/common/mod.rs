//! Shared test fixtures: a recording provider and an in-process bridge
//! harness without the WebSocket layer.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use pvbridge_core::{PvValue, RawUpdate, SubscriberId, VariableName};
use pvbridged::dispatch::{Dispatcher, Frame, Outboxes, UpdateSink};
use pvbridged::provider::{ProviderError, PvProvider};
use pvbridged::registry::{spawn_registry, RegistryHandle};
use pvbridged::server::ClientSession;

/// Maximum time to wait for a frame that should arrive
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait before concluding no frame is coming
pub const SILENCE: Duration = Duration::from_millis(150);

// ============================================================================
// Recording Provider
// ============================================================================

/// One provider call, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Subscribe(VariableName),
    Unsubscribe(VariableName),
    Write(VariableName, PvValue),
}

#[derive(Default)]
struct Recorded {
    calls: Vec<Call>,
    sinks: HashMap<VariableName, UpdateSink>,
    failing: HashSet<VariableName>,
}

/// Provider double that records every call and lets tests inject updates.
#[derive(Clone, Default)]
pub struct RecordingProvider {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn subscribe_count(&self, name: &str) -> usize {
        self.count(|call| matches!(call, Call::Subscribe(v) if v.as_str() == name))
    }

    pub fn unsubscribe_count(&self, name: &str) -> usize {
        self.count(|call| matches!(call, Call::Unsubscribe(v) if v.as_str() == name))
    }

    pub fn writes(&self) -> Vec<(VariableName, PvValue)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(v, value) => Some((v, value)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.inner.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    /// Makes subscribe fail for `name`.
    pub fn fail_subscribe(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing
            .insert(VariableName::new(name));
    }

    /// Simulates an upstream update through the sink given at subscribe
    /// time. Returns false if the variable is not monitored.
    pub fn emit(&self, name: &str, update: RawUpdate) -> bool {
        let variable = VariableName::new(name);
        let sink = self.inner.lock().unwrap().sinks.get(&variable).cloned();
        match sink {
            Some(sink) => sink.push(variable, update),
            None => false,
        }
    }
}

#[async_trait]
impl PvProvider for RecordingProvider {
    async fn subscribe(
        &self,
        variable: &VariableName,
        updates: UpdateSink,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Subscribe(variable.clone()));
        if inner.failing.contains(variable) {
            return Err(ProviderError::UnknownChannel(variable.clone()));
        }
        inner.sinks.insert(variable.clone(), updates);
        Ok(())
    }

    async fn unsubscribe(&self, variable: &VariableName) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Unsubscribe(variable.clone()));
        inner.sinks.remove(variable);
        Ok(())
    }

    async fn write(&self, variable: &VariableName, value: PvValue) -> Result<(), ProviderError> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push(Call::Write(variable.clone(), value));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Registry, dispatcher and provider wired together as the server does.
pub struct Harness {
    pub registry: RegistryHandle,
    pub outboxes: Outboxes,
    pub provider: RecordingProvider,
    pub updates: UpdateSink,
    cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        let registry = spawn_registry();
        let outboxes = Outboxes::new();
        let (updates, update_rx) = UpdateSink::channel(64);
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher::new(registry.clone(), outboxes.clone());
        tokio::spawn(dispatcher.run(update_rx, cancel.clone()));

        Self {
            registry,
            outboxes,
            provider: RecordingProvider::new(),
            updates,
            cancel,
        }
    }

    /// Connects a client with the given id.
    pub async fn connect(&self, id: u64) -> TestClient {
        let id = SubscriberId::new(id);
        let (tx, rx) = mpsc::channel(64);
        self.outboxes.insert(id, tx.clone()).await;

        let session = ClientSession::new(
            id,
            self.registry.clone(),
            Arc::new(self.provider.clone()),
            self.updates.clone(),
            tx,
        );

        TestClient {
            session,
            outbox: rx,
            outboxes: self.outboxes.clone(),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A connected client driven directly through its session.
pub struct TestClient {
    pub session: ClientSession,
    pub outbox: mpsc::Receiver<Frame>,
    outboxes: Outboxes,
}

impl TestClient {
    pub fn id(&self) -> SubscriberId {
        self.session.id()
    }

    /// Feeds one text frame to the session.
    pub async fn send(&mut self, text: &str) {
        self.session
            .handle_text(text)
            .await
            .expect("session accepts frame");
    }

    pub async fn subscribe(&mut self, pvs: &[&str]) {
        let frame = serde_json::json!({"type": "subscribe", "pvs": pvs}).to_string();
        self.send(&frame).await;
    }

    /// Waits for the next outbound frame.
    pub async fn recv(&mut self) -> Value {
        let frame = timeout(RECV_TIMEOUT, self.outbox.recv())
            .await
            .expect("frame within timeout")
            .expect("outbox open");
        serde_json::from_str(&frame).expect("valid JSON frame")
    }

    /// Asserts nothing arrives for a short while.
    pub async fn assert_silent(&mut self) {
        if let Ok(Some(frame)) = timeout(SILENCE, self.outbox.recv()).await {
            panic!("unexpected frame for {}: {frame}", self.id());
        }
    }

    /// Runs the same cleanup the connection handler does.
    pub async fn disconnect(&mut self) -> Vec<VariableName> {
        let released = self.session.disconnect().await;
        self.outboxes.remove(self.id()).await;
        released
    }
}
