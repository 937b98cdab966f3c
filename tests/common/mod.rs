//! Common test utilities

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use herald::config::DispatchConfig;
use herald::dispatch::CampaignService;
use herald::models::MessagePayload;
use herald::sender::{
    AcceptAllValidator, ResolvedTarget, Sender, SenderError, TargetAddress,
};
use herald::storage::MemoryStore;

/// Scriptable in-memory sender
///
/// Failures are scripted per chat id; an optional semaphore gate lets a test
/// hold deliveries in flight, and an optional watch channel reports each
/// successful delivery as it happens.
#[derive(Default)]
pub struct MockSender {
    failing: Mutex<HashSet<i64>>,
    usernames: Mutex<HashMap<String, i64>>,
    unavailable: Mutex<bool>,
    delivered: Mutex<Vec<i64>>,
    gate: Option<Arc<Semaphore>>,
    notify: Mutex<Option<mpsc::UnboundedSender<i64>>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every delivery until the test releases a permit on the gate
    #[allow(dead_code)]
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Script a delivery failure for a chat id
    #[allow(dead_code)]
    pub fn fail_chat(&self, chat_id: i64) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    /// Register a username so `@name` targets resolve
    #[allow(dead_code)]
    pub fn register_username(&self, name: &str, chat_id: i64) {
        self.usernames
            .lock()
            .unwrap()
            .insert(name.to_string(), chat_id);
    }

    /// Make the whole transport unusable
    #[allow(dead_code)]
    pub fn make_unavailable(&self) {
        *self.unavailable.lock().unwrap() = true;
    }

    /// Receive a message for every successful delivery
    #[allow(dead_code)]
    pub fn watch(&self) -> mpsc::UnboundedReceiver<i64> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.notify.lock().unwrap() = Some(tx);
        rx
    }

    /// Chat ids delivered so far, in order
    #[allow(dead_code)]
    pub fn delivered(&self) -> Vec<i64> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sender for MockSender {
    async fn resolve(&self, target: &TargetAddress) -> Result<ResolvedTarget, SenderError> {
        match target {
            TargetAddress::Chat(id) => Ok(ResolvedTarget { chat_id: *id }),
            TargetAddress::Username(name) => self
                .usernames
                .lock()
                .unwrap()
                .get(name)
                .map(|id| ResolvedTarget { chat_id: *id })
                .ok_or_else(|| SenderError::NotFound {
                    target: format!("@{name}"),
                }),
        }
    }

    async fn deliver(
        &self,
        target: &ResolvedTarget,
        _payload: &MessagePayload,
    ) -> Result<(), SenderError> {
        if *self.unavailable.lock().unwrap() {
            return Err(SenderError::unavailable("transport is down"));
        }

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(SenderError::delivery("gate closed")),
            }
        }

        if self.failing.lock().unwrap().contains(&target.chat_id) {
            return Err(SenderError::delivery("scripted failure"));
        }

        self.delivered.lock().unwrap().push(target.chat_id);
        if let Some(tx) = self.notify.lock().unwrap().as_ref() {
            let _ = tx.send(target.chat_id);
        }
        Ok(())
    }
}

/// Dispatch configuration tuned for fast tests
pub fn fast_config() -> DispatchConfig {
    DispatchConfig {
        base_delay_ms: 1,
        batch_size: 2,
        sender_timeout_secs: 5,
        max_targets: 100,
        cancel_wait_ms: 5,
        cancel_wait_attempts: 100,
    }
}

/// Build a service over an in-memory store and the given sender
pub fn service_with(
    sender: Arc<MockSender>,
    config: DispatchConfig,
) -> (CampaignService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = CampaignService::new(
        store.clone(),
        store.clone(),
        sender,
        Arc::new(AcceptAllValidator),
        config,
    );
    (service, store)
}

/// A plain text payload
#[allow(dead_code)]
pub fn text_payload(body: &str) -> MessagePayload {
    MessagePayload::Text {
        body: body.to_string(),
    }
}
