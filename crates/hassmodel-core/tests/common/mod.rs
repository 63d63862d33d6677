#![allow(dead_code, clippy::unwrap_used)]
// Shared fixtures for hassmodel-core integration tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast};
use tracing::Level;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

use hassmodel_api::{
    Error, HassArea, HassCommand, HassDevice, HassEntity, HassEvent, HassMessage, HassState,
    MessageReceiver, STATE_CHANGED, Transport,
};

pub const WAIT: Duration = Duration::from_secs(2);

// ── FakeTransport ───────────────────────────────────────────────────

/// In-memory hub: scripted fetch results, a broadcast for inbound
/// messages and a log of every command sent.
pub struct FakeTransport {
    inbound: broadcast::Sender<Arc<HassMessage>>,
    states: Mutex<Vec<HassState>>,
    areas: Mutex<Vec<HassArea>>,
    devices: Mutex<Vec<HassDevice>>,
    entities: Mutex<Vec<HassEntity>>,
    /// Pushed while `get_states` runs, to model events racing the fetch.
    during_state_fetch: Mutex<Vec<HassMessage>>,
    commands: Mutex<Vec<HassCommand>>,
    next_subscription_id: AtomicU64,
    /// Pushed as a trigger for the new id before the subscribe result returns.
    trigger_before_result: Mutex<Option<Value>>,
    fail_fetches: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    gate_unsubscribes: AtomicBool,
    unsubscribe_started: Notify,
    unsubscribe_release: Notify,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (inbound, _) = broadcast::channel(1024);
        Arc::new(Self {
            inbound,
            states: Mutex::new(Vec::new()),
            areas: Mutex::new(Vec::new()),
            devices: Mutex::new(Vec::new()),
            entities: Mutex::new(Vec::new()),
            during_state_fetch: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            next_subscription_id: AtomicU64::new(1),
            trigger_before_result: Mutex::new(None),
            fail_fetches: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            gate_unsubscribes: AtomicBool::new(false),
            unsubscribe_started: Notify::new(),
            unsubscribe_release: Notify::new(),
        })
    }

    // ── Scripting ──

    pub fn set_states(&self, states: Vec<HassState>) {
        *self.states.lock().unwrap() = states;
    }

    pub fn set_registry(&self, entities: Vec<HassEntity>, devices: Vec<HassDevice>, areas: Vec<HassArea>) {
        *self.entities.lock().unwrap() = entities;
        *self.devices.lock().unwrap() = devices;
        *self.areas.lock().unwrap() = areas;
    }

    pub fn push_during_state_fetch(&self, message: HassMessage) {
        self.during_state_fetch.lock().unwrap().push(message);
    }

    pub fn set_next_subscription_id(&self, id: u64) {
        self.next_subscription_id.store(id, Ordering::SeqCst);
    }

    pub fn set_trigger_before_result(&self, payload: Value) {
        *self.trigger_before_result.lock().unwrap() = Some(payload);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Hold unsubscribe commands until [`release_unsubscribe`] is called.
    pub fn gate_unsubscribes(&self) {
        self.gate_unsubscribes.store(true, Ordering::SeqCst);
    }

    pub async fn unsubscribe_started(&self) {
        self.unsubscribe_started.notified().await;
    }

    pub fn release_unsubscribe(&self) {
        self.unsubscribe_release.notify_one();
    }

    // ── Inbound ──

    pub fn push(&self, message: HassMessage) {
        self.inbound.send(Arc::new(message)).unwrap();
    }

    pub fn receiver_count(&self) -> usize {
        self.inbound.receiver_count()
    }

    // ── Inspection ──

    pub fn commands(&self) -> Vec<HassCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn unsubscribes(&self) -> Vec<u64> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                HassCommand::UnsubscribeEvents { subscription } => Some(subscription),
                HassCommand::SubscribeTrigger { .. } => None,
            })
            .collect()
    }

    fn check_reachable(&self) -> Result<(), Error> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailed {
                reason: "hub offline".into(),
            });
        }
        Ok(())
    }
}

impl Transport for FakeTransport {
    fn subscribe_messages(&self) -> Result<MessageReceiver, Error> {
        self.check_reachable()?;
        Ok(self.inbound.subscribe())
    }

    async fn get_states(&self) -> Result<Vec<HassState>, Error> {
        self.check_reachable()?;
        let racing: Vec<HassMessage> = self.during_state_fetch.lock().unwrap().drain(..).collect();
        for message in racing {
            self.push(message);
        }
        Ok(self.states.lock().unwrap().clone())
    }

    async fn get_areas(&self) -> Result<Vec<HassArea>, Error> {
        self.check_reachable()?;
        Ok(self.areas.lock().unwrap().clone())
    }

    async fn get_devices(&self) -> Result<Vec<HassDevice>, Error> {
        self.check_reachable()?;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn get_entities(&self) -> Result<Vec<HassEntity>, Error> {
        self.check_reachable()?;
        Ok(self.entities.lock().unwrap().clone())
    }

    async fn send_command(&self, command: HassCommand) -> Result<HassMessage, Error> {
        self.commands.lock().unwrap().push(command.clone());
        match command {
            HassCommand::SubscribeTrigger { .. } => {
                if self.fail_subscribe.load(Ordering::SeqCst) {
                    return Err(Error::CommandFailed {
                        code: "invalid_format".into(),
                        message: "unknown trigger platform".into(),
                    });
                }
                let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
                let early = self.trigger_before_result.lock().unwrap().take();
                if let Some(payload) = early {
                    self.push(HassMessage::trigger(id, payload));
                    // Give the demultiplexer time to see it before the caller does.
                    for _ in 0..4 {
                        tokio::task::yield_now().await;
                    }
                }
                Ok(result(id))
            }
            HassCommand::UnsubscribeEvents { subscription } => {
                if self.gate_unsubscribes.load(Ordering::SeqCst) {
                    self.unsubscribe_started.notify_one();
                    self.unsubscribe_release.notified().await;
                }
                tokio::task::yield_now().await;
                if self.fail_unsubscribe.load(Ordering::SeqCst) {
                    return Err(Error::NotConnected);
                }
                Ok(result(subscription))
            }
        }
    }
}

fn result(id: u64) -> HassMessage {
    HassMessage {
        id,
        message_type: "result".into(),
        success: Some(true),
        ..HassMessage::default()
    }
}

// ── Record builders ─────────────────────────────────────────────────

pub fn hass_state(entity_id: &str, state: &str) -> HassState {
    HassState {
        entity_id: entity_id.into(),
        state: state.into(),
        attributes: json!({}),
        ..HassState::default()
    }
}

pub fn hass_state_with(entity_id: &str, state: &str, attributes: Value) -> HassState {
    HassState {
        attributes,
        ..hass_state(entity_id, state)
    }
}

pub fn state_changed(entity_id: &str, old: Option<HassState>, new: Option<HassState>) -> HassMessage {
    HassMessage::event(
        1,
        HassEvent::new(
            STATE_CHANGED,
            Some(json!({
                "entity_id": entity_id,
                "old_state": old,
                "new_state": new,
            })),
        ),
    )
}

pub fn transition(entity_id: &str, from: &str, to: &str) -> HassMessage {
    state_changed(
        entity_id,
        Some(hass_state(entity_id, from)),
        Some(hass_state(entity_id, to)),
    )
}

pub fn plain_event(event_type: &str) -> HassMessage {
    HassMessage::event(1, HassEvent::new(event_type, Some(json!({}))))
}

pub fn area(id: &str, name: &str) -> HassArea {
    HassArea {
        id: id.into(),
        name: name.into(),
        ..HassArea::default()
    }
}

pub fn device(id: &str, area_id: Option<&str>) -> HassDevice {
    HassDevice {
        id: id.into(),
        area_id: area_id.map(Into::into),
        ..HassDevice::default()
    }
}

pub fn entity(entity_id: &str, device_id: Option<&str>, area_id: Option<&str>) -> HassEntity {
    HassEntity {
        entity_id: entity_id.into(),
        device_id: device_id.map(Into::into),
        area_id: area_id.map(Into::into),
        ..HassEntity::default()
    }
}

// ── Async helpers ───────────────────────────────────────────────────

/// Next stream item, failing the test if none arrives in time.
pub async fn next<S: Stream + Unpin>(stream: &mut S) -> Option<S::Item> {
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("timed out waiting for stream item")
}

// ── Log capture ─────────────────────────────────────────────────────

/// Counts events at a given level on the current thread.
struct LevelCounter {
    level: Level,
    count: Arc<AtomicUsize>,
}

impl<S: tracing::Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == self.level {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Install a thread-local subscriber counting `level` events. Use on
/// current-thread runtimes so spawned workers log into it too.
pub fn count_logs(level: Level) -> (Arc<AtomicUsize>, tracing::subscriber::DefaultGuard) {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(LevelCounter {
        level,
        count: Arc::clone(&count),
    });
    (count, tracing::subscriber::set_default(subscriber))
}
