//! In-memory fakes for the device traits, shared across unit tests

use crate::device::{
    AiKind, CommandAction, ConnectParams, DeviceEvent, DeviceSession, EventCallback, EventKind,
    EventSink, SessionConnector,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pointer identity of two session handles
pub fn same_session(a: &Arc<dyn DeviceSession>, b: &Arc<dyn DeviceSession>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

struct RegisteredCallback {
    id: String,
    kind: EventKind,
    channel: u8,
    callback: EventCallback,
}

/// Scriptable device session
pub struct FakeSession {
    #[allow(dead_code)]
    host: String,
    active: AtomicBool,
    subscribed: AtomicBool,
    subscribe_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    fail_logout: AtomicBool,
    fail_refresh: AtomicBool,
    fail_commands: AtomicBool,
    new_devices: AtomicBool,
    refresh_delay: Mutex<Option<Duration>>,
    command_delay: Mutex<Option<Duration>>,
    sent_commands: Mutex<Vec<(u8, CommandAction)>>,
    callbacks: Mutex<Vec<RegisteredCallback>>,
    motion: Mutex<HashSet<u8>>,
    visitor: Mutex<HashSet<u8>>,
    ai_capable: Mutex<HashSet<u8>>,
    ai_states: Mutex<HashSet<(u8, AiKind)>>,
}

impl FakeSession {
    pub fn new(host: &str) -> Arc<Self> {
        Arc::new(Self {
            host: host.to_string(),
            active: AtomicBool::new(true),
            subscribed: AtomicBool::new(false),
            subscribe_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            fail_logout: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            fail_commands: AtomicBool::new(false),
            new_devices: AtomicBool::new(false),
            refresh_delay: Mutex::new(None),
            command_delay: Mutex::new(None),
            sent_commands: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            motion: Mutex::new(HashSet::new()),
            visitor: Mutex::new(HashSet::new()),
            ai_capable: Mutex::new(HashSet::new()),
            ai_states: Mutex::new(HashSet::new()),
        })
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn set_fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    pub fn logout_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_new_devices(&self, value: bool) {
        self.new_devices.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn set_command_delay(&self, delay: Duration) {
        *self.command_delay.lock().unwrap() = Some(delay);
    }

    pub fn commands(&self) -> Vec<(u8, CommandAction)> {
        self.sent_commands.lock().unwrap().clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn set_motion(&self, channel: u8, detected: bool) {
        set_flag(&self.motion, channel, detected);
    }

    pub fn set_visitor(&self, channel: u8, detected: bool) {
        set_flag(&self.visitor, channel, detected);
    }

    pub fn set_ai_supported(&self, channel: u8, supported: bool) {
        set_flag(&self.ai_capable, channel, supported);
    }

    pub fn set_ai_detected(&self, channel: u8, kind: AiKind, detected: bool) {
        set_flag(&self.ai_states, (channel, kind), detected);
    }

    /// Invoke every motion callback registered for a channel, the way the
    /// session's event dispatcher would on an incoming push event
    pub fn fire_motion(&self, channel: u8) {
        let snapshot: Vec<EventCallback> = {
            let callbacks = self.callbacks.lock().unwrap();
            callbacks
                .iter()
                .filter(|c| c.kind == EventKind::Motion && c.channel == channel)
                .map(|c| c.callback.clone())
                .collect()
        };
        for callback in snapshot {
            callback(self);
        }
    }
}

fn set_flag<T: std::hash::Hash + Eq>(set: &Mutex<HashSet<T>>, key: T, value: bool) {
    let mut set = set.lock().unwrap();
    if value {
        set.insert(key);
    } else {
        set.remove(&key);
    }
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn fetch_metadata(&self) -> Result<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Error::Device("metadata fetch failed".to_string()));
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(Error::Device("logout failed".to_string()));
        }
        Ok(())
    }

    async fn send_command(&self, channel: u8, action: &CommandAction) -> Result<()> {
        let delay = *self.command_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(Error::Device("command rejected".to_string()));
        }
        self.sent_commands
            .lock()
            .unwrap()
            .push((channel, action.clone()));
        Ok(())
    }

    async fn subscribe_events(&self) -> Result<()> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    fn register_callback(&self, id: &str, callback: EventCallback, kind: EventKind, channel: u8) {
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.retain(|c| c.id != id);
        callbacks.push(RegisteredCallback {
            id: id.to_string(),
            kind,
            channel,
            callback,
        });
    }

    fn unregister_callback(&self, id: &str) {
        self.callbacks.lock().unwrap().retain(|c| c.id != id);
    }

    fn callback_count(&self, kind: EventKind, channel: u8) -> usize {
        self.callbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.kind == kind && c.channel == channel)
            .count()
    }

    fn channels_with_callbacks(&self, kind: EventKind) -> Vec<u8> {
        let channels: HashSet<u8> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.channel)
            .collect();
        channels.into_iter().collect()
    }

    fn has_new_devices(&self) -> bool {
        self.new_devices.load(Ordering::SeqCst)
    }

    fn motion_detected(&self, channel: u8) -> bool {
        self.motion.lock().unwrap().contains(&channel)
    }

    fn visitor_detected(&self, channel: u8) -> bool {
        self.visitor.lock().unwrap().contains(&channel)
    }

    fn ai_supported(&self, channel: u8) -> bool {
        self.ai_capable.lock().unwrap().contains(&channel)
    }

    fn ai_detected(&self, channel: u8, kind: AiKind) -> bool {
        self.ai_states.lock().unwrap().contains(&(channel, kind))
    }
}

/// Connector that fabricates one [`FakeSession`] per connect call, in order
pub struct FakeConnector {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    connects: AtomicUsize,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeConnector {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: Mutex::new(None),
        })
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The i-th session ever handed out, in creation order
    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn DeviceSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Device("connection refused".to_string()));
        }
        let session = FakeSession::new(&params.host);
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

/// Sink that records published events; individual messages can be scripted
/// to fail
pub struct FakeSink {
    published: Mutex<Vec<DeviceEvent>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeSink {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail_message(&self, message: &str) {
        self.failing.lock().unwrap().insert(message.to_string());
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.published.lock().unwrap().clone()
    }
}

impl EventSink for FakeSink {
    fn publish(&self, event: DeviceEvent) -> Result<()> {
        if self.failing.lock().unwrap().contains(&event.message) {
            return Err(Error::Sink(format!("sink rejected {}", event.message)));
        }
        self.published.lock().unwrap().push(event);
        Ok(())
    }
}
