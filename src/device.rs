//! Capability contracts for the device protocol client and the event sink
//!
//! The core never talks a device protocol itself. It consumes an opaque
//! authenticated handle (`DeviceSession`), a way to open one
//! (`SessionConnector`) and a downstream notification sink (`EventSink`).

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Default Baichuan port for cameras and HomeHub/NVR controllers
pub const DEFAULT_DEVICE_PORT: u16 = 9000;

/// Identifier for one device endpoint, derived from host and port.
/// Stable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(host: &str, port: u16) -> Self {
        Self(format!("{}:{}", host, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection parameters for one device endpoint
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub username: String,
    pub password: String,
    pub port: u16,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            port: DEFAULT_DEVICE_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Cache key for this endpoint
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.host, self.port)
    }
}

/// Connection params end up in logs; the username is masked, the password
/// never printed.
impl fmt::Display for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user: String = self.username.chars().take(3).collect();
        if self.username.chars().count() > 3 {
            write!(f, "host={}:{}, user={}***", self.host, self.port, user)
        } else {
            write!(f, "host={}:{}, user=***", self.host, self.port)
        }
    }
}

/// Per-camera configuration supplied by the caller's config layer
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub port: u16,
    /// Channel of this camera on its hub (0 for standalone cameras)
    pub channel: u8,
}

impl CameraConfig {
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams::new(&self.host, &self.username, &self.password).with_port(self.port)
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.host, self.port)
    }
}

/// One-shot device command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Move to a stored PTZ preset position
    PtzPreset(u8),
    /// Sound the siren, optionally for a fixed duration in seconds
    Siren { duration: Option<u32> },
}

impl CommandAction {
    /// Human-readable command name for logs and error classification
    pub fn name(&self) -> String {
        match self {
            CommandAction::PtzPreset(id) => format!("Active preset {}", id),
            CommandAction::Siren { duration: Some(d) } => {
                format!("Active siren (duration: {})", d)
            }
            CommandAction::Siren { duration: None } => "Active siren".to_string(),
        }
    }
}

/// Push-event kinds a callback can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Motion,
}

/// AI detection classes reported by capable devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiKind {
    Person,
    Vehicle,
    Pet,
}

impl AiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiKind::Person => "people",
            AiKind::Vehicle => "vehicle",
            AiKind::Pet => "pet",
        }
    }
}

/// Event record published to the downstream notification sink.
/// Shape is kept compatible with the ONVIF webhook records the sink
/// already understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEvent {
    pub message: String,
    pub ip: String,
    pub channel: u8,
    pub motionstate: u8,
}

/// Callback invoked by the session's event dispatcher when a subscribed
/// event fires; the dispatcher passes the session so the callback can read
/// the current detection states.
pub type EventCallback = Arc<dyn Fn(&dyn DeviceSession) + Send + Sync>;

/// Opaque authenticated handle to a device, owned by the cache while stored.
///
/// Callers receiving a session from the cache must treat it as borrowed:
/// the cache remains the authoritative owner and may close or replace it.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Re-fetch device metadata (host data, channel topology)
    async fn fetch_metadata(&self) -> Result<()>;

    /// Whether the underlying connection still considers itself alive
    fn is_active(&self) -> bool;

    /// Close the session. Best-effort: the cache swallows failures.
    async fn logout(&self) -> Result<()>;

    /// Send a one-shot command for a channel
    async fn send_command(&self, channel: u8, action: &CommandAction) -> Result<()>;

    /// Subscribe to the push-event stream. The subscription is shared
    /// across channels and callbacks.
    async fn subscribe_events(&self) -> Result<()>;

    fn is_subscribed(&self) -> bool;

    /// Register an event callback under a caller-chosen id
    fn register_callback(&self, id: &str, callback: EventCallback, kind: EventKind, channel: u8);

    fn unregister_callback(&self, id: &str);

    /// Number of callbacks registered for (kind, channel)
    fn callback_count(&self, kind: EventKind, channel: u8) -> usize;

    /// Channels with at least one callback registered for the kind
    fn channels_with_callbacks(&self, kind: EventKind) -> Vec<u8>;

    /// Whether the last metadata refresh revealed new sub-devices
    fn has_new_devices(&self) -> bool;

    /// Latest motion state for a channel
    fn motion_detected(&self, channel: u8) -> bool;

    /// Latest visitor (doorbell) state for a channel
    fn visitor_detected(&self, channel: u8) -> bool;

    /// Whether the device reports AI capability for a channel
    fn ai_supported(&self, channel: u8) -> bool;

    /// Latest AI detection state for a channel
    fn ai_detected(&self, channel: u8, kind: AiKind) -> bool;
}

/// Opens new device sessions (protocol-level connect, authenticate and
/// initial capability fetch). The cache bounds each call with its connect
/// timeout.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn DeviceSession>>;
}

/// Downstream notification sink. Publication is best-effort: failures are
/// logged by the dispatcher and never propagated upward.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DeviceEvent) -> Result<()>;
}
