//! MotionSubscriptionManager - per-channel motion event subscriptions
//!
//! ## Responsibilities
//!
//! - Register/unregister motion callbacks against a session's push-event
//!   subscription
//! - Answer "is motion detection enabled" per (camera, channel)
//! - Report cached sessions with active motion callbacks
//!
//! A (session, channel) pair is motion-enabled iff the session is
//! subscribed to the event stream AND at least one motion callback is
//! registered for that channel. Disabling removes the callback only; the
//! subscription itself is shared across channels and stays active.

mod dispatch;

pub use dispatch::MotionDispatch;

use crate::command_executor::CommandExecutor;
use crate::device::{CameraConfig, DeviceSession, EventCallback, EventKind, EventSink, SessionKey};
use crate::error::{Error, Result};
use crate::session_cache::SessionCache;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One session with registered motion callbacks (health/status view)
#[derive(Debug, Clone, Serialize)]
pub struct ActiveMotionSession {
    pub session_key: SessionKey,
    pub channels: Vec<u8>,
    pub callback_count: usize,
}

pub struct MotionSubscriptionManager {
    cache: Arc<SessionCache>,
    sink: Arc<dyn EventSink>,
    executor: CommandExecutor,
}

impl MotionSubscriptionManager {
    pub fn new(cache: Arc<SessionCache>, sink: Arc<dyn EventSink>) -> Self {
        let executor = CommandExecutor::new(cache.config().command_timeout);
        Self {
            cache,
            sink,
            executor,
        }
    }

    /// Enable motion detection for a camera: register the fan-out callback
    /// under a deterministic id and subscribe the session to the push-event
    /// stream if it is not already subscribed.
    pub async fn enable(
        &self,
        camera_name: &str,
        cameras: &HashMap<String, CameraConfig>,
    ) -> Result<()> {
        let config = lookup(camera_name, cameras)?;
        let key = config.session_key();
        let session = self
            .cache
            .get_or_create(&key, &config.connect_params())
            .await?;
        let channel = config.channel;

        let dispatch = MotionDispatch {
            camera_name: camera_name.to_string(),
            host: config.host.clone(),
            channel,
            sink: Arc::clone(&self.sink),
        };
        let callback: EventCallback = Arc::new(move |session| dispatch.fire(session));
        session.register_callback(
            &callback_id(camera_name, channel),
            callback,
            EventKind::Motion,
            channel,
        );

        if !session.is_subscribed() {
            self.executor
                .bounded(&key, "subscribe_events", session.subscribe_events())
                .await?;
        }

        tracing::info!(camera = %camera_name, channel, "Motion detection enabled");
        Ok(())
    }

    /// Disable motion detection for a camera by unregistering its callback.
    /// The event subscription stays active for other channels/callbacks.
    pub async fn disable(
        &self,
        camera_name: &str,
        cameras: &HashMap<String, CameraConfig>,
    ) -> Result<()> {
        let config = lookup(camera_name, cameras)?;
        let session = self
            .cache
            .get_or_create(&config.session_key(), &config.connect_params())
            .await?;

        session.unregister_callback(&callback_id(camera_name, config.channel));

        tracing::info!(camera = %camera_name, channel = config.channel, "Motion detection disabled");
        Ok(())
    }

    /// Whether motion detection is enabled for a camera's channel
    pub async fn is_enabled(
        &self,
        camera_name: &str,
        cameras: &HashMap<String, CameraConfig>,
    ) -> Result<bool> {
        let config = lookup(camera_name, cameras)?;
        let session = self
            .cache
            .get_or_create(&config.session_key(), &config.connect_params())
            .await?;

        let subscribed = session.is_subscribed();
        let has_callback = session.callback_count(EventKind::Motion, config.channel) > 0;

        tracing::debug!(
            camera = %camera_name,
            channel = config.channel,
            subscribed,
            has_callback,
            "Motion detection status"
        );
        Ok(subscribed && has_callback)
    }

    /// Cached sessions that are subscribed and have motion callbacks
    /// registered. Read-only diagnostic view, no mutation.
    pub async fn list_active(&self) -> Vec<ActiveMotionSession> {
        let mut active = Vec::new();
        for (key, session) in self.cache.sessions_snapshot().await {
            if !session.is_subscribed() {
                continue;
            }
            let mut channels = session.channels_with_callbacks(EventKind::Motion);
            if channels.is_empty() {
                continue;
            }
            channels.sort_unstable();
            let callback_count = channels
                .iter()
                .map(|&ch| session.callback_count(EventKind::Motion, ch))
                .sum();
            active.push(ActiveMotionSession {
                session_key: key,
                channels,
                callback_count,
            });
        }
        active
    }
}

fn callback_id(camera_name: &str, channel: u8) -> String {
    format!("{}_ch{}_motion", camera_name, channel)
}

fn lookup<'a>(
    camera_name: &str,
    cameras: &'a HashMap<String, CameraConfig>,
) -> Result<&'a CameraConfig> {
    cameras
        .get(camera_name)
        .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_name)))
}
