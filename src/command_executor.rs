//! CommandExecutor - bounded execution of one-shot device commands
//!
//! ## Responsibilities
//!
//! - Wrap a single device call with the command deadline
//! - Classify failures uniformly (timeout vs device error, cause preserved)
//! - No retries; retry policy belongs to the caller
//!
//! The executor never holds a session lock: it only borrows a session the
//! cache handed out.

use crate::device::{CameraConfig, CommandAction, DeviceSession, SessionKey};
use crate::error::{Error, Result};
use crate::session_cache::SessionCache;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub struct CommandExecutor {
    command_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    /// Execute one command against a session, bounded by the command
    /// timeout. On timeout the call is cancelled and classified as
    /// [`Error::CommandTimeout`]; any other failure becomes
    /// [`Error::CommandFailed`] with the cause attached.
    pub async fn execute(
        &self,
        key: &SessionKey,
        session: &Arc<dyn DeviceSession>,
        channel: u8,
        action: &CommandAction,
    ) -> Result<()> {
        let name = action.name();
        tracing::info!(session_key = %key, channel, command = %name, "Executing command");
        self.bounded(key, &name, session.send_command(channel, action))
            .await?;
        tracing::info!(session_key = %key, channel, command = %name, "Command successful");
        Ok(())
    }

    /// Run any device-facing future under the command deadline. Shared with
    /// the event-subscription path, which uses the same deadline as one-shot
    /// commands.
    pub(crate) async fn bounded<T>(
        &self,
        key: &SessionKey,
        command: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(session_key = %key, command = %command, error = %e, "Command failed");
                Err(Error::CommandFailed {
                    key: key.clone(),
                    command: command.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::error!(session_key = %key, command = %command, "Command timeout");
                Err(Error::CommandTimeout {
                    key: key.clone(),
                    command: command.to_string(),
                })
            }
        }
    }
}

/// Command entry points that resolve a camera name against the
/// caller-supplied config map, fetch the session from the cache and execute
/// through the bounded executor.
pub struct CameraCommands {
    cache: Arc<SessionCache>,
    executor: CommandExecutor,
}

impl CameraCommands {
    pub fn new(cache: Arc<SessionCache>) -> Self {
        let executor = CommandExecutor::new(cache.config().command_timeout);
        Self { cache, executor }
    }

    /// Move a camera to a stored PTZ preset position
    pub async fn activate_preset(
        &self,
        camera_name: &str,
        preset_id: u8,
        cameras: &HashMap<String, CameraConfig>,
    ) -> Result<()> {
        self.run(camera_name, cameras, CommandAction::PtzPreset(preset_id))
            .await
    }

    /// Sound a camera's siren, optionally for a fixed duration in seconds
    pub async fn activate_siren(
        &self,
        camera_name: &str,
        duration: Option<u32>,
        cameras: &HashMap<String, CameraConfig>,
    ) -> Result<()> {
        self.run(camera_name, cameras, CommandAction::Siren { duration })
            .await
    }

    async fn run(
        &self,
        camera_name: &str,
        cameras: &HashMap<String, CameraConfig>,
        action: CommandAction,
    ) -> Result<()> {
        let config = cameras
            .get(camera_name)
            .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_name)))?;
        let key = config.session_key();
        let session = self
            .cache
            .get_or_create(&key, &config.connect_params())
            .await?;
        self.executor
            .execute(&key, &session, config.channel, &action)
            .await
    }
}
