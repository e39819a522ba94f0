//! Reolink Session Daemon Library
//!
//! Session management core for Reolink cameras and HomeHub/NVR controllers
//!
//! ## Architecture (5 Components)
//!
//! 1. SessionCache - Cached authenticated sessions (LRU + TTL)
//! 2. KeyedLockRegistry - Per-endpoint connect serialization
//! 3. CommandExecutor - Timeout-bounded one-shot commands
//! 4. MotionSubscriptionManager - Push-event subscriptions per channel
//! 5. MotionDispatch - Per-detection-kind event fan-out
//!
//! ## Design Principles
//!
//! - One live session per device endpoint, the cache is its sole owner
//! - Device I/O never runs under the store lock
//! - Removal always attempts logout, and never fails because of it

pub mod command_executor;
pub mod config;
pub mod device;
pub mod error;
pub mod motion;
pub mod session_cache;

#[cfg(test)]
pub(crate) mod test_support;

pub use command_executor::{CameraCommands, CommandExecutor};
pub use config::CacheConfig;
pub use device::{
    AiKind, CameraConfig, CommandAction, ConnectParams, DeviceEvent, DeviceSession, EventCallback,
    EventKind, EventSink, SessionConnector, SessionKey, DEFAULT_DEVICE_PORT,
};
pub use error::{Error, Result};
pub use motion::{ActiveMotionSession, MotionDispatch, MotionSubscriptionManager};
pub use session_cache::{CacheStats, SessionCache};
