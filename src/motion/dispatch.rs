//! Motion event fan-out
//!
//! When a registered callback fires, the dispatcher derives one event per
//! detection kind and publishes each to the sink independently. The context
//! is an explicit value type; nothing is captured beyond these fields.

use crate::device::{AiKind, DeviceEvent, DeviceSession, EventSink};
use std::sync::Arc;

/// Context for one (camera, channel) motion registration
#[derive(Clone)]
pub struct MotionDispatch {
    pub camera_name: String,
    pub host: String,
    pub channel: u8,
    pub sink: Arc<dyn EventSink>,
}

impl MotionDispatch {
    /// Emit the derived events for one callback invocation: generic motion,
    /// visitor (doorbell), and the AI detections when the device supports
    /// them. A failed publication is logged and does not stop the remaining
    /// emissions.
    pub fn fire(&self, session: &dyn DeviceSession) {
        let channel = self.channel;
        tracing::debug!(
            camera = %self.camera_name,
            channel,
            "Motion event callback fired"
        );

        self.publish("motion", session.motion_detected(channel));
        self.publish("EvVisitor", session.visitor_detected(channel));

        if session.ai_supported(channel) {
            self.publish("EvPeopleDetect", session.ai_detected(channel, AiKind::Person));
            self.publish("EvVehicleDetect", session.ai_detected(channel, AiKind::Vehicle));
            self.publish("EvDogCatDetect", session.ai_detected(channel, AiKind::Pet));
        }
    }

    fn publish(&self, message: &str, state: bool) {
        let event = DeviceEvent {
            message: message.to_string(),
            ip: self.host.clone(),
            channel: self.channel,
            motionstate: state as u8,
        };

        match self.sink.publish(event) {
            Ok(()) => {
                tracing::debug!(
                    camera = %self.camera_name,
                    channel = self.channel,
                    message = %message,
                    state = state as u8,
                    "Motion event sent"
                );
            }
            Err(e) => {
                tracing::error!(
                    camera = %self.camera_name,
                    channel = self.channel,
                    message = %message,
                    error = %e,
                    "Failed to send motion event"
                );
            }
        }
    }
}
