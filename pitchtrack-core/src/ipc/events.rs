//! Event types broadcast by [`crate::PitchTracker`].
//!
//! | Event | Receiver |
//! |-------|----------|
//! | `PitchEvent` | `PitchTracker::subscribe_pitches` |
//! | `EngineStatusEvent` | `PitchTracker::subscribe_status` |

use serde::{Deserialize, Serialize};

use crate::frame::FrameResult;

/// One analysed frame from the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    #[serde(flatten)]
    pub result: FrameResult,
}

/// Emitted when the tracker changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Lifecycle state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, or warmed up and waiting for `start()`.
    Idle,
    /// Loading weights and running a dummy inference.
    WarmingUp,
    /// Capturing audio and emitting pitch events.
    Listening,
    /// Stop requested; buffered frames are being drained.
    Draining,
    /// Capture stopped; the tracker may be restarted.
    Stopped,
    /// Unrecoverable error, restart required.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_event_flattens_the_frame_result() {
        let event = PitchEvent {
            seq: 4,
            result: FrameResult {
                pitch_hz: 440.0,
                confidence: 0.5,
                time_sec: 0.256,
            },
        };

        let json = serde_json::to_value(&event).expect("serialize pitch event");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["pitchHz"], 440.0);
        assert_eq!(json["confidence"], 0.5);
        let t = json["timeSec"].as_f64().expect("timeSec should be a number");
        assert!((t - 0.256).abs() < 1e-6);

        let round_trip: PitchEvent = serde_json::from_value(json).expect("deserialize pitch event");
        assert_eq!(round_trip, event);
    }

    #[test]
    fn engine_status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::WarmingUp,
            detail: Some("loading model".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "warmingup");
        assert_eq!(json["detail"], "loading model");

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::WarmingUp);
        assert_eq!(round_trip.detail.as_deref(), Some("loading model"));
    }

    #[test]
    fn engine_status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<EngineStatus>(r#""Listening""#).is_err());
        assert_eq!(
            serde_json::from_str::<EngineStatus>(r#""draining""#).unwrap(),
            EngineStatus::Draining
        );
    }
}
