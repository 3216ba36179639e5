//! Bus Messages
//!
//! Defines every message that travels over the event bus: lifecycle
//! requests going into the tracker and status/location events coming out.

use serde::{Deserialize, Serialize};

/// Tracking state held by the tracker and reported in status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingState {
    /// Positioning provider unavailable
    Disabled,
    /// Provider available, not recording
    Stopped,
    /// Recording
    Started,
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingState::Disabled => write!(f, "DISABLED"),
            TrackingState::Stopped => write!(f, "STOPPED"),
            TrackingState::Started => write!(f, "STARTED"),
        }
    }
}

/// Target of a `GpsChangeState` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeState {
    Start,
    Stop,
    Announce,
}

/// Lifecycle request handled by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Start,
    Stop,
    Announce,
    Reset,
    ChangeRefreshInterval(i64),
}

impl LifecycleRequest {
    /// Get the request name for logging
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleRequest::Start => "start",
            LifecycleRequest::Stop => "stop",
            LifecycleRequest::Announce => "announce",
            LifecycleRequest::Reset => "reset",
            LifecycleRequest::ChangeRefreshInterval(_) => "change_refresh_interval",
        }
    }
}

impl From<ChangeState> for LifecycleRequest {
    fn from(state: ChangeState) -> Self {
        match state {
            ChangeState::Start => LifecycleRequest::Start,
            ChangeState::Stop => LifecycleRequest::Stop,
            ChangeState::Announce => LifecycleRequest::Announce,
        }
    }
}

/// Published once per effective state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: TrackingState,
}

/// Published for every accepted fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters; barometric when a pressure sensor is reporting
    pub altitude: f64,
    pub timestamp_ms: i64,
    /// Horizontal accuracy in meters
    pub accuracy: f32,
    pub speed_mps: f32,
    /// Elapsed session distance in meters
    pub distance_m: f32,
}

/// Messages carried by the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusMessage {
    // ========== Inbound ==========
    /// Start, stop or announce tracking
    GpsChangeState { state: ChangeState },

    /// Zero the stored session distance
    ResetGpsState,

    /// Change the location refresh interval
    ChangeRefreshInterval { interval_ms: i64 },

    // ========== Outbound ==========
    /// Tracking status
    GpsStatus(StatusEvent),

    /// New location fix
    NewLocation(LocationEvent),
}

impl BusMessage {
    /// Get the lifecycle request carried by an inbound message
    pub fn as_request(&self) -> Option<LifecycleRequest> {
        match self {
            BusMessage::GpsChangeState { state } => Some((*state).into()),
            BusMessage::ResetGpsState => Some(LifecycleRequest::Reset),
            BusMessage::ChangeRefreshInterval { interval_ms } => {
                Some(LifecycleRequest::ChangeRefreshInterval(*interval_ms))
            }
            BusMessage::GpsStatus(_) | BusMessage::NewLocation(_) => None,
        }
    }

    /// Get the message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            BusMessage::GpsChangeState { .. } => "GpsChangeState",
            BusMessage::ResetGpsState => "ResetGpsState",
            BusMessage::ChangeRefreshInterval { .. } => "ChangeRefreshInterval",
            BusMessage::GpsStatus(_) => "GpsStatus",
            BusMessage::NewLocation(_) => "NewLocation",
        }
    }
}

impl From<LifecycleRequest> for BusMessage {
    fn from(request: LifecycleRequest) -> Self {
        match request {
            LifecycleRequest::Start => BusMessage::GpsChangeState {
                state: ChangeState::Start,
            },
            LifecycleRequest::Stop => BusMessage::GpsChangeState {
                state: ChangeState::Stop,
            },
            LifecycleRequest::Announce => BusMessage::GpsChangeState {
                state: ChangeState::Announce,
            },
            LifecycleRequest::Reset => BusMessage::ResetGpsState,
            LifecycleRequest::ChangeRefreshInterval(interval_ms) => {
                BusMessage::ChangeRefreshInterval { interval_ms }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_messages_map_to_requests() {
        let msg = BusMessage::GpsChangeState {
            state: ChangeState::Announce,
        };
        assert_eq!(msg.as_request(), Some(LifecycleRequest::Announce));

        let msg = BusMessage::ChangeRefreshInterval { interval_ms: 200 };
        assert_eq!(msg.as_request(), Some(LifecycleRequest::ChangeRefreshInterval(200)));

        let msg = BusMessage::GpsStatus(StatusEvent {
            status: TrackingState::Started,
        });
        assert_eq!(msg.as_request(), None);
    }

    #[test]
    fn test_status_json_shape() {
        let msg = BusMessage::GpsStatus(StatusEvent {
            status: TrackingState::Stopped,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"GpsStatus","status":"STOPPED"}"#);

        let parsed: BusMessage =
            serde_json::from_str(r#"{"type":"GpsChangeState","state":"START"}"#).unwrap();
        assert_eq!(parsed.as_request(), Some(LifecycleRequest::Start));
    }
}
