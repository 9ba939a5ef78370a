//! JSON payloads accepted on the inbound MQTT topics
//!
//! Every payload is an object tagged by `"type"`:
//!
//! ```json
//! {"type":"state","region_id":"home","state":"inside","latitude":52.1,"longitude":4.3}
//! {"type":"crossing","region_ids":["home","work"],"direction":"exit"}
//! {"type":"error","code":1000,"message":"geofence not available"}
//! {"type":"location","latitude":52.1,"longitude":4.3,"background":true}
//! {"type":"register","region":{"id":"home","latitude":52.1,"longitude":4.3,"radius":100}}
//! {"type":"unregister","region_id":"home"}
//! {"type":"unregister_all"}
//! {"state":"foreground"}
//! ```

use crate::domain::input::{LocationUpdate, RawCrossing, RawReport, TrackerInput};
use crate::domain::region::{Region, RegisterMode};
use crate::domain::types::{Coordinate, GeoEvent, LifecycleState, MembershipState, RegionId};
use serde::Deserialize;
use smallvec::SmallVec;
use thiserror::Error;

/// Inbound payload could not be decoded
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid UTF-8 payload")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("crossing names no regions")]
    EmptyCrossing,
}

/// Messages on the reports topic (monitoring service output)
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportMessage {
    State {
        region_id: RegionId,
        state: MembershipState,
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
    },
    Crossing {
        region_ids: SmallVec<[RegionId; 4]>,
        direction: GeoEvent,
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
    },
    Error {
        code: i32,
        #[serde(default)]
        message: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        background: bool,
    },
}

impl ReportMessage {
    pub fn into_input(self) -> Result<TrackerInput, WireError> {
        let input = match self {
            ReportMessage::State { region_id, state, latitude, longitude } => {
                TrackerInput::State(RawReport {
                    region_id,
                    state,
                    location: Coordinate::from_parts(latitude, longitude),
                })
            }
            ReportMessage::Crossing { region_ids, direction, latitude, longitude } => {
                if region_ids.is_empty() {
                    return Err(WireError::EmptyCrossing);
                }
                TrackerInput::Crossing(RawCrossing {
                    region_ids,
                    direction,
                    location: Coordinate::from_parts(latitude, longitude),
                })
            }
            ReportMessage::Error { code, message } => TrackerInput::MonitorError { code, message },
            ReportMessage::Location { latitude, longitude, background } => TrackerInput::Location(
                LocationUpdate::new(Coordinate::new(latitude, longitude), background),
            ),
        };
        Ok(input)
    }
}

/// Messages on the commands topic (host application requests)
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandMessage {
    Register {
        region: Region,
        /// Explicit re-registration policy; absent uses the configured default
        #[serde(default)]
        reset: Option<bool>,
    },
    Unregister {
        region_id: RegionId,
    },
    UnregisterAll,
}

impl CommandMessage {
    pub fn into_input(self) -> TrackerInput {
        match self {
            CommandMessage::Register { region, reset } => {
                TrackerInput::Register { region, mode: reset.map(RegisterMode::from_reset) }
            }
            CommandMessage::Unregister { region_id } => TrackerInput::Unregister { region_id },
            CommandMessage::UnregisterAll => TrackerInput::UnregisterAll,
        }
    }
}

/// Message on the lifecycle topic
#[derive(Debug, Deserialize)]
pub struct LifecycleMessage {
    pub state: LifecycleState,
}

pub fn parse_report(payload: &[u8]) -> Result<TrackerInput, WireError> {
    let text = std::str::from_utf8(payload)?;
    let message: ReportMessage = serde_json::from_str(text)?;
    message.into_input()
}

pub fn parse_command(payload: &[u8]) -> Result<TrackerInput, WireError> {
    let text = std::str::from_utf8(payload)?;
    let message: CommandMessage = serde_json::from_str(text)?;
    Ok(message.into_input())
}

pub fn parse_lifecycle(payload: &[u8]) -> Result<LifecycleState, WireError> {
    let text = std::str::from_utf8(payload)?;
    let message: LifecycleMessage = serde_json::from_str(text)?;
    Ok(message.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::WatchSet;

    #[test]
    fn test_parse_state_report_with_location() {
        let input = parse_report(
            br#"{"type":"state","region_id":"home","state":"inside","latitude":52.1,"longitude":4.3}"#,
        )
        .unwrap();

        match input {
            TrackerInput::State(report) => {
                assert_eq!(report.region_id.as_str(), "home");
                assert_eq!(report.state, MembershipState::Inside);
                assert_eq!(report.location, Some(Coordinate::new(52.1, 4.3)));
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn test_parse_state_report_without_location() {
        let input =
            parse_report(br#"{"type":"state","region_id":"home","state":"unknown"}"#).unwrap();

        assert!(matches!(
            input,
            TrackerInput::State(RawReport { state: MembershipState::Unknown, location: None, .. })
        ));
    }

    #[test]
    fn test_parse_crossing() {
        let input =
            parse_report(br#"{"type":"crossing","region_ids":["a","b"],"direction":"exit"}"#).unwrap();

        match input {
            TrackerInput::Crossing(crossing) => {
                assert_eq!(crossing.region_ids.len(), 2);
                assert_eq!(crossing.direction, GeoEvent::Exit);
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn test_reject_empty_crossing() {
        let result = parse_report(br#"{"type":"crossing","region_ids":[],"direction":"entry"}"#);
        assert!(matches!(result, Err(WireError::EmptyCrossing)));
    }

    #[test]
    fn test_parse_monitor_error_and_location() {
        let error = parse_report(br#"{"type":"error","code":1004}"#).unwrap();
        assert!(matches!(error, TrackerInput::MonitorError { code: 1004, message: None }));

        let location =
            parse_report(br#"{"type":"location","latitude":1.5,"longitude":2.5,"background":true}"#)
                .unwrap();
        match location {
            TrackerInput::Location(update) => {
                assert!(update.background);
                assert_eq!(update.coordinate(), Coordinate::new(1.5, 2.5));
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn test_parse_register_command() {
        let input = parse_command(
            br#"{"type":"register","region":{"id":"home","latitude":52.0,"longitude":4.0,"radius":80,"events":["entry"]},"reset":true}"#,
        )
        .unwrap();

        match input {
            TrackerInput::Register { region, mode } => {
                assert_eq!(region.id().as_str(), "home");
                assert_eq!(region.watched(), WatchSet::ENTRY);
                assert_eq!(mode, Some(RegisterMode::ResetState));
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn test_register_command_rejects_invalid_region() {
        let result = parse_command(
            br#"{"type":"register","region":{"id":"home","latitude":52.0,"longitude":4.0,"radius":0}}"#,
        );
        assert!(matches!(result, Err(WireError::Json(_))));
    }

    #[test]
    fn test_parse_unregister_commands() {
        assert!(matches!(
            parse_command(br#"{"type":"unregister","region_id":"home"}"#).unwrap(),
            TrackerInput::Unregister { .. }
        ));
        assert!(matches!(
            parse_command(br#"{"type":"unregister_all"}"#).unwrap(),
            TrackerInput::UnregisterAll
        ));
    }

    #[test]
    fn test_parse_lifecycle() {
        assert_eq!(
            parse_lifecycle(br#"{"state":"foreground"}"#).unwrap(),
            LifecycleState::Foreground
        );
        assert!(parse_lifecycle(br#"{"state":"sleeping"}"#).is_err());
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(parse_report(b"not json"), Err(WireError::Json(_))));
        assert!(matches!(parse_report(&[0xff, 0xfe]), Err(WireError::Utf8(_))));
        assert!(parse_report(br#"{"type":"teleport"}"#).is_err());
    }
}
