//! Lifecycle and network status enumerations with their fixed wire values.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a pod. Discriminants are the wire values.
///
/// `Unknown` is the sentinel for uninitialized or corrupted input; it is never
/// reachable by a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum PodStatus {
    None = 0,
    Init = 1,
    Ready = 2,
    Running = 3,
    Done = 4,
    Failed = 5,
    #[default]
    Unknown = 6,
}

impl PodStatus {
    pub const ALL: [PodStatus; 7] = [
        PodStatus::None,
        PodStatus::Init,
        PodStatus::Ready,
        PodStatus::Running,
        PodStatus::Done,
        PodStatus::Failed,
        PodStatus::Unknown,
    ];

    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// The single forward successor on the lifecycle path, if any.
    pub fn successor(self) -> Option<PodStatus> {
        match self {
            PodStatus::None => Some(PodStatus::Init),
            PodStatus::Init => Some(PodStatus::Ready),
            PodStatus::Ready => Some(PodStatus::Running),
            PodStatus::Running => Some(PodStatus::Done),
            PodStatus::Done | PodStatus::Failed | PodStatus::Unknown => None,
        }
    }

    /// Position on the forward path `NONE → INIT → READY → RUNNING → DONE`.
    /// `FAILED` and `UNKNOWN` are off the path.
    pub fn path_position(self) -> Option<u8> {
        match self {
            PodStatus::None => Some(0),
            PodStatus::Init => Some(1),
            PodStatus::Ready => Some(2),
            PodStatus::Running => Some(3),
            PodStatus::Done => Some(4),
            PodStatus::Failed | PodStatus::Unknown => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            PodStatus::Done | PodStatus::Failed => true,
            PodStatus::None
            | PodStatus::Init
            | PodStatus::Ready
            | PodStatus::Running
            | PodStatus::Unknown => false,
        }
    }
}

impl TryFrom<i32> for PodStatus {
    type Error = SchemaError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PodStatus::None),
            1 => Ok(PodStatus::Init),
            2 => Ok(PodStatus::Ready),
            3 => Ok(PodStatus::Running),
            4 => Ok(PodStatus::Done),
            5 => Ok(PodStatus::Failed),
            6 => Ok(PodStatus::Unknown),
            other => Err(SchemaError::OutOfRange {
                enumeration: "PodStatus",
                value: other,
            }),
        }
    }
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodStatus::None => write!(f, "NONE"),
            PodStatus::Init => write!(f, "INIT"),
            PodStatus::Ready => write!(f, "READY"),
            PodStatus::Running => write!(f, "RUNNING"),
            PodStatus::Done => write!(f, "DONE"),
            PodStatus::Failed => write!(f, "FAILED"),
            PodStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Outcome reported by the network provisioning subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum NetworkStatus {
    Ok = 0,
    Error = 1,
    Timeout = 2,
}

impl NetworkStatus {
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for NetworkStatus {
    type Error = SchemaError;

    fn try_from(value: i32) -> Result<Self, SchemaError> {
        match value {
            0 => Ok(NetworkStatus::Ok),
            1 => Ok(NetworkStatus::Error),
            2 => Ok(NetworkStatus::Timeout),
            other => Err(SchemaError::OutOfRange {
                enumeration: "NetworkStatus",
                value: other,
            }),
        }
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkStatus::Ok => write!(f, "OK"),
            NetworkStatus::Error => write!(f, "ERROR"),
            NetworkStatus::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_status_wire_values_are_fixed() {
        assert_eq!(PodStatus::None.as_i32(), 0);
        assert_eq!(PodStatus::Init.as_i32(), 1);
        assert_eq!(PodStatus::Ready.as_i32(), 2);
        assert_eq!(PodStatus::Running.as_i32(), 3);
        assert_eq!(PodStatus::Done.as_i32(), 4);
        assert_eq!(PodStatus::Failed.as_i32(), 5);
        assert_eq!(PodStatus::Unknown.as_i32(), 6);
    }

    #[test]
    fn pod_status_roundtrips_every_value() {
        for status in PodStatus::ALL {
            assert_eq!(PodStatus::try_from(status.as_i32()).unwrap(), status);
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(PodStatus::try_from(7).is_err());
        assert!(PodStatus::try_from(-1).is_err());
        assert!(NetworkStatus::try_from(3).is_err());
    }

    #[test]
    fn network_status_wire_values_are_fixed() {
        assert_eq!(NetworkStatus::Ok.as_i32(), 0);
        assert_eq!(NetworkStatus::Error.as_i32(), 1);
        assert_eq!(NetworkStatus::Timeout.as_i32(), 2);
        assert_eq!(NetworkStatus::try_from(2).unwrap(), NetworkStatus::Timeout);
    }

    #[test]
    fn successor_walks_the_forward_path() {
        let mut walked = vec![PodStatus::None];
        while let Some(next) = walked.last().copied().and_then(PodStatus::successor) {
            walked.push(next);
        }
        assert_eq!(
            walked,
            vec![
                PodStatus::None,
                PodStatus::Init,
                PodStatus::Ready,
                PodStatus::Running,
                PodStatus::Done
            ]
        );
    }

    #[test]
    fn terminal_states() {
        assert!(PodStatus::Done.is_terminal());
        assert!(PodStatus::Failed.is_terminal());
        assert!(!PodStatus::Running.is_terminal());
        assert!(!PodStatus::Unknown.is_terminal());
    }

    #[test]
    fn serde_uses_upper_case_names() {
        let json = serde_json::to_string(&PodStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        let back: NetworkStatus = serde_json::from_str("\"TIMEOUT\"").unwrap();
        assert_eq!(back, NetworkStatus::Timeout);
    }

    #[test]
    fn default_is_unknown_sentinel() {
        assert_eq!(PodStatus::default(), PodStatus::Unknown);
    }
}
