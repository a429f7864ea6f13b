pub mod coordinator;
pub mod driver;
pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use coordinator::{ClientSnapshot, Coordinator, LockRequest, PoolStatus};
pub use driver::{DriverClient, HttpDriverClient};
pub use events::EventBus;

/// Script handed unchanged to every driver in a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDocument {
    pub name: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl ScriptDocument {
    pub fn new(name: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Unregistered,
    Registered,
    ScriptDispatched,
    Executing,
    ReportedResults,
}

impl ClientState {
    /// Whether the driver can join a new configuration.
    pub fn is_idle(self) -> bool {
        matches!(self, ClientState::Registered | ClientState::ReportedResults)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Unregistered => "unregistered",
            ClientState::Registered => "registered",
            ClientState::ScriptDispatched => "script_dispatched",
            ClientState::Executing => "executing",
            ClientState::ReportedResults => "reported_results",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigurationId(pub u64);

impl fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    ClientRegistered {
        client: String,
    },
    ScriptDispatched {
        configuration: ConfigurationId,
        script: String,
        clients: Vec<String>,
    },
    ResultsRecorded {
        configuration: ConfigurationId,
        client: String,
        reported: usize,
        expected: usize,
    },
    PoolDone {
        configuration: ConfigurationId,
        script: String,
        clients: usize,
        elapsed_ms: i64,
    },
    ClientShutdown {
        client: String,
    },
}

/// One published pool event with its source and a readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolNotification {
    pub source: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub event: PoolEvent,
}

impl PoolNotification {
    pub fn new(source: impl Into<String>, message: impl Into<String>, event: PoolEvent) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_states() {
        assert!(ClientState::Registered.is_idle());
        assert!(ClientState::ReportedResults.is_idle());
        assert!(!ClientState::Executing.is_idle());
        assert!(!ClientState::ScriptDispatched.is_idle());
        assert!(!ClientState::Unregistered.is_idle());
    }

    #[test]
    fn test_event_json_tag() {
        let event = PoolEvent::PoolDone {
            configuration: ConfigurationId(3),
            script: "login".into(),
            clients: 2,
            elapsed_ms: 1500,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pool_done");
        assert_eq!(json["configuration"], 3);
    }
}
