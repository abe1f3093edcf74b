//! Service lifecycle states
//!
//! `Stopped` and `Running` are the two states an operator can target;
//! the remaining states are reported by the runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Lifecycle state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Not running; the only state that permits configuration
    Stopped,
    /// Transition towards Running is underway
    Starting,
    /// Fully operational
    Running,
    /// Transition towards Stopped is underway
    Stopping,
    /// Own state is Running but a dependency is not
    Unavailable,
    /// A transition handler failed; cleared by stopping the service
    Error,
}

impl ServiceState {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Unavailable => "unavailable",
            ServiceState::Error => "error",
        }
    }

    /// Whether this state can be passed to `set_target_state`
    pub fn is_target(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceState {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(ServiceState::Stopped),
            "starting" => Ok(ServiceState::Starting),
            "running" => Ok(ServiceState::Running),
            "stopping" => Ok(ServiceState::Stopping),
            "unavailable" => Ok(ServiceState::Unavailable),
            "error" => Ok(ServiceState::Error),
            other => Err(ServiceError::UnknownStateName(other.to_string())),
        }
    }
}
