//! Records for tests that are currently executing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TestDefinition;

/// Lifecycle of an active test as seen by the emergency-stop authority
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTestStatus {
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ActiveTestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveTestStatus::Running => write!(f, "running"),
            ActiveTestStatus::Stopping => write!(f, "stopping"),
            ActiveTestStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// A test that is currently mid-execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveTestRecord {
    pub test_id: String,
    pub test_name: String,
    pub start_time: DateTime<Utc>,
    pub category: String,
    pub status: ActiveTestStatus,
    pub resources_in_use: Vec<String>,
}

impl ActiveTestRecord {
    pub fn running(def: &TestDefinition, start_time: DateTime<Utc>) -> Self {
        Self {
            test_id: def.id.clone(),
            test_name: def.name.clone(),
            start_time,
            category: def.category.clone(),
            status: ActiveTestStatus::Running,
            resources_in_use: Vec::new(),
        }
    }
}
