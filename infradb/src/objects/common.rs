// SPDX-License-Identifier: Apache-2.0

//! Status pieces shared by all object kinds

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Backoff seed for a component's first failure.
pub const BACKOFF_SEED: Duration = Duration::from_secs(2);

/// Once a component's retry timer reaches this, retrying stops and a global
/// replay is triggered instead.
pub const REPLAY_THRESHOLD: Duration = Duration::from_secs(64);

/// Fresh opaque resource version.
pub fn generate_version() -> String {
    Uuid::new_v4().to_string()
}

/// State of one back-end component of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompStatus {
    Unspecified,
    Pending,
    Success,
    Error,
}

/// Aggregate operational state of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperStatus {
    Unspecified,
    Up,
    Down,
    ToBeDeleted,
}

/// One back-end's contribution to an object's status. The timer is the
/// component's current retry delay; it is persisted so a restart does not
/// reset the escalation clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub status: CompStatus,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub timer: Duration,
}

impl Component {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CompStatus::Pending,
            details: String::new(),
            timer: Duration::ZERO,
        }
    }

    pub fn success(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CompStatus::Success,
            details: String::new(),
            timer: Duration::ZERO,
        }
    }

    pub fn error(name: &str, details: impl Into<String>, timer: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: CompStatus::Error,
            details: details.into(),
            timer,
        }
    }

    /// Double the retry timer (seeding it on the first failure).
    pub fn bump_timer(&mut self) {
        self.timer = if self.timer.is_zero() {
            BACKOFF_SEED
        } else {
            self.timer * 2
        };
    }

    /// True once the timer reached the replay threshold.
    pub fn replay_due(&self) -> bool {
        self.timer >= REPLAY_THRESHOLD
    }
}

/// Oper state plus the ordered component vector. The vector order is the
/// subscriber priority order of the kind, fixed when the object is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub oper: OperStatus,
    pub components: Vec<Component>,
}

impl Status {
    /// Initial status: down, one pending component per subscriber name.
    pub fn pending<'a>(component_names: impl Iterator<Item = &'a str>) -> Self {
        Self {
            oper: OperStatus::Down,
            components: component_names.map(Component::pending).collect(),
        }
    }

    /// Replace the component with the same name, leaving the order alone.
    pub fn set_component(&mut self, component: Component) {
        if let Some(slot) = self
            .components
            .iter_mut()
            .find(|c| c.name == component.name)
        {
            *slot = component;
        }
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn all_success(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.status == CompStatus::Success)
    }

    /// Send every component back to pending with a cleared timer.
    pub fn reset_pending(&mut self) {
        for component in &mut self.components {
            *component = Component::pending(&component.name);
        }
    }

    /// Replay reset. The component vector is rebuilt against `names`, the
    /// authoritative subscriber list of the kind in priority order (the set
    /// may have changed across a restart): a component survives only if it
    /// reached success and is not the failing one, everything else goes
    /// back to pending. `Up` drops to `Down` when anything is pending
    /// again. Returns the indices (into `names`) of the components that
    /// need re-notification.
    pub fn reset_for_replay(&mut self, failing: &str, names: &[&str]) -> Vec<usize> {
        let mut picked = Vec::new();
        let mut rebuilt = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            match self.component(name) {
                Some(c) if c.status == CompStatus::Success && c.name != failing => {
                    rebuilt.push(c.clone());
                }
                _ => {
                    rebuilt.push(Component::pending(name));
                    picked.push(i);
                }
            }
        }
        self.components = rebuilt;
        if self.oper == OperStatus::Up && !picked.is_empty() {
            self.oper = OperStatus::Down;
        }
        picked
    }
}
