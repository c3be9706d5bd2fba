//! Shared data types for rounds, targets and harvested flags.

use std::collections::BTreeMap;

use serde::Serialize;

/// Team roster keyed by team name, valued by network address.
///
/// Name-ordered so that dispatch order and log output are deterministic.
pub type Roster = BTreeMap<String, String>;

/// One attackable team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub address: String,
}

impl Target {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Flattens a roster into targets, preserving roster order.
pub fn targets_from_roster(roster: &Roster) -> Vec<Target> {
    roster
        .iter()
        .map(|(name, address)| Target::new(name.as_str(), address.as_str()))
        .collect()
}

/// A deduplicated flag waiting for delivery, tagged with the team it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagRecord {
    pub flag: String,
    pub team: String,
}

impl FlagRecord {
    pub fn new(flag: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            team: team.into(),
        }
    }
}

/// How a sploit instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOutcome {
    /// The process exited on its own before its deadline.
    Completed,
    /// The process outlived its deadline (or shutdown) and was killed.
    Killed,
}

/// Running totals over every finished instance in this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceStats {
    pub completed: u64,
    pub killed: u64,
}

impl InstanceStats {
    pub fn finished(&self) -> u64 {
        self.completed + self.killed
    }

    /// Share of finished instances that ran out of time, in percent.
    ///
    /// Returns `None` until at least one instance has finished.
    pub fn killed_percent(&self) -> Option<f64> {
        let finished = self.finished();
        if finished == 0 {
            return None;
        }
        Some(self.killed as f64 / finished as f64 * 100.0)
    }

    pub fn record(&mut self, outcome: InstanceOutcome) {
        match outcome {
            InstanceOutcome::Completed => self.completed += 1,
            InstanceOutcome::Killed => self.killed += 1,
        }
    }
}
