//! Enrolled identities and their attendance counters.

use serde::Serialize;
use std::collections::HashSet;

/// One enrolled student. Counters live for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Opaque backend identifier (e.g. a roll number).
    pub id: String,
    /// Human-readable name; doubles as the gallery label.
    pub label: String,
    pub present: u32,
    pub absent: u32,
}

impl Identity {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            present: 0,
            absent: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Roster {
    identities: Vec<Identity>,
}

impl Roster {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn find(&self, label: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.label == label)
    }

    /// Count one attendance for `label`. Returns the updated identity,
    /// or `None` if nobody on the roster carries that label.
    pub fn mark_present(&mut self, label: &str) -> Option<&Identity> {
        let identity = self.identities.iter_mut().find(|i| i.label == label)?;
        identity.present += 1;
        Some(identity)
    }

    /// Count one absence for every identity not in `seen`. Returns the labels marked.
    pub fn mark_absent_except(&mut self, seen: &HashSet<String>) -> Vec<String> {
        self.identities
            .iter_mut()
            .filter(|i| !seen.contains(&i.label))
            .map(|i| {
                i.absent += 1;
                i.label.clone()
            })
            .collect()
    }
}
