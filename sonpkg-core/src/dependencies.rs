//! Dependency tracking for one packaging run
//!
//! Records which components the service descriptor requires and which of
//! them have been packaged. Every operation reports what it did instead of
//! silently mutating, so the packager can turn outcomes into warnings.

use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::ComponentId;

/// Outcome of [`DependencyRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// Already registered; state unchanged
    Duplicate,
}

/// Outcome of [`DependencyRegistry::satisfy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfaction {
    /// First time this id was satisfied
    Satisfied,
    AlreadySatisfied,
    /// Not required by the service; the component must be left out
    Unreferenced,
}

/// Where a component id stands, without changing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Pending,
    Satisfied,
    Unreferenced,
}

/// Required component ids and whether each has been packaged
#[derive(Debug, Default, Clone)]
pub struct DependencyRegistry {
    entries: BTreeMap<ComponentId, bool>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ComponentId) -> Registration {
        if self.entries.contains_key(&id) {
            return Registration::Duplicate;
        }
        self.entries.insert(id, false);
        Registration::Added
    }

    pub fn state(&self, id: &ComponentId) -> DependencyState {
        match self.entries.get(id) {
            None => DependencyState::Unreferenced,
            Some(true) => DependencyState::Satisfied,
            Some(false) => DependencyState::Pending,
        }
    }

    pub fn satisfy(&mut self, id: &ComponentId) -> Satisfaction {
        match self.entries.get_mut(id) {
            None => Satisfaction::Unreferenced,
            Some(true) => Satisfaction::AlreadySatisfied,
            Some(done) => {
                *done = true;
                Satisfaction::Satisfied
            }
        }
    }

    /// Snapshot of the ids still waiting for a descriptor
    pub fn unsatisfied(&self) -> BTreeSet<ComponentId> {
        self.entries
            .iter()
            .filter(|(_, satisfied)| !**satisfied)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.values().all(|satisfied| *satisfied)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
