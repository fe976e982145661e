//! Function-space name registry.
//!
//! A bijective name ↔ id map shared by the parser, the call engine and any
//! introspection path. Reads vastly outnumber writes, so it sits behind a
//! reader/writer lock.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Dense, process-stable identifier of a function space.
pub type SpaceId = u32;

#[derive(Debug, Default)]
struct Tables {
    by_name: HashMap<String, SpaceId>,
    by_id: Vec<String>,
}

/// Thread-safe bidirectional map between function-space names and ids.
#[derive(Debug, Default)]
pub struct NameRegistry {
    tables: RwLock<Tables>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, returning its id. Registering an existing name returns
    /// the id it already has.
    pub fn register(&self, name: &str) -> SpaceId {
        if let Some(&id) = self.tables.read().by_name.get(name) {
            return id;
        }
        let mut tables = self.tables.write();
        // another writer may have won the race between the two locks
        if let Some(&id) = tables.by_name.get(name) {
            return id;
        }
        let id = tables.by_id.len() as SpaceId;
        tables.by_id.push(name.to_string());
        tables.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<SpaceId> {
        self.tables.read().by_name.get(name).copied()
    }

    pub fn name_of(&self, id: SpaceId) -> Option<String> {
        self.tables.read().by_id.get(id as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered names in id order.
    pub fn names(&self) -> Vec<String> {
        self.tables.read().by_id.clone()
    }
}
