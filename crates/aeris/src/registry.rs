//! Entities (host nodes) owned by this node server.

use std::collections::{BTreeMap, BTreeSet};

use crate::drivers::{DriverSink, DriverTable};
use crate::error::{AerisError, Result};

/// Host-side entity store used for forecast entities.
pub trait EntityRegistry {
    fn create(&mut self, address: &str, name: &str) -> Result<()>;
    fn delete(&mut self, address: &str) -> Result<()>;
    fn exists(&self, address: &str) -> bool;
    fn list_by_prefix(&self, prefix: &str) -> BTreeSet<String>;
    /// Driver sink of an existing entity.
    fn drivers(&mut self, address: &str) -> Option<&mut dyn DriverSink>;
}

/// An entity and its drivers.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub drivers: DriverTable,
}

/// In-memory registry; changes are published by the runner.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entities: BTreeMap<String, Entity>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&Entity> {
        self.entities.get(address)
    }

    pub fn get_mut(&mut self, address: &str) -> Option<&mut Entity> {
        self.entities.get_mut(address)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Entity)> {
        self.entities.iter_mut()
    }
}

impl EntityRegistry for MemoryRegistry {
    fn create(&mut self, address: &str, name: &str) -> Result<()> {
        if self.entities.contains_key(address) {
            return Err(AerisError::Entity(format!("{} already exists", address)));
        }
        log::info!("Adding node {} ({})", address, name);
        self.entities.insert(
            address.to_string(),
            Entity {
                name: name.to_string(),
                drivers: DriverTable::new(),
            },
        );
        Ok(())
    }

    fn delete(&mut self, address: &str) -> Result<()> {
        match self.entities.remove(address) {
            Some(_) => {
                log::info!("Removed node {}", address);
                Ok(())
            }
            None => Err(AerisError::Entity(format!("{} not found", address))),
        }
    }

    fn exists(&self, address: &str) -> bool {
        self.entities.contains_key(address)
    }

    fn list_by_prefix(&self, prefix: &str) -> BTreeSet<String> {
        self.entities
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn drivers(&mut self, address: &str) -> Option<&mut dyn DriverSink> {
        self.entities
            .get_mut(address)
            .map(|e| &mut e.drivers as &mut dyn DriverSink)
    }
}
