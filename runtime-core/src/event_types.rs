//! Event-Type Registry (C3).
//!
//! Interns event-type names to small numeric ids. Once assigned, an id is
//! never reused or unregistered for the process's lifetime; capacity is
//! bounded so a misbehaving service can't exhaust the table by registering
//! unbounded distinct names.

use std::collections::HashMap;

use abi::{CoreError, CoreResult, EventTypeId, INVALID_EVENT_TYPE};

const MAX_NAME_LEN: usize = 31;

pub struct EventTypeRegistry {
    max_types: usize,
    by_name: HashMap<String, u16>,
    names: Vec<String>,
}

impl EventTypeRegistry {
    pub fn new(max_types: usize) -> Self {
        EventTypeRegistry {
            max_types,
            by_name: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// Idempotent: re-registering an existing name returns its existing id.
    /// This is the fast path services take on every init, since
    /// section 4.3, so it is deliberately not an error.
    pub fn register(&mut self, name: &str) -> CoreResult<EventTypeId> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(CoreError::InvalidArg);
        }
        if let Some(&id) = self.by_name.get(name) {
            return Ok(EventTypeId(id));
        }
        if self.names.len() >= self.max_types {
            return Err(CoreError::TypeRegistryFull);
        }
        let id = self.names.len() as u16;
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        Ok(EventTypeId(id))
    }

    pub fn get_name(&self, id: EventTypeId) -> CoreResult<&str> {
        if id == INVALID_EVENT_TYPE {
            return Err(CoreError::TypeNotFound);
        }
        self.names
            .get(id.0 as usize)
            .map(|s| s.as_str())
            .ok_or(CoreError::TypeNotFound)
    }

    pub fn is_registered(&self, id: EventTypeId) -> bool {
        (id.0 as usize) < self.names.len()
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reregistering_is_idempotent() {
        let mut reg = EventTypeRegistry::new(4);
        let a = reg.register("temp").unwrap();
        let b = reg.register("temp").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn capacity_enforced() {
        let mut reg = EventTypeRegistry::new(1);
        reg.register("a").unwrap();
        assert_eq!(reg.register("b").unwrap_err(), CoreError::TypeRegistryFull);
    }

    #[test]
    fn unknown_name_lookup_fails() {
        let reg = EventTypeRegistry::new(4);
        assert_eq!(reg.get_name(EventTypeId(0)).unwrap_err(), CoreError::TypeNotFound);
    }
}
