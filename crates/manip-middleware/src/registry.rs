//! [`PortRegistry`] – the component's table of declared ports.
//!
//! Components declare each port they own by name, direction, and a short doc
//! string.  Declaring a port under a name that is already taken replaces the
//! old entry, which is how a component re-declares its interface when it is
//! configured again.

use std::collections::BTreeMap;

/// Data direction of a declared port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// One entry of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub doc: String,
}

impl PortDescriptor {
    pub fn input(name: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            doc: doc.into(),
        }
    }

    pub fn output(name: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            doc: doc.into(),
        }
    }
}

/// Name-keyed table of declared ports, iterated in name order.
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: BTreeMap<String, PortDescriptor>,
}

impl PortRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a port.  Any previously declared port with the same name is
    /// replaced and returned.
    pub fn add_port(&mut self, port: PortDescriptor) -> Option<PortDescriptor> {
        self.ports.insert(port.name.clone(), port)
    }

    /// Remove the port called `name`.  Returns `true` when one existed.
    pub fn remove_port(&mut self, name: &str) -> bool {
        self.ports.remove(name).is_some()
    }

    /// Look up the port called `name`.
    pub fn get_port(&self, name: &str) -> Option<&PortDescriptor> {
        self.ports.get(name)
    }

    /// All declared ports of the given direction, in name order.
    pub fn ports(&self, direction: PortDirection) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.values().filter(move |p| p.direction == direction)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
