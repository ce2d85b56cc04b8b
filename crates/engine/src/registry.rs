//! Named-instance addressing for running machines.
//!
//! One entry per bill id, carrying the indexed customer attribute so the
//! dispatcher can enumerate a customer's machines without touching each one.

use std::collections::HashMap;
use std::sync::RwLock;

use billflow_core::{BillId, CustomerId};

use crate::machine::MachineHandle;

#[derive(Default)]
pub struct MachineRegistry {
    machines: RwLock<HashMap<BillId, MachineHandle>>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: MachineHandle) {
        self.machines
            .write()
            .expect("registry lock poisoned")
            .insert(handle.bill_id(), handle);
    }

    pub fn get(&self, bill_id: BillId) -> Option<MachineHandle> {
        self.machines
            .read()
            .expect("registry lock poisoned")
            .get(&bill_id)
            .cloned()
    }

    pub fn contains(&self, bill_id: BillId) -> bool {
        self.machines
            .read()
            .expect("registry lock poisoned")
            .contains_key(&bill_id)
    }

    /// Handles filtered by the indexed customer attribute.
    pub fn list(&self, customer_id: Option<CustomerId>) -> Vec<MachineHandle> {
        self.machines
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|h| customer_id.map_or(true, |c| h.customer_id() == c))
            .cloned()
            .collect()
    }

    /// Drop entries whose machine has finished. Completed machines are
    /// invisible to reads anyway; this just bounds the map.
    pub fn sweep_completed(&self) {
        self.machines
            .write()
            .expect("registry lock poisoned")
            .retain(|_, h| h.is_running());
    }
}
