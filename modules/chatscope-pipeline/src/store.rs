use std::sync::{Arc, RwLock};

use chatscope_common::ChatTable;

/// Single-slot handoff of the latest finished table to whatever renders it.
/// Last write wins.
#[derive(Debug, Default)]
pub struct ResultStore {
    slot: RwLock<Option<Arc<ChatTable>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, table: ChatTable) -> Arc<ChatTable> {
        let table = Arc::new(table);
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(table.clone());
        table
    }

    pub fn get(&self) -> Option<Arc<ChatTable>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
