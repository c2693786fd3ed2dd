//! Maps a pipeline step's `operation_id` to the concrete [`Operation`] that
//! runs it. Built once per pipeline (or shared across many, since
//! operations are immutable and `Send + Sync`) and handed to the
//! scheduler alongside the validated [`crate::dag::Dag`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::operation::Operation;

#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: Arc<dyn Operation>) -> &mut Self {
        self.operations.insert(operation.id().to_string(), operation);
        self
    }

    pub fn get(&self, operation_id: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(operation_id).cloned()
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.operations.contains_key(operation_id)
    }
}
