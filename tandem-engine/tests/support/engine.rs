//! Shared engine construction for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tandem_engine::{MockTaskStore, ParallelWorkflowEngine, TandemConfig};

/// Engine over a fresh mock store, returned alongside the store.
pub fn test_engine_with(config: TandemConfig) -> (ParallelWorkflowEngine, Arc<MockTaskStore>) {
    let store = Arc::new(MockTaskStore::new());
    match ParallelWorkflowEngine::new(config, store.clone()) {
        Ok(engine) => (engine, store),
        Err(e) => panic!("Failed to build test engine: {}", e),
    }
}

pub fn test_engine() -> (ParallelWorkflowEngine, Arc<MockTaskStore>) {
    test_engine_with(tandem_test_utils::fixtures::test_config())
}
