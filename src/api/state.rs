use crate::detect::AnalysisEngine;
use crate::storage::{IncidentStore, Pool};

#[derive(Clone)]
pub struct AppState {
    pub store: IncidentStore,
    pub engine: AnalysisEngine,
}

impl AppState {
    pub fn new(pool: Pool) -> Self {
        let store = IncidentStore::new(pool);
        let engine = AnalysisEngine::new(store.clone());
        Self { store, engine }
    }
}
