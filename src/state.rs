use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::pool::Coordinator;
use crate::sync::ObjectRegistry;
use crate::writer::ResultsWriter;

pub type SharedState = Arc<CoordinatorState>;

pub struct CoordinatorState {
    pub config: CoordinatorConfig,
    pub coordinator: Coordinator,
}

impl CoordinatorState {
    pub fn new(config: CoordinatorConfig, writers: Vec<Arc<dyn ResultsWriter>>) -> Self {
        let registry = Arc::new(ObjectRegistry::new());
        let coordinator = Coordinator::new(&config, registry, writers);
        Self {
            config,
            coordinator,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}
