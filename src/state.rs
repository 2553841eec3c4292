use std::sync::Arc;

use crate::orchestrator::PaymentOrchestrator;
use crate::payments::Gateway;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: PaymentOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn gateway(&self) -> &dyn Gateway {
        self.orchestrator.gateway().as_ref()
    }
}
