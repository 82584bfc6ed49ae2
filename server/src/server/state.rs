//! Server state

use std::sync::Arc;

use crate::deploy::Orchestrator;
use crate::store::ProjectStore;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub projects: Arc<dyn ProjectStore>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, projects: Arc<dyn ProjectStore>) -> Self {
        Self {
            orchestrator,
            projects,
        }
    }
}
