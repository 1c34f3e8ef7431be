use runbench_core::RunCoordinator;

/// Shared handler state; everything interesting lives on the coordinator.
#[derive(Clone, Debug)]
pub struct AppState {
    coordinator: RunCoordinator,
}

impl AppState {
    pub fn new(coordinator: RunCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }
}
