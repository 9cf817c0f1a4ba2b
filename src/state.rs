//! Process-wide shared state (spec §9 "Global state"): the coordinator
//! handle is the single entry point into the book, ledger and store;
//! `AppState` itself is cheaply `Clone`d (an `Arc` body) so every axum
//! handler gets its own handle, mirroring the teacher's `AppState`.
use std::sync::Arc;

use crate::coordinator::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}
