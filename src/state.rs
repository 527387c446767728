// src/state.rs

use axum::extract::FromRef;

use crate::{config::Config, session::SessionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub config: Config,
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
