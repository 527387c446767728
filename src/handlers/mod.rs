// src/handlers/mod.rs

pub mod events;
pub mod session;
