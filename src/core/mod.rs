// src/core/mod.rs — Core iteration engine

pub mod budget;
pub mod ledger;
pub mod orchestrator;
pub mod prompts;
pub mod request;
pub mod state;
pub mod types;

pub use orchestrator::IterationController;
