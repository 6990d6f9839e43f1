// src/lib.rs — Library root for AutonoWrite

pub mod cli;
pub mod core;
pub mod evaluator;
pub mod infra;
pub mod provider;
pub mod research;
pub mod store;
