//! Flowboard - DAG process engine with a claimable task board

pub mod board;
pub mod cli;
pub mod dag;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod parser;
pub mod process;
pub mod settings;
pub mod snapshot;
pub mod store;
