pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod rotation;
pub mod service;
pub mod sources;
pub mod vault;
