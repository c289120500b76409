//! Startup error taxonomy
//!
//! Every variant is fatal: the process reports it and exits nonzero.
//! Request-path failures never reach this type; they are answered in-band
//! as HTTP responses.

use thiserror::Error;

use crate::dispatch::DuplicateRoute;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid listen address: {0}")]
    ListenAddr(String),

    #[error("failed to initialize logging: {0}")]
    Logger(std::io::Error),

    #[error("failed to build runtime: {0}")]
    Runtime(std::io::Error),

    #[error("failed to bind listener: {0}")]
    Listen(std::io::Error),

    #[error("database initialization failed: {0}")]
    DbInit(#[from] StoreError),

    #[error(transparent)]
    Routes(#[from] DuplicateRoute),
}
