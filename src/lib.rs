pub mod admission;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod logging;
pub mod proxy;
pub mod readiness;
pub mod request;
pub mod server;

pub use context::WorkerContext;
pub use error::{GateError, GateResult};
