//! Reusable tracing setup for hook-relay: config types, subscriber and OTLP
//! initialization, and span builders.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{LogFormat, OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
