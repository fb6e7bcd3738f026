pub mod guard;
pub mod metrics;
pub mod tracing;
