#[macro_use]
mod log_macros;

pub mod clock;
pub mod error;
mod ingest_task;
pub mod lifecycle;
pub mod reader;
mod tick_task;
pub mod tracing_init;
