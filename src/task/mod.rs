//! Background execution of crawl and harvest runs
//!
//! A run is submitted to a bounded pool and hands its result back through a
//! single-use slot. Callers wait with a timeout; giving up on the wait never
//! cancels the run, so its persisted progress still completes.

mod pool;

pub use pool::{TaskHandle, TaskOutcome, TaskPool, STATUS_FAILED, STATUS_OK, STATUS_TIMEOUT};
