//! Cortex scan execution engine.
//!
//! Wires the probe catalogue (`cortex-core`) and raw-packet layer
//! (`cortex-net`) into the three worker strategies, a fan-out
//! orchestrator, and a task-queue driver.
//!
//! - [`connect`]: TCP-connect worker (C3) -- handshake, then reused-
//!   connection service fingerprinting.
//! - [`syn`]: TCP-SYN worker (C4) -- raw half-open scan.
//! - [`udp`]: UDP worker (C5).
//! - [`orchestrator`]: fans `(host, port)` jobs out to a worker pool (C2).
//! - [`task_store`]: the `TaskStore` boundary and an in-memory impl.
//! - [`driver`]: the task-queue consumer loop (C6).

pub mod connect;
pub mod driver;
pub mod orchestrator;
pub mod syn;
pub mod task_store;
pub mod udp;

pub use driver::process_one;
pub use orchestrator::{execute, WorkerFn};
pub use task_store::{MemoryTaskStore, TaskStore};
