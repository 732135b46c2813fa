//! Background filtering - everything behind the processing queue
//!
//! Structure:
//! - `types`: Active-task set and its `ProcessingGuard`
//! - `queue`: `WorkQueue` trait and the in-memory FIFO
//! - `worker`: The loop that drains the queue onto the filter pool
//! - `processors`: Filter engine and startup setup

pub mod processors;
pub mod queue;
pub mod types;
pub mod worker;
