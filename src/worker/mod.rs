//! Worker side of the adapter: turning broker jobs into shell commands.
//!
//! # Components
//!
//! - [`Dispatcher`]: looks up the command for a job type, appends the JSON
//!   encoded arguments and runs it
//! - [`WeightedQueues`]: queue order for each fetch, from the configured weights
//! - [`Manager`]: worker slots connected to the broker, one job per slot at a time
//!
//! # Execution Flow
//!
//! 1. A slot picks a queue order with [`WeightedQueues::poll_order`]
//! 2. The broker hands out the first available job from those queues
//! 3. [`Dispatcher::perform`] runs `<command...> <json-args>` and waits for it
//! 4. The slot acknowledges the job, or reports the failure so the broker can retry it

pub mod dispatcher;
pub mod manager;
pub mod queues;

pub use dispatcher::{Dispatcher, ExecutionResult};
pub use manager::Manager;
pub use queues::WeightedQueues;
