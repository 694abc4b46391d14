//! Execution substrate: futures, the task pool, and collectives
//!
//! This module is the crate's boundary to the host runtime. The
//! reduction engine consumes exactly three contracts — a one-shot
//! [`Future`], a priority [`TaskPool`], and a [`Communicator`] — and
//! the in-process implementations here are the reference backend, the
//! same way a distributed deployment would plug in its own.

mod comm;
mod future;
mod pool;

pub use comm::{Communicator, LocalComm};
pub use future::Future;
pub use pool::{PoolHandle, Priority, TaskPool};
