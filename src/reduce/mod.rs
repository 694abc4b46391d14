//! Asynchronous commutative reductions over future-valued arguments

mod contract;
mod op;
mod task;

pub use contract::ContractReduce;
pub use op::{ReduceOp, ReducePairOp};
pub use task::{ReducePairTask, ReduceTask};
