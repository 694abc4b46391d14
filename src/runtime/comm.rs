//! Process-group collectives consumed by the shape engine
//!
//! Only the one collective the core needs: an element-wise sum that
//! leaves every participating process holding the total. The trait is
//! the seam to a real distributed runtime; [`LocalComm`] is the
//! single-process reference implementation.

use crate::error::Result;
use std::ops::AddAssign;

/// Collective operations across a process group
pub trait Communicator: Send + Sync {
    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Sum `buffer` element-wise across all processes.
    ///
    /// On return every process holds the same summed contents. Failures
    /// surface as [`Error::CollectiveFailed`](crate::error::Error::CollectiveFailed).
    fn all_reduce_sum<T>(&self, buffer: &mut [T]) -> Result<()>
    where
        T: Copy + AddAssign + Send;
}

/// Single-process communicator: every collective is the identity
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalComm;

impl Communicator for LocalComm {
    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum<T>(&self, _buffer: &mut [T]) -> Result<()>
    where
        T: Copy + AddAssign + Send,
    {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_comm_is_identity() {
        let mut data = [1.0f64, 2.0, 3.0];
        LocalComm.all_reduce_sum(&mut data).unwrap();
        assert_eq!(data, [1.0, 2.0, 3.0]);
        assert_eq!(LocalComm.size(), 1);
    }
}
