//! Integration tests for asynchronous reduce tasks
//!
//! Covers streaming arrival, nondeterministic reduction order,
//! argument-consumption callbacks, pair reductions, and poisoning.

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tilefuse::error::{Error, Result};
use tilefuse::perm::Permutation;
use tilefuse::reduce::{ContractReduce, ReduceOp, ReducePairOp, ReducePairTask, ReduceTask};
use tilefuse::runtime::{Future, TaskPool};
use tilefuse::tensor::{GemmHelper, Range, Tensor};

struct SumOp;

impl ReduceOp for SumOp {
    type Argument = i64;
    type Result = i64;

    fn identity(&self) -> i64 {
        0
    }

    fn combine(&self, result: &mut i64, other: i64) -> Result<()> {
        *result += other;
        Ok(())
    }

    fn reduce(&self, result: &mut i64, arg: &i64) -> Result<()> {
        *result += arg;
        Ok(())
    }
}

/// Sum with an affine finalize pass, to observe that post-processing
/// runs exactly once even on the bare identity.
struct SumThenScaleOp;

impl ReduceOp for SumThenScaleOp {
    type Argument = i64;
    type Result = i64;

    fn identity(&self) -> i64 {
        0
    }

    fn combine(&self, result: &mut i64, other: i64) -> Result<()> {
        *result += other;
        Ok(())
    }

    fn reduce(&self, result: &mut i64, arg: &i64) -> Result<()> {
        *result += arg;
        Ok(())
    }

    fn finalize(&self, result: i64) -> Result<i64> {
        Ok(result * 10 + 7)
    }
}

struct DotOp;

impl ReducePairOp for DotOp {
    type Left = Vec<f64>;
    type Right = Vec<f64>;
    type Result = f64;

    fn identity(&self) -> f64 {
        0.0
    }

    fn combine(&self, result: &mut f64, other: f64) -> Result<()> {
        *result += other;
        Ok(())
    }

    fn reduce_pair(&self, result: &mut f64, left: &Vec<f64>, right: &Vec<f64>) -> Result<()> {
        assert_eq!(left.len(), right.len());
        *result += left.iter().zip(right.iter()).map(|(l, r)| l * r).sum::<f64>();
        Ok(())
    }
}

/// Operator whose reduce step fails on a marker value.
struct FailOnNegative;

impl ReduceOp for FailOnNegative {
    type Argument = i64;
    type Result = i64;

    fn identity(&self) -> i64 {
        0
    }

    fn combine(&self, result: &mut i64, other: i64) -> Result<()> {
        *result += other;
        Ok(())
    }

    fn reduce(&self, result: &mut i64, arg: &i64) -> Result<()> {
        if *arg < 0 {
            return Err(Error::Poisoned("negative contribution".into()));
        }
        *result += arg;
        Ok(())
    }
}

#[test]
fn test_sum_of_ready_arguments() {
    let pool = TaskPool::new(4);
    let mut task = ReduceTask::new(&pool, SumOp);
    for v in [3, 1, 4, 1, 5, 9] {
        task.add_value(v);
    }
    let result = task.submit();
    assert_eq!(result.wait(), Ok(23));
}

#[test]
fn test_sum_with_deferred_arguments() {
    let pool = TaskPool::new(4);
    let mut task = ReduceTask::new(&pool, SumOp);
    let futures: Vec<Future<i64>> = (0..6).map(|_| Future::new()).collect();
    for f in &futures {
        task.add(f.clone());
    }
    let result = task.submit();

    // Arrival order differs from add order.
    let values = [3i64, 1, 4, 1, 5, 9];
    for (f, v) in futures.iter().zip(values.iter()).rev() {
        f.set(*v);
    }
    assert_eq!(result.wait(), Ok(23));
}

#[test]
fn test_streaming_arrival_destroys_every_argument() {
    let pool = TaskPool::new(4);
    let destroyed = Arc::new(AtomicUsize::new(0));
    let done = Future::<()>::new();
    let done_setter = done.clone();
    let mut task = ReduceTask::with_completion(&pool, SumOp, move || {
        done_setter.set(());
    });

    let futures: Vec<Future<i64>> = (0..10).map(|_| Future::new()).collect();
    for f in &futures {
        let destroyed = Arc::clone(&destroyed);
        task.add_with_callback(f.clone(), move || {
            destroyed.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(task.count(), 10);
    let result = task.submit();

    // First half settles on this thread, second half on another.
    for f in &futures[..5] {
        f.set(1);
    }
    let rest: Vec<Future<i64>> = futures[5..].to_vec();
    let handle = std::thread::spawn(move || {
        for f in rest {
            f.set(1);
        }
    });

    assert_eq!(result.wait(), Ok(10));
    done.wait().unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 10);
    handle.join().unwrap();
}

#[test]
fn test_zero_arguments_resolves_to_finalized_identity() {
    let pool = TaskPool::new(2);
    let task = ReduceTask::new(&pool, SumThenScaleOp);
    let result = task.submit();
    assert_eq!(result.wait(), Ok(7));
}

#[test]
fn test_single_argument_is_finalized_once() {
    let pool = TaskPool::new(2);
    let mut task = ReduceTask::new(&pool, SumThenScaleOp);
    task.add_value(5);
    let result = task.submit();
    assert_eq!(result.wait(), Ok(57));
}

#[test]
fn test_completion_callback_fires_once() {
    let pool = TaskPool::new(2);
    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    let mut task = ReduceTask::with_completion(&pool, SumOp, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    task.add_value(1);
    task.add_value(2);
    let result = task.submit();
    assert_eq!(result.wait(), Ok(3));
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pair_dot_product() {
    let pool = TaskPool::new(4);
    let mut task = ReducePairTask::new(&pool, DotOp);
    task.add_values(vec![1.0, 2.0], vec![3.0, 4.0]);
    task.add_values(vec![5.0, 6.0], vec![7.0, 8.0]);
    let result = task.submit();
    // 1·3 + 2·4 + 5·7 + 6·8 = 94
    assert_eq!(result.wait(), Ok(94.0));
}

#[test]
fn test_pair_with_partially_deferred_futures() {
    let pool = TaskPool::new(4);
    let mut task = ReducePairTask::new(&pool, DotOp);

    let left = Future::new();
    task.add(left.clone(), Future::ready(vec![3.0, 4.0]));
    task.add_values(vec![5.0, 6.0], vec![7.0, 8.0]);
    let result = task.submit();

    // The first pair is blocked on its left operand.
    left.set(vec![1.0, 2.0]);
    assert_eq!(result.wait(), Ok(94.0));
}

#[test]
fn test_failed_input_poisons_result() {
    let pool = TaskPool::new(4);
    let destroyed = Arc::new(AtomicUsize::new(0));
    let done = Future::<()>::new();
    let done_setter = done.clone();
    let mut task = ReduceTask::with_completion(&pool, SumOp, move || {
        done_setter.set(());
    });

    let bad = Future::<i64>::new();
    for _ in 0..3 {
        let destroyed = Arc::clone(&destroyed);
        task.add_with_callback(Future::ready(1), move || {
            destroyed.fetch_add(1, Ordering::SeqCst);
        });
    }
    let destroyed_bad = Arc::clone(&destroyed);
    task.add_with_callback(bad.clone(), move || {
        destroyed_bad.fetch_add(1, Ordering::SeqCst);
    });
    let result = task.submit();

    bad.fail(Error::Poisoned("upstream tile failed".into()));

    assert!(result.wait().is_err());
    done.wait().unwrap();
    // Every argument is released exactly once, consumed or not.
    assert_eq!(destroyed.load(Ordering::SeqCst), 4);
}

#[test]
fn test_operator_failure_poisons_result() {
    let pool = TaskPool::new(4);
    let mut task = ReduceTask::new(&pool, FailOnNegative);
    task.add_value(1);
    task.add_value(-1);
    task.add_value(1);
    let result = task.submit();
    assert_eq!(
        result.wait(),
        Err(Error::Poisoned("negative contribution".into()))
    );
}

#[test]
fn test_contract_reduce_accumulates_tile_pairs() {
    let pool = TaskPool::new(4);
    let helper = GemmHelper::new(2, 2, 2).unwrap();
    let perm = Permutation::new(&[1, 0]).unwrap();
    let op = ContractReduce::with_perm(2.0, helper, perm);
    let mut task = ReducePairTask::new(&pool, op);

    let a1 = Tensor::from_vec(Range::new(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let b1 = Tensor::from_vec(Range::new(&[2, 2]), vec![1.0, 0.0, 0.0, 1.0]).unwrap();
    let a2 = Tensor::from_vec(Range::new(&[2, 2]), vec![0.0, 1.0, 1.0, 0.0]).unwrap();
    let b2 = Tensor::from_vec(Range::new(&[2, 2]), vec![5.0, 6.0, 7.0, 8.0]).unwrap();
    task.add_values(a1, b1);
    task.add_values(a2, b2);
    let result = task.submit().wait().unwrap();

    // 2·(A1·B1 + A2·B2) = 2·([[1,2],[3,4]] + [[7,8],[5,6]]) = [[16,20],[16,20]],
    // then transposed by the finalize permutation.
    assert_eq!(result.range(), &Range::new(&[2, 2]));
    assert_eq!(result.data(), &[16.0, 16.0, 20.0, 20.0]);
}

/// Sum that counts how many single and fused reduction steps ran.
struct CountingSumOp {
    single: Arc<AtomicUsize>,
    fused: Arc<AtomicUsize>,
}

impl ReduceOp for CountingSumOp {
    type Argument = i64;
    type Result = i64;

    fn identity(&self) -> i64 {
        0
    }

    fn combine(&self, result: &mut i64, other: i64) -> Result<()> {
        *result += other;
        Ok(())
    }

    fn reduce(&self, result: &mut i64, arg: &i64) -> Result<()> {
        self.single.fetch_add(1, Ordering::SeqCst);
        *result += arg;
        Ok(())
    }

    fn reduce_two(&self, result: &mut i64, first: &i64, second: &i64) -> Result<()> {
        self.fused.fetch_add(1, Ordering::SeqCst);
        *result += first + second;
        Ok(())
    }
}

#[test]
fn test_every_argument_is_reduced_exactly_once() {
    let n = 64;
    let pool = TaskPool::new(4);
    let single = Arc::new(AtomicUsize::new(0));
    let fused = Arc::new(AtomicUsize::new(0));
    let mut task = ReduceTask::new(
        &pool,
        CountingSumOp {
            single: Arc::clone(&single),
            fused: Arc::clone(&fused),
        },
    );
    for _ in 0..n {
        task.add_value(1);
    }
    assert_eq!(task.submit().wait(), Ok(n as i64));

    // Single steps consume one argument, fused steps two; together they
    // account for every argument exactly once.
    assert_eq!(
        single.load(Ordering::SeqCst) + 2 * fused.load(Ordering::SeqCst),
        n
    );
}

#[test]
fn test_count_tracks_added_arguments() {
    let pool = TaskPool::new(1);
    let mut task = ReduceTask::new(&pool, SumOp);
    assert_eq!(task.count(), 0);
    assert_eq!(task.add_value(1), 1);
    assert_eq!(task.add_value(2), 2);
    assert_eq!(task.count(), 2);
    assert_eq!(task.submit().wait(), Ok(3));
}

proptest! {
    /// The reduced value is independent of arrival order.
    #[test]
    fn prop_reduction_is_order_invariant(values in prop::collection::vec(-100i64..100, 1..32)) {
        let pool = TaskPool::new(4);
        let expected: i64 = values.iter().sum();

        // Forward arrival.
        let mut forward = ReduceTask::new(&pool, SumOp);
        let futures: Vec<Future<i64>> = values.iter().map(|_| Future::new()).collect();
        for f in &futures {
            forward.add(f.clone());
        }
        let forward_result = forward.submit();
        for (f, v) in futures.iter().zip(values.iter()) {
            f.set(*v);
        }

        // Reversed arrival.
        let mut reversed = ReduceTask::new(&pool, SumOp);
        let futures: Vec<Future<i64>> = values.iter().map(|_| Future::new()).collect();
        for f in &futures {
            reversed.add(f.clone());
        }
        let reversed_result = reversed.submit();
        for (f, v) in futures.iter().zip(values.iter()).rev() {
            f.set(*v);
        }

        prop_assert_eq!(forward_result.wait(), Ok(expected));
        prop_assert_eq!(reversed_result.wait(), Ok(expected));
    }
}
