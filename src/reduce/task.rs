//! Asynchronous reduction of future-valued arguments
//!
//! A reduce task aggregates an a-priori-unknown number of future-valued
//! arguments under a commutative operator, reducing them in whatever
//! order they become ready. This beats a binary reduction tree on
//! nondeterministic arrivals: no reduction step ever waits for a
//! specific sibling, and no worker thread blocks on an unready input.
//!
//! The scheduling core keeps two slots, a partially-reduced result and
//! a ready argument. A newly ready argument claims whichever slot is
//! occupied and spawns a high-priority reduction step; the step drains
//! further ready work before parking its result back. At most one of
//! the two slots is occupied outside the critical section, and each
//! argument is consumed by exactly one reduction step.

use crate::error::{Error, Result};
use crate::reduce::op::{PairOpAdapter, ReduceOp, ReducePairOp};
use crate::runtime::{Future, PoolHandle, Priority, TaskPool};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

type Completion = Box<dyn FnOnce() + Send>;

/// The future-backed input of one reduction argument.
///
/// Abstracts over single futures and future pairs so the scheduling
/// core is written once.
pub(crate) trait ReduceInput: Send + Sync + 'static {
    /// Resolved value handed to the operator.
    type Value: Send + 'static;

    /// Number of component futures.
    fn arity(&self) -> usize;

    /// Whether every component future has settled.
    fn probe(&self) -> bool;

    /// Register `notifier` on every component future.
    fn register(&self, notifier: Arc<dyn Fn() + Send + Sync>);

    /// Extract the settled value; propagates poison from any component.
    fn resolve(&self) -> Result<Self::Value>;
}

pub(crate) struct SingleInput<T>(Future<T>);

impl<T: Clone + Send + 'static> ReduceInput for SingleInput<T> {
    type Value = T;

    fn arity(&self) -> usize {
        1
    }

    fn probe(&self) -> bool {
        self.0.probe()
    }

    fn register(&self, notifier: Arc<dyn Fn() + Send + Sync>) {
        self.0.on_ready(move || notifier());
    }

    fn resolve(&self) -> Result<T> {
        self.0.get()
    }
}

pub(crate) struct PairInput<L, R>(Future<L>, Future<R>);

impl<L, R> ReduceInput for PairInput<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    type Value = (L, R);

    fn arity(&self) -> usize {
        2
    }

    fn probe(&self) -> bool {
        self.0.probe() && self.1.probe()
    }

    fn register(&self, notifier: Arc<dyn Fn() + Send + Sync>) {
        let left_notifier = Arc::clone(&notifier);
        self.0.on_ready(move || left_notifier());
        self.1.on_ready(move || notifier());
    }

    fn resolve(&self) -> Result<(L, R)> {
        Ok((self.0.get()?, self.1.get()?))
    }
}

/// One added argument: its input futures, the countdown to readiness,
/// and the callback that releases upstream resources once the value
/// has been consumed.
struct ReduceArg<I: ReduceInput> {
    input: I,
    pending: AtomicUsize,
    on_consumed: Mutex<Option<Completion>>,
}

impl<I: ReduceInput> ReduceArg<I> {
    /// Fire the consumption callback. Called exactly once, immediately
    /// after the reduction step that consumed this argument's value.
    fn destroy(arg: &Arc<Self>) {
        if let Some(cb) = arg.on_consumed.lock().take() {
            cb();
        }
    }
}

impl<I: ReduceInput> Drop for ReduceArg<I> {
    fn drop(&mut self) {
        // Fires only when the argument was abandoned before a reduction
        // step consumed it (e.g. the pool shut down mid-reduction).
        if let Some(cb) = self.on_consumed.get_mut().take() {
            cb();
        }
    }
}

struct Slots<R, A> {
    result: Option<R>,
    arg: Option<A>,
}

struct ReduceCore<Op, I>
where
    Op: ReduceOp,
    I: ReduceInput<Value = Op::Argument>,
{
    op: Op,
    pool: PoolHandle,
    slots: Mutex<Slots<Op::Result, Arc<ReduceArg<I>>>>,
    /// Arguments added but not yet consumed, plus one for the
    /// not-yet-submitted sentinel.
    outstanding: AtomicUsize,
    result: Future<Op::Result>,
    completion: Mutex<Option<Completion>>,
}

impl<Op, I> ReduceCore<Op, I>
where
    Op: ReduceOp,
    I: ReduceInput<Value = Op::Argument>,
{
    fn new(pool: PoolHandle, op: Op, completion: Option<Completion>) -> Arc<Self> {
        // Seeding the result slot with the identity lets the first
        // argument reduce without a partner.
        let identity = op.identity();
        Arc::new(Self {
            op,
            pool,
            slots: Mutex::new(Slots {
                result: Some(identity),
                arg: None,
            }),
            outstanding: AtomicUsize::new(1),
            result: Future::new(),
            completion: Mutex::new(completion),
        })
    }

    /// Once the result future has settled early, the task is poisoned.
    fn poisoned(&self) -> bool {
        self.result.probe()
    }

    fn poison(self: &Arc<Self>, error: Error) {
        trace!(%error, "reduction poisoned");
        self.result.fail(error);
        // Sweep parked state so a parked argument's consumption
        // callback still fires and its count is released.
        let (arg, _dropped_result) = {
            let mut slots = self.slots.lock();
            (slots.arg.take(), slots.result.take())
        };
        if let Some(arg) = arg {
            self.discard(&arg);
        }
    }

    /// Destroy an argument without reducing it (poisoned task).
    fn discard(self: &Arc<Self>, arg: &Arc<ReduceArg<I>>) {
        ReduceArg::destroy(arg);
        self.dec();
    }

    fn fire_completion(&self) {
        if let Some(cb) = self.completion.lock().take() {
            cb();
        }
    }

    /// Register a new argument; wires its futures to `ready`.
    fn add_input(self: &Arc<Self>, input: I, callback: Option<Completion>) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let arg = Arc::new(ReduceArg {
            input,
            pending: AtomicUsize::new(0),
            on_consumed: Mutex::new(callback),
        });
        if arg.input.probe() {
            self.ready(arg);
        } else {
            arg.pending.store(arg.input.arity(), Ordering::Release);
            let notifier: Arc<dyn Fn() + Send + Sync> = {
                let core = Arc::clone(self);
                let arg = Arc::clone(&arg);
                Arc::new(move || {
                    if arg.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                        core.ready(Arc::clone(&arg));
                    }
                })
            };
            arg.input.register(notifier);
        }
    }

    /// Callback invoked when an argument's futures have all settled.
    ///
    /// Claims whichever slot is occupied and spawns the matching
    /// reduction step, or parks the argument when both are free.
    fn ready(self: &Arc<Self>, arg: Arc<ReduceArg<I>>) {
        let mut slots = self.slots.lock();
        // Checked under the slot lock: poisoning sweeps the slots after
        // failing the result future, so an argument parked here is
        // either discarded now or caught by the sweep.
        if self.poisoned() {
            drop(slots);
            self.discard(&arg);
            return;
        }
        if let Some(result) = slots.result.take() {
            drop(slots);
            trace!("pairing ready argument with parked result");
            let core = Arc::clone(self);
            self.spawn_step(move || core.reduce_result_arg(result, arg));
        } else if let Some(other) = slots.arg.take() {
            drop(slots);
            trace!("pairing two ready arguments");
            let core = Arc::clone(self);
            self.spawn_step(move || core.reduce_arg_pair(other, arg));
        } else {
            trace!("parking ready argument");
            slots.arg = Some(arg);
        }
    }

    fn spawn_step(self: &Arc<Self>, step: impl FnOnce() + Send + 'static) {
        if self.pool.submit(Priority::High, step).is_err() {
            // Dropping the step releases its arguments through their
            // abandonment path.
            self.poison(Error::QueueExhausted);
            self.fire_completion();
        }
    }

    /// Reduce one argument into a claimed partial result, then drain.
    fn reduce_result_arg(self: Arc<Self>, mut result: Op::Result, arg: Arc<ReduceArg<I>>) {
        if self.poisoned() {
            self.discard(&arg);
            return;
        }
        let step = arg
            .input
            .resolve()
            .and_then(|value| self.op.reduce(&mut result, &value));
        ReduceArg::destroy(&arg);
        match step {
            Ok(()) => self.drain(result),
            Err(error) => self.poison(error),
        }
        // Release this argument's count only after the drain has parked
        // or merged the result; an earlier release could let the
        // terminal step observe an empty result slot.
        self.dec();
    }

    /// Reduce two ready arguments into a fresh result, then drain.
    fn reduce_arg_pair(self: Arc<Self>, first: Arc<ReduceArg<I>>, second: Arc<ReduceArg<I>>) {
        if self.poisoned() {
            self.discard(&first);
            self.discard(&second);
            return;
        }
        let mut result = self.op.identity();
        let step = first
            .input
            .resolve()
            .and_then(|a| second.input.resolve().map(|b| (a, b)))
            .and_then(|(a, b)| self.op.reduce_two(&mut result, &a, &b));
        ReduceArg::destroy(&first);
        ReduceArg::destroy(&second);
        match step {
            Ok(()) => self.drain(result),
            Err(error) => self.poison(error),
        }
        self.dec();
        self.dec();
    }

    /// Eagerly consume ready work until nothing is left, then park
    /// `result` for the next ready argument or the terminal step.
    fn drain(self: &Arc<Self>, mut result: Op::Result) {
        loop {
            let mut slots = self.slots.lock();
            if self.poisoned() {
                return;
            }
            if let Some(arg) = slots.arg.take() {
                drop(slots);
                let step = arg
                    .input
                    .resolve()
                    .and_then(|value| self.op.reduce(&mut result, &value));
                ReduceArg::destroy(&arg);
                match step {
                    Ok(()) => self.dec(),
                    Err(error) => {
                        self.poison(error);
                        self.dec();
                        return;
                    }
                }
            } else if let Some(other) = slots.result.take() {
                drop(slots);
                if let Err(error) = self.op.combine(&mut result, other) {
                    self.poison(error);
                    return;
                }
            } else {
                slots.result = Some(result);
                trace!("parking partial result");
                return;
            }
        }
    }

    /// Release one outstanding count; the last release runs the
    /// terminal step.
    fn dec(self: &Arc<Self>) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let core = Arc::clone(self);
            if self.pool.submit(Priority::High, move || core.finish()).is_err() {
                self.finish();
            }
        }
    }

    /// Terminal step: finalize the sole surviving result and settle the
    /// result future.
    fn finish(&self) {
        if !self.poisoned() {
            let parked = self.slots.lock().result.take();
            match parked {
                Some(result) => match self.op.finalize(result) {
                    Ok(value) => {
                        trace!("reduction finished");
                        self.result.set(value);
                    }
                    Err(error) => self.result.fail(error),
                },
                None => self
                    .result
                    .fail(Error::Internal("reduction finished without a result".into())),
            }
        }
        self.fire_completion();
    }

    fn submit(self: &Arc<Self>, count: usize) -> Future<Op::Result> {
        let result = self.result.clone();
        if count == 0 {
            // Nothing was added: finalize the identity on the caller's
            // thread instead of bouncing through the queue.
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            self.finish();
        } else {
            self.dec();
        }
        result
    }
}

/// Streaming commutative reduction of single-valued arguments
///
/// Arguments are futures added with [`add`](Self::add); the task
/// reduces them as they become ready and settles the future returned by
/// [`submit`](Self::submit) once every argument has been consumed.
/// Submission consumes the task, so no argument can be added afterwards.
/// Dropping an unsubmitted task abandons the reduction: its result
/// future never settles.
pub struct ReduceTask<Op>
where
    Op: ReduceOp,
    Op::Argument: Clone,
{
    core: Arc<ReduceCore<Op, SingleInput<Op::Argument>>>,
    count: usize,
}

impl<Op> ReduceTask<Op>
where
    Op: ReduceOp,
    Op::Argument: Clone,
{
    /// Create a reduction task executing on `pool`.
    pub fn new(pool: &TaskPool, op: Op) -> Self {
        Self {
            core: ReduceCore::new(pool.handle(), op, None),
            count: 0,
        }
    }

    /// Create a reduction task whose `callback` fires once the final
    /// result has been set.
    pub fn with_completion(
        pool: &TaskPool,
        op: Op,
        callback: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            core: ReduceCore::new(pool.handle(), op, Some(Box::new(callback))),
            count: 0,
        }
    }

    /// Add a future-valued argument; returns the running argument count.
    pub fn add(&mut self, argument: Future<Op::Argument>) -> usize {
        self.core.add_input(SingleInput(argument), None);
        self.count += 1;
        self.count
    }

    /// Add an argument with a callback fired when its value has been
    /// consumed and its memory is about to be released.
    pub fn add_with_callback(
        &mut self,
        argument: Future<Op::Argument>,
        callback: impl FnOnce() + Send + 'static,
    ) -> usize {
        self.core
            .add_input(SingleInput(argument), Some(Box::new(callback)));
        self.count += 1;
        self.count
    }

    /// Add an argument that is already a plain value.
    pub fn add_value(&mut self, value: Op::Argument) -> usize {
        self.add(Future::ready(value))
    }

    /// Number of arguments added so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Finalize the task and return the future of the reduced result.
    ///
    /// With no arguments added, the post-processed identity is computed
    /// synchronously on the calling thread.
    pub fn submit(self) -> Future<Op::Result> {
        self.core.submit(self.count)
    }
}

/// Streaming commutative reduction of `(left, right)` argument pairs
///
/// The pair analog of [`ReduceTask`]: each argument is a pair of
/// futures, both of which must settle before the pair is reduced.
pub struct ReducePairTask<Op>
where
    Op: ReducePairOp,
    Op::Left: Clone,
    Op::Right: Clone,
{
    core: Arc<ReduceCore<PairOpAdapter<Op>, PairInput<Op::Left, Op::Right>>>,
    count: usize,
}

impl<Op> ReducePairTask<Op>
where
    Op: ReducePairOp,
    Op::Left: Clone,
    Op::Right: Clone,
{
    /// Create a pair-reduction task executing on `pool`.
    pub fn new(pool: &TaskPool, op: Op) -> Self {
        Self {
            core: ReduceCore::new(pool.handle(), PairOpAdapter(op), None),
            count: 0,
        }
    }

    /// Create a pair-reduction task whose `callback` fires once the
    /// final result has been set.
    pub fn with_completion(
        pool: &TaskPool,
        op: Op,
        callback: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            core: ReduceCore::new(pool.handle(), PairOpAdapter(op), Some(Box::new(callback))),
            count: 0,
        }
    }

    /// Add a pair of future-valued arguments; returns the running
    /// argument count.
    pub fn add(&mut self, left: Future<Op::Left>, right: Future<Op::Right>) -> usize {
        self.core.add_input(PairInput(left, right), None);
        self.count += 1;
        self.count
    }

    /// Add a pair with a callback fired when both values have been
    /// consumed.
    pub fn add_with_callback(
        &mut self,
        left: Future<Op::Left>,
        right: Future<Op::Right>,
        callback: impl FnOnce() + Send + 'static,
    ) -> usize {
        self.core
            .add_input(PairInput(left, right), Some(Box::new(callback)));
        self.count += 1;
        self.count
    }

    /// Add a pair of plain values.
    pub fn add_values(&mut self, left: Op::Left, right: Op::Right) -> usize {
        self.add(Future::ready(left), Future::ready(right))
    }

    /// Number of argument pairs added so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Finalize the task and return the future of the reduced result.
    pub fn submit(self) -> Future<Op::Result> {
        self.core.submit(self.count)
    }
}
