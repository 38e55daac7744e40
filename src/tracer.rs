//! ExecutionTracer - records branch distances while instrumented code runs
//!
//! The tracer is the single entry point instrumented code talks to. At
//! instrumentation time it hands out ids for code objects and predicates; at
//! run time it turns every predicate evaluation into a [`BranchDistance`] and
//! folds it into the current [`ExecutionTrace`].
//!
//! Two filters decide whether a recording is accepted:
//! - **Thread of interest**: only calls from the thread set through
//!   [`ExecutionTracer::set_current_thread_ident`] are recorded. Threads spawned
//!   by the program under test stay invisible.
//! - **Re-entrancy guard**: while the tracer evaluates PUT semantics itself
//!   (user-defined `==`, `in`, truthiness, exception matching) it is disabled,
//!   so predicates reached from inside those calls are not recorded.
//!   Code object entries are still recorded while disabled.
//!
//! A tracer instance is meant to be shared through an `Arc` between the
//! execution harness and the instrumented code. Independent executions that
//! run in parallel need independent tracers.
//!
//! # Example
//!
//! ```rust
//! use branch_tracer::{Compare, CodeObjectMetaData, ExecutionTracer, PredicateMetaData, Value};
//!
//! let tracer = ExecutionTracer::new();
//! let code_object = tracer.register_code_object(CodeObjectMetaData::new("f", None, (), ()));
//! let predicate = tracer.register_predicate(PredicateMetaData::new(Some(2), code_object));
//!
//! tracer.adopt_current_thread();
//! tracer.executed_code_object(code_object);
//! tracer
//!     .executed_compare_predicate(&Value::Int(1), &Value::Int(2), predicate, Compare::Lt)
//!     .unwrap();
//!
//! let trace = tracer.trace_snapshot();
//! assert_eq!(trace.true_distances()[&predicate], 0.0);
//! assert_eq!(trace.false_distances()[&predicate], 2.0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};

use crate::distance::{self, BranchDistance, Compare};
use crate::exception::{ExceptionMatch, RaisedException};
use crate::known_data::{CodeObjectId, CodeObjectMetaData, KnownData, PredicateId, PredicateMetaData};
use crate::trace::ExecutionTrace;
use crate::value::{PutResult, Value};

/// Configuration for an [`ExecutionTracer`]
#[derive(Debug, Clone, Default)]
pub struct TracerConfig {
    /// Maximum number of container members the `in` distance examines when
    /// the element is absent. `None` scans the whole container.
    pub containment_scan_limit: Option<usize>,
}

/// Tracks branch distances during execution.
pub struct ExecutionTracer {
    config: TracerConfig,

    known_data: RwLock<KnownData>,

    /// Trace recorded while the module under test was loaded. Seeds every
    /// subsequent trace.
    import_trace: Mutex<ExecutionTrace>,

    trace: Mutex<ExecutionTrace>,

    enabled: AtomicBool,

    current_thread_ident: RwLock<Option<ThreadId>>,
}

/// Disables the tracer for as long as it is alive.
struct DisabledGuard<'a> {
    enabled: &'a AtomicBool,
}

impl<'a> DisabledGuard<'a> {
    fn acquire(enabled: &'a AtomicBool) -> Self {
        enabled.store(false, Ordering::SeqCst);
        DisabledGuard { enabled }
    }
}

impl Drop for DisabledGuard<'_> {
    fn drop(&mut self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}

impl ExecutionTracer {
    pub fn new() -> Self {
        Self::with_config(TracerConfig::default())
    }

    pub fn with_config(config: TracerConfig) -> Self {
        ExecutionTracer {
            config,
            known_data: RwLock::new(KnownData::new()),
            import_trace: Mutex::new(ExecutionTrace::new()),
            trace: Mutex::new(ExecutionTrace::new()),
            enabled: AtomicBool::new(true),
            current_thread_ident: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// The thread whose recordings are currently accepted.
    pub fn current_thread_ident(&self) -> Option<ThreadId> {
        *self.current_thread_ident.read().unwrap()
    }

    /// Sets the thread whose recordings are accepted. Calls from any other
    /// thread are ignored; `None` ignores every thread.
    ///
    /// Must be set right before the program under test runs for one test case.
    pub fn set_current_thread_ident(&self, ident: Option<ThreadId>) {
        *self.current_thread_ident.write().unwrap() = ident;
    }

    /// Makes the calling thread the thread of interest.
    pub fn adopt_current_thread(&self) {
        self.set_current_thread_ident(Some(thread::current().id()));
    }

    fn is_thread_of_interest(&self) -> bool {
        *self.current_thread_ident.read().unwrap() == Some(thread::current().id())
    }

    /// A copy of the known code objects and predicates.
    pub fn known_data(&self) -> KnownData {
        self.known_data.read().unwrap().clone()
    }

    /// Resets everything.
    ///
    /// Should be called before instrumentation so a reloaded module under test
    /// starts from a clean registry; ids restart at 0.
    pub fn reset(&self) {
        log::debug!("Resetting execution tracer");
        self.known_data.write().unwrap().reset();
        let mut import_trace = self.import_trace.lock().unwrap();
        let mut trace = self.trace.lock().unwrap();
        import_trace.clear();
        *trace = ExecutionTrace::new();
    }

    /// Freezes the current trace as the import trace and starts a new trace
    /// seeded from it.
    ///
    /// Should be called once, right after the module under test was loaded.
    pub fn store_import_trace(&self) {
        let mut import_trace = self.import_trace.lock().unwrap();
        let mut trace = self.trace.lock().unwrap();
        *import_trace = std::mem::take(&mut *trace);
        *trace = seeded_from(&import_trace);
        log::debug!(
            "Stored import trace: {} code objects, {} predicates",
            import_trace.executed_code_objects().len(),
            import_trace.executed_predicates().len()
        );
    }

    /// A fresh copy of the import trace.
    pub fn import_trace(&self) -> ExecutionTrace {
        seeded_from(&self.import_trace.lock().unwrap())
    }

    /// The live trace of the current execution.
    ///
    /// Recording takes the same non-reentrant lock, so instrumented code must
    /// not run on this thread while the guard is alive: it would deadlock or
    /// panic. Use [`trace_snapshot`](Self::trace_snapshot) when instrumented
    /// code runs in between.
    pub fn trace(&self) -> MutexGuard<'_, ExecutionTrace> {
        self.trace.lock().unwrap()
    }

    /// A copy of the current trace.
    pub fn trace_snapshot(&self) -> ExecutionTrace {
        self.trace.lock().unwrap().clone()
    }

    /// Discards the current trace; the new one only contains the import trace.
    pub fn clear_trace(&self) {
        let import_trace = self.import_trace.lock().unwrap();
        *self.trace.lock().unwrap() = seeded_from(&import_trace);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Declares that a code object exists and returns its id.
    pub fn register_code_object(&self, meta: CodeObjectMetaData) -> CodeObjectId {
        let code_object_id = self.known_data.write().unwrap().register_code_object(meta);
        log::trace!("Registered code object {}", code_object_id);
        code_object_id
    }

    /// Declares that a predicate exists and returns its id.
    pub fn register_predicate(&self, meta: PredicateMetaData) -> PredicateId {
        let predicate_id = self.known_data.write().unwrap().register_predicate(meta);
        log::trace!(
            "Registered predicate {} in code object {} (line {:?})",
            predicate_id,
            meta.code_object_id,
            meta.line_no
        );
        predicate_id
    }

    /// Marks a code object as executed, i.e. the routine it belongs to was
    /// entered at least once.
    ///
    /// # Panics
    ///
    /// If `code_object_id` was never registered.
    pub fn executed_code_object(&self, code_object_id: CodeObjectId) {
        if !self.is_thread_of_interest() {
            return;
        }
        assert!(
            self.known_data.read().unwrap().has_code_object(code_object_id),
            "Cannot trace unknown code object {}",
            code_object_id
        );
        self.trace.lock().unwrap().record_code_object(code_object_id);
    }

    /// A predicate based on a comparison was executed.
    ///
    /// Errors raised by the operands' own comparison semantics are returned
    /// unchanged; the tracer is enabled again before they propagate.
    ///
    /// # Panics
    ///
    /// If `predicate` was never registered.
    pub fn executed_compare_predicate(
        &self,
        value1: &Value,
        value2: &Value,
        predicate: PredicateId,
        cmp_op: Compare,
    ) -> PutResult<()> {
        if !self.is_thread_of_interest() || !self.is_enabled() {
            return Ok(());
        }
        self.assert_known_predicate(predicate);
        let distance = {
            let _disabled = DisabledGuard::acquire(&self.enabled);
            distance::compute_bounded(cmp_op, value1, value2, self.config.containment_scan_limit)?
        };
        self.update_metrics(distance.false_distance, distance.true_distance, predicate);
        Ok(())
    }

    /// A predicate based on the truthiness of a value was executed.
    ///
    /// # Panics
    ///
    /// If `predicate` was never registered.
    pub fn executed_bool_predicate(&self, value: &Value, predicate: PredicateId) -> PutResult<()> {
        if !self.is_thread_of_interest() || !self.is_enabled() {
            return Ok(());
        }
        self.assert_known_predicate(predicate);
        let distance = {
            let _disabled = DisabledGuard::acquire(&self.enabled);
            BranchDistance::from_outcome(value.truthy()?)
        };
        self.update_metrics(distance.false_distance, distance.true_distance, predicate);
        Ok(())
    }

    /// A predicate based on exception matching was executed.
    ///
    /// # Panics
    ///
    /// If `predicate` was never registered.
    pub fn executed_exception_match<M>(&self, err: &RaisedException, exc: &M, predicate: PredicateId)
    where
        M: ExceptionMatch + ?Sized,
    {
        if !self.is_thread_of_interest() || !self.is_enabled() {
            return;
        }
        self.assert_known_predicate(predicate);
        let distance = {
            let _disabled = DisabledGuard::acquire(&self.enabled);
            BranchDistance::from_outcome(exc.matches(err))
        };
        self.update_metrics(distance.false_distance, distance.true_distance, predicate);
    }

    fn assert_known_predicate(&self, predicate: PredicateId) {
        assert!(
            self.known_data.read().unwrap().has_predicate(predicate),
            "Cannot trace unknown predicate {}",
            predicate
        );
    }

    fn update_metrics(&self, distance_false: f64, distance_true: f64, predicate: PredicateId) {
        assert!(
            self.known_data.read().unwrap().has_predicate(predicate),
            "Cannot update unknown predicate {}",
            predicate
        );
        assert!(distance_true >= 0.0, "True distance cannot be negative");
        assert!(distance_false >= 0.0, "False distance cannot be negative");
        assert!(
            (distance_true == 0.0) ^ (distance_false == 0.0),
            "Exactly one distance must be 0.0, i.e., one branch must be taken."
        );
        self.trace
            .lock()
            .unwrap()
            .record_predicate(predicate, BranchDistance::new(distance_true, distance_false));
    }
}

impl Default for ExecutionTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExecutionTracer")
    }
}

/// A new trace that only contains `import_trace`.
fn seeded_from(import_trace: &ExecutionTrace) -> ExecutionTrace {
    let mut trace = ExecutionTrace::new();
    trace.merge(import_trace);
    trace
}
