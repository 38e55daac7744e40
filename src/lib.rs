//! # Branch Tracer
//!
//! Execution tracing and branch-distance computation for search-based unit
//! test generation.
//!
//! Instrumented code reports every code object it enters and every predicate
//! it evaluates to an [`ExecutionTracer`]. For each predicate the tracer
//! computes a branch distance (how close the evaluation came to taking the
//! other branch) and keeps the minimum per branch in an [`ExecutionTrace`],
//! which the search reads back as its fitness signal.

pub mod distance;
pub mod exception;
pub mod known_data;
pub mod trace;
pub mod tracer;
pub mod value;

// Re-export core types for easy access
pub use distance::{BranchDistance, Compare, UnknownCompareError};
pub use exception::{ExceptionMatch, ExceptionType, ExpectedException, RaisedException};
pub use known_data::{CodeObjectId, CodeObjectMetaData, KnownData, Opaque, PredicateId, PredicateMetaData};
pub use trace::ExecutionTrace;
pub use tracer::{ExecutionTracer, TracerConfig};
pub use value::{PutError, PutObject, PutResult, Value};
