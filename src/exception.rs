//! Exception matching for `except` predicates
//!
//! An exception-match predicate is taken when the raised exception matches the
//! target of an `except` clause. The matching policy is pluggable through
//! [`ExceptionMatch`]; [`ExpectedException`] provides the
//! usual semantics where a type matches itself and its subclasses, and a tuple
//! matches when any of its elements does.

use std::fmt;
use std::sync::Arc;

/// A node in the exception class hierarchy.
#[derive(Debug)]
pub struct ExceptionType {
    name: String,
    bases: Vec<Arc<ExceptionType>>,
}

impl ExceptionType {
    /// A type without base classes.
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(ExceptionType {
            name: name.into(),
            bases: Vec::new(),
        })
    }

    pub fn derived(
        name: impl Into<String>,
        bases: impl IntoIterator<Item = Arc<ExceptionType>>,
    ) -> Arc<Self> {
        Arc::new(ExceptionType {
            name: name.into(),
            bases: bases.into_iter().collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[Arc<ExceptionType>] {
        &self.bases
    }

    /// Whether `self` is `other` or inherits from it. Types are compared by
    /// identity, not by name.
    pub fn is_subclass_of(&self, other: &ExceptionType) -> bool {
        std::ptr::eq(self, other) || self.bases.iter().any(|base| base.is_subclass_of(other))
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An exception raised by the program under test.
#[derive(Debug, Clone)]
pub struct RaisedException {
    pub exception_type: Arc<ExceptionType>,
    pub message: String,
}

impl RaisedException {
    pub fn new(exception_type: Arc<ExceptionType>, message: impl Into<String>) -> Self {
        RaisedException {
            exception_type,
            message: message.into(),
        }
    }
}

impl fmt::Display for RaisedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception_type, self.message)
    }
}

/// Decides whether a raised exception is caught by an `except` clause.
pub trait ExceptionMatch {
    fn matches(&self, raised: &RaisedException) -> bool;
}

impl<F> ExceptionMatch for F
where
    F: Fn(&RaisedException) -> bool,
{
    fn matches(&self, raised: &RaisedException) -> bool {
        self(raised)
    }
}

/// The target of an `except` clause.
#[derive(Debug, Clone)]
pub enum ExpectedException {
    Type(Arc<ExceptionType>),
    /// Matches if any element matches. Tuples may nest.
    Tuple(Vec<ExpectedException>),
}

impl ExceptionMatch for ExpectedException {
    fn matches(&self, raised: &RaisedException) -> bool {
        match self {
            ExpectedException::Type(expected) => raised.exception_type.is_subclass_of(expected),
            ExpectedException::Tuple(alternatives) => {
                alternatives.iter().any(|alternative| alternative.matches(raised))
            }
        }
    }
}
