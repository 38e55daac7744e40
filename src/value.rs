//! Runtime values of the program under test
//!
//! Instrumented code hands the tracer the operands of every comparison it
//! evaluates. This module models those operands: a closed set of builtin
//! values plus [`PutObject`], the hook through which user-defined types supply
//! their own equality, ordering, containment, iteration and truthiness.
//!
//! The semantics follow the dynamic runtime the instrumented code comes from:
//! - numbers (`Bool`, `Int`, `Float`) compare by numeric value across variants
//! - mismatched kinds are never equal, and never an error for `==`
//! - ordering and containment between unsupported kinds fail with [`PutError`],
//!   exactly as the instrumented program itself would fail

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Result of evaluating PUT-level semantics on a [`Value`].
pub type PutResult<T> = Result<T, PutError>;

/// Errors raised while evaluating PUT semantics.
///
/// These are not tracer failures: they are what the program under test would
/// raise for the same operation, and they propagate back to the execution
/// harness untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PutError {
    #[error("'{op}' not supported between instances of '{left}' and '{right}'")]
    Unorderable {
        op: &'static str,
        left: String,
        right: String,
    },

    #[error("argument of type '{0}' is not a container")]
    NotAContainer(String),

    #[error("'in <{container}>' does not accept an element of type '{element}'")]
    InvalidElement { container: String, element: String },

    #[error("{type_name}: {message}")]
    Raised { type_name: String, message: String },
}

impl PutError {
    /// An error raised by user code, e.g. from an overridden `__eq__`.
    pub fn raised(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        PutError::Raised {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

/// A user-defined object of the program under test.
///
/// Every hook returns `Ok(None)` when the object does not define the
/// operation, in which case the builtin fallback applies: identity for
/// equality, negated equality for inequality, iteration for containment, an
/// [`PutError::Unorderable`] for ordering and a [`PutError::NotAContainer`]
/// for iteration.
///
/// Hooks run arbitrary PUT code, which may itself be instrumented and call
/// back into the tracer.
pub trait PutObject: fmt::Debug + Send + Sync {
    /// Name of the object's type, used in error messages.
    fn type_name(&self) -> &str;

    fn equals(&self, _other: &Value) -> PutResult<Option<bool>> {
        Ok(None)
    }

    fn not_equals(&self, _other: &Value) -> PutResult<Option<bool>> {
        Ok(None)
    }

    /// Ordering of `self` relative to `other`. `Ok(Some(None))` means the
    /// object is orderable against `other` but neither less, equal nor greater.
    fn compare(&self, _other: &Value) -> PutResult<Option<Option<Ordering>>> {
        Ok(None)
    }

    fn contains(&self, _item: &Value) -> PutResult<Option<bool>> {
        Ok(None)
    }

    fn iterate(&self) -> PutResult<Option<Vec<Value>>> {
        Ok(None)
    }

    fn truthy(&self) -> PutResult<bool> {
        Ok(true)
    }
}

/// A runtime value observed at an instrumented predicate.
///
/// Heap variants are reference counted, so cloning is cheap and identity
/// (`is`) is observable through pointer equality.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Arc<[Value]>),
    Tuple(Arc<[Value]>),
    /// Elements are expected to be pairwise unequal.
    Set(Arc<[Value]>),
    /// Keys are expected to be pairwise unequal.
    Dict(Arc<[(Value, Value)]>),
    Object(Arc<dyn PutObject>),
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Value::Bytes(b.into())
    }

    pub fn list(items: impl Into<Vec<Value>>) -> Self {
        let items: Vec<Value> = items.into();
        Value::List(items.into())
    }

    pub fn tuple(items: impl Into<Vec<Value>>) -> Self {
        let items: Vec<Value> = items.into();
        Value::Tuple(items.into())
    }

    pub fn set(items: impl Into<Vec<Value>>) -> Self {
        let items: Vec<Value> = items.into();
        Value::Set(items.into())
    }

    pub fn dict(entries: impl Into<Vec<(Value, Value)>>) -> Self {
        let entries: Vec<(Value, Value)> = entries.into();
        Value::Dict(entries.into())
    }

    pub fn object(object: impl PutObject + 'static) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Object(object) => object.type_name(),
        }
    }

    /// Integer view of `Bool` and `Int`, used for exact integer arithmetic.
    pub(crate) fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value. Booleans count as numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(&**b),
            _ => None,
        }
    }

    /// `self is other`.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Bytes(a), Value::Bytes(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b))
            | (Value::Tuple(a), Value::Tuple(b))
            | (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }

    /// `self == other`.
    pub fn equals(&self, other: &Value) -> PutResult<bool> {
        match (self, other) {
            (Value::Object(a), _) => {
                if let Some(result) = a.equals(other)? {
                    return Ok(result);
                }
                if let Value::Object(b) = other {
                    if let Some(result) = b.equals(self)? {
                        return Ok(result);
                    }
                }
                Ok(self.is_identical(other))
            }
            (_, Value::Object(b)) => Ok(b.equals(self)?.unwrap_or(false)),
            (Value::None, Value::None) => Ok(true),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(a == b),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                sequence_equals(a, b)
            }
            (Value::Set(a), Value::Set(b)) => Ok(a.len() == b.len() && is_subset(a, b)?),
            (Value::Dict(a), Value::Dict(b)) => dict_equals(a, b),
            _ => Ok(self.numeric_ordering(other) == Some(Some(Ordering::Equal))),
        }
    }

    /// `self != other`.
    pub fn not_equals(&self, other: &Value) -> PutResult<bool> {
        if let Value::Object(a) = self {
            if let Some(result) = a.not_equals(other)? {
                return Ok(result);
            }
        }
        if let Value::Object(b) = other {
            if let Some(result) = b.not_equals(self)? {
                return Ok(result);
            }
        }
        Ok(!self.equals(other)?)
    }

    /// `self < other`.
    pub fn less_than(&self, other: &Value) -> PutResult<bool> {
        if let (Value::Set(a), Value::Set(b)) = (self, other) {
            return Ok(a.len() < b.len() && is_subset(a, b)?);
        }
        Ok(self.ordering(other, "<")? == Some(Ordering::Less))
    }

    /// `self <= other`.
    pub fn less_equal(&self, other: &Value) -> PutResult<bool> {
        if let (Value::Set(a), Value::Set(b)) = (self, other) {
            return Ok(a.len() <= b.len() && is_subset(a, b)?);
        }
        Ok(matches!(
            self.ordering(other, "<=")?,
            Some(Ordering::Less) | Some(Ordering::Equal)
        ))
    }

    fn ordering(&self, other: &Value, op: &'static str) -> PutResult<Option<Ordering>> {
        let unorderable = || PutError::Unorderable {
            op,
            left: self.type_name().to_string(),
            right: other.type_name().to_string(),
        };

        match (self, other) {
            (Value::Object(a), _) => {
                if let Some(ordering) = a.compare(other)? {
                    return Ok(ordering);
                }
                if let Value::Object(b) = other {
                    if let Some(ordering) = b.compare(self)? {
                        return Ok(ordering.map(Ordering::reverse));
                    }
                }
                Err(unorderable())
            }
            (_, Value::Object(b)) => b
                .compare(self)?
                .map(|ordering| ordering.map(Ordering::reverse))
                .ok_or_else(unorderable),
            (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    if !(x.is_identical(y) || x.equals(y)?) {
                        return x.ordering(y, op);
                    }
                }
                Ok(Some(a.len().cmp(&b.len())))
            }
            _ => self.numeric_ordering(other).ok_or_else(unorderable),
        }
    }

    /// Exact ordering of two numeric values, `None` if either is not numeric.
    /// Integers are never rounded to `f64`.
    fn numeric_ordering(&self, other: &Value) -> Option<Option<Ordering>> {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => Some(a.partial_cmp(b)),
            (Value::Float(a), _) => {
                Some(compare_int_float(other.as_int()?, *a).map(Ordering::reverse))
            }
            (_, Value::Float(b)) => Some(compare_int_float(self.as_int()?, *b)),
            _ => Some(Some(self.as_int()?.cmp(&other.as_int()?))),
        }
    }

    /// `item in self`.
    pub fn contains(&self, item: &Value) -> PutResult<bool> {
        match self {
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(&**needle)),
                _ => Err(self.invalid_element(item)),
            },
            Value::Bytes(haystack) => match (item, item.as_int()) {
                (Value::Bytes(needle), _) => Ok(contains_subslice(haystack, needle)),
                (_, Some(byte)) if (0..=255).contains(&byte) => Ok(haystack.contains(&(byte as u8))),
                _ => Err(self.invalid_element(item)),
            },
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                any_member_equals(items.iter(), item)
            }
            Value::Dict(entries) => any_member_equals(entries.iter().map(|(key, _)| key), item),
            Value::Object(object) => {
                if let Some(result) = object.contains(item)? {
                    return Ok(result);
                }
                match object.iterate()? {
                    Some(items) => any_member_equals(items.iter(), item),
                    None => Err(PutError::NotAContainer(self.type_name().to_string())),
                }
            }
            _ => Err(PutError::NotAContainer(self.type_name().to_string())),
        }
    }

    /// The values produced by iterating over `self`.
    ///
    /// Text yields one-character strings, bytes yield integers and
    /// dictionaries yield their keys.
    pub fn members(&self) -> PutResult<Vec<Value>> {
        match self {
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::Bytes(b) => Ok(b.iter().map(|&byte| Value::Int(i64::from(byte))).collect()),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.to_vec()),
            Value::Dict(entries) => Ok(entries.iter().map(|(key, _)| key.clone()).collect()),
            Value::Object(object) => object
                .iterate()?
                .ok_or_else(|| PutError::NotAContainer(self.type_name().to_string())),
            _ => Err(PutError::NotAContainer(self.type_name().to_string())),
        }
    }

    /// Truth value of `self` as seen by a conditional jump.
    pub fn truthy(&self) -> PutResult<bool> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
            Value::Object(object) => object.truthy()?,
        })
    }

    fn invalid_element(&self, item: &Value) -> PutError {
        PutError::InvalidElement {
            container: self.type_name().to_string(),
            element: item.type_name().to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::str(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::bytes(b)
    }
}

fn any_member_equals<'a>(members: impl Iterator<Item = &'a Value>, item: &Value) -> PutResult<bool> {
    for member in members {
        if member.is_identical(item) || member.equals(item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn sequence_equals(a: &[Value], b: &[Value]) -> PutResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b.iter()) {
        if !(x.is_identical(y) || x.equals(y)?) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_subset(a: &[Value], b: &[Value]) -> PutResult<bool> {
    for x in a {
        if !any_member_equals(b.iter(), x)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn dict_equals(a: &[(Value, Value)], b: &[(Value, Value)]) -> PutResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (key, value) in a {
        let mut matched = false;
        for (other_key, other_value) in b {
            if other_key.is_identical(key) || other_key.equals(key)? {
                matched = value.is_identical(other_value) || value.equals(other_value)?;
                break;
            }
        }
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `int <=> float` without rounding the integer.
fn compare_int_float(int: i64, float: f64) -> Option<Ordering> {
    // 2^63: every i64 is below it.
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return None;
    }
    let floor = float.floor();
    if floor >= I64_BOUND {
        return Some(Ordering::Less);
    }
    if floor < -I64_BOUND {
        return Some(Ordering::Greater);
    }
    Some(match int.cmp(&(floor as i64)) {
        Ordering::Equal if float != floor => Ordering::Less,
        ordering => ordering,
    })
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Opaque;

    impl PutObject for Opaque {
        fn type_name(&self) -> &str {
            "Opaque"
        }
    }

    #[test]
    fn test_numbers_compare_across_variants() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).equals(&Value::Int(1)).unwrap());
        assert!(Value::Bool(false).less_than(&Value::Float(0.5)).unwrap());
        assert!(!Value::Float(f64::NAN).equals(&Value::Float(f64::NAN)).unwrap());
    }

    #[test]
    fn test_int_float_comparison_is_exact_beyond_2_pow_53() {
        let big = Value::Int(9_007_199_254_740_993);
        let rounded = Value::Float(9_007_199_254_740_992.0);
        assert!(!big.equals(&rounded).unwrap());
        assert!(!rounded.equals(&big).unwrap());
        assert!(big.not_equals(&rounded).unwrap());
        assert!(rounded.less_than(&big).unwrap());
        assert!(!big.less_equal(&rounded).unwrap());
        assert!(Value::Int(9_007_199_254_740_992).equals(&rounded).unwrap());

        assert!(Value::Int(i64::MAX).less_than(&Value::Float(9_223_372_036_854_775_808.0)).unwrap());
        assert!(Value::Int(i64::MIN).equals(&Value::Float(-9_223_372_036_854_775_808.0)).unwrap());
        assert!(Value::Int(i64::MIN).less_than(&Value::Float(f64::INFINITY)).unwrap());
        assert!(Value::Float(f64::NEG_INFINITY).less_than(&Value::Int(i64::MIN)).unwrap());
    }

    #[test]
    fn test_int_float_comparison_with_fractions() {
        assert!(Value::Int(2).less_than(&Value::Float(2.5)).unwrap());
        assert!(Value::Float(2.5).less_than(&Value::Int(3)).unwrap());
        assert!(Value::Int(-3).less_than(&Value::Float(-2.5)).unwrap());
        assert!(!Value::Int(-2).less_equal(&Value::Float(-2.5)).unwrap());
        assert!(!Value::Bool(true).equals(&Value::Float(1.5)).unwrap());
        assert!(!Value::Int(0).less_equal(&Value::Float(f64::NAN)).unwrap());
        assert!(!Value::Float(f64::NAN).less_equal(&Value::Int(0)).unwrap());
    }

    #[test]
    fn test_mismatched_kinds_are_unequal_but_unorderable() {
        assert!(!Value::Int(1).equals(&Value::str("1")).unwrap());
        let err = Value::Int(1).less_than(&Value::str("1")).unwrap_err();
        assert_eq!(
            err,
            PutError::Unorderable {
                op: "<",
                left: "int".to_string(),
                right: "str".to_string(),
            }
        );
    }

    #[test]
    fn test_sequences_order_lexicographically() {
        let short = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let long = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(0)]);
        let bigger = Value::list(vec![Value::Int(1), Value::Int(3)]);
        assert!(short.less_than(&long).unwrap());
        assert!(long.less_than(&bigger).unwrap());
        assert!(!bigger.less_equal(&short).unwrap());
    }

    #[test]
    fn test_sets_order_by_subset() {
        let small = Value::set(vec![Value::Int(1)]);
        let big = Value::set(vec![Value::Int(2), Value::Int(1)]);
        let other = Value::set(vec![Value::Int(3)]);
        assert!(small.less_than(&big).unwrap());
        assert!(!small.less_equal(&other).unwrap());
        assert!(!other.less_equal(&small).unwrap());
        assert!(big.equals(&Value::set(vec![Value::Int(1), Value::Int(2)])).unwrap());
    }

    #[test]
    fn test_containment() {
        assert!(Value::str("hello").contains(&Value::str("ell")).unwrap());
        assert!(Value::bytes(&b"abc"[..]).contains(&Value::Int(98)).unwrap());
        assert!(Value::bytes(&b"abc"[..]).contains(&Value::bytes(&b"bc"[..])).unwrap());
        assert!(matches!(
            Value::bytes(&b"abc"[..]).contains(&Value::Int(256)),
            Err(PutError::InvalidElement { .. })
        ));
        let dict = Value::dict(vec![(Value::str("k"), Value::Int(1))]);
        assert!(dict.contains(&Value::str("k")).unwrap());
        assert!(!dict.contains(&Value::Int(1)).unwrap());
        assert!(matches!(
            Value::Int(3).contains(&Value::Int(3)),
            Err(PutError::NotAContainer(_))
        ));
        assert!(matches!(
            Value::str("abc").contains(&Value::Int(3)),
            Err(PutError::InvalidElement { .. })
        ));
    }

    #[test]
    fn test_bools_are_byte_elements() {
        assert!(Value::bytes(vec![1u8]).contains(&Value::Bool(true)).unwrap());
        assert!(!Value::bytes(vec![1u8]).contains(&Value::Bool(false)).unwrap());
        assert!(Value::bytes(vec![0u8, 7]).contains(&Value::Bool(false)).unwrap());
    }

    #[test]
    fn test_not_equals_hook_overrides_negated_equality() {
        #[derive(Debug)]
        struct NeverDifferent;

        impl PutObject for NeverDifferent {
            fn type_name(&self) -> &str {
                "NeverDifferent"
            }

            fn not_equals(&self, _other: &Value) -> PutResult<Option<bool>> {
                Ok(Some(false))
            }
        }

        let object = Value::object(NeverDifferent);
        assert!(!object.equals(&Value::Int(1)).unwrap());
        assert!(!object.not_equals(&Value::Int(1)).unwrap());
        assert!(!Value::Int(1).not_equals(&object).unwrap());
        // Without the hook, `!=` is the negation of `==`.
        assert!(Value::object(Opaque).not_equals(&Value::object(Opaque)).unwrap());
        assert!(!Value::Int(1).not_equals(&Value::Float(1.0)).unwrap());
    }

    #[test]
    fn test_members_of_bytes_are_integers() {
        let members = Value::bytes(&b"hi"[..]).members().unwrap();
        assert_eq!(members.len(), 2);
        assert!(members[0].equals(&Value::Int(104)).unwrap());
    }

    #[test]
    fn test_identity() {
        let shared = Value::str("abc");
        assert!(shared.is_identical(&shared.clone()));
        assert!(!shared.is_identical(&Value::str("abc")));

        let object = Value::object(Opaque);
        assert!(object.is_identical(&object.clone()));
        assert!(!object.is_identical(&Value::object(Opaque)));
        // Objects without an equality hook fall back to identity.
        assert!(object.equals(&object.clone()).unwrap());
        assert!(!object.equals(&Value::object(Opaque)).unwrap());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.truthy().unwrap());
        assert!(!Value::Int(0).truthy().unwrap());
        assert!(!Value::list(Vec::new()).truthy().unwrap());
        assert!(Value::str("x").truthy().unwrap());
        assert!(Value::object(Opaque).truthy().unwrap());
    }
}
