//! Branch distance computation
//!
//! For every comparison kind this module computes a [`BranchDistance`]: how far
//! the evaluation was from taking the true branch and from taking the false
//! branch. Exactly one of the two is `0.0`, the one for the branch actually
//! taken.
//!
//! Numeric operands produce a smooth surface (`|a - b|`, `(a - b) + 1`), text
//! and bytes use the Levenshtein edit distance for equality, and everything
//! else collapses to `f64::INFINITY` (no gradient) or `1.0` (binary signal).
//!
//! These functions are pure with respect to the tracer. They do evaluate PUT
//! semantics on the operands (user-defined equality, ordering, containment),
//! and any error raised there is returned unchanged.

use std::fmt;
use std::str::FromStr;

use crate::value::{PutResult, Value};

const INFINITY: f64 = f64::INFINITY;

/// The closed set of comparison kinds an instrumented predicate can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compare {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl Compare {
    pub const ALL: [Compare; 10] = [
        Compare::Eq,
        Compare::Ne,
        Compare::Lt,
        Compare::Le,
        Compare::Gt,
        Compare::Ge,
        Compare::In,
        Compare::NotIn,
        Compare::Is,
        Compare::IsNot,
    ];

    /// Source-level operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Compare::Eq => "==",
            Compare::Ne => "!=",
            Compare::Lt => "<",
            Compare::Le => "<=",
            Compare::Gt => ">",
            Compare::Ge => ">=",
            Compare::In => "in",
            Compare::NotIn => "not in",
            Compare::Is => "is",
            Compare::IsNot => "is not",
        }
    }
}

impl fmt::Display for Compare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown comparison operator: {0:?}")]
pub struct UnknownCompareError(pub String);

impl FromStr for Compare {
    type Err = UnknownCompareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Compare::ALL
            .iter()
            .copied()
            .find(|kind| kind.symbol() == s)
            .ok_or_else(|| UnknownCompareError(s.to_string()))
    }
}

/// Distances to the true and the false branch of one predicate evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchDistance {
    pub true_distance: f64,
    pub false_distance: f64,
}

impl BranchDistance {
    pub fn new(true_distance: f64, false_distance: f64) -> Self {
        BranchDistance {
            true_distance,
            false_distance,
        }
    }

    /// Binary distance for a predicate whose outcome carries no gradient.
    pub fn from_outcome(taken: bool) -> Self {
        if taken {
            BranchDistance::new(0.0, 1.0)
        } else {
            BranchDistance::new(1.0, 0.0)
        }
    }

    /// Whether the true branch was the one taken.
    pub fn took_true_branch(&self) -> bool {
        self.true_distance == 0.0
    }
}

/// Computes the branch distance of `a <kind> b`.
pub fn compute(kind: Compare, a: &Value, b: &Value) -> PutResult<BranchDistance> {
    compute_bounded(kind, a, b, None)
}

/// Like [`compute`], but the `in` fallback examines at most `scan_limit`
/// members of the container.
pub fn compute_bounded(
    kind: Compare,
    a: &Value,
    b: &Value,
    scan_limit: Option<usize>,
) -> PutResult<BranchDistance> {
    match kind {
        Compare::Eq => exclusive(eq(a, b)?, || neq(a, b)),
        Compare::Ne => exclusive(neq(a, b)?, || eq(a, b)),
        Compare::Lt => exclusive(lt(a, b)?, || le(b, a)),
        Compare::Le => exclusive(le(a, b)?, || lt(b, a)),
        Compare::Gt => exclusive(lt(b, a)?, || le(a, b)),
        Compare::Ge => exclusive(le(b, a)?, || lt(a, b)),
        Compare::In => exclusive(contains_bounded(a, b, scan_limit)?, || not_contains(a, b)),
        Compare::NotIn => exclusive(not_contains(a, b)?, || contains_bounded(a, b, scan_limit)),
        Compare::Is => exclusive(is(a, b), || Ok(is_not(a, b))),
        Compare::IsNot => exclusive(is_not(a, b), || Ok(is(a, b))),
    }
}

/// Pairs a true distance with the distance of the opposite branch.
///
/// The opposite side is only evaluated when the true branch was taken, so
/// operands without a total order (NaN, sets, user-defined orderings) still
/// yield exactly one zero.
fn exclusive(
    true_distance: f64,
    false_distance: impl FnOnce() -> PutResult<f64>,
) -> PutResult<BranchDistance> {
    if true_distance != 0.0 {
        return Ok(BranchDistance::new(true_distance, 0.0));
    }
    let false_distance = match false_distance()? {
        d if d == 0.0 => 1.0,
        d => d,
    };
    Ok(BranchDistance::new(0.0, false_distance))
}

/// `a - b` for numeric operands, `None` otherwise or when undefined (NaN).
fn numeric_difference(a: &Value, b: &Value) -> Option<f64> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return Some((i128::from(x) - i128::from(y)) as f64);
    }
    let difference = a.as_number()? - b.as_number()?;
    if difference.is_nan() {
        None
    } else {
        Some(difference)
    }
}

/// Bytes decoded one code point per byte (ISO-8859-1).
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

/// Distance for `==`.
pub fn eq(a: &Value, b: &Value) -> PutResult<f64> {
    if a.equals(b)? {
        return Ok(0.0);
    }
    if let Some(difference) = numeric_difference(a, b) {
        // Unequal operands can round to the same f64.
        return Ok(difference.abs().max(f64::MIN_POSITIVE));
    }
    if let (Some(x), Some(y)) = (a.as_text(), b.as_text()) {
        return Ok(strsim::levenshtein(x, y) as f64);
    }
    if let (Some(x), Some(y)) = (a.as_bytes(), b.as_bytes()) {
        return Ok(strsim::levenshtein(&latin1(x), &latin1(y)) as f64);
    }
    Ok(INFINITY)
}

/// Distance for `!=`.
pub fn neq(a: &Value, b: &Value) -> PutResult<f64> {
    Ok(if a.not_equals(b)? { 0.0 } else { 1.0 })
}

/// Distance for `<`.
pub fn lt(a: &Value, b: &Value) -> PutResult<f64> {
    if a.less_than(b)? {
        return Ok(0.0);
    }
    Ok(numeric_difference(a, b).map_or(INFINITY, |difference| difference + 1.0))
}

/// Distance for `<=`.
pub fn le(a: &Value, b: &Value) -> PutResult<f64> {
    if a.less_equal(b)? {
        return Ok(0.0);
    }
    Ok(numeric_difference(a, b).map_or(INFINITY, |difference| difference + 1.0))
}

/// Distance for `item in container`.
///
/// When the item is absent this is the smallest `==` distance between the item
/// and any member, which scans the whole container.
pub fn contains(item: &Value, container: &Value) -> PutResult<f64> {
    contains_bounded(item, container, None)
}

/// Distance for `item in container`, scanning at most `scan_limit` members.
pub fn contains_bounded(item: &Value, container: &Value, scan_limit: Option<usize>) -> PutResult<f64> {
    if container.contains(item)? {
        return Ok(0.0);
    }
    let members = container.members()?;
    let scanned = scan_limit.unwrap_or(members.len());
    let mut best = INFINITY;
    for member in members.iter().take(scanned) {
        best = best.min(eq(item, member)?);
    }
    Ok(best)
}

/// Distance for `item not in container`.
pub fn not_contains(item: &Value, container: &Value) -> PutResult<f64> {
    Ok(if container.contains(item)? { 1.0 } else { 0.0 })
}

/// Distance for `is`.
pub fn is(a: &Value, b: &Value) -> f64 {
    if a.is_identical(b) {
        0.0
    } else {
        1.0
    }
}

/// Distance for `is not`.
pub fn is_not(a: &Value, b: &Value) -> f64 {
    if a.is_identical(b) {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_eq_numeric_uses_absolute_difference() {
        assert_eq!(eq(&int(3), &int(3)).unwrap(), 0.0);
        assert_eq!(eq(&int(3), &int(10)).unwrap(), 7.0);
        assert_eq!(eq(&Value::Float(1.5), &int(1)).unwrap(), 0.5);
        assert_eq!(eq(&int(i64::MIN), &int(i64::MAX)).unwrap(), u64::MAX as f64);
    }

    #[test]
    fn test_eq_at_float_precision_limit_takes_false_branch() {
        let big = int(9_007_199_254_740_993);
        let rounded = Value::Float(9_007_199_254_740_992.0);
        let distance = compute(Compare::Eq, &big, &rounded).unwrap();
        assert!(!distance.took_true_branch());
        assert!(distance.true_distance > 0.0);
        assert_eq!(distance.false_distance, 0.0);
        assert!(compute(Compare::Ne, &rounded, &big).unwrap().took_true_branch());
        assert!(compute(Compare::Lt, &rounded, &big).unwrap().took_true_branch());
    }

    #[test]
    fn test_ne_uses_user_inequality() {
        #[derive(Debug)]
        struct NeverDifferent;

        impl crate::value::PutObject for NeverDifferent {
            fn type_name(&self) -> &str {
                "NeverDifferent"
            }

            fn not_equals(&self, _other: &Value) -> PutResult<Option<bool>> {
                Ok(Some(false))
            }
        }

        let object = Value::object(NeverDifferent);
        assert_eq!(neq(&object, &int(1)).unwrap(), 1.0);
        assert_eq!(
            compute(Compare::Ne, &object, &int(1)).unwrap(),
            BranchDistance::new(1.0, 0.0)
        );
    }

    #[test]
    fn test_bool_in_bytes() {
        let haystack = Value::bytes(vec![1u8]);
        assert_eq!(
            compute(Compare::In, &Value::Bool(true), &haystack).unwrap(),
            BranchDistance::new(0.0, 1.0)
        );
        assert_eq!(contains(&Value::Bool(false), &haystack).unwrap(), 1.0);
    }

    #[test]
    fn test_eq_text_uses_levenshtein() {
        assert_eq!(eq(&Value::str("kitten"), &Value::str("sitting")).unwrap(), 3.0);
        assert_eq!(eq(&Value::str("abc"), &Value::str("abc")).unwrap(), 0.0);
    }

    #[test]
    fn test_eq_bytes_decoded_per_byte() {
        let a = Value::bytes(vec![0xff, 0x00, 0x41]);
        let b = Value::bytes(vec![0xfe, 0x00]);
        assert_eq!(eq(&a, &b).unwrap(), 2.0);
    }

    #[test]
    fn test_eq_incomparable_is_infinite() {
        assert_eq!(eq(&int(1), &Value::str("1")).unwrap(), INFINITY);
        assert_eq!(eq(&Value::None, &Value::list(vec![])).unwrap(), INFINITY);
        assert_eq!(eq(&Value::Float(f64::NAN), &int(1)).unwrap(), INFINITY);
    }

    #[test]
    fn test_ordering_distances() {
        assert_eq!(lt(&int(1), &int(2)).unwrap(), 0.0);
        assert_eq!(lt(&int(2), &int(2)).unwrap(), 1.0);
        assert_eq!(lt(&int(5), &int(2)).unwrap(), 4.0);
        assert_eq!(le(&int(2), &int(2)).unwrap(), 0.0);
        assert_eq!(le(&int(5), &int(2)).unwrap(), 4.0);
        assert_eq!(lt(&Value::str("b"), &Value::str("a")).unwrap(), INFINITY);
    }

    #[test]
    fn test_compute_lt_holds() {
        let distance = compute(Compare::Lt, &int(1), &int(2)).unwrap();
        assert_eq!(distance, BranchDistance::new(0.0, 2.0));
    }

    #[test]
    fn test_compute_gt_and_ge_mirror_lt_and_le() {
        assert_eq!(
            compute(Compare::Gt, &int(1), &int(4)).unwrap(),
            BranchDistance::new(4.0, 0.0)
        );
        assert_eq!(
            compute(Compare::Ge, &int(4), &int(4)).unwrap(),
            BranchDistance::new(0.0, 1.0)
        );
    }

    #[test]
    fn test_compute_nan_takes_false_branch() {
        let nan = Value::Float(f64::NAN);
        for kind in [Compare::Lt, Compare::Le, Compare::Gt, Compare::Ge, Compare::Eq] {
            let distance = compute(kind, &nan, &int(1)).unwrap();
            assert_eq!(distance.false_distance, 0.0, "{}", kind);
            assert_eq!(distance.true_distance, INFINITY, "{}", kind);
        }
    }

    #[test]
    fn test_contains_falls_back_to_closest_member() {
        let container = Value::list(vec![int(10), int(20), int(4)]);
        assert_eq!(contains(&int(5), &container).unwrap(), 1.0);
        assert_eq!(contains(&int(20), &container).unwrap(), 0.0);
        assert_eq!(contains(&int(5), &Value::list(vec![])).unwrap(), INFINITY);
        assert_eq!(contains_bounded(&int(5), &container, Some(2)).unwrap(), 5.0);
    }

    #[test]
    fn test_contains_in_text_measures_against_characters() {
        assert_eq!(contains(&Value::str("z"), &Value::str("abc")).unwrap(), 1.0);
        assert_eq!(contains(&Value::str("bc"), &Value::str("abc")).unwrap(), 0.0);
    }

    #[test]
    fn test_compute_in_and_not_in() {
        let container = Value::set(vec![int(1), int(2)]);
        assert_eq!(
            compute(Compare::In, &int(4), &container).unwrap(),
            BranchDistance::new(2.0, 0.0)
        );
        assert_eq!(
            compute(Compare::NotIn, &int(4), &container).unwrap(),
            BranchDistance::new(0.0, 2.0)
        );
        assert_eq!(
            compute(Compare::In, &int(1), &container).unwrap(),
            BranchDistance::new(0.0, 1.0)
        );
    }

    #[test]
    fn test_compute_identity() {
        let shared = Value::list(vec![int(1)]);
        let copy = Value::list(vec![int(1)]);
        assert_eq!(
            compute(Compare::Is, &shared, &shared.clone()).unwrap(),
            BranchDistance::new(0.0, 1.0)
        );
        assert_eq!(
            compute(Compare::Is, &shared, &copy).unwrap(),
            BranchDistance::new(1.0, 0.0)
        );
        assert_eq!(
            compute(Compare::IsNot, &shared, &copy).unwrap(),
            BranchDistance::new(0.0, 1.0)
        );
    }

    #[test]
    fn test_unorderable_operands_propagate() {
        assert!(compute(Compare::Lt, &int(1), &Value::str("a")).is_err());
        assert!(compute(Compare::In, &int(1), &int(2)).is_err());
    }

    #[test]
    fn test_compare_symbols_round_trip() {
        for kind in Compare::ALL {
            assert_eq!(kind.symbol().parse::<Compare>().unwrap(), kind);
        }
        assert_eq!(
            "<>".parse::<Compare>(),
            Err(UnknownCompareError("<>".to_string()))
        );
    }
}
