//! Registry of instrumented code objects and predicates
//!
//! Instrumentation registers every code object and every predicate it finds
//! exactly once. Each gets a dense integer id equal to the number of entries
//! registered before it, so ids start at 0 and can index per-predicate arrays
//! kept by consumers.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Identifies a registered code object.
pub type CodeObjectId = usize;

/// Identifies a registered predicate.
pub type PredicateId = usize;

/// Payload the tracer stores without interpreting it.
pub type Opaque = Arc<dyn Any + Send + Sync>;

/// Meta data of one compiled code object, e.g. a function body.
#[derive(Clone)]
pub struct CodeObjectMetaData {
    /// The raw executable representation.
    pub code_object: Opaque,
    /// Id of the lexically enclosing code object, if any.
    pub parent_code_object_id: Option<CodeObjectId>,
    /// Control flow graph of this code object.
    pub cfg: Opaque,
    /// Control dependence graph of this code object.
    pub cdg: Opaque,
}

impl CodeObjectMetaData {
    pub fn new<C, G, D>(
        code_object: C,
        parent_code_object_id: Option<CodeObjectId>,
        cfg: G,
        cdg: D,
    ) -> Self
    where
        C: Any + Send + Sync,
        G: Any + Send + Sync,
        D: Any + Send + Sync,
    {
        CodeObjectMetaData {
            code_object: Arc::new(code_object),
            parent_code_object_id,
            cfg: Arc::new(cfg),
            cdg: Arc::new(cdg),
        }
    }

    pub fn code_object_as<T: Any>(&self) -> Option<&T> {
        self.code_object.downcast_ref()
    }

    pub fn cfg_as<T: Any>(&self) -> Option<&T> {
        self.cfg.downcast_ref()
    }

    pub fn cdg_as<T: Any>(&self) -> Option<&T> {
        self.cdg.downcast_ref()
    }
}

impl fmt::Debug for CodeObjectMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeObjectMetaData")
            .field("parent_code_object_id", &self.parent_code_object_id)
            .finish_non_exhaustive()
    }
}

/// Meta data of one predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredicateMetaData {
    /// Source line of the predicate; unknown for synthesized predicates.
    pub line_no: Option<u32>,
    /// Code object the predicate belongs to.
    pub code_object_id: CodeObjectId,
}

impl PredicateMetaData {
    pub fn new(line_no: Option<u32>, code_object_id: CodeObjectId) -> Self {
        PredicateMetaData {
            line_no,
            code_object_id,
        }
    }
}

/// Known code objects and predicates.
#[derive(Debug, Clone, Default)]
pub struct KnownData {
    existing_code_objects: Vec<CodeObjectMetaData>,
    existing_predicates: Vec<PredicateMetaData>,
    /// Code objects without any registered predicate. Every code object starts
    /// here and leaves when its first predicate is registered.
    branch_less_code_objects: BTreeSet<CodeObjectId>,
}

impl KnownData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a code object and returns its id. Does not deduplicate.
    pub fn register_code_object(&mut self, meta: CodeObjectMetaData) -> CodeObjectId {
        let code_object_id = self.existing_code_objects.len();
        self.existing_code_objects.push(meta);
        self.branch_less_code_objects.insert(code_object_id);
        code_object_id
    }

    /// Registers a predicate and returns its id. Does not deduplicate.
    pub fn register_predicate(&mut self, meta: PredicateMetaData) -> PredicateId {
        let predicate_id = self.existing_predicates.len();
        self.existing_predicates.push(meta);
        self.branch_less_code_objects.remove(&meta.code_object_id);
        predicate_id
    }

    /// Forgets everything; the next registration gets id 0 again.
    pub fn reset(&mut self) {
        *self = KnownData::default();
    }

    pub fn code_object(&self, id: CodeObjectId) -> Option<&CodeObjectMetaData> {
        self.existing_code_objects.get(id)
    }

    pub fn predicate(&self, id: PredicateId) -> Option<&PredicateMetaData> {
        self.existing_predicates.get(id)
    }

    pub fn has_code_object(&self, id: CodeObjectId) -> bool {
        id < self.existing_code_objects.len()
    }

    pub fn has_predicate(&self, id: PredicateId) -> bool {
        id < self.existing_predicates.len()
    }

    /// Registered code objects in id order.
    pub fn code_objects(&self) -> impl Iterator<Item = (CodeObjectId, &CodeObjectMetaData)> {
        self.existing_code_objects.iter().enumerate()
    }

    /// Registered predicates in id order.
    pub fn predicates(&self) -> impl Iterator<Item = (PredicateId, &PredicateMetaData)> {
        self.existing_predicates.iter().enumerate()
    }

    /// Predicates registered against `code_object_id`.
    pub fn predicates_of(&self, code_object_id: CodeObjectId) -> impl Iterator<Item = PredicateId> + '_ {
        self.predicates()
            .filter(move |(_, meta)| meta.code_object_id == code_object_id)
            .map(|(id, _)| id)
    }

    pub fn branch_less_code_objects(&self) -> &BTreeSet<CodeObjectId> {
        &self.branch_less_code_objects
    }

    pub fn code_object_count(&self) -> usize {
        self.existing_code_objects.len()
    }

    pub fn predicate_count(&self) -> usize {
        self.existing_predicates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_object(parent: Option<CodeObjectId>) -> CodeObjectMetaData {
        CodeObjectMetaData::new("code", parent, (), ())
    }

    #[test]
    fn test_ids_are_dense_and_ordered() {
        let mut known = KnownData::new();
        assert_eq!(known.register_code_object(code_object(None)), 0);
        assert_eq!(known.register_code_object(code_object(Some(0))), 1);
        assert_eq!(known.register_predicate(PredicateMetaData::new(Some(3), 1)), 0);
        assert_eq!(known.register_predicate(PredicateMetaData::new(None, 1)), 1);
        assert_eq!(known.code_object_count(), 2);
        assert_eq!(known.predicate_count(), 2);
        assert_eq!(known.code_object(1).unwrap().parent_code_object_id, Some(0));
        assert_eq!(known.predicates_of(1).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_branch_less_is_one_way() {
        let mut known = KnownData::new();
        let outer = known.register_code_object(code_object(None));
        let inner = known.register_code_object(code_object(Some(outer)));
        assert_eq!(
            known.branch_less_code_objects().iter().copied().collect::<Vec<_>>(),
            vec![outer, inner]
        );

        known.register_predicate(PredicateMetaData::new(Some(1), inner));
        known.register_predicate(PredicateMetaData::new(Some(2), inner));
        assert!(known.branch_less_code_objects().contains(&outer));
        assert!(!known.branch_less_code_objects().contains(&inner));
    }

    #[test]
    fn test_reset_restarts_ids() {
        let mut known = KnownData::new();
        known.register_code_object(code_object(None));
        known.register_predicate(PredicateMetaData::new(None, 0));
        known.reset();
        assert!(!known.has_code_object(0));
        assert!(!known.has_predicate(0));
        assert!(known.branch_less_code_objects().is_empty());
        assert_eq!(known.register_code_object(code_object(None)), 0);
    }

    #[test]
    fn test_opaque_payloads_downcast() {
        let meta = CodeObjectMetaData::new(String::from("def f(): pass"), None, 7_u32, vec![1_u8]);
        assert_eq!(meta.code_object_as::<String>().unwrap(), "def f(): pass");
        assert_eq!(meta.cfg_as::<u32>(), Some(&7));
        assert_eq!(meta.cdg_as::<Vec<u8>>(), Some(&vec![1_u8]));
        assert!(meta.cfg_as::<String>().is_none());
    }
}
