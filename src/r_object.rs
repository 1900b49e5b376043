//! Handle to an engine-side value, identified by its accessor expression.
//!
//! The engine names values, the bridge never copies them: a handle is just
//! the R expression that yields the value when evaluated, plus the session
//! it lives in. Two handles with the same accessor text denote the same
//! engine-side value, so identity, equality and hashing use only that
//! string. Handles are immutable after construction and safe to share
//! across threads.

use crate::error::RanovaError;
use crate::r_engine::REngine;
use crate::r_expression::{column_index, element_index};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone)]
pub struct RObject {
    engine: Arc<dyn REngine>,
    accessor: String,
}

impl RObject {
    pub fn new(engine: Arc<dyn REngine>, accessor: impl Into<String>) -> Self {
        Self {
            engine,
            accessor: accessor.into(),
        }
    }

    pub fn accessor(&self) -> &str {
        &self.accessor
    }

    pub fn engine(&self) -> &Arc<dyn REngine> {
        &self.engine
    }

    /// Child handle for the named component (`parent$name`).
    pub fn component(&self, name: &str) -> RObject {
        RObject::new(Arc::clone(&self.engine), format!("{}${name}", self.accessor))
    }

    /// Child handle for a zero-based element (`parent[[i + 1]]`).
    pub fn element(&self, index: usize) -> RObject {
        RObject::new(Arc::clone(&self.engine), element_index(&self.accessor, index))
    }

    /// Child handle for a zero-based column (`parent[, i + 1]`).
    pub fn column(&self, index: usize) -> RObject {
        RObject::new(Arc::clone(&self.engine), column_index(&self.accessor, index))
    }

    /// True when the accessor names an existing top-level object. Only
    /// meaningful for plain-name accessors.
    pub fn exists(&self) -> Result<bool, RanovaError> {
        self.engine.exists(&self.accessor)
    }

    pub fn inherits(&self, class: &str) -> Result<bool, RanovaError> {
        self.engine.inherits(&self.accessor, class)
    }

    pub fn component_names(&self) -> Result<Vec<String>, RanovaError> {
        self.engine.component_names(&self.accessor)
    }

    pub fn is_null(&self) -> Result<bool, RanovaError> {
        self.engine.is_null(&self.accessor)
    }

    pub fn component_is_null(&self, name: &str) -> Result<bool, RanovaError> {
        self.engine
            .is_null(&format!("{}${name}", self.accessor))
    }

    /// Ask the engine to remove the object. Removal of an already-gone name
    /// is whatever the engine defines; no special-casing here. The local
    /// handle should be discarded afterwards.
    pub fn delete(&self) -> Result<(), RanovaError> {
        self.engine.eval_void(&format!("rm({})", self.accessor))
    }
}

impl fmt::Debug for RObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RObject")
            .field("accessor", &self.accessor)
            .finish()
    }
}

impl PartialEq for RObject {
    fn eq(&self, other: &Self) -> bool {
        self.accessor == other.accessor
    }
}

impl Eq for RObject {}

impl Hash for RObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.accessor.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_engine::mock::MockEngine;
    use std::collections::HashSet;

    fn handle(accessor: &str) -> (Arc<MockEngine>, RObject) {
        let engine = Arc::new(MockEngine::new());
        let object = RObject::new(engine.clone(), accessor);
        (engine, object)
    }

    #[test]
    fn equality_and_hashing_use_only_the_accessor() {
        let (_, a) = handle("fit1");
        let (_, b) = handle("fit1");
        let (_, c) = handle("fit2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn child_handles_compose_accessor_expressions() {
        let (_, fit) = handle("fit1");
        assert_eq!(fit.component("yhat").accessor(), "fit1$yhat");
        assert_eq!(fit.element(0).accessor(), "fit1[[1]]");
        assert_eq!(fit.column(4).accessor(), "fit1[, 5]");
        assert_eq!(
            fit.component("yhat").column(0).accessor(),
            "fit1$yhat[, 1]"
        );
    }

    #[test]
    fn delete_issues_a_remove_command() {
        let (engine, fit) = handle("fit1");
        fit.delete().unwrap();
        assert_eq!(engine.commands(), vec!["rm(fit1)".to_string()]);
    }
}
