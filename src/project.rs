//! The set of tracked engine collections making up one analysis session.
//!
//! One engine session, three tracked classes: loaded experiments, model
//! fits, hypothesis tests. The GUI layer discovers analysis results by
//! refreshing these registries after running commands.

use crate::error::RanovaError;
use crate::fit_result::{FitResult, FIT_CLASS};
use crate::r_engine::REngine;
use crate::r_object::RObject;
use crate::registry::{ObjectRegistry, RefreshOutcome};
use crate::test_result::{TestResult, TEST_CLASS};
use std::sync::Arc;

/// Run-time class tag of loaded microarray experiment objects.
pub const EXPERIMENT_CLASS: &str = "madata";

pub struct Project {
    engine: Arc<dyn REngine>,
    experiments: ObjectRegistry<RObject>,
    fits: ObjectRegistry<FitResult>,
    tests: ObjectRegistry<TestResult>,
}

/// Per-collection change sets of one full refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProjectRefresh {
    pub experiments: RefreshOutcome,
    pub fits: RefreshOutcome,
    pub tests: RefreshOutcome,
}

impl Project {
    pub fn new(engine: Arc<dyn REngine>) -> Self {
        Self {
            experiments: ObjectRegistry::new(Arc::clone(&engine), EXPERIMENT_CLASS, RObject::new),
            fits: ObjectRegistry::new(Arc::clone(&engine), FIT_CLASS, |engine, accessor| {
                FitResult::new(RObject::new(engine, accessor))
            }),
            tests: ObjectRegistry::new(Arc::clone(&engine), TEST_CLASS, |engine, accessor| {
                TestResult::new(RObject::new(engine, accessor))
            }),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<dyn REngine> {
        &self.engine
    }

    pub fn experiments(&self) -> &ObjectRegistry<RObject> {
        &self.experiments
    }

    pub fn fits(&self) -> &ObjectRegistry<FitResult> {
        &self.fits
    }

    pub fn tests(&self) -> &ObjectRegistry<TestResult> {
        &self.tests
    }

    /// Refresh every tracked collection. Experiments first, then fits,
    /// then tests, so parents are registered before their dependents.
    pub fn refresh_all(&self) -> Result<ProjectRefresh, RanovaError> {
        Ok(ProjectRefresh {
            experiments: self.experiments.refresh()?,
            fits: self.fits.refresh()?,
            tests: self.tests.refresh()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_engine::mock::MockEngine;
    use crate::r_engine::RValue;

    fn listing_command(class: &str) -> String {
        format!(
            "Filter(function(n) inherits(get(n, envir = .GlobalEnv), \"{class}\"), ls(envir = .GlobalEnv))"
        )
    }

    #[test]
    fn refresh_all_tracks_each_class_separately() {
        let engine = Arc::new(MockEngine::new());
        engine.stub(
            &listing_command("madata"),
            RValue::Strings {
                values: vec!["mydata".to_string()],
            },
        );
        engine.stub(
            &listing_command("maanova"),
            RValue::Strings {
                values: vec!["fit1".to_string()],
            },
        );
        engine.stub(&listing_command("matest"), RValue::Strings { values: vec![] });

        let project = Project::new(engine);
        let refresh = project.refresh_all().unwrap();
        assert_eq!(refresh.experiments.added, vec!["mydata".to_string()]);
        assert_eq!(refresh.fits.added, vec!["fit1".to_string()]);
        assert!(refresh.tests.added.is_empty());
        assert!(project.fits().contains("fit1"));
        assert_eq!(project.tests().len(), 0);
    }

    #[test]
    fn failed_refresh_leaves_registries_untouched() {
        let engine = Arc::new(MockEngine::new());
        engine.stub(
            &listing_command("madata"),
            RValue::Strings {
                values: vec!["mydata".to_string()],
            },
        );
        // Fit listing unscripted: the engine reports an evaluation error.
        let project = Project::new(engine);
        assert!(project.refresh_all().is_err());
        assert!(project.experiments().contains("mydata"));
        assert_eq!(project.fits().len(), 0);
    }
}
