//! Typed accessor over an engine-side ANOVA fit object.
//!
//! A fit result is discovered by class enumeration (`maanova` class tag) or
//! named as the assignment target of a fit command. Its term structure is
//! read back from the object's component names: every component ending in
//! the level suffix describes one fitted term, except the reserved variance
//! levels entry.

use crate::error::RanovaError;
use crate::r_engine::REngine;
use crate::r_expression::{column_index, element_index};
use crate::r_object::RObject;
use std::sync::{Arc, OnceLock};

/// Run-time class tag of fit objects in the engine.
pub const FIT_CLASS: &str = "maanova";

const LEVEL_SUFFIX: &str = ".level";
const VARIANCE_LEVELS: &str = "S2.level";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitResult {
    object: RObject,
    experiment: OnceLock<String>,
}

impl FitResult {
    pub fn new(object: RObject) -> Self {
        Self {
            object,
            experiment: OnceLock::new(),
        }
    }

    pub fn with_experiment(object: RObject, experiment: impl Into<String>) -> Self {
        let result = Self::new(object);
        result.set_experiment(experiment);
        result
    }

    pub fn object(&self) -> &RObject {
        &self.object
    }

    pub fn accessor(&self) -> &str {
        self.object.accessor()
    }

    /// Accessor of the experiment this fit was computed from, when known.
    pub fn experiment(&self) -> Option<&str> {
        self.experiment.get().map(String::as_str)
    }

    /// Associate the source experiment. Handles discovered by class
    /// enumeration start without one; first write wins.
    pub fn set_experiment(&self, accessor: impl Into<String>) {
        let _ = self.experiment.set(accessor.into());
    }

    fn experiment_accessor(&self) -> Result<&str, RanovaError> {
        self.experiment().ok_or_else(|| {
            RanovaError::Evaluation(format!(
                "fit '{}' has no associated experiment",
                self.object.accessor()
            ))
        })
    }

    /// Names of all fitted terms, in discovery order. A component belongs
    /// iff it ends with the level suffix and is not the variance levels
    /// entry; the suffix is stripped.
    pub fn term_names(&self) -> Result<Vec<String>, RanovaError> {
        let names = self.object.component_names()?;
        Ok(names
            .into_iter()
            .filter(|n| n.ends_with(LEVEL_SUFFIX) && n != VARIANCE_LEVELS)
            .map(|n| n[..n.len() - LEVEL_SUFFIX.len()].to_string())
            .collect())
    }

    /// Factor levels of one fitted term. Best-effort: an engine-side
    /// failure (for example a term name that is not valid syntax) is logged
    /// and reported as `None` so interactive callers degrade instead of
    /// crashing.
    pub fn term_levels(&self, term: &str) -> Option<Vec<String>> {
        let command = format!(
            "as.character({}${term}{LEVEL_SUFFIX})",
            self.object.accessor()
        );
        match self.object.engine().eval(&command) {
            Ok(value) => value.as_strings(),
            Err(err) => {
                log::warn!("could not fetch levels of term '{term}': {err}");
                None
            }
        }
    }

    /// Number of dye channels, read from the source experiment.
    pub fn dye_count(&self) -> Result<usize, RanovaError> {
        let experiment = self.experiment_accessor()?;
        let value = self.object.engine().eval(&format!("{experiment}$n.dye"))?;
        value.as_scalar_usize().ok_or_else(|| {
            RanovaError::Evaluation(format!("{experiment}$n.dye was not a count"))
        })
    }

    /// Fitted values for one (dye, array) pair. Fitted data is stored
    /// column-major with dye as the fast-varying axis, so the composite
    /// column is `array_index * dye_count + dye_index`.
    pub fn yhat_column(
        &self,
        dye_index: usize,
        array_index: usize,
        dye_count: usize,
    ) -> Result<Vec<f64>, RanovaError> {
        let composite = array_index * dye_count + dye_index;
        let command = column_index(&format!("{}$yhat", self.object.accessor()), composite);
        let value = self.object.engine().eval(&command)?;
        value
            .as_doubles()
            .ok_or_else(|| RanovaError::Evaluation(format!("{command} was not numeric")))
    }

    /// Observed and fitted values for one composite column, length-checked
    /// for residual plotting. A length disagreement is a data-integrity
    /// fault and aborts the operation.
    pub fn fitted_and_observed(
        &self,
        dye_index: usize,
        array_index: usize,
        dye_count: usize,
    ) -> Result<(Vec<f64>, Vec<f64>), RanovaError> {
        let fitted = self.yhat_column(dye_index, array_index, dye_count)?;
        let experiment = self.experiment_accessor()?;
        let composite = array_index * dye_count + dye_index;
        let command = column_index(&format!("{experiment}$data"), composite);
        let value = self.object.engine().eval(&command)?;
        let observed = value
            .as_doubles()
            .ok_or_else(|| RanovaError::Evaluation(format!("{command} was not numeric")))?;
        if observed.len() != fitted.len() {
            return Err(RanovaError::ShapeMismatch {
                context: format!("fitted vs observed data of {}", self.object.accessor()),
                expected: fitted.len(),
                actual: observed.len(),
            });
        }
        Ok((fitted, observed))
    }

    /// All probeset identifiers. The string coercion is mandatory: upstream
    /// data sometimes stores IDs as an integer factor code.
    pub fn probeset_ids(&self) -> Result<Vec<String>, RanovaError> {
        let experiment = self.experiment_accessor()?;
        let command = format!("as.character({experiment}$probeid)");
        let value = self.object.engine().eval(&command)?;
        value
            .as_strings()
            .ok_or_else(|| RanovaError::Evaluation(format!("{command} was not character")))
    }

    pub fn probeset_id(&self, index: usize) -> Result<Option<String>, RanovaError> {
        let experiment = self.experiment_accessor()?;
        let command = format!(
            "as.character({})",
            element_index(&format!("{experiment}$probeid"), index)
        );
        let value = self.object.engine().eval(&command)?;
        Ok(value.as_strings().and_then(|v| v.into_iter().next()))
    }

    pub fn delete(&self) -> Result<(), RanovaError> {
        self.object.delete()
    }

    /// Every top-level engine object carrying the fit class tag.
    pub fn all_fit_objects(engine: &Arc<dyn REngine>) -> Result<Vec<FitResult>, RanovaError> {
        let names = engine.objects_with_class(FIT_CLASS)?;
        Ok(names
            .into_iter()
            .map(|name| FitResult::new(RObject::new(Arc::clone(engine), name)))
            .collect())
    }
}
