//! Typed accessor over an engine-side hypothesis test object.
//!
//! Test objects carry the `matest` class tag plus exactly one of the two
//! subtype tags. The subtype decides how fold-change data is shaped (flat
//! vector for F tests, one matrix column per contrast for T tests); the two
//! paths are not interchangeable, so every statistic-dependent call goes
//! through the classified type. Classification is deterministic given engine
//! state and is memoized after the first success; engine result objects
//! never change class after creation.

use crate::error::RanovaError;
use crate::r_engine::REngine;
use crate::r_expression::column_index;
use crate::r_object::RObject;
use crate::statistics_table::{StatisticKind, StatisticsTable};
use crate::test_builder::TestType;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Run-time class tag shared by every test object.
pub const TEST_CLASS: &str = "matest";
const F_TEST_CLASS: &str = "ftest";
const T_TEST_CLASS: &str = "ttest";

/// Which F-statistic table of the test to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatistic {
    F1,
    Fs,
}

impl TestStatistic {
    pub fn component_name(self) -> &'static str {
        match self {
            Self::F1 => "F1",
            Self::Fs => "Fs",
        }
    }

    pub fn from_component_name(name: &str) -> Option<Self> {
        match name {
            "F1" => Some(Self::F1),
            "Fs" => Some(Self::Fs),
            _ => None,
        }
    }
}

/// One assembled result-table row: probeset ID plus the requested
/// statistics, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbesetRow {
    pub probeset_id: String,
    pub values: Vec<f64>,
}

/// Plot-ready volcano data: per-probe fold change paired with the negative
/// decimal log of the p-value. Probes without a computed p-value carry
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct VolcanoData {
    pub fold_change: Vec<f64>,
    pub neg_log10_p: Vec<Option<f64>>,
}

#[derive(Debug)]
pub struct TestResult {
    object: RObject,
    data: OnceLock<String>,
    classified: OnceLock<TestType>,
}

impl TestResult {
    pub fn new(object: RObject) -> Self {
        Self {
            object,
            data: OnceLock::new(),
            classified: OnceLock::new(),
        }
    }

    pub fn with_data(object: RObject, data: impl Into<String>) -> Self {
        let result = Self::new(object);
        result.set_data(data);
        result
    }

    pub fn object(&self) -> &RObject {
        &self.object
    }

    pub fn accessor(&self) -> &str {
        self.object.accessor()
    }

    /// Accessor of the experiment the test ran against, when known.
    pub fn data(&self) -> Option<&str> {
        self.data.get().map(String::as_str)
    }

    /// Associate the source experiment. The engine does not record which
    /// experiment a test ran against, so handles discovered by class
    /// enumeration learn it from the caller. First write wins; later calls
    /// are ignored so shared handles stay consistent.
    pub fn set_data(&self, accessor: impl Into<String>) {
        let _ = self.data.set(accessor.into());
    }

    /// Classify the test as F or T by class membership, memoized after the
    /// first successful classification. An object matching neither tag
    /// stays unclassified and fails every statistic-dependent call.
    pub fn test_type(&self) -> Result<TestType, RanovaError> {
        if let Some(cached) = self.classified.get() {
            return Ok(*cached);
        }
        let test_type = if self.object.inherits(F_TEST_CLASS)? {
            TestType::Ftest
        } else if self.object.inherits(T_TEST_CLASS)? {
            TestType::Ttest
        } else {
            return Err(RanovaError::Classification(format!(
                "'{}' is neither an F-test nor a T-test object",
                self.object.accessor()
            )));
        };
        let _ = self.classified.set(test_type);
        Ok(test_type)
    }

    /// Fold-change values for one plot. F tests store a flat vector; T
    /// tests store one column per contrast and require the plot index.
    pub fn fold_change(&self, plot_index: usize) -> Result<Vec<f64>, RanovaError> {
        let base = format!("{}$fold.change", self.object.accessor());
        let command = match self.test_type()? {
            TestType::Ftest => format!("as.vector({base})"),
            TestType::Ttest => column_index(&format!("as.matrix({base})"), plot_index),
        };
        let value = self.object.engine().eval(&command)?;
        value
            .as_doubles()
            .ok_or_else(|| RanovaError::Evaluation(format!("{command} was not numeric")))
    }

    /// The statistics table for one F variant, or `None` when the engine
    /// did not compute it (a valid, expected state).
    pub fn statistics(
        &self,
        statistic: TestStatistic,
    ) -> Result<Option<StatisticsTable>, RanovaError> {
        self.test_type()?;
        if self.object.component_is_null(statistic.component_name())? {
            return Ok(None);
        }
        Ok(Some(StatisticsTable::new(
            self.object.component(statistic.component_name()),
        )))
    }

    pub fn statistics_values(
        &self,
        statistic: TestStatistic,
        kind: StatisticKind,
        contrast_index: usize,
    ) -> Result<Option<Vec<Option<f64>>>, RanovaError> {
        match self.statistics(statistic)? {
            Some(table) => table.values(kind, contrast_index),
            None => Ok(None),
        }
    }

    pub fn statistics_value(
        &self,
        probe_index: usize,
        statistic: TestStatistic,
        kind: StatisticKind,
        contrast_index: usize,
    ) -> Result<Option<f64>, RanovaError> {
        match self.statistics(statistic)? {
            Some(table) => table.value(probe_index, kind, contrast_index),
            None => Ok(None),
        }
    }

    fn probeset_id(&self, index: usize) -> Result<Option<String>, RanovaError> {
        let Some(data) = self.data() else {
            return Ok(None);
        };
        let command = format!(
            "as.character({})",
            crate::r_expression::element_index(&format!("{data}$probeid"), index)
        );
        let value = self.object.engine().eval(&command)?;
        Ok(value.as_strings().and_then(|v| v.into_iter().next()))
    }

    /// Assemble one table row for a probeset. All-or-nothing: if the
    /// probeset ID or any requested statistic is absent, no partial row is
    /// produced.
    pub fn probeset_row(
        &self,
        probe_index: usize,
        contrast_index: usize,
        statistic: TestStatistic,
        kinds: &[StatisticKind],
    ) -> Result<Option<ProbesetRow>, RanovaError> {
        let Some(probeset_id) = self.probeset_id(probe_index)? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.statistics_value(probe_index, statistic, *kind, contrast_index)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(ProbesetRow {
            probeset_id,
            values,
        }))
    }

    /// Fold change paired with -log10(p) for volcano plotting. Permutation
    /// p-values are preferred when computed, tabulated ones otherwise.
    pub fn volcano_data(
        &self,
        statistic: TestStatistic,
        contrast_index: usize,
    ) -> Result<VolcanoData, RanovaError> {
        let fold_change = self.fold_change(contrast_index)?;
        let p_values = match self.statistics_values(
            statistic,
            StatisticKind::PermutationP,
            contrast_index,
        )? {
            Some(values) => values,
            None => self
                .statistics_values(statistic, StatisticKind::TabulatedP, contrast_index)?
                .ok_or_else(|| {
                    RanovaError::Evaluation(format!(
                        "'{}' has no p-values for {:?}",
                        self.object.accessor(),
                        statistic
                    ))
                })?,
        };
        if p_values.len() != fold_change.len() {
            return Err(RanovaError::ShapeMismatch {
                context: format!("volcano data of {}", self.object.accessor()),
                expected: fold_change.len(),
                actual: p_values.len(),
            });
        }
        let neg_log10_p = p_values
            .into_iter()
            .map(|p| p.map(|v| -v.log10()))
            .collect();
        Ok(VolcanoData {
            fold_change,
            neg_log10_p,
        })
    }

    pub fn delete(&self) -> Result<(), RanovaError> {
        self.object.delete()
    }

    /// Every top-level engine object carrying the test class tag.
    pub fn all_test_objects(engine: &Arc<dyn REngine>) -> Result<Vec<TestResult>, RanovaError> {
        let names = engine.objects_with_class(TEST_CLASS)?;
        Ok(names
            .into_iter()
            .map(|name| TestResult::new(RObject::new(Arc::clone(engine), name)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_engine::mock::MockEngine;
    use crate::r_engine::RValue;

    fn logical(value: bool) -> RValue {
        RValue::Logicals {
            values: vec![value],
        }
    }

    fn doubles(values: &[f64]) -> RValue {
        RValue::Doubles {
            values: values.to_vec(),
        }
    }

    fn f_test(engine: &Arc<MockEngine>) -> TestResult {
        engine.stub("inherits(test1, \"ftest\")", logical(true));
        TestResult::with_data(RObject::new(engine.clone(), "test1"), "mydata")
    }

    fn t_test(engine: &Arc<MockEngine>) -> TestResult {
        engine.stub("inherits(test1, \"ftest\")", logical(false));
        engine.stub("inherits(test1, \"ttest\")", logical(true));
        TestResult::with_data(RObject::new(engine.clone(), "test1"), "mydata")
    }

    #[test]
    fn discovered_test_learns_its_experiment_once() {
        let engine = Arc::new(MockEngine::new());
        let test = TestResult::new(RObject::new(engine, "test1"));
        assert_eq!(test.data(), None);
        test.set_data("mydata");
        test.set_data("otherdata");
        assert_eq!(test.data(), Some("mydata"));
    }

    #[test]
    fn classification_is_memoized_after_first_success() {
        let engine = Arc::new(MockEngine::new());
        let test = f_test(&engine);
        assert_eq!(test.test_type().unwrap(), TestType::Ftest);
        assert_eq!(test.test_type().unwrap(), TestType::Ftest);
        let classify_queries = engine
            .commands()
            .iter()
            .filter(|c| c.starts_with("inherits"))
            .count();
        assert_eq!(classify_queries, 1);
    }

    #[test]
    fn unknown_class_fails_classification() {
        let engine = Arc::new(MockEngine::new());
        engine.stub("inherits(test1, \"ftest\")", logical(false));
        engine.stub("inherits(test1, \"ttest\")", logical(false));
        let test = TestResult::new(RObject::new(engine.clone(), "test1"));
        assert!(matches!(
            test.test_type(),
            Err(RanovaError::Classification(_))
        ));
        assert!(matches!(
            test.fold_change(0),
            Err(RanovaError::Classification(_))
        ));
    }

    #[test]
    fn f_test_fold_change_coerces_to_flat_vector() {
        let engine = Arc::new(MockEngine::new());
        let test = f_test(&engine);
        engine.stub("as.vector(test1$fold.change)", doubles(&[0.5, -1.2]));
        assert_eq!(test.fold_change(3).unwrap(), vec![0.5, -1.2]);
    }

    #[test]
    fn t_test_fold_change_extracts_contrast_column() {
        let engine = Arc::new(MockEngine::new());
        let test = t_test(&engine);
        engine.stub("as.matrix(test1$fold.change)[, 2]", doubles(&[2.0, 0.25]));
        assert_eq!(test.fold_change(1).unwrap(), vec![2.0, 0.25]);
    }

    #[test]
    fn absent_statistics_table_is_none() {
        let engine = Arc::new(MockEngine::new());
        let test = f_test(&engine);
        engine.stub("is.null(test1$Fs)", logical(true));
        assert!(test.statistics(TestStatistic::Fs).unwrap().is_none());
        assert_eq!(
            test.statistics_value(0, TestStatistic::Fs, StatisticKind::Observed, 0)
                .unwrap(),
            None
        );
    }

    #[test]
    fn probeset_row_is_all_or_nothing() {
        let engine = Arc::new(MockEngine::new());
        let test = f_test(&engine);
        engine.stub(
            "as.character(mydata$probeid[[1]])",
            RValue::Strings {
                values: vec!["probe_1".to_string()],
            },
        );
        engine.stub("is.null(test1$F1)", logical(false));
        engine.stub("is.null(test1$F1$Fobs)", logical(false));
        engine.stub("is.null(test1$F1$Ptab)", logical(false));
        engine.stub("as.matrix(test1$F1$Fobs)[1, 1]", doubles(&[8.25]));
        // Ptab present but this cell is the engine's NaN sentinel.
        engine.stub("as.matrix(test1$F1$Ptab)[1, 1]", doubles(&[f64::NAN]));

        let full = test
            .probeset_row(0, 0, TestStatistic::F1, &[StatisticKind::Observed])
            .unwrap()
            .unwrap();
        assert_eq!(full.probeset_id, "probe_1");
        assert_eq!(full.values, vec![8.25]);

        let partial = test
            .probeset_row(
                0,
                0,
                TestStatistic::F1,
                &[StatisticKind::Observed, StatisticKind::TabulatedP],
            )
            .unwrap();
        assert_eq!(partial, None);
    }

    #[test]
    fn volcano_prefers_permutation_p_values() {
        let engine = Arc::new(MockEngine::new());
        let test = f_test(&engine);
        engine.stub("as.vector(test1$fold.change)", doubles(&[1.5, -0.5]));
        engine.stub("is.null(test1$F1)", logical(false));
        engine.stub("is.null(test1$F1$Pvalperm)", logical(false));
        engine.stub("as.matrix(test1$F1$Pvalperm)[, 1]", doubles(&[0.01, 0.1]));
        let volcano = test.volcano_data(TestStatistic::F1, 0).unwrap();
        assert_eq!(volcano.fold_change, vec![1.5, -0.5]);
        assert_eq!(volcano.neg_log10_p[0], Some(2.0));
        assert_eq!(volcano.neg_log10_p[1], Some(1.0));
    }

    #[test]
    fn volcano_rejects_mismatched_lengths() {
        let engine = Arc::new(MockEngine::new());
        let test = f_test(&engine);
        engine.stub("as.vector(test1$fold.change)", doubles(&[1.5, -0.5, 0.1]));
        engine.stub("is.null(test1$F1)", logical(false));
        engine.stub("is.null(test1$F1$Pvalperm)", logical(false));
        engine.stub("as.matrix(test1$F1$Pvalperm)[, 1]", doubles(&[0.01, 0.1]));
        assert!(matches!(
            test.volcano_data(TestStatistic::F1, 0),
            Err(RanovaError::ShapeMismatch { .. })
        ));
    }
}
