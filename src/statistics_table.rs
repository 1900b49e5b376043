//! Per-statistic table attached to a test result.
//!
//! Each F-statistic variant (`F1`, `Fs`) of a test result carries a fixed
//! set of named components. Any of them except the observed statistic may be
//! absent: tabulated p-values only exist when requested, permutation
//! p-values only when permutations ran, adjusted variants only after
//! adjustment. Absence is a valid state and is reported as `None`, never as
//! an error.

use crate::error::RanovaError;
use crate::r_expression::{column_index, matrix_index};
use crate::r_object::RObject;
use serde::{Deserialize, Serialize};

/// The named components of a statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatisticKind {
    Observed,
    TabulatedP,
    PermutationP,
    AdjTabulatedP,
    AdjPermutationP,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 5] = [
        StatisticKind::Observed,
        StatisticKind::TabulatedP,
        StatisticKind::PermutationP,
        StatisticKind::AdjTabulatedP,
        StatisticKind::AdjPermutationP,
    ];

    pub fn component_name(self) -> &'static str {
        match self {
            Self::Observed => "Fobs",
            Self::TabulatedP => "Ptab",
            Self::PermutationP => "Pvalperm",
            Self::AdjTabulatedP => "adjPtab",
            Self::AdjPermutationP => "adjPvalperm",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Observed => "Observed statistic",
            Self::TabulatedP => "Tabulated p-value",
            Self::PermutationP => "Permutation p-value",
            Self::AdjTabulatedP => "Adjusted tabulated p-value",
            Self::AdjPermutationP => "Adjusted permutation p-value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsTable {
    object: RObject,
}

impl StatisticsTable {
    pub fn new(object: RObject) -> Self {
        Self { object }
    }

    pub fn object(&self) -> &RObject {
        &self.object
    }

    fn component_matrix(&self, kind: StatisticKind) -> String {
        format!(
            "as.matrix({}${})",
            self.object.accessor(),
            kind.component_name()
        )
    }

    /// Number of contrast columns, taken from the observed statistic. That
    /// is the one component guaranteed to be present, so it serves as the
    /// authoritative shape reference.
    pub fn contrast_count(&self) -> Result<usize, RanovaError> {
        let command = format!("ncol({})", self.component_matrix(StatisticKind::Observed));
        let value = self.object.engine().eval(&command)?;
        value.as_scalar_usize().ok_or_else(|| {
            RanovaError::Evaluation(format!("{command} did not return a column count"))
        })
    }

    /// Number of probeset rows, from the same shape reference.
    pub fn row_count(&self) -> Result<usize, RanovaError> {
        let command = format!("nrow({})", self.component_matrix(StatisticKind::Observed));
        let value = self.object.engine().eval(&command)?;
        value
            .as_scalar_usize()
            .ok_or_else(|| RanovaError::Evaluation(format!("{command} did not return a row count")))
    }

    pub fn has_statistic(&self, kind: StatisticKind) -> Result<bool, RanovaError> {
        Ok(!self.object.component_is_null(kind.component_name())?)
    }

    /// One contrast column of a statistic. `None` when the whole component
    /// is absent; absent or not-a-number cells map to `None` elements.
    pub fn values(
        &self,
        kind: StatisticKind,
        contrast_index: usize,
    ) -> Result<Option<Vec<Option<f64>>>, RanovaError> {
        if !self.has_statistic(kind)? {
            return Ok(None);
        }
        let command = column_index(&self.component_matrix(kind), contrast_index);
        let value = self.object.engine().eval(&command)?;
        let doubles = value.as_doubles().ok_or_else(|| {
            RanovaError::Evaluation(format!("{command} did not return a numeric column"))
        })?;
        Ok(Some(
            doubles
                .into_iter()
                .map(|v| if v.is_nan() { None } else { Some(v) })
                .collect(),
        ))
    }

    /// One cell. The engine's not-a-number sentinel maps to `None`; any
    /// other numeric value passes through unchanged. Downstream consumers
    /// treat `None` as "not computed", not as an invalid number.
    pub fn value(
        &self,
        probe_index: usize,
        kind: StatisticKind,
        contrast_index: usize,
    ) -> Result<Option<f64>, RanovaError> {
        if !self.has_statistic(kind)? {
            return Ok(None);
        }
        let command = matrix_index(&self.component_matrix(kind), probe_index, contrast_index);
        let value = self.object.engine().eval(&command)?;
        let scalar = value.as_scalar_f64().ok_or_else(|| {
            RanovaError::Evaluation(format!("{command} did not return a numeric scalar"))
        })?;
        Ok(if scalar.is_nan() { None } else { Some(scalar) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_engine::mock::MockEngine;
    use crate::r_engine::RValue;
    use std::sync::Arc;

    fn table(engine: &Arc<MockEngine>) -> StatisticsTable {
        StatisticsTable::new(RObject::new(engine.clone(), "test1$F1"))
    }

    fn logical(value: bool) -> RValue {
        RValue::Logicals {
            values: vec![value],
        }
    }

    #[test]
    fn contrast_count_comes_from_observed_statistic_shape() {
        let engine = Arc::new(MockEngine::new());
        engine.stub(
            "ncol(as.matrix(test1$F1$Fobs))",
            RValue::Integers { values: vec![3] },
        );
        assert_eq!(table(&engine).contrast_count().unwrap(), 3);
    }

    #[test]
    fn absent_component_reports_none_not_error() {
        let engine = Arc::new(MockEngine::new());
        engine.stub("is.null(test1$F1$Pvalperm)", logical(true));
        let result = table(&engine)
            .values(StatisticKind::PermutationP, 0)
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn column_fetch_translates_index_and_maps_nan_to_none() {
        let engine = Arc::new(MockEngine::new());
        engine.stub("is.null(test1$F1$Ptab)", logical(false));
        engine.stub(
            "as.matrix(test1$F1$Ptab)[, 2]",
            RValue::Doubles {
                values: vec![0.01, f64::NAN, 0.2],
            },
        );
        let values = table(&engine)
            .values(StatisticKind::TabulatedP, 1)
            .unwrap()
            .unwrap();
        assert_eq!(values, vec![Some(0.01), None, Some(0.2)]);
    }

    #[test]
    fn scalar_fetch_maps_nan_sentinel_to_none() {
        let engine = Arc::new(MockEngine::new());
        engine.stub("is.null(test1$F1$Fobs)", logical(false));
        engine.stub(
            "as.matrix(test1$F1$Fobs)[1, 1]",
            RValue::Doubles {
                values: vec![f64::NAN],
            },
        );
        engine.stub(
            "as.matrix(test1$F1$Fobs)[5, 1]",
            RValue::Doubles { values: vec![12.5] },
        );
        let t = table(&engine);
        assert_eq!(t.value(0, StatisticKind::Observed, 0).unwrap(), None);
        assert_eq!(t.value(4, StatisticKind::Observed, 0).unwrap(), Some(12.5));
    }
}
