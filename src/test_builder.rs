//! Builder for the hypothesis test command (`matest`).
//!
//! The trickiest guards in the bridge live here: the contrast parameter has
//! three mutually exclusive sources, and the resampling parameters
//! (`critical`, `shuffle.method`, `pval.pool`) are only meaningful when at
//! least two permutations were requested and must disappear entirely
//! otherwise.

use crate::command::{RCommand, RParameter};
use crate::error::RanovaError;
use crate::r_expression::{bool_literal, matrix_literal, string_literal, vector_literal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    Ftest,
    Ttest,
}

impl TestType {
    pub fn wire_code(self) -> &'static str {
        match self {
            Self::Ftest => "ftest",
            Self::Ttest => "ttest",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ftest => "F test",
            Self::Ttest => "T test",
        }
    }

    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "ftest" => Some(Self::Ftest),
            "ttest" => Some(Self::Ttest),
            _ => None,
        }
    }
}

/// How residuals are shuffled during permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShuffleMethod {
    Sample,
    Resid,
}

impl ShuffleMethod {
    pub fn wire_code(self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Resid => "resid",
        }
    }
}

/// Mixed model equation solver used inside the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MmeMethod {
    Reml,
    Noest,
    Ml,
}

impl MmeMethod {
    pub fn wire_code(self) -> &'static str {
        match self {
            Self::Reml => "REML",
            Self::Noest => "noest",
            Self::Ml => "ML",
        }
    }
}

/// Which F statistics to compute, rendered as the engine's fixed
/// two-element indicator vector `c(F1, Fs)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FStatScope {
    Standard,
    Fs,
    Both,
}

impl FStatScope {
    pub fn indicator_literal(self) -> &'static str {
        match self {
            Self::Standard => "c(1, 0)",
            Self::Fs => "c(0, 1)",
            Self::Both => "c(1, 1)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestCommandBuilder {
    data: Option<String>,
    fit: Option<String>,
    terms: Vec<String>,
    levels: Vec<String>,
    test_type: Option<TestType>,
    f_contrast: Option<Vec<Vec<f64>>>,
    t_contrast: Option<Vec<Vec<f64>>>,
    mme_method: Option<MmeMethod>,
    f_stat_scope: Option<FStatScope>,
    permutation_count: usize,
    critical: f64,
    shuffle_method: Option<ShuffleMethod>,
    pool_p_values: bool,
    verbose: bool,
    assignee: Option<String>,
}

impl Default for TestCommandBuilder {
    fn default() -> Self {
        Self {
            data: None,
            fit: None,
            terms: vec![],
            levels: vec![],
            test_type: None,
            f_contrast: None,
            t_contrast: None,
            mme_method: None,
            f_stat_scope: None,
            permutation_count: 0,
            critical: 0.9,
            shuffle_method: None,
            pool_p_values: true,
            verbose: false,
            assignee: None,
        }
    }
}

impl TestCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_data(&mut self, accessor: impl Into<String>) -> &mut Self {
        self.data = Some(accessor.into());
        self
    }

    pub fn set_fit(&mut self, accessor: impl Into<String>) -> &mut Self {
        self.fit = Some(accessor.into());
        self
    }

    pub fn set_terms(&mut self, terms: Vec<String>) -> &mut Self {
        self.terms = terms;
        self
    }

    /// Factor levels under test; for a T test without an explicit contrast
    /// matrix these size the generated all-pairs contrast.
    pub fn set_levels(&mut self, levels: Vec<String>) -> &mut Self {
        self.levels = levels;
        self
    }

    pub fn set_test_type(&mut self, test_type: TestType) -> &mut Self {
        self.test_type = Some(test_type);
        self
    }

    /// Contrast matrix for the F test. The F and T matrices are kept
    /// independently; the one matching the active test type is rendered.
    pub fn set_f_contrast(&mut self, matrix: Option<Vec<Vec<f64>>>) -> &mut Self {
        self.f_contrast = matrix;
        self
    }

    pub fn set_t_contrast(&mut self, matrix: Option<Vec<Vec<f64>>>) -> &mut Self {
        self.t_contrast = matrix;
        self
    }

    pub fn set_mme_method(&mut self, method: MmeMethod) -> &mut Self {
        self.mme_method = Some(method);
        self
    }

    pub fn set_f_stat_scope(&mut self, scope: FStatScope) -> &mut Self {
        self.f_stat_scope = Some(scope);
        self
    }

    pub fn set_permutation_count(&mut self, count: usize) -> &mut Self {
        self.permutation_count = count;
        self
    }

    /// Critical quantile for permutation early stopping, in `0..=1`.
    pub fn set_critical(&mut self, critical: f64) -> &mut Self {
        self.critical = critical;
        self
    }

    pub fn set_shuffle_method(&mut self, method: ShuffleMethod) -> &mut Self {
        self.shuffle_method = Some(method);
        self
    }

    pub fn set_pool_p_values(&mut self, pool: bool) -> &mut Self {
        self.pool_p_values = pool;
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    pub fn set_assignee(&mut self, identifier: impl Into<String>) -> &mut Self {
        self.assignee = Some(identifier.into());
        self
    }

    fn contrast_literal(&self) -> Result<Option<String>, RanovaError> {
        let explicit = match self.test_type {
            Some(TestType::Ttest) => self.t_contrast.as_ref(),
            _ => self.f_contrast.as_ref(),
        };
        if let Some(matrix) = explicit {
            return matrix_literal(matrix).map(Some);
        }
        if self.test_type == Some(TestType::Ttest) && !self.levels.is_empty() {
            // All-pairs comparison sized to the number of tested levels.
            return Ok(Some(format!("PairContrast({})", self.levels.len())));
        }
        Ok(None)
    }

    pub fn command(&self) -> Result<RCommand, RanovaError> {
        // Resampling settings are meaningless below two permutations.
        let resampling = self.permutation_count >= 2;

        let mut parameters = Vec::new();
        if let Some(data) = &self.data {
            parameters.push(RParameter::named("data", data.clone()));
        }
        if let Some(fit) = &self.fit {
            parameters.push(RParameter::named("anovaobj", fit.clone()));
        }
        match self.terms.as_slice() {
            [] => {}
            [single] => parameters.push(RParameter::named("term", string_literal(single))),
            many => {
                let quoted = many.iter().map(|t| string_literal(t)).collect::<Vec<_>>();
                parameters.push(RParameter::named("term", vector_literal(&quoted)));
            }
        }
        if let Some(test_type) = self.test_type {
            parameters.push(RParameter::named(
                "test.type",
                string_literal(test_type.wire_code()),
            ));
        }
        if let Some(contrast) = self.contrast_literal()? {
            parameters.push(RParameter::named("Contrast", contrast));
        }
        if let Some(method) = self.mme_method {
            parameters.push(RParameter::named(
                "MME.method",
                string_literal(method.wire_code()),
            ));
        }
        if let Some(scope) = self.f_stat_scope {
            parameters.push(RParameter::named("test.method", scope.indicator_literal()));
        }
        parameters.push(RParameter::named(
            "n.perm",
            self.permutation_count.to_string(),
        ));
        if resampling {
            parameters.push(RParameter::named("critical", format!("{:.3}", self.critical)));
            if let Some(shuffle) = self.shuffle_method {
                parameters.push(RParameter::named(
                    "shuffle.method",
                    string_literal(shuffle.wire_code()),
                ));
            }
            parameters.push(RParameter::named(
                "pval.pool",
                bool_literal(self.pool_p_values),
            ));
        }
        parameters.push(RParameter::named("verbose", bool_literal(self.verbose)));

        let call = RCommand::call("matest", parameters);
        Ok(match &self.assignee {
            Some(target) => RCommand::assignment(target.clone(), call.text()),
            None => call,
        })
    }

    pub fn command_text(&self) -> Result<String, RanovaError> {
        Ok(self.command()?.text())
    }
}
