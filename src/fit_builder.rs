//! Builder for the mixed-model ANOVA fit command (`fitmaanova`).
//!
//! The builder collects the user's model selections and renders exactly one
//! command. Parameter inclusion follows a fixed table: a parameter is
//! emitted only when its guard holds, absent parameters are omitted rather
//! than rendered empty, and the order is fixed as
//! `madata, formula, random, covariate, method, verbose, subCol`.

use crate::command::{RCommand, RParameter};
use crate::predictor::{formula_text, Predictor};
use crate::r_expression::{bool_literal, string_literal};
use serde::{Deserialize, Serialize};

/// Mixed model equation solution method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitMethod {
    Reml,
    Ml,
}

impl FitMethod {
    /// `{wire code, display label}` lookup.
    pub fn wire_code(self) -> &'static str {
        match self {
            Self::Reml => "REML",
            Self::Ml => "ML",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Reml => "Restricted maximum likelihood",
            Self::Ml => "Maximum likelihood",
        }
    }

    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "REML" => Some(Self::Reml),
            "ML" => Some(Self::Ml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FitCommandBuilder {
    experiment: Option<String>,
    formula: Vec<Predictor>,
    random: Vec<Predictor>,
    covariate: Vec<Predictor>,
    method: Option<FitMethod>,
    verbose: bool,
    subtract_column_means: bool,
    assignee: Option<String>,
}

impl FitCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accessor expression of the microarray experiment object.
    pub fn set_experiment(&mut self, accessor: impl Into<String>) -> &mut Self {
        self.experiment = Some(accessor.into());
        self
    }

    pub fn set_formula(&mut self, predictors: Vec<Predictor>) -> &mut Self {
        self.formula = predictors;
        self
    }

    /// Random-effect terms. Disjointness from covariates is a UI-level
    /// rule; the builder renders whatever it is given.
    pub fn set_random_predictors(&mut self, predictors: Vec<Predictor>) -> &mut Self {
        self.random = predictors;
        self
    }

    pub fn set_covariate_predictors(&mut self, predictors: Vec<Predictor>) -> &mut Self {
        self.covariate = predictors;
        self
    }

    pub fn set_method(&mut self, method: FitMethod) -> &mut Self {
        self.method = Some(method);
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    pub fn set_subtract_column_means(&mut self, subtract: bool) -> &mut Self {
        self.subtract_column_means = subtract;
        self
    }

    /// Identifier the fit result is assigned to. Without it the call is
    /// rendered bare and the result is discarded by the engine.
    pub fn set_assignee(&mut self, identifier: impl Into<String>) -> &mut Self {
        self.assignee = Some(identifier.into());
        self
    }

    pub fn command(&self) -> RCommand {
        let mut parameters = Vec::new();
        if let Some(experiment) = &self.experiment {
            parameters.push(RParameter::named("madata", experiment.clone()));
        }
        if let Some(formula) = formula_text(&self.formula) {
            parameters.push(RParameter::named("formula", formula));
        }
        if let Some(random) = formula_text(&self.random) {
            parameters.push(RParameter::named("random", random));
        }
        if let Some(covariate) = formula_text(&self.covariate) {
            parameters.push(RParameter::named("covariate", covariate));
        }
        if let Some(method) = self.method {
            parameters.push(RParameter::named(
                "method",
                string_literal(method.wire_code()),
            ));
        }
        parameters.push(RParameter::named("verbose", bool_literal(self.verbose)));
        parameters.push(RParameter::named(
            "subCol",
            bool_literal(self.subtract_column_means),
        ));

        let call = RCommand::call("fitmaanova", parameters);
        match &self.assignee {
            Some(target) => RCommand::assignment(target.clone(), call.text()),
            None => call,
        }
    }

    pub fn command_text(&self) -> String {
        self.command().text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictor(text: &str) -> Predictor {
        Predictor::parse(text).unwrap()
    }

    #[test]
    fn minimal_fit_orders_parameters_and_skips_empty_term_groups() {
        let mut builder = FitCommandBuilder::new();
        builder
            .set_experiment("mydata")
            .set_formula(vec![predictor("Strain"), predictor("Sex")])
            .set_method(FitMethod::Reml)
            .set_verbose(true)
            .set_subtract_column_means(false);
        assert_eq!(
            builder.command_text(),
            "fitmaanova(madata = mydata, formula = ~Strain + Sex, \
             method = \"REML\", verbose = TRUE, subCol = FALSE)"
        );
    }

    #[test]
    fn random_and_covariate_terms_render_as_formulas() {
        let mut builder = FitCommandBuilder::new();
        builder
            .set_experiment("mydata")
            .set_formula(vec![
                predictor("Strain"),
                predictor("Sex"),
                predictor("Strain:Sex"),
            ])
            .set_random_predictors(vec![predictor("Array")])
            .set_covariate_predictors(vec![predictor("Age")])
            .set_method(FitMethod::Ml)
            .set_assignee("fit1");
        assert_eq!(
            builder.command_text(),
            "fit1 <- fitmaanova(madata = mydata, \
             formula = ~Strain + Sex + Strain:Sex, random = ~Array, \
             covariate = ~Age, method = \"ML\", verbose = FALSE, subCol = FALSE)"
        );
    }

    #[test]
    fn unset_experiment_and_method_are_omitted() {
        let mut builder = FitCommandBuilder::new();
        builder.set_formula(vec![predictor("Dye")]);
        assert_eq!(
            builder.command_text(),
            "fitmaanova(formula = ~Dye, verbose = FALSE, subCol = FALSE)"
        );
    }

    #[test]
    fn method_wire_codes_round_trip() {
        for method in [FitMethod::Reml, FitMethod::Ml] {
            assert_eq!(FitMethod::from_wire(method.wire_code()), Some(method));
        }
        assert_eq!(FitMethod::from_wire("bogus"), None);
    }
}
