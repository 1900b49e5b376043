//! Model formula terms.
//!
//! A predictor is an ordered, non-empty sequence of factor names. A single
//! name is a main effect; several names form an interaction, rendered with
//! `:` between factors. A list of predictors renders as the additive model
//! formula the fit and test commands expect (`~Strain + Sex + Strain:Sex`).

use crate::error::RanovaError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predictor {
    terms: Vec<String>,
}

impl Predictor {
    pub fn new(terms: Vec<String>) -> Result<Self, RanovaError> {
        if terms.is_empty() || terms.iter().any(|t| t.trim().is_empty()) {
            return Err(RanovaError::Syntax(
                "A predictor needs at least one non-empty factor name".to_string(),
            ));
        }
        Ok(Self { terms })
    }

    pub fn main_effect(term: impl Into<String>) -> Result<Self, RanovaError> {
        Self::new(vec![term.into()])
    }

    /// Parse the `:`-joined string form back into a predictor.
    pub fn parse(text: &str) -> Result<Self, RanovaError> {
        let terms = text
            .split(':')
            .map(|t| t.trim().to_string())
            .collect::<Vec<_>>();
        Self::new(terms)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_single_term(&self) -> bool {
        self.terms.len() == 1
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.terms.iter().join(":"))
    }
}

/// Additive model formula over a predictor list: `~A + B + A:B`.
/// `None` for an empty list, since the engine rejects an empty formula.
pub fn formula_text(predictors: &[Predictor]) -> Option<String> {
    if predictors.is_empty() {
        return None;
    }
    Some(format!("~{}", predictors.iter().join(" + ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_renders_with_colons_and_round_trips() {
        let predictor = Predictor::new(vec!["Strain".to_string(), "Sex".to_string()]).unwrap();
        assert_eq!(predictor.to_string(), "Strain:Sex");
        assert!(!predictor.is_single_term());
        let back = Predictor::parse(&predictor.to_string()).unwrap();
        assert_eq!(back, predictor);
    }

    #[test]
    fn main_effect_round_trips() {
        let predictor = Predictor::main_effect("Dye").unwrap();
        assert!(predictor.is_single_term());
        assert_eq!(Predictor::parse("Dye").unwrap(), predictor);
    }

    #[test]
    fn empty_term_sequences_are_rejected() {
        assert!(Predictor::new(vec![]).is_err());
        assert!(Predictor::new(vec!["".to_string()]).is_err());
        assert!(Predictor::parse("A::B").is_err());
    }

    #[test]
    fn formula_joins_predictors_additively() {
        let a = Predictor::main_effect("Strain").unwrap();
        let b = Predictor::main_effect("Sex").unwrap();
        let ab = Predictor::parse("Strain:Sex").unwrap();
        assert_eq!(
            formula_text(&[a, b, ab]).unwrap(),
            "~Strain + Sex + Strain:Sex"
        );
        assert_eq!(formula_text(&[]), None);
    }

    #[test]
    fn term_order_is_significant_for_equality() {
        let ab = Predictor::parse("A:B").unwrap();
        let ba = Predictor::parse("B:A").unwrap();
        assert_ne!(ab, ba);
    }
}
