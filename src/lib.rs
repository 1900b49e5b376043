//! Client-side core for driving R/maanova microarray ANOVA analyses.
//!
//! The crate builds `fitmaanova`/`matest` calls from typed builders, runs
//! them through a persistent Rscript bridge, and reads the resulting engine
//! objects back through accessor-expression handles. No statistics are
//! computed here; R owns the numbers, this crate owns the conversation.

pub mod command;
pub mod error;
pub mod fit_builder;
pub mod fit_result;
pub mod predictor;
pub mod project;
pub mod r_engine;
pub mod r_expression;
pub mod r_object;
pub mod registry;
pub mod shell;
pub mod statistics_table;
pub mod table_export;
pub mod test_builder;
pub mod test_result;
pub mod worker;

pub fn version_cli_text() -> String {
    format!("ranova_cli {}", env!("CARGO_PKG_VERSION"))
}
