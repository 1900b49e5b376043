//! Shared shell grammar and executor for the interactive client.
//!
//! The shell is the scriptable surface over the bridge: it parses one line
//! into a command, drives the builders and registries, and answers with a
//! JSON value. Slow commands (fit, test) go through the analysis worker and
//! are followed by a registry refresh, so newly created engine objects are
//! discovered before the next prompt.

use crate::fit_builder::{FitCommandBuilder, FitMethod};
use crate::predictor::Predictor;
use crate::project::Project;
use crate::r_expression::identifier_problem;
use crate::table_export::export_statistics;
use crate::test_builder::{FStatScope, MmeMethod, ShuffleMethod, TestCommandBuilder, TestType};
use crate::test_result::TestStatistic;
use crate::worker::AnalysisWorker;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Help,
    Status,
    Eval {
        code: String,
    },
    Fit {
        data: String,
        formula: Vec<Predictor>,
        random: Vec<Predictor>,
        covariate: Vec<Predictor>,
        method: Option<FitMethod>,
        verbose: bool,
        subtract_column_means: bool,
        assignee: String,
    },
    Test {
        data: String,
        fit: String,
        terms: Vec<String>,
        levels: Vec<String>,
        test_type: Option<TestType>,
        mme_method: Option<MmeMethod>,
        f_stat_scope: Option<FStatScope>,
        permutation_count: usize,
        critical: Option<f64>,
        shuffle_method: Option<ShuffleMethod>,
        pool_p_values: bool,
        verbose: bool,
        assignee: String,
    },
    Refresh,
    List {
        collection: String,
    },
    Levels {
        fit: String,
        term: String,
    },
    Delete {
        accessor: String,
    },
    ExportStats {
        test: String,
        statistic: TestStatistic,
        contrast: usize,
        output: String,
        data: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ShellRunResult {
    pub state_changed: bool,
    pub output: Value,
}

pub fn shell_help_text() -> &'static str {
    "ranova shell commands:\n\
help\n\
status\n\
eval R_EXPRESSION\n\
fit DATA FORMULA --as NAME [--random TERMS] [--covariate TERMS] \
[--method REML|ML] [--verbose] [--subcol]\n\
test DATA FIT TERMS --as NAME [--type ftest|ttest] [--levels L1,L2,...] \
[--mme REML|noest|ML] [--stats standard|fs|both] [--nperm N] \
[--critical Q] [--shuffle sample|resid] [--no-pool] [--verbose]\n\
refresh\n\
list experiments|fits|tests\n\
levels FIT TERM\n\
delete NAME\n\
export-stats TEST F1|Fs CONTRAST OUTPUT.csv [DATA]\n\
FORMULA and TERMS are comma-separated; interactions use ':' (Strain:Sex).\n\
DATA names the source experiment for tests found in a running session.\n\
Anything after '#' is a comment."
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_predictors(input: &str) -> Result<Vec<Predictor>, String> {
    split_list(input)
        .iter()
        .map(|t| Predictor::parse(t).map_err(|e| e.to_string()))
        .collect()
}

fn parse_assignee(value: &str) -> Result<String, String> {
    match identifier_problem(value) {
        Some(problem) => Err(format!("Invalid result name: {problem}")),
        None => Ok(value.to_string()),
    }
}

fn token_error(command: &str) -> String {
    format!("Invalid '{command}' usage. Try: help")
}

fn flag_value<'a>(
    tokens: &'a [String],
    idx: &mut usize,
    flag: &str,
) -> Result<&'a str, String> {
    if *idx + 1 >= tokens.len() {
        return Err(format!("Missing value after {flag}"));
    }
    *idx += 2;
    Ok(&tokens[*idx - 1])
}

fn parse_fit_tokens(tokens: &[String]) -> Result<ShellCommand, String> {
    if tokens.len() < 3 {
        return Err(token_error("fit"));
    }
    let data = tokens[1].clone();
    let formula = parse_predictors(&tokens[2])?;
    if formula.is_empty() {
        return Err("fit requires at least one formula term".to_string());
    }
    let mut random = vec![];
    let mut covariate = vec![];
    let mut method = None;
    let mut verbose = false;
    let mut subtract_column_means = false;
    let mut assignee = None;
    let mut idx = 3;
    while idx < tokens.len() {
        match tokens[idx].as_str() {
            "--random" => random = parse_predictors(flag_value(tokens, &mut idx, "--random")?)?,
            "--covariate" => {
                covariate = parse_predictors(flag_value(tokens, &mut idx, "--covariate")?)?
            }
            "--method" => {
                let code = flag_value(tokens, &mut idx, "--method")?;
                method = Some(
                    FitMethod::from_wire(code)
                        .ok_or_else(|| format!("Unknown fit method '{code}'"))?,
                );
            }
            "--as" => assignee = Some(parse_assignee(flag_value(tokens, &mut idx, "--as")?)?),
            "--verbose" => {
                verbose = true;
                idx += 1;
            }
            "--subcol" => {
                subtract_column_means = true;
                idx += 1;
            }
            other => return Err(format!("Unknown argument '{other}' for fit")),
        }
    }
    let assignee = assignee.ok_or_else(|| "fit requires --as NAME".to_string())?;
    Ok(ShellCommand::Fit {
        data,
        formula,
        random,
        covariate,
        method,
        verbose,
        subtract_column_means,
        assignee,
    })
}

fn parse_test_tokens(tokens: &[String]) -> Result<ShellCommand, String> {
    if tokens.len() < 4 {
        return Err(token_error("test"));
    }
    let data = tokens[1].clone();
    let fit = tokens[2].clone();
    let terms = split_list(&tokens[3]);
    if terms.is_empty() {
        return Err("test requires at least one term".to_string());
    }
    let mut levels = vec![];
    let mut test_type = None;
    let mut mme_method = None;
    let mut f_stat_scope = None;
    let mut permutation_count = 0;
    let mut critical = None;
    let mut shuffle_method = None;
    let mut pool_p_values = true;
    let mut verbose = false;
    let mut assignee = None;
    let mut idx = 4;
    while idx < tokens.len() {
        match tokens[idx].as_str() {
            "--levels" => levels = split_list(flag_value(tokens, &mut idx, "--levels")?),
            "--type" => {
                let code = flag_value(tokens, &mut idx, "--type")?;
                test_type = Some(
                    TestType::from_wire(code)
                        .ok_or_else(|| format!("Unknown test type '{code}'"))?,
                );
            }
            "--mme" => {
                mme_method = Some(match flag_value(tokens, &mut idx, "--mme")? {
                    "REML" => MmeMethod::Reml,
                    "noest" => MmeMethod::Noest,
                    "ML" => MmeMethod::Ml,
                    other => return Err(format!("Unknown MME method '{other}'")),
                });
            }
            "--stats" => {
                f_stat_scope = Some(match flag_value(tokens, &mut idx, "--stats")? {
                    "standard" => FStatScope::Standard,
                    "fs" => FStatScope::Fs,
                    "both" => FStatScope::Both,
                    other => return Err(format!("Unknown statistic scope '{other}'")),
                });
            }
            "--nperm" => {
                let raw = flag_value(tokens, &mut idx, "--nperm")?;
                permutation_count = raw
                    .parse()
                    .map_err(|_| format!("Invalid permutation count '{raw}'"))?;
            }
            "--critical" => {
                let raw = flag_value(tokens, &mut idx, "--critical")?;
                let value: f64 = raw
                    .parse()
                    .map_err(|_| format!("Invalid critical value '{raw}'"))?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(format!("Critical value {value} is outside 0..1"));
                }
                critical = Some(value);
            }
            "--shuffle" => {
                shuffle_method = Some(match flag_value(tokens, &mut idx, "--shuffle")? {
                    "sample" => ShuffleMethod::Sample,
                    "resid" => ShuffleMethod::Resid,
                    other => return Err(format!("Unknown shuffle method '{other}'")),
                });
            }
            "--no-pool" => {
                pool_p_values = false;
                idx += 1;
            }
            "--verbose" => {
                verbose = true;
                idx += 1;
            }
            "--as" => assignee = Some(parse_assignee(flag_value(tokens, &mut idx, "--as")?)?),
            other => return Err(format!("Unknown argument '{other}' for test")),
        }
    }
    let assignee = assignee.ok_or_else(|| "test requires --as NAME".to_string())?;
    Ok(ShellCommand::Test {
        data,
        fit,
        terms,
        levels,
        test_type,
        mme_method,
        f_stat_scope,
        permutation_count,
        critical,
        shuffle_method,
        pool_p_values,
        verbose,
        assignee,
    })
}

pub fn parse_shell_tokens(tokens: &[String]) -> Result<ShellCommand, String> {
    if tokens.is_empty() {
        return Err("Missing shell command".to_string());
    }
    let cmd = tokens[0].as_str();
    match cmd {
        "help" | "-h" | "--help" => Ok(ShellCommand::Help),
        "status" => {
            if tokens.len() == 1 {
                Ok(ShellCommand::Status)
            } else {
                Err(token_error(cmd))
            }
        }
        "eval" => {
            let code = tokens[1..].join(" ");
            if code.trim().is_empty() {
                return Err("Missing R expression".to_string());
            }
            Ok(ShellCommand::Eval { code })
        }
        "fit" => parse_fit_tokens(tokens),
        "test" => parse_test_tokens(tokens),
        "refresh" => {
            if tokens.len() == 1 {
                Ok(ShellCommand::Refresh)
            } else {
                Err(token_error(cmd))
            }
        }
        "list" => {
            if tokens.len() != 2 {
                return Err(token_error(cmd));
            }
            let collection = tokens[1].clone();
            if !matches!(collection.as_str(), "experiments" | "fits" | "tests") {
                return Err(format!("Unknown collection '{collection}'"));
            }
            Ok(ShellCommand::List { collection })
        }
        "levels" => {
            if tokens.len() == 3 {
                Ok(ShellCommand::Levels {
                    fit: tokens[1].clone(),
                    term: tokens[2].clone(),
                })
            } else {
                Err(token_error(cmd))
            }
        }
        "delete" => {
            if tokens.len() == 2 {
                Ok(ShellCommand::Delete {
                    accessor: tokens[1].clone(),
                })
            } else {
                Err(token_error(cmd))
            }
        }
        "export-stats" => {
            if tokens.len() != 5 && tokens.len() != 6 {
                return Err(token_error(cmd));
            }
            let statistic = TestStatistic::from_component_name(&tokens[2])
                .ok_or_else(|| format!("Unknown statistic '{}', expected F1 or Fs", tokens[2]))?;
            let contrast: usize = tokens[3]
                .parse()
                .map_err(|_| format!("Invalid contrast index '{}'", tokens[3]))?;
            Ok(ShellCommand::ExportStats {
                test: tokens[1].clone(),
                statistic,
                contrast,
                output: tokens[4].clone(),
                data: tokens.get(5).cloned(),
            })
        }
        other => Err(format!("Unknown shell command '{other}'. Try: help")),
    }
}

pub fn parse_shell_line(line: &str) -> Result<ShellCommand, String> {
    let tokens = split_shell_words(line)?;
    parse_shell_tokens(&tokens)
}

pub fn split_shell_words(line: &str) -> Result<Vec<String>, String> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Normal,
        SingleQuoted,
        DoubleQuoted,
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut mode = Mode::Normal;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match mode {
            Mode::Normal => match ch {
                '\'' => mode = Mode::SingleQuoted,
                '"' => mode = Mode::DoubleQuoted,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                // A word-initial '#' starts a comment running to end of
                // line. Mid-word it stays literal (fit#1 is a name).
                '#' if current.is_empty() => break,
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        out.push(current.clone());
                        current.clear();
                    }
                }
                _ => current.push(ch),
            },
            Mode::SingleQuoted => {
                if ch == '\'' {
                    mode = Mode::Normal;
                } else {
                    current.push(ch);
                }
            }
            Mode::DoubleQuoted => {
                if ch == '"' {
                    mode = Mode::Normal;
                } else if ch == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else {
                    current.push(ch);
                }
            }
        }
    }

    if mode != Mode::Normal {
        return Err("Unterminated quoted string in shell command".to_string());
    }
    if !current.is_empty() {
        out.push(current);
    }
    if out.is_empty() {
        return Err("Empty shell command".to_string());
    }
    Ok(out)
}

/// One interactive session: the project registries plus the background
/// worker, over one shared engine.
pub struct ShellSession {
    project: Project,
    worker: AnalysisWorker,
}

impl ShellSession {
    pub fn new(project: Project) -> Self {
        let worker = AnalysisWorker::new(Arc::clone(project.engine()));
        Self { project, worker }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    fn run_analysis(&self, label: &str, command_text: String) -> Result<Value, String> {
        let outcome = self
            .worker
            .run_blocking(label, command_text.clone())
            .map_err(|e| e.to_string())?;
        // A failed command must not leave phantom entries behind; refresh
        // only after success.
        match outcome.result {
            Ok(()) => {
                let refresh = self.project.refresh_all().map_err(|e| e.to_string())?;
                Ok(json!({
                    "command": command_text,
                    "refresh": refresh,
                }))
            }
            Err(err) => Err(err.to_string()),
        }
    }

    pub fn execute(&self, command: &ShellCommand) -> Result<ShellRunResult, String> {
        let result = match command {
            ShellCommand::Help => ShellRunResult {
                state_changed: false,
                output: json!({ "help": shell_help_text() }),
            },
            ShellCommand::Status => {
                let alive = self.project.engine().eval("1 + 1").is_ok();
                ShellRunResult {
                    state_changed: false,
                    output: json!({
                        "engine_alive": alive,
                        "experiments": self.project.experiments().len(),
                        "fits": self.project.fits().len(),
                        "tests": self.project.tests().len(),
                    }),
                }
            }
            ShellCommand::Eval { code } => {
                let value = self
                    .project
                    .engine()
                    .eval(code)
                    .map_err(|e| e.to_string())?;
                ShellRunResult {
                    state_changed: false,
                    output: serde_json::to_value(&value)
                        .map_err(|e| format!("Could not serialize engine value: {e}"))?,
                }
            }
            ShellCommand::Fit {
                data,
                formula,
                random,
                covariate,
                method,
                verbose,
                subtract_column_means,
                assignee,
            } => {
                let mut builder = FitCommandBuilder::new();
                builder
                    .set_experiment(data.clone())
                    .set_formula(formula.clone())
                    .set_random_predictors(random.clone())
                    .set_covariate_predictors(covariate.clone())
                    .set_verbose(*verbose)
                    .set_subtract_column_means(*subtract_column_means)
                    .set_assignee(assignee.clone());
                if let Some(method) = method {
                    builder.set_method(*method);
                }
                let output = self.run_analysis("fit", builder.command_text())?;
                // The engine does not record the source experiment; teach
                // the freshly discovered handle here.
                if let Some(fit) = self.project.fits().get(assignee) {
                    fit.set_experiment(data.clone());
                }
                ShellRunResult {
                    state_changed: true,
                    output,
                }
            }
            ShellCommand::Test {
                data,
                fit,
                terms,
                levels,
                test_type,
                mme_method,
                f_stat_scope,
                permutation_count,
                critical,
                shuffle_method,
                pool_p_values,
                verbose,
                assignee,
            } => {
                let mut builder = TestCommandBuilder::new();
                builder
                    .set_data(data.clone())
                    .set_fit(fit.clone())
                    .set_terms(terms.clone())
                    .set_levels(levels.clone())
                    .set_permutation_count(*permutation_count)
                    .set_pool_p_values(*pool_p_values)
                    .set_verbose(*verbose)
                    .set_assignee(assignee.clone());
                if let Some(test_type) = test_type {
                    builder.set_test_type(*test_type);
                }
                if let Some(mme) = mme_method {
                    builder.set_mme_method(*mme);
                }
                if let Some(scope) = f_stat_scope {
                    builder.set_f_stat_scope(*scope);
                }
                if let Some(critical) = critical {
                    builder.set_critical(*critical);
                }
                if let Some(shuffle) = shuffle_method {
                    builder.set_shuffle_method(*shuffle);
                }
                let command_text = builder.command_text().map_err(|e| e.to_string())?;
                let output = self.run_analysis("test", command_text)?;
                if let Some(test_result) = self.project.tests().get(assignee) {
                    test_result.set_data(data.clone());
                }
                ShellRunResult {
                    state_changed: true,
                    output,
                }
            }
            ShellCommand::Refresh => {
                let refresh = self.project.refresh_all().map_err(|e| e.to_string())?;
                ShellRunResult {
                    state_changed: true,
                    output: json!({ "refresh": refresh }),
                }
            }
            ShellCommand::List { collection } => {
                let names = match collection.as_str() {
                    "experiments" => self.project.experiments().accessors(),
                    "fits" => self.project.fits().accessors(),
                    _ => self.project.tests().accessors(),
                };
                ShellRunResult {
                    state_changed: false,
                    output: json!({ "collection": collection, "names": names }),
                }
            }
            ShellCommand::Levels { fit, term } => {
                let fit_result = self
                    .project
                    .fits()
                    .get(fit)
                    .ok_or_else(|| format!("Unknown fit '{fit}'. Try: refresh"))?;
                ShellRunResult {
                    state_changed: false,
                    output: json!({
                        "term": term,
                        "levels": fit_result.term_levels(term),
                    }),
                }
            }
            ShellCommand::Delete { accessor } => {
                let deleted = if let Some(fit) = self.project.fits().get(accessor) {
                    fit.delete().map_err(|e| e.to_string())?;
                    true
                } else if let Some(test) = self.project.tests().get(accessor) {
                    test.delete().map_err(|e| e.to_string())?;
                    true
                } else if let Some(object) = self.project.experiments().get(accessor) {
                    object.delete().map_err(|e| e.to_string())?;
                    true
                } else {
                    false
                };
                if !deleted {
                    return Err(format!("Unknown object '{accessor}'. Try: refresh"));
                }
                let refresh = self.project.refresh_all().map_err(|e| e.to_string())?;
                ShellRunResult {
                    state_changed: true,
                    output: json!({
                        "deleted": accessor,
                        "refresh": refresh,
                    }),
                }
            }
            ShellCommand::ExportStats {
                test,
                statistic,
                contrast,
                output,
                data,
            } => {
                let test_result = self
                    .project
                    .tests()
                    .get(test)
                    .ok_or_else(|| format!("Unknown test '{test}'. Try: refresh"))?;
                if let Some(data) = data {
                    test_result.set_data(data.clone());
                }
                let report = export_statistics(
                    &test_result,
                    *statistic,
                    *contrast,
                    std::path::Path::new(output),
                )
                .map_err(|e| e.to_string())?;
                ShellRunResult {
                    state_changed: false,
                    output: json!({
                        "output": output,
                        "rows_written": report.rows_written,
                        "rows_skipped": report.rows_skipped,
                        "columns": report.columns,
                    }),
                }
            }
        };
        Ok(result)
    }
}
