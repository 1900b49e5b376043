//! Engine session abstraction and the live Rscript-backed session.
//!
//! The bridge talks to R through a single synchronous operation: evaluate
//! one line of R source, get back a structured value or the engine's error
//! message. Everything else (object discovery, class checks, name listings)
//! is built on top of that operation.
//!
//! The live engine keeps one `Rscript` child process running a small bridge
//! REPL: requests are two plain text lines (a transfer mode and the R code),
//! responses are one JSON line. The session is not reentrant-safe, so all
//! round trips are serialized behind one lock.

use crate::error::RanovaError;
use crate::r_expression::string_literal;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// A value transferred back from the engine.
///
/// Numeric payloads use `f64::NAN` for the engine's NA/NaN/non-finite
/// sentinels; the JSON wire format carries those as `null`. Matrices arrive
/// column-major, matching the engine's storage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RValue {
    Null,
    Logicals {
        values: Vec<bool>,
    },
    Integers {
        values: Vec<i64>,
    },
    Doubles {
        #[serde(with = "nullable_doubles")]
        values: Vec<f64>,
    },
    Strings {
        values: Vec<String>,
    },
    Matrix {
        #[serde(with = "nullable_doubles")]
        values: Vec<f64>,
        nrow: usize,
        ncol: usize,
    },
    List {
        names: Vec<String>,
        values: Vec<RValue>,
    },
}

mod nullable_doubles {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| if v.is_finite() { Some(*v) } else { None })
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

impl RValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RValue::Null)
    }

    /// Flat numeric view. Logical and integer vectors coerce; matrices
    /// flatten in storage order.
    pub fn as_doubles(&self) -> Option<Vec<f64>> {
        match self {
            RValue::Doubles { values } => Some(values.clone()),
            RValue::Integers { values } => Some(values.iter().map(|v| *v as f64).collect()),
            RValue::Logicals { values } => {
                Some(values.iter().map(|v| if *v { 1.0 } else { 0.0 }).collect())
            }
            RValue::Matrix { values, .. } => Some(values.clone()),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<Vec<String>> {
        match self {
            RValue::Strings { values } => Some(values.clone()),
            _ => None,
        }
    }

    pub fn as_scalar_f64(&self) -> Option<f64> {
        self.as_doubles().filter(|v| v.len() == 1).map(|v| v[0])
    }

    pub fn as_scalar_bool(&self) -> Option<bool> {
        match self {
            RValue::Logicals { values } if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }

    pub fn as_scalar_usize(&self) -> Option<usize> {
        let value = self.as_scalar_f64()?;
        if value.is_finite() && value >= 0.0 {
            Some(value as usize)
        } else {
            None
        }
    }

    /// One column of a matrix value, zero-based.
    pub fn matrix_column(&self, col: usize) -> Option<Vec<f64>> {
        match self {
            RValue::Matrix { values, nrow, ncol } if col < *ncol => {
                Some(values[col * nrow..(col + 1) * nrow].to_vec())
            }
            _ => None,
        }
    }
}

/// A live engine session. Implementations must serialize evaluation
/// internally; callers may share one session across threads.
pub trait REngine: Send + Sync {
    /// Evaluate one line of R source and transfer the result.
    fn eval(&self, command: &str) -> Result<RValue, RanovaError>;

    /// Evaluate for side effect only; the engine-side result is discarded
    /// without being transferred (fits and tests can be very large).
    fn eval_void(&self, command: &str) -> Result<(), RanovaError>;

    fn exists(&self, name: &str) -> Result<bool, RanovaError> {
        let value = self.eval(&format!("exists({})", string_literal(name)))?;
        value
            .as_scalar_bool()
            .ok_or_else(|| RanovaError::Evaluation(format!("exists({name}) returned no logical")))
    }

    /// Names of all top-level objects whose run-time class includes `class`.
    /// This enumeration is the only discovery mechanism; the engine never
    /// pushes notifications.
    fn objects_with_class(&self, class: &str) -> Result<Vec<String>, RanovaError> {
        let command = format!(
            "Filter(function(n) inherits(get(n, envir = .GlobalEnv), {}), ls(envir = .GlobalEnv))",
            string_literal(class)
        );
        let value = self.eval(&command)?;
        if value.is_null() {
            return Ok(vec![]);
        }
        value.as_strings().ok_or_else(|| {
            RanovaError::Evaluation(format!("object listing for class '{class}' was not character"))
        })
    }

    /// Component names of a composite value; empty when unnamed or null.
    fn component_names(&self, accessor: &str) -> Result<Vec<String>, RanovaError> {
        let value = self.eval(&format!("names({accessor})"))?;
        if value.is_null() {
            return Ok(vec![]);
        }
        value.as_strings().ok_or_else(|| {
            RanovaError::Evaluation(format!("names({accessor}) was not a character vector"))
        })
    }

    fn is_null(&self, accessor: &str) -> Result<bool, RanovaError> {
        let value = self.eval(&format!("is.null({accessor})"))?;
        value
            .as_scalar_bool()
            .ok_or_else(|| RanovaError::Evaluation(format!("is.null({accessor}) was not logical")))
    }

    fn inherits(&self, accessor: &str, class: &str) -> Result<bool, RanovaError> {
        let value = self.eval(&format!("inherits({accessor}, {})", string_literal(class)))?;
        value.as_scalar_bool().ok_or_else(|| {
            RanovaError::Evaluation(format!("inherits({accessor}, {class}) was not logical"))
        })
    }
}

/// Session configuration for the live engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interpreter binary; looked up on PATH when not an absolute path.
    pub program: String,
    /// Packages loaded with `library(...)` at session start.
    pub packages: Vec<String>,
    pub working_dir: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "Rscript".to_string(),
            packages: vec!["maanova".to_string()],
            working_dir: None,
        }
    }
}

/// The R half of the bridge. Reads two request lines (mode, code) per round
/// trip, evaluates in the global environment, and answers with one JSON
/// line. Non-finite numbers are encoded as JSON null; logical and integer
/// vectors containing NA are promoted to doubles first so the absent cells
/// also arrive as null instead of a fabricated value.
const BRIDGE_SCRIPT: &str = r#"
con <- file("stdin", open = "r")
emit <- function(text) { cat(text, "\n", sep = ""); flush(stdout()) }
esc <- function(s) {
  s <- gsub("\\", "\\\\", s, fixed = TRUE)
  s <- gsub("\"", "\\\"", s, fixed = TRUE)
  s <- gsub("\n", "\\n", s, fixed = TRUE)
  s <- gsub("\r", "\\r", s, fixed = TRUE)
  gsub("\t", "\\t", s, fixed = TRUE)
}
num_json <- function(v) {
  sapply(as.numeric(v), function(x) {
    if (is.na(x) || !is.finite(x)) "null" else sprintf("%.17g", x)
  })
}
str_json <- function(v) sapply(as.character(v), function(x) sprintf("\"%s\"", esc(x)))
encode <- function(v) {
  if (is.null(v)) return("{\"type\":\"null\"}")
  if (is.matrix(v)) {
    return(sprintf("{\"type\":\"matrix\",\"values\":[%s],\"nrow\":%d,\"ncol\":%d}",
      paste(num_json(v), collapse = ","), nrow(v), ncol(v)))
  }
  if (is.factor(v)) return(encode(as.character(v)))
  if (is.logical(v)) {
    if (anyNA(v)) return(encode(as.numeric(v)))
    vals <- sapply(v, function(x) if (x) "true" else "false")
    return(sprintf("{\"type\":\"logicals\",\"values\":[%s]}", paste(vals, collapse = ",")))
  }
  if (is.integer(v)) {
    if (anyNA(v)) return(encode(as.numeric(v)))
    return(sprintf("{\"type\":\"integers\",\"values\":[%s]}",
      paste(sapply(v, function(x) sprintf("%d", x)), collapse = ",")))
  }
  if (is.numeric(v)) {
    return(sprintf("{\"type\":\"doubles\",\"values\":[%s]}", paste(num_json(v), collapse = ",")))
  }
  if (is.character(v)) {
    return(sprintf("{\"type\":\"strings\",\"values\":[%s]}", paste(str_json(v), collapse = ",")))
  }
  if (is.list(v)) {
    nm <- names(v)
    if (is.null(nm)) nm <- rep("", length(v))
    inner <- sapply(v, encode)
    return(sprintf("{\"type\":\"list\",\"names\":[%s],\"values\":[%s]}",
      paste(str_json(nm), collapse = ","), paste(inner, collapse = ",")))
  }
  encode(as.character(v))
}
repeat {
  mode <- readLines(con, n = 1)
  if (length(mode) == 0) break
  code <- readLines(con, n = 1)
  if (length(code) == 0) break
  outcome <- tryCatch(
    list(ok = eval(parse(text = code), envir = .GlobalEnv)),
    error = function(e) list(err = conditionMessage(e))
  )
  if (!is.null(outcome$err)) {
    emit(sprintf("{\"error\":\"%s\"}", esc(outcome$err)))
  } else if (identical(mode, "VOID")) {
    emit("{\"ok\":{\"type\":\"null\"}}")
  } else {
    emit(sprintf("{\"ok\":%s}", encode(outcome$ok)))
  }
}
"#;

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    ok: Option<RValue>,
    error: Option<String>,
}

struct BridgeChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Live engine session over a persistent `Rscript` child process.
pub struct RscriptEngine {
    channel: Mutex<BridgeChannel>,
    // Keeps the bridge script on disk for the lifetime of the child.
    _script: NamedTempFile,
}

impl RscriptEngine {
    pub fn start(config: &EngineConfig) -> Result<Self, RanovaError> {
        let mut script = NamedTempFile::new()?;
        script.write_all(BRIDGE_SCRIPT.as_bytes())?;
        script.flush()?;

        let mut command = Command::new(&config.program);
        command
            .arg("--vanilla")
            .arg(script.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        let mut child = command.spawn().map_err(|e| {
            RanovaError::Transport(format!("could not spawn '{}': {e}", config.program))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RanovaError::Transport("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| RanovaError::Transport("engine stdout unavailable".to_string()))?;

        let engine = Self {
            channel: Mutex::new(BridgeChannel {
                child,
                stdin,
                stdout,
            }),
            _script: script,
        };
        engine.ping()?;
        for package in &config.packages {
            engine.eval_void(&format!("library({package})"))?;
        }
        Ok(engine)
    }

    /// Cheap liveness round trip, used before enabling analysis commands.
    pub fn ping(&self) -> Result<(), RanovaError> {
        let value = self.eval("1 + 1")?;
        match value.as_scalar_f64() {
            Some(v) if v == 2.0 => Ok(()),
            other => Err(RanovaError::Transport(format!(
                "engine ping returned {other:?}"
            ))),
        }
    }

    fn round_trip(&self, mode: &str, code: &str) -> Result<RValue, RanovaError> {
        // Commands are single-line by construction; fold any stray newline
        // so the line protocol cannot desynchronize.
        let line = code.replace(['\n', '\r'], " ");
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| RanovaError::Transport("engine channel poisoned".to_string()))?;
        writeln!(channel.stdin, "{mode}")?;
        writeln!(channel.stdin, "{line}")?;
        channel.stdin.flush()?;

        let mut response_line = String::new();
        let read = channel.stdout.read_line(&mut response_line)?;
        if read == 0 {
            let status = channel.child.try_wait().ok().flatten();
            return Err(RanovaError::Transport(format!(
                "engine process ended unexpectedly (exit: {status:?})"
            )));
        }
        let response: BridgeResponse = serde_json::from_str(response_line.trim())?;
        if let Some(message) = response.error {
            return Err(RanovaError::Evaluation(message));
        }
        response
            .ok
            .ok_or_else(|| RanovaError::Transport("engine response had no payload".to_string()))
    }
}

impl REngine for RscriptEngine {
    fn eval(&self, command: &str) -> Result<RValue, RanovaError> {
        self.round_trip("EVAL", command)
    }

    fn eval_void(&self, command: &str) -> Result<(), RanovaError> {
        self.round_trip("VOID", command).map(|_| ())
    }
}

impl Drop for RscriptEngine {
    fn drop(&mut self) {
        if let Ok(mut channel) = self.channel.lock() {
            let _ = channel.child.kill();
            let _ = channel.child.wait();
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{REngine, RValue};
    use crate::error::RanovaError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory fake evaluator: scripted command text to value, plus a log
    /// of every command received, for asserting exact wire text.
    #[derive(Default)]
    pub struct MockEngine {
        responses: Mutex<HashMap<String, RValue>>,
        log: Mutex<Vec<String>>,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn stub(&self, command: &str, value: RValue) {
            self.responses
                .lock()
                .unwrap()
                .insert(command.to_string(), value);
        }

        pub fn commands(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl REngine for MockEngine {
        fn eval(&self, command: &str) -> Result<RValue, RanovaError> {
            self.log.lock().unwrap().push(command.to_string());
            self.responses
                .lock()
                .unwrap()
                .get(command)
                .cloned()
                .ok_or_else(|| RanovaError::Evaluation(format!("unscripted command: {command}")))
        }

        fn eval_void(&self, command: &str) -> Result<(), RanovaError> {
            self.log.lock().unwrap().push(command.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_value_round_trips_through_json() {
        let value = RValue::Doubles {
            values: vec![1.5, 2.0],
        };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"type":"doubles","values":[1.5,2.0]}"#);
        let back: RValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn wire_null_becomes_nan_in_numeric_payloads() {
        let parsed: RValue =
            serde_json::from_str(r#"{"type":"doubles","values":[0.5,null,2.0]}"#).unwrap();
        let doubles = parsed.as_doubles().unwrap();
        assert_eq!(doubles.len(), 3);
        assert!(doubles[1].is_nan());
        assert_eq!(doubles[2], 2.0);
    }

    #[test]
    fn matrix_column_is_storage_order_slice() {
        // Column-major 2x3: columns are [1,2], [3,4], [5,6].
        let value = RValue::Matrix {
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            nrow: 2,
            ncol: 3,
        };
        assert_eq!(value.matrix_column(0), Some(vec![1.0, 2.0]));
        assert_eq!(value.matrix_column(2), Some(vec![5.0, 6.0]));
        assert_eq!(value.matrix_column(3), None);
    }

    #[test]
    fn bridge_promotes_na_bearing_vectors_to_doubles() {
        // NA has no faithful bool/i64 representation, so the script must
        // route such vectors through the numeric encoder (NA -> null) for
        // both branches.
        let logical_branch = BRIDGE_SCRIPT
            .split("is.logical(v)")
            .nth(1)
            .expect("logical branch");
        assert!(logical_branch.starts_with(") {\n    if (anyNA(v)) return(encode(as.numeric(v)))"));
        let integer_branch = BRIDGE_SCRIPT
            .split("is.integer(v)")
            .nth(1)
            .expect("integer branch");
        assert!(integer_branch.starts_with(") {\n    if (anyNA(v)) return(encode(as.numeric(v)))"));
    }

    #[test]
    fn integers_and_logicals_coerce_to_doubles() {
        let ints = RValue::Integers { values: vec![3, 4] };
        assert_eq!(ints.as_doubles(), Some(vec![3.0, 4.0]));
        let flags = RValue::Logicals {
            values: vec![true, false],
        };
        assert_eq!(flags.as_doubles(), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn provided_queries_render_expected_commands() {
        let engine = mock::MockEngine::new();
        engine.stub(
            "inherits(fit1, \"maanova\")",
            RValue::Logicals { values: vec![true] },
        );
        engine.stub("is.null(fit1$Fs)", RValue::Logicals { values: vec![false] });
        engine.stub("names(fit1)", RValue::Null);
        assert!(engine.inherits("fit1", "maanova").unwrap());
        assert!(!engine.is_null("fit1$Fs").unwrap());
        assert!(engine.component_names("fit1").unwrap().is_empty());
    }

    #[test]
    fn class_listing_uses_global_environment_filter() {
        let engine = mock::MockEngine::new();
        engine.stub(
            "Filter(function(n) inherits(get(n, envir = .GlobalEnv), \"maanova\"), ls(envir = .GlobalEnv))",
            RValue::Strings {
                values: vec!["fit1".to_string(), "fit2".to_string()],
            },
        );
        assert_eq!(
            engine.objects_with_class("maanova").unwrap(),
            vec!["fit1".to_string(), "fit2".to_string()]
        );
    }
}
