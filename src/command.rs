//! Textual command variants sent to the engine.
//!
//! A command renders to exactly one line of R source. Parameter values are
//! already engine-syntax text when they arrive here (see
//! [`crate::r_expression`]); rendering is pure and performs no I/O.

use itertools::Itertools;

/// One argument of a function call. Positional when `name` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RParameter {
    pub name: Option<String>,
    pub value: String,
}

impl RParameter {
    pub fn positional(value: impl Into<String>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    pub fn named(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    fn text(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} = {}", self.value),
            None => self.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RCommand {
    /// `function(p1, p2, name = v, ...)`
    Call {
        function: String,
        parameters: Vec<RParameter>,
    },
    /// `target <- value`
    Assignment { target: String, value: String },
    /// Verbatim R source, used for ad-hoc expressions typed by the user.
    Raw(String),
}

impl RCommand {
    pub fn call(function: impl Into<String>, parameters: Vec<RParameter>) -> Self {
        Self::Call {
            function: function.into(),
            parameters,
        }
    }

    pub fn assignment(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Assignment {
            target: target.into(),
            value: value.into(),
        }
    }

    /// Render the command. Positional parameters always precede named ones,
    /// each group keeping its supplied order.
    pub fn text(&self) -> String {
        match self {
            Self::Call {
                function,
                parameters,
            } => {
                let (positional, named): (Vec<_>, Vec<_>) =
                    parameters.iter().partition(|p| p.name.is_none());
                let rendered = positional
                    .iter()
                    .chain(named.iter())
                    .map(|p| p.text())
                    .join(", ");
                format!("{function}({rendered})")
            }
            Self::Assignment { target, value } => format!("{target} <- {value}"),
            Self::Raw(text) => text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_parameter_call_renders_empty_parens() {
        assert_eq!(RCommand::call("ls", vec![]).text(), "ls()");
    }

    #[test]
    fn positional_parameters_render_before_named() {
        let cmd = RCommand::call(
            "matest",
            vec![
                RParameter::named("n.perm", "100"),
                RParameter::positional("mydata"),
                RParameter::named("verbose", "TRUE"),
                RParameter::positional("myfit"),
            ],
        );
        assert_eq!(
            cmd.text(),
            "matest(mydata, myfit, n.perm = 100, verbose = TRUE)"
        );
    }

    #[test]
    fn assignment_renders_with_arrow() {
        let cmd = RCommand::assignment("fit1", "fitmaanova(mydata)");
        assert_eq!(cmd.text(), "fit1 <- fitmaanova(mydata)");
    }

    #[test]
    fn raw_passes_through_unchanged() {
        assert_eq!(RCommand::Raw("1 + 1".to_string()).text(), "1 + 1");
    }
}
