//! Template variable interpolation
//!
//! The substitution engine is a collaborator: the dispatcher only hands it
//! an expression, the scoped variables and a formatting callback.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

use super::expr::{regular_escape, special_regex_escape};

/// Value of a template variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

/// A template variable as seen by the interpolator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub value: VariableValue,
    pub multi: bool,
    pub include_all: bool,
}

impl Variable {
    pub fn single(value: impl Into<String>) -> Self {
        Self {
            value: VariableValue::Single(value.into()),
            multi: false,
            include_all: false,
        }
    }

    pub fn multi(values: Vec<String>) -> Self {
        Self {
            value: VariableValue::Multi(values),
            multi: true,
            include_all: false,
        }
    }
}

/// Variables scoped to a single dispatch call
pub type ScopedVars = HashMap<String, Variable>;

/// Template substitution collaborator
pub trait TemplateEngine: Send + Sync {
    fn replace(
        &self,
        expression: &str,
        scoped_vars: &ScopedVars,
        format: &dyn Fn(&Variable) -> String,
    ) -> String;
}

/// Formatter used for query expressions.
///
/// Single-value variables only get quotes escaped. Multi-value and
/// include-all variables are regex-escaped and joined with `|`.
pub fn interpolate_query_expr(variable: &Variable) -> String {
    if !variable.multi && !variable.include_all {
        return match &variable.value {
            VariableValue::Single(value) => regular_escape(value),
            VariableValue::Multi(values) => values
                .iter()
                .map(|v| regular_escape(v))
                .collect::<Vec<_>>()
                .join(","),
        };
    }

    match &variable.value {
        VariableValue::Single(value) => special_regex_escape(value),
        VariableValue::Multi(values) => values
            .iter()
            .map(|v| special_regex_escape(v))
            .collect::<Vec<_>>()
            .join("|"),
    }
}

/// Engine that leaves expressions untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTemplates;

impl TemplateEngine for NoopTemplates {
    fn replace(&self, expression: &str, _: &ScopedVars, _: &dyn Fn(&Variable) -> String) -> String {
        expression.to_string()
    }
}

/// `$name` / `${name}` substitution from global and scoped variables.
/// Scoped variables win; unknown variables are left as written.
#[derive(Debug, Clone, Default)]
pub struct VariableTemplates {
    globals: ScopedVars,
}

impl VariableTemplates {
    pub fn new(globals: ScopedVars) -> Self {
        Self { globals }
    }

    pub fn set(&mut self, name: impl Into<String>, variable: Variable) {
        self.globals.insert(name.into(), variable);
    }
}

fn variable_regex() -> &'static Regex {
    static VARIABLE: OnceLock<Regex> = OnceLock::new();
    VARIABLE.get_or_init(|| {
        Regex::new(r"\$\{(\w+)\}|\$(\w+)").expect("valid variable regex")
    })
}

impl TemplateEngine for VariableTemplates {
    fn replace(
        &self,
        expression: &str,
        scoped_vars: &ScopedVars,
        format: &dyn Fn(&Variable) -> String,
    ) -> String {
        variable_regex()
            .replace_all(expression, |caps: &Captures| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();

                scoped_vars
                    .get(name)
                    .or_else(|| self.globals.get(name))
                    .map(format)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_not_regex_escaped() {
        assert_eq!(interpolate_query_expr(&Variable::single("a.b")), "a.b");
    }

    #[test]
    fn test_multi_value_regex_escaped_and_joined() {
        let var = Variable::multi(vec!["a.b".to_string(), "c".to_string()]);
        assert_eq!(interpolate_query_expr(&var), "a\\\\.b|c");
    }

    #[test]
    fn test_variable_templates_substitute() {
        let mut engine = VariableTemplates::default();
        engine.set("job", Variable::single("api"));

        let mut scoped = ScopedVars::new();
        scoped.insert("level".to_string(), Variable::single("error"));

        let out = engine.replace(
            r#"{job="$job", level="${level}", host="$unknown"}"#,
            &scoped,
            &interpolate_query_expr,
        );
        assert_eq!(out, r#"{job="api", level="error", host="$unknown"}"#);
    }

    #[test]
    fn test_scoped_overrides_global() {
        let mut engine = VariableTemplates::default();
        engine.set("job", Variable::single("global"));

        let mut scoped = ScopedVars::new();
        scoped.insert("job".to_string(), Variable::single("scoped"));

        assert_eq!(engine.replace("$job", &scoped, &interpolate_query_expr), "scoped");
    }

    #[test]
    fn test_noop_templates() {
        let out = NoopTemplates.replace("$job", &ScopedVars::new(), &interpolate_query_expr);
        assert_eq!(out, "$job");
    }
}
