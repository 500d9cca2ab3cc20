use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ConfigError;

/// `{{ env.NAME }}` with an optional `| default("value")`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\)\s*)?\}\}"#).expect("placeholder regex")
});

/// Substitute environment placeholders in raw configuration text
///
/// Runs before TOML parsing so secrets such as API keys never have to be
/// written to disk. Comment lines are left untouched.
///
/// # Errors
///
/// Returns [`ConfigError::Expansion`] when a variable without a default is
/// unset, or when a placeholder is not scoped to `env.`
pub fn expand_env(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut failure = None;
        let expanded = PLACEHOLDER.replace_all(line, |caps: &Captures<'_>| match resolve(caps) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }

        output.push_str(&expanded);
    }

    Ok(output)
}

fn resolve(caps: &Captures<'_>) -> Result<String, ConfigError> {
    let key = &caps[1];
    let Some(name) = key.strip_prefix("env.").filter(|n| !n.is_empty() && !n.contains('.')) else {
        return Err(ConfigError::Expansion(format!(
            "placeholder `{key}` must be scoped as `env.NAME`"
        )));
    };

    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => caps
            .get(2)
            .map(|default| default.as_str().to_owned())
            .ok_or_else(|| ConfigError::Expansion(format!("environment variable `{name}` is not set"))),
    }
}
