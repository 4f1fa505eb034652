use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ReportError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

/// Replaces every `{name}` in `template` with `lookup(name)`.
///
/// Fails with [`ReportError::Config`] on the first name `lookup` does not know.
pub fn fill_placeholders<F>(template: &str, lookup: F) -> Result<String, ReportError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = None;
    let filled = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| name.to_owned());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ReportError::Config(format!(
            "Unknown placeholder {{{name}}} in \"{template}\""
        ))),
        None => Ok(filled.into_owned()),
    }
}

pub fn power_of_ten(exponent: i32) -> f64 {
    10f64.powi(exponent)
}

/// Formats an axis value without scientific notation
pub fn format_plain(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_owned();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}

pub fn exponent_suffix(exponent: i32) -> String {
    if exponent == 0 {
        String::new()
    } else {
        format!(" (10^{exponent})")
    }
}
