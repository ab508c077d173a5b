//! Post-dispatch validation of step results

use serde::Deserialize;
use std::fmt;

use crate::tools::ExecutionResult;

/// Substrings in error output that mark a failed run
const FAILURE_MARKERS: &[&str] = &["syntax", "error"];

/// A named assertion over a step result
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ValidationRule {
    /// `exit_code_equals_0`
    ExitCodeZero,

    /// `no_syntax_errors`
    NoFailureMarkers,

    /// Any other name; ignored so documents stay forward compatible
    Unknown(String),
}

impl From<String> for ValidationRule {
    fn from(name: String) -> Self {
        match name.as_str() {
            "exit_code_equals_0" => ValidationRule::ExitCodeZero,
            "no_syntax_errors" => ValidationRule::NoFailureMarkers,
            _ => ValidationRule::Unknown(name),
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationRule::ExitCodeZero => write!(f, "exit_code_equals_0"),
            ValidationRule::NoFailureMarkers => write!(f, "no_syntax_errors"),
            ValidationRule::Unknown(name) => write!(f, "{}", name),
        }
    }
}

/// A violated validation rule
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Validation failed ({rule}): {detail}")]
pub struct ValidationFailed {
    pub rule: ValidationRule,
    pub detail: String,
}

/// Check `result` against every rule in order, stopping at the first violation
pub fn validate(result: &ExecutionResult, rules: &[ValidationRule]) -> Result<(), ValidationFailed> {
    for rule in rules {
        match rule {
            ValidationRule::ExitCodeZero => {
                if result.exit_code != Some(0) {
                    let detail = match result.exit_code {
                        Some(code) => format!("exit code was {}, expected 0", code),
                        None => "no exit code was reported, expected 0".to_string(),
                    };
                    return Err(ValidationFailed { rule: rule.clone(), detail });
                }
            }
            ValidationRule::NoFailureMarkers => {
                if let Some(error) = &result.error {
                    let lowered = error.to_lowercase();
                    if let Some(marker) = FAILURE_MARKERS.iter().find(|m| lowered.contains(*m)) {
                        return Err(ValidationFailed {
                            rule: rule.clone(),
                            detail: format!("error output mentions '{}'", marker),
                        });
                    }
                }
            }
            ValidationRule::Unknown(name) => {
                tracing::debug!(rule = %name, "ignoring unknown validation rule");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(exit_code: Option<i32>, error: Option<&str>) -> ExecutionResult {
        let mut result = ExecutionResult::success("ok");
        result.exit_code = exit_code;
        result.error = error.map(str::to_string);
        result
    }

    #[test]
    fn test_rule_names() {
        let rules: Vec<ValidationRule> =
            serde_yaml::from_str("[exit_code_equals_0, no_syntax_errors, lint_clean]").unwrap();
        assert_eq!(
            rules,
            vec![
                ValidationRule::ExitCodeZero,
                ValidationRule::NoFailureMarkers,
                ValidationRule::Unknown("lint_clean".to_string()),
            ]
        );
        assert_eq!(rules[0].to_string(), "exit_code_equals_0");
    }

    #[test]
    fn test_exit_code_rule() {
        let rules = [ValidationRule::ExitCodeZero];
        assert!(validate(&result_with(Some(0), None), &rules).is_ok());

        let err = validate(&result_with(Some(2), None), &rules).unwrap_err();
        assert_eq!(err.rule, ValidationRule::ExitCodeZero);
        assert!(err.detail.contains("exit code was 2"));

        assert!(validate(&result_with(None, None), &rules).is_err());
    }

    #[test]
    fn test_failure_marker_rule() {
        let rules = [ValidationRule::NoFailureMarkers];
        assert!(validate(&result_with(Some(0), None), &rules).is_ok());
        assert!(validate(&result_with(Some(0), Some("warning: unused")), &rules).is_ok());
        assert!(validate(&result_with(Some(0), Some("SyntaxError: bad token")), &rules).is_err());
        assert!(validate(&result_with(Some(0), Some("fatal ERROR")), &rules).is_err());
    }

    #[test]
    fn test_unknown_rules_ignored() {
        let rules = [ValidationRule::Unknown("future_rule".to_string())];
        assert!(validate(&result_with(Some(7), Some("error")), &rules).is_ok());
    }
}
