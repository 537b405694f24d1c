//! # Typed Arguments and Results
//!
//! Tasks exchange data as ordered sequences of `{type, value}` pairs. The
//! type tag travels with the value so a receiving worker can validate a
//! signature's arguments against the registered task before running it.

use serde::{Deserialize, Serialize};

/// A single typed argument carried by a [`Signature`](super::Signature).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArg {
    /// Declared type of the value ("int", "float", "bool", "string").
    #[serde(rename = "type")]
    pub type_tag: String,
    /// The value itself, kept as JSON until binding decodes it.
    pub value: serde_json::Value,
}

impl TaskArg {
    pub fn new(type_tag: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            type_tag: type_tag.into(),
            value: value.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        Self::new("int", value)
    }

    pub fn float(value: f64) -> Self {
        Self::new("float", value)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new("bool", value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new("string", value.into())
    }
}

/// A single typed return value produced by a task call.
///
/// Same shape as [`TaskArg`]; results are appended to successor arguments
/// when chaining, so the two convert freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub value: serde_json::Value,
}

impl TaskResult {
    pub fn new(type_tag: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            type_tag: type_tag.into(),
            value: value.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        Self::new("int", value)
    }

    pub fn float(value: f64) -> Self {
        Self::new("float", value)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new("bool", value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new("string", value.into())
    }
}

impl From<TaskResult> for TaskArg {
    fn from(result: TaskResult) -> Self {
        Self {
            type_tag: result.type_tag,
            value: result.value,
        }
    }
}

/// Render results for log lines, e.g. `[5, "ok"]`.
pub fn humanize_results(results: &[TaskResult]) -> String {
    let rendered: Vec<String> = results.iter().map(|r| r.value.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_constructors() {
        assert_eq!(TaskArg::int(5).type_tag, "int");
        assert_eq!(TaskArg::float(1.5).type_tag, "float");
        assert_eq!(TaskArg::boolean(true).type_tag, "bool");
        let arg = TaskArg::string("hello");
        assert_eq!(arg.type_tag, "string");
        assert_eq!(arg.value, serde_json::json!("hello"));
    }

    #[test]
    fn test_result_converts_to_arg() {
        let arg: TaskArg = TaskResult::int(9).into();
        assert_eq!(arg, TaskArg::int(9));
    }

    #[test]
    fn test_serde_uses_type_field() {
        let json = serde_json::to_string(&TaskArg::int(2)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":2}"#);

        let parsed: TaskArg = serde_json::from_str(r#"{"type":"string","value":"x"}"#).unwrap();
        assert_eq!(parsed, TaskArg::string("x"));
    }

    #[test]
    fn test_humanize_results() {
        assert_eq!(humanize_results(&[]), "[]");
        assert_eq!(
            humanize_results(&[TaskResult::int(5), TaskResult::string("ok")]),
            r#"[5, "ok"]"#
        );
    }
}
