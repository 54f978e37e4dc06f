// Creation-time validation of conditionals against the codebook. A job with
// a conditional no coder could ever satisfy would strand coders mid-job, so
// creation is blocked instead. Anything malformed degrades to "impossible".

use serde_json::Value;

use crate::domain::conditional::{Condition, Operator};
use crate::domain::unit::Unit;

#[cfg(test)]
#[path = "codebook_test.rs"]
mod codebook_test;

/// Check a unit's conditionals against the codebook the coder will see.
/// Returns the variable names whose conditionals cannot be satisfied.
pub fn invalid_conditionals(unit: &Unit, codebook: &Value) -> Vec<String> {
    let Some(conditionals) = &unit.conditionals else {
        return Vec::new();
    };

    // a unit may override the jobset codebook with its own
    let codebook = unit.content.get("codebook").unwrap_or(codebook);

    let mut invalid = Vec::new();
    for conditional in conditionals {
        if !position_is_possible(&conditional.conditions, &unit.content) {
            invalid.push(conditional.variable.clone());
            continue;
        }
        let possible = match codebook.get("type").and_then(Value::as_str) {
            Some("questions") => valid_questions_conditional(
                &conditional.variable,
                &conditional.conditions,
                codebook.get("questions"),
            ),
            Some("annotate") => valid_annotate_conditional(
                &conditional.variable,
                &conditional.conditions,
                codebook.get("variables"),
            ),
            // unknown codebook layouts cannot be checked
            _ => true,
        };
        if !possible {
            invalid.push(conditional.variable.clone());
        }
    }
    invalid
}

/// 'questions' codebooks: the variable is a question name, or a
/// `question.item` path for multi-item questions.
fn valid_questions_conditional(
    variable: &str,
    conditions: &[Condition],
    questions: Option<&Value>,
) -> bool {
    let Some(questions) = questions.and_then(Value::as_array) else {
        return false;
    };

    for question in questions {
        let Some(name) = question.get("name").and_then(Value::as_str) else {
            continue;
        };
        let codes = code_values(question.get("codes"));

        if variable == name && value_is_possible(conditions, &codes) {
            return true;
        }

        let items = question
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for item in items {
            let Some(item_name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            if variable != format!("{name}.{item_name}") {
                continue;
            }
            if question.get("type").and_then(Value::as_str) == Some("inputs") {
                if input_is_possible(conditions, item) {
                    return true;
                }
            } else if value_is_possible(conditions, &codes) {
                return true;
            }
        }
    }
    false
}

/// 'annotate' codebooks: the variable must be declared with codes that can
/// satisfy every condition.
fn valid_annotate_conditional(
    variable: &str,
    conditions: &[Condition],
    variables: Option<&Value>,
) -> bool {
    let Some(variables) = variables.and_then(Value::as_array) else {
        return false;
    };

    for declared in variables {
        if declared.get("name").and_then(Value::as_str) != Some(variable) {
            continue;
        }
        let codes = code_values(declared.get("codes"));
        if value_is_possible(conditions, &codes) {
            return true;
        }
    }
    false
}

/// Codes are either plain strings or `{code: ..., ...}` objects.
fn code_values(codes: Option<&Value>) -> Vec<Value> {
    codes
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|code| match code {
                    Value::Object(obj) => obj.get("code").cloned().unwrap_or(Value::Null),
                    other => other.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Every condition must be matchable by at least one declared code.
fn value_is_possible(conditions: &[Condition], values: &[Value]) -> bool {
    conditions
        .iter()
        .all(|c| values.iter().any(|v| c.operator.apply(v, &c.value)))
}

/// Conditions that point into a field must point at something that exists:
/// text spans must fall inside the codable window of the named text field,
/// and other fields only need to exist by name.
fn position_is_possible(conditions: &[Condition], content: &Value) -> bool {
    for condition in conditions {
        let Some(field) = condition.field.as_deref() else {
            continue;
        };
        let mut has_match = false;

        let text_fields = content
            .get("text_fields")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for text_field in text_fields {
            if text_field.get("name").and_then(Value::as_str) != Some(field) {
                continue;
            }
            let Some(cond_offset) = condition.offset else {
                has_match = true;
                continue;
            };
            let offset = int_of(text_field, "offset");
            let unit_start = int_of(text_field, "unit_start");
            let unit_end = int_of(text_field, "unit_end");
            let context_before = text_field
                .get("context_before")
                .and_then(Value::as_str)
                .map(|s| s.len() as i64)
                .unwrap_or(0);
            let value_len = text_field
                .get("value")
                .and_then(Value::as_str)
                .map(|s| s.len() as i64)
                .unwrap_or(0);

            let first_char = offset + unit_start.max(context_before);
            let last_char = offset + value_len - unit_end - 1;
            if cond_offset >= first_char
                && cond_offset + condition.length.unwrap_or(0) <= last_char
            {
                has_match = true;
            }
        }

        for key in ["image_fields", "markdown_fields"] {
            let fields = content
                .get(key)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            // positions inside non-text fields cannot be checked further
            if fields
                .iter()
                .any(|f| f.get("name").and_then(Value::as_str) == Some(field))
            {
                has_match = true;
            }
        }

        if !has_match {
            return false;
        }
    }
    true
}

fn int_of(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// Input items constrain the value domain directly: text inputs need string
/// conditions, number inputs need numeric conditions within min/max.
fn input_is_possible(conditions: &[Condition], item: &Value) -> bool {
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or("text");
    for condition in conditions {
        match item_type {
            "text" | "textarea" | "email" => {
                if !condition.value.is_string() {
                    return false;
                }
            }
            "number" => {
                let Some(value) = condition.value.as_f64() else {
                    return false;
                };
                if let Some(min) = item.get("min").and_then(Value::as_f64) {
                    if matches!(condition.operator, Operator::Eq) && value < min {
                        return false;
                    }
                }
                if let Some(max) = item.get("max").and_then(Value::as_f64) {
                    if matches!(condition.operator, Operator::Eq) && value > max {
                        return false;
                    }
                }
            }
            _ => {}
        }
    }
    true
}
