// Conditional evaluation: declarative checks on submitted annotations that
// drive training feedback, screening and gold-test damage. Pure logic, no
// I/O, so it can be exercised exhaustively in unit tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::annotation::AnnotationValue;
use crate::domain::unit::UnitType;

#[cfg(test)]
#[path = "conditional_test.rs"]
mod conditional_test;

/// A declarative rule on one annotation variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conditional {
    pub variable: String,
    pub conditions: Vec<Condition>,
    #[serde(rename = "onSuccess", default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<FeedbackAction>,
    #[serde(rename = "onFail", default, skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<FeedbackAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<f64>,
}

/// One acceptable (or, with `!=`, rejected) value, optionally restricted to
/// a span position within a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub value: Value,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submessage: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    /// Compare a submitted value against a condition value. The condition
    /// value decides the comparison domain: numeric conditions coerce the
    /// submitted value to a number (strings are parsed), string conditions
    /// compare textual forms.
    pub fn apply(self, submitted: &Value, expected: &Value) -> bool {
        if let Some(rhs) = expected.as_f64() {
            let lhs = match submitted {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match lhs {
                Some(lhs) => match self {
                    Operator::Eq => lhs == rhs,
                    Operator::Ne => lhs != rhs,
                    Operator::Lt => lhs < rhs,
                    Operator::Le => lhs <= rhs,
                    Operator::Gt => lhs > rhs,
                    Operator::Ge => lhs >= rhs,
                },
                // not a number: the only relation that can hold is "differs"
                None => self == Operator::Ne,
            }
        } else {
            let lhs = text_of(submitted);
            let rhs = text_of(expected);
            match self {
                Operator::Eq => lhs == rhs,
                Operator::Ne => lhs != rhs,
                Operator::Lt => lhs < rhs,
                Operator::Le => lhs <= rhs,
                Operator::Gt => lhs > rhs,
                Operator::Ge => lhs >= rhs,
            }
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Feedback actions a conditional can trigger on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Applaud,
    Retry,
    Block,
}

/// Per-variable verdict returned to the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableEvaluation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<FeedbackAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submessages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correct: Vec<AnnotationValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incorrect: Vec<AnnotationValue>,
}

pub type Evaluation = BTreeMap<String, VariableEvaluation>;

const TRAIN_RETRY_MESSAGE: &str = "### Please retry.\n\nThis is a **training** unit, and the answer you gave was incorrect. \nPlease have another look, and select a different answer";

const SCREEN_BLOCK_MESSAGE: &str = "### Thank you for participating.\n\nBased on your answer for this question we determined that you do not meet the qualifications for this coding job.\nWe sincerely thank you for your time.";

struct UnitDefaults {
    success_action: Option<FeedbackAction>,
    fail_action: Option<FeedbackAction>,
    message: Option<&'static str>,
    damage: f64,
}

fn defaults_for(unit_type: UnitType) -> UnitDefaults {
    match unit_type {
        UnitType::Train => UnitDefaults {
            success_action: Some(FeedbackAction::Applaud),
            fail_action: Some(FeedbackAction::Retry),
            message: Some(TRAIN_RETRY_MESSAGE),
            damage: 0.0,
        },
        UnitType::Screen => UnitDefaults {
            success_action: None,
            fail_action: Some(FeedbackAction::Block),
            message: Some(SCREEN_BLOCK_MESSAGE),
            damage: 0.0,
        },
        UnitType::Test => UnitDefaults {
            success_action: None,
            fail_action: None,
            message: None,
            damage: 10.0,
        },
        UnitType::Code | UnitType::Survey => UnitDefaults {
            success_action: None,
            fail_action: None,
            message: None,
            damage: 0.0,
        },
    }
}

fn position_matches(condition: &Condition, item: &AnnotationValue) -> bool {
    if condition.field.is_some() && condition.field != item.field {
        return false;
    }
    if condition.offset.is_some() && condition.offset != item.offset {
        return false;
    }
    if condition.length.is_some() && condition.length != item.length {
        return false;
    }
    true
}

/// Evaluate a unit's conditionals against a submitted annotation.
///
/// Returns the accrued damage and a per-variable evaluation map. A
/// conditional fails when a pertinent annotation item matches none of its
/// conditions, or when the variable was not answered at all in a DONE
/// submission. Damage on failure is the sum of every unmatched condition's
/// damage plus the conditional's own (or the unit-type default).
///
/// `report_success` controls whether passing conditionals show up in the
/// map with their success action (used for positive feedback on retries).
pub fn evaluate(
    unit_type: UnitType,
    conditionals: &[Conditional],
    annotation: &[AnnotationValue],
    submitted_done: bool,
    report_success: bool,
) -> (f64, Evaluation) {
    let defaults = defaults_for(unit_type);
    let mut total_damage = 0.0;
    let mut evaluation = Evaluation::new();

    for conditional in conditionals {
        let pertinent: Vec<&AnnotationValue> = annotation
            .iter()
            .filter(|a| a.variable == conditional.variable)
            .collect();

        if pertinent.is_empty() {
            // A missing answer only counts against a finished submission.
            if !submitted_done {
                continue;
            }
            let mut entry = VariableEvaluation {
                action: conditional.on_fail.or(defaults.fail_action),
                message: conditional
                    .message
                    .clone()
                    .or_else(|| defaults.message.map(str::to_owned)),
                ..Default::default()
            };
            for condition in &conditional.conditions {
                total_damage += condition.damage.unwrap_or(0.0);
                if let Some(sub) = &condition.submessage {
                    entry.submessages.push(sub.clone());
                }
            }
            total_damage += conditional.damage.unwrap_or(defaults.damage);
            evaluation.insert(conditional.variable.clone(), entry);
            continue;
        }

        let mut valid = vec![false; pertinent.len()];
        let mut unmatched_damage = 0.0;
        let mut submessages = Vec::new();

        for condition in &conditional.conditions {
            let mut matched = false;
            for (i, item) in pertinent.iter().enumerate() {
                if !position_matches(condition, item) {
                    continue;
                }
                if condition.operator.apply(&item.value, &condition.value) {
                    matched = true;
                    valid[i] = true;
                }
            }
            if !matched {
                unmatched_damage += condition.damage.unwrap_or(0.0);
                if let Some(sub) = &condition.submessage {
                    submessages.push(sub.clone());
                }
            }
        }

        let correct: Vec<AnnotationValue> = pertinent
            .iter()
            .zip(&valid)
            .filter(|(_, v)| **v)
            .map(|(a, _)| (*a).clone())
            .collect();
        let incorrect: Vec<AnnotationValue> = pertinent
            .iter()
            .zip(&valid)
            .filter(|(_, v)| !**v)
            .map(|(a, _)| (*a).clone())
            .collect();

        if incorrect.is_empty() {
            if report_success {
                if let Some(action) = conditional.on_success.or(defaults.success_action) {
                    evaluation.insert(
                        conditional.variable.clone(),
                        VariableEvaluation {
                            action: Some(action),
                            ..Default::default()
                        },
                    );
                }
            }
        } else {
            total_damage += unmatched_damage;
            total_damage += conditional.damage.unwrap_or(defaults.damage);
            evaluation.insert(
                conditional.variable.clone(),
                VariableEvaluation {
                    action: conditional.on_fail.or(defaults.fail_action),
                    message: conditional
                        .message
                        .clone()
                        .or_else(|| defaults.message.map(str::to_owned)),
                    submessages,
                    correct,
                    incorrect,
                },
            );
        }
    }

    (total_damage, evaluation)
}
