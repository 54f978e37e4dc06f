//! Unit tests for codebook satisfiability checks

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::domain::conditional::{Condition, Conditional, Operator};
    use crate::domain::unit::{Unit, UnitType};
    use serde_json::{json, Value};

    fn unit_with(conditionals: Vec<Conditional>, content: Value) -> Unit {
        Unit {
            id: 1,
            codingjob_id: 1,
            external_id: "u1".to_string(),
            content,
            conditionals: Some(conditionals),
            unit_type: UnitType::Train,
            position: None,
            gold: None,
        }
    }

    fn expect(variable: &str, value: Value) -> Conditional {
        Conditional {
            variable: variable.to_string(),
            conditions: vec![Condition {
                value,
                operator: Operator::Eq,
                field: None,
                offset: None,
                length: None,
                damage: None,
                submessage: None,
            }],
            on_success: None,
            on_fail: None,
            message: None,
            damage: None,
        }
    }

    fn questions_codebook() -> Value {
        json!({
            "type": "questions",
            "questions": [
                {"name": "Q", "codes": ["yes", "no"]},
                {"name": "topic", "codes": [{"code": "politics"}, {"code": "sports"}]}
            ]
        })
    }

    #[test]
    fn declared_code_is_satisfiable() {
        let unit = unit_with(vec![expect("Q", json!("yes"))], json!({}));
        assert!(invalid_conditionals(&unit, &questions_codebook()).is_empty());
    }

    #[test]
    fn undeclared_variable_is_impossible() {
        let unit = unit_with(vec![expect("missing", json!("yes"))], json!({}));
        assert_eq!(
            invalid_conditionals(&unit, &questions_codebook()),
            vec!["missing"]
        );
    }

    #[test]
    fn undeclared_value_is_impossible() {
        let unit = unit_with(vec![expect("Q", json!("maybe"))], json!({}));
        assert_eq!(invalid_conditionals(&unit, &questions_codebook()), vec!["Q"]);
    }

    #[test]
    fn object_codes_expose_their_code_key() {
        let unit = unit_with(vec![expect("topic", json!("politics"))], json!({}));
        assert!(invalid_conditionals(&unit, &questions_codebook()).is_empty());
    }

    #[test]
    fn unit_codebook_overrides_jobset_codebook() {
        let unit = unit_with(
            vec![expect("local", json!("ok"))],
            json!({
                "codebook": {
                    "type": "questions",
                    "questions": [{"name": "local", "codes": ["ok"]}]
                }
            }),
        );
        // the jobset codebook does not know "local", the unit's own does
        assert!(invalid_conditionals(&unit, &questions_codebook()).is_empty());
    }

    #[test]
    fn annotate_codebook_checks_declared_variables() {
        let codebook = json!({
            "type": "annotate",
            "variables": [{"name": "sentiment", "codes": ["positive", "negative"]}]
        });
        let ok = unit_with(vec![expect("sentiment", json!("positive"))], json!({}));
        assert!(invalid_conditionals(&ok, &codebook).is_empty());

        let bad = unit_with(vec![expect("sentiment", json!("neutral"))], json!({}));
        assert_eq!(invalid_conditionals(&bad, &codebook), vec!["sentiment"]);
    }

    #[test]
    fn item_paths_resolve_against_question_items() {
        let codebook = json!({
            "type": "questions",
            "questions": [{
                "name": "background",
                "type": "inputs",
                "items": [
                    {"name": "age", "type": "number", "min": 18, "max": 99},
                    {"name": "city", "type": "text"}
                ]
            }]
        });

        let ok = unit_with(vec![expect("background.age", json!(21))], json!({}));
        assert!(invalid_conditionals(&ok, &codebook).is_empty());

        let under_min = unit_with(vec![expect("background.age", json!(12))], json!({}));
        assert_eq!(invalid_conditionals(&under_min, &codebook), vec!["background.age"]);

        let wrong_kind = unit_with(vec![expect("background.city", json!(7))], json!({}));
        assert_eq!(invalid_conditionals(&wrong_kind, &codebook), vec!["background.city"]);
    }

    #[test]
    fn span_conditions_must_fit_the_text_field() {
        let content = json!({
            "text_fields": [{"name": "body", "value": "a short text"}]
        });
        let mut conditional = expect("sentiment", json!("positive"));
        conditional.conditions[0].field = Some("body".to_string());
        conditional.conditions[0].offset = Some(2);
        conditional.conditions[0].length = Some(5);

        let codebook = json!({
            "type": "annotate",
            "variables": [{"name": "sentiment", "codes": ["positive"]}]
        });

        let ok = unit_with(vec![conditional.clone()], content.clone());
        assert!(invalid_conditionals(&ok, &codebook).is_empty());

        conditional.conditions[0].offset = Some(500);
        let out_of_range = unit_with(vec![conditional.clone()], content);
        assert_eq!(invalid_conditionals(&out_of_range, &codebook), vec!["sentiment"]);

        conditional.conditions[0].offset = Some(2);
        let unknown_field = unit_with(vec![conditional], json!({}));
        assert_eq!(invalid_conditionals(&unknown_field, &codebook), vec!["sentiment"]);
    }
}
