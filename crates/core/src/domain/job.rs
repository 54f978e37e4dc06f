// Coding job entities: the job itself, its jobsets (A/B variants), the
// jobset membership rows and the per-coder binding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingJob {
    pub id: i64,
    pub title: String,
    pub creator_id: i64,
    pub restricted: bool,
    pub archived: bool,
    pub created: i64, // epoch ms
}

/// A variant of a job (same units or a subset, possibly a distinct codebook
/// and rules). A coder is bound to exactly one jobset per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSet {
    pub id: i64,
    pub codingjob_id: i64,
    pub name: String,
    /// Opaque annotation schema, forwarded to the frontend. The engine only
    /// inspects it to validate conditional references at creation time.
    pub codebook: Value,
    pub rules: Rules,
    pub debriefing: Option<Value>,
}

fn default_true() -> bool {
    true
}

/// Coding rules embedded in a jobset. The `ruleset` tag selects the
/// assignment strategy; the remaining knobs are shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rules {
    #[serde(flatten)]
    pub ruleset: Ruleset,

    #[serde(default = "default_true")]
    pub can_seek_backwards: bool,
    #[serde(default)]
    pub can_seek_forwards: bool,
    #[serde(default)]
    pub show_damage: bool,
    #[serde(default)]
    pub heal_damage: bool,
    #[serde(default)]
    pub max_damage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ruleset", rename_all = "lowercase")]
pub enum Ruleset {
    /// Units are served in a fixed linear order (optionally permuted per
    /// coder with a deterministic seed).
    Fixedset {
        #[serde(default)]
        randomize: bool,
    },
    /// Units least coded by the crowd are served first, so coverage
    /// converges as fast as possible.
    Crowdcoding {
        #[serde(default)]
        units_per_coder: Option<i64>,
    },
}

/// Membership of a unit in a jobset. Immutable after creation except for
/// `blocked`, which removes the unit from future crowd assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSetUnit {
    pub id: i64,
    pub jobset_id: i64,
    pub unit_id: i64,
    /// Positive values pin the unit to an offset from the start of the
    /// coder's sequence, negative values to an offset from the end.
    pub fixed_index: Option<i64>,
    pub has_conditionals: bool,
    pub blocked: bool,
}

/// Binding of a coder to a job, created lazily on first unit request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUser {
    pub id: i64,
    pub user_id: i64,
    pub codingjob_id: i64,
    pub jobset_id: Option<i64>,
    pub can_code: bool,
    pub can_edit: bool,
    /// Accumulated damage; kept equal to the sum over this coder's
    /// annotations in the jobset after every reconciler commit.
    pub damage: f64,
    pub status: String,
}

impl JobUser {
    pub fn new(user_id: i64, codingjob_id: i64, jobset_id: Option<i64>) -> Self {
        Self {
            id: 0,
            user_id,
            codingjob_id,
            jobset_id,
            can_code: true,
            can_edit: false,
            damage: 0.0,
            status: "active".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rules_deserialize_fixedset_defaults() {
        let rules: Rules = serde_json::from_value(json!({"ruleset": "fixedset"})).unwrap();
        assert_eq!(rules.ruleset, Ruleset::Fixedset { randomize: false });
        assert!(rules.can_seek_backwards);
        assert!(!rules.can_seek_forwards);
        assert!(!rules.show_damage);
        assert!(!rules.heal_damage);
        assert_eq!(rules.max_damage, None);
    }

    #[test]
    fn rules_deserialize_crowdcoding() {
        let rules: Rules = serde_json::from_value(json!({
            "ruleset": "crowdcoding",
            "units_per_coder": 5,
            "can_seek_backwards": false,
            "max_damage": 15.0
        }))
        .unwrap();
        assert_eq!(
            rules.ruleset,
            Ruleset::Crowdcoding {
                units_per_coder: Some(5)
            }
        );
        assert!(!rules.can_seek_backwards);
        assert_eq!(rules.max_damage, Some(15.0));
    }

    #[test]
    fn rules_roundtrip_keeps_tag() {
        let rules: Rules =
            serde_json::from_value(json!({"ruleset": "fixedset", "randomize": true})).unwrap();
        let value = serde_json::to_value(&rules).unwrap();
        assert_eq!(value["ruleset"], "fixedset");
        assert_eq!(value["randomize"], true);
    }
}
