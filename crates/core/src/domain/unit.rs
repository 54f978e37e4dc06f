// Unit entity: a single item to annotate. Content is an opaque blob for the
// frontend; the unit type drives the default conditional feedback.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::conditional::Conditional;
use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Code,
    Train,
    Test,
    Survey,
    Screen,
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitType::Code => write!(f, "code"),
            UnitType::Train => write!(f, "train"),
            UnitType::Test => write!(f, "test"),
            UnitType::Survey => write!(f, "survey"),
            UnitType::Screen => write!(f, "screen"),
        }
    }
}

impl FromStr for UnitType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(UnitType::Code),
            "train" => Ok(UnitType::Train),
            "test" => Ok(UnitType::Test),
            "survey" => Ok(UnitType::Survey),
            "screen" => Ok(UnitType::Screen),
            other => Err(DomainError::InvalidUnitType(other.to_string())),
        }
    }
}

/// Pinned position of a unit within every coder's sequence. Unpositioned
/// units fill the middle according to the jobset's assignment strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Pre,
    Post,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Pre => write!(f, "pre"),
            Position::Post => write!(f, "post"),
        }
    }
}

impl FromStr for Position {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" => Ok(Position::Pre),
            "post" => Ok(Position::Post),
            other => Err(DomainError::InvalidPosition(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: i64,
    pub codingjob_id: i64,
    /// Uploader-chosen id, unique within the job.
    pub external_id: String,
    /// Opaque content blob forwarded to the frontend.
    pub content: Value,
    pub conditionals: Option<Vec<Conditional>>,
    pub unit_type: UnitType,
    pub position: Option<Position>,
    /// Opaque correct-answer metadata for researchers; not interpreted.
    pub gold: Option<Value>,
}
