// Domain Layer - Pure business logic and entities

pub mod annotation;
pub mod codebook;
pub mod conditional;
pub mod error;
pub mod job;
pub mod unit;
pub mod user;

// Re-exports
pub use annotation::{Annotation, AnnotationStatus, AnnotationValue};
pub use conditional::{
    Condition, Conditional, Evaluation, FeedbackAction, Operator, VariableEvaluation,
};
pub use error::DomainError;
pub use job::{CodingJob, JobSet, JobSetUnit, JobUser, Rules, Ruleset};
pub use unit::{Position, Unit, UnitType};
pub use user::User;
