// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid unit type \"{0}\". Has to be \"code\", \"train\", \"test\", \"survey\" or \"screen\"")]
    InvalidUnitType(String),

    #[error("Invalid position \"{0}\". Has to be \"pre\", \"post\" or null")]
    InvalidPosition(String),

    #[error("Status has to be 'DONE' or 'IN_PROGRESS', got '{0}'")]
    InvalidStatus(String),

    #[error("Unit {external_id} has impossible conditionals ({variables})")]
    ImpossibleConditionals {
        external_id: String,
        variables: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
