// User accounts. Registration, password hashing and token issuance are
// handled outside the engine; the engine only reads these rows.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub is_admin: bool,
    /// When set, the user may only code this job. Used for guest users
    /// minted from a job token.
    pub restricted_job: Option<i64>,
    pub password: Option<String>,
}

impl User {
    pub fn new_coder(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            is_admin: false,
            restricted_job: None,
            password: None,
        }
    }
}
