use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in user as persisted in the credential record
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Identity of a student who joined through the join form
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuestIdentity {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub joined_at: DateTime<Utc>,
}
