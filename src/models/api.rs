use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response envelope used by every backend endpoint
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiEnvelope {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateSessionRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub link: String,
    pub student_name: String,
    pub student_email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub session_id: String,
    pub link: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EndRequest {
    pub link: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub code: String,
    pub language: String,
    pub link: String,
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Completes a reset with the token from the emailed link
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResetPasswordRequest {
    pub access_token: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leave_body_is_camel_case() {
        let body = serde_json::to_value(LeaveRequest { session_id: "S1".into(), link: "ABC".into() }).unwrap();
        assert_eq!(body, json!({ "sessionId": "S1", "link": "ABC" }));
    }

    #[test]
    fn reset_body_carries_token_and_new_password() {
        let body = serde_json::to_value(ResetPasswordRequest {
            access_token: "tok".into(),
            new_password: "Secret123".into(),
        })
        .unwrap();
        assert_eq!(body, json!({ "access_token": "tok", "newPassword": "Secret123" }));
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let env: ApiEnvelope = serde_json::from_value(json!({ "message": "nope" })).unwrap();
        assert!(!env.is_success());
        assert!(env.data.is_null());
    }
}
