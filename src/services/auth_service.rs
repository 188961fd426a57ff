use tracing::info;

use crate::auth::AuthContext;
use crate::clients::BackendClient;
use crate::models::{LoginRequest, ResetPasswordRequest, SignupRequest, SyncError, UserSession};

fn require(fields: &[(&str, &str)]) -> Result<(), SyncError> {
    let missing: Vec<_> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Validation(format!("Please provide your {}.", missing.join(", "))))
    }
}

pub async fn signup(
    api: &BackendClient,
    auth: &mut AuthContext,
    name: &str,
    email: &str,
    password: &str,
) -> Result<UserSession, SyncError> {
    require(&[("name", name), ("email", email), ("password", password)])?;
    let user = api
        .signup(&SignupRequest {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        })
        .await?;
    auth.sign_in(user.clone())?;
    Ok(user)
}

pub async fn login(
    api: &BackendClient,
    auth: &mut AuthContext,
    email: &str,
    password: &str,
) -> Result<UserSession, SyncError> {
    require(&[("email", email), ("password", password)])?;
    let user = api
        .login(&LoginRequest { email: email.trim().to_string(), password: password.to_string() })
        .await?;
    auth.sign_in(user.clone())?;
    Ok(user)
}

/// Finish a reset with the token from the emailed link
pub async fn reset_password(api: &BackendClient, token: &str, password: &str) -> Result<String, SyncError> {
    validate_reset(token, password)?;
    api.reset_password(&ResetPasswordRequest {
        access_token: token.trim().to_string(),
        new_password: password.to_string(),
    })
    .await?;
    info!("Password reset completed");
    Ok("Your password has been reset. You can sign in now.".to_string())
}

fn validate_reset(token: &str, password: &str) -> Result<(), SyncError> {
    let problem = if password.is_empty() {
        Some("Password is required")
    } else if password.chars().count() < 8 {
        Some("Password must be at least 8 characters long")
    } else if !(password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit()))
    {
        Some("Password must contain at least one uppercase letter, one lowercase letter, and one number")
    } else {
        None
    };
    if let Some(message) = problem {
        return Err(SyncError::Validation(message.to_string()));
    }
    if token.trim().is_empty() {
        return Err(SyncError::Validation("Missing or invalid reset token.".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_named() {
        match require(&[("email", " "), ("password", "")]) {
            Err(SyncError::Validation(msg)) => assert_eq!(msg, "Please provide your email, password."),
            other => panic!("unexpected {:?}", other),
        }
        assert!(require(&[("email", "a@b.c")]).is_ok());
    }

    #[test]
    fn reset_needs_token_and_strong_password() {
        let message = |r: Result<(), SyncError>| match r {
            Err(SyncError::Validation(msg)) => msg,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(message(validate_reset(" ", "Secret123")), "Missing or invalid reset token.");
        assert_eq!(message(validate_reset("tok", "")), "Password is required");
        assert_eq!(message(validate_reset("tok", "Ab1")), "Password must be at least 8 characters long");
        assert!(message(validate_reset("tok", "alllowercase1")).starts_with("Password must contain"));
        assert!(validate_reset("tok", "Secret123").is_ok());
    }
}
