//! Credential validation results.

use crate::{Role, RoleFlags};
use serde::{Deserialize, Serialize};

/// Outcome of validating a bearer token against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid(user: UserDescriptor) -> Self {
        Self {
            is_valid: true,
            user: Some(user),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            user: None,
            error: Some(error.into()),
        }
    }

    /// Role of the validated user; [`Role::Unknown`] when invalid.
    pub fn role(&self) -> Role {
        match (&self.user, self.is_valid) {
            (Some(user), true) => user.roles.primary_role(),
            _ => Role::Unknown,
        }
    }
}

/// The user a token belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: RoleFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_backend_response() {
        let result: ValidationResult = serde_json::from_str(
            r#"{"isValid":true,"user":{"id":3,"username":"mo","roles":{"is_moderator":true}}}"#,
        )
        .unwrap();
        assert!(result.is_valid);
        assert_eq!(result.role(), Role::Moderator);
        assert!(result.error.is_none());
    }

    #[test]
    fn invalid_result_has_no_role() {
        let result: ValidationResult =
            serde_json::from_str(r#"{"isValid":false,"error":"Token expired"}"#).unwrap();
        assert_eq!(result.role(), Role::Unknown);
        assert_eq!(result, ValidationResult::invalid("Token expired"));
    }
}
