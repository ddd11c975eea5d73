// API response models
// Envelope returned to the install page; never carries credentials

use serde::{Deserialize, Serialize};

// =========================
// Generic wrapper
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    /// Stable failure code (e.g. `already_installed`), absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            code: None,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: None,
            data: Some(data),
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code.into()),
            data: None,
            error: Some(message.into()),
            message: None,
        }
    }

    pub fn fail_with_data(code: impl Into<String>, message: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            code: Some(code.into()),
            data: Some(data),
            error: Some(message.into()),
            message: None,
        }
    }
}

// =========================
// Install
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResponse {
    pub correlation_id: String,
    pub admin_account_id: u64,
    #[serde(default)]
    pub migrations_applied: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallStatusResponse {
    pub installed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_failure_fields() {
        let resp = ApiResponse::ok_with_message(InstallStatusResponse { installed: true }, "ok");
        let json = serde_json::to_string(&resp).expect("serialize");
        assert!(json.contains("\"success\":true"), "{}", json);
        assert!(json.contains("\"installed\":true"), "{}", json);
        assert!(!json.contains("\"code\""), "{}", json);
        assert!(!json.contains("\"error\""), "{}", json);
    }

    #[test]
    fn failure_envelope_carries_code_and_error() {
        let resp: ApiResponse<InstallResponse> =
            ApiResponse::fail("already_installed", "The system is already installed.");
        let json = serde_json::to_string(&resp).expect("serialize");
        assert!(json.contains("\"success\":false"), "{}", json);
        assert!(json.contains("\"code\":\"already_installed\""), "{}", json);
        assert!(!json.contains("\"data\""), "{}", json);
    }

    #[test]
    fn install_response_uses_camel_case() {
        let resp = InstallResponse {
            correlation_id: "abc".to_string(),
            admin_account_id: 1,
            migrations_applied: vec!["001_create_user".to_string()],
            duration_ms: 12,
        };
        let json = serde_json::to_string(&resp).expect("serialize");
        assert!(json.contains("\"adminAccountId\":1"), "{}", json);
        assert!(json.contains("\"migrationsApplied\""), "{}", json);
    }

    #[test]
    fn validation_failure_lists_field_errors() {
        let resp = ApiResponse::fail_with_data(
            "validation_failure",
            "The install form is invalid.",
            ValidationFailure {
                errors: vec!["DbPort must be between 1 and 65535".to_string()],
            },
        );
        let json = serde_json::to_string(&resp).expect("serialize");
        assert!(json.contains("\"success\":false"), "{}", json);
        assert!(json.contains("DbPort must be between 1 and 65535"), "{}", json);
    }
}
