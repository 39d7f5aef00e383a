//! FHIR OperationOutcome, the error-reporting surface of the gateway.
//! See: https://www.hl7.org/fhir/operationoutcome.html

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// The subset of FHIR issue types this gateway emits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    Structure,
    Required,
    Value,
    Security,
    Login,
    Forbidden,
    NotSupported,
    Processing,
    Transient,
    Exception,
    Informational,
}

impl OperationOutcomeIssue {
    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code,
            diagnostics: Some(diagnostics.into()),
            expression: None,
        }
    }
}

impl OperationOutcome {
    pub fn from_issues(issue: Vec<OperationOutcomeIssue>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue,
        }
    }

    /// Single-issue error outcome.
    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::from_issues(vec![OperationOutcomeIssue::error(code, diagnostics)])
    }

    /// The request body is not a readable HL7 message.
    pub fn invalid_payload(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Invalid, diagnostics)
    }

    pub fn unauthorized(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Login, diagnostics)
    }

    pub fn forbidden(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Forbidden, diagnostics)
    }

    pub fn not_supported(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::NotSupported, diagnostics)
    }

    /// The outbound FHIR store failed or misbehaved.
    pub fn upstream_failure(diagnostics: impl Into<String>) -> Self {
        Self::error(IssueType::Transient, diagnostics)
    }
}
