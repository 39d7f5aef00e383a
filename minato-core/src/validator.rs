//! Per-message-type structural validation.
//!
//! The message type comes from MSH-9 and nowhere else. An unknown type
//! is rejected, never silently accepted; the computed type is still
//! returned so callers can log and route the rejection.

use crate::address::{FieldAddress, resolve};
use crate::message::Message;
use crate::operation_outcome::{IssueType, OperationOutcome, OperationOutcomeIssue};
use crate::spec::ValidationSpec;
use serde::Serialize;

/// One structural defect found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Defect {
    /// MSH-9 names a type the spec has no entry for.
    UnsupportedMessageType { message_type: String },
    /// A required segment occurs fewer times than the contract demands.
    MissingSegment {
        segment: String,
        required: usize,
        found: usize,
    },
}

impl Defect {
    pub fn description(&self) -> String {
        match self {
            Defect::UnsupportedMessageType { message_type } => {
                format!("unsupported message type '{message_type}'")
            }
            Defect::MissingSegment {
                segment,
                required,
                found,
            } => format!(
                "segment {segment} must occur at least {required} time(s), found {found}"
            ),
        }
    }
}

/// Validation verdict. `valid` is true iff no defects were produced;
/// there is no partial credit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub message_type: String,
    pub valid: bool,
    pub defects: Vec<Defect>,
}

impl ValidationReport {
    /// One OperationOutcome issue per defect.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let issues = self
            .defects
            .iter()
            .map(|defect| {
                let code = match defect {
                    Defect::UnsupportedMessageType { .. } => IssueType::NotSupported,
                    Defect::MissingSegment { .. } => IssueType::Structure,
                };
                OperationOutcomeIssue::error(code, defect.description())
            })
            .collect();
        OperationOutcome::from_issues(issues)
    }
}

/// Check the message against the structural contract for its type.
pub fn validate(message: &Message, spec: &ValidationSpec) -> ValidationReport {
    let message_type = message_type_of(message);

    let Some(shape) = spec.types.get(&message_type) else {
        return ValidationReport {
            valid: false,
            defects: vec![Defect::UnsupportedMessageType {
                message_type: message_type.clone(),
            }],
            message_type,
        };
    };

    let mut defects = Vec::new();
    for requirement in &shape.require {
        let found = message.segment_count(&requirement.segment);
        if found < requirement.min {
            defects.push(Defect::MissingSegment {
                segment: requirement.segment.clone(),
                required: requirement.min,
                found,
            });
        }
    }

    ValidationReport {
        message_type,
        valid: defects.is_empty(),
        defects,
    }
}

/// `"<MSH-9.1>^<MSH-9.2>"`.
pub fn message_type_of(message: &Message) -> String {
    let component = |index: usize| {
        resolve(message, &FieldAddress::new("MSH", 9).with_component(index)).unwrap_or("")
    };
    format!("{}^{}", component(1), component(2))
}
