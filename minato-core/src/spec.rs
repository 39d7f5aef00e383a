//! Declarative mapping and validation specifications.
//!
//! Specs are versioned, reviewed configuration: loaded once at process
//! start, shared read-only, reloaded only by restarting the subsystem.
//! Every structural problem — unparseable address, unknown transform
//! name, bad JSON — fails the load; nothing is deferred to request time.

use crate::address::FieldAddress;
use crate::error::{MinatoError, Result};
use crate::transform::Transform;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Placeholder usable in literal values and `system` options, replaced
/// at load time with `options.mrnSystem`.
pub const MRN_SYSTEM_TOKEN: &str = "${MRN_SYSTEM}";

/// Mapping specification: ordered path rules per resource kind plus the
/// OBX walk configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSpec {
    #[serde(default)]
    pub options: MappingOptions,
    #[serde(default)]
    pub patient: Vec<PathRule>,
    #[serde(default)]
    pub coverage: Vec<PathRule>,
    #[serde(default)]
    pub observation: ObservationRules,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingOptions {
    /// Identifier system substituted for `${MRN_SYSTEM}`.
    pub mrn_system: String,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            mrn_system: "urn:mrn:minato-intake".to_string(),
        }
    }
}

/// One FHIR path and the rule that produces its value.
#[derive(Debug, Clone, Deserialize)]
pub struct PathRule {
    /// Dotted, array-indexable path, e.g. `identifier[0].system`.
    pub path: String,
    #[serde(flatten)]
    pub rule: Rule,
}

/// `{literal}` or `{source, transform?, system?}` — data, not code.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Literal {
        literal: String,
    },
    Sourced {
        source: FieldAddress,
        #[serde(default)]
        transform: Option<Transform>,
        /// Default identifier system for the `identifier` transform.
        #[serde(default)]
        system: Option<String>,
    },
}

/// How the engine walks repeating OBX segments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObservationRules {
    /// Stamp the clock's now into `effectiveDateTime` when OBX-14 is
    /// absent. Off by default: absent stays absent.
    pub default_effective_to_now: bool,
    pub scan: ObxScan,
    /// Coding system used when OBX-3 carries none.
    pub code_system: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObxScan {
    /// Stop at the first occurrence whose OBX-3 is absent. Assumes the
    /// feed emits OBX sets without gaps.
    #[default]
    StopAtGap,
    /// Walk every present occurrence, in input order, for feeds that
    /// emit sparse OBX numbering.
    CollectPresent,
}

impl MappingSpec {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut spec: MappingSpec = serde_json::from_str(json)
            .map_err(|e| MinatoError::Configuration(format!("invalid mapping spec: {e}")))?;
        for rule in spec.patient.iter().chain(spec.coverage.iter()) {
            if rule.path.is_empty() {
                return Err(MinatoError::Configuration(
                    "mapping rule with empty path".to_string(),
                ));
            }
        }
        spec.substitute_placeholders();
        Ok(spec)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::debug!(path = %path.as_ref().display(), "loading mapping spec");
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn substitute_placeholders(&mut self) {
        let mrn_system = self.options.mrn_system.clone();
        for entry in self.patient.iter_mut().chain(self.coverage.iter_mut()) {
            match &mut entry.rule {
                Rule::Literal { literal } => {
                    *literal = literal.replace(MRN_SYSTEM_TOKEN, &mrn_system);
                }
                Rule::Sourced {
                    system: Some(system),
                    ..
                } => {
                    *system = system.replace(MRN_SYSTEM_TOKEN, &mrn_system);
                }
                Rule::Sourced { .. } => {}
            }
        }
    }
}

/// Structural contract per message type (`"ADT^A04"`, `"ADT^A08"`, …).
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationSpec {
    #[serde(flatten)]
    pub types: HashMap<String, MessageShape>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageShape {
    pub require: Vec<SegmentRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentRequirement {
    pub segment: String,
    /// Minimum occurrence count.
    #[serde(default = "default_min")]
    pub min: usize,
}

fn default_min() -> usize {
    1
}

impl ValidationSpec {
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: ValidationSpec = serde_json::from_str(json)
            .map_err(|e| MinatoError::Configuration(format!("invalid validation spec: {e}")))?;
        for (message_type, shape) in &spec.types {
            for requirement in &shape.require {
                if requirement.segment.len() != 3 {
                    return Err(MinatoError::Configuration(format!(
                        "validation spec for '{message_type}': segment tag '{}' is not 3 characters",
                        requirement.segment
                    )));
                }
            }
        }
        Ok(spec)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::debug!(path = %path.as_ref().display(), "loading validation spec");
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING: &str = r#"{
        "options": { "mrnSystem": "urn:mrn:test" },
        "patient": [
            { "path": "identifier[0]", "source": "PID-3", "transform": "identifier", "system": "${MRN_SYSTEM}" },
            { "path": "gender", "source": "PID-8", "transform": "gender" },
            { "path": "active", "literal": "true" }
        ],
        "coverage": [
            { "path": "identifier[0]", "source": "IN1-2", "transform": "identifier", "system": "urn:id:plan" }
        ],
        "observation": { "defaultEffectiveToNow": true, "scan": "collect-present" }
    }"#;

    #[test]
    fn test_load_mapping_spec() {
        let spec = MappingSpec::from_json(MAPPING).unwrap();
        assert_eq!(spec.patient.len(), 3);
        assert_eq!(spec.coverage.len(), 1);
        assert!(spec.observation.default_effective_to_now);
        assert_eq!(spec.observation.scan, ObxScan::CollectPresent);
    }

    #[test]
    fn test_mrn_placeholder_substituted_at_load() {
        let spec = MappingSpec::from_json(MAPPING).unwrap();
        match &spec.patient[0].rule {
            Rule::Sourced { system, .. } => assert_eq!(system.as_deref(), Some("urn:mrn:test")),
            Rule::Literal { .. } => panic!("expected sourced rule"),
        }
    }

    #[test]
    fn test_unknown_transform_fails_at_load() {
        let json = r#"{ "patient": [ { "path": "gender", "source": "PID-8", "transform": "sex" } ] }"#;
        let err = MappingSpec::from_json(json).unwrap_err();
        assert!(matches!(err, MinatoError::Configuration(_)));
    }

    #[test]
    fn test_bad_address_fails_at_load() {
        let json = r#"{ "patient": [ { "path": "gender", "source": "PID" } ] }"#;
        assert!(MappingSpec::from_json(json).is_err());
    }

    #[test]
    fn test_defaults() {
        let spec = MappingSpec::from_json("{}").unwrap();
        assert_eq!(spec.options.mrn_system, "urn:mrn:minato-intake");
        assert!(!spec.observation.default_effective_to_now);
        assert_eq!(spec.observation.scan, ObxScan::StopAtGap);
        assert!(spec.patient.is_empty());
    }

    #[test]
    fn test_load_validation_spec() {
        let json = r#"{
            "ADT^A04": { "require": [ { "segment": "MSH" }, { "segment": "PID" } ] },
            "ORU^R01": { "require": [ { "segment": "OBX", "min": 2 } ] }
        }"#;
        let spec = ValidationSpec::from_json(json).unwrap();
        assert_eq!(spec.types.len(), 2);
        assert_eq!(spec.types["ADT^A04"].require[0].min, 1);
        assert_eq!(spec.types["ORU^R01"].require[0].min, 2);
    }

    #[test]
    fn test_validation_spec_rejects_bad_tag() {
        let json = r#"{ "ADT^A04": { "require": [ { "segment": "PIDX" } ] } }"#;
        assert!(ValidationSpec::from_json(json).is_err());
    }
}
