//! Transactional FHIR Bundle assembly.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleEntry {
    pub resource: Value,
    pub request: BundleRequest,
}

/// Intended write semantics for one entry.
#[derive(Debug, Clone, Serialize)]
pub struct BundleRequest {
    pub method: String,
    pub url: String,
}

impl BundleRequest {
    fn create(resource_type: &str) -> Self {
        Self {
            method: "POST".to_string(),
            url: resource_type.to_string(),
        }
    }

    fn update(reference: &str) -> Self {
        Self {
            method: "PUT".to_string(),
            url: reference.to_string(),
        }
    }
}

/// Assemble the transaction Bundle.
///
/// The Patient entry is always present. Coverage is included only when
/// it carries at least one populated identifying field; a Coverage
/// mapped entirely from absent source fields is dropped, not emitted as
/// noise. Observations follow in input order. With a store-assigned
/// `patient_ref`, Coverage and Observations reference it and the
/// Patient entry becomes an update against that reference.
pub fn assemble(
    patient: Value,
    coverage: Value,
    observations: Vec<Value>,
    patient_ref: Option<&str>,
) -> Bundle {
    let mut entry = Vec::with_capacity(observations.len() + 2);

    let request = match patient_ref {
        Some(reference) => BundleRequest::update(reference),
        None => BundleRequest::create("Patient"),
    };
    entry.push(BundleEntry {
        resource: patient,
        request,
    });

    if coverage_has_identity(&coverage) {
        let mut coverage = coverage;
        if let Some(reference) = patient_ref {
            set_reference(&mut coverage, "beneficiary", reference);
        }
        entry.push(BundleEntry {
            resource: coverage,
            request: BundleRequest::create("Coverage"),
        });
    }

    for mut observation in observations {
        if let Some(reference) = patient_ref {
            set_reference(&mut observation, "subject", reference);
        }
        entry.push(BundleEntry {
            resource: observation,
            request: BundleRequest::create("Observation"),
        });
    }

    Bundle {
        resource_type: "Bundle".to_string(),
        bundle_type: "transaction".to_string(),
        entry,
    }
}

/// A Coverage counts as populated when it has an identifier with a
/// value, a subscriber id, or a payor.
pub fn coverage_has_identity(coverage: &Value) -> bool {
    let has_identifier = coverage
        .get("identifier")
        .and_then(Value::as_array)
        .is_some_and(|identifiers| {
            identifiers.iter().any(|identifier| {
                identifier
                    .get("value")
                    .and_then(Value::as_str)
                    .is_some_and(|value| !value.is_empty())
            })
        });
    let populated = |key: &str| coverage.get(key).is_some_and(|value| !value.is_null());
    has_identifier || populated("subscriberId") || populated("payor")
}

fn set_reference(resource: &mut Value, field: &str, reference: &str) {
    if let Some(map) = resource.as_object_mut() {
        map.insert(
            field.to_string(),
            serde_json::json!({ "reference": reference }),
        );
    }
}
