//! The mapping engine: interprets a [`MappingSpec`] against a parsed
//! message to produce Patient, Coverage and Observation content.
//!
//! The engine never fails on a single missing or malformed field value.
//! Absent and empty values skip their FHIR path entirely, so the output
//! never asserts information the source did not carry.

use crate::address::{FieldAddress, resolve};
use crate::message::Message;
use crate::spec::{MappingSpec, ObservationRules, ObxScan, PathRule, Rule};
use crate::transform::{self, TransformContext};
use serde_json::{Map, Value, json};

/// Time source for the optional `effectiveDateTime` default.
///
/// Injectable so that mapping is reproducible under test even when the
/// spec opts into stamping "now".
pub trait Clock {
    /// Now as a FHIR instant (UTC).
    fn now(&self) -> String;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

/// A clock pinned to one instant.
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now(&self) -> String {
        self.0.clone()
    }
}

/// Output of [`map`].
#[derive(Debug, Clone, PartialEq)]
pub struct MappedResources {
    pub patient: Value,
    pub coverage: Value,
    pub observations: Vec<Value>,
}

/// Map a validated message through the spec.
pub fn map(message: &Message, spec: &MappingSpec, clock: &dyn Clock) -> MappedResources {
    MappedResources {
        patient: map_resource("Patient", &spec.patient, message, spec),
        coverage: map_resource("Coverage", &spec.coverage, message, spec),
        observations: map_observations(message, &spec.observation, clock),
    }
}

fn map_resource(
    resource_type: &str,
    rules: &[PathRule],
    message: &Message,
    spec: &MappingSpec,
) -> Value {
    let mut resource = json!({ "resourceType": resource_type });
    for entry in rules {
        if let Some(value) = evaluate(&entry.rule, message, spec) {
            write_path(&mut resource, &entry.path, value);
        }
    }
    resource
}

/// Compute a rule's value; `None` means the path is skipped.
fn evaluate(rule: &Rule, message: &Message, spec: &MappingSpec) -> Option<Value> {
    match rule {
        Rule::Literal { literal } => {
            (!literal.is_empty()).then(|| Value::String(literal.clone()))
        }
        Rule::Sourced {
            source,
            transform,
            system,
        } => {
            let raw = resolve(message, source);
            match transform {
                Some(transform) => {
                    let context = TransformContext {
                        component: message.separators().component,
                        default_system: system.as_deref().unwrap_or(&spec.options.mrn_system),
                    };
                    transform.apply(raw, &context)
                }
                None => raw
                    .filter(|value| !value.is_empty())
                    .map(|value| Value::String(value.to_string())),
            }
        }
    }
}

struct PathStep<'a> {
    key: &'a str,
    index: Option<usize>,
}

fn parse_step(raw: &str) -> PathStep<'_> {
    match raw.find('[') {
        Some(open) if raw.ends_with(']') => PathStep {
            key: &raw[..open],
            index: raw[open + 1..raw.len() - 1].parse().ok(),
        },
        _ => PathStep { key: raw, index: None },
    }
}

/// Write `value` at a dotted, array-indexable FHIR path such as
/// `identifier[0].system` or `name[0].given[0]`, creating intermediate
/// objects and arrays as needed.
fn write_path(target: &mut Value, path: &str, value: Value) {
    let steps: Vec<PathStep<'_>> = path.split('.').map(parse_step).collect();
    write_steps(target, &steps, value);
}

fn write_steps(target: &mut Value, steps: &[PathStep<'_>], value: Value) {
    let Some((step, rest)) = steps.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else { return };
    let slot = map.entry(step.key.to_string()).or_insert(Value::Null);
    let slot = match step.index {
        None => slot,
        Some(index) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            let Value::Array(items) = slot else { return };
            while items.len() <= index {
                items.push(Value::Null);
            }
            &mut items[index]
        }
    };
    write_steps(slot, rest, value);
}

// OBX field indices (HL7 v2 OBX segment).
const OBX_TYPE: usize = 2;
const OBX_CODE: usize = 3;
const OBX_VALUE: usize = 5;
const OBX_UNITS: usize = 6;
const OBX_EFFECTIVE: usize = 14;

fn obx(occurrence: usize, field: usize) -> FieldAddress {
    FieldAddress::new("OBX", field).with_occurrence(occurrence)
}

/// Walk OBX occurrences into Observations, one per occurrence, in
/// input order. OBX-3 is the primary identifying field: an occurrence
/// without it either ends the walk or is skipped, per the spec's scan
/// policy.
fn map_observations(message: &Message, rules: &ObservationRules, clock: &dyn Clock) -> Vec<Value> {
    let mut observations = Vec::new();
    for occurrence in 1..=message.segment_count("OBX") {
        let code = resolve(message, &obx(occurrence, OBX_CODE)).filter(|c| !c.is_empty());
        match code {
            Some(_) => observations.push(build_observation(message, rules, occurrence, clock)),
            None if rules.scan == ObxScan::StopAtGap => break,
            None => {}
        }
    }
    observations
}

fn build_observation(
    message: &Message,
    rules: &ObservationRules,
    occurrence: usize,
    clock: &dyn Clock,
) -> Value {
    let component = |field: usize, index: usize| {
        resolve(message, &obx(occurrence, field).with_component(index))
            .filter(|value| !value.is_empty())
    };

    let mut observation = Map::new();
    observation.insert("resourceType".to_string(), json!("Observation"));
    observation.insert("status".to_string(), json!("final"));
    observation.insert(
        "code".to_string(),
        codeable_concept(
            component(OBX_CODE, 1),
            component(OBX_CODE, 2),
            component(OBX_CODE, 3).or(rules.code_system.as_deref()),
        ),
    );

    let value_type = resolve(message, &obx(occurrence, OBX_TYPE)).unwrap_or("");
    let raw_value = resolve(message, &obx(occurrence, OBX_VALUE)).filter(|value| !value.is_empty());
    match value_type {
        "NM" => {
            if let Some(number) = raw_value.and_then(transform::quantity) {
                let mut quantity = Map::new();
                quantity.insert("value".to_string(), number);
                if let Some(unit) = component(OBX_UNITS, 1) {
                    quantity.insert("unit".to_string(), json!(unit));
                }
                if let Some(system) = component(OBX_UNITS, 3) {
                    quantity.insert("system".to_string(), json!(system));
                }
                observation.insert("valueQuantity".to_string(), Value::Object(quantity));
            }
        }
        "CE" | "CWE" => {
            if raw_value.is_some() {
                observation.insert(
                    "valueCodeableConcept".to_string(),
                    codeable_concept(
                        component(OBX_VALUE, 1),
                        component(OBX_VALUE, 2),
                        component(OBX_VALUE, 3),
                    ),
                );
            }
        }
        _ => {
            if let Some(text) = raw_value {
                observation.insert("valueString".to_string(), json!(text));
            }
        }
    }

    let effective =
        resolve(message, &obx(occurrence, OBX_EFFECTIVE)).and_then(transform::date_time);
    match effective {
        Some(instant) => {
            observation.insert("effectiveDateTime".to_string(), instant);
        }
        None if rules.default_effective_to_now => {
            observation.insert("effectiveDateTime".to_string(), json!(clock.now()));
        }
        None => {}
    }

    Value::Object(observation)
}

fn codeable_concept(code: Option<&str>, display: Option<&str>, system: Option<&str>) -> Value {
    let mut coding = Map::new();
    if let Some(system) = system {
        coding.insert("system".to_string(), json!(system));
    }
    if let Some(code) = code {
        coding.insert("code".to_string(), json!(code));
    }
    if let Some(display) = display {
        coding.insert("display".to_string(), json!(display));
    }

    let mut concept = Map::new();
    if !coding.is_empty() {
        concept.insert("coding".to_string(), json!([Value::Object(coding)]));
    }
    if let Some(display) = display {
        concept.insert("text".to_string(), json!(display));
    }
    Value::Object(concept)
}
