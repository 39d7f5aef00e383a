//! Field addressing and resolution.
//!
//! Addresses use the compact textual form
//! `SEG[occurrence]-FIELD[repetition].COMPONENT.SUBCOMPONENT`, where
//! everything past the field index is optional: `PID-3`, `PID-5.1`,
//! `OBX[2]-5`, `PID-3[2].1.2`.

use crate::error::MinatoError;
use crate::message::Message;
use serde::de::{self, Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Address of a value inside a message.
///
/// Omitting component, subcomponent and repetition addresses the raw
/// field text; a component index without a repetition index addresses
/// the first repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAddress {
    pub segment: String,
    /// 1-based occurrence of the segment tag.
    pub occurrence: usize,
    /// 1-based field index; index 0 (the tag) is not addressable.
    pub field: usize,
    pub repetition: Option<usize>,
    pub component: Option<usize>,
    pub subcomponent: Option<usize>,
}

impl FieldAddress {
    pub fn new(segment: impl Into<String>, field: usize) -> Self {
        Self {
            segment: segment.into(),
            occurrence: 1,
            field,
            repetition: None,
            component: None,
            subcomponent: None,
        }
    }

    pub fn with_occurrence(mut self, occurrence: usize) -> Self {
        self.occurrence = occurrence;
        self
    }

    pub fn with_repetition(mut self, repetition: usize) -> Self {
        self.repetition = Some(repetition);
        self
    }

    pub fn with_component(mut self, component: usize) -> Self {
        self.component = Some(component);
        self
    }

    pub fn with_subcomponent(mut self, subcomponent: usize) -> Self {
        self.subcomponent = Some(subcomponent);
        self
    }
}

impl FromStr for FieldAddress {
    type Err = MinatoError;

    fn from_str(s: &str) -> Result<Self, MinatoError> {
        let bad = || MinatoError::Configuration(format!("invalid field address '{s}'"));

        let (segment_part, field_part) = s.split_once('-').ok_or_else(bad)?;
        let (segment, occurrence) = split_indexed(segment_part).ok_or_else(bad)?;
        if segment.len() != 3 || !segment.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(bad());
        }

        let mut dotted = field_part.split('.');
        let (field_text, repetition) =
            split_indexed(dotted.next().ok_or_else(bad)?).ok_or_else(bad)?;
        let field: usize = field_text.parse().map_err(|_| bad())?;

        let component = dotted
            .next()
            .map(str::parse::<usize>)
            .transpose()
            .map_err(|_| bad())?;
        let subcomponent = dotted
            .next()
            .map(str::parse::<usize>)
            .transpose()
            .map_err(|_| bad())?;
        if dotted.next().is_some() {
            return Err(bad());
        }

        // All indices are 1-based.
        if field == 0
            || occurrence == Some(0)
            || repetition == Some(0)
            || component == Some(0)
            || subcomponent == Some(0)
        {
            return Err(bad());
        }

        Ok(Self {
            segment: segment.to_string(),
            occurrence: occurrence.unwrap_or(1),
            field,
            repetition,
            component,
            subcomponent,
        })
    }
}

/// `"PID[2]"` → `("PID", Some(2))`; `"PID"` → `("PID", None)`.
fn split_indexed(part: &str) -> Option<(&str, Option<usize>)> {
    match part.find('[') {
        None => Some((part, None)),
        Some(open) if part.ends_with(']') => {
            let index = part[open + 1..part.len() - 1].parse().ok()?;
            Some((&part[..open], Some(index)))
        }
        Some(_) => None,
    }
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segment)?;
        if self.occurrence != 1 {
            write!(f, "[{}]", self.occurrence)?;
        }
        write!(f, "-{}", self.field)?;
        if let Some(repetition) = self.repetition {
            write!(f, "[{repetition}]")?;
        }
        if let Some(component) = self.component {
            write!(f, ".{component}")?;
            if let Some(subcomponent) = self.subcomponent {
                write!(f, ".{subcomponent}")?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for FieldAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Resolve an address against a message.
///
/// Returns the addressed text, or `None` for any out-of-range segment
/// occurrence, field, repetition, component or subcomponent — absence
/// is an expected outcome, never an error. An address with no
/// substructure indices yields the raw field text verbatim, embedded
/// separators included.
pub fn resolve<'m>(message: &'m Message, address: &FieldAddress) -> Option<&'m str> {
    let segment = message.segment(&address.segment, address.occurrence)?;
    let raw = segment.field(address.field)?;

    if address.repetition.is_none() && address.component.is_none() {
        return Some(raw);
    }

    let separators = message.separators();
    let repetition = nth_part(raw, separators.repetition, address.repetition.unwrap_or(1))?;
    let Some(component) = address.component else {
        return Some(repetition);
    };
    let component = nth_part(repetition, separators.component, component)?;
    let Some(subcomponent) = address.subcomponent else {
        return Some(component);
    };
    nth_part(component, separators.subcomponent, subcomponent)
}

fn nth_part(text: &str, separator: char, index: usize) -> Option<&str> {
    if index == 0 {
        return None;
    }
    text.split(separator).nth(index - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MSH|^~\\&|App|Fac|RApp|RFac|202501011230||ADT^A04|MSG1|P|2.5\rPID|1||12345^^^Hospital^MR~67890^^^Clinic^MR||Doe^John&Henry||19800101|M\rOBX|1|NM|8867-4^Heart rate^LN||72";

    fn sample() -> Message {
        Message::parse(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_bare_field() {
        let address: FieldAddress = "PID-3".parse().unwrap();
        assert_eq!(address, FieldAddress::new("PID", 3));
    }

    #[test]
    fn test_parse_full_form() {
        let address: FieldAddress = "PID[2]-3[4].1.2".parse().unwrap();
        assert_eq!(
            address,
            FieldAddress::new("PID", 3)
                .with_occurrence(2)
                .with_repetition(4)
                .with_component(1)
                .with_subcomponent(2)
        );
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["PID-3", "PID-5.1", "OBX[2]-5", "PID-3[2].1.2", "MSH-9.1"] {
            let address: FieldAddress = text.parse().unwrap();
            assert_eq!(address.to_string(), text);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["PID", "PID-0", "PID-3.0", "PIDX-3", "PID-3.1.2.3", "PID-a", "PID[]-3"] {
            assert!(text.parse::<FieldAddress>().is_err(), "accepted '{text}'");
        }
    }

    #[test]
    fn test_resolve_raw_field_keeps_separators() {
        let message = sample();
        let address = FieldAddress::new("PID", 3);
        assert_eq!(
            resolve(&message, &address),
            Some("12345^^^Hospital^MR~67890^^^Clinic^MR")
        );
    }

    #[test]
    fn test_resolve_components() {
        let message = sample();
        assert_eq!(
            resolve(&message, &FieldAddress::new("PID", 3).with_component(1)),
            Some("12345")
        );
        assert_eq!(
            resolve(&message, &FieldAddress::new("PID", 3).with_component(4)),
            Some("Hospital")
        );
    }

    #[test]
    fn test_resolve_repetitions() {
        let message = sample();
        let second = FieldAddress::new("PID", 3).with_repetition(2);
        assert_eq!(resolve(&message, &second), Some("67890^^^Clinic^MR"));
        assert_eq!(
            resolve(&message, &second.clone().with_component(4)),
            Some("Clinic")
        );
    }

    #[test]
    fn test_resolve_subcomponents() {
        let message = sample();
        let address = FieldAddress::new("PID", 5).with_component(2).with_subcomponent(2);
        assert_eq!(resolve(&message, &address), Some("Henry"));
    }

    #[test]
    fn test_bare_field_collapses_to_scalar() {
        let message = sample();
        let address = FieldAddress::new("OBX", 5).with_component(1).with_subcomponent(1);
        assert_eq!(resolve(&message, &address), Some("72"));
    }

    #[test]
    fn test_out_of_range_is_absent_not_error() {
        let message = sample();
        assert_eq!(resolve(&message, &FieldAddress::new("IN1", 2)), None);
        assert_eq!(
            resolve(&message, &FieldAddress::new("PID", 3).with_occurrence(2)),
            None
        );
        assert_eq!(resolve(&message, &FieldAddress::new("PID", 99)), None);
        assert_eq!(
            resolve(&message, &FieldAddress::new("PID", 3).with_component(99)),
            None
        );
        assert_eq!(
            resolve(&message, &FieldAddress::new("PID", 3).with_repetition(9)),
            None
        );
        assert_eq!(
            resolve(
                &message,
                &FieldAddress::new("PID", 5).with_component(1).with_subcomponent(9)
            ),
            None
        );
    }

    #[test]
    fn test_resolve_never_mutates() {
        let message = sample();
        let before = message.render();
        let _ = resolve(&message, &FieldAddress::new("PID", 3).with_component(2));
        let _ = resolve(&message, &FieldAddress::new("ZZZ", 1));
        assert_eq!(message.render(), before);
    }
}
