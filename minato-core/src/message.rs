//! HL7 v2 message model and tokenizer.
//!
//! Segments and fields are split eagerly; repetition, component and
//! subcomponent substructure stays raw and is split on read (see
//! [`crate::address`]), using the separators the message itself declares
//! in MSH-2.

use crate::error::{MinatoError, Result};
use std::collections::HashMap;

/// The special characters declared by an HL7 v2 message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

/// One line of an HL7 message: a 3-character tag plus raw fields.
///
/// Fields are 1-indexed with index 0 holding the tag. For MSH, field 1
/// is the literal field separator and field 2 the encoding characters,
/// so MSH-9 addresses the message type exactly as the standard numbers
/// it.
#[derive(Debug, Clone)]
pub struct Segment {
    fields: Vec<String>,
}

impl Segment {
    pub fn tag(&self) -> &str {
        &self.fields[0]
    }

    /// Raw text of field `index` (1-based). `None` when out of range.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len().saturating_sub(1)
    }

    fn render(&self, separators: &Separators) -> String {
        if self.tag() == "MSH" {
            // fields[1] is the separator itself; joining would double it
            let mut out = String::from("MSH");
            for field in &self.fields[2..] {
                out.push(separators.field);
                out.push_str(field);
            }
            out
        } else {
            self.fields.join(&separators.field.to_string())
        }
    }
}

/// A parsed, immutable HL7 v2 message.
///
/// Segments keep their input order; repeated tags are additionally
/// addressable by 1-based occurrence.
#[derive(Debug, Clone)]
pub struct Message {
    separators: Separators,
    segments: Vec<Segment>,
    occurrences: HashMap<String, Vec<usize>>,
}

impl Message {
    /// Parse raw message text.
    ///
    /// Fails when the text does not start with an MSH segment, declares
    /// no field separator, or contains a segment whose tag is not three
    /// alphanumeric characters. Segment terminators may be CR, LF or
    /// CRLF; blank lines are dropped.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.split(['\r', '\n']).filter(|line| !line.is_empty());

        let header = lines
            .next()
            .ok_or_else(|| MinatoError::MalformedMessage("empty message".to_string()))?;
        if !header.starts_with("MSH") {
            return Err(MinatoError::MalformedMessage(
                "message must start with an MSH segment".to_string(),
            ));
        }

        let field = header[3..].chars().next().ok_or_else(|| {
            MinatoError::MalformedMessage("MSH declares no field separator".to_string())
        })?;

        // MSH-2: component, repetition, escape, subcomponent, in that
        // fixed order. Missing trailing characters fall back to the
        // standard `^~\&`.
        let after = &header[3 + field.len_utf8()..];
        let encoding = after.split(field).next().unwrap_or("");
        let defaults = Separators::default();
        let mut declared = encoding.chars();
        let separators = Separators {
            field,
            component: declared.next().unwrap_or(defaults.component),
            repetition: declared.next().unwrap_or(defaults.repetition),
            escape: declared.next().unwrap_or(defaults.escape),
            subcomponent: declared.next().unwrap_or(defaults.subcomponent),
        };

        let mut msh_fields = vec!["MSH".to_string(), field.to_string()];
        msh_fields.extend(after.split(field).map(str::to_string));
        let mut segments = vec![Segment { fields: msh_fields }];

        for line in lines {
            let fields: Vec<String> = line.split(field).map(str::to_string).collect();
            let tag = &fields[0];
            if tag.len() != 3 || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(MinatoError::MalformedMessage(format!(
                    "invalid segment tag '{tag}'"
                )));
            }
            segments.push(Segment { fields });
        }

        let mut occurrences: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, segment) in segments.iter().enumerate() {
            occurrences
                .entry(segment.tag().to_string())
                .or_default()
                .push(index);
        }

        Ok(Self {
            separators,
            segments,
            occurrences,
        })
    }

    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    /// All segments, in input order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segment by tag and 1-based occurrence.
    pub fn segment(&self, tag: &str, occurrence: usize) -> Option<&Segment> {
        if occurrence == 0 {
            return None;
        }
        let index = *self.occurrences.get(tag)?.get(occurrence - 1)?;
        self.segments.get(index)
    }

    /// How many times `tag` occurs in the message.
    pub fn segment_count(&self, tag: &str) -> usize {
        self.occurrences.get(tag).map_or(0, Vec::len)
    }

    /// Re-serialize with the original separators, CR-terminated lines.
    /// Lossless for every field present in the input.
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.render(&self.separators))
            .collect::<Vec<_>>()
            .join("\r")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MSH|^~\\&|SendingApp|SendingFac|ReceivingApp|ReceivingFac|202501011230||ADT^A04|MSG00001|P|2.5\rPID|1||12345^^^Hospital^MR||Doe^John||19800101|M\rOBX|1|NM|8867-4^Heart rate^LN||72|bpm\rOBX|2|ST|NOTE^Comment||stable|";

    #[test]
    fn test_parse_reads_declared_separators() {
        let message = Message::parse(SAMPLE).unwrap();
        let separators = message.separators();
        assert_eq!(separators.field, '|');
        assert_eq!(separators.component, '^');
        assert_eq!(separators.repetition, '~');
        assert_eq!(separators.escape, '\\');
        assert_eq!(separators.subcomponent, '&');
    }

    #[test]
    fn test_parse_nonstandard_separators() {
        let message = Message::parse("MSH#*!?$#App#Fac\rPID#1##A*B").unwrap();
        assert_eq!(message.separators().field, '#');
        assert_eq!(message.separators().component, '*');
        assert_eq!(message.separators().repetition, '!');
        assert_eq!(message.separators().subcomponent, '$');
        assert_eq!(message.segment("PID", 1).unwrap().field(3), Some("A*B"));
    }

    #[test]
    fn test_msh_field_numbering() {
        let message = Message::parse(SAMPLE).unwrap();
        let msh = message.segment("MSH", 1).unwrap();
        assert_eq!(msh.field(1), Some("|"));
        assert_eq!(msh.field(2), Some("^~\\&"));
        assert_eq!(msh.field(9), Some("ADT^A04"));
        assert_eq!(msh.field(12), Some("2.5"));
    }

    #[test]
    fn test_segment_occurrences_keep_order() {
        let message = Message::parse(SAMPLE).unwrap();
        assert_eq!(message.segment_count("OBX"), 2);
        assert_eq!(message.segment("OBX", 1).unwrap().field(5), Some("72"));
        assert_eq!(message.segment("OBX", 2).unwrap().field(5), Some("stable"));
        assert!(message.segment("OBX", 3).is_none());
        assert!(message.segment("OBX", 0).is_none());
    }

    #[test]
    fn test_missing_msh_rejected() {
        let err = Message::parse("PID|1||12345").unwrap_err();
        assert!(matches!(err, MinatoError::MalformedMessage(_)));
    }

    #[test]
    fn test_no_field_separator_rejected() {
        let err = Message::parse("MSH").unwrap_err();
        assert!(matches!(err, MinatoError::MalformedMessage(_)));
    }

    #[test]
    fn test_bad_segment_tag_rejected() {
        let err = Message::parse("MSH|^~\\&|App\rPIDX|1").unwrap_err();
        assert!(matches!(err, MinatoError::MalformedMessage(_)));
    }

    #[test]
    fn test_empty_lines_dropped() {
        let message = Message::parse("MSH|^~\\&|App\r\n\r\nPID|1\r\n").unwrap();
        assert_eq!(message.segments().len(), 2);
    }

    #[test]
    fn test_render_round_trip() {
        let message = Message::parse(SAMPLE).unwrap();
        assert_eq!(message.render(), SAMPLE);
    }

    #[test]
    fn test_render_round_trip_after_reparse() {
        let message = Message::parse(SAMPLE).unwrap();
        let reparsed = Message::parse(&message.render()).unwrap();
        assert_eq!(reparsed.render(), SAMPLE);
    }
}
