//! Pipe-delimited message value
//!
//! A [`Message`] is a list of segments, each a list of `|`-separated fields;
//! a field may carry `^`-separated components. Fields are addressed with a
//! `SEG-field.component` path such as `MSH-10.1`.
//!
//! Path numbering follows HL7 convention: for `MSH` the field separator
//! itself counts as field 1, so `MSH-2` is the encoding characters and
//! `MSH-10` is the message control id. All other segments count fields from
//! 1 starting after the segment name.

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

const FIELD_SEP: char = '|';
const COMPONENT_SEP: char = '^';

/// One parsed segment: `fields[0]` is the segment name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    fields: Vec<String>,
}

impl Segment {
    fn parse(line: &str) -> Self {
        Self {
            fields: line.split(FIELD_SEP).map(str::to_owned).collect(),
        }
    }

    fn name(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields.join("|"))
    }
}

/// A parsed `SEG-field` or `SEG-field.component` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// Three-letter segment name (e.g. `MSH`, `PID`)
    pub segment: String,
    /// 1-based field number in HL7 convention
    pub field: usize,
    /// Optional 1-based component number
    pub component: Option<usize>,
}

impl FromStr for FieldPath {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ProtocolError::InvalidPath(s.to_owned());

        let (segment, rest) = s.split_once('-').ok_or_else(invalid)?;
        if segment.is_empty() || rest.is_empty() {
            return Err(invalid());
        }

        let (field, component) = match rest.split_once('.') {
            Some((f, c)) => (f, Some(c.parse::<usize>().map_err(|_| invalid())?)),
            None => (rest, None),
        };
        let field = field.parse::<usize>().map_err(|_| invalid())?;
        if field == 0 || component == Some(0) {
            return Err(invalid());
        }

        Ok(Self {
            segment: segment.to_owned(),
            field,
            component,
        })
    }
}

/// An HL7-style message: segments split on line breaks, fields on `|`.
///
/// The engine treats this as an opaque value with `get`/`set` accessors and
/// a parse/render round trip; pipeline filter and transform steps receive it
/// by reference or by value respectively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    segments: Vec<Segment>,
}

impl Message {
    /// Parse a message from its pipe-delimited text form.
    ///
    /// Segments may be separated by `\r`, `\n`, or `\r\n`; empty lines are
    /// skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let segments: Vec<Segment> = text
            .split(['\r', '\n'])
            .filter(|line| !line.is_empty())
            .map(Segment::parse)
            .collect();

        if segments.is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }
        Ok(Self { segments })
    }

    /// Number of segments in the message.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Get the value at `path` (e.g. `"MSH-10.1"`).
    ///
    /// Returns `Ok(None)` when the addressed segment/field/component does
    /// not exist; `Err` only for an unparsable path.
    pub fn get(&self, path: &str) -> Result<Option<&str>> {
        let path: FieldPath = path.parse()?;
        Ok(self.field(&path))
    }

    /// Get the value at an already-parsed path.
    pub fn field(&self, path: &FieldPath) -> Option<&str> {
        let segment = self.segments.iter().find(|s| s.name() == path.segment)?;
        let field = segment
            .fields
            .get(Self::field_index(&path.segment, path.field))?;

        match path.component {
            None => Some(field.as_str()),
            // A field without separators is its own first component.
            Some(1) if !field.contains(COMPONENT_SEP) => Some(field.as_str()),
            Some(c) => field.split(COMPONENT_SEP).nth(c - 1),
        }
    }

    /// Set the value at `path`, growing the segment with empty fields as
    /// needed. Fails only for an unparsable path or a segment that does not
    /// exist in the message.
    pub fn set(&mut self, path: &str, value: &str) -> Result<()> {
        let parsed: FieldPath = path.parse()?;
        let index = Self::field_index(&parsed.segment, parsed.field);

        let segment = self
            .segments
            .iter_mut()
            .find(|s| s.name() == parsed.segment)
            .ok_or_else(|| ProtocolError::InvalidPath(path.to_owned()))?;

        if segment.fields.len() <= index {
            segment.fields.resize(index + 1, String::new());
        }

        match parsed.component {
            None => segment.fields[index] = value.to_owned(),
            Some(1) if !segment.fields[index].contains(COMPONENT_SEP) => {
                segment.fields[index] = value.to_owned();
            }
            Some(c) => {
                let mut components: Vec<String> = segment.fields[index]
                    .split(COMPONENT_SEP)
                    .map(str::to_owned)
                    .collect();
                if components.len() < c {
                    components.resize(c, String::new());
                }
                components[c - 1] = value.to_owned();
                segment.fields[index] = components.join("^");
            }
        }
        Ok(())
    }

    /// The message control id (`MSH-10.1`), if present.
    pub fn control_id(&self) -> Option<&str> {
        self.field(&FieldPath {
            segment: "MSH".into(),
            field: 10,
            component: Some(1),
        })
        .filter(|id| !id.is_empty())
    }

    /// The message type code (`MSH-9.1`), if present.
    pub fn message_type(&self) -> Option<&str> {
        self.field(&FieldPath {
            segment: "MSH".into(),
            field: 9,
            component: Some(1),
        })
        .filter(|t| !t.is_empty())
    }

    /// Map HL7 field numbering onto the field vector. For `MSH`, field 1 is
    /// the separator itself, so `MSH-n` addresses `fields[n - 1]`.
    fn field_index(segment: &str, field: usize) -> usize {
        if segment == "MSH" {
            field - 1
        } else {
            field
        }
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
