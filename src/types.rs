//! Core types for the segment generation pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// One flat form submission: field name to value.
///
/// The record is the source of truth for one submission and is never mutated
/// in place; transformations produce a new record. Absent keys and empty
/// values are both treated as "no value" by the mapper.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormRecord(HashMap<String, String>);

impl FormRecord {
    /// Create a record from raw key/value pairs
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self(fields)
    }

    /// Look up a field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Number of fields in the record
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Produce a new record with derived fields merged in.
    ///
    /// Derived entries overwrite same-named submission fields, matching how
    /// producer constants are stamped onto every packet. The receiver is left
    /// untouched.
    pub fn with_derived(&self, derived: &HashMap<String, String>) -> FormRecord {
        let mut fields = self.0.clone();
        for (key, value) in derived {
            fields.insert(key.clone(), value.clone());
        }
        FormRecord(fields)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for FormRecord {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// How a target field consumes its value.
///
/// Resolved once when the segment mapping is loaded; never re-derived per
/// value during encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-text field (default)
    #[default]
    Text,
    /// Checkbox; affirmative values canonicalize to the "Yes" export token
    Checkbox,
    /// Dropdown / combo box
    Dropdown,
    /// Radio button group
    RadioGroup,
}

/// A resolved (target field, normalized value) pair ready for encoding.
///
/// The value is trimmed, line breaks are collapsed, and affirmative tokens
/// are canonicalized; format-reserved escaping is applied by each encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldAssignment {
    /// Target field name inside the template
    pub target: String,
    /// Normalized value
    pub value: String,
    /// How the target consumes the value
    pub kind: FieldKind,
}

/// Document-description format fed to the filling engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocFormat {
    /// Primary compact line-oriented format
    Fdf,
    /// Structurally isolated XML fallback format
    Xfdf,
}

impl std::fmt::Display for DocFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocFormat::Fdf => write!(f, "fdf"),
            DocFormat::Xfdf => write!(f, "xfdf"),
        }
    }
}

/// Machine-readable failure classification recorded per segment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Mapping file missing or unparsable
    MappingLoad,
    /// Template file missing (terminal, no fallback attempted)
    TemplateNotFound,
    /// Engine binary could not be started
    EngineSpawn,
    /// Engine exited non-zero on the last attempted format
    EngineExit,
    /// Engine timed out on the last attempted format
    EngineTimeout,
}

/// Per-segment failure detail
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationFailure {
    /// The segment that failed
    pub segment: String,
    /// Failure classification
    pub error_kind: FailureKind,
    /// Human-readable detail (captured stderr, parse error, ...)
    pub detail: String,
}

/// Outcome of generating one segment
#[derive(Clone, Debug)]
pub enum GenerationResult {
    /// The segment produced an output artifact
    Filled {
        /// The segment that was filled
        segment: String,
        /// Path of the flattened output inside the working directory
        artifact_path: PathBuf,
        /// Display filename for the artifact
        filename: String,
        /// Which format the successful attempt used
        format_used: DocFormat,
    },
    /// The segment failed; the batch continues
    Failed(GenerationFailure),
}

impl GenerationResult {
    /// Segment name regardless of outcome
    pub fn segment(&self) -> &str {
        match self {
            GenerationResult::Filled { segment, .. } => segment,
            GenerationResult::Failed(failure) => &failure.segment,
        }
    }

    /// Whether this segment reached the Filled state
    pub fn is_filled(&self) -> bool {
        matches!(self, GenerationResult::Filled { .. })
    }
}

/// Inbound batch request: one form record plus the segments to generate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    /// The flat form submission
    pub form_record: FormRecord,
    /// Segment names, in the order results should be returned
    pub segments: Vec<String>,
}

/// Outbound batch report for the mail dispatch path
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    /// Whether the generated documents were handed to the transport
    pub dispatched: bool,
    /// Segments that produced an artifact, in request order
    pub succeeded: Vec<String>,
    /// Segments that failed, with classification and detail
    pub failed: Vec<GenerationFailure>,
    /// Transport-assigned message identifier, when mail dispatch succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// An email message handed to the mail transport
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailMessage {
    /// Recipient addresses
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub body_html: String,
}

/// One attachment handed to the mail transport
#[derive(Clone, Debug)]
pub struct Attachment {
    /// Display filename
    pub filename: String,
    /// File content
    pub bytes: Vec<u8>,
}

/// Pipeline events emitted over the broadcast channel
///
/// Emitted best-effort; send failures (no subscribers) are ignored.
#[derive(Clone, Debug)]
pub enum Event {
    /// Generation started for a segment
    SegmentStarted {
        /// The segment being generated
        segment: String,
    },
    /// A segment produced an artifact
    SegmentFilled {
        /// The segment that was filled
        segment: String,
        /// Which format succeeded
        format_used: DocFormat,
    },
    /// A segment failed; the batch continues
    SegmentFailed {
        /// The segment that failed
        segment: String,
        /// Failure classification
        error_kind: FailureKind,
    },
    /// The whole batch finished generating
    BatchComplete {
        /// Number of segments that were filled
        succeeded: usize,
        /// Number of segments that failed
        failed: usize,
    },
    /// Generated documents were dispatched
    Dispatched {
        /// Number of documents dispatched
        count: usize,
    },
}
