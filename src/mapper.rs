//! Field mapping: form record + segment mapping -> field assignments
//!
//! The mapper is a pure leaf: it never touches the filesystem after the
//! mapping is loaded and it never fails. Malformed mapping entries are
//! dropped with a warning so partial mapping corruption degrades to missing
//! fields instead of a dead segment.

use crate::error::{Error, Result};
use crate::types::{FieldAssignment, FieldKind, FormRecord};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Canonical export token for affirmative checkbox values
const YES_TOKEN: &str = "Yes";

/// One resolved mapping entry: a form field fanning out to one or more
/// template target fields, with the target kind fixed at load time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingEntry {
    /// The form field supplying the value
    pub form_field: String,
    /// Target field names inside the template, in mapping-file order
    pub targets: Vec<String>,
    /// How the targets consume the value
    pub kind: FieldKind,
}

/// Extended mapping-entry value: `{ "fields": [...], "kind": "checkbox" }`
///
/// Plain string and array entries remain the wire format; this object form
/// lets a mapping pin the field kind instead of having it re-derived at
/// encode time.
#[derive(Debug, Deserialize)]
struct DetailedTarget {
    fields: Vec<String>,
    #[serde(default)]
    kind: FieldKind,
}

/// A segment's field-mapping table, loaded from its JSON mapping file.
///
/// Loaded lazily once per segment per request and never cached across
/// requests, so mapping edits on disk take effect immediately.
#[derive(Clone, Debug, Default)]
pub struct SegmentMapping {
    entries: Vec<MappingEntry>,
}

impl SegmentMapping {
    /// Load and parse the mapping file for a segment.
    ///
    /// A missing or unparsable file is a `MappingLoad` error; individual
    /// malformed entries inside a parsable file are dropped with a warning.
    pub async fn load(path: &Path, segment: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::MappingLoad {
                segment: segment.to_string(),
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| Error::MappingLoad {
                segment: segment.to_string(),
                reason: format!("failed to parse {}: {}", path.display(), e),
            })?;

        Self::from_value(value, segment)
    }

    /// Build a mapping from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value, segment: &str) -> Result<Self> {
        let object: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(value).map_err(|e| Error::MappingLoad {
                segment: segment.to_string(),
                reason: format!("mapping is not a JSON object: {}", e),
            })?;

        let mut entries = Vec::with_capacity(object.len());
        for (form_field, target) in object {
            match resolve_target(&target) {
                Some((targets, kind)) => entries.push(MappingEntry {
                    form_field,
                    targets,
                    kind,
                }),
                None => {
                    // Partial mapping corruption degrades to a skipped entry
                    warn!(
                        segment = %segment,
                        form_field = %form_field,
                        "dropping malformed mapping entry (expected string, array, or {{fields, kind}} object)"
                    );
                }
            }
        }

        debug!(
            segment = %segment,
            entry_count = entries.len(),
            "loaded segment mapping"
        );

        Ok(Self { entries })
    }

    /// The resolved entries, in deterministic (form-field) order
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Number of mapping entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve one mapping-file value into (targets, kind), or None if malformed
fn resolve_target(value: &serde_json::Value) -> Option<(Vec<String>, FieldKind)> {
    match value {
        serde_json::Value::String(target) => Some((vec![target.clone()], FieldKind::Text)),
        serde_json::Value::Array(items) => {
            let targets: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect();
            // An array containing non-strings is malformed as a whole
            targets.filter(|t| !t.is_empty()).map(|t| (t, FieldKind::Text))
        }
        serde_json::Value::Object(_) => {
            let detailed: DetailedTarget = serde_json::from_value(value.clone()).ok()?;
            if detailed.fields.is_empty() {
                return None;
            }
            Some((detailed.fields, detailed.kind))
        }
        _ => None,
    }
}

/// Map a form record through a segment mapping into field assignments.
///
/// Entries whose form value is absent or empty emit nothing: the filling
/// engine must receive no instruction for that field rather than an explicit
/// empty value, since the two are not equivalent for checkbox and dropdown
/// fields. Fan-out targets each receive the identical normalized value.
pub fn map_record(record: &FormRecord, mapping: &SegmentMapping) -> Vec<FieldAssignment> {
    let mut assignments = Vec::new();

    for entry in mapping.entries() {
        let raw = match record.get(&entry.form_field) {
            Some(value) => value,
            None => continue,
        };

        let mut value = normalize_value(raw);
        if value.is_empty() {
            continue;
        }

        // Checkbox targets accept the wider affirmative set ("y", "true", "1")
        if entry.kind == FieldKind::Checkbox && is_affirmative(&value) {
            value = YES_TOKEN.to_string();
        }

        for target in &entry.targets {
            assignments.push(FieldAssignment {
                target: target.clone(),
                value: value.clone(),
                kind: entry.kind,
            });
        }
    }

    assignments
}

/// Normalize a raw form value: trim, collapse embedded line breaks to a
/// single space, then canonicalize affirmative tokens.
///
/// Canonicalization compares the trimmed, unescaped value case-insensitively;
/// format-reserved escaping is applied later by each encoder.
pub fn normalize_value(raw: &str) -> String {
    let trimmed = raw.trim();

    let mut collapsed = String::with_capacity(trimmed.len());
    let mut in_break = false;
    for ch in trimmed.chars() {
        if ch == '\n' || ch == '\r' {
            if !in_break {
                collapsed.push(' ');
                in_break = true;
            }
        } else {
            collapsed.push(ch);
            in_break = false;
        }
    }

    if collapsed.eq_ignore_ascii_case("yes") {
        return YES_TOKEN.to_string();
    }

    collapsed
}

/// Whether a normalized value counts as affirmative for checkbox targets
fn is_affirmative(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("y")
        || value.eq_ignore_ascii_case("true")
        || value == "1"
}
