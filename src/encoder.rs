//! Document encoders: field assignments -> engine payload bytes
//!
//! Two structurally distinct formats drive the filling engine. FDF is the
//! primary path because it is byte-compact and the fastest path through the
//! engine; XFDF is the fallback used when the engine rejects the FDF payload
//! (some templates and some value content trip the FDF parser but pass the
//! structural XML path).
//!
//! Both encoders are deterministic total functions over any assignment list,
//! including the empty list.

use crate::types::{DocFormat, FieldAssignment};

/// Serializes an assignment list into one engine payload format.
///
/// The fallback controller walks an ordered list of these, so adding a third
/// format is a new impl, not new control flow.
pub trait DocumentEncoder: Send + Sync {
    /// The format this encoder produces
    fn format(&self) -> DocFormat;

    /// Encode the assignments into payload bytes
    fn encode(&self, assignments: &[FieldAssignment]) -> Vec<u8>;
}

/// The default attempt order: FDF first, XFDF on failure
pub fn default_encoders() -> Vec<Box<dyn DocumentEncoder>> {
    vec![Box::new(FdfEncoder), Box::new(XfdfEncoder)]
}

/// Primary compact format: an FDF envelope with one `/T`/`/V` record per
/// assignment.
pub struct FdfEncoder;

impl DocumentEncoder for FdfEncoder {
    fn format(&self) -> DocFormat {
        DocFormat::Fdf
    }

    fn encode(&self, assignments: &[FieldAssignment]) -> Vec<u8> {
        let mut fdf = String::from("%FDF-1.2\n1 0 obj\n<< /FDF << /Fields [");

        for assignment in assignments {
            fdf.push_str("<< /T (");
            fdf.push_str(&escape_fdf(&assignment.target));
            fdf.push_str(") /V (");
            fdf.push_str(&escape_fdf(&assignment.value));
            fdf.push_str(") >> ");
        }

        fdf.push_str("] >> >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n");
        fdf.into_bytes()
    }
}

/// Escape FDF string delimiters: backslash and parentheses. Line breaks
/// become a single space; the FDF parser treats them as record separators.
fn escape_fdf(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut in_break = false;
    for ch in value.chars() {
        match ch {
            '\\' => {
                escaped.push_str("\\\\");
                in_break = false;
            }
            '(' => {
                escaped.push_str("\\(");
                in_break = false;
            }
            ')' => {
                escaped.push_str("\\)");
                in_break = false;
            }
            '\n' | '\r' => {
                if !in_break {
                    escaped.push(' ');
                    in_break = true;
                }
            }
            _ => {
                escaped.push(ch);
                in_break = false;
            }
        }
    }
    escaped
}

/// Fallback structural format: an XFDF document with one `field` element per
/// assignment, entity-escaped.
pub struct XfdfEncoder;

impl DocumentEncoder for XfdfEncoder {
    fn format(&self) -> DocFormat {
        DocFormat::Xfdf
    }

    fn encode(&self, assignments: &[FieldAssignment]) -> Vec<u8> {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <xfdf xmlns=\"http://ns.adobe.com/xfdf/\" xml:space=\"preserve\">\n\
             <fields>\n",
        );

        for assignment in assignments {
            xml.push_str("<field name=\"");
            xml.push_str(&escape_xml(&assignment.target));
            xml.push_str("\"><value>");
            xml.push_str(&escape_xml(&assignment.value));
            xml.push_str("</value></field>\n");
        }

        xml.push_str("</fields>\n</xfdf>\n");
        xml.into_bytes()
    }
}

/// Standard XML entity escaping
fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
