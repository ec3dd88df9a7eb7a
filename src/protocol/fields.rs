//! Decoded form fields.
//!
//! Fields come from the query string, url-encoded bodies, multipart bodies
//! and raw octet-stream uploads. They live in one insertion-ordered table so
//! query and body parameters coexist; a name collision turns the field into
//! an ordered list.

use bytes::Bytes;

/// A single uploaded attachment from a multipart part or a raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Client-supplied file name; empty for an unnamed raw upload.
    pub filename: String,
    /// Declared content type of the part, if any.
    pub content_type: Option<String>,
    /// Verbatim part data.
    pub data: Bytes,
}

impl Attachment {
    /// Text/binary classification by content-type sniff: anything declared
    /// `text...` (or with no declaration) counts as text.
    pub fn is_text(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.trim_start().to_ascii_lowercase().starts_with("text"),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Attachment(Attachment),
}

/// Insertion-ordered field table.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Text value of a field; first element for a list field.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::List(list) => list.first().map(|s| s.as_str()),
            FieldValue::Attachment(_) => None,
        }
    }

    pub fn get_attachment(&self, name: &str) -> Option<&Attachment> {
        match self.get(name)? {
            FieldValue::Attachment(attachment) => Some(attachment),
            _ => None,
        }
    }

    /// Adds a text value. A repeated name converts the field into an ordered
    /// list and appends.
    pub fn add_text(&mut self, name: &str, value: String) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => match existing {
                FieldValue::Text(first) => {
                    let first = std::mem::take(first);
                    *existing = FieldValue::List(vec![first, value]);
                }
                FieldValue::List(list) => list.push(value),
                // an attachment of the same name is replaced by the text value
                FieldValue::Attachment(_) => *existing = FieldValue::Text(value),
            },
            None => self.entries.push((name.to_string(), FieldValue::Text(value))),
        }
    }

    pub fn add_attachment(&mut self, name: &str, attachment: Attachment) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = FieldValue::Attachment(attachment),
            None => self.entries.push((name.to_string(), FieldValue::Attachment(attachment))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_text_becomes_list() {
        let mut fields = Fields::new();
        fields.add_text("a", "1".to_string());
        fields.add_text("a", "2".to_string());
        fields.add_text("a", "3".to_string());
        assert_eq!(
            fields.get("a"),
            Some(&FieldValue::List(vec!["1".to_string(), "2".to_string(), "3".to_string()]))
        );
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn attachment_text_sniff() {
        let plain = Attachment { filename: "a.txt".into(), content_type: Some("text/plain".into()), data: Bytes::new() };
        assert!(plain.is_text());
        let undeclared = Attachment { filename: "a".into(), content_type: None, data: Bytes::new() };
        assert!(undeclared.is_text());
        let binary = Attachment { filename: "a.png".into(), content_type: Some("image/png".into()), data: Bytes::new() };
        assert!(!binary.is_text());
    }
}
