//! Stream entry codec. Decodes the flat key/value payload a stream entry
//! carries into a [`Message`], and encodes the retry envelope payload.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// One `{name, value}` pair from the form submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// A decoded stream entry, ready for dispatch to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Opaque entry id assigned by the stream.
    pub id: String,
    /// Client-supplied correlation / dedup key. `"otp"` is reserved.
    pub hex: String,
    pub form_id: String,
    pub origin: String,
    pub fields: Vec<Field>,
    pub attachment_count: u32,
    /// Absent on primary-stream entries; present on retry-stream entries.
    pub fail_count: u32,
}

impl Message {
    #[must_use]
    pub fn is_otp(&self) -> bool {
        self.hex == "otp"
    }

    /// Encode this message as a retry envelope payload with `fail_count`
    /// incremented, in the flat key/value form the stream expects.
    #[must_use]
    pub fn to_retry_payload(&self, fail_count: u32) -> Vec<(String, String)> {
        vec![
            ("hex".to_string(), self.hex.clone()),
            ("form_id".to_string(), self.form_id.clone()),
            ("origin".to_string(), self.origin.clone()),
            (
                "fields".to_string(),
                serde_json::to_string(&self.fields).unwrap_or_default(),
            ),
            (
                "attachment_count".to_string(),
                self.attachment_count.to_string(),
            ),
            ("fail_count".to_string(), fail_count.to_string()),
        ]
    }
}

/// Decode a flat sequence of alternating key-value strings (as returned by
/// a stream read) into a [`Message`]. Unknown keys are ignored. A missing
/// or unparseable required field is a [`DecodeError`].
pub fn decode(id: &str, raw: &[(String, String)]) -> Result<Message, DecodeError> {
    let get = |key: &str| raw.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

    let hex = get("hex").ok_or(DecodeError::MissingField("hex"))?.to_string();
    let form_id = get("form_id")
        .ok_or(DecodeError::MissingField("form_id"))?
        .to_string();
    let origin = get("origin")
        .ok_or(DecodeError::MissingField("origin"))?
        .to_string();
    let fields_raw = get("fields").ok_or(DecodeError::MissingField("fields"))?;
    let fields: Vec<Field> =
        serde_json::from_str(fields_raw).map_err(|e| DecodeError::InvalidFieldsJson(e.to_string()))?;

    let attachment_count_raw = get("attachment_count")
        .ok_or(DecodeError::MissingField("attachment_count"))?;
    let attachment_count = attachment_count_raw
        .parse::<u32>()
        .map_err(|_| DecodeError::InvalidInteger {
            field: "attachment_count",
            value: attachment_count_raw.to_string(),
        })?;

    let fail_count = match get("fail_count") {
        Some(raw_fail) => raw_fail.parse::<u32>().map_err(|_| DecodeError::InvalidInteger {
            field: "fail_count",
            value: raw_fail.to_string(),
        })?,
        None => 0,
    };

    Ok(Message {
        id: id.to_string(),
        hex,
        form_id,
        origin,
        fields,
        attachment_count,
        fail_count,
    })
}

/// Best-effort `attachment_count` extraction for entries that failed
/// [`decode`]. Reads the value at a fixed positional offset in the raw
/// flat key-value array rather than searching by key name.
///
/// This mirrors a known-fragile behavior: if the entry's field ordering
/// differs from the conventional `hex, form_id, fields, origin,
/// attachment_count, ...` layout, this reads the wrong value entirely.
/// Preserved intentionally rather than hardened; see DESIGN.md.
const ATTACHMENT_COUNT_OFFSET: usize = 4;

#[must_use]
pub fn attachment_count_at_offset(raw: &[(String, String)]) -> u32 {
    raw.get(ATTACHMENT_COUNT_OFFSET)
        .and_then(|(_, v)| v.parse::<u32>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> Vec<(String, String)> {
        vec![
            ("hex".to_string(), "a1".to_string()),
            ("form_id".to_string(), "F".to_string()),
            (
                "fields".to_string(),
                serde_json::to_string(&vec![Field {
                    name: "email".to_string(),
                    value: "x@y".to_string(),
                }])
                .unwrap(),
            ),
            ("origin".to_string(), "web".to_string()),
            ("attachment_count".to_string(), "0".to_string()),
        ]
    }

    #[test]
    fn decodes_well_formed_entry() {
        let msg = decode("1-0", &sample_raw()).expect("should decode");
        assert_eq!(msg.hex, "a1");
        assert_eq!(msg.form_id, "F");
        assert_eq!(msg.origin, "web");
        assert_eq!(msg.attachment_count, 0);
        assert_eq!(msg.fail_count, 0);
        assert_eq!(msg.fields.len(), 1);
    }

    #[test]
    fn decodes_retry_entry_with_fail_count() {
        let mut raw = sample_raw();
        raw.push(("fail_count".to_string(), "3".to_string()));
        let msg = decode("1-0", &raw).expect("should decode");
        assert_eq!(msg.fail_count, 3);
    }

    #[test]
    fn rejects_missing_hex() {
        let raw: Vec<_> = sample_raw().into_iter().filter(|(k, _)| k != "hex").collect();
        let err = decode("1-0", &raw).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("hex")));
    }

    #[test]
    fn rejects_non_numeric_attachment_count() {
        let mut raw = sample_raw();
        for kv in &mut raw {
            if kv.0 == "attachment_count" {
                kv.1 = "not-a-number".to_string();
            }
        }
        let err = decode("1-0", &raw).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidInteger {
                field: "attachment_count",
                ..
            }
        ));
    }

    #[test]
    fn rejects_malformed_fields_json() {
        let mut raw = sample_raw();
        for kv in &mut raw {
            if kv.0 == "fields" {
                kv.1 = "not json".to_string();
            }
        }
        let err = decode("1-0", &raw).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFieldsJson(_)));
    }

    #[test]
    fn offset_extraction_reads_fixed_position() {
        // attachment_count sits at index 4 in the conventional layout.
        let raw = sample_raw();
        assert_eq!(attachment_count_at_offset(&raw), 0);
    }

    #[test]
    fn offset_extraction_is_wrong_when_layout_differs() {
        // Demonstrates the known fragility: reordering fields changes what
        // gets read, with no validation against the key name.
        let mut raw = sample_raw();
        raw.swap(2, 4);
        assert_ne!(attachment_count_at_offset(&raw), 0);
    }

    #[test]
    fn is_otp_sentinel() {
        let msg = Message {
            id: "1-0".to_string(),
            hex: "otp".to_string(),
            form_id: String::new(),
            origin: String::new(),
            fields: vec![Field {
                name: "code".to_string(),
                value: "123456".to_string(),
            }],
            attachment_count: 0,
            fail_count: 0,
        };
        assert!(msg.is_otp());
    }

    #[test]
    fn to_retry_payload_carries_incremented_fail_count() {
        let msg = decode("1-0", &sample_raw()).unwrap();
        let payload = msg.to_retry_payload(1);
        let fail_count = payload
            .iter()
            .find(|(k, _)| k == "fail_count")
            .map(|(_, v)| v.as_str());
        assert_eq!(fail_count, Some("1"));
    }
}
