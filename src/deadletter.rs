//! Dead-Letter Sink (SPEC_FULL §4.D): a thin wrapper over
//! [`SideStateStore::append_failed`] that builds the record from a decoded
//! or raw message plus a reason string.

use crate::{
    error::SideEffectError,
    message::{Field, Message},
    sidestate::{FailedRecord, SideStateStore},
};

/// Append a terminal-failure record for a decoded `Message`.
#[tracing::instrument(skip(message, side_state))]
pub async fn record(
    message: &Message,
    reason: &str,
    side_state: &dyn SideStateStore,
) -> Result<(), SideEffectError> {
    let fields = serde_json::to_string(&message.fields).unwrap_or_default();
    side_state
        .append_failed(FailedRecord {
            hex: message.hex.clone(),
            form_id: message.form_id.clone(),
            fields,
            origin: message.origin.clone(),
            attachment_count: message.attachment_count,
            error: reason.to_string(),
        })
        .await
}

/// Append a terminal-failure record for an entry that never decoded into a
/// `Message` at all. Best-effort: whichever fields could be extracted from
/// the raw payload are carried, everything else is left empty.
#[tracing::instrument(skip(raw, side_state))]
pub async fn record_raw(
    hex: &str,
    raw: &[(String, String)],
    attachment_count: u32,
    reason: &str,
    side_state: &dyn SideStateStore,
) -> Result<(), SideEffectError> {
    let get = |key: &str| raw.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
    let fields: Vec<Field> = get("fields")
        .and_then(|raw_fields| serde_json::from_str(&raw_fields).ok())
        .unwrap_or_default();

    side_state
        .append_failed(FailedRecord {
            hex: hex.to_string(),
            form_id: get("form_id").unwrap_or_default(),
            fields: serde_json::to_string(&fields).unwrap_or_default(),
            origin: get("origin").unwrap_or_default(),
            attachment_count,
            error: reason.to_string(),
        })
        .await
}
