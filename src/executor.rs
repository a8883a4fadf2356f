//! Attempt Executor (SPEC_FULL §4.E): render, send, classify the outcome,
//! and perform the cleanup/retry/dead-letter invocation that follows.

use std::sync::Arc;

use crate::{
    attachments::{self, ObjectStore},
    deadletter,
    formstore::FormStore,
    message::Message,
    mode::{Mode, ModeBindings},
    render::{synthesize_otp_mail, Renderer},
    retry::RetryPolicy,
    sidestate::SideStateStore,
    smtp::SmtpSender,
};

/// The name of the stream retry envelopes are enqueued into, regardless of
/// which mode the currently-running process is in.
pub const RETRY_STREAM: &str = "retry_queue";

/// Handles to every external collaborator the executor needs, bundled so
/// call sites don't thread five parameters through every function.
pub struct ExecutorContext {
    pub side_state: Arc<dyn SideStateStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub form_store: Arc<dyn FormStore>,
    pub renderer: Arc<dyn Renderer>,
    pub smtp_sender: Arc<dyn SmtpSender>,
    pub retry_policy: RetryPolicy,
}

/// The terminal outcome of one executor run, for logging/testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    RetryEnqueued,
    DeadLettered,
}

/// Run the attempt/retry state machine for one decoded message.
///
/// This always acknowledges the stream entry exactly once (spec §8
/// invariant 1) via `ctx.side_state.ack_and_remove`, on whichever of
/// `bindings.stream` / `bindings.group` it was delivered on.
#[tracing::instrument(skip(message, ctx), fields(hex = %message.hex))]
pub async fn execute(message: &Message, bindings: &ModeBindings, ctx: &ExecutorContext) -> Outcome {
    if message.is_otp() {
        return execute_otp(message, bindings, ctx).await;
    }

    let form = match ctx.form_store.lookup(&message.form_id).await {
        Ok(form) => form,
        Err(_) => {
            return terminal_failure(message, bindings, ctx, None, "form not found").await;
        }
    };

    let attachment_url = (message.attachment_count > 0).then(|| format!("attachments/{}", message.hex));

    let rendered = match ctx
        .renderer
        .render(&form, &message.fields, &message.origin, attachment_url.as_deref())
        .await
    {
        Ok(mail) => mail,
        Err(e) => {
            return terminal_failure(message, bindings, ctx, Some(&form), &e.to_string()).await;
        }
    };

    match ctx.smtp_sender.send(&rendered, &message.hex).await {
        Ok(()) => success(message, &form, bindings, ctx).await,
        Err(crate::error::SendError::Permanent(reason)) => {
            terminal_failure(message, bindings, ctx, Some(&form), &reason).await
        }
        Err(crate::error::SendError::Transient(reason)) => {
            retry_or_dead_letter(message, &form, bindings, ctx, &reason).await
        }
    }
}

async fn execute_otp(message: &Message, bindings: &ModeBindings, ctx: &ExecutorContext) -> Outcome {
    let form = match ctx.form_store.lookup(&message.form_id).await {
        Ok(form) => form,
        Err(_) => {
            // Attachments are never consulted for OTP (spec §8 invariant 7):
            // skip the reaper even on the missing-form path. No form record
            // is in hand here, so dedup deletion is unconditional.
            let _ = deadletter::record(message, "form not found", ctx.side_state.as_ref()).await;
            let _ = ctx.side_state.delete_dedup(&message.hex).await;
            ack(message, bindings, ctx).await;
            return Outcome::DeadLettered;
        }
    };

    let Some(handler) = &form.handler else {
        let _ = deadletter::record(message, "no handler configured for form", ctx.side_state.as_ref()).await;
        if !form.allow_duplicates {
            let _ = ctx.side_state.delete_dedup(&message.hex).await;
        }
        ack(message, bindings, ctx).await;
        return Outcome::DeadLettered;
    };

    let code = message
        .fields
        .first()
        .map(|field| field.value.as_str())
        .unwrap_or_default();
    let mail = synthesize_otp_mail(code, &handler.from_name, &handler.from_email, &handler.to);

    // The reserved-sentinel branch (spec §4.E step 1) only replaces the
    // render step with direct synthesis; the send step's three-way outcome
    // handling (step 4/5) applies uniformly, so a transient failure here
    // enters the same retry branch as the non-OTP path.
    match ctx.smtp_sender.send(&mail, &message.hex).await {
        Ok(()) => {
            if !form.allow_duplicates {
                let _ = ctx.side_state.delete_dedup(&message.hex).await;
            }
            ack(message, bindings, ctx).await;
            Outcome::Sent
        }
        Err(crate::error::SendError::Permanent(_)) => {
            let _ = deadletter::record(message, "otp send failed", ctx.side_state.as_ref()).await;
            if !form.allow_duplicates {
                let _ = ctx.side_state.delete_dedup(&message.hex).await;
            }
            ack(message, bindings, ctx).await;
            Outcome::DeadLettered
        }
        Err(crate::error::SendError::Transient(reason)) => {
            retry_or_dead_letter(message, &form, bindings, ctx, &reason).await
        }
    }
}

async fn success(
    message: &Message,
    form: &crate::formstore::FormRecord,
    bindings: &ModeBindings,
    ctx: &ExecutorContext,
) -> Outcome {
    if !form.allow_duplicates {
        let _ = ctx.side_state.delete_dedup(&message.hex).await;
    }
    ack(message, bindings, ctx).await;
    Outcome::Sent
}

/// `form` is `None` only when no form record could be retrieved at all
/// (the form-not-found path), in which case dedup deletion is unconditional;
/// whenever a form is in hand, deletion follows `!form.allow_duplicates`
/// per spec §8 invariant 6.
async fn terminal_failure(
    message: &Message,
    bindings: &ModeBindings,
    ctx: &ExecutorContext,
    form: Option<&crate::formstore::FormRecord>,
    reason: &str,
) -> Outcome {
    let _ = deadletter::record(message, reason, ctx.side_state.as_ref()).await;
    let delete_dedup = match form {
        Some(form) => !form.allow_duplicates,
        None => true,
    };
    if delete_dedup {
        let _ = ctx.side_state.delete_dedup(&message.hex).await;
    }
    if message.attachment_count > 0 {
        if let Err(e) = attachments::reap(&message.hex, ctx.side_state.as_ref(), ctx.object_store.as_ref()).await {
            tracing::warn!(hex = %message.hex, error = %e, "attachment reap failed during terminal cleanup");
        }
    }
    ack(message, bindings, ctx).await;
    Outcome::DeadLettered
}

async fn retry_or_dead_letter(
    message: &Message,
    form: &crate::formstore::FormRecord,
    bindings: &ModeBindings,
    ctx: &ExecutorContext,
    reason: &str,
) -> Outcome {
    match bindings.mode {
        Mode::Primary => {
            enqueue_retry(message, 1, ctx).await;
            // Dedup key is deleted even though the entry is enqueued to the
            // retry stream. Preserved per DESIGN.md open question #1: this
            // may permit a duplicate ingestion to race the retry attempt.
            if !form.allow_duplicates {
                let _ = ctx.side_state.delete_dedup(&message.hex).await;
            }
            ack(message, bindings, ctx).await;
            Outcome::RetryEnqueued
        }
        Mode::Retry => {
            if ctx.retry_policy.exhausted(message.fail_count) {
                return terminal_failure(message, bindings, ctx, Some(form), "max retries reached").await;
            }
            enqueue_retry(message, message.fail_count + 1, ctx).await;
            if !form.allow_duplicates {
                let _ = ctx.side_state.delete_dedup(&message.hex).await;
            }
            ack(message, bindings, ctx).await;
            let _ = reason;
            Outcome::RetryEnqueued
        }
    }
}

async fn enqueue_retry(message: &Message, fail_count: u32, ctx: &ExecutorContext) {
    let payload = message.to_retry_payload(fail_count);
    if let Err(e) = ctx
        .side_state
        .enqueue_retry(RETRY_STREAM, &message.id, payload)
        .await
    {
        tracing::warn!(hex = %message.hex, error = %e, "failed to enqueue retry envelope");
    }
}

async fn ack(message: &Message, bindings: &ModeBindings, ctx: &ExecutorContext) {
    if let Err(e) = ctx
        .side_state
        .ack_and_remove(bindings.stream, &bindings.group, &message.id)
        .await
    {
        tracing::warn!(hex = %message.hex, error = %e, "failed to acknowledge stream entry");
    }
}
