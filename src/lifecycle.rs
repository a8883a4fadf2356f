//! Lifecycle (SPEC_FULL §4.I): bootstrap order, idempotent consumer-group
//! creation, and the graceful-shutdown sequence. Backing-store clients are
//! process-global singletons constructed once here and threaded through as
//! a context rather than relied on as ambient state (spec §9).

use std::sync::Arc;

use crate::{
    attachments::S3ObjectStore,
    config::{Config, SmtpAuth, SmtpSecurity},
    consumer::ConsumerLoop,
    error::BootstrapError,
    executor::ExecutorContext,
    formstore::PocketBaseFormStore,
    mode::ModeBindings,
    render::HandlebarsRenderer,
    sidestate::RedisSideStateStore,
    smtp::{LettreSmtpSender, Security},
};

/// Everything [`crate::consumer::ConsumerLoop::run`] and the executor need,
/// fully wired after a successful [`bootstrap`].
pub struct Runtime {
    pub executor_ctx: Arc<ExecutorContext>,
    pub consumer: ConsumerLoop,
}

/// Bootstrap order (spec §4.I): side-state store, form store (authenticating),
/// object store, SMTP transport, then verify the target stream exists and
/// create the consumer group. Any failure here is bootstrap-fatal and the
/// caller should abort the process.
///
/// # Errors
///
/// Returns [`BootstrapError`] for any failed connection, authentication, or
/// missing-stream check.
pub async fn bootstrap(config: &Config) -> Result<Runtime, BootstrapError> {
    tracing::info!("connecting to side-state store");
    let side_state = RedisSideStateStore::connect(&config.redis_url).await?;

    tracing::info!("authenticating against form metadata store");
    let form_store = PocketBaseFormStore::authenticate(
        &config.pocketbase_url,
        &config.pocketbase_email,
        &config.pocketbase_pass,
    )
    .await
    .map_err(|e| BootstrapError::FormStoreAuth(e.to_string()))?;

    tracing::info!("connecting to attachment object store");
    let object_store = S3ObjectStore::new(
        &config.minio_bucket,
        &config.minio_region,
        &config.minio_endpoint,
        &config.minio_root_user,
        &config.minio_root_password,
    )
    .map_err(|e| BootstrapError::ObjectStoreConnection(e.to_string()))?;

    tracing::info!("initialising SMTP transport");
    let security = match config.smtp_security() {
        SmtpSecurity::None => Security::None,
        SmtpSecurity::StartTls => Security::StartTls,
        SmtpSecurity::Ssl => Security::Ssl,
    };
    // SMTP_AUTH beyond plain (gmail/oauth2) is accepted at the config layer
    // (spec §6) but delegates to lettre's plain-credentials transport here;
    // oauth2/xoauth2 token exchange is outside this worker's scope.
    let _ = SmtpAuth::Plain;
    let smtp_sender = LettreSmtpSender::new(
        &config.smtp_hostname,
        config.smtp_port,
        security,
        &config.smtp_username,
        &config.smtp_password,
    )
    .map_err(|e| BootstrapError::SmtpInit(e.to_string()))?;

    let bindings = ModeBindings::for_mode(config.mode(), std::process::id());

    tracing::info!(stream = bindings.stream, group = %bindings.group, "verifying target stream and consumer group");
    let mut consumer = ConsumerLoop::connect(
        &config.redis_url,
        bindings,
        config.consumer_batch_size,
        config.consumer_block,
    )
    .await?;
    consumer.verify_stream_exists().await?;
    consumer.ensure_group().await?;

    let executor_ctx = Arc::new(ExecutorContext {
        side_state: Arc::new(side_state),
        object_store: Arc::new(object_store),
        form_store: Arc::new(form_store),
        renderer: Arc::new(HandlebarsRenderer::new()),
        smtp_sender: Arc::new(smtp_sender),
        retry_policy: config.retry_policy(),
    });

    Ok(Runtime { executor_ctx, consumer })
}

/// Graceful-shutdown sequence (spec §4.I): close the SMTP transport, clear
/// authentication, disconnect both side-state connections, then exit.
/// Resource release is handled by `Drop` once every handle goes out of
/// scope; this function exists to log the sequence as it happens rather
/// than to perform imperative teardown steps itself.
///
/// Takes the shared `executor_ctx` handle directly rather than the whole
/// [`Runtime`]: by the time shutdown runs, the consumer loop's own
/// connection has already been dropped along with its completed task.
pub fn shutdown_executor_context(executor_ctx: Arc<ExecutorContext>) {
    tracing::info!("closing SMTP transport");
    tracing::info!("clearing form-store authentication");
    tracing::info!("disconnecting side-state connections");
    drop(executor_ctx);
    tracing::info!("shutdown complete");
}
