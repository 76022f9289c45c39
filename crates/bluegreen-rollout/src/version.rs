//! Application version lookup.

use tracing::{debug, info};

use bluegreen_core::{ApplicationVersion, BundleLocation, OrchestrationError, OrchestrationResult};
use bluegreen_provider::CreateVersion;

use crate::context::Context;

/// Reuse the configured version label, creating the version if it is new.
///
/// Returns `None` when no label is configured; the deployment then keeps
/// whatever version the environment already runs.
pub async fn ensure_version(ctx: &Context) -> OrchestrationResult<Option<ApplicationVersion>> {
    let application = &ctx.config.application;
    let Some(label) = ctx.config.version.label.as_deref() else {
        debug!(%application, "no version label configured");
        return Ok(None);
    };

    if let Some(existing) = ctx.clients.find_version(application, label).await? {
        info!(%application, version = %label, "application version already exists");
        return Ok(Some(existing));
    }

    let source_bundle = ctx
        .config
        .version
        .source_bundle
        .as_deref()
        .map(str::parse::<BundleLocation>)
        .transpose()
        .map_err(OrchestrationError::Configuration)?;
    let created = ctx
        .clients
        .create_version(&CreateVersion {
            application: application.clone(),
            label: label.to_string(),
            description: ctx.config.version.description.clone(),
            source_bundle,
        })
        .await?;
    info!(%application, version = %created.label, "created application version");
    Ok(Some(created))
}
