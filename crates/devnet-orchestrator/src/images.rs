//! Image availability and pulls.

use tracing::{debug, info};

use crate::engine::{ContainerEngine, PullProgress};
use crate::error::ImageError;

/// Returns true if the image is present locally.
pub async fn is_available(engine: &dyn ContainerEngine, image: &str) -> Result<bool, ImageError> {
    let images = engine
        .list_images(image)
        .await
        .map_err(|e| ImageError::inspection_failed(image, e))?;
    Ok(!images.is_empty())
}

/// Pulls an image and waits for the pull to complete.
///
/// Every progress event is logged at debug level and passed to `on_progress`.
/// A failed pull is returned as is; it is never retried here.
pub async fn pull_with_progress<F>(
    engine: &dyn ContainerEngine,
    image: &str,
    mut on_progress: F,
) -> Result<(), ImageError>
where
    F: FnMut(&PullProgress) + Send,
{
    info!(image = %image, "Pulling image");

    let mut sink = |event: PullProgress| {
        if let Some(status) = &event.status {
            debug!(
                image = %image,
                layer = event.id.as_deref().unwrap_or("-"),
                status = %status,
                progress = event.progress.as_deref().unwrap_or(""),
                "Pull progress"
            );
        }
        on_progress(&event);
    };

    engine
        .pull_image(image, &mut sink)
        .await
        .map_err(|e| ImageError::pull_failed(image, e))?;

    info!(image = %image, "Pulled image");
    Ok(())
}

/// Pulls an image, logging progress only.
pub async fn pull(engine: &dyn ContainerEngine, image: &str) -> Result<(), ImageError> {
    pull_with_progress(engine, image, |_| {}).await
}

/// Pulls the image unless it is already present.
pub async fn ensure_available(engine: &dyn ContainerEngine, image: &str) -> Result<(), ImageError> {
    if is_available(engine, image).await? {
        debug!(image = %image, "Image already available");
        return Ok(());
    }
    pull(engine, image).await
}
