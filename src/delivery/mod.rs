//! Handing chart artifacts to the transmission collaborator.
//!
//! This module handles:
//! - The [`MessageSink`] seam and the sinks shipped with the crate
//! - Bounded retry of failed sends
//! - Unconditional artifact cleanup after delivery

pub mod retry;
pub mod sink;

pub use retry::{Backoff, RetryPolicy};
pub use sink::{ConversationId, DirectorySink, MessageSink, RecordingSink, SentMessage};

use tracing::{info, instrument, warn};

use crate::chart::ChartArtifact;
use crate::error::DeliveryError;
use crate::metrics;

/// Send `artifact` with its description as caption, retrying per `policy`,
/// then delete it whatever the outcome.
///
/// A missing file is reported to the conversation as text and yields
/// [`DeliveryError::MissingArtifact`] without any image send.
#[instrument(skip_all, fields(conversation = %conversation, caption = %artifact.description()))]
pub async fn deliver_artifact(
    sink: &dyn MessageSink,
    conversation: &ConversationId,
    artifact: ChartArtifact,
    policy: &RetryPolicy,
) -> Result<(), DeliveryError> {
    if !artifact.path().exists() {
        let path = artifact.path().to_path_buf();
        warn!(path = %path.display(), "Artifact missing before send");
        let notice = format!("{} is unavailable", artifact.description());
        if let Err(e) = sink.send_text(conversation, &notice).await {
            warn!(error = %e, "Failed to send missing-artifact notice");
        }
        metrics::inc_delivery_failures();
        return Err(DeliveryError::MissingArtifact(path));
    }

    let result = policy
        .run("send_image", |attempt| {
            if attempt > 0 {
                metrics::inc_delivery_retries();
            }
            sink.send_image(conversation, artifact.path(), artifact.description())
        })
        .await;

    match &result {
        Ok(()) => {
            info!("Chart delivered");
            metrics::inc_artifacts_delivered();
        }
        Err(e) => {
            warn!(error = %e, "Chart delivery failed");
            metrics::inc_delivery_failures();
        }
    }

    if let Err(e) = artifact.release() {
        warn!(error = %e, "Failed to delete artifact after delivery");
    }
    result
}
