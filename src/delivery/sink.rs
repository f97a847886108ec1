//! Message sinks: where text replies and chart images end up.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::DeliveryError;

/// Opaque identifier of one conversation with an end user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self::new(id.to_string())
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transmits messages to an end user.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send a text message.
    async fn send_text(&self, conversation: &ConversationId, text: &str) -> Result<(), DeliveryError>;

    /// Send the image at `path` with `caption`. The file must not be
    /// modified or removed by the sink.
    async fn send_image(
        &self,
        conversation: &ConversationId,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError>;
}

/// Prints text to stdout and copies images into a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing images under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn print(line: &str) -> Result<(), DeliveryError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl MessageSink for DirectorySink {
    async fn send_text(&self, conversation: &ConversationId, text: &str) -> Result<(), DeliveryError> {
        Self::print(&format!("[{}] {}", conversation, text)).await
    }

    async fn send_image(
        &self,
        conversation: &ConversationId,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let name = path
            .file_name()
            .ok_or_else(|| DeliveryError::Send(format!("{} has no file name", path.display())))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self
            .dir
            .join(format!("{}_{}", conversation, name.to_string_lossy()));
        tokio::fs::copy(path, &target).await?;

        info!(conversation = %conversation, target = %target.display(), "Saved chart");
        Self::print(&format!("[{}] {} -> {}", conversation, caption, target.display())).await
    }
}

/// One message captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    /// Text reply.
    Text {
        /// Recipient.
        conversation: ConversationId,
        /// Message body.
        text: String,
    },
    /// Image reply.
    Image {
        /// Recipient.
        conversation: ConversationId,
        /// Caption.
        caption: String,
        /// Image size in bytes at send time.
        bytes: usize,
    },
}

/// In-memory sink that records every message. Image sends can be made to
/// fail a fixed number of times.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<SentMessage>>,
    image_failures: AtomicU32,
    image_attempts: AtomicU32,
}

impl RecordingSink {
    /// Sink that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose first `failures` image sends fail.
    pub fn failing_images(failures: u32) -> Self {
        Self {
            image_failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    /// Everything sent so far.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Text bodies sent so far.
    pub fn texts(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SentMessage::Text { text, .. } => Some(text),
                SentMessage::Image { .. } => None,
            })
            .collect()
    }

    /// Image captions sent so far.
    pub fn captions(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SentMessage::Image { caption, .. } => Some(caption),
                SentMessage::Text { .. } => None,
            })
            .collect()
    }

    /// Image sends attempted, failed ones included.
    pub fn image_attempts(&self) -> u32 {
        self.image_attempts.load(Ordering::SeqCst)
    }

    fn push(&self, message: SentMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_text(&self, conversation: &ConversationId, text: &str) -> Result<(), DeliveryError> {
        self.push(SentMessage::Text {
            conversation: conversation.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_image(
        &self,
        conversation: &ConversationId,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        self.image_attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .image_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            debug!(caption, "Simulated send failure");
            return Err(DeliveryError::Send("simulated failure".to_string()));
        }

        let bytes = tokio::fs::read(path).await?.len();
        self.push(SentMessage::Image {
            conversation: conversation.clone(),
            caption: caption.to_string(),
            bytes,
        });
        Ok(())
    }
}
