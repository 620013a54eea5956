//! Filesystem attachment storage.
//!
//! Payloads land in `<root>/chat/<uuid-v7>.<ext>`. The returned reference is
//! the path relative to `root`, or that path under a public base URL when one
//! is configured. No transcoding or content inspection happens here.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use carelink_core::traits::AttachmentService;
use carelink_core::{AttachmentRef, ChatError, ChatResult};
use tracing::{info, warn};
use uuid::Uuid;

const CHAT_DIR: &str = "chat";

/// Stores attachments on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalMediaStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalMediaStore {
    /// Store under `root`, optionally publishing references under
    /// `public_base_url`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url
                .map(|u| u.trim_end_matches('/').to_owned())
                .filter(|u| !u.is_empty()),
        }
    }

    /// Media root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reference_for(&self, relative: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{relative}"),
            None => relative.to_owned(),
        }
    }
}

/// File extension for a content type. Parameters after `;` are ignored.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "application/pdf" => "pdf",
        "audio/mpeg" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "video/mp4" => "mp4",
        "text/plain" => "txt",
        _ => "bin",
    }
}

#[async_trait]
impl AttachmentService for LocalMediaStore {
    async fn store(&self, payload: Bytes, content_type: &str) -> ChatResult<AttachmentRef> {
        if payload.is_empty() {
            return Err(ChatError::Validation("attachment is empty".into()));
        }

        let dir = self.root.join(CHAT_DIR);
        let name = format!("{}.{}", Uuid::now_v7().simple(), extension_for(content_type));
        let path = dir.join(&name);

        let io_err = |e: std::io::Error| {
            warn!(path = %path.display(), error = %e, "failed to write attachment");
            ChatError::TransientStore(format!("attachment write failed: {e}"))
        };
        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
        tokio::fs::write(&path, &payload).await.map_err(io_err)?;

        let reference = self.reference_for(&format!("{CHAT_DIR}/{name}"));
        info!(bytes = payload.len(), content_type, reference = %reference, "attachment stored");
        Ok(AttachmentRef::new(reference))
    }
}
