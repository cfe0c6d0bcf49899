//! Content-addressed store for synthesized audio

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Audio files under a publicly served directory. Synthesized clips are
/// named after the SHA-256 of their text so the same sentence is only ever
/// synthesized once.
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
    public_prefix: String,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(text: &str) -> String {
        format!("{:x}", Sha256::digest(text.as_bytes()))
    }

    fn file_name(text: &str) -> String {
        format!("{}.mp3", Self::key(text))
    }

    fn public_url(&self, file_name: &str) -> String {
        format!("{}/{file_name}", self.public_prefix)
    }

    /// URL of a previously stored clip for this text
    pub async fn lookup(&self, text: &str) -> Option<String> {
        let name = Self::file_name(text);
        match tokio::fs::try_exists(self.dir.join(&name)).await {
            Ok(true) => Some(self.public_url(&name)),
            _ => None,
        }
    }

    /// Persist a clip for this text and return its URL
    pub async fn store(&self, text: &str, audio: &[u8]) -> io::Result<String> {
        self.save(&Self::file_name(text), audio).await
    }

    /// Write audio under a caller-chosen file name inside the cache directory
    pub async fn save(&self, file_name: &str, audio: &[u8]) -> io::Result<String> {
        if !is_plain_file_name(file_name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file name: {file_name}"),
            ));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(file_name), audio).await?;
        Ok(self.public_url(file_name))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
