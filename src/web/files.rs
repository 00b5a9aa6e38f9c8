use std::path::{Path, PathBuf};

use anyhow::anyhow;
use uuid::Uuid;

pub const MAX_IMAGE_SIZE_BYTES: usize = 1_000_000; // ~1 MB

/// Persists uploaded bill images under the configured directory and hands
/// back the public path they are served from.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: &str) -> Result<Self, anyhow::Error> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.into() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn store_image(&self, bytes: &[u8]) -> Result<String, anyhow::Error> {
        if bytes.len() > MAX_IMAGE_SIZE_BYTES {
            return Err(anyhow!("File too large"));
        }
        let kind = detect_image(bytes).ok_or(anyhow!("Not a recognized image format"))?;

        let name = format!("{}.{}", Uuid::new_v4(), kind.extension());
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        Ok(format!("/uploads/{name}"))
    }
}

/// Content sniffing on the magic bytes; the client-supplied content type
/// and file name are not trusted.
pub fn detect_image(bytes: &[u8]) -> Option<infer::Type> {
    infer::get(bytes).filter(|t| t.matcher_type() == infer::MatcherType::Image)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn png_bytes() -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    #[tokio::test]
    async fn stores_recognized_image_under_uploads_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_str().unwrap()).unwrap();

        let path = store.store_image(&png_bytes()).await.unwrap();
        assert!(path.starts_with("/uploads/"));
        assert!(path.ends_with(".png"));

        let name = path.strip_prefix("/uploads/").unwrap();
        assert!(dir.path().join(name).exists());
    }

    #[tokio::test]
    async fn rejects_non_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_str().unwrap()).unwrap();

        assert!(store.store_image(b"just some text").await.is_err());
    }

    #[tokio::test]
    async fn rejects_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_str().unwrap()).unwrap();

        let mut bytes = png_bytes();
        bytes.resize(MAX_IMAGE_SIZE_BYTES + 1, 0);
        assert!(store.store_image(&bytes).await.is_err());
    }
}
