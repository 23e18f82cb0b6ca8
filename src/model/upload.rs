//! Sub images and banners stored as plain files in the upload directory.

use super::util::{make_id, ServiceError, IMAGE_NAME_LENGTH};
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const DEFAULT_UPLOAD_DIR: &str = "public/images";
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

pub fn is_allowed_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => ALLOWED_CONTENT_TYPES.contains(&ct.to_lowercase().as_str()),
        None => false,
    }
}

/// The extension of the uploaded file name, falling back to one derived from the content type.
pub fn image_extension(file_name: Option<&str>, content_type: Option<&str>) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match from_name {
        Some(ext) => format!(".{}", ext),
        None => match content_type.map(|ct| ct.to_lowercase()) {
            Some(ct) if ct == "image/png" => ".png".to_string(),
            _ => ".jpg".to_string(),
        },
    }
}

/// A random file name for a new upload.
pub fn make_image_name(file_name: Option<&str>, content_type: Option<&str>) -> String {
    format!(
        "{}{}",
        make_id(IMAGE_NAME_LENGTH),
        image_extension(file_name, content_type)
    )
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    pub dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: &str) -> ImageStore {
        ImageStore {
            dir: PathBuf::from(dir),
        }
    }

    pub async fn init(&self) -> Result<(), anyhow::Error> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, anyhow::Error> {
        // Names come from the database, but never let one escape the upload directory.
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(ServiceError::invalid("file", "Invalid file name."));
        }
        Ok(self.dir.join(name))
    }

    /// Validate and write an uploaded image. Returns the stored file name.
    pub async fn save(
        &self,
        content: &[u8],
        file_name: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<String, anyhow::Error> {
        if !is_allowed_content_type(content_type) {
            return Err(ServiceError::invalid(
                "file",
                "Invalid file type. Only jpeg and png images are allowed.",
            ));
        }

        self.init().await?;
        let name = make_image_name(file_name, content_type);
        let path = self.path_for(&name)?;

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(content).await?;
        file.flush().await?;
        debug!("Saved {} bytes to {}", content.len(), path.display());

        Ok(name)
    }

    /// Remove a stored image. A missing file is not an error.
    pub async fn remove(&self, name: &str) -> Result<(), anyhow::Error> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} was already gone.", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a file after the database no longer points at it. Failures are only logged.
    pub async fn discard(&self, name: Option<String>) {
        if let Some(name) = name {
            if let Err(e) = self.remove(&name).await {
                warn!("Failed to remove {}: {}", name, e);
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<String>, anyhow::Error> {
        let mut names = vec![];
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        Ok(names)
    }

    /// Delete every file that is not in `keep`. Returns the removed names.
    pub async fn clean(&self, keep: &[String]) -> Result<Vec<String>, anyhow::Error> {
        let keep: HashSet<&String> = keep.iter().collect();
        let mut removed = vec![];
        for name in self.list().await? {
            if !keep.contains(&name) {
                self.remove(&name).await?;
                removed.push(name);
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_content_type() {
        assert!(is_allowed_content_type(Some("image/png")));
        assert!(is_allowed_content_type(Some("IMAGE/JPEG")));
        assert!(!is_allowed_content_type(Some("image/gif")));
        assert!(!is_allowed_content_type(Some("text/plain")));
        assert!(!is_allowed_content_type(None));
    }

    #[test]
    fn test_image_name() {
        assert_eq!(image_extension(Some("cat.PNG"), Some("image/png")), ".png");
        assert_eq!(image_extension(Some("cat"), Some("image/png")), ".png");
        assert_eq!(image_extension(None, Some("image/jpeg")), ".jpg");

        let name = make_image_name(Some("photo.jpeg"), Some("image/jpeg"));
        assert_eq!(name.len(), IMAGE_NAME_LENGTH + ".jpeg".len());
        assert!(name.ends_with(".jpeg"));
    }

    #[tokio::test]
    async fn test_save_list_remove() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("images").to_str().unwrap());

        let err = store
            .save(b"GIF89a", Some("x.gif"), Some("image/gif"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Only jpeg and png"));

        let name = store
            .save(b"\x89PNG", Some("logo.png"), Some("image/png"))
            .await
            .unwrap();
        assert_eq!(store.list().await.unwrap(), vec![name.clone()]);

        store.remove(&name).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        // Removing twice is fine.
        store.remove(&name).await.unwrap();
        assert!(store.remove("../escape.png").await.is_err());
    }

    #[tokio::test]
    async fn test_clean() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path().to_str().unwrap());
        let kept = store.save(b"a", None, Some("image/png")).await.unwrap();
        let stale = store.save(b"b", None, Some("image/jpeg")).await.unwrap();

        let removed = store.clean(&[kept.clone()]).await.unwrap();
        assert_eq!(removed, vec![stale]);
        assert_eq!(store.list().await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("nope").to_str().unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }
}
