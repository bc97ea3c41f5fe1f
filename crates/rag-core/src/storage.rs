use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

/// The `{storageDir}/{documentId}.{ext}` file storage collaborator
/// (spec.md §6) — a shared contract between `rag-api` (writes on upload)
/// and `rag-worker` (reads during extraction).
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn save(&self, document_id: Uuid, ext: &str, bytes: &[u8]) -> std::io::Result<()>;
    async fn exists(&self, document_id: Uuid, ext: &str) -> bool;
    async fn path(&self, document_id: Uuid, ext: &str) -> PathBuf;
    async fn get(&self, document_id: Uuid, ext: &str) -> std::io::Result<Vec<u8>>;
    async fn delete(&self, document_id: Uuid, ext: &str) -> std::io::Result<()>;
}

pub struct LocalFileStorage {
    dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file_path(&self, document_id: Uuid, ext: &str) -> PathBuf {
        self.dir.join(format!("{document_id}.{ext}"))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, document_id: Uuid, ext: &str, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.file_path(document_id, ext), bytes).await
    }

    async fn exists(&self, document_id: Uuid, ext: &str) -> bool {
        tokio::fs::metadata(self.file_path(document_id, ext))
            .await
            .is_ok()
    }

    async fn path(&self, document_id: Uuid, ext: &str) -> PathBuf {
        self.file_path(document_id, ext)
    }

    async fn get(&self, document_id: Uuid, ext: &str) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.file_path(document_id, ext)).await
    }

    async fn delete(&self, document_id: Uuid, ext: &str) -> std::io::Result<()> {
        let path = self.file_path(document_id, ext);
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();
        storage.save(id, "txt", b"hello").await.unwrap();
        assert!(storage.exists(id, "txt").await);
        assert_eq!(storage.get(id, "txt").await.unwrap(), b"hello");
        storage.delete(id, "txt").await.unwrap();
        assert!(!storage.exists(id, "txt").await);
    }

    #[tokio::test]
    async fn delete_of_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf());
        storage.delete(Uuid::new_v4(), "txt").await.unwrap();
    }
}
