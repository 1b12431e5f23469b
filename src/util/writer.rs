use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    errors::{QaError, Result},
    materialize::Artifact,
};

/// Saves downloaded artifacts under a root directory.
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Writes the artifact under its own filename, replacing any earlier copy.
    ///
    /// Bytes go to a temporary sibling first and are renamed into place; the
    /// temporary file never outlives this call.
    pub async fn persist(&self, artifact: &Artifact) -> Result<PathBuf> {
        let file_name = checked_file_name(&artifact.filename)?;
        fs::create_dir_all(&self.root).await?;

        let target = self.root.join(file_name);
        let staging = PartialFile::new(
            self.root
                .join(format!(".{}.{}.part", file_name, &Uuid::new_v4().to_string()[..8])),
        );

        fs::write(staging.path(), &artifact.data).await?;
        fs::rename(staging.path(), &target).await?;
        staging.disarm();

        debug!(target: "writer", path = %target.display(), bytes = artifact.data.len(), "artifact saved");
        Ok(target)
    }
}

/// Rejects names that would escape the artifact directory.
fn checked_file_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let unsafe_name = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
        || trimmed.contains('\0');

    if unsafe_name {
        return Err(QaError::validation(format!(
            "Refusing to save file with unsafe name: {name:?}"
        )));
    }
    Ok(trimmed)
}

/// Removes the staged file on drop unless the write completed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(target: "writer", path = %self.path.display(), error = %err, "failed to remove partial file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn artifact(name: &str, data: &[u8]) -> Artifact {
        Artifact {
            filename: name.to_string(),
            data: Bytes::copy_from_slice(data),
            media_type: "text/plain".to_string(),
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn persists_exact_bytes_under_artifact_name() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().to_path_buf()).await.unwrap();

        let path = writer
            .persist(&artifact("gherkin-scenario-generator-result.feature", b"Feature: Login\n"))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("gherkin-scenario-generator-result.feature"));
        assert_eq!(std::fs::read(&path).unwrap(), b"Feature: Login\n");
        assert_eq!(entries(dir.path()), vec!["gherkin-scenario-generator-result.feature"]);
    }

    #[tokio::test]
    async fn replaces_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().to_path_buf()).await.unwrap();

        writer.persist(&artifact("login.feature", b"old")).await.unwrap();
        let path = writer.persist(&artifact("login.feature", b"new")).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"new");
        assert_eq!(entries(dir.path()), vec!["login.feature"]);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out")).await.unwrap();

        for name in ["../escape.feature", "nested/file.py", "..", "  "] {
            let err = writer.persist(&artifact(name, b"x")).await.unwrap_err();
            assert!(matches!(err, QaError::Validation(_)), "{name}");
        }
        assert!(entries(&dir.path().join("out")).is_empty());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().to_path_buf()).await.unwrap();
        // A directory in the way makes the final rename fail.
        std::fs::create_dir(dir.path().join("blocked.feature")).unwrap();
        std::fs::write(dir.path().join("blocked.feature").join("keep"), b"x").unwrap();

        writer
            .persist(&artifact("blocked.feature", b"data"))
            .await
            .unwrap_err();

        assert_eq!(entries(dir.path()), vec!["blocked.feature"]);
    }
}
