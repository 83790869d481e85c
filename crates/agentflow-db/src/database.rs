//! Data directory handle and JSON document IO.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, Result};

/// Main database handle: a directory of JSON documents.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open or create a database at the specified path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    /// Expand a leading `~/` against the home directory.
    pub fn expand_path(raw: &str) -> Result<PathBuf> {
        match raw.strip_prefix("~/") {
            Some(rest) => Ok(dirs::home_dir().ok_or(DbError::NoHomeDir)?.join(rest)),
            None if raw == "~" => dirs::home_dir().ok_or(DbError::NoHomeDir),
            None => Ok(PathBuf::from(raw)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a document, `None` if it does not exist yet.
    pub async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let file = self.path.join(name);
        let bytes = match tokio::fs::read(&file).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| DbError::Serialization { file: name.to_string(), source })
    }

    /// Replace a document. Written to a sibling temp file and renamed, so
    /// readers never see a half-written file.
    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|source| DbError::Serialization { file: name.to_string(), source })?;
        let target = self.path.join(name);
        let tmp = self.path.join(format!(".{name}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }
}
