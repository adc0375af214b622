use crate::{Result, utils};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

/// Output root holding one directory per item.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<T: Into<PathBuf>>(root: T) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one item, created on demand.
    pub async fn item(&self, item_id: &str) -> Result<ItemArtifacts> {
        let dir = self.root.join(sanitize(item_id));
        fs::create_dir_all(&dir).await?;
        Ok(ItemArtifacts { dir })
    }

    /// Write a file directly under the root, used for account level records.
    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;
        write_json(&self.root, name, value).await
    }
}

/// Namespace of a single item. Workflows never write outside of it.
#[derive(Clone, Debug)]
pub struct ItemArtifacts {
    dir: PathBuf,
}

impl ItemArtifacts {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        write_json(&self.dir, name, value).await
    }

    pub async fn write_text(&self, name: &str, text: &str) -> Result<PathBuf> {
        write_bytes(&self.dir, name, text.as_bytes()).await
    }
}

async fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let data = serde_json::to_vec_pretty(value)?;
    write_bytes(dir, name, &data).await
}

/// Written to `<name>.part` first so readers never see half a file.
async fn write_bytes(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    let temp_file = dir.join(format!("{}.part", name));

    let mut file = fs::File::create(&temp_file).await?;
    file.write_all(data).await?;
    file.flush().await?;
    drop(file);

    fs::rename(&temp_file, &path).await?;
    Ok(path)
}

/// Item ids come from the command line, keep them to one path segment.
///
/// The mapping is one to one, two different ids never share a directory.
fn sanitize(item_id: &str) -> String {
    match item_id {
        "" => "%".to_owned(),
        "." => "%2E".to_owned(),
        ".." => "%2E%2E".to_owned(),
        _ => utils::percent_encode(item_id),
    }
}
