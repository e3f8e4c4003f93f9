//! Atomic JSON file I/O (spec §4.C): serialise to a sibling temp file,
//! then rename, so readers observe either the old or the new file intact.

use std::path::Path;

use rand::Rng;
use serde::Serialize;
use tokio::fs;

use crate::error::StorageResult;

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    let suffix: u32 = rand::rng().random();
    let tmp_path = path.with_extension(format!("tmp.{suffix:08x}"));
    fs::write(&tmp_path, &body).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let body = fs::read(path).await?;
    Ok(serde_json::from_slice(&body)?)
}
