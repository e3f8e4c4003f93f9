//! Server registry file I/O (spec §4.C `registry/servers.json`). The
//! `mcpServers`/`servers` top-level key acceptance and default-filling
//! live one layer up in `skillflow-mcp::config`; this module only reads
//! and writes the already-normalised `Vec<ServerConfig>` atomically.

use std::path::Path;

use crate::atomic::{read_json, write_json_atomic};
use crate::model::ServerConfig;
use crate::paths::registry_path;

/// Reads the registry. A missing file is an empty registry; a corrupt
/// file is also treated as an empty registry (spec §4.C failure policy),
/// logged rather than propagated.
pub async fn load_registry(root: &Path) -> Vec<ServerConfig> {
    let path = registry_path(root);
    if !path.exists() {
        return Vec::new();
    }
    match read_json::<Vec<ServerConfig>>(&path).await {
        Ok(servers) => servers,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt server registry, returning empty registry");
            Vec::new()
        }
    }
}

pub async fn save_registry(root: &Path, servers: &[ServerConfig]) -> crate::error::StorageResult<()> {
    write_json_atomic(&registry_path(root), &servers).await
}
