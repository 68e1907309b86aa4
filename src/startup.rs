//! One-time checks run before the poll loop starts.

use std::path::Path;

use anyhow::{Context, Result};

use crate::remote::DocumentService;

/// Probe the service root. Advisory only: the caller carries on either way.
pub fn check_connectivity<S: DocumentService + ?Sized>(service: &S) -> bool {
    match service.ping() {
        Ok(()) => {
            tracing::info!("Document service reachable");
            true
        }
        Err(e) => {
            tracing::error!("Document service unreachable: {e}");
            false
        }
    }
}

/// Resolve the site tag id once. Any failure degrades to untagged uploads.
pub fn resolve_site_tag<S: DocumentService + ?Sized>(service: &S, site_name: &str) -> Option<u64> {
    if site_name.is_empty() {
        tracing::info!("No site name configured; uploads will be untagged");
        return None;
    }
    match service.find_tag(site_name) {
        Ok(Some(id)) => {
            tracing::info!("Resolved site tag '{site_name}' to id {id}");
            Some(id)
        }
        Ok(None) => {
            tracing::warn!(
                "Tag '{site_name}' not found, create it first on the document service. Uploads will be untagged"
            );
            None
        }
        Err(e) => {
            tracing::error!("Failed to resolve tag '{site_name}': {e}");
            None
        }
    }
}

/// Create the archive and failure directories if they are missing.
pub fn ensure_dirs(dirs: &[&Path]) -> Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    Ok(())
}
