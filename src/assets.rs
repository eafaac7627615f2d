use std::collections::HashMap;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Arc;

use bevy::prelude::*;

use crate::components::AssetRef;

/// Resolves asset paths supplied by remote callers into stored references.
pub trait AssetStore: Send + Sync {
    fn resolve(&self, path: &str) -> Option<AssetRef>;
}

#[derive(Resource, Clone)]
pub struct AssetStoreHandle(pub Arc<dyn AssetStore>);

/// Looks assets up on disk below a root directory.
pub struct DirectoryAssetStore {
    root: PathBuf,
}

impl DirectoryAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetStore for DirectoryAssetStore {
    fn resolve(&self, path: &str) -> Option<AssetRef> {
        let relative = normalize_asset_path(path)?;
        let full = self.root.join(&relative);
        if !full.is_file() {
            return None;
        }
        Some(AssetRef {
            kind: asset_kind(&relative).to_string(),
            path: relative,
        })
    }
}

/// Fixed set of known assets, used by tests and embedded hosts.
#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: HashMap<String, String>,
}

impl InMemoryAssetStore {
    pub fn with_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let assets = paths
            .into_iter()
            .filter_map(|p| normalize_asset_path(&p.into()))
            .map(|p| {
                let kind = asset_kind(&p).to_string();
                (p, kind)
            })
            .collect();
        Self { assets }
    }
}

impl AssetStore for InMemoryAssetStore {
    fn resolve(&self, path: &str) -> Option<AssetRef> {
        let relative = normalize_asset_path(path)?;
        let kind = self.assets.get(&relative)?;
        Some(AssetRef {
            path: relative,
            kind: kind.clone(),
        })
    }
}

/// Strips an optional `assets/` prefix and rejects anything that escapes the
/// asset root.
pub fn normalize_asset_path(path: &str) -> Option<String> {
    let trimmed = path.trim().replace('\\', "/");
    let trimmed = trimmed.trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("assets/").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|c| !matches!(c, PathComponent::Normal(_)))
    {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn asset_kind(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "bmp" => "texture",
        "wav" | "ogg" | "mp3" => "audio",
        "json" | "ron" => "data",
        "scn" | "prefab" => "prefab",
        _ => "file",
    }
}
