//! One-shot loading of the furniture model.
//!
//! The asset format is opaque to the pipeline: a loader only has to produce
//! the raw resource. Placing it (nominal scale, initial offset) is done here.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;

use crate::config::AssetConfig;
use crate::error::AssetLoadError;
use crate::models::PlacedModel;

/// Where a model lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    Path(PathBuf),
    Url(String),
}

impl ModelRef {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }
}

/// Container format sniffed from the first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Glb,
    GltfJson,
    Unknown,
}

impl ModelFormat {
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"glTF") {
            Self::Glb
        } else if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
            Self::GltfJson
        } else {
            Self::Unknown
        }
    }
}

/// A loaded, not yet placed, model resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    pub reference: ModelRef,
    pub format: ModelFormat,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, reference: &ModelRef) -> Result<ModelAsset, AssetLoadError>;
}

/// Loads models from the local filesystem or over HTTP.
#[derive(Debug, Clone, Default)]
pub struct ResourceLoader {
    client: Client,
    /// Directory that absolute web-style paths (`/3DModels/...`) resolve against.
    asset_root: Option<PathBuf>,
}

impl ResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.asset_root {
            Some(root) if path.is_absolute() => {
                root.join(path.strip_prefix("/").unwrap_or(path))
            }
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ModelLoader for ResourceLoader {
    async fn load(&self, reference: &ModelRef) -> Result<ModelAsset, AssetLoadError> {
        let bytes = match reference {
            ModelRef::Path(path) => {
                let resolved = self.resolve(path);
                tokio::fs::read(&resolved).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        AssetLoadError::NotFound(resolved.display().to_string())
                    }
                    _ => AssetLoadError::Io(format!("{}: {}", resolved.display(), e)),
                })?
            }
            ModelRef::Url(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| AssetLoadError::Fetch(e.to_string()))?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(AssetLoadError::NotFound(url.clone()));
                }
                let response = response
                    .error_for_status()
                    .map_err(|e| AssetLoadError::Fetch(e.to_string()))?;
                response
                    .bytes()
                    .await
                    .map_err(|e| AssetLoadError::Fetch(e.to_string()))?
                    .to_vec()
            }
        };

        if bytes.is_empty() {
            return Err(AssetLoadError::Empty(reference.display()));
        }
        let format = ModelFormat::sniff(&bytes);
        if format == ModelFormat::Unknown {
            tracing::warn!(model = %reference.display(), "Model format not recognized, loading anyway");
        }
        Ok(ModelAsset {
            reference: reference.clone(),
            format,
            bytes,
        })
    }
}

/// Load state of the single model, distinguishing "never tried" from "failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotAttempted,
    Loading,
    Loaded,
    Failed(String),
}

/// Tracks the one-shot load and turns a loaded asset into a [`PlacedModel`].
#[derive(Debug)]
pub struct AssetLoader {
    config: AssetConfig,
    reference: ModelRef,
    state: LoadState,
}

impl AssetLoader {
    pub fn new(config: &AssetConfig) -> Self {
        Self {
            reference: ModelRef::parse(&config.model),
            config: config.clone(),
            state: LoadState::NotAttempted,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn reference(&self) -> &ModelRef {
        &self.reference
    }

    /// Claim the single load. Fails if a load was already started.
    pub fn begin(&mut self) -> Result<ModelRef, AssetLoadError> {
        if self.state != LoadState::NotAttempted {
            return Err(AssetLoadError::AlreadyAttempted);
        }
        self.state = LoadState::Loading;
        tracing::info!(model = %self.reference.display(), "Loading model");
        Ok(self.reference.clone())
    }

    /// Record the load result. On success the returned model carries the
    /// nominal scale and initial offset.
    pub fn finish(
        &mut self,
        result: Result<ModelAsset, AssetLoadError>,
    ) -> Result<PlacedModel, AssetLoadError> {
        match result {
            Ok(asset) => {
                self.state = LoadState::Loaded;
                tracing::info!(
                    model = %asset.reference.display(),
                    format = ?asset.format,
                    bytes = asset.bytes.len(),
                    "Model loaded"
                );
                Ok(PlacedModel::new(
                    asset.reference.display(),
                    self.config.nominal_scale,
                    self.config.initial_offset,
                    asset.bytes.len(),
                ))
            }
            Err(e) => {
                tracing::debug!(model = %self.reference.display(), "Model load failed");
                self.state = LoadState::Failed(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn parses_urls_and_paths() {
        assert_eq!(
            ModelRef::parse("https://cdn.example.com/sofa.glb"),
            ModelRef::Url("https://cdn.example.com/sofa.glb".into())
        );
        assert_eq!(
            ModelRef::parse("/3DModels/painted_sofa.glb"),
            ModelRef::Path(PathBuf::from("/3DModels/painted_sofa.glb"))
        );
    }

    #[test]
    fn sniffs_container_format() {
        assert_eq!(ModelFormat::sniff(b"glTF\x02\x00\x00\x00"), ModelFormat::Glb);
        assert_eq!(ModelFormat::sniff(b"  {\"asset\":{}}"), ModelFormat::GltfJson);
        assert_eq!(ModelFormat::sniff(b"OBJ"), ModelFormat::Unknown);
    }

    #[test]
    fn load_is_one_shot() {
        let mut loader = AssetLoader::new(&AssetConfig::default());
        assert_eq!(loader.state(), &LoadState::NotAttempted);
        loader.begin().unwrap();
        assert_eq!(loader.begin(), Err(AssetLoadError::AlreadyAttempted));
    }

    #[test]
    fn finish_applies_nominal_scale_and_offset() {
        let mut loader = AssetLoader::new(&AssetConfig::default());
        let reference = loader.begin().unwrap();
        let model = loader
            .finish(Ok(ModelAsset {
                reference,
                format: ModelFormat::Glb,
                bytes: b"glTF".to_vec(),
            }))
            .unwrap();
        assert_eq!(model.scale, Vec3::new(1.27, 0.9144, 0.76));
        assert_eq!(model.position, Vec3::new(0.0, -0.1, -0.8));
        assert_eq!(loader.state(), &LoadState::Loaded);
    }

    #[test]
    fn failure_is_distinct_from_not_attempted() {
        let mut loader = AssetLoader::new(&AssetConfig::default());
        loader.begin().unwrap();
        let err = loader
            .finish(Err(AssetLoadError::NotFound("sofa.glb".into())))
            .unwrap_err();
        assert_eq!(err, AssetLoadError::NotFound("sofa.glb".into()));
        assert!(matches!(loader.state(), LoadState::Failed(_)));
    }

    #[tokio::test]
    async fn resolves_web_paths_against_asset_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("3DModels")).unwrap();
        std::fs::write(dir.path().join("3DModels/sofa.glb"), b"glTF\x02").unwrap();

        let loader = ResourceLoader::new().with_asset_root(dir.path());
        let asset = loader
            .load(&ModelRef::parse("/3DModels/sofa.glb"))
            .await
            .unwrap();
        assert_eq!(asset.format, ModelFormat::Glb);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ResourceLoader::new().with_asset_root(dir.path());
        let err = loader
            .load(&ModelRef::parse("/3DModels/missing.glb"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetLoadError::NotFound(_)));
    }
}
