//! Checkpoint file resolution and device selection for Candle models

use sepsight_core::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Source location for a checkpoint
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// Local directory holding the checkpoint files
    LocalDir(PathBuf),

    /// Download from Hugging Face Hub
    HuggingFace {
        repo_id: String,
        revision: Option<String>,
    },
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalDir(path) => write!(f, "{}", path.display()),
            Self::HuggingFace { repo_id, revision } => match revision {
                Some(rev) => write!(f, "hf://{repo_id}@{rev}"),
                None => write!(f, "hf://{repo_id}"),
            },
        }
    }
}

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
            Self::Metal(idx) => write!(f, "metal:{idx}"),
        }
    }
}

/// Files of one checkpoint, fetched lazily from its source
pub struct ModelFiles {
    source: ModelSource,
    #[cfg(feature = "ml-models")]
    repo: Option<hf_hub::api::sync::ApiRepo>,
}

impl ModelFiles {
    /// Open a checkpoint source
    pub fn open(source: ModelSource) -> Result<Self> {
        match &source {
            ModelSource::LocalDir(path) => {
                if !path.is_dir() {
                    return Err(Error::model_load(format!(
                        "Model directory not found: {}",
                        path.display()
                    )));
                }
                Ok(Self {
                    source,
                    #[cfg(feature = "ml-models")]
                    repo: None,
                })
            }
            #[cfg(feature = "ml-models")]
            ModelSource::HuggingFace { repo_id, revision } => {
                use hf_hub::{api::sync::Api, Repo, RepoType};

                let api = Api::new()
                    .map_err(|e| Error::model_load(format!("Failed to initialize HF API: {}", e)))?;

                let repo = api.repo(Repo::with_revision(
                    repo_id.clone(),
                    RepoType::Model,
                    revision.clone().unwrap_or_else(|| "main".to_string()),
                ));

                Ok(Self {
                    source,
                    repo: Some(repo),
                })
            }
            #[cfg(not(feature = "ml-models"))]
            ModelSource::HuggingFace { .. } => Err(Error::model_load(
                "HuggingFace download requires 'ml-models' feature",
            )),
        }
    }

    /// Where these files come from
    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Resolve a required file
    pub fn get(&self, filename: &str) -> Result<PathBuf> {
        self.try_get(filename).ok_or_else(|| {
            Error::model_load(format!("'{}' not found in {}", filename, self.source))
        })
    }

    /// Resolve an optional file
    pub fn try_get(&self, filename: &str) -> Option<PathBuf> {
        match &self.source {
            ModelSource::LocalDir(dir) => {
                let path = dir.join(filename);
                path.exists().then_some(path)
            }
            ModelSource::HuggingFace { .. } => {
                #[cfg(feature = "ml-models")]
                {
                    let repo = self.repo.as_ref()?;
                    match repo.get(filename) {
                        Ok(path) => Some(path),
                        Err(e) => {
                            tracing::debug!("{} not available from {}: {}", filename, self.source, e);
                            None
                        }
                    }
                }
                #[cfg(not(feature = "ml-models"))]
                {
                    None
                }
            }
        }
    }

    /// Resolve the first file of `candidates` that exists
    pub fn first_of(&self, candidates: &[&str]) -> Result<PathBuf> {
        candidates
            .iter()
            .find_map(|name| self.try_get(name))
            .ok_or_else(|| {
                Error::model_load(format!(
                    "none of {:?} found in {}",
                    candidates, self.source
                ))
            })
    }
}

/// Create Candle device from device type
#[cfg(feature = "ml-models")]
pub fn create_device(device_type: DeviceType) -> Result<candle_core::Device> {
    use candle_core::Device;

    match device_type {
        DeviceType::Cpu => Ok(Device::Cpu),
        DeviceType::Cuda(idx) => Device::new_cuda(idx)
            .map_err(|e| Error::model_load(format!("Failed to create CUDA device: {}", e))),
        DeviceType::Metal(idx) => Device::new_metal(idx)
            .map_err(|e| Error::model_load(format!("Failed to create Metal device: {}", e))),
    }
}

/// Load a weights file into a VarBuilder, picking the reader by extension
#[cfg(feature = "ml-models")]
pub fn load_weights(
    path: &Path,
    device: &candle_core::Device,
) -> Result<candle_nn::VarBuilder<'static>> {
    use candle_core::DType;
    use candle_nn::VarBuilder;

    let is_safetensors = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext == "safetensors");

    if is_safetensors {
        // SAFETY: the file is not modified while mapped
        unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }
            .map_err(|e| Error::model_load(format!("Failed to load SafeTensors: {}", e)))
    } else {
        VarBuilder::from_pth(path, DType::F32, device)
            .map_err(|e| Error::model_load(format!("Failed to load PyTorch weights: {}", e)))
    }
}

/// Read a JSON config file
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::model_load(format!("Failed to parse {}: {}", path.display(), e)))
}
