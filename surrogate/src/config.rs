//! Daemon configuration, deserialized from TOML. Loading the file from a
//! path is a thin, documented seam — file-watching/hot-reload is out of
//! scope here.

use serde::{Deserialize, Serialize};
use std::path::Path;
use surrogate_shared::{SurrogateError, SurrogateResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurrogateConfig {
    #[serde(rename = "static")]
    pub static_section: StaticSection,
    pub cpu: CpuSection,
    #[serde(default)]
    pub network: NetworkSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSection {
    /// Node identifier, required.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSection {
    /// Number of core workers.
    pub cores: usize,
    /// Scaling factor for the profiling complexity metric.
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Reserved.
    pub speed: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self { speed: 0 }
    }
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            static_section: StaticSection {
                name: "surrogate-node".to_string(),
            },
            cpu: CpuSection {
                cores: 4,
                strength: 1.0,
            },
            network: NetworkSection::default(),
        }
    }
}

impl SurrogateConfig {
    pub fn from_toml_str(contents: &str) -> SurrogateResult<Self> {
        toml::from_str(contents).map_err(|e| SurrogateError::Internal(format!("invalid config: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> SurrogateResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SurrogateError::FileAccess(format!("Error reading config at {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&contents)
    }
}
