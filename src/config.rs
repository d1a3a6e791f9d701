use crate::compression::CompressionOptions;
use crate::constants::{
    AVATAR_PLACEHOLDER, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_RETRIES, DEFAULT_MAX_SIZE_MB,
    DEFAULT_MAX_WIDTH, DEFAULT_PLACEHOLDER, DEFAULT_QUALITY, DEFAULT_QUALITY_FLOOR,
    DEFAULT_QUALITY_STEP, DEFAULT_TIMEOUT_SECS, POST_PLACEHOLDER, PROPERTY_PLACEHOLDER,
};
use crate::error::{MediaError, Result};
use crate::resolver::PlaceholderRegistry;
use crate::storage_path::EntityType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Pipeline settings loaded from TOML. Every field has a default.
///
/// The auth token is not part of the config; callers pass it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api_endpoint: Option<String>,
    pub public_base_url: Option<String>,
    pub timeout_secs: u64,
    pub compression: CompressionConfig,
    pub placeholders: PlaceholderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_endpoint: None,
            public_base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            compression: CompressionConfig::default(),
            placeholders: PlaceholderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: f32,
    pub max_size_mb: f64,
    pub max_retries: u32,
    pub quality_step: f32,
    pub quality_floor: f32,
    pub format: Option<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            quality: DEFAULT_QUALITY,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_retries: DEFAULT_MAX_RETRIES,
            quality_step: DEFAULT_QUALITY_STEP,
            quality_floor: DEFAULT_QUALITY_FLOOR,
            format: None,
        }
    }
}

impl CompressionConfig {
    pub fn to_options(&self) -> Result<CompressionOptions> {
        let options = CompressionOptions {
            max_width: self.max_width,
            max_height: self.max_height,
            quality: self.quality,
            max_size_mb: self.max_size_mb,
            max_retries: self.max_retries,
            quality_step: self.quality_step,
            quality_floor: self.quality_floor,
            format: self.format.clone(),
        };
        options.validate()?;
        Ok(options)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub default: String,
    pub users: Option<String>,
    pub properties: Option<String>,
    pub posts: Option<String>,
    pub agents: Option<String>,
    pub testimonials: Option<String>,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_PLACEHOLDER.to_string(),
            users: Some(AVATAR_PLACEHOLDER.to_string()),
            properties: Some(PROPERTY_PLACEHOLDER.to_string()),
            posts: Some(POST_PLACEHOLDER.to_string()),
            agents: Some(AVATAR_PLACEHOLDER.to_string()),
            testimonials: Some(AVATAR_PLACEHOLDER.to_string()),
        }
    }
}

impl PlaceholderConfig {
    pub fn to_registry(&self) -> PlaceholderRegistry {
        let entries = [
            (EntityType::Users, &self.users),
            (EntityType::Properties, &self.properties),
            (EntityType::Posts, &self.posts),
            (EntityType::Agents, &self.agents),
            (EntityType::Testimonials, &self.testimonials),
        ];

        entries
            .into_iter()
            .fold(PlaceholderRegistry::new(&self.default), |registry, (entity, path)| {
                match path {
                    Some(path) => registry.with(entity, path),
                    None => registry,
                }
            })
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MediaError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(MediaError::Config("timeout_secs must be positive".to_string()));
        }

        if let Some(endpoint) = &self.api_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(MediaError::Config(format!(
                    "api_endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }

        self.compression.to_options()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
