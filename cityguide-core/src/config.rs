use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::network::{CertificatePin, MULTIPLIER_CEILING};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CityGuideConfig {
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub enrichment: EnrichmentSection,
    #[serde(default)]
    pub cache: CacheSection,
}

impl CityGuideConfig {
    /// Relative cache paths are resolved against the config file's directory.
    pub fn resolve_path<P: AsRef<Path>>(&self, base_dir: &Path, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: String| ConfigError::Invalid {
            message,
            path: path.to_path_buf(),
        };
        if self.enrichment.batch_size == 0 {
            return Err(invalid("enrichment.batch_size must be at least 1".into()));
        }
        let radius = self.discovery.city_radius_m;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(invalid("discovery.city_radius_m must be positive".into()));
        }
        if self.discovery.max_results == 0 {
            return Err(invalid("discovery.max_results must be at least 1".into()));
        }
        let limits = &self.rate_limit;
        if !limits.max_multiplier.is_finite()
            || !(1.0..=MULTIPLIER_CEILING).contains(&limits.max_multiplier)
        {
            return Err(invalid(format!(
                "rate_limit.max_multiplier must be between 1 and {MULTIPLIER_CEILING}"
            )));
        }
        if !limits.multiplier.is_finite()
            || limits.multiplier <= 0.0
            || limits.multiplier > limits.max_multiplier
        {
            return Err(invalid(
                "rate_limit.multiplier must be positive and at most max_multiplier".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub base_delay_ms: u64,
    pub safe_mode_delay_ms: u64,
    pub background_delay_ms: u64,
    pub safe_mode: bool,
    pub multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            safe_mode_delay_ms: 1000,
            background_delay_ms: 50,
            safe_mode: false,
            multiplier: 1.0,
            max_multiplier: 8.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub pins: Vec<CertificatePin>,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            user_agent: format!("cityguide/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
            pins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub overpass_endpoint: String,
    pub nominatim_endpoint: String,
    pub city_radius_m: f64,
    pub max_results: usize,
    pub overpass_timeout_seconds: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            overpass_endpoint: "https://overpass-api.de/api/interpreter".to_string(),
            nominatim_endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
            city_radius_m: 5000.0,
            max_results: 100,
            overpass_timeout_seconds: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentSection {
    pub language: String,
    pub batch_size: usize,
    /// `{lang}` is replaced by the wiki language.
    pub wikipedia_base_url: String,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            language: "de".to_string(),
            batch_size: 5,
            wikipedia_base_url: "https://{lang}.wikipedia.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub path: String,
    pub ttl_hours: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: "data/poi_cache.sqlite".to_string(),
            ttl_hours: 24 * 7,
        }
    }
}

pub fn load_cityguide_config<P: AsRef<Path>>(path: P) -> Result<CityGuideConfig> {
    let path = path.as_ref();
    let config: CityGuideConfig = load_toml(path)?;
    config.validate(path)?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
