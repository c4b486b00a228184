//! Allocator configuration
//!
//! One section per heap kind, every field optional:
//!
//! ```toml
//! [cbv_srv_uav]
//! descriptors_per_page = 1024
//!
//! [sampler]
//! descriptors_per_page = 64
//! max_descriptors_per_page = 2048
//!
//! [dsv]
//! stride = 8
//! ```
//!
//! Files are loaded through the `config` crate, so any value can be
//! overridden from the environment, e.g.
//! `PHOTON_DESCRIPTORS__SAMPLER__DESCRIPTORS_PER_PAGE=128`.

use crate::descriptor::DescriptorHeapKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "PHOTON_DESCRIPTORS";

/// Settings for the allocator of one heap kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Capacity of each new page
    pub descriptors_per_page: u32,
    /// Largest single request; defaults to the device limit for the kind
    pub max_descriptors_per_page: Option<u32>,
    /// Handle stride override for synthetic heaps
    ///
    /// Applied by `DescriptorAllocator::from_config` and
    /// `DescriptorAllocators::new`. A caller-supplied heap provider picks its
    /// own stride and ignores this.
    pub stride: Option<u32>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            descriptors_per_page: 256,
            max_descriptors_per_page: None,
            stride: None,
        }
    }
}

impl AllocatorConfig {
    pub fn with_page_size(descriptors_per_page: u32) -> Self {
        Self {
            descriptors_per_page,
            ..Self::default()
        }
    }

    /// Effective request limit for `kind`
    pub fn max_for(&self, kind: DescriptorHeapKind) -> u32 {
        self.max_descriptors_per_page
            .unwrap_or_else(|| kind.max_heap_size())
    }

    pub fn validate(&self, kind: DescriptorHeapKind) -> Result<()> {
        if self.descriptors_per_page == 0 {
            return Err(Error::InvalidArgument(format!(
                "{}: descriptors_per_page must be at least 1",
                kind
            )));
        }
        let max = self.max_for(kind);
        if self.descriptors_per_page > max {
            return Err(Error::InvalidArgument(format!(
                "{}: descriptors_per_page {} exceeds max_descriptors_per_page {}",
                kind, self.descriptors_per_page, max
            )));
        }
        if self.stride == Some(0) {
            return Err(Error::InvalidArgument(format!(
                "{}: stride must be non-zero",
                kind
            )));
        }
        Ok(())
    }
}

/// Configuration for every heap kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    pub cbv_srv_uav: AllocatorConfig,
    pub sampler: AllocatorConfig,
    pub rtv: AllocatorConfig,
    pub dsv: AllocatorConfig,
}

impl DescriptorConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply `PHOTON_DESCRIPTORS__*` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path.as_ref(), None)
    }

    /// Load a TOML file with overrides read from `env` instead of the process
    /// environment when it is given
    fn load_with_env(path: &Path, env: Option<::config::Map<String, String>>) -> Result<Self> {
        info!(path = ?path, "Loading descriptor allocator configuration");

        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(format!("Failed to load {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn get(&self, kind: DescriptorHeapKind) -> &AllocatorConfig {
        match kind {
            DescriptorHeapKind::CbvSrvUav => &self.cbv_srv_uav,
            DescriptorHeapKind::Sampler => &self.sampler,
            DescriptorHeapKind::Rtv => &self.rtv,
            DescriptorHeapKind::Dsv => &self.dsv,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for kind in DescriptorHeapKind::ALL {
            self.get(kind).validate(kind)?;
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }
}
