//! Layer configuration
//!
//! Loaded from JSON; every field has a default so an empty object (or no
//! file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::{CodecOptions, DEFAULT_ITEM_TAG};
use crate::container::DEFAULT_CONTAINER_TAG;
use crate::error::{Result, SyncError};
use crate::observer::DEFAULT_MAX_DISPATCH_EVENTS;

fn default_container_tag() -> String {
    DEFAULT_CONTAINER_TAG.to_string()
}

fn default_item_tag() -> String {
    DEFAULT_ITEM_TAG.to_string()
}

fn default_max_dispatch_events() -> usize {
    DEFAULT_MAX_DISPATCH_EVENTS
}

fn default_retype() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Node name for newly created containers
    #[serde(default = "default_container_tag")]
    pub container_tag: String,

    /// Item tag used when an array property has no explicit one
    #[serde(default = "default_item_tag")]
    pub default_item_tag: String,

    /// Events handled by one dispatch run before yielding
    #[serde(default = "default_max_dispatch_events")]
    pub max_dispatch_events: usize,

    /// Retype string leaves when decoding
    #[serde(default = "default_retype")]
    pub retype_strings: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            container_tag: default_container_tag(),
            default_item_tag: default_item_tag(),
            max_dispatch_events: default_max_dispatch_events(),
            retype_strings: true,
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loading configuration from {}", path.display());
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.container_tag.is_empty() {
            return Err(SyncError::Config("containerTag must not be empty".to_string()));
        }
        if self.default_item_tag.is_empty() {
            return Err(SyncError::Config("defaultItemTag must not be empty".to_string()));
        }
        if self.max_dispatch_events == 0 {
            return Err(SyncError::Config("maxDispatchEvents must be positive".to_string()));
        }
        Ok(())
    }

    /// Codec options seeded with this configuration's defaults
    pub fn codec_options(&self) -> CodecOptions {
        let options = CodecOptions::new().with_default_item_tag(self.default_item_tag.clone());
        if self.retype_strings {
            options
        } else {
            options.without_retyping()
        }
    }
}
