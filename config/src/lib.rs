// SPDX-License-Identifier: MPL-2.0

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const NAME: &str = "drmprime-overlay";
pub const FILE_NAME: &str = "config.ron";

/// Highest `zwp_linux_dmabuf_v1` version that still sends `format`/`modifier` events.
pub const MAX_DMABUF_VERSION: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Where the video subsurface sits relative to the embedding surface.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    // beneath the host UI, which draws transparent holes over the video
    #[default]
    Below,
    Above,
}

/// Which presentation rectangle sizes the negotiated buffer.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferExtent {
    #[default]
    Destination,
    Source,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Setters)]
#[serde(default, deny_unknown_fields)]
#[must_use]
pub struct Config {
    /// highest zwp_linux_dmabuf_v1 version to bind
    pub dmabuf_version: u32,
    /// wl_subcompositor version to bind
    pub subcompositor_version: u32,
    /// stacking of the video subsurface
    pub placement: Placement,
    /// rectangle used as the buffer size during negotiation
    pub buffer_extent: BufferExtent,
    /// submit the frame's format modifier instead of zero
    pub forward_modifiers: bool,
    /// round trips to wait for a negotiation outcome before giving up
    pub max_outcome_roundtrips: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dmabuf_version: MAX_DMABUF_VERSION,
            subcompositor_version: 1,
            placement: Placement::default(),
            buffer_extent: BufferExtent::default(),
            forward_modifiers: false,
            max_outcome_roundtrips: 4,
        }
    }
}

impl Config {
    /// Default location, `$XDG_CONFIG_HOME/drmprime-overlay/config.ron`.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(NAME).join(FILE_NAME))
    }

    /// Load the config from its default location.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, Error> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("no config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load the config from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(why) if why.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file missing, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(Error::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::from_ron_str(&contents)
    }

    /// Parse a RON document, clamping values the protocol cannot honour.
    ///
    /// # Errors
    ///
    /// Fails on malformed RON or unknown fields.
    pub fn from_ron_str(contents: &str) -> Result<Self, Error> {
        let config: Self = ron::from_str(contents)?;
        Ok(config.sanitized())
    }

    /// # Errors
    ///
    /// Fails if the config cannot be serialized.
    pub fn to_ron_string(&self) -> Result<String, Error> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    fn sanitized(mut self) -> Self {
        if self.dmabuf_version == 0 || self.dmabuf_version > MAX_DMABUF_VERSION {
            tracing::warn!(
                requested = self.dmabuf_version,
                max = MAX_DMABUF_VERSION,
                "dmabuf_version out of range, clamping"
            );
            self.dmabuf_version = self.dmabuf_version.clamp(1, MAX_DMABUF_VERSION);
        }
        self.subcompositor_version = self.subcompositor_version.max(1);
        self.max_outcome_roundtrips = self.max_outcome_roundtrips.max(1);
        self
    }
}
