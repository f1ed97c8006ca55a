use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dump::DEFAULT_MAX_RECORD_BYTES;
use crate::render::SvgOptions;
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SVG layout and node cap
    pub render: SvgOptions,
    /// Default extra levels for `owners`
    pub owners_depth: usize,
    /// Upper bound on any single length-prefixed field in a dump
    pub max_record_bytes: u64,
    /// Configured go binary (None = look it up on PATH)
    pub go_binary: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            render: SvgOptions::default(),
            owners_depth: 2,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            go_binary: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlRenderConfig {
    pub max_nodes: Option<usize>,
    pub node_width: Option<u64>,
    pub node_height: Option<u64>,
    pub rank_gap: Option<u64>,
    pub node_gap: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlQueryConfig {
    pub owners_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlDecoderConfig {
    pub max_record_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlToolPaths {
    pub go: Option<PathBuf>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub render: Option<TomlRenderConfig>,
    pub query: Option<TomlQueryConfig>,
    pub decoder: Option<TomlDecoderConfig>,
    pub tools: Option<TomlToolPaths>,
}

impl Config {
    /// Load configuration from ~/.heapsift/config.toml, merging with defaults
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load configuration from `path`, merging with defaults.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is
    /// reported and ignored.
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file");
                return Self::default();
            }
        };
        match Self::parse(&contents) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }
        }
    }

    /// Parse TOML contents on top of the defaults.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let toml_config: TomlConfig = toml::from_str(contents)?;
        let mut config = Self::default();
        config.merge(toml_config);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(render) = toml_config.render {
            if let Some(max_nodes) = render.max_nodes {
                self.render.max_nodes = max_nodes;
            }
            if let Some(node_width) = render.node_width {
                self.render.node_width = node_width;
            }
            if let Some(node_height) = render.node_height {
                self.render.node_height = node_height;
            }
            if let Some(rank_gap) = render.rank_gap {
                self.render.rank_gap = rank_gap;
            }
            if let Some(node_gap) = render.node_gap {
                self.render.node_gap = node_gap;
            }
        }

        if let Some(depth) = toml_config.query.and_then(|q| q.owners_depth) {
            self.owners_depth = depth;
        }

        if let Some(max) = toml_config.decoder.and_then(|d| d.max_record_bytes) {
            self.max_record_bytes = max;
        }

        if let Some(go) = toml_config.tools.and_then(|t| t.go) {
            self.go_binary = Some(go);
        }
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.render.max_nodes = max_nodes;
        self
    }
}
