// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI configuration loaded from environment variables.

use std::path::PathBuf;

use tolbrep_topology::ModelingOptions;

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tracing filter directives.
    pub log_filter: String,
    /// Directory for outputs given without a path.
    pub output_dir: PathBuf,
    /// Mesh parameters applied before the command line ones
    /// (`name=value`, comma-separated).
    pub mesh_params: Vec<(String, String)>,
    /// Resolutions used when loading models.
    pub modeling: ModelingOptions,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tolbrep_topology=info".into()),
            output_dir: std::env::var("TOLBREP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            mesh_params: std::env::var("TOLBREP_MESH_PARAMS")
                .map(|v| parse_pairs(&v))
                .unwrap_or_default(),
            modeling: ModelingOptions::from_env(),
        }
    }

    /// Resolves an output file name against the output directory.
    pub fn output_path(&self, name: &str) -> PathBuf {
        let path = PathBuf::from(name);
        if path.is_absolute() || path.components().count() > 1 {
            path
        } else {
            self.output_dir.join(path)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Parses `a=1,b=2` into pairs, skipping malformed entries.
pub fn parse_pairs(text: &str) -> Vec<(String, String)> {
    text.split(',')
        .filter_map(|item| {
            let (name, value) = item.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs("max_size=0.5, gradation = 1.1,broken,=3");
        assert_eq!(
            pairs,
            vec![
                ("max_size".to_string(), "0.5".to_string()),
                ("gradation".to_string(), "1.1".to_string()),
            ]
        );
    }

    #[test]
    fn test_output_path() {
        let config = Config {
            log_filter: "info".into(),
            output_dir: PathBuf::from("/tmp/out"),
            mesh_params: Vec::new(),
            modeling: ModelingOptions::default(),
        };
        assert_eq!(config.output_path("a.sat"), PathBuf::from("/tmp/out/a.sat"));
        assert_eq!(config.output_path("dir/a.sat"), PathBuf::from("dir/a.sat"));
    }
}
