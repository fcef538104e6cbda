// SPDX-License-Identifier: AGPL-3.0-or-later
//! Descriptor file loading
//!
//! Supports TOML and JSON. A directory is read as one set: every `.toml` and
//! `.json` file in it, in file-name order.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::DescriptorSet;
use crate::error::{OutpostError, Result};

impl DescriptorSet {
    /// Load a set from a file or a directory of files
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.is_dir() {
            let mut set = DescriptorSet::default();
            for file in list_descriptor_files(path)? {
                set.merge(Self::from_file(&file)?);
            }
            return Ok(set);
        }

        Self::from_file(path)
    }

    /// Parse a single descriptor file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(OutpostError::DescriptorParse {
                path: path.display().to_string(),
                message: "file not found".to_string(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let set = match extension {
            "toml" => Self::from_toml(&contents, path),
            "json" => Self::from_json(&contents, path),
            _ => Err(OutpostError::DescriptorParse {
                path: path.display().to_string(),
                message: format!("Unsupported file extension: {}", extension),
            }),
        }?;

        debug!(
            path = %path.display(),
            providers = set.providers.len(),
            declarations = set.declarations.len(),
            "Loaded descriptor file"
        );
        Ok(set)
    }

    fn from_toml(contents: &str, path: &Path) -> Result<Self> {
        toml::from_str(contents).map_err(|e| OutpostError::DescriptorParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn from_json(contents: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| OutpostError::DescriptorParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Descriptor files directly inside `dir`, sorted
pub fn list_descriptor_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext == "toml" || ext == "json" {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}
