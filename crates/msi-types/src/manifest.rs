//! Domain manifests: the initial grant set and seal flag for a new domain.

use std::{fs, io, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grant::Grant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainManifest {
    pub name: String,
    #[serde(default)]
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub seal: bool,
}

impl DomainManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grants: Vec::new(),
            seal: false,
        }
    }

    pub fn grant(mut self, grant: Grant) -> Self {
        self.grants.push(grant);
        self
    }

    pub fn sealed(mut self) -> Self {
        self.seal = true;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load_manifest_from_path(path: impl AsRef<Path>) -> Result<DomainManifest, ManifestError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    DomainManifest::from_json_str(&text)
}
