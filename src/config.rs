//! Layered configuration.
//!
//! Uses Figment to merge compiled defaults, an optional TOML file and
//! `LSI_SEARCH_*` environment variables (nested keys split on `__`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lsi-search.toml";
const ENV_PREFIX: &str = "LSI_SEARCH_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub artifacts: ArtifactPaths,
    pub query: QueryConfig,
    pub fit: FitConfig,
    pub server: ServerConfig,
}

/// Where every artifact lives. File names are resolved against `dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub dictionary: String,
    pub doc_ids: String,
    pub bow_corpus: String,
    pub tfidf_corpus: String,
    pub tfidf_model: String,
    pub lsi_model: String,
    pub index: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            dictionary: "wordid.txt".to_string(),
            doc_ids: "docid.txt".to_string(),
            bow_corpus: "bow.mm".to_string(),
            tfidf_corpus: "tfidf.mm".to_string(),
            tfidf_model: "irlsi.tfidf".to_string(),
            lsi_model: "irlsi.lsi".to_string(),
            index: "irlsi.index".to_string(),
        }
    }
}

impl ArtifactPaths {
    /// All paths inside `dir` with the default file names.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn dictionary(&self) -> PathBuf {
        self.resolve(&self.dictionary)
    }

    pub fn doc_ids(&self) -> PathBuf {
        self.resolve(&self.doc_ids)
    }

    pub fn bow_corpus(&self) -> PathBuf {
        self.resolve(&self.bow_corpus)
    }

    pub fn tfidf_corpus(&self) -> PathBuf {
        self.resolve(&self.tfidf_corpus)
    }

    pub fn tfidf_model(&self) -> PathBuf {
        self.resolve(&self.tfidf_model)
    }

    pub fn lsi_model(&self) -> PathBuf {
        self.resolve(&self.lsi_model)
    }

    /// Index manifest; shards sit next to it as `<index>.<n>`.
    pub fn index(&self) -> PathBuf {
        self.resolve(&self.index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Exact number of results returned per query.
    pub top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { top_k: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub num_topics: usize,
    pub normalize: bool,
    pub shard_size: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            num_topics: 100,
            normalize: true,
            shard_size: 32_768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5678)),
        }
    }
}

impl ServiceConfig {
    /// Load defaults, then `path` (or `lsi-search.toml` when absent), then env.
    /// A missing TOML file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.is_some() && !file.exists() {
            return Err(Error::Config(format!(
                "config file {} does not exist",
                file.display()
            )));
        }
        let figment = Figment::from(Serialized::defaults(ServiceConfig::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: ServiceConfig = figment
            .extract()
            .map_err(|e| Error::Config(format!("failed to read configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.fit.num_topics == 0 {
            return Err(Error::Config("fit.num_topics must be positive".to_string()));
        }
        if self.fit.shard_size == 0 {
            return Err(Error::Config("fit.shard_size must be positive".to_string()));
        }
        Ok(())
    }
}
