//! Tile Attributes
//!
//! Attributes are the NFT metadata a tile displays once revealed. They are
//! loaded once at startup and never change afterwards.
//!
//! The on-disk cache holds one `<token_id>.json` file per token, containing
//! either the raw metadata JSON or the token URI as returned by the
//! collection contract (`data:application/json;base64,...`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use rand::seq::{IteratorRandom, SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Stable attribute identifier (the token id).
pub type AttributeId = u64;

/// Prefix of base64-encoded token URIs.
const DATA_URI_PREFIX: &str = "data:application/json;base64,";

/// A single `(key, value)` trait of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trait {
    /// Trait name.
    #[serde(rename = "trait", alias = "trait_type")]
    pub key: String,
    /// Trait value.
    pub value: String,
}

/// Metadata shown on a revealed tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Token id.
    #[serde(default)]
    pub id: AttributeId,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Image URI.
    #[serde(default)]
    pub image: String,
    /// Ordered traits.
    #[serde(default, rename = "attributes")]
    pub traits: Vec<Trait>,
}

impl Attribute {
    /// Attribute with a name and no metadata.
    pub fn named(id: AttributeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            image: String::new(),
            traits: Vec::new(),
        }
    }
}

/// Errors from loading or sampling the collection.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// Cache directory could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Cache directory holds no usable metadata.
    #[error("No attributes found in {0}")]
    Empty(PathBuf),

    /// Fewer distinct attributes than requested.
    #[error("Need {needed} distinct attributes, only {available} available")]
    Insufficient {
        /// Requested count.
        needed: usize,
        /// Available count.
        available: usize,
    },
}

/// Supplier of distinct tile attributes.
pub trait AttributeSource {
    /// Uniformly sample `n` distinct attributes without replacement.
    fn pick_random_pairs(&self, n: usize) -> Result<Vec<Attribute>, CollectionError>;
}

/// In-memory attribute collection keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    attributes: BTreeMap<AttributeId, Attribute>,
}

impl Collection {
    /// Build from attributes. Later duplicates of an id replace earlier ones.
    pub fn from_attributes(attributes: impl IntoIterator<Item = Attribute>) -> Self {
        let attributes = attributes.into_iter().map(|a| (a.id, a)).collect();
        Self { attributes }
    }

    /// Load every `<id>.json` file in `dir`.
    ///
    /// Files that cannot be read or decoded are skipped with a warning.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, CollectionError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| CollectionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut attributes = BTreeMap::new();
        for entry in entries {
            let path = match entry {
                Ok(e) => e.path(),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<AttributeId>().ok())
            else {
                debug!("Skipping {}: file name is not a token id", path.display());
                continue;
            };

            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };

            match parse_metadata(id, &content) {
                Ok(attribute) => {
                    attributes.insert(id, attribute);
                }
                Err(reason) => warn!("Failed to decode {}: {}", path.display(), reason),
            }
        }

        if attributes.is_empty() {
            return Err(CollectionError::Empty(dir.to_path_buf()));
        }

        info!("Loaded {} attributes from {}", attributes.len(), dir.display());
        Ok(Self { attributes })
    }

    /// Number of distinct attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Look up an attribute by id.
    pub fn get(&self, id: AttributeId) -> Option<&Attribute> {
        self.attributes.get(&id)
    }
}

impl AttributeSource for Collection {
    fn pick_random_pairs(&self, n: usize) -> Result<Vec<Attribute>, CollectionError> {
        if self.attributes.len() < n {
            return Err(CollectionError::Insufficient {
                needed: n,
                available: self.attributes.len(),
            });
        }

        let mut rng = rand::thread_rng();
        let mut picked: Vec<Attribute> = self
            .attributes
            .values()
            .cloned()
            .choose_multiple(&mut rng, n);
        // choose_multiple does not randomize order
        picked.shuffle(&mut rng);
        Ok(picked)
    }
}

/// Decode one cached metadata file: raw JSON or a base64 data URI.
fn parse_metadata(id: AttributeId, content: &str) -> Result<Attribute, String> {
    let content = content.trim();
    let json = match content.strip_prefix(DATA_URI_PREFIX) {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| format!("base64: {e}"))?;
            String::from_utf8(bytes).map_err(|e| format!("utf-8: {e}"))?
        }
        None => content.to_string(),
    };

    let mut attribute: Attribute =
        serde_json::from_str(&json).map_err(|e| format!("json: {e}"))?;
    attribute.id = id;
    Ok(attribute)
}
