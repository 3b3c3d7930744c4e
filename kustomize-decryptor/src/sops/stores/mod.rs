//! One store per envelope format. A store can load and emit both the
//! encrypted and the plaintext rendition of a document; all four operations
//! are pure.

mod dotenv;
mod flatten;
mod ini;
mod json;
mod yaml;

pub use dotenv::DotenvStore;
pub use ini::IniStore;
pub use json::{BinaryStore, JsonStore};
pub use yaml::YamlStore;

use crate::error::Result;
use crate::format::Format;
use crate::sops::tree::{Tree, TreeBranch};

pub trait Store {
    /// Parse an envelope: document tree plus `sops` metadata.
    fn load_encrypted(&self, data: &[u8]) -> Result<Tree>;
    /// Parse a plaintext document into a tree.
    fn load_plain(&self, data: &[u8]) -> Result<TreeBranch>;
    /// Serialize an envelope, metadata included.
    fn emit_encrypted(&self, tree: &Tree) -> Result<Vec<u8>>;
    /// Serialize the plaintext document.
    fn emit_plain(&self, branch: &TreeBranch) -> Result<Vec<u8>>;
}

/// The store implementing `format`.
pub fn store_for(format: Format) -> Box<dyn Store> {
    match format {
        Format::Yaml => Box::new(YamlStore),
        Format::Json => Box::new(JsonStore),
        Format::Binary => Box::new(BinaryStore),
        Format::Ini => Box::new(IniStore),
        Format::Dotenv => Box::new(DotenvStore),
    }
}
