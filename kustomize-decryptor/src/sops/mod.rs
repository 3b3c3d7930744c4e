//! Native implementation of the SOPS v3 envelope: the ordered document
//! tree, the per-value AES-256-GCM cipher, the recovery metadata block, and
//! one store per serialization format.

pub mod cipher;
pub mod metadata;
pub mod stores;
pub mod tree;
