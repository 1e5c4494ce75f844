//! Media-server configuration compiler.
//!
//! Translates the active camera set into the media server's YAML
//! document: one recipe per stream (`<pathName>_main`, `<pathName>_sub`)
//! that either relays the upstream directly or supervises an external
//! encoder.
//!
//! Compilation is a pure function. Equal camera sets produce
//! byte-identical documents regardless of input order: cameras are
//! sorted by id and the `paths` map is a `BTreeMap`.

mod compile;
mod recipe;

pub use compile::{compile, encoder_command, restart_loop, StreamTier};
pub use recipe::{MediaServerConfig, PathRecipe};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("YAML serialize error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
