//! Shared helpers for command implementations.

pub mod blob;
pub mod client;
pub mod config_loader;
pub mod env;
pub mod terminal;

pub use blob::{buildpack_from_path, build_lifecycle_layer_tar};
pub use client::client;
pub use config_loader::{load_builder_config, load_package_config, load_pack_config, load_project_descriptor};
pub use env::{parse_env_file, parse_env_pair, parse_volume};
