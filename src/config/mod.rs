//! Project configuration (`dxtc.toml`).

pub mod project;

pub use project::{LoweringConfig, Project, PROJECT_FILE};
