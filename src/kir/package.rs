//! Emitted modules and how they leave the compiler.
//!
//! An `EmittedModule` is the complete C translation unit plus a manifest
//! describing its entry points. Building and linking the source belongs to
//! the host toolchain; a `ModulePackager` only hands it over.
//!
//! `SourceDirPackager` writes a `<stem>.dxtc/` directory containing:
//! - `<stem>.c`: the translation unit
//! - `manifest.json`: entry points, series settings and the BLAKE3 hash of
//!   the source

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::KernelKind;
use crate::ir::DType;
use crate::runtime::ExpandingPolicy;

// ─── Data Types ────────────────────────────────────────────────────

/// Result of lowering one IR module.
#[derive(Clone, Debug)]
pub struct EmittedModule {
    /// Complete C source text.
    pub source: String,
    /// Source kind tag understood by the host build (always `"c"`).
    pub kind: String,
    /// Additional files the build needs. Always empty.
    pub aux_files: Vec<PathBuf>,
    /// Entry points in IR order.
    pub functions: Vec<FunctionManifest>,
    pub expanding: ExpandingPolicy,
    pub max_series: usize,
}

/// One exported entry point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionManifest {
    pub name: String,
    pub kernel: KernelKind,
    pub elem: DType,
    /// Declared dtype of the window tensor, for stateful kernels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<DType>,
}

/// Serializable description of an emitted module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub kind: String,
    /// BLAKE3 hash of the C source (hex).
    pub source_hash: String,
    pub expanding: ExpandingPolicy,
    pub max_series: usize,
    pub functions: Vec<FunctionManifest>,
    pub compiler_version: String,
}

impl EmittedModule {
    pub fn content_hash(&self) -> blake3::Hash {
        blake3::hash(self.source.as_bytes())
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            kind: self.kind.clone(),
            source_hash: self.content_hash().to_hex().to_string(),
            expanding: self.expanding,
            max_series: self.max_series,
            functions: self.functions.clone(),
            compiler_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionManifest> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl Manifest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(source: &str) -> Result<Manifest, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Short form of the source hash (first 16 hex chars).
    pub fn short_hash(&self) -> &str {
        let end = self.source_hash.len().min(16);
        &self.source_hash[..end]
    }
}

// ─── Packaging ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("cannot write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Hands an emitted module to whatever builds it.
pub trait ModulePackager {
    type Output;

    fn package(&self, module: &EmittedModule) -> Result<Self::Output, PackageError>;
}

/// Files written by `SourceDirPackager`.
#[derive(Clone, Debug)]
pub struct PackagedSource {
    pub dir: PathBuf,
    pub source_path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
}

/// Writes the C source and its manifest into `<out_dir>/<stem>.dxtc/`.
pub struct SourceDirPackager {
    out_dir: PathBuf,
    stem: String,
}

impl SourceDirPackager {
    pub fn new(out_dir: &Path, stem: &str) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            stem: stem.to_string(),
        }
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.out_dir.join(format!("{}.dxtc", self.stem))
    }
}

impl ModulePackager for SourceDirPackager {
    type Output = PackagedSource;

    fn package(&self, module: &EmittedModule) -> Result<PackagedSource, PackageError> {
        let dir = self.artifact_dir();
        std::fs::create_dir_all(&dir).map_err(|source| PackageError::Io {
            path: dir.clone(),
            source,
        })?;

        let source_path = dir.join(format!("{}.c", self.stem));
        write_file(&source_path, &module.source)?;

        let manifest = module.manifest();
        let manifest_path = dir.join("manifest.json");
        write_file(&manifest_path, &manifest.to_json()?)?;

        tracing::info!(dir = %dir.display(), hash = manifest.short_hash(), "module packaged");
        Ok(PackagedSource {
            dir,
            source_path,
            manifest_path,
            manifest,
        })
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), PackageError> {
    std::fs::write(path, contents).map_err(|source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EmittedModule {
        EmittedModule {
            source: "int32_t f(void);\n".to_string(),
            kind: "c".to_string(),
            aux_files: Vec::new(),
            functions: vec![FunctionManifest {
                name: "my_ts_mean".to_string(),
                kernel: KernelKind::TimeSeriesRollingMean,
                elem: DType::Float32,
                window: Some(DType::Int32),
            }],
            expanding: ExpandingPolicy::PartialMean,
            max_series: 1000,
        }
    }

    #[test]
    fn test_manifest_hash_tracks_source() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.manifest().source_hash, b.manifest().source_hash);
        b.source.push_str("// changed\n");
        assert_ne!(a.manifest().source_hash, b.manifest().source_hash);
        assert_eq!(a.manifest().source_hash.len(), 64);
        assert_eq!(a.manifest().short_hash().len(), 16);
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = sample().manifest().to_json().unwrap();
        assert!(json.contains("\"kernel\": \"time_series_rolling_mean\""));
        assert!(json.contains("\"elem\": \"float32\""));
        assert!(json.contains("\"window\": \"int32\""));
        assert!(json.contains("\"expanding\": \"partial_mean\""));
        let back = Manifest::from_json(&json).unwrap();
        assert_eq!(back.functions, sample().functions);
    }

    #[test]
    fn test_manifest_without_window_field() {
        let json = r#"{"name": "f", "kernel": "elementwise_multiply_add", "elem": "float64"}"#;
        let f: FunctionManifest = serde_json::from_str(json).unwrap();
        assert_eq!(f.window, None);
        assert!(!serde_json::to_string(&f).unwrap().contains("window"));
    }

    #[test]
    fn test_source_dir_packager_writes_files() {
        let tmp = tempfile::tempdir().unwrap();
        let packager = SourceDirPackager::new(tmp.path(), "model");
        let out = packager.package(&sample()).unwrap();
        assert_eq!(out.dir, tmp.path().join("model.dxtc"));
        let c = std::fs::read_to_string(&out.source_path).unwrap();
        assert_eq!(c, "int32_t f(void);\n");
        let manifest = std::fs::read_to_string(&out.manifest_path).unwrap();
        assert_eq!(Manifest::from_json(&manifest).unwrap(), out.manifest);
    }

    #[test]
    fn test_lookup_function() {
        let m = sample();
        assert!(m.function("my_ts_mean").is_some());
        assert!(m.function("other").is_none());
    }
}
