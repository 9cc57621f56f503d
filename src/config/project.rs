use std::path::{Path, PathBuf};

use crate::diagnostic::Diagnostic;
use crate::kir::{LowerOptions, MatchMode};
use crate::runtime::ExpandingPolicy;
use crate::span::Span;

pub const PROJECT_FILE: &str = "dxtc.toml";

/// Minimal project configuration from dxtc.toml.
///
/// ```toml
/// [project]
/// name = "model"
///
/// [lowering]
/// match = "exact"          # or "substring"
/// expanding = "partial"    # or "missing"
/// max_series = 1000
/// trace = false
/// ```
#[derive(Clone, Debug)]
pub struct Project {
    pub name: String,
    pub root_dir: PathBuf,
    pub lowering: LoweringConfig,
}

/// `[lowering]` keys. Unset keys leave the option untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoweringConfig {
    pub match_mode: Option<MatchMode>,
    pub expanding: Option<ExpandingPolicy>,
    pub max_series: Option<usize>,
    pub trace: Option<bool>,
}

impl LoweringConfig {
    /// Overwrite the fields of `options` this config sets.
    pub fn apply(&self, options: &mut LowerOptions) {
        if let Some(mode) = self.match_mode {
            options.match_mode = mode;
        }
        if let Some(policy) = self.expanding {
            options.expanding = policy;
        }
        if let Some(n) = self.max_series {
            options.max_series = n;
        }
        if let Some(trace) = self.trace {
            options.trace = trace;
        }
    }
}

impl Project {
    /// Load project from a dxtc.toml file.
    pub fn load(toml_path: &Path) -> Result<Project, Diagnostic> {
        let content = std::fs::read_to_string(toml_path).map_err(|e| {
            Diagnostic::error(
                format!("cannot read '{}': {}", toml_path.display(), e),
                Span::dummy(),
            )
        })?;
        let root_dir = toml_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Self::parse(&content, root_dir)
    }

    /// Parse dxtc.toml content. Spans in errors point into `content`.
    pub fn parse(content: &str, root_dir: PathBuf) -> Result<Project, Diagnostic> {
        let mut name: Option<String> = None;
        let mut lowering = LoweringConfig::default();
        let mut current_section = String::new();
        let mut offset = 0usize;

        for line in content.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim();
            if trimmed.starts_with('#') || trimmed.is_empty() {
                continue;
            }
            // Section headers: [project], [lowering]
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                current_section = trimmed[1..trimmed.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            let key = key.trim().trim_matches('"');
            // Drop trailing comments.
            let value = value.split(" #").next().unwrap_or("").trim();
            let unquoted = value.trim_matches('"');
            let value_span = || {
                let start = line_start + line.find(value).unwrap_or(0);
                Span::new(start as u32, (start + value.len()) as u32)
            };
            let invalid = |message: String| Diagnostic::error(message, value_span());

            match current_section.as_str() {
                "project" => {
                    if key == "name" {
                        name = Some(unquoted.to_string());
                    }
                }
                "lowering" => match key {
                    "match" => {
                        lowering.match_mode = Some(unquoted.parse().map_err(invalid)?);
                    }
                    "expanding" => {
                        lowering.expanding = Some(unquoted.parse().map_err(invalid)?);
                    }
                    "max_series" => {
                        let n: usize = unquoted.parse().map_err(|_| {
                            invalid(format!("max_series must be a positive integer, got '{}'", value))
                        })?;
                        if n == 0 {
                            return Err(invalid("max_series must be at least 1".to_string()));
                        }
                        lowering.max_series = Some(n);
                    }
                    "trace" => {
                        let flag = match unquoted {
                            "true" => true,
                            "false" => false,
                            other => {
                                return Err(invalid(format!(
                                    "trace must be true or false, got '{}'",
                                    other
                                )))
                            }
                        };
                        lowering.trace = Some(flag);
                    }
                    other => {
                        return Err(Diagnostic::error(
                            format!("unknown key '{}' in [lowering]", other),
                            value_span(),
                        )
                        .with_help("known keys: match, expanding, max_series, trace".to_string()));
                    }
                },
                _ => {}
            }
        }

        let name = name.unwrap_or_else(|| {
            root_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dxtc".to_string())
        });
        Ok(Project {
            name,
            root_dir,
            lowering,
        })
    }

    /// Try to find a dxtc.toml in the given directory or its ancestors.
    pub fn find(start_dir: &Path) -> Option<PathBuf> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(PROJECT_FILE);
            if candidate.exists() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}
