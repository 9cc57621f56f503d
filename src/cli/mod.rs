pub mod check;
pub mod hash;
pub mod kernels;
pub mod lower;
pub mod run;
pub mod stream;

use std::path::{Path, PathBuf};
use std::process;

use clap::Args;
use dxtc::project::Project;
use dxtc::{EmittedModule, ExpandingPolicy, LowerOptions, MatchMode};

/// Resolved input: IR document and optional project.
pub struct ResolvedInput {
    pub path: PathBuf,
    pub source: String,
    pub project: Option<Project>,
}

/// Lowering flags shared by every command that lowers IR.
#[derive(Args, Debug, Default)]
pub struct LoweringFlags {
    /// Match untagged functions by substring of their external name
    #[arg(long)]
    pub legacy_match: bool,
    /// Expanding-phase policy: partial or missing
    #[arg(long, value_name = "POLICY")]
    pub expanding: Option<ExpandingPolicy>,
    /// Series table size of each stateful entry point
    #[arg(long, value_name = "N")]
    pub max_series: Option<usize>,
    /// Emit DXTC_TRACE calls (compiled only with -DDXTC_ENABLE_TRACE)
    #[arg(long)]
    pub trace: bool,
}

fn load_project(toml_path: &Path) -> Project {
    match Project::load(toml_path) {
        Ok(p) => p,
        Err(e) => {
            match std::fs::read_to_string(toml_path) {
                Ok(source) => e.render(&toml_path.display().to_string(), &source),
                Err(_) => eprintln!("error: {}", e.message),
            }
            process::exit(1);
        }
    }
}

/// Read an IR document and find the dxtc.toml that governs it.
pub fn resolve_input(input: &Path) -> ResolvedInput {
    if !input.extension().is_some_and(|e| e == "json") {
        eprintln!("error: input must be a .json IR document");
        process::exit(1);
    }
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", input.display(), e);
            process::exit(1);
        }
    };
    let start = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let project = Project::find(start).map(|p| {
        tracing::debug!(project = %p.display(), "using project file");
        load_project(&p)
    });
    ResolvedInput {
        path: input.to_path_buf(),
        source,
        project,
    }
}

/// Defaults, then dxtc.toml, then command-line flags.
pub fn resolve_options(flags: &LoweringFlags, project: Option<&Project>) -> LowerOptions {
    let mut options = LowerOptions::default();
    if let Some(project) = project {
        project.lowering.apply(&mut options);
    }
    if flags.legacy_match {
        options.match_mode = MatchMode::Substring;
    }
    if let Some(policy) = flags.expanding {
        options.expanding = policy;
    }
    if let Some(n) = flags.max_series {
        if n == 0 {
            eprintln!("error: --max-series must be at least 1");
            process::exit(1);
        }
        options.max_series = n;
    }
    if flags.trace {
        options.trace = true;
    }
    options
}

/// Lower the resolved input or exit with rendered diagnostics.
pub fn lower_or_exit(ri: &ResolvedInput, options: &LowerOptions) -> EmittedModule {
    let filename = ri.path.display().to_string();
    match dxtc::lower_json(&ri.source, &filename, options) {
        Ok(module) => module,
        Err(_) => process::exit(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_project() {
        let project = Project::parse(
            "[lowering]\nmatch = \"substring\"\nmax_series = 10\n",
            PathBuf::from("."),
        )
        .unwrap();
        let flags = LoweringFlags {
            max_series: Some(20),
            trace: true,
            ..LoweringFlags::default()
        };
        let options = resolve_options(&flags, Some(&project));
        assert_eq!(options.match_mode, MatchMode::Substring);
        assert_eq!(options.max_series, 20);
        assert!(options.trace);
        assert_eq!(options.expanding, ExpandingPolicy::PartialMean);
    }
}
