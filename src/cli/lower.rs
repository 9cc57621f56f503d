use std::path::PathBuf;
use std::process;

use clap::Args;

use super::{lower_or_exit, resolve_input, resolve_options, LoweringFlags};

#[derive(Args)]
pub struct LowerArgs {
    /// Input IR document (.json)
    pub input: PathBuf,
    /// Output .c file (default: <input>.c)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Also write the module manifest (JSON) to this path
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,
    #[command(flatten)]
    pub flags: LoweringFlags,
}

pub fn cmd_lower(args: LowerArgs) {
    let ri = resolve_input(&args.input);
    let options = resolve_options(&args.flags, ri.project.as_ref());
    let module = lower_or_exit(&ri, &options);

    let out_path = args
        .output
        .unwrap_or_else(|| args.input.with_extension("c"));
    if let Err(e) = std::fs::write(&out_path, &module.source) {
        eprintln!("error: cannot write '{}': {}", out_path.display(), e);
        process::exit(1);
    }

    if let Some(manifest_path) = args.manifest {
        let json = match module.manifest().to_json() {
            Ok(json) => json,
            Err(e) => {
                eprintln!("error: cannot serialize manifest: {}", e);
                process::exit(1);
            }
        };
        if let Err(e) = std::fs::write(&manifest_path, json) {
            eprintln!("error: cannot write '{}': {}", manifest_path.display(), e);
            process::exit(1);
        }
    }

    eprintln!(
        "Lowered {} function(s) -> {}",
        module.functions.len(),
        out_path.display()
    );
}
