use std::path::PathBuf;

use clap::Args;

use super::{lower_or_exit, resolve_input, resolve_options, LoweringFlags};

#[derive(Args)]
pub struct HashArgs {
    /// Input IR document (.json)
    pub input: PathBuf,
    /// Show the full 256-bit hash instead of the short form
    #[arg(long)]
    pub full: bool,
    #[command(flatten)]
    pub flags: LoweringFlags,
}

pub fn cmd_hash(args: HashArgs) {
    let ri = resolve_input(&args.input);
    let options = resolve_options(&args.flags, ri.project.as_ref());
    let manifest = lower_or_exit(&ri, &options).manifest();
    if args.full {
        println!("{} {}", manifest.source_hash, ri.path.display());
    } else {
        println!("{} {}", manifest.short_hash(), ri.path.display());
    }
}
