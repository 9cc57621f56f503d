use std::path::PathBuf;

use clap::Args;

use super::{lower_or_exit, resolve_input, resolve_options, LoweringFlags};

#[derive(Args)]
pub struct CheckArgs {
    /// Input IR document (.json)
    pub input: PathBuf,
    #[command(flatten)]
    pub flags: LoweringFlags,
}

pub fn cmd_check(args: CheckArgs) {
    let ri = resolve_input(&args.input);
    let options = resolve_options(&args.flags, ri.project.as_ref());
    let module = lower_or_exit(&ri, &options);
    for f in &module.functions {
        println!("{} -> {} ({})", f.name, f.kernel.tag(), f.elem);
    }
    eprintln!("OK: {}", args.input.display());
}
