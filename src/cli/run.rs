use std::path::PathBuf;
use std::process;

use clap::Args;
use dxtc::runtime::TensorSpec;
use dxtc::{ArgValue, ModuleInstance, Tensor};

use super::{lower_or_exit, resolve_input, resolve_options, LoweringFlags};

#[derive(Args)]
pub struct RunArgs {
    /// Input IR document (.json)
    pub input: PathBuf,
    /// Entry point to call
    #[arg(short, long)]
    pub function: String,
    /// Input tensor as JSON, or @file; repeat once per call. Each value is
    /// an array of tensors, e.g. '[{"dtype":"float32","data":[1,2]}, ...]'
    #[arg(long = "input", value_name = "JSON", required = true)]
    pub inputs: Vec<String>,
    #[command(flatten)]
    pub flags: LoweringFlags,
}

/// Lower the document, load it into a fresh instance and call one entry
/// point once per `--input`, printing each output tensor as JSON.
pub fn cmd_run(args: RunArgs) {
    let ri = resolve_input(&args.input);
    let options = resolve_options(&args.flags, ri.project.as_ref());
    let module = lower_or_exit(&ri, &options);
    let elem = match module.function(&args.function) {
        Some(f) => f.elem,
        None => {
            eprintln!("error: no entry point named '{}'", args.function);
            process::exit(1);
        }
    };
    let instance = ModuleInstance::load(&module);

    for raw in &args.inputs {
        let specs = read_call(raw);
        let mut call: Vec<ArgValue> = Vec::with_capacity(specs.len() + 1);
        for (i, spec) in specs.iter().enumerate() {
            match spec.to_tensor() {
                Ok(t) => call.push(ArgValue::from(t)),
                Err(e) => {
                    eprintln!("error: input tensor {}: {}", i, e);
                    process::exit(1);
                }
            }
        }
        let shape = call
            .first()
            .and_then(ArgValue::as_tensor)
            .map(|t| t.shape().to_vec())
            .unwrap_or_default();
        call.push(ArgValue::from(Tensor::zeros(elem, &shape)));

        if let Err(e) = instance.invoke(&args.function, &mut call) {
            eprintln!("error: {} (status {})", e, e.status().code());
            process::exit(1);
        }
        let Some(out) = call.last().and_then(ArgValue::as_tensor) else {
            eprintln!("error: output tensor missing");
            process::exit(1);
        };
        match serde_json::to_string(&TensorSpec::from_tensor(out)) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: cannot serialize output: {}", e);
                process::exit(1);
            }
        }
    }
}

fn read_call(raw: &str) -> Vec<TensorSpec> {
    let text = match raw.strip_prefix('@') {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: cannot read '{}': {}", path, e);
                process::exit(1);
            }
        },
        None => raw.to_string(),
    };
    match serde_json::from_str(&text) {
        Ok(specs) => specs,
        Err(e) => {
            eprintln!("error: invalid --input: {}", e);
            process::exit(1);
        }
    }
}
