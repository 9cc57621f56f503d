use std::process;

use clap::Args;
use dxtc::{ExpandingPolicy, SeriesState};

#[derive(Args)]
pub struct StreamArgs {
    /// Rolling window length
    #[arg(short, long, allow_negative_numbers = true)]
    pub window: i64,
    /// Expanding-phase policy: partial or missing
    #[arg(long, value_name = "POLICY", default_value = "partial")]
    pub expanding: ExpandingPolicy,
    /// Observations, oldest first ("nan" marks a missing value)
    #[arg(required = true, allow_negative_numbers = true)]
    pub values: Vec<String>,
}

/// Feed values through one series and print each rolling mean.
pub fn cmd_stream(args: StreamArgs) {
    let window = match usize::try_from(args.window) {
        Ok(w) => w,
        Err(_) => {
            eprintln!("error: window must be positive, got {}", args.window);
            process::exit(1);
        }
    };
    let mut state = match SeriesState::<f64>::new(window, args.expanding) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    for raw in &args.values {
        let value = match parse_observation(raw) {
            Some(v) => v,
            None => {
                eprintln!("error: '{}' is not a number", raw);
                process::exit(1);
            }
        };
        println!("{}", format_value(state.update(value)));
    }
}

fn parse_observation(raw: &str) -> Option<f64> {
    match raw.to_ascii_lowercase().as_str() {
        "nan" | "null" | "-" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else {
        v.to_string()
    }
}
