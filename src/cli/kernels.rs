use dxtc::kir::abi::Status;
use dxtc::KernelRegistry;

pub fn cmd_kernels() {
    let registry = KernelRegistry::with_builtins();
    println!("{:<14} {:<28} {:>6}  state", "tag", "kernel", "inputs");
    for (tag, lowering) in registry.iter() {
        let kind = lowering.kind();
        let state = if kind.is_stateful() { "series" } else { "-" };
        println!(
            "{:<14} {:<28} {:>6}  {}",
            tag,
            kind.name(),
            lowering.operands().len(),
            state
        );
    }
    println!();
    println!("status codes:");
    for status in Status::ALL {
        println!("  {:>2} {}", status.code(), status.c_name());
    }
}
