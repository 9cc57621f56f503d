//! Library entry points: IR in, emitted module out.

use crate::diagnostic::{render_diagnostics, Diagnostic};
use crate::ir::IrModule;
use crate::kir::{Dispatcher, EmittedModule, LowerError};
use crate::span::Span;

pub use crate::kir::LowerOptions;


/// Lower an in-memory IR module.
pub fn lower(module: &IrModule, options: &LowerOptions) -> Result<EmittedModule, LowerError> {
    Dispatcher::new(options.clone()).lower_module(module)
}

/// Parse and lower an IR interchange document, rendering any diagnostics
/// to stderr.
pub fn lower_json(
    source: &str,
    filename: &str,
    options: &LowerOptions,
) -> Result<EmittedModule, Vec<Diagnostic>> {
    lower_json_silent(source, options).map_err(|errors| {
        render_diagnostics(&errors, filename, source);
        errors
    })
}

/// Like [`lower_json`], without rendering.
pub fn lower_json_silent(
    source: &str,
    options: &LowerOptions,
) -> Result<EmittedModule, Vec<Diagnostic>> {
    let module = parse_ir(source).map_err(|d| vec![d])?;
    lower(&module, options).map_err(|e| vec![e.to_diagnostic(Some(source))])
}

/// Deserialize an IR document, turning JSON errors into diagnostics.
pub fn parse_ir(source: &str) -> Result<IrModule, Diagnostic> {
    IrModule::from_json(source).map_err(|e| {
        let offset = line_col_offset(source, e.line(), e.column());
        Diagnostic::error(
            format!("invalid IR document: {}", e),
            Span::new(offset as u32, (offset + 1).min(source.len()) as u32),
        )
    })
}

/// Byte offset of a 1-based line/column position, clamped to the source.
fn line_col_offset(source: &str, line: usize, column: usize) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(source.len().saturating_sub(1))
}
