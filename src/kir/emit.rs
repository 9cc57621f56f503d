//! C source writer and the fragments shared by every kernel body.

use super::abi::{entry_prototype, Status, TypeCode};
use super::LowerOptions;
use crate::ir::{DType, Param};
use crate::runtime::ExpandingPolicy;

/// Line-oriented C writer with two-space indentation.
#[derive(Default)]
pub struct CWriter {
    out: String,
    indent: usize,
}

impl CWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write `head {` and indent.
    pub fn open(&mut self, head: impl AsRef<str>) {
        self.line(format!("{} {{", head.as_ref()));
        self.indent += 1;
    }

    /// Dedent and write `}`.
    pub fn close(&mut self) {
        self.close_with("");
    }

    /// Dedent and write `}` followed by `tail` (e.g. `" else {"` or `";"`).
    pub fn close_with(&mut self, tail: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(format!("}}{}", tail));
    }

    /// Dedent, write `} tail {` and indent again (`} else {`).
    pub fn chain(&mut self, tail: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(format!("}} {} {{", tail));
        self.indent += 1;
    }

    /// Append already-formatted text verbatim.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Everything a kernel body needs to know about the function it lowers.
pub struct EmitContext<'a> {
    /// Entry point symbol (the IR function's external name).
    pub name: &'a str,
    pub params: &'a [Param],
    /// Element type of the data tensors.
    pub elem: DType,
    pub options: &'a LowerOptions,
}

impl<'a> EmitContext<'a> {
    /// Declared dtype of parameter `index`, falling back to the element type.
    pub fn param_dtype(&self, index: usize) -> DType {
        self.params.get(index).map(|p| p.dtype).unwrap_or(self.elem)
    }

    /// C identifier prefix for file-local state owned by this entry point.
    pub fn state_prefix(&self) -> String {
        state_prefix(self.name)
    }
}

/// C identifier prefix for file-local state owned by entry point `name`.
pub fn state_prefix(name: &str) -> String {
    format!("{}_state", name)
}

// ─── Module prelude ────────────────────────────────────────────────

/// Includes, status macros, the trace hook and tensor helpers.
pub fn emit_prelude(w: &mut CWriter) {
    w.line("// Generated by dxtc. Do not edit.");
    w.line("#include <math.h>");
    w.line("#include <pthread.h>");
    w.line("#include <stdint.h>");
    w.line("#include <stdlib.h>");
    w.line("#include <dlpack/dlpack.h>");
    w.line("#include <tvm/runtime/c_backend_api.h>");
    w.line("#include <tvm/runtime/c_runtime_api.h>");
    w.blank();
    for status in Status::ALL {
        w.line(format!("#define {} {}", status.c_name(), status.code()));
    }
    w.blank();
    w.line("#define DXTC_DATA(t, type) ((type*)((char*)(t)->data + (t)->byte_offset))");
    w.blank();
    w.line("#ifdef DXTC_ENABLE_TRACE");
    w.line("#include <stdio.h>");
    w.line("#define DXTC_TRACE(...) fprintf(stderr, __VA_ARGS__)");
    w.line("#else");
    w.line("#define DXTC_TRACE(...) ((void)0)");
    w.line("#endif");
    w.blank();

    w.open("static inline int32_t dxtc_fail(int32_t status, const char* msg)");
    w.line("TVMAPISetLastError(msg);");
    w.line("return status;");
    w.close();
    w.blank();

    w.open("static inline int dxtc_is_tensor(int code)");
    w.line(format!(
        "return code == {} || code == {};",
        TypeCode::DLTensorHandle.c_name(),
        TypeCode::NDArrayHandle.c_name()
    ));
    w.close();
    w.blank();

    w.open("static inline int64_t dxtc_numel(const DLTensor* t)");
    w.line("int64_t n = 1;");
    w.open("for (int i = 0; i < t->ndim; ++i)");
    w.line("n *= t->shape[i];");
    w.close();
    w.line("return n;");
    w.close();
    w.blank();

    w.open("static inline int dxtc_same_shape(const DLTensor* a, const DLTensor* b)");
    w.open("if (a->ndim != b->ndim)");
    w.line("return 0;");
    w.close();
    w.open("for (int i = 0; i < a->ndim; ++i)");
    w.open("if (a->shape[i] != b->shape[i])");
    w.line("return 0;");
    w.close();
    w.close();
    w.line("return 1;");
    w.close();
    w.blank();

    w.open("static inline int dxtc_has_dtype(const DLTensor* t, uint8_t code, uint8_t bits)");
    w.line("return t->dtype.code == code && t->dtype.bits == bits && t->dtype.lanes == 1;");
    w.close();
}

// ─── Streaming series engine ───────────────────────────────────────

/// C name of the series struct for an element type.
pub fn series_type(elem: DType) -> String {
    format!("dxtc_series_{}", elem.suffix())
}

/// Emit the series struct, its initializer and its update rule for one
/// element type. Mirrors `runtime::SeriesState::update`.
pub fn emit_series_engine(w: &mut CWriter, elem: DType, policy: ExpandingPolicy) {
    let ty = series_type(elem);
    let c = elem.c_type();

    w.line("typedef struct {");
    w.line("  int64_t window;");
    w.line("  int64_t cursor;");
    w.line("  int64_t missing;");
    w.line("  int64_t seen;");
    w.line(format!("  {} sum;", c));
    w.line(format!("  {}* buffer;", c));
    w.line(format!("}} {};", ty));
    w.blank();

    w.open(format!(
        "static int32_t {}_init({}* s, int64_t window)",
        ty, ty
    ));
    w.line(format!(
        "s->buffer = ({}*)calloc((size_t)window, sizeof({}));",
        c, c
    ));
    w.open("if (s->buffer == NULL)");
    w.line(format!("return {};", Status::AllocationFailed.c_name()));
    w.close();
    w.line("s->window = window;");
    w.line("s->cursor = 0;");
    w.line("s->missing = 0;");
    w.line("s->seen = 0;");
    w.line(format!("s->sum = ({})0;", c));
    w.line(format!("return {};", Status::Ok.c_name()));
    w.close();
    w.blank();

    w.open(format!("static {} {}_update({}* s, {} value)", c, ty, ty, c));
    w.open("if (s->seen < s->window)");
    w.open("if (isnan(value))");
    w.line("s->missing += 1;");
    w.chain("else");
    w.line("s->sum += value;");
    w.close();
    w.line("s->buffer[s->cursor] = value;");
    w.line("s->cursor = (s->cursor + 1) % s->window;");
    w.line("s->seen += 1;");
    if policy == ExpandingPolicy::Missing {
        w.open("if (s->seen < s->window)");
        w.line(format!("return ({})NAN;", c));
        w.close();
    }
    w.open("if (s->missing == s->seen)");
    w.line("return value;");
    w.close();
    w.line(format!("return s->sum / ({})(s->seen - s->missing);", c));
    w.close();
    w.line(format!("{} evicted = s->buffer[s->cursor];", c));
    w.open("if (isnan(value))");
    w.line("s->missing += 1;");
    w.chain("else");
    w.line("s->sum += value;");
    w.close();
    w.open("if (isnan(evicted))");
    w.line("s->missing -= 1;");
    w.chain("else");
    w.line("s->sum -= evicted;");
    w.close();
    w.line("s->buffer[s->cursor] = value;");
    w.line("s->cursor = (s->cursor + 1) % s->window;");
    w.open("if (s->missing == s->window)");
    w.line("return value;");
    w.close();
    w.line(format!("return s->sum / ({})(s->window - s->missing);", c));
    w.close();
}

// ─── Entry point scaffolding ───────────────────────────────────────

/// Open the entry point and emit the argument-count and type-code checks.
/// `inputs` excludes the output tensor.
pub fn open_entry(w: &mut CWriter, ctx: &EmitContext<'_>, inputs: usize) {
    let total = inputs + 1;
    w.open(entry_prototype(ctx.name));
    w.line("(void)out_value;");
    w.line("(void)resource_handle;");
    if ctx.options.trace {
        w.line(format!(
            "DXTC_TRACE(\"{}: called with %d arguments\\n\", num_args);",
            ctx.name
        ));
    }
    w.open(format!("if (num_args != {})", total));
    fail(
        w,
        ctx,
        Status::ArityMismatch,
        &format!("expected {} arguments", total),
    );
    w.close();
    w.open("for (int i = 0; i < num_args; ++i)");
    w.open("if (!dxtc_is_tensor(type_codes[i]))");
    fail(w, ctx, Status::TypeMismatch, "argument is not a tensor");
    w.close();
    w.close();
}

/// Bind argument slot `index` to a `DLTensor*` named `var`.
pub fn bind_tensor(w: &mut CWriter, var: &str, index: usize) {
    w.line(format!(
        "DLTensor* {} = (DLTensor*)args[{}].v_handle;",
        var, index
    ));
}

/// Reject tensor `var` unless it has exactly `dtype`.
pub fn check_dtype(w: &mut CWriter, ctx: &EmitContext<'_>, var: &str, dtype: DType) {
    w.open(format!(
        "if (!dxtc_has_dtype({}, {}, {}))",
        var,
        dtype.dl_code(),
        dtype.bits()
    ));
    fail(
        w,
        ctx,
        Status::TypeMismatch,
        &format!("'{}' must be {}", var, dtype),
    );
    w.close();
}

/// Reject unless `a` and `b` have identical shapes.
pub fn check_same_shape(w: &mut CWriter, ctx: &EmitContext<'_>, a: &str, b: &str) {
    w.open(format!("if (!dxtc_same_shape({}, {}))", a, b));
    fail(
        w,
        ctx,
        Status::ShapeMismatch,
        &format!("'{}' and '{}' differ in shape", a, b),
    );
    w.close();
}

/// `return dxtc_fail(STATUS, "name: message");`
pub fn fail(w: &mut CWriter, ctx: &EmitContext<'_>, status: Status, message: &str) {
    w.line(format!(
        "return dxtc_fail({}, \"{}: {}\");",
        status.c_name(),
        ctx.name,
        message
    ));
}

/// Mark the result slot empty, return success and close the entry point.
pub fn close_entry(w: &mut CWriter) {
    w.line(format!("*out_type_code = {};", TypeCode::Null.c_name()));
    w.line(format!("return {};", Status::Ok.c_name()));
    w.close();
}
