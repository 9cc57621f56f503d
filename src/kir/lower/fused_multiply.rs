//! `out = a * b` where `b` is a rank-1 tensor scaling `a` row by row.
//!
//! For rank-1 `a` this is a plain elementwise product. For higher ranks,
//! `b[r]` scales every element of leading-axis row `r`.

use super::{KernelLowering, Operand};
use crate::kir::abi::Status;
use crate::kir::emit::{
    bind_tensor, check_dtype, check_same_shape, close_entry, fail, open_entry,
};
use crate::kir::emit::{CWriter, EmitContext};
use crate::kir::KernelKind;

pub struct FusedMultiplyLowering;

impl KernelLowering for FusedMultiplyLowering {
    fn kind(&self) -> KernelKind {
        KernelKind::ElementwiseFusedMultiply
    }

    fn operands(&self) -> &'static [Operand] {
        &[Operand::Data, Operand::Data]
    }

    fn emit(&self, ctx: &EmitContext<'_>, w: &mut CWriter) {
        let t = ctx.elem.c_type();
        open_entry(w, ctx, 2);
        bind_tensor(w, "a", 0);
        bind_tensor(w, "b", 1);
        bind_tensor(w, "out", 2);
        for var in ["a", "b", "out"] {
            check_dtype(w, ctx, var, ctx.elem);
        }
        w.open("if (a->ndim < 1)");
        fail(w, ctx, Status::ShapeMismatch, "'a' must have rank >= 1");
        w.close();
        w.open("if (b->ndim != 1 || b->shape[0] != a->shape[0])");
        fail(
            w,
            ctx,
            Status::ShapeMismatch,
            "'b' must be rank-1 with the length of the leading axis of 'a'",
        );
        w.close();
        check_same_shape(w, ctx, "a", "out");
        w.line(format!("const {t}* pa = DXTC_DATA(a, {t});"));
        w.line(format!("const {t}* pb = DXTC_DATA(b, {t});"));
        w.line(format!("{t}* po = DXTC_DATA(out, {t});"));
        w.line("int64_t rows = a->shape[0];");
        w.line("int64_t inner = rows == 0 ? 0 : dxtc_numel(a) / rows;");
        w.open("for (int64_t r = 0; r < rows; ++r)");
        w.open("for (int64_t j = 0; j < inner; ++j)");
        w.line("int64_t i = r * inner + j;");
        w.line("po[i] = pa[i] * pb[r];");
        w.close();
        w.close();
        if ctx.options.trace {
            w.line(format!(
                "DXTC_TRACE(\"{}: scaled %lld rows of %lld\\n\", (long long)rows, (long long)inner);",
                ctx.name
            ));
        }
        close_entry(w);
    }
}
