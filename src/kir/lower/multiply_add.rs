//! `out[i] = a[i] * b[i] + c[i]` over tensors of identical shape.

use super::{KernelLowering, Operand};
use crate::kir::emit::{bind_tensor, check_dtype, check_same_shape, close_entry, open_entry};
use crate::kir::emit::{CWriter, EmitContext};
use crate::kir::KernelKind;

pub struct MultiplyAddLowering;

impl KernelLowering for MultiplyAddLowering {
    fn kind(&self) -> KernelKind {
        KernelKind::ElementwiseMultiplyAdd
    }

    fn operands(&self) -> &'static [Operand] {
        &[Operand::Data, Operand::Data, Operand::Data]
    }

    fn emit(&self, ctx: &EmitContext<'_>, w: &mut CWriter) {
        let t = ctx.elem.c_type();
        open_entry(w, ctx, 3);
        for (index, var) in ["a", "b", "c", "out"].iter().enumerate() {
            bind_tensor(w, var, index);
        }
        for var in ["a", "b", "c", "out"] {
            check_dtype(w, ctx, var, ctx.elem);
        }
        // Validate everything before the first write.
        check_same_shape(w, ctx, "a", "b");
        check_same_shape(w, ctx, "a", "c");
        check_same_shape(w, ctx, "a", "out");
        w.line(format!("const {t}* pa = DXTC_DATA(a, {t});"));
        w.line(format!("const {t}* pb = DXTC_DATA(b, {t});"));
        w.line(format!("const {t}* pc = DXTC_DATA(c, {t});"));
        w.line(format!("{t}* po = DXTC_DATA(out, {t});"));
        w.line("int64_t size = dxtc_numel(a);");
        w.open("for (int64_t i = 0; i < size; ++i)");
        w.line("po[i] = pa[i] * pb[i] + pc[i];");
        w.close();
        if ctx.options.trace {
            w.line(format!(
                "DXTC_TRACE(\"{}: multiply-add over %lld elements\\n\", (long long)size);",
                ctx.name
            ));
        }
        close_entry(w);
    }
}
