//! Lowering of analyzed inline assembly statements into backend asm trees.
//!
//! The backend wants operands grouped and numbered outputs-first, while the
//! source lists them in argument order, so `%N` back-references inside the
//! instruction template are renumbered here.  The clobber list combines the
//! statement's named registers with an umbrella "memory" clobber whenever a
//! memory operand is written or a frame-relative operand is used in a
//! non-input mode.
//!
//! The backend cannot treat labels that only assembly references as real
//! jump targets; under optimization such a label would be discarded.  Each
//! private label is therefore emitted twice: once as a true block label
//! (reachable by an ignorable path) and once as a raw private-namespace
//! pseudo-label the assembler sees verbatim.

use crate::compiler::backend::{AsmTreeOperand, BackendUnit, Tree};
use crate::compiler::context::CompilationContext;
use crate::compiler::semantics::tree::{AsmArgKind, AsmArgMode, AsmCode};

/// Spelling of the private label with the given serial.
pub fn priv_asm_label(n: u32) -> String {
    format!(".LSASM{}", n)
}

/// Emits the trees for one asm statement into `out`.  `operand_trees` holds
/// the already-lowered value tree for each of `code.args`, in order.
pub fn lower_asm(
    ctx: &CompilationContext,
    unit: &BackendUnit,
    code: &AsmCode,
    operand_trees: Vec<Tree>,
    out: &mut Vec<Tree>,
) {
    let mut outputs = vec![];
    let mut inputs = vec![];
    let mut clobbers_mem = code.clobbers_memory;

    // Original argument index -> final operand number.  Outputs are
    // numbered first, then inputs; inputs are provisionally negative.
    let mut arg_map: Vec<Option<i64>> = vec![None; code.args.len()];
    let mut input_idx: i64 = 0;
    let mut n_outputs: i64 = 0;

    for (i, (arg, tree)) in code.args.iter().zip(operand_trees).enumerate() {
        let name = arg
            .name
            .and_then(|n| ctx.strings.get(n).ok());

        let (constraint, value) = match arg.kind {
            AsmArgKind::Integer => ("i".to_string(), tree),
            AsmArgKind::Pointer => ("p".to_string(), Tree::AddrOf(Box::new(tree))),
            AsmArgKind::Memory => {
                let c = match arg.mode {
                    AsmArgMode::Input => "m",
                    AsmArgMode::Output => "=m",
                    AsmArgMode::Update => "+m",
                };
                if arg.mode != AsmArgMode::Input {
                    clobbers_mem = true;
                }
                (c.to_string(), tree)
            }
            AsmArgKind::FrameRelative => {
                if arg.mode != AsmArgMode::Input {
                    clobbers_mem = true;
                }
                let value = match tree {
                    Tree::Local(n) => Tree::FrameOffset(n),
                    other => other,
                };
                ("i".to_string(), value)
            }
            AsmArgKind::LocalSize => ("i".to_string(), Tree::FrameSize),
            // Dollar operands do not reach the operand lists; the label
            // machinery below handles them.
            AsmArgKind::Dollar => continue,
        };

        let operand = AsmTreeOperand {
            name,
            constraint,
            value,
        };
        if arg.mode == AsmArgMode::Input {
            input_idx -= 1;
            arg_map[i] = Some(input_idx);
            inputs.push(operand);
        } else {
            arg_map[i] = Some(n_outputs);
            n_outputs += 1;
            outputs.push(operand);
        }
    }

    // Inputs come after all outputs in the final numbering.
    for m in arg_map.iter_mut() {
        if let Some(v) = m {
            if *v < 0 {
                *v = -*v - 1 + n_outputs;
            }
        }
    }

    let template = remap_template(&code.insn_template, &arg_map);

    let mut clobbers = vec![];
    for i in 0..64 {
        if code.regs & (1u64 << i) != 0 {
            if let Some(name) = ctx.params.target.register_backend_name(i) {
                clobbers.push(name.to_string());
            }
        }
    }
    if clobbers_mem {
        clobbers.push("memory".into());
    }

    out.push(Tree::Asm {
        template,
        outputs,
        inputs,
        clobbers,
        volatile: true,
        input_only: false,
    });

    if let Some(n) = code.dollar_label {
        // The real label, reachable through normal control flow so the
        // optimizer keeps the block alive...
        out.push(Tree::Label(unit.new_label()));
        // ...and the raw pseudo-label for the assembler.
        out.push(Tree::Asm {
            template: format!("{}:", priv_asm_label(n)),
            outputs: vec![],
            inputs: vec![],
            clobbers: vec![],
            volatile: true,
            input_only: true,
        });
    }
}

/// Rewrites `%N` operand references for the outputs-first numbering.  `%%`
/// escapes are preserved; only single digit references are supported, as in
/// the source template syntax.
fn remap_template(template: &str, arg_map: &[Option<i64>]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut pct = false;
    for c in template.chars() {
        if pct {
            if let Some(d) = c.to_digit(10) {
                let mapped = arg_map
                    .get(d as usize)
                    .copied()
                    .flatten()
                    .unwrap_or(d as i64);
                out.push_str(&mapped.to_string());
                pct = false;
                continue;
            }
            if c == '%' {
                // `%%` escape.
                pct = false;
            }
            // Modifier letters stay in the pct state, as the digit may
            // still follow (e.g. `%w0`).
            out.push(c);
            continue;
        }
        if c == '%' {
            pct = true;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_renumbers_outputs_first() {
        // Source order: arg0 input, arg1 output.  Final order: output is
        // %0, input is %1.
        let arg_map = vec![Some(1), Some(0)];
        assert_eq!(remap_template("add %0, %1", &arg_map), "add %1, %0");
    }

    #[test]
    fn double_percent_is_preserved() {
        let arg_map = vec![Some(1)];
        assert_eq!(remap_template("mov %%eax, %0", &arg_map), "mov %%eax, %1");
    }
}
