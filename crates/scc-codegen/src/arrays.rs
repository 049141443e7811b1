//! Subscript evaluation, runtime bounds checks, strides and the loop
//! nests used to read and write array slices.

use crate::codegen::CodeGen;
use crate::result::CGResult;
use scc_ast::Subscript;
use scc_checker::TypeError;
use scc_common::Span;
use scc_core::{Imop, ImopId, Opcode, SymbolId};

/// Evaluated subscript: per axis the lower bound and, for slices, the
/// upper bound (`None` marks a plain index that drops the axis).
#[derive(Debug, Default)]
pub struct SubscriptInfo {
    pub slices: Vec<usize>,
    pub spv: Vec<(SymbolId, Option<SymbolId>)>,
}

/// One axis of a loop nest.
#[derive(Debug)]
pub enum LoopCheck {
    /// Fixed index: initialized once, no iteration.
    Nop { index: SymbolId },
    /// Iterated axis with its guard test and exit jump.
    Iter {
        index: SymbolId,
        test: ImopId,
        jump: ImopId,
    },
}

#[derive(Debug, Default)]
pub struct LoopInfo {
    pub indices: Vec<SymbolId>,
    checks: Vec<LoopCheck>,
}

impl<'a> CodeGen<'a> {
    /// Evaluate the subscripts of an index expression and emit the
    /// bounds checks against the subject's dim symbols. On the failure
    /// edge a runtime ERROR fires; the success edge lands on whatever is
    /// emitted next.
    pub fn codegen_subscript(
        &mut self,
        result: &mut CGResult,
        subject: SymbolId,
        subs: &[Subscript],
        span: Span,
    ) -> Result<SubscriptInfo, TypeError> {
        let mut info = SubscriptInfo::default();
        let dims = self
            .tc
            .cxt
            .symbol(subject)
            .variable()
            .map(|v| v.dims.clone())
            .unwrap_or_default();

        // 1. evaluate the indices
        for (axis, sub) in subs.iter().enumerate() {
            match sub {
                Subscript::Index(e) => {
                    let e_result = self.cg_expr(e)?;
                    let lo = e_result.symbol().expect("index value");
                    self.append(result, e_result);
                    info.spv.push((lo, None));
                }
                Subscript::Slice(lo, hi) => {
                    let lo_sym = match lo {
                        Some(e) => {
                            let e_result = self.cg_expr(e)?;
                            let sym = e_result.symbol().expect("slice bound");
                            self.append(result, e_result);
                            sym
                        }
                        None => self.index_constant(0),
                    };
                    let hi_sym = match hi {
                        Some(e) => {
                            let e_result = self.cg_expr(e)?;
                            let sym = e_result.symbol().expect("slice bound");
                            self.append(result, e_result);
                            sym
                        }
                        None => dims[axis],
                    };
                    info.slices.push(axis);
                    info.spv.push((lo_sym, Some(hi_sym)));
                }
            }
        }

        // 2. check that the indices are legal
        let bool_ty = self.bool_type();
        let temp_bool = self.new_temporary(bool_ty);
        let mut checks: Vec<ImopId> = Vec::new();
        for (axis, (lo, hi)) in info.spv.iter().enumerate() {
            let dim = dims[axis];
            match hi {
                None => {
                    self.push_imop_after(
                        result,
                        Imop::new(Opcode::Ge, [Some(temp_bool), Some(*lo), Some(dim)]),
                    );
                    let jump = self.push_imop(Imop::new(Opcode::Jt, [None, Some(temp_bool)]));
                    checks.push(jump);
                }
                Some(hi) => {
                    self.push_imop_after(
                        result,
                        Imop::new(Opcode::Gt, [Some(temp_bool), Some(*lo), Some(*hi)]),
                    );
                    let jump = self.push_imop(Imop::new(Opcode::Jt, [None, Some(temp_bool)]));
                    checks.push(jump);

                    self.push_imop(Imop::new(
                        Opcode::Gt,
                        [Some(temp_bool), Some(*hi), Some(dim)],
                    ));
                    let jump = self.push_imop(Imop::new(Opcode::Jt, [None, Some(temp_bool)]));
                    checks.push(jump);
                }
            }
        }

        if !checks.is_empty() {
            let skip = self.push_imop(Imop::new(Opcode::Jump, [None]));
            result.patch_first_imop(Some(skip));
            let err = self.new_error("Index out of bounds", span);
            self.patch_jumps(&checks, err);
            result.add_to_next_list(skip);
        }

        Ok(info)
    }

    /// Row-major strides of an array: `stride[n-1] = 1`,
    /// `stride[i-1] = stride[i] * dim[i]`.
    pub fn codegen_stride(
        &mut self,
        result: &mut CGResult,
        sym: SymbolId,
    ) -> Vec<SymbolId> {
        let dims = self
            .tc
            .cxt
            .symbol(sym)
            .variable()
            .map(|v| v.dims.clone())
            .unwrap_or_default();
        let n = dims.len();
        if n == 0 {
            return Vec::new();
        }

        let index_ty = self.index_type();
        let mut strides = Vec::with_capacity(n);
        for _ in 0..n {
            strides.push(self.new_temporary(index_ty));
        }

        let one = self.index_constant(1);
        self.push_imop_after(
            result,
            Imop::new(Opcode::Assign, [Some(strides[n - 1]), Some(one)]),
        );
        for i in (1..n).rev() {
            self.push_imop(Imop::new(
                Opcode::Mul,
                [Some(strides[i - 1]), Some(strides[i]), Some(dims[i])],
            ));
        }

        strides
    }

    /// Open a loop nest over the slice axes of a subscript. Fixed axes
    /// initialize their index once; sliced axes get a guard and an exit
    /// jump.
    pub fn enter_loop(&mut self, result: &mut CGResult, spv: &[(SymbolId, Option<SymbolId>)]) -> LoopInfo {
        let index_ty = self.index_type();
        let bool_ty = self.bool_type();
        let mut info = LoopInfo::default();
        for _ in spv {
            info.indices.push(self.new_temporary(index_ty));
        }

        // Fixed axes first, then the iterated nest.
        for (idx, (lo, hi)) in info.indices.iter().zip(spv) {
            if hi.is_none() {
                self.push_imop_after(
                    result,
                    Imop::new(Opcode::Assign, [Some(*idx), Some(*lo)]),
                );
                info.checks.push(LoopCheck::Nop { index: *idx });
            }
        }

        let indices = info.indices.clone();
        for (idx, (lo, hi)) in indices.iter().zip(spv) {
            if let Some(hi) = hi {
                self.push_imop_after(result, Imop::new(Opcode::Assign, [Some(*idx), Some(*lo)]));
                let temp_bool = self.new_temporary(bool_ty);
                let test = self.push_imop(Imop::new(
                    Opcode::Ge,
                    [Some(temp_bool), Some(*idx), Some(*hi)],
                ));
                let jump = self.push_imop(Imop::new(Opcode::Jt, [None, Some(temp_bool)]));
                info.checks.push(LoopCheck::Iter {
                    index: *idx,
                    test,
                    jump,
                });
            }
        }

        info
    }

    /// Close a loop nest: increment and jump back per iterated axis,
    /// innermost first; the outermost exit lands on the continuation.
    pub fn exit_loop(&mut self, loop_info: LoopInfo) -> CGResult {
        let mut result = CGResult::new();
        let mut prev_jump: Option<ImopId> = None;
        let one = self.index_constant(1);

        for check in loop_info.checks.into_iter().rev() {
            match check {
                LoopCheck::Nop { .. } => {}
                LoopCheck::Iter { index, test, jump } => {
                    let inc = self.push_imop(Imop::new(
                        Opcode::Add,
                        [Some(index), Some(index), Some(one)],
                    ));
                    result.patch_first_imop(Some(inc));
                    if let Some(prev) = prev_jump {
                        self.patch_jumps(&[prev], inc);
                    }

                    let back = self.push_imop(Imop::new(Opcode::Jump, [None]));
                    self.patch_jumps(&[back], test);
                    prev_jump = Some(jump);
                }
            }
        }

        if let Some(prev) = prev_jump {
            result.add_to_next_list(prev);
        }

        result
    }

    /// Flat offset of the current loop indices against the strides:
    /// `offset = Σ stride_i * idx_i`.
    pub fn codegen_flat_offset(
        &mut self,
        result: &mut CGResult,
        strides: &[SymbolId],
        indices: &[SymbolId],
    ) -> SymbolId {
        let index_ty = self.index_type();
        let offset = self.new_temporary(index_ty);
        let zero = self.index_constant(0);
        self.push_imop_after(result, Imop::new(Opcode::Assign, [Some(offset), Some(zero)]));

        let temp = self.new_temporary(index_ty);
        for (stride, idx) in strides.iter().zip(indices) {
            self.push_imop(Imop::new(
                Opcode::Mul,
                [Some(temp), Some(*stride), Some(*idx)],
            ));
            self.push_imop(Imop::new(
                Opcode::Add,
                [Some(offset), Some(offset), Some(temp)],
            ));
        }

        offset
    }
}
