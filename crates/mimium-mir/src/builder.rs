// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! `BlockBuilder` — fluent helper for constructing MIR by hand, used by
//! tests and the CLI demo. Mirrors the teacher's `rask-mir` builder: an
//! auto-incrementing temp counter plus one method per instruction kind,
//! each returning the fresh `lv_name` so calls can be chained as operands.

use crate::instr::{CallKind, Opcode};
use crate::{Instr, MirBlock, MirType};

pub struct BlockBuilder {
    block: MirBlock,
    next_temp: u32,
}

impl BlockBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        BlockBuilder { block: MirBlock::new(label), next_temp: 0 }
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.next_temp);
        self.next_temp += 1;
        name
    }

    pub fn number(&mut self, value: f64) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Number { lv: lv.clone(), value });
        lv
    }

    pub fn symbol(&mut self, name: impl Into<String>) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Symbol { lv: lv.clone(), name: name.into() });
        lv
    }

    pub fn reference(&mut self, name: impl Into<String>) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Ref { lv: lv.clone(), name: name.into() });
        lv
    }

    pub fn alloca(&mut self, ty: MirType) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Alloca { lv: lv.clone(), ty });
        lv
    }

    pub fn timed(&mut self, value: impl Into<String>, time: impl Into<String>) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Time { lv: lv.clone(), value: value.into(), time: time.into() });
        lv
    }

    pub fn op(&mut self, op: Opcode, lhs: impl Into<String>, rhs: impl Into<String>) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Op { lv: lv.clone(), op, lhs: lhs.into(), rhs: rhs.into() });
        lv
    }

    /// Mutates an existing binding rather than declaring a fresh one, so
    /// `lv` is the caller-supplied name being reassigned, not a temp.
    pub fn assign(&mut self, lv: impl Into<String>, value: impl Into<String>) -> String {
        let lv = lv.into();
        self.block.push(Instr::Assign { lv: lv.clone(), value: value.into() });
        lv
    }

    /// `name` becomes the function's own `lv_name` — callers name functions
    /// explicitly rather than through the temp counter, since call sites
    /// reference them by name.
    pub fn fun(
        &mut self,
        name: impl Into<String>,
        args: Vec<String>,
        body: MirBlock,
    ) -> String {
        let lv = name.into();
        self.block.push(Instr::Fun { lv: lv.clone(), args, body, free_vars: Vec::new() });
        lv
    }

    pub fn fcall(
        &mut self,
        fname: impl Into<String>,
        args: Vec<String>,
        kind: CallKind,
        is_timed: bool,
    ) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Fcall { lv: lv.clone(), fname: fname.into(), args, kind, is_timed });
        lv
    }

    pub fn array(&mut self, args: Vec<String>) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Array { lv: lv.clone(), args });
        lv
    }

    pub fn array_access(&mut self, name: impl Into<String>, index: impl Into<String>) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::ArrayAccess { lv: lv.clone(), name: name.into(), index: index.into() });
        lv
    }

    pub fn if_(&mut self, cond: impl Into<String>, then_block: MirBlock, else_block: MirBlock) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::If { lv: lv.clone(), cond: cond.into(), then_block, else_block });
        lv
    }

    pub fn return_(&mut self, value: impl Into<String>) -> String {
        let lv = self.fresh("t");
        self.block.push(Instr::Return { lv: lv.clone(), value: value.into() });
        lv
    }

    /// Escape hatch for instructions with no builder method yet, or for
    /// pushing an already-built `MakeClosure` (conversion inserts these;
    /// hand-written MIR never should).
    pub fn push(&mut self, instr: Instr) {
        self.block.push(instr);
    }

    pub fn finish(self) -> MirBlock {
        self.block
    }
}

/// Nests a fresh `BlockBuilder` for constructing a function or branch body,
/// running `build` over it and returning the finished block.
pub fn sub_block(label: impl Into<String>, build: impl FnOnce(&mut BlockBuilder)) -> MirBlock {
    let mut b = BlockBuilder::new(label);
    build(&mut b);
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains_temp_names_as_operands() {
        let block = sub_block("main", |b| {
            let a = b.number(1.0);
            let c = b.number(2.0);
            let s = b.op(Opcode::Add, a, c);
            b.return_(s);
        });
        assert_eq!(block.instructions.len(), 4);
        assert!(matches!(block.instructions[3], Instr::Return { .. }));
    }

    #[test]
    fn fun_uses_given_name_not_temp_counter() {
        let mut b = BlockBuilder::new("main");
        let body = sub_block("f", |inner| {
            let x = inner.symbol("x");
            inner.return_(x);
        });
        let lv = b.fun("f", vec!["x".into()], body);
        assert_eq!(lv, "f");
    }

    #[test]
    fn assign_targets_the_existing_name_not_a_temp() {
        let mut b = BlockBuilder::new("main");
        let x = b.number(1.0);
        let lv = b.assign("x", x);
        assert_eq!(lv, "x");
    }
}
