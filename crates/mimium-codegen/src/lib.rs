// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Code generator — converted MIR to native object code via Cranelift.

mod builder;
mod closures;
mod module;
mod types;

pub use module::{CodeGenerator, TOP_LEVEL_FN};
pub use types::{mir_to_cranelift_type, StructLayout};

pub use mimium_diagnostics::CodegenError;

#[cfg(test)]
mod tests {
    use super::*;
    use mimium_mir::{BlockBuilder, CallKind, Instr, MirBlock, MirType, Opcode, TypeEnv};

    fn identity_program() -> (MirBlock, TypeEnv) {
        let mut types = TypeEnv::new();
        types.insert("f", MirType::function(vec![MirType::Float], MirType::Float));
        types.insert("x", MirType::Float);
        types.insert("r", MirType::Float);
        types.insert("t0", MirType::Float); // `three`, the literal argument
        types.insert("t1", MirType::Float); // `c`, the call result

        let mut inner = MirBlock::new("f");
        inner.push(Instr::Return { lv: "r".into(), value: "x".into() });

        let mut b = BlockBuilder::new("main");
        b.fun("f", vec!["x".into()], inner);
        let three = b.number(3.0);
        let c = b.fcall("f", vec![three], CallKind::Direct, false);
        b.return_(c);
        (b.finish(), types)
    }

    #[test]
    fn declares_and_compiles_a_direct_call_program() {
        let (top, types) = identity_program();
        let mut gen = CodeGenerator::new().expect("cranelift-native available in this environment");
        gen.declare_functions(&top, &types).expect("declare");
        gen.compile_module(&top, &types).expect("compile");
        assert!(gen.task_types().is_empty());
    }

    /// `g` captures `k` from its enclosing scope; `MakeClosure` builds a
    /// one-field environment, and the call site resolves `g_cls` per the
    /// `{fname}_cls` convention rather than rewriting `Fcall.fname`.
    fn capturing_program() -> (MirBlock, TypeEnv) {
        let mut types = TypeEnv::new();
        types.insert("k", MirType::Float);
        types.insert(
            "g",
            MirType::function(vec![MirType::Float], MirType::Float)
                .with_trailing_param(MirType::Struct(vec![MirType::Float])),
        );
        types.insert("y", MirType::Float);
        types.insert("r", MirType::Float);
        types.insert("t0", MirType::Float); // the literal `4.0` argument
        types.insert("t1", MirType::Float); // the closure call's result

        let mut inner = MirBlock::new("g");
        inner.push(Instr::Op { lv: "r".into(), op: Opcode::Add, lhs: "fv_k".into(), rhs: "y".into() });
        inner.push(Instr::Return { lv: "r2".into(), value: "r".into() });

        let mut b = BlockBuilder::new("main");
        b.push(Instr::Number { lv: "k".into(), value: 1.0 });
        b.push(Instr::Fun { lv: "g".into(), args: vec!["y".into()], free_vars: vec!["k".into()], body: inner });
        b.push(Instr::MakeClosure {
            lv: "g_cls".into(),
            fname: "g".into(),
            captures: vec!["k".into()],
            env_ty: MirType::Struct(vec![MirType::Float]),
        });
        let four = b.number(4.0);
        b.fcall("g", vec![four], CallKind::Closure, false);
        (b.finish(), types)
    }

    #[test]
    fn declares_and_compiles_a_closure_capture_program() {
        let (top, types) = capturing_program();
        let mut gen = CodeGenerator::new().expect("cranelift-native available in this environment");
        gen.declare_functions(&top, &types).expect("declare");
        gen.compile_module(&top, &types).expect("compile");
        assert!(gen.task_types().is_empty());
    }

    /// `h` is scheduled via a timed call; its single operand is a
    /// `Time(Float)` value built from a deferred argument and a delay, and
    /// `h` itself takes no positional arguments, per the
    /// one-time-operand/zero-argument convention for deferred calls.
    fn timed_call_program() -> (MirBlock, TypeEnv) {
        let mut types = TypeEnv::new();
        types.insert("h", MirType::function(vec![], MirType::Void));
        types.insert("t0", MirType::Float); // the deferred argument
        types.insert("t1", MirType::Float); // the delay
        types.insert("t2", MirType::Float); // `when`, the Time(Float) pointer

        let mut b = BlockBuilder::new("main");
        b.push(Instr::Fun { lv: "h".into(), args: vec![], free_vars: vec![], body: MirBlock::new("h") });
        let arg_val = b.number(0.0);
        let delay = b.number(2.5);
        let when = b.timed(arg_val, delay);
        b.push(Instr::Fcall { lv: "task".into(), fname: "h".into(), args: vec![when], kind: CallKind::Direct, is_timed: true });
        (b.finish(), types)
    }

    #[test]
    fn timed_call_records_callee_return_type_as_a_task() {
        let (top, types) = timed_call_program();
        let mut gen = CodeGenerator::new().expect("cranelift-native available in this environment");
        gen.declare_functions(&top, &types).expect("declare");
        gen.compile_module(&top, &types).expect("compile");
        assert_eq!(gen.task_types(), &[MirType::Void]);
    }

    /// `x` is rebound to `step`'s value, then read back — exercises the
    /// relabel-old-binding-to `_o`/reload-fresh path without ever reading
    /// the `_o` name (nothing in this grammar does; it exists so a prior
    /// binding stays inspectable rather than silently overwritten).
    fn assign_program() -> (MirBlock, TypeEnv) {
        let mut types = TypeEnv::new();
        types.insert("x", MirType::Float);
        types.insert("t0", MirType::Float); // `step`

        let mut b = BlockBuilder::new("main");
        b.push(Instr::Number { lv: "x".into(), value: 1.0 });
        let step = b.number(2.0);
        b.assign("x", step);
        b.return_("x");
        (b.finish(), types)
    }

    #[test]
    fn assign_rebinds_a_float_lvalue() {
        let (top, types) = assign_program();
        let mut gen = CodeGenerator::new().expect("cranelift-native available in this environment");
        gen.declare_functions(&top, &types).expect("declare");
        gen.compile_module(&top, &types).expect("compile");
    }

    /// Both branches of the `If` produce a value and fall through to the
    /// merge block, exercising the block-param value-passing path.
    fn branching_program() -> (MirBlock, TypeEnv) {
        let mut types = TypeEnv::new();
        types.insert("t0", MirType::Float); // cond
        types.insert("then_v", MirType::Float);
        types.insert("else_v", MirType::Float);
        types.insert("t1", MirType::Float); // merged result of `if_`

        let mut b = BlockBuilder::new("main");
        let cond = b.number(0.0);
        let mut then_block = MirBlock::new("then");
        then_block.push(Instr::Number { lv: "then_v".into(), value: 1.0 });
        let mut else_block = MirBlock::new("else");
        else_block.push(Instr::Number { lv: "else_v".into(), value: 2.0 });
        let picked = b.if_(cond, then_block, else_block);
        b.return_(picked);
        (b.finish(), types)
    }

    #[test]
    fn declares_and_compiles_an_if_program() {
        let (top, types) = branching_program();
        let mut gen = CodeGenerator::new().expect("cranelift-native available in this environment");
        gen.declare_functions(&top, &types).expect("declare");
        gen.compile_module(&top, &types).expect("compile");
    }
}
