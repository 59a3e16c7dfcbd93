// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Pre-conversion MIR fixtures for each CLI scenario — built the way an
//! upstream parser/type-checker pass would hand a program to closure
//! conversion: nested `Fun`s still in place, every `free_vars` empty, and
//! every `Fcall` to a not-yet-known function marked `CallKind::Closure` so
//! the downgrade-only optimization in `mimium_mir::convert` has something
//! to do.

use mimium_mir::{CallKind, Instr, MirBlock, MirType, Opcode, ScopeId, Scopes, TypeEnv};

pub struct Scenario {
    pub top: MirBlock,
    pub scopes: Scopes,
    pub root: ScopeId,
    pub types: TypeEnv,
}

/// Scenario 1 (spec §8): zero captures. `identity` never references
/// anything outside its own argument, so conversion finds it in
/// `known_functions` and the call downgrades from the frontend's
/// speculative `Closure` marking to `Direct`.
pub fn identity() -> Scenario {
    let (scopes, root) = Scopes::new();
    let mut types = TypeEnv::new();
    types.insert("identity", MirType::function(vec![MirType::Float], MirType::Float));
    types.insert("x", MirType::Float);

    let mut body = MirBlock::new("identity");
    body.push(Instr::Return { lv: "ret".into(), value: "x".into() });

    let mut top = MirBlock::new("main");
    top.push(Instr::Fun { lv: "identity".into(), args: vec!["x".into()], free_vars: Vec::new(), body });
    top.push(Instr::Number { lv: "three".into(), value: 3.0 });
    top.push(Instr::Fcall {
        lv: "result".into(),
        fname: "identity".into(),
        args: vec!["three".into()],
        kind: CallKind::Closure,
        is_timed: false,
    });

    Scenario { top, scopes, root, types }
}

/// Scenario 2 (spec §8): a single free-variable capture. `scale` closes
/// over `with_scale`'s own argument `k`; the call site resolves `scale_cls`
/// per the `{fname}_cls` convention rather than rewriting `Fcall.fname`.
pub fn capture() -> Scenario {
    let (scopes, root) = Scopes::new();
    let mut types = TypeEnv::new();
    types.insert("with_scale", MirType::function(vec![MirType::Float], MirType::Float));
    types.insert("scale", MirType::function(vec![MirType::Float], MirType::Float));
    types.insert("k", MirType::Float);
    types.insert("y", MirType::Float);
    types.insert("scaled", MirType::Float);
    types.insert("scaled_seven", MirType::Float);

    let mut scale_body = MirBlock::new("scale");
    scale_body.push(Instr::Op { lv: "scaled".into(), op: Opcode::Mul, lhs: "k".into(), rhs: "y".into() });
    scale_body.push(Instr::Return { lv: "scale_ret".into(), value: "scaled".into() });

    let mut with_scale_body = MirBlock::new("with_scale");
    with_scale_body.push(Instr::Fun {
        lv: "scale".into(),
        args: vec!["y".into()],
        free_vars: Vec::new(),
        body: scale_body,
    });
    with_scale_body.push(Instr::Number { lv: "seven".into(), value: 7.0 });
    with_scale_body.push(Instr::Fcall {
        lv: "scaled_seven".into(),
        fname: "scale".into(),
        args: vec!["seven".into()],
        kind: CallKind::Closure,
        is_timed: false,
    });
    with_scale_body.push(Instr::Return { lv: "with_scale_ret".into(), value: "scaled_seven".into() });

    let mut top = MirBlock::new("main");
    top.push(Instr::Fun {
        lv: "with_scale".into(),
        args: vec!["k".into()],
        free_vars: Vec::new(),
        body: with_scale_body,
    });
    top.push(Instr::Number { lv: "two".into(), value: 2.0 });
    top.push(Instr::Fcall {
        lv: "doubled".into(),
        fname: "with_scale".into(),
        args: vec!["two".into()],
        kind: CallKind::Closure,
        is_timed: false,
    });

    Scenario { top, scopes, root, types }
}

/// Scenario 3 (spec §8): nested capture. `outer` captures the
/// outer-outer variable `a` directly (it folds `a` into its own result,
/// not just passing it through); `inner` captures both `a` and `outer`'s
/// own argument `b`, in first-reference order. `a` has to be bound as
/// `grandparent`'s own argument rather than a top-level binding — a
/// top-level name is `BindingKind::Global`, which `is_free_variable`
/// never reports as free, so a genuinely capturable outer-outer variable
/// needs a real enclosing function.
pub fn nested() -> Scenario {
    let (scopes, root) = Scopes::new();
    let mut types = TypeEnv::new();
    types.insert("grandparent", MirType::function(vec![MirType::Float], MirType::Float));
    types.insert("outer", MirType::function(vec![MirType::Float], MirType::Float));
    types.insert("inner", MirType::function(vec![MirType::Float], MirType::Float));
    types.insert("a", MirType::Float);
    types.insert("b", MirType::Float);
    types.insert("z", MirType::Float);
    types.insert("sum1", MirType::Float);
    types.insert("sum2", MirType::Float);
    types.insert("ic", MirType::Float);
    types.insert("outer_sum", MirType::Float);
    types.insert("oc", MirType::Float);

    let mut inner_body = MirBlock::new("inner");
    inner_body.push(Instr::Op { lv: "sum1".into(), op: Opcode::Add, lhs: "b".into(), rhs: "a".into() });
    inner_body.push(Instr::Op { lv: "sum2".into(), op: Opcode::Add, lhs: "sum1".into(), rhs: "z".into() });
    inner_body.push(Instr::Return { lv: "inner_ret".into(), value: "sum2".into() });

    let mut outer_body = MirBlock::new("outer");
    outer_body.push(Instr::Fun { lv: "inner".into(), args: vec!["z".into()], free_vars: Vec::new(), body: inner_body });
    outer_body.push(Instr::Number { lv: "one".into(), value: 1.0 });
    outer_body.push(Instr::Fcall {
        lv: "ic".into(),
        fname: "inner".into(),
        args: vec!["one".into()],
        kind: CallKind::Closure,
        is_timed: false,
    });
    outer_body.push(Instr::Op { lv: "outer_sum".into(), op: Opcode::Add, lhs: "a".into(), rhs: "ic".into() });
    outer_body.push(Instr::Return { lv: "outer_ret".into(), value: "outer_sum".into() });

    let mut grandparent_body = MirBlock::new("grandparent");
    grandparent_body.push(Instr::Fun {
        lv: "outer".into(),
        args: vec!["b".into()],
        free_vars: Vec::new(),
        body: outer_body,
    });
    grandparent_body.push(Instr::Number { lv: "two".into(), value: 2.0 });
    grandparent_body.push(Instr::Fcall {
        lv: "oc".into(),
        fname: "outer".into(),
        args: vec!["two".into()],
        kind: CallKind::Closure,
        is_timed: false,
    });
    grandparent_body.push(Instr::Return { lv: "grandparent_ret".into(), value: "oc".into() });

    let mut top = MirBlock::new("main");
    top.push(Instr::Fun {
        lv: "grandparent".into(),
        args: vec!["a".into()],
        free_vars: Vec::new(),
        body: grandparent_body,
    });
    top.push(Instr::Number { lv: "ten".into(), value: 10.0 });
    top.push(Instr::Fcall {
        lv: "go".into(),
        fname: "grandparent".into(),
        args: vec!["ten".into()],
        kind: CallKind::Closure,
        is_timed: false,
    });

    Scenario { top, scopes, root, types }
}

/// Scenario 4 (spec §8): a scheduled closure. `tick` captures
/// `schedule_tick`'s own argument and is scheduled via a `Time(Float)`
/// value built from a deferred argument and a delay, per the
/// one-time-operand convention; the scheduled callee itself takes zero
/// positional arguments, reaching its state only through the closure
/// environment `addTask` carries along.
pub fn timed() -> Scenario {
    let (scopes, root) = Scopes::new();
    let mut types = TypeEnv::new();
    types.insert("schedule_tick", MirType::function(vec![MirType::Float], MirType::Void));
    types.insert("tick", MirType::function(vec![], MirType::Float));
    types.insert("phase0", MirType::Float);
    types.insert("next", MirType::Float);

    let mut tick_body = MirBlock::new("tick");
    tick_body.push(Instr::Number { lv: "one".into(), value: 1.0 });
    tick_body.push(Instr::Op { lv: "next".into(), op: Opcode::Add, lhs: "phase0".into(), rhs: "one".into() });
    tick_body.push(Instr::Return { lv: "tick_ret".into(), value: "next".into() });

    let mut schedule_body = MirBlock::new("schedule_tick");
    schedule_body.push(Instr::Fun { lv: "tick".into(), args: vec![], free_vars: Vec::new(), body: tick_body });
    schedule_body.push(Instr::Number { lv: "arg_val".into(), value: 0.0 });
    schedule_body.push(Instr::Number { lv: "delay".into(), value: 0.5 });
    schedule_body.push(Instr::Time { lv: "sched_time".into(), value: "arg_val".into(), time: "delay".into() });
    schedule_body.push(Instr::Fcall {
        lv: "task".into(),
        fname: "tick".into(),
        args: vec!["sched_time".into()],
        kind: CallKind::Closure,
        is_timed: true,
    });

    let mut top = MirBlock::new("main");
    top.push(Instr::Fun {
        lv: "schedule_tick".into(),
        args: vec!["phase0".into()],
        free_vars: Vec::new(),
        body: schedule_body,
    });
    top.push(Instr::Number { lv: "start".into(), value: 10.0 });
    top.push(Instr::Fcall {
        lv: "scheduled".into(),
        fname: "schedule_tick".into(),
        args: vec!["start".into()],
        kind: CallKind::Closure,
        is_timed: false,
    });

    Scenario { top, scopes, root, types }
}

/// Scenario 5 (spec §8): scalar arithmetic lowering — no functions or
/// closures, just operator chaining through the top-level block.
pub fn arithmetic() -> Scenario {
    let (scopes, root) = Scopes::new();
    let types = TypeEnv::new();

    let mut top = MirBlock::new("main");
    top.push(Instr::Number { lv: "a".into(), value: 2.0 });
    top.push(Instr::Number { lv: "b".into(), value: 3.0 });
    top.push(Instr::Op { lv: "sum".into(), op: Opcode::Add, lhs: "a".into(), rhs: "b".into() });
    top.push(Instr::Number { lv: "c".into(), value: 4.0 });
    top.push(Instr::Op { lv: "product".into(), op: Opcode::Mul, lhs: "sum".into(), rhs: "c".into() });
    top.push(Instr::Number { lv: "d".into(), value: 2.0 });
    top.push(Instr::Op { lv: "diff".into(), op: Opcode::Sub, lhs: "product".into(), rhs: "d".into() });
    top.push(Instr::Number { lv: "e".into(), value: 5.0 });
    top.push(Instr::Op { lv: "quotient".into(), op: Opcode::Div, lhs: "diff".into(), rhs: "e".into() });

    Scenario { top, scopes, root, types }
}
