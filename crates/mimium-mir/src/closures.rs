// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Closure conversion over MIR (spec §4.2).
//!
//! Two passes, run back to back by [`convert`]:
//!
//! 1. [`convert_block`] / [`convert_instr`] — free-variable discovery,
//!    operand rewriting, lvalue registration, and function lifting,
//!    depth-first over the instruction tree.
//! 2. [`hoist_functions`] — moves every (now-converted) nested `Fun` to the
//!    top-level block, preserving pre-order. `MakeClosure` siblings are left
//!    behind at the call site — they build the environment from whatever
//!    values the captured variables hold *at that point in the enclosing
//!    function's execution*, which only makes sense where they were placed.

use std::collections::HashSet;

use mimium_diagnostics::ConvertError;

use crate::instr::{CallKind, Instr};
use crate::symbol::{BindingKind, ScopeId, Scopes};
use crate::{MirBlock, MirType, TypeEnv};

/// Names of functions whose free-variable list turned out empty: they take
/// no trailing environment parameter and their call sites are `Direct`.
pub type KnownFunctions = HashSet<String>;

/// Run closure conversion over the top-level block. `scopes`/`root` and
/// `types` stand in for the external `SymbolEnv`/`TypeEnv` collaborators;
/// the caller owns them so a failed conversion can simply be discarded.
pub fn convert(
    top: &mut MirBlock,
    scopes: &mut Scopes,
    root: ScopeId,
    types: &mut TypeEnv,
) -> Result<KnownFunctions, ConvertError> {
    let mut known = KnownFunctions::new();
    let mut discard = Vec::new(); // top level never captures — see is_free_variable's Global exclusion
    convert_block(top, &mut discard, scopes, root, types, &mut known, true)?;
    hoist_functions(top);
    Ok(known)
}

fn gather_fv_raw(
    name: &mut String,
    fv_list: &mut Vec<String>,
    scopes: &Scopes,
    scope: ScopeId,
    types: &TypeEnv,
) -> Result<bool, ConvertError> {
    let (bound, is_free) = scopes.is_free_variable(scope, name);
    if !bound {
        return Err(ConvertError::UnboundName(name.clone()));
    }
    if is_free {
        if types.find(name).is_none() {
            return Err(ConvertError::UnknownType(name.clone()));
        }
        if !fv_list.contains(name) {
            fv_list.push(name.clone());
        }
        *name = format!("fv_{name}");
    }
    Ok(is_free)
}

fn check_lvalue(
    lv: &mut String,
    fv_list: &mut Vec<String>,
    scopes: &mut Scopes,
    scope: ScopeId,
    types: &TypeEnv,
    at_root: bool,
) -> Result<(), ConvertError> {
    let kind = if at_root { BindingKind::Global } else { BindingKind::Local };
    if scopes.is_variable_set(scope, lv) {
        let is_free = gather_fv_raw(lv, fv_list, scopes, scope, types)?;
        if !is_free {
            scopes.set_variable_raw(scope, lv, kind);
        }
    } else {
        scopes.set_variable_raw(scope, lv, kind);
    }
    Ok(())
}

fn convert_block(
    block: &mut MirBlock,
    fv_list: &mut Vec<String>,
    scopes: &mut Scopes,
    scope: ScopeId,
    types: &mut TypeEnv,
    known: &mut KnownFunctions,
    at_root: bool,
) -> Result<(), ConvertError> {
    let mut i = 0;
    while i < block.instructions.len() {
        let insert_after =
            convert_instr(&mut block.instructions[i], fv_list, scopes, scope, types, known, at_root)?;
        if let Some(make_closure) = insert_after {
            block.instructions.insert(i + 1, make_closure);
            i += 1;
        }
        i += 1;
    }
    Ok(())
}

/// Converts one instruction in place. Returns an instruction to splice
/// immediately after it (only ever `Some` for a `Fun` that captures).
fn convert_instr(
    instr: &mut Instr,
    fv_list: &mut Vec<String>,
    scopes: &mut Scopes,
    scope: ScopeId,
    types: &mut TypeEnv,
    known: &mut KnownFunctions,
    at_root: bool,
) -> Result<Option<Instr>, ConvertError> {
    match instr {
        Instr::Number { lv, .. } | Instr::Symbol { lv, .. } | Instr::Alloca { lv, .. } => {
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        Instr::Ref { lv, name } => {
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            gather_fv_raw(name, fv_list, scopes, scope, types)?;
            Ok(None)
        }
        Instr::Time { lv, value, time } => {
            gather_fv_raw(value, fv_list, scopes, scope, types)?;
            gather_fv_raw(time, fv_list, scopes, scope, types)?;
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        Instr::Op { lv, lhs, rhs, .. } => {
            gather_fv_raw(lhs, fv_list, scopes, scope, types)?;
            gather_fv_raw(rhs, fv_list, scopes, scope, types)?;
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        // `lv` here names an already-bound variable being mutated, not a
        // fresh declaration, so it goes through gather_fv_raw (which
        // requires prior binding) rather than check_lvalue.
        Instr::Assign { lv, value } => {
            gather_fv_raw(value, fv_list, scopes, scope, types)?;
            gather_fv_raw(lv, fv_list, scopes, scope, types)?;
            Ok(None)
        }
        Instr::Fcall { lv, fname, args, kind, .. } => {
            if known.contains(fname) {
                *kind = CallKind::Direct;
            }
            for a in args.iter_mut() {
                gather_fv_raw(a, fv_list, scopes, scope, types)?;
            }
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        Instr::Array { lv, args } => {
            for a in args.iter_mut() {
                gather_fv_raw(a, fv_list, scopes, scope, types)?;
            }
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        Instr::ArrayAccess { lv, name, index } => {
            gather_fv_raw(name, fv_list, scopes, scope, types)?;
            gather_fv_raw(index, fv_list, scopes, scope, types)?;
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        Instr::Return { lv, value } => {
            gather_fv_raw(value, fv_list, scopes, scope, types)?;
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        Instr::If { lv, cond, then_block, else_block } => {
            gather_fv_raw(cond, fv_list, scopes, scope, types)?;
            convert_block(then_block, fv_list, scopes, scope, types, known, at_root)?;
            convert_block(else_block, fv_list, scopes, scope, types, known, at_root)?;
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(None)
        }
        // Already converted (this is what conversion inserts) — a second
        // pass over previously-converted MIR must leave it alone.
        Instr::MakeClosure { .. } => Ok(None),
        Instr::Fun { lv, args, body, free_vars } => {
            let fn_scope = scopes.create_new_child(scope, true);
            for a in args.iter() {
                scopes.set_variable_raw(fn_scope, a, BindingKind::Arg);
            }
            convert_block(body, free_vars, scopes, fn_scope, types, known, false)?;

            let insert_after = if free_vars.is_empty() {
                known.insert(lv.clone());
                None
            } else {
                let field_types = free_vars
                    .iter()
                    .map(|v| types.find(v).cloned().ok_or_else(|| ConvertError::UnknownType(v.clone())))
                    .collect::<Result<Vec<MirType>, _>>()?;
                let env_ty = MirType::Struct(field_types);

                if let Some(fn_ty) = types.find(lv).cloned() {
                    types.insert(lv.clone(), fn_ty.with_trailing_param(env_ty.clone()));
                }

                Some(Instr::MakeClosure {
                    lv: format!("{lv}_cls"),
                    fname: lv.clone(),
                    captures: free_vars.clone(),
                    env_ty,
                })
            };
            check_lvalue(lv, fv_list, scopes, scope, types, at_root)?;
            Ok(insert_after)
        }
    }
}

/// Moves every nested `Fun` to the top-level block, preserving pre-order
/// (a function before its own nested functions). Top-level `Fun`s are
/// never moved — only instructions found *inside* a body or an `If` branch
/// qualify as "nested".
pub fn hoist_functions(top: &mut MirBlock) {
    let mut new_list = Vec::with_capacity(top.instructions.len());
    for instr in std::mem::take(&mut top.instructions) {
        match instr {
            Instr::Fun { lv, args, mut body, free_vars } => {
                let mut nested = Vec::new();
                extract_nested_preorder(&mut body, &mut nested);
                new_list.push(Instr::Fun { lv, args, body, free_vars });
                new_list.extend(nested);
            }
            Instr::If { lv, cond, mut then_block, mut else_block } => {
                let mut nested = Vec::new();
                extract_nested_preorder(&mut then_block, &mut nested);
                extract_nested_preorder(&mut else_block, &mut nested);
                new_list.push(Instr::If { lv, cond, then_block, else_block });
                new_list.extend(nested);
            }
            other => new_list.push(other),
        }
    }
    top.instructions = new_list;
}

/// Pulls every `Fun` (at any depth) out of `body`, in pre-order (a function
/// before its own nested functions), appending them to `out`. Unlike
/// [`hoist_functions`], nested `Fun`s are fully removed from `body` — none
/// may remain inside a function body once conversion is complete.
fn extract_nested_preorder(body: &mut MirBlock, out: &mut Vec<Instr>) {
    let mut remaining = Vec::with_capacity(body.instructions.len());
    for instr in std::mem::take(&mut body.instructions) {
        match instr {
            Instr::Fun { lv, args, mut body, free_vars } => {
                let mut children = Vec::new();
                extract_nested_preorder(&mut body, &mut children);
                out.push(Instr::Fun { lv, args, body, free_vars });
                out.extend(children);
            }
            Instr::If { lv, cond, mut then_block, mut else_block } => {
                extract_nested_preorder(&mut then_block, out);
                extract_nested_preorder(&mut else_block, out);
                remaining.push(Instr::If { lv, cond, then_block, else_block });
            }
            other => remaining.push(other),
        }
    }
    body.instructions = remaining;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Opcode;

    fn fcall(lv: &str, fname: &str, args: &[&str]) -> Instr {
        Instr::Fcall {
            lv: lv.into(),
            fname: fname.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            kind: CallKind::Closure,
            is_timed: false,
        }
    }

    /// Scenario 1 (spec §8): a function capturing nothing is placed in
    /// `known_functions`, gets no `MakeClosure`, and its call site becomes
    /// `Direct`.
    #[test]
    fn identity_function_has_no_capture_and_direct_call() {
        let (mut scopes, root) = Scopes::new();
        let mut types = TypeEnv::new();
        types.insert("f", MirType::function(vec![MirType::Float], MirType::Float));

        let mut inner = MirBlock::new("f");
        inner.push(Instr::Return { lv: "r".into(), value: "x".into() });

        let mut main = MirBlock::new("main");
        main.push(Instr::Fun {
            lv: "f".into(),
            args: vec!["x".into()],
            body: inner,
            free_vars: vec![],
        });
        main.push(Instr::Number { lv: "three".into(), value: 3.0 });
        main.push(fcall("c", "f", &["three"]));
        main.push(Instr::Return { lv: "r2".into(), value: "c".into() });

        let known = convert(&mut main, &mut scopes, root, &mut types).unwrap();
        assert!(known.contains("f"));

        // f is hoisted to (already) top level; no MakeClosure follows it.
        let fun_idx = main.instructions.iter().position(|i| i.lv_name() == "f").unwrap();
        assert!(!matches!(main.instructions.get(fun_idx + 1), Some(Instr::MakeClosure { .. })));

        let call = main.instructions.iter().find_map(|i| match i {
            Instr::Fcall { lv, kind, .. } if lv == "c" => Some(*kind),
            _ => None,
        });
        assert_eq!(call, Some(CallKind::Direct));
    }

    /// Scenario 2 (spec §8): one captured variable still produces a
    /// single-field environment struct and a `Closure`-kind call. `y` is
    /// bound as `with_y`'s own argument, not a top-level binding — a
    /// top-level name is `BindingKind::Global` and can never be captured.
    #[test]
    fn single_capture_produces_one_field_env_and_closure_call() {
        let (mut scopes, root) = Scopes::new();
        let mut types = TypeEnv::new();
        types.insert("y", MirType::Float);
        types.insert("g", MirType::function(vec![MirType::Float], MirType::Float));
        types.insert("with_y", MirType::function(vec![MirType::Float], MirType::Float));

        let mut inner = MirBlock::new("g");
        inner.push(Instr::Op { lv: "s".into(), op: Opcode::Add, lhs: "x".into(), rhs: "y".into() });
        inner.push(Instr::Return { lv: "r".into(), value: "s".into() });

        let mut with_y_body = MirBlock::new("with_y");
        with_y_body.push(Instr::Fun {
            lv: "g".into(),
            args: vec!["x".into()],
            body: inner,
            free_vars: vec![],
        });
        with_y_body.push(Instr::Number { lv: "four".into(), value: 4.0 });
        with_y_body.push(fcall("v", "g", &["four"]));
        with_y_body.push(Instr::Return { lv: "wr".into(), value: "v".into() });

        let mut main = MirBlock::new("main");
        main.push(Instr::Fun {
            lv: "with_y".into(),
            args: vec!["y".into()],
            body: with_y_body,
            free_vars: vec![],
        });

        let known = convert(&mut main, &mut scopes, root, &mut types).unwrap();
        assert!(!known.contains("g"));

        let fun_idx = main.instructions.iter().position(|i| i.lv_name() == "g").unwrap();
        match &main.instructions[fun_idx] {
            Instr::Fun { free_vars, .. } => assert_eq!(free_vars, &vec!["y".to_string()]),
            _ => panic!("expected Fun"),
        }

        // `g` was hoisted out of `with_y`'s body; the `MakeClosure` it left
        // behind stays at the call site, now the first instruction of
        // `with_y`'s (updated) body.
        let with_y_body = match main.instructions.iter().find(|i| i.lv_name() == "with_y").unwrap() {
            Instr::Fun { body, .. } => body,
            _ => panic!("expected Fun"),
        };
        match &with_y_body.instructions[0] {
            Instr::MakeClosure { lv, fname, captures, env_ty } => {
                assert_eq!(lv, "g_cls");
                assert_eq!(fname, "g");
                assert_eq!(captures, &vec!["y".to_string()]);
                assert_eq!(env_ty, &MirType::Struct(vec![MirType::Float]));
            }
            other => panic!("expected MakeClosure, got {other:?}"),
        }

        let call_kind = with_y_body.instructions.iter().find_map(|i| match i {
            Instr::Fcall { lv, kind, .. } if lv == "v" => Some(*kind),
            _ => None,
        });
        assert_eq!(call_kind, Some(CallKind::Closure));

        // the use of y inside g's body was rewritten to fv_y
        match &main.instructions[fun_idx] {
            Instr::Fun { body, .. } => {
                let op = body.instructions.iter().find_map(|i| match i {
                    Instr::Op { lhs, rhs, .. } => Some((lhs.clone(), rhs.clone())),
                    _ => None,
                }).unwrap();
                assert_eq!(op, ("x".to_string(), "fv_y".to_string()));
            }
            _ => unreachable!(),
        }
    }

    /// Scenario 3 (spec §8): nested capture — outer captures the
    /// outer-outer variable `a` directly, and inner captures both `a` and
    /// outer's own argument `b`, in first-reference order.
    #[test]
    fn nested_capture_orders_free_variables_by_first_reference() {
        let (mut scopes, root) = Scopes::new();
        let mut types = TypeEnv::new();
        types.insert("a", MirType::Float);
        types.insert("b", MirType::Float);
        types.insert("grandparent", MirType::function(vec![MirType::Float], MirType::Float));
        types.insert("outer", MirType::function(vec![MirType::Float], MirType::Float));
        types.insert("inner", MirType::function(vec![MirType::Float], MirType::Float));
        types.insert("outer_sum", MirType::Float);

        // inner(z) = b + a + z   where b is outer's argument, a is outer-outer
        let mut inner = MirBlock::new("inner");
        inner.push(Instr::Op { lv: "t1".into(), op: Opcode::Add, lhs: "b".into(), rhs: "a".into() });
        inner.push(Instr::Op { lv: "t2".into(), op: Opcode::Add, lhs: "t1".into(), rhs: "z".into() });
        inner.push(Instr::Return { lv: "r".into(), value: "t2".into() });

        // outer(b) = { inner = fun(z) {...}; ic = app inner 1.0; outer_sum = a + ic }
        // outer references `a` directly (not just through inner), so outer
        // itself captures `a` too.
        let mut outer_body = MirBlock::new("outer");
        outer_body.push(Instr::Fun {
            lv: "inner".into(),
            args: vec!["z".into()],
            body: inner,
            free_vars: vec![],
        });
        outer_body.push(Instr::Number { lv: "one".into(), value: 1.0 });
        outer_body.push(fcall("ic", "inner", &["one"]));
        outer_body.push(Instr::Op { lv: "outer_sum".into(), op: Opcode::Add, lhs: "a".into(), rhs: "ic".into() });
        outer_body.push(Instr::Return { lv: "r2".into(), value: "outer_sum".into() });

        // `a` must be a genuine non-global local for this scenario to mean
        // anything — a top-level binding is `BindingKind::Global`, which
        // `is_free_variable` never reports as free regardless of how many
        // function-root boundaries are crossed. So `a` is bound as
        // grandparent's own argument, one level further out than outer.
        let mut grandparent_body = MirBlock::new("grandparent");
        grandparent_body.push(Instr::Fun {
            lv: "outer".into(),
            args: vec!["b".into()],
            body: outer_body,
            free_vars: vec![],
        });
        grandparent_body.push(Instr::Number { lv: "two".into(), value: 2.0 });
        grandparent_body.push(fcall("oc", "outer", &["two"]));
        grandparent_body.push(Instr::Return { lv: "gr".into(), value: "oc".into() });

        let mut main = MirBlock::new("main");
        main.push(Instr::Fun {
            lv: "grandparent".into(),
            args: vec!["a".into()],
            body: grandparent_body,
            free_vars: vec![],
        });

        convert(&mut main, &mut scopes, root, &mut types).unwrap();

        let outer_fun = main.instructions.iter().find(|i| i.lv_name() == "outer").unwrap();
        let inner_fun = main.instructions.iter().find(|i| i.lv_name() == "inner").unwrap();

        match outer_fun {
            Instr::Fun { free_vars, .. } => assert_eq!(free_vars, &vec!["a".to_string()]),
            _ => unreachable!(),
        }
        match inner_fun {
            Instr::Fun { free_vars, .. } => assert_eq!(free_vars, &vec!["b".to_string(), "a".to_string()]),
            _ => unreachable!(),
        }

        // inner was hoisted to top level alongside outer; no Fun remains nested.
        assert!(main.instructions.iter().all(|i| !matches!(i, Instr::Fun { body, .. } if body.instructions.iter().any(Instr::is_fun))));
    }

    #[test]
    fn assign_to_a_captured_variable_rewrites_both_operands() {
        let (mut scopes, root) = Scopes::new();
        let mut types = TypeEnv::new();
        types.insert("with_acc", MirType::function(vec![MirType::Float, MirType::Float], MirType::Float));
        types.insert("tick", MirType::function(vec![], MirType::Float));

        let mut tick_body = MirBlock::new("tick");
        tick_body.push(Instr::Assign { lv: "acc".into(), value: "step".into() });
        tick_body.push(Instr::Return { lv: "r".into(), value: "acc".into() });

        let mut with_acc_body = MirBlock::new("with_acc");
        with_acc_body.push(Instr::Fun { lv: "tick".into(), args: vec![], body: tick_body, free_vars: vec![] });
        with_acc_body.push(fcall("v", "tick", &[]));
        with_acc_body.push(Instr::Return { lv: "wr".into(), value: "v".into() });

        let mut main = MirBlock::new("main");
        main.push(Instr::Fun { lv: "with_acc".into(), args: vec!["acc".into(), "step".into()], body: with_acc_body, free_vars: vec![] });

        convert(&mut main, &mut scopes, root, &mut types).unwrap();

        let tick_fun = main.instructions.iter().find(|i| i.lv_name() == "tick").unwrap();
        match tick_fun {
            Instr::Fun { free_vars, body, .. } => {
                assert_eq!(free_vars, &vec!["acc".to_string(), "step".to_string()]);
                let assign = body.instructions.iter().find_map(|i| match i {
                    Instr::Assign { lv, value } => Some((lv.clone(), value.clone())),
                    _ => None,
                }).unwrap();
                assert_eq!(assign, ("fv_acc".to_string(), "fv_step".to_string()));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn unbound_name_is_a_fatal_error() {
        let (mut scopes, root) = Scopes::new();
        let mut types = TypeEnv::new();
        let mut main = MirBlock::new("main");
        main.push(Instr::Return { lv: "r".into(), value: "ghost".into() });
        let err = convert(&mut main, &mut scopes, root, &mut types).unwrap_err();
        assert!(matches!(err, ConvertError::UnboundName(n) if n == "ghost"));
    }

    #[test]
    fn make_closure_is_left_untouched_by_a_second_pass() {
        let (mut scopes, root) = Scopes::new();
        let mut types = TypeEnv::new();
        let mut block = MirBlock::new("b");
        block.push(Instr::MakeClosure {
            lv: "g_cls".into(),
            fname: "g".into(),
            captures: vec!["y".into()],
            env_ty: MirType::Struct(vec![MirType::Float]),
        });
        let before = block.to_string();
        convert_block(&mut block, &mut Vec::new(), &mut scopes, root, &mut types, &mut KnownFunctions::new(), true).unwrap();
        assert_eq!(before, block.to_string());
    }
}
