// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Closure environment support — heap allocation, capture storage, and
//! indirect calls through a `{ func_ptr, env_ptr }` pair.
//!
//! Adapted from a stack-allocated closure layout: a converted function's
//! environment can outlive the frame that built it (a `MakeClosure` result
//! can be returned, stored, or scheduled via `addTask`), so it is heap
//! allocated through the imported `malloc`, never a `StackSlot`.

use cranelift::prelude::*;
use cranelift_codegen::ir::{FuncRef, InstBuilder, MemFlags};
use cranelift_frontend::FunctionBuilder as ClifFunctionBuilder;

pub const CLOSURE_SIZE: i64 = 16;
pub const CLOSURE_FUNC_OFFSET: i32 = 0;
pub const CLOSURE_ENV_OFFSET: i32 = 8;

/// Heap-allocates an environment struct sized for `field_values`, stores
/// each field at its 8-byte slot, and returns the environment pointer.
/// `field_values[i]` is written at `layout.offsets[i]` (see
/// [`crate::types::StructLayout`]).
pub fn allocate_env(
    builder: &mut ClifFunctionBuilder,
    malloc_ref: FuncRef,
    field_values: &[Value],
) -> Value {
    if field_values.is_empty() {
        return builder.ins().iconst(types::I64, 0);
    }
    let size = builder.ins().iconst(types::I64, field_values.len() as i64 * 8);
    let call = builder.ins().call(malloc_ref, &[size]);
    let env_ptr = builder.inst_results(call)[0];
    for (i, val) in field_values.iter().enumerate() {
        builder.ins().store(MemFlags::new(), *val, env_ptr, i as i32 * 8);
    }
    env_ptr
}

pub fn load_capture(builder: &mut ClifFunctionBuilder, env_ptr: Value, offset: i32, ty: Type) -> Value {
    builder.ins().load(ty, MemFlags::new(), env_ptr, offset)
}

/// Heap-allocates the `{ func_ptr, env_ptr }` closure pair itself and
/// returns a pointer to it.
pub fn allocate_closure(
    builder: &mut ClifFunctionBuilder,
    malloc_ref: FuncRef,
    func_ptr: Value,
    env_ptr: Value,
) -> Value {
    let size = builder.ins().iconst(types::I64, CLOSURE_SIZE);
    let call = builder.ins().call(malloc_ref, &[size]);
    let closure_ptr = builder.inst_results(call)[0];
    builder.ins().store(MemFlags::new(), func_ptr, closure_ptr, CLOSURE_FUNC_OFFSET);
    builder.ins().store(MemFlags::new(), env_ptr, closure_ptr, CLOSURE_ENV_OFFSET);
    closure_ptr
}

pub fn load_func_ptr(builder: &mut ClifFunctionBuilder, closure_ptr: Value) -> Value {
    builder.ins().load(types::I64, MemFlags::new(), closure_ptr, CLOSURE_FUNC_OFFSET)
}

pub fn load_env_ptr(builder: &mut ClifFunctionBuilder, closure_ptr: Value) -> Value {
    builder.ins().load(types::I64, MemFlags::new(), closure_ptr, CLOSURE_ENV_OFFSET)
}

/// Calls through a closure value: loads `func_ptr`/`env_ptr`, prepends
/// `env_ptr` as the callee's implicit first argument, and performs an
/// indirect call.
pub fn call_closure(
    builder: &mut ClifFunctionBuilder,
    closure_ptr: Value,
    mut sig: Signature,
    args: &[Value],
) -> cranelift_codegen::ir::Inst {
    let func_ptr = load_func_ptr(builder, closure_ptr);
    let env_ptr = load_env_ptr(builder, closure_ptr);
    sig.params.insert(0, AbiParam::new(types::I64));
    let mut all_args = Vec::with_capacity(args.len() + 1);
    all_args.push(env_ptr);
    all_args.extend_from_slice(args);
    let sig_ref = builder.import_signature(sig);
    builder.ins().call_indirect(sig_ref, func_ptr, &all_args)
}
