// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Function builder — lowers one converted `Instr`/`MirBlock` tree to
//! Cranelift IR.
//!
//! Locals are Cranelift `Variable`s keyed by `lv_name` (SSA renaming and
//! phi placement are Cranelift's job via `def_var`/`use_var`, not ours —
//! Design Notes "Manual SSA/phi placement"), declared lazily on first
//! write. A captured function's environment arrives as an implicit,
//! unnamed first parameter; its fields are unpacked into `fv_<name>`
//! variables before the body runs, matching how closure conversion
//! renamed every reference to a captured name.

use std::collections::HashMap;

use cranelift::prelude::*;
use cranelift_codegen::ir::condcodes::FloatCC;
use cranelift_codegen::ir::{FuncRef, InstBuilder, MemFlags};
use cranelift_frontend::{FunctionBuilder as ClifFunctionBuilder, FunctionBuilderContext};

use mimium_diagnostics::CodegenError;
use mimium_mir::{CallKind, Instr, MirBlock, MirType, TypeEnv};

use crate::closures::{allocate_closure, allocate_env, load_capture, load_func_ptr, call_closure};
use crate::types::{mir_to_cranelift_type, TIME_TIMESTAMP_OFFSET, TIME_VALUE_OFFSET, TIME_SIZE};

pub struct FunctionBuilder<'a> {
    func_refs: &'a HashMap<String, FuncRef>,
    malloc_ref: FuncRef,
    add_task_ref: FuncRef,
    types: &'a TypeEnv,
    var_map: HashMap<String, Variable>,
    next_var: usize,
    /// Return types of every timed call site seen while lowering — the
    /// scheduler's own dispatch table is this crate's only visibility into
    /// what `addTask` will eventually run.
    pub task_types: Vec<MirType>,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(
        func_refs: &'a HashMap<String, FuncRef>,
        malloc_ref: FuncRef,
        add_task_ref: FuncRef,
        types: &'a TypeEnv,
    ) -> Self {
        FunctionBuilder {
            func_refs,
            malloc_ref,
            add_task_ref,
            types,
            var_map: HashMap::new(),
            next_var: 0,
            task_types: Vec::new(),
        }
    }

    fn ty_of(&self, name: &str) -> Result<MirType, CodegenError> {
        self.types.find(name).cloned().ok_or_else(|| CodegenError::NameNotFound(name.to_string()))
    }

    fn var_for(&mut self, builder: &mut ClifFunctionBuilder, name: &str, cl_ty: Type) -> Variable {
        if let Some(v) = self.var_map.get(name) {
            return *v;
        }
        let v = Variable::new(self.next_var);
        self.next_var += 1;
        builder.declare_var(v, cl_ty);
        self.var_map.insert(name.to_string(), v);
        v
    }

    fn def(&mut self, builder: &mut ClifFunctionBuilder, name: &str, cl_ty: Type, val: Value) {
        let v = self.var_for(builder, name, cl_ty);
        builder.def_var(v, val);
    }

    fn use_(&mut self, builder: &mut ClifFunctionBuilder, name: &str) -> Result<Value, CodegenError> {
        let v = *self.var_map.get(name).ok_or_else(|| CodegenError::NameNotFound(name.to_string()))?;
        Ok(builder.use_var(v))
    }

    /// Lowers a whole function: binds the implicit environment parameter
    /// (if any), then the declared arguments, then the body.
    pub fn build(
        &mut self,
        builder: &mut ClifFunctionBuilder,
        entry: Block,
        args: &[String],
        free_vars: &[String],
        ret_ty: &MirType,
        body: &MirBlock,
    ) -> Result<(), CodegenError> {
        let mut param_idx = 0;

        if !free_vars.is_empty() {
            let env_param = builder.block_params(entry)[param_idx];
            param_idx += 1;
            for (i, fv) in free_vars.iter().enumerate() {
                let fv_ty = self.ty_of(fv)?;
                let cl_ty = mir_to_cranelift_type(&fv_ty)?;
                let val = load_capture(builder, env_param, i as i32 * 8, cl_ty);
                self.def(builder, &format!("fv_{fv}"), cl_ty, val);
            }
        }

        for arg in args {
            let arg_ty = self.ty_of(arg)?;
            let cl_ty = mir_to_cranelift_type(&arg_ty)?;
            let param = builder.block_params(entry)[param_idx];
            param_idx += 1;
            self.def(builder, arg, cl_ty, param);
        }

        let terminated = self.lower_block(builder, body)?;
        if !terminated {
            if matches!(ret_ty, MirType::Void) {
                builder.ins().return_(&[]);
            } else {
                return Err(CodegenError::MissingReturn(body.label.clone()));
            }
        }
        Ok(())
    }

    /// Lowers every instruction in `block`. Returns whether the block ended
    /// with an explicit `Return` (a terminator) rather than falling through.
    fn lower_block(&mut self, builder: &mut ClifFunctionBuilder, block: &MirBlock) -> Result<bool, CodegenError> {
        for instr in &block.instructions {
            if let Instr::Return { value, .. } = instr {
                let ty = self.ty_of(value)?;
                if matches!(ty, MirType::Void) {
                    builder.ins().return_(&[]);
                } else {
                    let val = self.use_(builder, value)?;
                    builder.ins().return_(&[val]);
                }
                return Ok(true);
            }
            self.lower_instr(builder, instr)?;
        }
        Ok(false)
    }

    fn lower_instr(&mut self, builder: &mut ClifFunctionBuilder, instr: &Instr) -> Result<(), CodegenError> {
        match instr {
            Instr::Number { lv, value } => {
                let val = builder.ins().f64const(*value);
                self.def(builder, lv, types::F64, val);
            }
            Instr::Symbol { lv, name } => {
                let ty = self.ty_of(name)?;
                let cl_ty = mir_to_cranelift_type(&ty)?;
                let val = self.use_(builder, name)?;
                self.def(builder, lv, cl_ty, val);
            }
            // This backend represents every value uniformly (scalars as
            // f64, aggregates as an i64 pointer already); "address-of" and
            // "value-of" coincide, so Ref is a pass-through.
            Instr::Ref { lv, name } => {
                let ty = self.ty_of(name)?;
                let cl_ty = mir_to_cranelift_type(&ty)?;
                let val = self.use_(builder, name)?;
                self.def(builder, lv, cl_ty, val);
            }
            Instr::Alloca { lv, ty } => {
                let size = match ty {
                    MirType::Struct(fields) => fields.len() as i64 * 8,
                    MirType::Time(_) => TIME_SIZE as i64,
                    other => return Err(CodegenError::UnsupportedType(other.to_string())),
                };
                let size_val = builder.ins().iconst(types::I64, size);
                let call = builder.ins().call(self.malloc_ref, &[size_val]);
                let ptr = builder.inst_results(call)[0];
                self.def(builder, lv, types::I64, ptr);
            }
            Instr::Time { lv, value, time } => {
                let time_val = self.use_(builder, time)?;
                let inner_val = self.use_(builder, value)?;
                let size_val = builder.ins().iconst(types::I64, TIME_SIZE as i64);
                let call = builder.ins().call(self.malloc_ref, &[size_val]);
                let ptr = builder.inst_results(call)[0];
                builder.ins().store(MemFlags::new(), time_val, ptr, TIME_TIMESTAMP_OFFSET);
                builder.ins().store(MemFlags::new(), inner_val, ptr, TIME_VALUE_OFFSET);
                self.def(builder, lv, types::I64, ptr);
            }
            Instr::Op { lv, op, lhs, rhs } => {
                let l = self.use_(builder, lhs)?;
                let r = self.use_(builder, rhs)?;
                let result = match op {
                    mimium_mir::Opcode::Add => builder.ins().fadd(l, r),
                    mimium_mir::Opcode::Sub => builder.ins().fsub(l, r),
                    mimium_mir::Opcode::Mul => builder.ins().fmul(l, r),
                    mimium_mir::Opcode::Div => builder.ins().fdiv(l, r),
                };
                self.def(builder, lv, types::F64, result);
            }
            // Locals in this backend are Cranelift `Variable`s rather than
            // memory cells (module doc: SSA renaming is Cranelift's job), so
            // "store into ptr_<lv>, relabel the old binding as <lv>_o,
            // reload into a fresh <lv>" becomes: keep the old `Variable`
            // under the `_o` key and rebind `lv` to a brand new one.
            // Non-float lvalues are ignored, as the source format specifies.
            Instr::Assign { lv, value } => {
                if matches!(self.ty_of(lv)?, MirType::Float) {
                    let val = self.use_(builder, value)?;
                    if let Some(old) = self.var_map.remove(lv) {
                        self.var_map.insert(format!("{lv}_o"), old);
                    }
                    self.def(builder, lv, types::F64, val);
                }
            }
            Instr::Array { lv, args } => {
                let size_val = builder.ins().iconst(types::I64, args.len() as i64 * 8);
                let call = builder.ins().call(self.malloc_ref, &[size_val]);
                let ptr = builder.inst_results(call)[0];
                for (i, a) in args.iter().enumerate() {
                    let val = self.use_(builder, a)?;
                    builder.ins().store(MemFlags::new(), val, ptr, i as i32 * 8);
                }
                self.def(builder, lv, types::I64, ptr);
            }
            Instr::ArrayAccess { lv, name, index } => {
                let base = self.use_(builder, name)?;
                let idx_f = self.use_(builder, index)?;
                let idx_i = builder.ins().fcvt_to_sint_sat(types::I64, idx_f);
                let eight = builder.ins().iconst(types::I64, 8);
                let byte_off = builder.ins().imul(idx_i, eight);
                let addr = builder.ins().iadd(base, byte_off);
                let val = builder.ins().load(types::F64, MemFlags::new(), addr, 0);
                self.def(builder, lv, types::F64, val);
            }
            Instr::MakeClosure { lv, fname, captures, .. } => {
                let mut fields = Vec::with_capacity(captures.len());
                for c in captures {
                    fields.push(self.use_(builder, c)?);
                }
                let env_ptr = allocate_env(builder, self.malloc_ref, &fields);
                let func_ref = *self.func_refs.get(fname).ok_or_else(|| CodegenError::CalleeNotFound(fname.clone()))?;
                let func_ptr = builder.ins().func_addr(types::I64, func_ref);
                let closure_ptr = allocate_closure(builder, self.malloc_ref, func_ptr, env_ptr);
                self.def(builder, lv, types::I64, closure_ptr);
            }
            Instr::Fcall { lv, fname, args, kind, is_timed } => {
                if *is_timed {
                    self.lower_timed_call(builder, lv, fname, args, *kind)?;
                } else {
                    self.lower_call(builder, lv, fname, args, *kind)?;
                }
            }
            Instr::If { lv, cond, then_block, else_block } => {
                self.lower_if(builder, lv, cond, then_block, else_block)?;
            }
            Instr::Return { .. } => unreachable!("Return is handled by lower_block"),
        }
        Ok(())
    }

    fn lower_call(
        &mut self,
        builder: &mut ClifFunctionBuilder,
        lv: &str,
        fname: &str,
        args: &[String],
        kind: CallKind,
    ) -> Result<(), CodegenError> {
        let ret_ty = match self.ty_of(fname)? {
            MirType::Function(_, ret) => *ret,
            _ => MirType::Void,
        };
        let ret_cl_ty = if matches!(ret_ty, MirType::Void) { None } else { Some(mir_to_cranelift_type(&ret_ty)?) };

        let mut arg_vals = Vec::with_capacity(args.len());
        for a in args {
            arg_vals.push(self.use_(builder, a)?);
        }

        let result = match kind {
            CallKind::Direct | CallKind::External => {
                let func_ref = *self.func_refs.get(fname).ok_or_else(|| CodegenError::CalleeNotFound(fname.to_string()))?;
                let call = builder.ins().call(func_ref, &arg_vals);
                builder.inst_results(call).first().copied()
            }
            CallKind::Closure => {
                let closure_ptr = self.use_(builder, &format!("{fname}_cls"))?;
                let mut sig = builder.func.signature.clone();
                sig.params.clear();
                sig.returns.clear();
                for v in &arg_vals {
                    sig.params.push(AbiParam::new(builder.func.dfg.value_type(*v)));
                }
                if let Some(rt) = ret_cl_ty {
                    sig.returns.push(AbiParam::new(rt));
                }
                let call = call_closure(builder, closure_ptr, sig, &arg_vals);
                builder.inst_results(call).first().copied()
            }
        };

        match (result, ret_cl_ty) {
            (Some(v), Some(ty)) => self.def(builder, lv, ty, v),
            _ => {
                let zero = builder.ins().iconst(types::I64, 0);
                self.def(builder, lv, types::I64, zero);
            }
        }
        Ok(())
    }

    /// Timed calls carry exactly one operand: a `Time(Float)` pointer built
    /// by a prior `Instr::Time`. The pointer is unpacked into the schedule
    /// timestamp and the deferred argument, and both cross the `addTask`
    /// ABI boundary as plain `double`s — the scheduler's fixed 4-argument
    /// signature has no slot for an environment pointer, so the callee
    /// function pointer passed here is the bare code address, never a
    /// boxed `{func_ptr, env_ptr}` pair.
    fn lower_timed_call(
        &mut self,
        builder: &mut ClifFunctionBuilder,
        lv: &str,
        fname: &str,
        args: &[String],
        kind: CallKind,
    ) -> Result<(), CodegenError> {
        if args.len() != 1 {
            return Err(CodegenError::UnsupportedType(format!(
                "timed call `{fname}` must carry exactly one time operand, found {}",
                args.len()
            )));
        }
        let time_ptr = self.use_(builder, &args[0])?;
        let time_val = builder.ins().load(types::F64, MemFlags::new(), time_ptr, TIME_TIMESTAMP_OFFSET);
        let arg_val = builder.ins().load(types::F64, MemFlags::new(), time_ptr, TIME_VALUE_OFFSET);

        let func_ptr = match kind {
            CallKind::Direct | CallKind::External => {
                let func_ref = *self.func_refs.get(fname).ok_or_else(|| CodegenError::CalleeNotFound(fname.to_string()))?;
                builder.ins().func_addr(types::I64, func_ref)
            }
            CallKind::Closure => {
                let closure_ptr = self.use_(builder, &format!("{fname}_cls"))?;
                load_func_ptr(builder, closure_ptr)
            }
        };

        // The result slot must outlive this function's own activation since
        // the scheduler writes to it after this call returns — heap, not
        // stack, allocated, same as every other long-lived value here.
        let slot_size = builder.ins().iconst(types::I64, 8);
        let call = builder.ins().call(self.malloc_ref, &[slot_size]);
        let result_slot = builder.inst_results(call)[0];

        builder.ins().call(self.add_task_ref, &[time_val, func_ptr, arg_val, result_slot]);

        let ret_ty = match self.ty_of(fname)? {
            MirType::Function(_, ret) => *ret,
            _ => MirType::Void,
        };
        self.task_types.push(ret_ty);

        self.def(builder, lv, types::I64, result_slot);
        Ok(())
    }

    fn lower_if(
        &mut self,
        builder: &mut ClifFunctionBuilder,
        lv: &str,
        cond: &str,
        then_block: &MirBlock,
        else_block: &MirBlock,
    ) -> Result<(), CodegenError> {
        let cond_val = self.use_(builder, cond)?;
        let zero = builder.ins().f64const(0.0);
        let cond_bool = builder.ins().fcmp(FloatCC::NotEqual, cond_val, zero);

        let merge_ty = mir_to_cranelift_type(&self.ty_of(lv)?)?;
        let then_blk = builder.create_block();
        let else_blk = builder.create_block();
        let merge_blk = builder.create_block();
        builder.append_block_param(merge_blk, merge_ty);

        builder.ins().brif(cond_bool, then_blk, &[], else_blk, &[]);

        builder.switch_to_block(then_blk);
        let then_last = then_block.instructions.last().map(|i| i.lv_name().to_string())
            .ok_or_else(|| CodegenError::UnsupportedType("if-branch has no instructions".to_string()))?;
        let then_terminated = self.lower_block(builder, then_block)?;
        if !then_terminated {
            let v = self.use_(builder, &then_last)?;
            builder.ins().jump(merge_blk, &[v]);
        }
        builder.seal_block(then_blk);

        builder.switch_to_block(else_blk);
        let else_last = else_block.instructions.last().map(|i| i.lv_name().to_string())
            .ok_or_else(|| CodegenError::UnsupportedType("if-branch has no instructions".to_string()))?;
        let else_terminated = self.lower_block(builder, else_block)?;
        if !else_terminated {
            let v = self.use_(builder, &else_last)?;
            builder.ins().jump(merge_blk, &[v]);
        }
        builder.seal_block(else_blk);

        builder.switch_to_block(merge_blk);
        builder.seal_block(merge_blk);
        let result = builder.block_params(merge_blk)[0];
        self.def(builder, lv, merge_ty, result);
        Ok(())
    }
}
