// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Cranelift module setup and code generation orchestration.
//!
//! Targets AOT object emission (`cranelift-object`) rather than a JIT: the
//! JIT/linker step that turns this object into a runnable program is an
//! external collaborator this crate never invokes.

use std::collections::HashMap;

use cranelift::prelude::*;
use cranelift_module::{FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};

use mimium_diagnostics::CodegenError;
use mimium_mir::{Instr, MirBlock, MirType, TypeEnv};

use crate::builder::FunctionBuilder;
use crate::types::mir_to_cranelift_type;

/// Name of the synthesized function wrapping the top-level block's non-`Fun`
/// instructions (the program's actual "main" logic — the statements that
/// build closures and call into them). There is no source-level `Fun` for
/// this code, so `compile_module` gives it one.
pub const TOP_LEVEL_FN: &str = "__mimium_top";

pub struct CodeGenerator {
    module: ObjectModule,
    ctx: codegen::Context,
    func_ids: HashMap<String, FuncId>,
    malloc_id: Option<FuncId>,
    add_task_id: Option<FuncId>,
    task_types: Vec<MirType>,
}

impl CodeGenerator {
    pub fn new() -> Result<Self, CodegenError> {
        let mut flag_builder = settings::builder();
        // Approximates the `NoInline`/`OptimizeNone` attribute pair required
        // on the synthesized entry point: Cranelift has no per-function
        // attribute for this, so the whole module is built unoptimized.
        flag_builder
            .set("opt_level", "none")
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        let isa_builder = cranelift_native::builder().map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;

        let builder = ObjectBuilder::new(isa, "mimium_module", cranelift_module::default_libcall_names())
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        let module = ObjectModule::new(builder);

        let mut gen = CodeGenerator {
            module,
            ctx: codegen::Context::new(),
            func_ids: HashMap::new(),
            malloc_id: None,
            add_task_id: None,
            task_types: Vec::new(),
        };
        gen.declare_runtime_functions()?;
        Ok(gen)
    }

    fn declare_import(
        module: &mut ObjectModule,
        name: &str,
        params: &[Type],
        ret: Option<Type>,
    ) -> Result<FuncId, CodegenError> {
        let mut sig = module.make_signature();
        for p in params {
            sig.params.push(AbiParam::new(*p));
        }
        if let Some(r) = ret {
            sig.returns.push(AbiParam::new(r));
        }
        module
            .declare_function(name, Linkage::Import, &sig)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))
    }

    /// Declares the runtime scheduler and allocator imports: `malloc` (the
    /// allocator every heap-backed value in this backend goes through) and
    /// `addTask` (the scheduler entry point a timed call lowers to, bit-exact
    /// per the external ABI: `(double, void*, double, double*) -> void`).
    pub fn declare_runtime_functions(&mut self) -> Result<(), CodegenError> {
        self.malloc_id = Some(Self::declare_import(&mut self.module, "malloc", &[types::I64], Some(types::I64))?);
        self.add_task_id = Some(Self::declare_import(
            &mut self.module,
            "addTask",
            &[types::F64, types::I64, types::F64, types::I64],
            None,
        )?);
        Ok(())
    }

    fn malloc_id(&self) -> FuncId {
        self.malloc_id.expect("declare_runtime_functions runs in new()")
    }

    fn add_task_id(&self) -> FuncId {
        self.add_task_id.expect("declare_runtime_functions runs in new()")
    }

    fn signature_for(&self, args: &[String], free_vars: &[String], types: &TypeEnv) -> Result<Signature, CodegenError> {
        let mut sig = self.module.make_signature();
        if !free_vars.is_empty() {
            sig.params.push(AbiParam::new(types::I64));
        }
        for a in args {
            let ty = types.find(a).cloned().ok_or_else(|| CodegenError::NameNotFound(a.clone()))?;
            sig.params.push(AbiParam::new(mir_to_cranelift_type(&ty)?));
        }
        Ok(sig)
    }

    /// Declares every top-level `Fun` first so mutually-recursive and
    /// forward-referenced calls resolve, plus [`TOP_LEVEL_FN`] for the
    /// top-level block's own statements.
    pub fn declare_functions(&mut self, top: &MirBlock, types: &TypeEnv) -> Result<(), CodegenError> {
        for instr in &top.instructions {
            if let Instr::Fun { lv, args, free_vars, .. } = instr {
                let mut sig = self.signature_for(args, free_vars, types)?;
                let ret_ty = match types.find(lv) {
                    Some(MirType::Function(_, ret)) => (**ret).clone(),
                    _ => MirType::Void,
                };
                if !matches!(ret_ty, MirType::Void) {
                    sig.returns.push(AbiParam::new(mir_to_cranelift_type(&ret_ty)?));
                }
                let func_id = self
                    .module
                    .declare_function(lv, Linkage::Export, &sig)
                    .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
                self.func_ids.insert(lv.clone(), func_id);
            }
        }

        let top_sig = self.module.make_signature();
        let top_id = self
            .module
            .declare_function(TOP_LEVEL_FN, Linkage::Export, &top_sig)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        self.func_ids.insert(TOP_LEVEL_FN.to_string(), top_id);
        Ok(())
    }

    /// Generates every declared top-level `Fun`, then [`TOP_LEVEL_FN`] from
    /// the top-level block's remaining (non-`Fun`) statements.
    pub fn compile_module(&mut self, top: &MirBlock, types: &TypeEnv) -> Result<(), CodegenError> {
        for instr in &top.instructions {
            if let Instr::Fun { lv, args, body, free_vars } = instr {
                self.gen_function(lv, args, free_vars, body, types)?;
            }
        }

        // The top level has no caller to hand a value back to, so a trailing
        // `Return` there (an expression-statement's leftover value, not an
        // ABI return) is dropped rather than wired into TOP_LEVEL_FN's
        // signature.
        let top_level_body = MirBlock {
            label: top.label.clone(),
            instructions: top
                .instructions
                .iter()
                .filter(|i| !matches!(i, Instr::Fun { .. } | Instr::Return { .. }))
                .cloned()
                .collect(),
        };
        self.gen_function(TOP_LEVEL_FN, &[], &[], &top_level_body, types)?;
        Ok(())
    }

    fn gen_function(
        &mut self,
        name: &str,
        args: &[String],
        free_vars: &[String],
        body: &MirBlock,
        types: &TypeEnv,
    ) -> Result<(), CodegenError> {
        let func_id = *self.func_ids.get(name).ok_or_else(|| CodegenError::CalleeNotFound(name.to_string()))?;

        self.ctx.clear();
        let mut sig = self.signature_for(args, free_vars, types)?;
        let ret_ty = match types.find(name) {
            Some(MirType::Function(_, ret)) => (**ret).clone(),
            _ => MirType::Void,
        };
        if !matches!(ret_ty, MirType::Void) {
            sig.returns.push(AbiParam::new(mir_to_cranelift_type(&ret_ty)?));
        }
        self.ctx.func.signature = sig;

        let mut func_refs = HashMap::new();
        for (fname, fid) in &self.func_ids {
            func_refs.insert(fname.clone(), self.module.declare_func_in_func(*fid, &mut self.ctx.func));
        }
        let malloc_ref = self.module.declare_func_in_func(self.malloc_id(), &mut self.ctx.func);
        let add_task_ref = self.module.declare_func_in_func(self.add_task_id(), &mut self.ctx.func);

        let mut fb_ctx = FunctionBuilderContext::new();
        let mut clif_builder = cranelift_frontend::FunctionBuilder::new(&mut self.ctx.func, &mut fb_ctx);
        let entry = clif_builder.create_block();
        clif_builder.append_block_params_for_function_params(entry);
        clif_builder.switch_to_block(entry);
        clif_builder.seal_block(entry);

        let mut fn_builder = FunctionBuilder::new(&func_refs, malloc_ref, add_task_ref, types);
        fn_builder.build(&mut clif_builder, entry, args, free_vars, &ret_ty, body)?;
        clif_builder.finalize();

        self.task_types.extend(fn_builder.task_types);

        self.module
            .define_function(func_id, &mut self.ctx)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        Ok(())
    }

    /// Synthesizes the process entry point `__mimium_main`: calls
    /// `entry_name` with no arguments, then returns `i64 0` as the process
    /// exit code (§4.3.6's terminator fallback, applied unconditionally
    /// since this wrapper never inherits a real terminator from the
    /// callee). Callers typically pass [`TOP_LEVEL_FN`] so `__mimium_main`
    /// runs the program's own top-level statements.
    pub fn declare_entry(&mut self, entry_name: &str) -> Result<(), CodegenError> {
        let callee_id = *self.func_ids.get(entry_name).ok_or_else(|| CodegenError::CalleeNotFound(entry_name.to_string()))?;

        self.ctx.clear();
        let mut sig = self.module.make_signature();
        sig.returns.push(AbiParam::new(types::I64));
        self.ctx.func.signature = sig;
        let callee_ref = self.module.declare_func_in_func(callee_id, &mut self.ctx.func);

        let mut fb_ctx = FunctionBuilderContext::new();
        let mut b = cranelift_frontend::FunctionBuilder::new(&mut self.ctx.func, &mut fb_ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.seal_block(entry);
        b.ins().call(callee_ref, &[]);
        let exit_code = b.ins().iconst(types::I64, 0);
        b.ins().return_(&[exit_code]);
        b.finalize();

        let entry_id = self
            .module
            .declare_function("__mimium_main", Linkage::Export, &self.ctx.func.signature.clone())
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        self.module
            .define_function(entry_id, &mut self.ctx)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        Ok(())
    }

    /// Return types accumulated from every timed call site compiled so far.
    pub fn task_types(&self) -> &[MirType] {
        &self.task_types
    }

    /// Drops all per-compile state (function declarations, task types) so
    /// the same `CodeGenerator` can compile a fresh module. The runtime
    /// imports declared in `new` are untouched.
    pub fn reset(&mut self) {
        self.func_ids.clear();
        self.task_types.clear();
        self.ctx.clear();
    }

    pub fn emit_object(self, path: &str) -> Result<(), CodegenError> {
        let product = self.module.finish();
        let bytes = product.emit().map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        Ok(())
    }
}
