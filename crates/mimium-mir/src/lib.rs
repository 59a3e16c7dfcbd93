// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Mid-level IR for the closure-conversion and code-emission pipeline.
//!
//! MIR is a flat, SSA-named instruction sequence (`Instr`/`MirBlock`)
//! produced upstream by parsing and type inference (neither of which this
//! crate implements — see [`closures`] for the boundary). Closure
//! conversion rewrites a tree of `MirBlock`s in place, lifting nested
//! functions to the top level and making environment capture explicit.

mod builder;
pub mod closures;
mod display;
mod instr;
mod symbol;
mod types;

pub use builder::{sub_block, BlockBuilder};
pub use closures::{convert, KnownFunctions};
pub use instr::{CallKind, FreeVar, Instr, MirBlock, Opcode};
pub use symbol::{BindingKind, ScopeId, Scopes, TypeEnv};
pub use types::MirType;
