// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Scope tracking for closure conversion — an explicit arena of scope
//! frames standing in for the external `SymbolEnv` described in the spec
//! (isVariableSet / setVariableRaw / isFreeVariable / createNewChild).
//!
//! Unlike a shared-pointer scope chain, frames never get dropped mid-walk:
//! the arena owns every frame for the lifetime of a conversion, and a
//! `ScopeId` is just an index. Acquiring a child scope for a function lift
//! and "releasing" it back to the caller is just swapping which `ScopeId`
//! the caller holds — there's nothing to leak.

use std::collections::HashMap;

use crate::MirType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) usize);

/// How a name came to be bound in a scope — determines whether it can ever
/// be a free variable (globals and top-level function names cannot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A global constant or top-level function name.
    Global,
    /// A function's formal argument.
    Arg,
    /// An ordinary local binding (an instruction's `lv_name`).
    Local,
}

struct Frame {
    parent: Option<ScopeId>,
    /// True for the scope created at a `Fun` lift site (binds that
    /// function's arguments). Crossing one of these while walking upward
    /// without finding a name is what makes a later match a free variable.
    is_function_root: bool,
    bindings: HashMap<String, BindingKind>,
}

/// Arena of scope frames. The root scope (id 0) holds global constants and
/// top-level function names and is created automatically by [`Scopes::new`].
pub struct Scopes {
    frames: Vec<Frame>,
}

impl Scopes {
    pub fn new() -> (Self, ScopeId) {
        let root = Frame { parent: None, is_function_root: false, bindings: HashMap::new() };
        (Scopes { frames: vec![root] }, ScopeId(0))
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Push a new child scope of `parent` and return its id. Used both for
    /// a function lift (`is_function_root = true`, per spec §4.2 step 1)
    /// and is otherwise unused — `If` branches deliberately reuse the
    /// enclosing scope rather than creating a child (spec §4.2 "Free-variable
    /// discovery").
    pub fn create_new_child(&mut self, parent: ScopeId, is_function_root: bool) -> ScopeId {
        self.frames.push(Frame { parent: Some(parent), is_function_root, bindings: HashMap::new() });
        ScopeId(self.frames.len() - 1)
    }

    pub fn set_variable_raw(&mut self, scope: ScopeId, name: &str, kind: BindingKind) {
        self.frames[scope.0].bindings.insert(name.to_string(), kind);
    }

    /// True if `name` is bound anywhere in `scope`'s chain (including the
    /// global root).
    pub fn is_variable_set(&self, scope: ScopeId, name: &str) -> bool {
        let mut cur = Some(scope);
        while let Some(id) = cur {
            let frame = &self.frames[id.0];
            if frame.bindings.contains_key(name) {
                return true;
            }
            cur = frame.parent;
        }
        false
    }

    /// Returns `(is_bound, is_free)`. A name is free when it is bound in
    /// some scope outside the current function's own chain (i.e. found only
    /// after crossing a function-root boundary) and is not global.
    pub fn is_free_variable(&self, scope: ScopeId, name: &str) -> (bool, bool) {
        let mut cur = Some(scope);
        let mut crossed_function_root = false;
        while let Some(id) = cur {
            let frame = &self.frames[id.0];
            if let Some(kind) = frame.bindings.get(name) {
                if *kind == BindingKind::Global {
                    return (true, false);
                }
                return (true, crossed_function_root);
            }
            if frame.is_function_root {
                crossed_function_root = true;
            }
            cur = frame.parent;
        }
        (false, false)
    }
}

/// Maps names to their MIR type, as supplied by the upstream type checker.
/// Here implemented as a plain owned map so the converter is testable
/// without a real inferencer.
#[derive(Debug, Default, Clone)]
pub struct TypeEnv {
    types: HashMap<String, MirType>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: MirType) {
        self.types.insert(name.into(), ty);
    }

    pub fn find(&self, name: &str) -> Option<&MirType> {
        self.types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_is_not_free_in_its_own_function() {
        let (mut scopes, root) = Scopes::new();
        let f = scopes.create_new_child(root, true);
        scopes.set_variable_raw(f, "x", BindingKind::Arg);
        let (bound, free) = scopes.is_free_variable(f, "x");
        assert!(bound && !free);
    }

    #[test]
    fn outer_local_is_free_inside_nested_function() {
        let (mut scopes, root) = Scopes::new();
        let outer = scopes.create_new_child(root, true);
        scopes.set_variable_raw(outer, "y", BindingKind::Local);
        let inner = scopes.create_new_child(outer, true);
        let (bound, free) = scopes.is_free_variable(inner, "y");
        assert!(bound && free);
    }

    #[test]
    fn global_name_is_never_free() {
        let (mut scopes, root) = Scopes::new();
        scopes.set_variable_raw(root, "osc", BindingKind::Global);
        let f = scopes.create_new_child(root, true);
        let (bound, free) = scopes.is_free_variable(f, "osc");
        assert!(bound && !free);
    }

    #[test]
    fn unbound_name_is_neither() {
        let (scopes, root) = Scopes::new();
        let (bound, free) = scopes.is_free_variable(root, "nope");
        assert!(!bound && !free);
    }

    #[test]
    fn if_branches_share_the_enclosing_scope() {
        // Modeling spec §4.2: If does not push a child scope, so a name
        // bound in the then-branch is visible when checked from the
        // enclosing scope id directly (no new ScopeId is minted for it).
        let (mut scopes, root) = Scopes::new();
        let f = scopes.create_new_child(root, true);
        scopes.set_variable_raw(f, "z", BindingKind::Local);
        assert!(scopes.is_variable_set(f, "z"));
    }
}
