//! Symbol table and class metadata built up by the checker and consulted
//! by the interpreter.

use crate::ast::{Access, ParamMode};
use crate::types::Type;
use crate::util::Span;
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Const,
    Type,
    Proc,
    Func,
    Class,
    Field,
    Method,
    Constructor,
    Param,
    EnumMember,
}

/// One bound name. Carries enough to answer "what is this" during both
/// checking and evaluation without walking back into the AST.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Option<Type>,
    pub access: Option<Access>,
    pub owner_class: Option<String>,
    /// Where this name was declared, for diagnostics that reference the
    /// declaration site rather than the use site.
    pub decl_span: Span,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, decl_span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            ty: None,
            access: None,
            owner_class: None,
            decl_span,
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner_class = Some(owner.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub name: String,
    pub access: Access,
    pub params: Vec<ParamInfo>,
    pub return_ty: Option<Type>,
}

#[derive(Clone, Debug)]
pub struct ConstructorInfo {
    pub params: Vec<ParamInfo>,
}

#[derive(Clone, Debug)]
pub struct ParamInfo {
    pub name: String,
    pub ty: Type,
    pub mode: ParamMode,
}

/// Fields and methods of a class, flattened in declaration order, plus the
/// link to its base. Field values at construction time are laid out
/// base-first using this same order (see `spec.md` §4.5, "Method
/// dispatch").
#[derive(Clone, Debug, Default)]
pub struct ClassInfo {
    pub base: Option<String>,
    pub fields: Vec<(String, Type, Access)>,
    pub methods: Vec<MethodInfo>,
    pub constructor: Option<ConstructorInfo>,
}

impl ClassInfo {
    /// Looks up a method by name in this class only (no base-chain walk —
    /// that is the interpreter's job at dispatch time, since it needs the
    /// full chain of `ClassInfo`s, not just one).
    pub fn own_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn own_field(&self, name: &str) -> Option<&(String, Type, Access)> {
        self.fields.iter().find(|(n, _, _)| n == name)
    }
}

/// A stack of lexical scopes, innermost last. Declarations go in the top
/// scope; lookups search top-down.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, Symbol>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Defines `symbol` in the innermost scope. Returns `false` (without
    /// inserting) if a symbol of that name already exists in that same
    /// scope — the checker turns that into a `NameError`.
    pub fn define(&mut self, symbol: Symbol) -> bool {
        let scope = self.scopes.last_mut().expect("at least one scope");
        if scope.contains_key(&symbol.name) {
            return false;
        }
        scope.insert(symbol.name.clone(), symbol);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Whether `name` is already bound in the innermost scope specifically
    /// (used for redeclaration checks, as opposed to shadowing checks).
    pub fn defined_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|s| s.contains_key(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup() {
        let mut table = SymbolTable::new();
        assert!(table.define(Symbol::new("X", SymbolKind::Var, Span::at_line(1)).with_type(Type::Integer)));
        let sym = table.lookup("X").expect("X should be bound");
        assert_eq!(sym.ty, Some(Type::Integer));
    }

    #[test]
    fn test_duplicate_define_in_same_scope_fails() {
        let mut table = SymbolTable::new();
        assert!(table.define(Symbol::new("X", SymbolKind::Var, Span::at_line(1))));
        assert!(!table.define(Symbol::new("X", SymbolKind::Var, Span::at_line(2))));
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        table.define(Symbol::new("X", SymbolKind::Var, Span::at_line(1)).with_type(Type::Integer));
        table.push_scope();
        table.define(Symbol::new("X", SymbolKind::Var, Span::at_line(2)).with_type(Type::Real));
        assert_eq!(table.lookup("X").unwrap().ty, Some(Type::Real));
        table.pop_scope();
        assert_eq!(table.lookup("X").unwrap().ty, Some(Type::Integer));
    }

    #[test]
    fn test_class_info_field_and_method_lookup() {
        let mut info = ClassInfo::default();
        info.fields.push(("Name".into(), Type::String, Access::Public));
        info.methods.push(MethodInfo {
            name: "Speak".into(),
            access: Access::Public,
            params: vec![],
            return_ty: Some(Type::String),
        });
        assert!(info.own_field("Name").is_some());
        assert!(info.own_method("Speak").is_some());
        assert!(info.own_method("Bark").is_none());
    }
}
