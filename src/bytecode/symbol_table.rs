//! Lexically nested symbol tables with free-variable promotion.

use std::collections::HashMap;

/// Where a resolved name lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Free,
    Builtin,
    /// The name of the function currently being compiled; loads become
    /// `OpCurrentClosure`.
    Function,
}

/// A resolved name: immutable once handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical scope's name bindings. Tables chain outward through `outer`;
/// depth 0 is the global table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub outer: Option<Box<SymbolTable>>,
    /// Originals of the symbols this table rewrote as Free, in capture
    /// order. The enclosing scope loads these when emitting `OpClosure`.
    pub free_symbols: Vec<Symbol>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    depth: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            depth: outer.depth + 1,
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    /// Number of names defined directly in this table (the function's
    /// local-slot count).
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Bind a name in this table, overwriting any previous binding (`let`
    /// redeclares). Scope is Global at depth 0, Local otherwise.
    pub fn define(&mut self, name: impl Into<String>) -> Symbol {
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            scope: if self.outer.is_none() {
                SymbolScope::Global
            } else {
                SymbolScope::Local
            },
            index: self.num_definitions,
        };
        self.store.insert(name, symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Register a builtin at its catalog index. Only meaningful on the
    /// global table.
    pub fn define_builtin(&mut self, index: usize, name: impl Into<String>) -> Symbol {
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name, symbol.clone());
        symbol
    }

    /// Bind the enclosing function's own name so its body can recurse via
    /// `OpCurrentClosure`.
    pub fn define_function_name(&mut self, name: impl Into<String>) -> Symbol {
        let name = name.into();
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name, symbol.clone());
        symbol
    }

    /// Resolve a name, recursing into enclosing tables. A Local or Free
    /// symbol observed across a function boundary is rewritten here as a
    /// new Free symbol; Global, Builtin, and Function symbols propagate
    /// unchanged. This rewrite is the heart of closure conversion.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer_symbol = self.outer.as_mut()?.resolve(name)?;
        match outer_symbol.scope {
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(outer_symbol)),
            _ => Some(outer_symbol),
        }
    }

    /// Resolve against this table only, without recursing outward. Used by
    /// `let` so redeclaration stays in the current scope.
    pub fn resolve_current(&self, name: &str) -> Option<Symbol> {
        self.store.get(name).cloned()
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.store.insert(original.name.clone(), symbol.clone());
        self.free_symbols.push(original);
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_resolve_globals() {
        let mut global = SymbolTable::new();
        let a = global.define("a");
        let b = global.define("b");

        assert_eq!(a.scope, SymbolScope::Global);
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_eq!(global.resolve("a"), Some(a));
    }

    #[test]
    fn test_redefine_overwrites() {
        let mut global = SymbolTable::new();
        global.define("a");
        let again = global.define("a");

        // the redeclaration consumes a fresh slot
        assert_eq!(again.index, 1);
        assert_eq!(global.resolve("a").unwrap().index, 1);
    }

    #[test]
    fn test_locals_in_enclosed_table() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = SymbolTable::new_enclosed(global);
        let c = local.define("c");
        assert_eq!(c.scope, SymbolScope::Local);
        assert_eq!(c.index, 0);

        // globals resolve through the chain unchanged
        let a = local.resolve("a").unwrap();
        assert_eq!(a.scope, SymbolScope::Global);
    }

    #[test]
    fn test_free_variable_promotion() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first = SymbolTable::new_enclosed(global);
        first.define("b");

        let mut second = SymbolTable::new_enclosed(first);
        second.define("c");

        // `b` is a local of `first` seen across a function boundary
        let b = second.resolve("b").unwrap();
        assert_eq!(b.scope, SymbolScope::Free);
        assert_eq!(b.index, 0);

        // the original local is recorded for the enclosing OpClosure
        assert_eq!(second.free_symbols.len(), 1);
        assert_eq!(second.free_symbols[0].scope, SymbolScope::Local);

        // `a` stays global even two levels deep
        let a = second.resolve("a").unwrap();
        assert_eq!(a.scope, SymbolScope::Global);
    }

    #[test]
    fn test_nested_free_chains_through_intermediate_table() {
        let mut global = SymbolTable::new();
        global.define("g");

        let mut outer = SymbolTable::new_enclosed(global);
        outer.define("x");

        let mut middle = SymbolTable::new_enclosed(outer);
        let mut inner = SymbolTable::new_enclosed(middle);

        // resolving from the innermost table promotes `x` in every table
        // between its definition and the use
        let x = inner.resolve("x").unwrap();
        assert_eq!(x.scope, SymbolScope::Free);
        assert_eq!(inner.free_symbols[0].scope, SymbolScope::Free);

        let middle = inner.outer.as_ref().unwrap();
        assert_eq!(middle.free_symbols[0].scope, SymbolScope::Local);
    }

    #[test]
    fn test_builtin_scope_propagates_unchanged() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");

        let mut local = SymbolTable::new_enclosed(global);
        let len = local.resolve("len").unwrap();
        assert_eq!(len.scope, SymbolScope::Builtin);
        assert!(local.free_symbols.is_empty());
    }

    #[test]
    fn test_function_name_shadowed_by_local_define() {
        let mut table = SymbolTable::new_enclosed(SymbolTable::new());
        table.define_function_name("f");
        assert_eq!(
            table.resolve("f").unwrap().scope,
            SymbolScope::Function
        );

        table.define("f");
        assert_eq!(table.resolve("f").unwrap().scope, SymbolScope::Local);
    }

    #[test]
    fn test_resolve_current_does_not_recurse() {
        let mut global = SymbolTable::new();
        global.define("a");
        let local = SymbolTable::new_enclosed(global);
        assert!(local.resolve_current("a").is_none());
    }
}
