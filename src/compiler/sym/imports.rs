//! Name lookup through the module graph.
//!
//! A module's own members always shadow anything reachable through its
//! imports.  When a name is only found through imports, every import edge is
//! searched; private and public edges for lookups originating inside the
//! module, public edges only when the module is itself being searched
//! through someone else's public import; and if two or more equally
//! visible paths produce *different* declarations the lookup is ambiguous.
//! The importing module graph may be cyclic; a visited set keeps the search
//! finite.

use std::collections::HashSet;

use super::{ModuleId, SymbolId, Symbols, Visibility};
use crate::StringId;

/// Result of a module-scope lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum LookupOutcome {
    NotFound,
    Found(SymbolId),
    /// The distinct declarations reachable via equally visible import
    /// paths.  Reported once; the caller substitutes an error symbol.
    Ambiguous(Vec<SymbolId>),
}

/// Looks `name` up in `module`'s scope.  `module_syms` maps a [`ModuleId`]
/// to its module symbol.  `internal` is true when the lookup originates in
/// the module itself (private imports are then visible).
pub fn lookup_in_module(
    syms: &Symbols,
    module_syms: &[SymbolId],
    module: ModuleId,
    name: StringId,
    internal: bool,
) -> LookupOutcome {
    let mut visited = HashSet::new();
    lookup_walk(syms, module_syms, module, name, internal, &mut visited)
}

fn lookup_walk(
    syms: &Symbols,
    module_syms: &[SymbolId],
    module: ModuleId,
    name: StringId,
    internal: bool,
    visited: &mut HashSet<ModuleId>,
) -> LookupOutcome {
    if !visited.insert(module) {
        return LookupOutcome::NotFound;
    }

    let scope = match syms.get(module_syms[module.index()]).as_module() {
        Some(m) => m,
        None => return LookupOutcome::NotFound,
    };

    // Own members shadow imports.
    if let Some(found) = scope.members.get(&name) {
        return LookupOutcome::Found(*found);
    }

    // Search the import edges.  Each edge contributes at most one
    // declaration; distinct declarations from different edges are ambiguous.
    let mut hits: Vec<SymbolId> = vec![];
    for (imported, vis) in &scope.imports {
        if !internal && *vis == Visibility::Private {
            continue;
        }
        match lookup_walk(syms, module_syms, *imported, name, false, visited) {
            LookupOutcome::NotFound => (),
            LookupOutcome::Found(s) => {
                if !hits.contains(&s) {
                    hits.push(s);
                }
            }
            LookupOutcome::Ambiguous(mut more) => {
                for s in more.drain(..) {
                    if !hits.contains(&s) {
                        hits.push(s);
                    }
                }
            }
        }
    }

    match hits.len() {
        0 => LookupOutcome::NotFound,
        1 => LookupOutcome::Found(hits[0]),
        _ => LookupOutcome::Ambiguous(hits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::sym::{ModuleScope, Symbol, SymbolKind};
    use crate::compiler::Span;
    use crate::StringTable;

    struct Graph {
        syms: Symbols,
        module_syms: Vec<SymbolId>,
    }

    fn graph(n: usize) -> Graph {
        let mut syms = Symbols::new();
        let module_syms = (0..n)
            .map(|i| {
                syms.alloc(Symbol::new(
                    StringId::default(),
                    Span::zero(),
                    None,
                    ModuleId(i as u32),
                    SymbolKind::Module(ModuleScope::default()),
                ))
            })
            .collect();
        Graph { syms, module_syms }
    }

    fn add_member(g: &mut Graph, m: usize, name: StringId) -> SymbolId {
        let sym = Symbol::new(
            name,
            Span::zero(),
            Some(g.module_syms[m]),
            ModuleId(m as u32),
            SymbolKind::Error,
        );
        let id = g.syms.alloc(sym);
        g.syms
            .get_mut(g.module_syms[m])
            .as_module_mut()
            .unwrap()
            .members
            .insert(name, id);
        id
    }

    fn add_import(g: &mut Graph, from: usize, to: usize, vis: Visibility) {
        g.syms
            .get_mut(g.module_syms[from])
            .as_module_mut()
            .unwrap()
            .imports
            .push((ModuleId(to as u32), vis));
    }

    #[test]
    fn own_members_shadow_imports() {
        let st = StringTable::new();
        let name = st.insert("x".into());
        let mut g = graph(2);
        let own = add_member(&mut g, 0, name);
        add_member(&mut g, 1, name);
        add_import(&mut g, 0, 1, Visibility::Public);

        assert_eq!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(0), name, true),
            LookupOutcome::Found(own)
        );
    }

    #[test]
    fn private_imports_are_not_transitive() {
        let st = StringTable::new();
        let name = st.insert("hidden".into());
        // 0 imports 1 (public), 1 imports 2 (private), symbol lives in 2.
        let mut g = graph(3);
        add_member(&mut g, 2, name);
        add_import(&mut g, 0, 1, Visibility::Public);
        add_import(&mut g, 1, 2, Visibility::Private);

        assert_eq!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(0), name, true),
            LookupOutcome::NotFound
        );
        // But module 1 itself sees it.
        assert!(matches!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(1), name, true),
            LookupOutcome::Found(_)
        ));
    }

    #[test]
    fn public_imports_are_transitive() {
        let st = StringTable::new();
        let name = st.insert("exported".into());
        let mut g = graph(3);
        let sym = add_member(&mut g, 2, name);
        add_import(&mut g, 0, 1, Visibility::Private);
        add_import(&mut g, 1, 2, Visibility::Public);

        assert_eq!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(0), name, true),
            LookupOutcome::Found(sym)
        );
    }

    #[test]
    fn two_paths_to_one_declaration_are_not_ambiguous() {
        let st = StringTable::new();
        let name = st.insert("shared_decl".into());
        // Diamond: 0 imports 1 and 2, both publicly import 3.
        let mut g = graph(4);
        let sym = add_member(&mut g, 3, name);
        add_import(&mut g, 0, 1, Visibility::Private);
        add_import(&mut g, 0, 2, Visibility::Private);
        add_import(&mut g, 1, 3, Visibility::Public);
        add_import(&mut g, 2, 3, Visibility::Public);

        assert_eq!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(0), name, true),
            LookupOutcome::Found(sym)
        );
    }

    #[test]
    fn distinct_declarations_are_ambiguous() {
        let st = StringTable::new();
        let name = st.insert("clash".into());
        let mut g = graph(3);
        let a = add_member(&mut g, 1, name);
        let b = add_member(&mut g, 2, name);
        add_import(&mut g, 0, 1, Visibility::Private);
        add_import(&mut g, 0, 2, Visibility::Private);

        assert_eq!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(0), name, true),
            LookupOutcome::Ambiguous(vec![a, b])
        );
    }

    #[test]
    fn cyclic_import_graph_terminates() {
        let st = StringTable::new();
        let name = st.insert("y".into());
        // 0 and 1 publicly import each other; symbol lives in 1.
        let mut g = graph(2);
        let sym = add_member(&mut g, 1, name);
        add_import(&mut g, 0, 1, Visibility::Public);
        add_import(&mut g, 1, 0, Visibility::Public);

        assert_eq!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(0), name, true),
            LookupOutcome::Found(sym)
        );
        assert_eq!(
            lookup_in_module(&g.syms, &g.module_syms, ModuleId(0), st.insert("z".into()), true),
            LookupOutcome::NotFound
        );
    }
}
