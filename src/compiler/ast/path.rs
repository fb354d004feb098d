use crate::{
    compiler::{CompilerDisplay, CompilerDisplayError, SourceMap},
    StringTable,
};

use crate::StringId;

/// A possibly qualified name as written in source: `point`, `geo.point`, or
/// the fully rooted `::geo.point`.  Paths are resolved against the scope
/// chain and the module graph by the symbol table; the AST only records the
/// spelling.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Path {
    elements: Vec<StringId>,
    rooted: bool,
}

impl Path {
    pub fn new(elements: Vec<StringId>, rooted: bool) -> Path {
        Path { elements, rooted }
    }

    pub fn single(id: StringId) -> Path {
        Path {
            elements: vec![id],
            rooted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    /// The final element: the item the path names.
    pub fn item(&self) -> Option<StringId> {
        self.elements.last().copied()
    }

    /// Everything before the final element: the module (or aggregate) the
    /// item is looked up in.  Empty for unqualified names.
    pub fn parent(&self) -> &[StringId] {
        &self.elements[..self.elements.len().saturating_sub(1)]
    }

    pub fn elements(&self) -> &[StringId] {
        &self.elements
    }
}

impl CompilerDisplay for Path {
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        let mut parts = Vec::with_capacity(self.elements.len());
        for e in &self.elements {
            parts.push(e.fmt(sm, st)?);
        }
        let joined = parts.join(".");
        Ok(if self.rooted {
            format!("::{}", joined)
        } else {
            joined
        })
    }
}

impl From<Vec<StringId>> for Path {
    fn from(elements: Vec<StringId>) -> Self {
        Path {
            elements,
            rooted: false,
        }
    }
}
