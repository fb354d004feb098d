use std::{cell::RefCell, collections::HashMap, fmt::Display};

use crate::compiler::CompilerDisplayError;

use super::SourceMap;

#[derive(Debug)]
pub enum StringTableError {
    NotFound,
}

impl Display for StringTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StringTableError::NotFound => f.write_str("StringId Not Found"),
        }
    }
}

/**
Stores a table of all distinct strings read from source code files.  The
different IR structures in the compiler use IDs which map back to the
distinct string in the string table.

Inserting a string returns the unique ID for that string value; inserting
the same string twice returns the same ID.  Given an ID, the associated
string can be retrieved for rendering diagnostics or emitting names.
*/
#[derive(Debug, Default)]
pub struct StringTable {
    /// Table mapping raw strings to their [`StringId`]s.
    table: RefCell<HashMap<String, StringId>>,

    /// Reverse mapping from [`StringId`] back to the string value, indexed by
    /// the id itself.
    strings: RefCell<Vec<String>>,
}

impl StringTable {
    pub fn new() -> StringTable {
        StringTable::default()
    }

    /// Inserts a string into the table and returns the assigned ID for that
    /// string value.  If the string is already in the table then this simply
    /// returns the already assigned ID.
    pub fn insert(&self, s: String) -> StringId {
        let mut table = self.table.borrow_mut();
        if let Some(id) = table.get(&s) {
            return *id;
        }
        let mut strings = self.strings.borrow_mut();
        let id = StringId(strings.len() as u32);
        strings.push(s.clone());
        table.insert(s, id);
        id
    }

    /// Search the table for the given string and, if found, return the
    /// associated [`StringId`].
    pub fn find(&self, s: &str) -> Option<StringId> {
        self.table.borrow().get(s).copied()
    }

    /// Given an ID, return the associated string value.
    pub fn get(&self, id: StringId) -> Result<String, StringTableError> {
        self.strings
            .borrow()
            .get(id.0 as usize)
            .cloned()
            .ok_or(StringTableError::NotFound)
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default, Hash, Eq, PartialOrd, Ord)]
pub struct StringId(u32);

impl crate::compiler::CompilerDisplay for StringId {
    fn fmt(&self, _: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        st.get(*self).map_err(|e| e.into())
    }
}

impl std::fmt::Display for StringId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let st = StringTable::new();
        let a = st.insert("hello".into());
        let b = st.insert("hello".into());
        let c = st.insert("world".into());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(st.get(a).unwrap(), "hello");
        assert_eq!(st.get(c).unwrap(), "world");
    }

    #[test]
    fn find_only_returns_inserted() {
        let st = StringTable::new();
        assert_eq!(st.find("missing"), None);
        let id = st.insert("present".into());
        assert_eq!(st.find("present"), Some(id));
    }
}
