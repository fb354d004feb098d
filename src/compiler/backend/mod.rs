//! The consumed surface of the external backend.
//!
//! The front end's contract with the backend is narrow: build IR trees and
//! data segment descriptions, hand them to a [`BackendUnit`], and finalize
//! the unit.  Trees are write-only from the front end's point of view -
//! after construction the backend owns them and the front end never inspects
//! them again.  Everything in this module is therefore plain data with
//! constructors and no traversal API.

use std::cell::Cell;

/// A backend jump label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// A backend lexical block, used only for debug scoping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// A symbol in the unit's data segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DataId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// One element of a static initializer: initialized bytes, zero fill, or an
/// address of (an offset into) another data symbol.  A [`DtList`] is the
/// linear byte-and-relocation description of one data symbol's contents.
#[derive(Clone, Debug, PartialEq)]
pub enum Dt {
    Bytes(Vec<u8>),
    Zeros(u64),
    SymOff { data: DataId, offset: u64 },
    /// Address of an external symbol by name (functions, other units' data).
    NamedAddr(String),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct DtList {
    items: Vec<Dt>,
}

impl DtList {
    pub fn new() -> DtList {
        DtList::default()
    }

    /// Total byte size this list initializes.  Address elements occupy one
    /// pointer; the pointer width is fixed by the data segment format.
    pub fn size(&self, ptr_size: u64) -> u64 {
        self.items
            .iter()
            .map(|d| match d {
                Dt::Bytes(b) => b.len() as u64,
                Dt::Zeros(n) => *n,
                Dt::SymOff { .. } | Dt::NamedAddr(_) => ptr_size,
            })
            .sum()
    }

    pub fn push_bytes(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.items.push(Dt::Bytes(bytes));
        }
    }

    pub fn push_zeros(&mut self, n: u64) {
        if n > 0 {
            // Coalesce adjacent zero runs.
            if let Some(Dt::Zeros(prev)) = self.items.last_mut() {
                *prev += n;
                return;
            }
            self.items.push(Dt::Zeros(n));
        }
    }

    pub fn push_sym_off(&mut self, data: DataId, offset: u64) {
        self.items.push(Dt::SymOff { data, offset });
    }

    pub fn push_named_addr(&mut self, name: String) {
        self.items.push(Dt::NamedAddr(name));
    }

    /// Appends another list.
    pub fn cat(&mut self, mut other: DtList) {
        self.items.append(&mut other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Dt] {
        &self.items
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeUnOp {
    Neg,
    Not,
    BitNot,
}

/// One operand of an asm tree: optional symbolic name, the backend
/// constraint string, and the value tree.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmTreeOperand {
    pub name: Option<String>,
    pub constraint: String,
    pub value: Tree,
}

/// A backend expression/statement tree.  Built by lowering; opaque
/// afterwards.
#[derive(Clone, Debug, PartialEq)]
pub enum Tree {
    Nop,
    IntCst {
        value: i128,
        bytes: u8,
    },
    RealCst {
        value: f64,
        bytes: u8,
    },
    /// Reference to a data symbol (by address).
    DataRef(DataId),
    /// Reference to a global by its external (mangled) name.
    SymRef(String),
    Local(u32),
    Param(u32),
    FieldRef {
        base: Box<Tree>,
        offset: u64,
        bytes: u64,
    },
    IndexRef {
        base: Box<Tree>,
        index: Box<Tree>,
        elem_bytes: u64,
    },
    AddrOf(Box<Tree>),
    Deref {
        ptr: Box<Tree>,
        bytes: u64,
    },
    Convert {
        value: Box<Tree>,
        bytes: u8,
        signed: bool,
        float: bool,
    },
    Binary {
        op: TreeOp,
        lhs: Box<Tree>,
        rhs: Box<Tree>,
    },
    Unary {
        op: TreeUnOp,
        value: Box<Tree>,
    },
    Assign {
        dst: Box<Tree>,
        src: Box<Tree>,
    },
    Call {
        callee: String,
        args: Vec<Tree>,
    },
    Seq(Vec<Tree>),
    /// A lexical scope for debug info; `block` ties into the binding level
    /// machinery.
    Scope {
        block: BlockId,
        body: Vec<Tree>,
    },
    If {
        cond: Box<Tree>,
        then_body: Box<Tree>,
        else_body: Box<Tree>,
    },
    Loop {
        cond: Box<Tree>,
        body: Box<Tree>,
    },
    Return(Option<Box<Tree>>),
    Label(LabelId),
    Goto(LabelId),
    /// The frame-relative offset of a local, resolved by the backend once
    /// the frame is laid out.  Used by frame-relative asm operands.
    FrameOffset(u32),
    /// The total size of the current function's frame.
    FrameSize,
    /// An aggregate or array value built in place from `(byte offset,
    /// value)` pairs; unmentioned bytes are zero.
    Constructor {
        elems: Vec<(u64, Tree)>,
        bytes: u64,
    },
    /// Run-time array bounds check; expands to a trap call when the index
    /// is out of range.
    BoundsCheck {
        index: Box<Tree>,
        limit: Box<Tree>,
    },
    Asm {
        template: String,
        outputs: Vec<AsmTreeOperand>,
        inputs: Vec<AsmTreeOperand>,
        clobbers: Vec<String>,
        volatile: bool,
        /// True for template-only statements (e.g. raw label definitions).
        input_only: bool,
    },
}

/// The debug-scope tree of one function, mirroring its lexical blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockInfo {
    pub id: BlockId,
    /// Declared variable names, in source order.
    pub vars: Vec<String>,
    pub subblocks: Vec<BlockInfo>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataDef {
    pub name: String,
    pub readonly: bool,
    pub external: bool,
    pub dt: DtList,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub param_count: u32,
    pub local_count: u32,
    pub body: Tree,
    pub debug_scopes: Option<BlockInfo>,
}

/// Summary returned by unit finalization.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSummary {
    pub name: String,
    pub functions: usize,
    pub data_symbols: usize,
    pub data_bytes: u64,
}

/// One compilation unit on the backend side.  The front end pushes
/// functions and data into it and calls [`BackendUnit::finish`] exactly
/// once at the end of the run.
#[derive(Debug)]
pub struct BackendUnit {
    name: String,
    ptr_size: u64,
    funcs: Vec<FuncDef>,
    data: Vec<DataDef>,
    next_label: Cell<u32>,
    next_block: Cell<u32>,
    next_private: Cell<u32>,
    errors: Cell<u32>,
    finished: bool,
}

impl BackendUnit {
    pub fn new(name: &str, ptr_size: u64) -> BackendUnit {
        BackendUnit {
            name: name.into(),
            ptr_size,
            funcs: vec![],
            data: vec![],
            next_label: Cell::new(0),
            next_block: Cell::new(0),
            next_private: Cell::new(0),
            errors: Cell::new(0),
            finished: false,
        }
    }

    pub fn new_label(&self) -> LabelId {
        let n = self.next_label.get();
        self.next_label.set(n + 1);
        LabelId(n)
    }

    pub fn new_block(&self) -> BlockId {
        let n = self.next_block.get();
        self.next_block.set(n + 1);
        BlockId(n)
    }

    pub fn define_data(&mut self, def: DataDef) -> DataId {
        let id = DataId(self.data.len() as u32);
        self.data.push(def);
        id
    }

    /// Replaces a data symbol's initializer.  Data symbols are declared
    /// before their initializers are encoded so that initializers may take
    /// each other's addresses.
    pub fn set_data_init(&mut self, id: DataId, dt: DtList) {
        self.data[id.0 as usize].dt = dt;
    }

    /// Synthesizes an anonymous read-only data symbol, as used for hoisted
    /// array/pointer literals and pooled strings.  The data segment format
    /// requires a concrete symbol to take the address of.
    pub fn define_private_rodata(&mut self, dt: DtList) -> DataId {
        let n = self.next_private.get();
        self.next_private.set(n + 1);
        let name = format!(".L{}.rodata.{}", self.name, n);
        self.define_data(DataDef {
            name,
            readonly: true,
            external: false,
            dt,
        })
    }

    pub fn define_function(&mut self, def: FuncDef) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(def);
        id
    }

    /// Reported backend-side errors; added to the front end's counter for
    /// the process exit contract.
    pub fn report_error(&self) {
        self.errors.set(self.errors.get() + 1);
    }

    pub fn error_count(&self) -> u32 {
        self.errors.get()
    }

    /// Compilation-unit finalization.  May be called exactly once.
    pub fn finish(&mut self) -> UnitSummary {
        assert!(!self.finished, "backend unit finalized twice");
        self.finished = true;
        UnitSummary {
            name: self.name.clone(),
            functions: self.funcs.len(),
            data_symbols: self.data.len(),
            data_bytes: self.data.iter().map(|d| d.dt.size(self.ptr_size)).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_list_size_counts_every_element_kind() {
        let mut dt = DtList::new();
        dt.push_bytes(vec![1, 2, 3]);
        dt.push_zeros(5);
        dt.push_sym_off(DataId(0), 4);
        assert_eq!(dt.size(8), 3 + 5 + 8);
    }

    #[test]
    fn adjacent_zero_runs_coalesce() {
        let mut dt = DtList::new();
        dt.push_zeros(3);
        dt.push_zeros(4);
        assert_eq!(dt.items().len(), 1);
        assert_eq!(dt.size(8), 7);
    }

    #[test]
    fn private_rodata_names_are_unique() {
        let mut unit = BackendUnit::new("m", 8);
        let a = unit.define_private_rodata(DtList::new());
        let b = unit.define_private_rodata(DtList::new());
        assert_ne!(a, b);
    }

    #[test]
    fn finish_summarizes_unit() {
        let mut unit = BackendUnit::new("m", 8);
        let mut dt = DtList::new();
        dt.push_zeros(16);
        unit.define_data(DataDef {
            name: "g".into(),
            readonly: false,
            external: true,
            dt,
        });
        unit.define_function(FuncDef {
            name: "f".into(),
            param_count: 0,
            local_count: 0,
            body: Tree::Nop,
            debug_scopes: None,
        });
        let summary = unit.finish();
        assert_eq!(summary.functions, 1);
        assert_eq!(summary.data_symbols, 1);
        assert_eq!(summary.data_bytes, 16);
    }
}
