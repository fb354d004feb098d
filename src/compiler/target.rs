//! Description of the target platform ABI.
//!
//! Layout rules are a hard external contract: the sizes and alignments
//! computed here must match what the backend's own layout rules produce for
//! the same types, because object file layout is dictated by the ABI both
//! sides compile for.  The tables are therefore configuration data supplied
//! externally (a YAML target description) rather than values the front end is
//! free to invent; the built in default describes x86-64 Linux.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Byte order of the target.  Exactly one of the two is always in effect and
/// the matching predefined version identifier (`BigEndian`/`LittleEndian`) is
/// seeded from it at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Little,
    Big,
}

/// Exception unwinding strategy used by the backend on this target.  Only
/// consulted to seed the matching predefined version identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnwindStrategy {
    Dwarf,
    SjLj,
}

impl UnwindStrategy {
    pub fn version_ident(&self) -> &'static str {
        match self {
            UnwindStrategy::Dwarf => "Sable_Unwind_Dwarf",
            UnwindStrategy::SjLj => "Sable_Unwind_SjLj",
        }
    }
}

/// A register the inline assembler may name in a clobber list, along with the
/// spelling the backend expects for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisterDef {
    pub name: String,
    pub backend_name: String,
}

/// Inline assembly support for the target CPU family.  Absent when the
/// target has no assembler support, in which case asm statements are
/// rejected during semantic analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InlineAsm {
    /// CPU family token, e.g. `X86_64`.  Seeds the CPU sub version ident.
    pub cpu_family: String,

    /// Registers recognized in clobber specifications, in encoding order.
    /// The bit position of a register in the clobber mask is its index here.
    pub registers: Vec<RegisterDef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Size and alignment of data pointers, in bytes.
    pub ptr_size: u64,
    pub ptr_align: u64,

    /// Alignment of 8 byte scalars (f64/i64/u64).  4 on some 32 bit ABIs.
    pub scalar8_align: u64,

    pub endian: Endian,
    pub unwind: UnwindStrategy,

    pub inline_asm: Option<InlineAsm>,

    /// Standard library root.  Combined with `multilib_suffix` to form the
    /// final entry of the module lookup path.
    pub stdlib_dir: Option<String>,

    /// Platform/architecture specific sub path appended to the standard
    /// library directory (multilib style suffixing).
    pub multilib_suffix: Option<String>,
}

impl TargetConfig {
    /// The default target: x86-64 Linux, DWARF unwinding, inline assembly
    /// enabled.
    pub fn default_host() -> TargetConfig {
        TargetConfig {
            ptr_size: 8,
            ptr_align: 8,
            scalar8_align: 8,
            endian: Endian::Little,
            unwind: UnwindStrategy::Dwarf,
            inline_asm: Some(InlineAsm {
                cpu_family: "X86_64".into(),
                registers: [
                    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10",
                    "r11", "r12", "r13", "r14", "r15",
                ]
                .iter()
                .map(|r| RegisterDef {
                    name: (*r).into(),
                    backend_name: (*r).into(),
                })
                .collect(),
            }),
            stdlib_dir: None,
            multilib_suffix: None,
        }
    }

    /// Load a target description from a YAML file.  Used by the `--target`
    /// flag; any I/O or parse failure is fatal for the run since every layout
    /// decision depends on these tables.
    pub fn from_yaml(path: &Path) -> Result<TargetConfig, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read target description {}: {}", path.display(), e))?;
        serde_yaml::from_str(&text)
            .map_err(|e| format!("invalid target description {}: {}", path.display(), e))
    }

    /// Index of a register in the clobber encoding, or `None` when the name
    /// is not a register on this target.
    pub fn register_index(&self, name: &str) -> Option<usize> {
        self.inline_asm
            .as_ref()?
            .registers
            .iter()
            .position(|r| r.name == name)
    }

    pub fn register_backend_name(&self, index: usize) -> Option<&str> {
        self.inline_asm
            .as_ref()?
            .registers
            .get(index)
            .map(|r| r.backend_name.as_str())
    }

    pub fn endian_ident(&self) -> &'static str {
        match self.endian {
            Endian::Little => "LittleEndian",
            Endian::Big => "BigEndian",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_is_lp64() {
        let t = TargetConfig::default_host();
        assert_eq!(t.ptr_size, 8);
        assert_eq!(t.endian, Endian::Little);
        assert_eq!(t.endian_ident(), "LittleEndian");
    }

    #[test]
    fn yaml_round_trip() {
        let t = TargetConfig::default_host();
        let text = serde_yaml::to_string(&t).unwrap();
        let back: TargetConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn register_index_matches_encoding_order() {
        let t = TargetConfig::default_host();
        assert_eq!(t.register_index("rax"), Some(0));
        assert_eq!(t.register_index("rcx"), Some(2));
        assert_eq!(t.register_index("xmm0"), None);
    }
}
