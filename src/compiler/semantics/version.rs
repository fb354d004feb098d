//! Evaluation of `version(...)` conditional compilation conditions.
//!
//! The set is seeded at startup with the implementation identity tokens,
//! exactly one endianness token, the unwind strategy token, and the inline
//! assembly tokens when the target supports it.  `--version-ident` adds user
//! identifiers; a numeric argument raises the global level instead.

use std::collections::HashSet;

use crate::compiler::target::TargetConfig;

#[derive(Debug, Default)]
pub struct VersionConditions {
    idents: HashSet<String>,
    level: u32,
}

impl VersionConditions {
    /// Seed the predefined identifiers from the target description.
    pub fn predefined(target: &TargetConfig) -> VersionConditions {
        let mut v = VersionConditions::default();
        v.add_ident("Sable");
        v.add_ident("SableFE");
        v.add_ident(target.endian_ident());
        v.add_ident(target.unwind.version_ident());
        if let Some(asm) = &target.inline_asm {
            v.add_ident("Sable_InlineAsm");
            v.add_ident(&format!("Sable_InlineAsm_{}", asm.cpu_family));
        }
        v
    }

    pub fn add_ident(&mut self, ident: &str) {
        self.idents.insert(ident.to_string());
    }

    pub fn set_level(&mut self, level: u32) {
        self.level = self.level.max(level);
    }

    pub fn ident_active(&self, ident: &str) -> bool {
        self.idents.contains(ident)
    }

    pub fn level_active(&self, level: u32) -> bool {
        level <= self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_endianness_token() {
        let v = VersionConditions::predefined(&TargetConfig::default_host());
        assert!(v.ident_active("LittleEndian") ^ v.ident_active("BigEndian"));
    }

    #[test]
    fn levels_are_cumulative() {
        let mut v = VersionConditions::default();
        v.set_level(3);
        assert!(v.level_active(2));
        assert!(v.level_active(3));
        assert!(!v.level_active(4));
    }

    #[test]
    fn inline_asm_tokens_present_on_default_host() {
        let v = VersionConditions::predefined(&TargetConfig::default_host());
        assert!(v.ident_active("Sable_InlineAsm"));
        assert!(v.ident_active("Sable_InlineAsm_X86_64"));
    }
}
