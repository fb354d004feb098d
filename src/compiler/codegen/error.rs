use crate::compiler::{CompilerDisplay, CompilerDisplayError, SourceMap};
use crate::StringTable;

/// Errors detected only at lowering time.  All of them are recoverable:
/// lowering of the offending construct is replaced with a zero/error
/// placeholder and emission continues for the rest of the unit, but the
/// nonzero error counter suppresses the unit's object file at end of run.
#[derive(Clone, Debug, PartialEq)]
pub enum LowerError {
    /// An initializer reaching the data segment was not a compile time
    /// constant.
    NonConstantInitializer,
    /// Two explicit initializers touch the same byte range of an aggregate.
    DuplicateUnionInitialization(String),
    /// The same field received two explicit initializers.
    DuplicateFieldInitialization(String),
    /// A parameter or return type has no encoding under the foreign ABI
    /// mangling scheme.
    NoForeignEncoding(String),
    /// A value of this type cannot be represented in the data segment.
    Unrepresentable(String),
}

impl CompilerDisplay for LowerError {
    fn fmt(&self, _sm: &SourceMap, _st: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            LowerError::NonConstantInitializer => {
                "static initializer must be a compile time constant".into()
            }
            LowerError::DuplicateUnionInitialization(field) => {
                format!("duplicate union initialization for {}", field)
            }
            LowerError::DuplicateFieldInitialization(field) => {
                format!("field {} already initialized", field)
            }
            LowerError::NoForeignEncoding(ty) => {
                format!("cannot represent type {} in foreign linkage", ty)
            }
            LowerError::Unrepresentable(ty) => {
                format!("cannot emit a static value of type {}", ty)
            }
        })
    }
}
