//! Opcode catalogue.
//!
//! One byte per opcode; immediates are big-endian u16 unless noted in the
//! disassembler. The numeric values are part of the assembly file format,
//! so new opcodes append only.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    // Constants & stack
    Constant,
    String,
    Nil,
    True,
    False,
    Pop,

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Negate,
    BitwiseNot,

    // Comparison
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Logic
    Not,
    And,
    Or,

    // Variables
    GetGlobal,
    SetGlobal,
    DefineGlobal,
    GetLocal,
    SetLocal,
    GetUpvalue,
    SetUpvalue,
    CloseUpvalue,

    // Control flow
    Jump,
    JumpIfFalse,
    JumpIfNil,
    Loop,

    // Functions
    Function,
    Closure,
    Call,
    CallNamed,
    Return,

    // Type construction
    Class,
    Struct,
    Enum,
    Protocol,
    Method,
    StaticMethod,
    StructMethod,
    DefineProperty,
    ComputedProperty,
    Inherit,
    Super,
    EnumCase,
    MatchEnumCase,
    GetAssociated,

    // Property access
    GetProperty,
    SetProperty,
    OptionalChain,

    // Collections
    Array,
    Dict,
    Tuple,
    GetSubscript,
    SetSubscript,

    // Ranges
    RangeInclusive,
    RangeExclusive,

    // Optionals
    Unwrap,
    NilCoalesce,

    // Value semantics & reference discipline
    CopyValue,
    MakeWeak,
    MakeUnowned,

    // Errors & I/O
    Throw,
    Print,
    ReadLine,

    // End
    Halt,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Constant => "OP_CONSTANT",
            Opcode::String => "OP_STRING",
            Opcode::Nil => "OP_NIL",
            Opcode::True => "OP_TRUE",
            Opcode::False => "OP_FALSE",
            Opcode::Pop => "OP_POP",
            Opcode::Add => "OP_ADD",
            Opcode::Subtract => "OP_SUBTRACT",
            Opcode::Multiply => "OP_MULTIPLY",
            Opcode::Divide => "OP_DIVIDE",
            Opcode::Modulo => "OP_MODULO",
            Opcode::Negate => "OP_NEGATE",
            Opcode::BitwiseNot => "OP_BITWISE_NOT",
            Opcode::Equal => "OP_EQUAL",
            Opcode::NotEqual => "OP_NOT_EQUAL",
            Opcode::Less => "OP_LESS",
            Opcode::Greater => "OP_GREATER",
            Opcode::LessEqual => "OP_LESS_EQUAL",
            Opcode::GreaterEqual => "OP_GREATER_EQUAL",
            Opcode::Not => "OP_NOT",
            Opcode::And => "OP_AND",
            Opcode::Or => "OP_OR",
            Opcode::GetGlobal => "OP_GET_GLOBAL",
            Opcode::SetGlobal => "OP_SET_GLOBAL",
            Opcode::DefineGlobal => "OP_DEFINE_GLOBAL",
            Opcode::GetLocal => "OP_GET_LOCAL",
            Opcode::SetLocal => "OP_SET_LOCAL",
            Opcode::GetUpvalue => "OP_GET_UPVALUE",
            Opcode::SetUpvalue => "OP_SET_UPVALUE",
            Opcode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            Opcode::Jump => "OP_JUMP",
            Opcode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            Opcode::JumpIfNil => "OP_JUMP_IF_NIL",
            Opcode::Loop => "OP_LOOP",
            Opcode::Function => "OP_FUNCTION",
            Opcode::Closure => "OP_CLOSURE",
            Opcode::Call => "OP_CALL",
            Opcode::CallNamed => "OP_CALL_NAMED",
            Opcode::Return => "OP_RETURN",
            Opcode::Class => "OP_CLASS",
            Opcode::Struct => "OP_STRUCT",
            Opcode::Enum => "OP_ENUM",
            Opcode::Protocol => "OP_PROTOCOL",
            Opcode::Method => "OP_METHOD",
            Opcode::StaticMethod => "OP_STATIC_METHOD",
            Opcode::StructMethod => "OP_STRUCT_METHOD",
            Opcode::DefineProperty => "OP_DEFINE_PROPERTY",
            Opcode::ComputedProperty => "OP_COMPUTED_PROPERTY",
            Opcode::Inherit => "OP_INHERIT",
            Opcode::Super => "OP_SUPER",
            Opcode::EnumCase => "OP_ENUM_CASE",
            Opcode::MatchEnumCase => "OP_MATCH_ENUM_CASE",
            Opcode::GetAssociated => "OP_GET_ASSOCIATED",
            Opcode::GetProperty => "OP_GET_PROPERTY",
            Opcode::SetProperty => "OP_SET_PROPERTY",
            Opcode::OptionalChain => "OP_OPTIONAL_CHAIN",
            Opcode::Array => "OP_ARRAY",
            Opcode::Dict => "OP_DICT",
            Opcode::Tuple => "OP_TUPLE",
            Opcode::GetSubscript => "OP_GET_SUBSCRIPT",
            Opcode::SetSubscript => "OP_SET_SUBSCRIPT",
            Opcode::RangeInclusive => "OP_RANGE_INCLUSIVE",
            Opcode::RangeExclusive => "OP_RANGE_EXCLUSIVE",
            Opcode::Unwrap => "OP_UNWRAP",
            Opcode::NilCoalesce => "OP_NIL_COALESCE",
            Opcode::CopyValue => "OP_COPY_VALUE",
            Opcode::MakeWeak => "OP_MAKE_WEAK",
            Opcode::MakeUnowned => "OP_MAKE_UNOWNED",
            Opcode::Throw => "OP_THROW",
            Opcode::Print => "OP_PRINT",
            Opcode::ReadLine => "OP_READ_LINE",
            Opcode::Halt => "OP_HALT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        let byte: u8 = Opcode::GetProperty.into();
        assert_eq!(Opcode::try_from(byte), Ok(Opcode::GetProperty));
    }

    #[test]
    fn out_of_range_byte_is_rejected() {
        assert!(Opcode::try_from(0xF0u8).is_err());
    }
}
