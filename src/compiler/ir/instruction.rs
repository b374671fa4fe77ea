//! IR command definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// IR temporary (infinite supply, mapped to a machine register by the allocator)
///
/// Only used as a key: the number is never interpreted arithmetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Temp(pub u32);

impl Temp {
    /// Creates a temporary with the given serial number
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Serial number assigned by the [`super::TempFactory`] that minted it
    pub fn serial(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Temp_{}", self.0)
    }
}

/// Integer binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    /// Saturating addition
    Add,
    /// Saturating subtraction
    Sub,
    /// Saturating multiplication
    Mul,
    /// Division (runtime checks division by zero)
    Div,
    /// Less than, result is 0 or 1
    Lt,
    /// Greater than, result is 0 or 1
    Gt,
    /// Equality, result is 0 or 1
    Eq,
}

impl BinOp {
    /// Operator symbol used when printing commands
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Eq => "==",
        }
    }
}

/// Control-flow classification of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Label definition (jump target)
    Label,
    /// Unconditional jump, no fall-through
    Jump,
    /// Conditional jump, target plus fall-through
    ConditionalJump,
    /// Everything else, falls through to the next command
    Plain,
}

/// IR command (three-address code)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrCommand {
    // Constants
    /// `dst := value`
    ConstInt { dst: Temp, value: i64 },
    /// `dst := "value"` (address of a string literal)
    ConstString { dst: Temp, value: String },
    /// `dst := NIL`
    Nil { dst: Temp },

    // Arithmetic and comparison
    /// `dst := lhs op rhs`
    Binop {
        op: BinOp,
        dst: Temp,
        lhs: Temp,
        rhs: Temp,
    },
    /// `dst := -src`
    Neg { dst: Temp, src: Temp },

    // Strings
    /// `dst := lhs ++ rhs`
    StringConcat { dst: Temp, lhs: Temp, rhs: Temp },
    /// `dst := (lhs == rhs)` by content
    StringEqual { dst: Temp, lhs: Temp, rhs: Temp },

    // Named memory
    /// `dst := var`
    Load { dst: Temp, var: String },
    /// `var := src`
    Store { var: String, src: Temp },
    /// Reserve storage for `var` (declaration without initializer)
    Allocate { var: String },

    // Arrays and objects
    /// `dst := array[index]`
    ArrayAccess { dst: Temp, array: Temp, index: Temp },
    /// `array[index] := value`
    ArrayStore {
        array: Temp,
        index: Temp,
        value: Temp,
    },
    /// `dst := length(array)`
    ArrayLength { dst: Temp, array: Temp },
    /// `dst := object.field`
    FieldAccess {
        dst: Temp,
        object: Temp,
        offset: u32,
        field: String,
    },
    /// `object.field := value`
    FieldStore {
        object: Temp,
        offset: u32,
        value: Temp,
        field: String,
    },
    /// `dst := new array[size]`
    NewArray { dst: Temp, size: Temp },
    /// `dst := new class` of `size` bytes
    NewObject { dst: Temp, class: String, size: u32 },

    // Control flow
    /// Define a jump target
    Label { name: String },
    /// Unconditional jump
    Jump { label: String },
    /// Jump to `label` when `cond` is zero, otherwise fall through
    JumpIfEqToZero { cond: Temp, label: String },

    // Calls
    /// `dst := function(args...)`
    Call {
        dst: Option<Temp>,
        function: String,
        args: Vec<Temp>,
    },
    /// `dst := object.method(args...)`
    MethodCall {
        dst: Option<Temp>,
        object: Temp,
        method: String,
        args: Vec<Temp>,
    },
    /// Return a value
    Return { value: Temp },
    /// Return without a value
    ReturnVoid,
}

impl IrCommand {
    /// Temporaries read by this command
    pub fn uses(&self) -> BTreeSet<Temp> {
        match self {
            IrCommand::ConstInt { .. }
            | IrCommand::ConstString { .. }
            | IrCommand::Nil { .. }
            | IrCommand::Load { .. }
            | IrCommand::Allocate { .. }
            | IrCommand::NewObject { .. }
            | IrCommand::Label { .. }
            | IrCommand::Jump { .. }
            | IrCommand::ReturnVoid => BTreeSet::new(),

            IrCommand::Binop { lhs, rhs, .. }
            | IrCommand::StringConcat { lhs, rhs, .. }
            | IrCommand::StringEqual { lhs, rhs, .. } => [*lhs, *rhs].into_iter().collect(),

            IrCommand::Neg { src, .. } | IrCommand::Store { src, .. } => BTreeSet::from([*src]),

            IrCommand::ArrayAccess { array, index, .. } => BTreeSet::from([*array, *index]),
            IrCommand::ArrayStore {
                array,
                index,
                value,
            } => BTreeSet::from([*array, *index, *value]),
            IrCommand::ArrayLength { array, .. } => BTreeSet::from([*array]),
            IrCommand::FieldAccess { object, .. } => BTreeSet::from([*object]),
            IrCommand::FieldStore { object, value, .. } => BTreeSet::from([*object, *value]),
            IrCommand::NewArray { size, .. } => BTreeSet::from([*size]),

            IrCommand::JumpIfEqToZero { cond, .. } => BTreeSet::from([*cond]),

            IrCommand::Call { args, .. } => args.iter().copied().collect(),
            IrCommand::MethodCall { object, args, .. } => {
                let mut uses: BTreeSet<Temp> = args.iter().copied().collect();
                uses.insert(*object);
                uses
            }
            IrCommand::Return { value } => BTreeSet::from([*value]),
        }
    }

    /// Temporary written by this command, if any
    pub fn defines(&self) -> Option<Temp> {
        match self {
            IrCommand::ConstInt { dst, .. }
            | IrCommand::ConstString { dst, .. }
            | IrCommand::Nil { dst }
            | IrCommand::Binop { dst, .. }
            | IrCommand::Neg { dst, .. }
            | IrCommand::StringConcat { dst, .. }
            | IrCommand::StringEqual { dst, .. }
            | IrCommand::Load { dst, .. }
            | IrCommand::ArrayAccess { dst, .. }
            | IrCommand::ArrayLength { dst, .. }
            | IrCommand::FieldAccess { dst, .. }
            | IrCommand::NewArray { dst, .. }
            | IrCommand::NewObject { dst, .. } => Some(*dst),

            IrCommand::Call { dst, .. } | IrCommand::MethodCall { dst, .. } => *dst,

            IrCommand::Store { .. }
            | IrCommand::Allocate { .. }
            | IrCommand::ArrayStore { .. }
            | IrCommand::FieldStore { .. }
            | IrCommand::Label { .. }
            | IrCommand::Jump { .. }
            | IrCommand::JumpIfEqToZero { .. }
            | IrCommand::Return { .. }
            | IrCommand::ReturnVoid => None,
        }
    }

    /// Named variable read from memory
    pub fn variable_read(&self) -> Option<&str> {
        match self {
            IrCommand::Load { var, .. } => Some(var),
            _ => None,
        }
    }

    /// Named variable written to memory
    pub fn variable_written(&self) -> Option<&str> {
        match self {
            IrCommand::Store { var, .. } => Some(var),
            _ => None,
        }
    }

    /// Control-flow classification
    pub fn kind(&self) -> CommandKind {
        match self {
            IrCommand::Label { .. } => CommandKind::Label,
            IrCommand::Jump { .. } => CommandKind::Jump,
            IrCommand::JumpIfEqToZero { .. } => CommandKind::ConditionalJump,
            _ => CommandKind::Plain,
        }
    }

    /// Name defined by a label command
    pub fn label_name(&self) -> Option<&str> {
        match self {
            IrCommand::Label { name } => Some(name),
            _ => None,
        }
    }

    /// Label a jump command transfers control to
    pub fn jump_target(&self) -> Option<&str> {
        match self {
            IrCommand::Jump { label } | IrCommand::JumpIfEqToZero { label, .. } => Some(label),
            _ => None,
        }
    }
}

fn join_temps(temps: &[Temp]) -> String {
    temps
        .iter()
        .map(Temp::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for IrCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrCommand::ConstInt { dst, value } => write!(f, "{} := {}", dst, value),
            IrCommand::ConstString { dst, value } => write!(f, "{} := \"{}\"", dst, value),
            IrCommand::Nil { dst } => write!(f, "{} := NIL", dst),
            IrCommand::Binop { op, dst, lhs, rhs } => {
                write!(f, "{} := {} {} {}", dst, lhs, op.symbol(), rhs)
            }
            IrCommand::Neg { dst, src } => write!(f, "{} := -{}", dst, src),
            IrCommand::StringConcat { dst, lhs, rhs } => {
                write!(f, "{} := STRING_CONCAT({}, {})", dst, lhs, rhs)
            }
            IrCommand::StringEqual { dst, lhs, rhs } => {
                write!(f, "{} := STRING_EQUAL({}, {})", dst, lhs, rhs)
            }
            IrCommand::Load { dst, var } => write!(f, "{} := {}", dst, var),
            IrCommand::Store { var, src } => write!(f, "{} := {}", var, src),
            IrCommand::Allocate { var } => write!(f, "Allocate {}", var),
            IrCommand::ArrayAccess { dst, array, index } => {
                write!(f, "{} := ARRAY_ACCESS({}[{}])", dst, array, index)
            }
            IrCommand::ArrayStore {
                array,
                index,
                value,
            } => write!(f, "ARRAY_STORE({}[{}], {})", array, index, value),
            IrCommand::ArrayLength { dst, array } => {
                write!(f, "{} := ARRAY_LENGTH({})", dst, array)
            }
            IrCommand::FieldAccess {
                dst,
                object,
                offset,
                field,
            } => write!(
                f,
                "{} := FIELD_ACCESS({}.{}, offset={})",
                dst, object, field, offset
            ),
            IrCommand::FieldStore {
                object,
                offset,
                value,
                field,
            } => write!(
                f,
                "FIELD_STORE({}.{}, offset={}, {})",
                object, field, offset, value
            ),
            IrCommand::NewArray { dst, size } => write!(f, "{} := NEW_ARRAY({})", dst, size),
            IrCommand::NewObject { dst, class, size } => {
                write!(f, "{} := NEW_OBJECT(\"{}\", size={})", dst, class, size)
            }
            IrCommand::Label { name } => write!(f, "{}:", name),
            IrCommand::Jump { label } => write!(f, "Jump {}", label),
            IrCommand::JumpIfEqToZero { cond, label } => {
                write!(f, "JumpIfEqToZero {} {}", cond, label)
            }
            IrCommand::Call {
                dst,
                function,
                args,
            } => {
                if let Some(d) = dst {
                    write!(f, "{} := ", d)?;
                }
                write!(f, "{}({})", function, join_temps(args))
            }
            IrCommand::MethodCall {
                dst,
                object,
                method,
                args,
            } => {
                if let Some(d) = dst {
                    write!(f, "{} := ", d)?;
                }
                write!(f, "METHOD_CALL({}.{}({}))", object, method, join_temps(args))
            }
            IrCommand::Return { value } => write!(f, "RETURN {}", value),
            IrCommand::ReturnVoid => write!(f, "RETURN_VOID"),
        }
    }
}
