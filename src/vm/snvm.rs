// SNVM - Arithmetic stack machine for transaction programs
use serde::{Deserialize, Serialize};

/// SNVM operations. Bytes match the catalogue entries of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SnvmOp {
    Noop = 0x00,
    Push = 0x01,
    Add = 0x02,
    Sub = 0x03,
    Mul = 0x04,
    Div = 0x05,
}

impl TryFrom<u8> for SnvmOp {
    type Error = SnvmError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(SnvmOp::Noop),
            0x01 => Ok(SnvmOp::Push),
            0x02 => Ok(SnvmOp::Add),
            0x03 => Ok(SnvmOp::Sub),
            0x04 => Ok(SnvmOp::Mul),
            0x05 => Ok(SnvmOp::Div),
            other => Err(SnvmError::UnknownOpcode(other)),
        }
    }
}

/// Program element. `value` is only read by `Push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub op: u8,
    pub value: i64,
}

impl Instruction {
    pub const fn new(op: u8, value: i64) -> Self {
        Self { op, value }
    }

    pub const fn push(value: i64) -> Self {
        Self::new(SnvmOp::Push as u8, value)
    }

    pub const fn add() -> Self {
        Self::new(SnvmOp::Add as u8, 0)
    }

    pub const fn sub() -> Self {
        Self::new(SnvmOp::Sub as u8, 0)
    }

    pub const fn mul() -> Self {
        Self::new(SnvmOp::Mul as u8, 0)
    }

    pub const fn div() -> Self {
        Self::new(SnvmOp::Div as u8, 0)
    }

    pub const fn noop() -> Self {
        Self::new(SnvmOp::Noop as u8, 0)
    }
}

/// Runs `program` on a fresh stack.
///
/// Binary operations pop `b` (top) then `a` and push `a op b`, wrapping on
/// overflow. Returns the top of the final stack, or 0 if it is empty.
pub fn execute(program: &[Instruction]) -> Result<i64, SnvmError> {
    let mut stack: Vec<i64> = Vec::with_capacity(program.len());

    for ins in program {
        let op = SnvmOp::try_from(ins.op)?;
        match op {
            SnvmOp::Noop => {}
            SnvmOp::Push => stack.push(ins.value),
            SnvmOp::Add | SnvmOp::Sub | SnvmOp::Mul | SnvmOp::Div => {
                if stack.len() < 2 {
                    return Err(SnvmError::StackUnderflow);
                }
                let b = stack[stack.len() - 1];
                let a = stack[stack.len() - 2];
                let result = match op {
                    SnvmOp::Add => a.wrapping_add(b),
                    SnvmOp::Sub => a.wrapping_sub(b),
                    SnvmOp::Mul => a.wrapping_mul(b),
                    _ => {
                        if b == 0 {
                            return Err(SnvmError::DivisionByZero);
                        }
                        a.wrapping_div(b)
                    }
                };
                stack.truncate(stack.len() - 2);
                stack.push(result);
            }
        }
    }

    Ok(stack.last().copied().unwrap_or(0))
}

/// SNVM errors, each aborting only the program that raised it
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SnvmError {
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown SNVM opcode {0:#04x}")]
    UnknownOpcode(u8),
}
