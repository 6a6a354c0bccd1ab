use std::io::Write;

use crate::error::RuntimeError;
use crate::interpreter::value::Value;
use crate::vm::chunk::{Chunk, OpCode, op_from_u8};

pub const STACK_MAX: usize = 256;
pub const GLOBAL_SLOTS: usize = 256;

/// A stack machine over one chunk. Globals are per-VM and zeroed (null)
/// at construction; two VMs never share state.
pub struct Vm {
    stack: Vec<Value>,
    globals: Vec<Value>,
    output: Vec<String>,
    writer: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(STACK_MAX),
            globals: vec![Value::Null; GLOBAL_SLOTS],
            output: Vec::new(),
            writer: Box::new(std::io::stdout()),
        }
    }

    #[cfg(test)]
    fn new_capturing() -> Self {
        let mut vm = Self::new();
        vm.writer = Box::new(Vec::<u8>::new());
        vm
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn interpret(&mut self, chunk: Chunk) -> Result<(), RuntimeError> {
        let mut ip = 0usize;

        loop {
            if ip >= chunk.code.len() {
                return Ok(());
            }
            let instruction = chunk.code[ip];
            ip += 1;

            let Some(op) = op_from_u8(instruction) else {
                return Err(RuntimeError::UnknownOpcode {
                    opcode: instruction,
                });
            };

            match op {
                OpCode::Noop => {}
                OpCode::Eof => return Ok(()),
                OpCode::Pop => {
                    self.pop()?;
                }
                OpCode::Dup => {
                    let top = self.peek()?.clone();
                    self.push(top)?;
                }
                OpCode::Swap => {
                    let a = self.pop()?;
                    let b = self.pop()?;
                    self.push(a)?;
                    self.push(b)?;
                }
                OpCode::LoadConst => {
                    let idx = read_byte(&chunk, &mut ip, instruction)?;
                    let constant = chunk
                        .constants
                        .get(idx as usize)
                        .cloned()
                        .ok_or(RuntimeError::UnknownOpcode {
                            opcode: instruction,
                        })?;
                    self.push(constant)?;
                }
                OpCode::LoadVar => {
                    let slot = read_byte(&chunk, &mut ip, instruction)?;
                    self.push(self.globals[slot as usize].clone())?;
                }
                OpCode::StoreVar => {
                    let slot = read_byte(&chunk, &mut ip, instruction)?;
                    self.globals[slot as usize] = self.pop()?;
                }
                OpCode::Add => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = match (&a, &b) {
                        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                        // Either side being a string coerces the other.
                        (Value::Str(_), _) | (_, Value::Str(_)) => {
                            Value::Str(format!("{}{}", a.coerce_string(), b.coerce_string()))
                        }
                        _ => {
                            return Err(type_mismatch(format!(
                                "cannot add {} and {}",
                                a.kind_name(),
                                b.kind_name()
                            )));
                        }
                    };
                    self.push(result)?;
                }
                OpCode::Sub => self.numeric_binop(|x, y| x - y, "-")?,
                OpCode::Mul => self.numeric_binop(|x, y| x * y, "*")?,
                OpCode::Div => {
                    self.check_zero_divisor()?;
                    self.numeric_binop(|x, y| x / y, "/")?;
                }
                OpCode::Mod => {
                    self.check_zero_divisor()?;
                    self.numeric_binop(|x, y| x % y, "%")?;
                }
                OpCode::Neg => {
                    let value = self.pop()?;
                    match value {
                        Value::Number(n) => self.push(Value::Number(-n))?,
                        other => {
                            return Err(type_mismatch(format!(
                                "unary '-' requires a number, got {}",
                                other.kind_name()
                            )));
                        }
                    }
                }
                OpCode::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(!value.is_truthy_for_not()))?;
                }
                OpCode::Eq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a.is_equal(&b)))?;
                }
                OpCode::Neq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(!a.is_equal(&b)))?;
                }
                OpCode::Lt => self.numeric_cmp(|x, y| x < y, "<")?,
                OpCode::Gt => self.numeric_cmp(|x, y| x > y, ">")?,
                OpCode::Lte => self.numeric_cmp(|x, y| x <= y, "<=")?,
                OpCode::Gte => self.numeric_cmp(|x, y| x >= y, ">=")?,
                OpCode::Jump => {
                    let offset = read_u16(&chunk, &mut ip, instruction)?;
                    ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_u16(&chunk, &mut ip, instruction)?;
                    let condition = self.pop()?;
                    if condition.is_falsey_branch() {
                        ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = read_u16(&chunk, &mut ip, instruction)?;
                    ip = ip
                        .checked_sub(offset as usize)
                        .ok_or(RuntimeError::UnknownOpcode {
                            opcode: instruction,
                        })?;
                }
                OpCode::Call => {
                    // Call frames are not materialized; the arguments are
                    // consumed and the call yields null.
                    let _func_index = read_byte(&chunk, &mut ip, instruction)?;
                    let arg_count = read_byte(&chunk, &mut ip, instruction)?;
                    for _ in 0..arg_count {
                        self.pop()?;
                    }
                    self.push(Value::Null)?;
                }
                OpCode::Return => return Ok(()),
                OpCode::NewArray => {
                    self.push(Value::Array(Vec::new()))?;
                }
                OpCode::ArrayPush => {
                    let value = self.pop()?;
                    let mut elements = match self.pop()? {
                        Value::Array(elements) => elements,
                        other => {
                            return Err(type_mismatch(format!(
                                "cannot push into a {}",
                                other.kind_name()
                            )));
                        }
                    };
                    elements.push(value);
                    self.push(Value::Array(elements))?;
                }
                OpCode::GetIndex => {
                    let index = self.pop()?;
                    let elements = match self.pop()? {
                        Value::Array(elements) => elements,
                        other => {
                            return Err(type_mismatch(format!(
                                "cannot index a {}",
                                other.kind_name()
                            )));
                        }
                    };
                    let idx = match index {
                        Value::Number(n) => n as i64,
                        _ => return Err(type_mismatch("array index must be a number")),
                    };
                    if idx < 0 || idx as usize >= elements.len() {
                        return Err(RuntimeError::IndexOutOfBounds {
                            index: idx,
                            len: elements.len(),
                            span: None,
                        });
                    }
                    self.push(elements[idx as usize].clone())?;
                }
                OpCode::Print => {
                    let value = self.pop()?;
                    let text = value.to_string();
                    writeln!(self.writer, "{text}")?;
                    self.output.push(text);
                }
            }
        }
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn peek(&self) -> Result<&Value, RuntimeError> {
        self.stack.last().ok_or(RuntimeError::StackUnderflow)
    }

    fn numeric_binop(&mut self, op: fn(f64, f64) -> f64, symbol: &str) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => self.push(Value::Number(op(*x, *y))),
            _ => Err(type_mismatch(format!(
                "operator '{symbol}' requires numeric operands"
            ))),
        }
    }

    fn numeric_cmp(&mut self, op: fn(f64, f64) -> bool, symbol: &str) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => self.push(Value::Bool(op(*x, *y))),
            _ => Err(type_mismatch(format!(
                "operator '{symbol}' requires numeric operands"
            ))),
        }
    }

    fn check_zero_divisor(&self) -> Result<(), RuntimeError> {
        if matches!(self.peek()?, Value::Number(n) if *n == 0.0) {
            Err(RuntimeError::DivideByZero { span: None })
        } else {
            Ok(())
        }
    }
}

fn type_mismatch(message: impl Into<String>) -> RuntimeError {
    RuntimeError::TypeMismatch {
        message: message.into(),
        span: None,
    }
}

fn read_byte(chunk: &Chunk, ip: &mut usize, opcode: u8) -> Result<u8, RuntimeError> {
    let byte = chunk
        .code
        .get(*ip)
        .copied()
        .ok_or(RuntimeError::UnknownOpcode { opcode })?;
    *ip += 1;
    Ok(byte)
}

fn read_u16(chunk: &Chunk, ip: &mut usize, opcode: u8) -> Result<u16, RuntimeError> {
    let hi = read_byte(chunk, ip, opcode)? as u16;
    let lo = read_byte(chunk, ip, opcode)? as u16;
    Ok((hi << 8) | lo)
}
