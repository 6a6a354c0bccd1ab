use crate::error::RuntimeError;
use crate::interpreter::value::Value;

/// Built-in functions registered in the root environment at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Floor,
    Ceil,
    Sqrt,
    Pow,
    Sin,
    Cos,
    Tan,
    Log,
    Round,
    Concat,
    Substring,
    ToUpper,
    ToLower,
    IndexOf,
    Replace,
}

impl Builtin {
    pub fn all() -> &'static [Builtin] {
        &[
            Self::Print,
            Self::Floor,
            Self::Ceil,
            Self::Sqrt,
            Self::Pow,
            Self::Sin,
            Self::Cos,
            Self::Tan,
            Self::Log,
            Self::Round,
            Self::Concat,
            Self::Substring,
            Self::ToUpper,
            Self::ToLower,
            Self::IndexOf,
            Self::Replace,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Sqrt => "sqrt",
            Self::Pow => "pow",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Log => "log",
            Self::Round => "round",
            Self::Concat => "concat",
            Self::Substring => "substring",
            Self::ToUpper => "to_upper",
            Self::ToLower => "to_lower",
            Self::IndexOf => "index_of",
            Self::Replace => "replace",
        }
    }

    /// Invoke a pure builtin. `print` is dispatched by the interpreter,
    /// which owns the output writer.
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        match self {
            Self::Print => unreachable!("print is dispatched by the interpreter"),
            Self::Floor => one_number(self.name(), args).map(|n| Value::Number(n.floor())),
            Self::Ceil => one_number(self.name(), args).map(|n| Value::Number(n.ceil())),
            Self::Sqrt => one_number(self.name(), args).map(|n| Value::Number(n.sqrt())),
            Self::Pow => {
                let (base, exp) = two_numbers(self.name(), args)?;
                Ok(Value::Number(base.powf(exp)))
            }
            Self::Sin => one_number(self.name(), args).map(|n| Value::Number(n.sin())),
            Self::Cos => one_number(self.name(), args).map(|n| Value::Number(n.cos())),
            Self::Tan => one_number(self.name(), args).map(|n| Value::Number(n.tan())),
            Self::Log => one_number(self.name(), args).map(|n| Value::Number(n.ln())),
            Self::Round => one_number(self.name(), args).map(|n| Value::Number(n.round())),
            Self::Concat => {
                let (a, b) = two_strings(self.name(), args)?;
                Ok(Value::Str(format!("{a}{b}")))
            }
            Self::Substring => {
                let [Value::Str(s), Value::Number(start), Value::Number(length)] = args else {
                    return Err(arity_error(
                        "'substring' requires a string and two numeric arguments",
                    ));
                };
                let start = *start as i64;
                let length = *length as i64;
                if start < 0 || length < 0 || (start + length) as usize > s.len() {
                    return Err(arity_error("invalid range for 'substring'"));
                }
                let start = start as usize;
                let length = length as usize;
                match s.get(start..start + length) {
                    Some(sub) => Ok(Value::Str(sub.to_string())),
                    None => Err(arity_error("invalid range for 'substring'")),
                }
            }
            Self::ToUpper => {
                one_string(self.name(), args).map(|s| Value::Str(s.to_ascii_uppercase()))
            }
            Self::ToLower => {
                one_string(self.name(), args).map(|s| Value::Str(s.to_ascii_lowercase()))
            }
            Self::IndexOf => {
                let (haystack, needle) = two_strings(self.name(), args)?;
                let index = haystack.find(needle).map(|i| i as f64).unwrap_or(-1.0);
                Ok(Value::Number(index))
            }
            Self::Replace => {
                let [Value::Str(s), Value::Str(search), Value::Str(replacement)] = args else {
                    return Err(arity_error("'replace' requires three string arguments"));
                };
                // Only the first occurrence is replaced.
                match s.find(search.as_str()) {
                    Some(pos) => Ok(Value::Str(format!(
                        "{}{}{}",
                        &s[..pos],
                        replacement,
                        &s[pos + search.len()..]
                    ))),
                    None => Ok(Value::Str(s.clone())),
                }
            }
        }
    }
}

fn arity_error(message: &str) -> RuntimeError {
    RuntimeError::TypeMismatch {
        message: message.to_string(),
        span: None,
    }
}

fn one_number(name: &str, args: &[Value]) -> Result<f64, RuntimeError> {
    match args {
        [Value::Number(n)] => Ok(*n),
        _ => Err(arity_error(&format!(
            "'{name}' requires a single numeric argument"
        ))),
    }
}

fn two_numbers(name: &str, args: &[Value]) -> Result<(f64, f64), RuntimeError> {
    match args {
        [Value::Number(a), Value::Number(b)] => Ok((*a, *b)),
        _ => Err(arity_error(&format!(
            "'{name}' requires two numeric arguments"
        ))),
    }
}

fn one_string<'a>(name: &str, args: &'a [Value]) -> Result<&'a str, RuntimeError> {
    match args {
        [Value::Str(s)] => Ok(s),
        _ => Err(arity_error(&format!(
            "'{name}' requires a single string argument"
        ))),
    }
}

fn two_strings<'a>(name: &str, args: &'a [Value]) -> Result<(&'a str, &'a str), RuntimeError> {
    match args {
        [Value::Str(a), Value::Str(b)] => Ok((a, b)),
        _ => Err(arity_error(&format!(
            "'{name}' requires two string arguments"
        ))),
    }
}
