use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::lexer::token::Span;

// ============= Compile-time errors (with miette diagnostics) =============

#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error("scan error: {message}")]
    #[diagnostic(code(ember::scan))]
    Scan {
        message: String,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("parse error: {message}")]
    #[diagnostic(code(ember::parse))]
    Parse {
        message: String,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("compile error: {message}")]
    #[diagnostic(code(ember::codegen))]
    Codegen {
        message: String,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl CompileError {
    pub fn scan(message: impl Into<String>, offset: usize, len: usize) -> Self {
        Self::Scan {
            message: message.into(),
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    pub fn parse(message: impl Into<String>, offset: usize, len: usize) -> Self {
        Self::Parse {
            message: message.into(),
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    pub fn codegen(message: impl Into<String>, offset: usize, len: usize) -> Self {
        Self::Codegen {
            message: message.into(),
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    /// Attach source code for fancy miette diagnostics
    pub fn with_source_code(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let name_str = name.into();
        let source_str = source.into();
        match self {
            Self::Scan { message, span, .. } => Self::Scan {
                message,
                span,
                src: miette::NamedSource::new(name_str, source_str),
            },
            Self::Parse { message, span, .. } => Self::Parse {
                message,
                span,
                src: miette::NamedSource::new(name_str, source_str),
            },
            Self::Codegen { message, span, .. } => Self::Codegen {
                message,
                span,
                src: miette::NamedSource::new(name_str, source_str),
            },
        }
    }
}

// ============= Runtime errors (simple, no miette) =============

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String, span: Option<Span> },

    #[error("division by zero")]
    DivideByZero { span: Option<Span> },

    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String, span: Option<Span> },

    #[error("undefined function '{name}'")]
    UndefinedFunction { name: String, span: Option<Span> },

    #[error("array index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        index: i64,
        len: usize,
        span: Option<Span>,
    },

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("unknown opcode {opcode}")]
    UnknownOpcode { opcode: u8 },

    #[error("{message}")]
    Unsupported { message: String, span: Option<Span> },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        Self::TypeMismatch {
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::TypeMismatch { span, .. }
            | Self::DivideByZero { span }
            | Self::UndefinedVariable { span, .. }
            | Self::UndefinedFunction { span, .. }
            | Self::IndexOutOfBounds { span, .. }
            | Self::Unsupported { span, .. } => *span,
            _ => None,
        }
    }

    /// Format the error with a line number (requires the original source).
    pub fn display_with_line(&self, source: &str) -> String {
        match self.span() {
            Some(span) => {
                let line = offset_to_line(source, span.offset);
                format!("Error: line {}: {}", line, self)
            }
            None => format!("Error: {}", self),
        }
    }
}

/// Calculate line number from byte offset in source
pub fn offset_to_line(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .chars()
        .filter(|&c| c == '\n')
        .count()
        + 1
}

// ============= Tests =============
