pub mod chunk;
pub mod compiler;
#[allow(clippy::module_inception)]
pub mod vm;

use std::path::Path;

use crate::error::CompileError;
use crate::lexer;
use crate::parser::Parser;
use crate::vm::compiler::Compiler;

/// Compile source code to bytecode and return the chunk.
pub fn compile_to_chunk(source: &str) -> Result<chunk::Chunk, CompileError> {
    let tokens = lexer::tokenize(source)
        .map_err(|errors| errors.into_iter().next().expect("at least one error"))?;
    let program = Parser::new(tokens)
        .parse()
        .map_err(|errors| errors.into_iter().next().expect("at least one error"))?;
    Compiler::new().compile(&program)
}

/// Compile source code, resolving `import` paths relative to `base_dir`.
pub fn compile_to_chunk_from(
    source: &str,
    base_dir: &Path,
) -> Result<chunk::Chunk, CompileError> {
    let tokens = lexer::tokenize(source)
        .map_err(|errors| errors.into_iter().next().expect("at least one error"))?;
    let program = Parser::new(tokens)
        .parse()
        .map_err(|errors| errors.into_iter().next().expect("at least one error"))?;
    Compiler::with_base_dir(base_dir).compile(&program)
}
