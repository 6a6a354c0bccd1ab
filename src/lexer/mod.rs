pub mod scanner;
pub mod token;

use crate::error::CompileError;
use token::Token;

/// Scan source code into a list of tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Vec<CompileError>> {
    scanner::scan_all(source)
}
