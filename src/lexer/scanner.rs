use winnow::combinator::alt;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::stream::{LocatingSlice, Location};
use winnow::token::{any, take_while};

use crate::error::CompileError;
use crate::lexer::token::{Span, Token, TokenKind, keyword_kind};

type Input<'a> = LocatingSlice<&'a str>;

/// Skip whitespace, `//` line comments and `/* */` block comments.
/// An unterminated block comment is a scan error at its opening `/*`.
fn skip_trivia(input: &mut Input<'_>) -> Result<(), CompileError> {
    loop {
        let before = input.current_token_start();
        let _: Result<(), ErrMode<ContextError>> = take_while(0.., |c: char| {
            c == ' ' || c == '\t' || c == '\r' || c == '\n'
        })
        .void()
        .parse_next(input);

        if input.starts_with("//") {
            let _: Result<(), ErrMode<ContextError>> = take_while(0.., |c: char| c != '\n')
                .void()
                .parse_next(input);
        } else if input.starts_with("/*") {
            let open = input.current_token_start();
            let _: Result<(), ErrMode<ContextError>> = "/*".void().parse_next(input);
            loop {
                if input.starts_with("*/") {
                    let _: Result<(), ErrMode<ContextError>> = "*/".void().parse_next(input);
                    break;
                }
                if any::<_, ContextError>.parse_next(input).is_err() {
                    return Err(CompileError::scan("unterminated block comment", open, 2));
                }
            }
        } else if input.current_token_start() == before {
            return Ok(());
        }
    }
}

/// Scan a string literal, decoding the `\n` `\t` `\\` `\"` escapes.
/// Any other escape and an unterminated literal are scan errors.
fn string_literal(input: &mut Input<'_>) -> Result<Token, CompileError> {
    let start = input.current_token_start();
    let _: Result<char, ErrMode<ContextError>> = '"'.parse_next(input);
    let mut s = String::new();
    loop {
        let c = match any::<_, ContextError>.parse_next(input) {
            Ok(c) => c,
            Err(_) => {
                let end = input.current_token_start();
                return Err(CompileError::scan(
                    "unterminated string literal",
                    start,
                    (end - start).max(1),
                ));
            }
        };
        match c {
            '"' => break,
            '\\' => {
                let esc_start = input.current_token_start() - 1;
                match any::<_, ContextError>.parse_next(input) {
                    Ok('n') => s.push('\n'),
                    Ok('t') => s.push('\t'),
                    Ok('\\') => s.push('\\'),
                    Ok('"') => s.push('"'),
                    Ok(other) => {
                        return Err(CompileError::scan(
                            format!("invalid escape sequence '\\{other}'"),
                            esc_start,
                            2,
                        ));
                    }
                    Err(_) => {
                        return Err(CompileError::scan(
                            "unterminated string literal",
                            start,
                            (input.current_token_start() - start).max(1),
                        ));
                    }
                }
            }
            other => s.push(other),
        }
    }
    let end = input.current_token_start();
    let span = Span::new(start, end - start);
    Ok(Token::new(TokenKind::String, s, span))
}

fn number_literal(input: &mut Input<'_>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let whole: &str = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let mut lexeme = whole.to_string();

    let checkpoint = input.checkpoint();
    let dot_result: Result<char, ErrMode<ContextError>> = '.'.parse_next(input);
    if dot_result.is_ok() {
        match take_while::<_, _, ContextError>(1.., |c: char| c.is_ascii_digit()).parse_next(input)
        {
            Ok(frac) => {
                lexeme.push('.');
                lexeme.push_str(frac);
            }
            Err(_) => {
                input.reset(&checkpoint);
            }
        }
    }

    let end = input.current_token_start();
    Ok(Token::new(
        TokenKind::Number,
        lexeme,
        Span::new(start, end - start),
    ))
}

fn identifier_or_keyword(input: &mut Input<'_>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let first: char = any
        .verify(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .parse_next(input)?;
    let rest: &str =
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    let end = input.current_token_start();
    let mut lexeme = String::with_capacity(1 + rest.len());
    lexeme.push(first);
    lexeme.push_str(rest);
    let kind = keyword_kind(&lexeme).unwrap_or(TokenKind::Identifier);
    Ok(Token::new(kind, lexeme, Span::new(start, end - start)))
}

fn two_char_token(input: &mut Input<'_>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let (kind, lexeme) = alt((
        "!=".value((TokenKind::BangEqual, "!=")),
        "==".value((TokenKind::EqualEqual, "==")),
        ">=".value((TokenKind::GreaterEqual, ">=")),
        "<=".value((TokenKind::LessEqual, "<=")),
        "&&".value((TokenKind::AndAnd, "&&")),
        "||".value((TokenKind::OrOr, "||")),
    ))
    .parse_next(input)?;
    Ok(Token::new(kind, lexeme, Span::new(start, 2)))
}

fn single_char_token(input: &mut Input<'_>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let c = any
        .verify(|c: &char| "(){}[].,;-+/*%!=<>".contains(*c))
        .parse_next(input)?;
    let kind = match c {
        '(' => TokenKind::LeftParen,
        ')' => TokenKind::RightParen,
        '{' => TokenKind::LeftBrace,
        '}' => TokenKind::RightBrace,
        '[' => TokenKind::LeftBracket,
        ']' => TokenKind::RightBracket,
        '.' => TokenKind::Dot,
        ',' => TokenKind::Comma,
        ';' => TokenKind::Semicolon,
        '-' => TokenKind::Minus,
        '+' => TokenKind::Plus,
        '/' => TokenKind::Slash,
        '*' => TokenKind::Star,
        '%' => TokenKind::Percent,
        '!' => TokenKind::Bang,
        '=' => TokenKind::Equal,
        '<' => TokenKind::Less,
        '>' => TokenKind::Greater,
        _ => unreachable!("verify guarantees valid char"),
    };
    Ok(Token::new(kind, c.to_string(), Span::new(start, 1)))
}

fn scan_token(input: &mut Input<'_>) -> ModalResult<Token> {
    alt((
        number_literal,
        identifier_or_keyword,
        two_char_token,
        single_char_token,
    ))
    .parse_next(input)
}

/// Scan all tokens from source, returning either a token list or scan errors.
pub fn scan_all(source: &str) -> Result<Vec<Token>, Vec<CompileError>> {
    let mut input = LocatingSlice::new(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    loop {
        if let Err(e) = skip_trivia(&mut input) {
            errors.push(e);
            break;
        }
        if input.is_empty() {
            break;
        }
        if input.starts_with('"') {
            match string_literal(&mut input) {
                Ok(token) => tokens.push(token),
                Err(e) => errors.push(e),
            }
            continue;
        }
        match scan_token(&mut input) {
            Ok(token) => tokens.push(token),
            Err(_) => {
                let offset = input.current_token_start();
                let c = any::<_, ContextError>.parse_next(&mut input).ok();
                let ch = c.unwrap_or('?');
                errors.push(CompileError::scan(
                    format!("unexpected character '{ch}'"),
                    offset,
                    1,
                ));
            }
        }
    }

    let eof_offset = source.len();
    tokens.push(Token::new(TokenKind::Eof, "", Span::new(eof_offset, 0)));

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_ok(source: &str) -> Vec<Token> {
        scan_all(source).expect("scan should succeed")
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn single_char_tokens() {
        let tokens = scan_ok("(){}[],.-+;/*%");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Minus,
                TokenKind::Plus,
                TokenKind::Semicolon,
                TokenKind::Slash,
                TokenKind::Star,
                TokenKind::Percent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_tokens() {
        let tokens = scan_ok("!= == >= <= && ||");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::GreaterEqual,
                TokenKind::LessEqual,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn single_then_equal() {
        let tokens = scan_ok("! = < >");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Bang,
                TokenKind::Equal,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literal_test() {
        let tokens = scan_ok("\"hello world\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "hello world");
    }

    #[test]
    fn string_with_escapes() {
        let tokens = scan_ok("\"hello\\nworld\\t!\\\\ \\\"quoted\\\"\"");
        assert_eq!(tokens[0].lexeme, "hello\nworld\t!\\ \"quoted\"");
    }

    #[test]
    fn string_invalid_escape_is_error() {
        let errors = scan_all("\"bad \\q escape\"").unwrap_err();
        assert!(errors[0].to_string().contains("invalid escape"));
    }

    #[test]
    fn unterminated_string_error() {
        let errors = scan_all("\"unterminated").unwrap_err();
        assert!(errors[0].to_string().contains("unterminated string"));
    }

    #[test]
    fn number_integer() {
        let tokens = scan_ok("42");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "42");
    }

    #[test]
    fn number_decimal() {
        let tokens = scan_ok("3.14");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "3.14");
    }

    #[test]
    fn number_no_trailing_dot() {
        let tokens = scan_ok("42.foo");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[1].kind, TokenKind::Dot);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn identifiers_and_keywords() {
        let tokens = scan_ok("var x = true");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::True,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn all_keywords() {
        let source = "if else while for return break continue function var const let true false null";
        let tokens = scan_ok(source);
        let expected = vec![
            TokenKind::If,
            TokenKind::Else,
            TokenKind::While,
            TokenKind::For,
            TokenKind::Return,
            TokenKind::Break,
            TokenKind::Continue,
            TokenKind::Function,
            TokenKind::Var,
            TokenKind::Const,
            TokenKind::Let,
            TokenKind::True,
            TokenKind::False,
            TokenKind::Null,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(&tokens), expected);
    }

    #[test]
    fn line_comments_ignored() {
        let tokens = scan_ok("var x // this is a comment\nvar y");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn block_comments_ignored() {
        let tokens = scan_ok("var /* inline\ncomment */ x");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Var, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn block_comment_does_not_nest() {
        // The first `*/` closes the comment; the rest lexes normally.
        let tokens = scan_ok("/* a /* b */ x");
        assert_eq!(kinds(&tokens), vec![TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn unterminated_block_comment_error() {
        let errors = scan_all("var x /* never closed").unwrap_err();
        assert!(errors[0].to_string().contains("unterminated block comment"));
    }

    #[test]
    fn spans_are_correct() {
        let tokens = scan_ok("var x = 42;");
        assert_eq!(tokens[0].span, Span::new(0, 3)); // var
        assert_eq!(tokens[1].span, Span::new(4, 1)); // x
        assert_eq!(tokens[2].span, Span::new(6, 1)); // =
        assert_eq!(tokens[3].span, Span::new(8, 2)); // 42
        assert_eq!(tokens[4].span, Span::new(10, 1)); // ;
    }

    #[test]
    fn unexpected_character_error() {
        let result = scan_all("var x = @;");
        assert!(result.is_err());
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains('@'));
    }

    #[test]
    fn multiline_program() {
        let source = "var x = 1;\nvar y = 2;\nprint(x + y);";
        let tokens = scan_ok(source);
        assert_eq!(tokens.len(), 18); // 17 tokens + EOF
    }

    #[test]
    fn lex_round_trip_simple_tokens() {
        // Joining lexemes of keyword/identifier/integer/punctuation tokens
        // with spaces re-lexes to the same kind sequence.
        let source = "var total = 0 ; while ( total < 10 ) { total = total + 1 ; }";
        let first = scan_ok(source);
        let rejoined = first
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| t.lexeme.clone())
            .collect::<Vec<_>>()
            .join(" ");
        let second = scan_ok(&rejoined);
        assert_eq!(kinds(&first), kinds(&second));
    }
}
