use std::fmt;

use winnow::ascii::{digit0, digit1, till_line_ending};
use winnow::combinator::{alt, opt, repeat};
use winnow::error::{ErrMode, ModalResult};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use super::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    FString,
    Name(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Assign,
    Walrus,
    AugAssign(&'static str),
    Bitwise(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    End,
}

/// A token and its character offset in the formula source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl TokenKind {
    pub(crate) fn is_binary_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::DoubleStar
                | TokenKind::Slash
                | TokenKind::DoubleSlash
                | TokenKind::Percent
                | TokenKind::EqEq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::LtEq
                | TokenKind::Gt
                | TokenKind::GtEq
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(v) => write!(f, "{v}"),
            TokenKind::Float(v) => write!(f, "{v}"),
            TokenKind::Str(s) => write!(f, "\"{s}\""),
            TokenKind::FString => write!(f, "f-string"),
            TokenKind::Name(n) => write!(f, "{n}"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::DoubleStar => write!(f, "**"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::DoubleSlash => write!(f, "//"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Walrus => write!(f, ":="),
            TokenKind::AugAssign(op) | TokenKind::Bitwise(op) => write!(f, "{op}"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::End => write!(f, "end of formula"),
        }
    }
}

// -- Whitespace & comments --------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Numbers ----------------------------------------------------------------

fn exponent(input: &mut &str) -> ModalResult<()> {
    (one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)
        .void()
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<TokenKind> {
    let text: &str = alt((
        (digit1, opt(('.', digit0)), opt(exponent)).take(),
        ('.', digit1, opt(exponent)).take(),
    ))
    .parse_next(input)?;

    if text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
        let v: f64 = text
            .parse()
            .map_err(|_| ErrMode::from_input(input).cut())?;
        return Ok(TokenKind::Float(v));
    }
    // Integer literals too large for i64 degrade to floats.
    match text.parse::<i64>() {
        Ok(v) => Ok(TokenKind::Int(v)),
        Err(_) => text
            .parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| ErrMode::from_input(input).cut()),
    }
}

// -- Strings ----------------------------------------------------------------

fn quoted(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = any.parse_next(input)?;
        match ch {
            c if c == quote => return Ok(s),
            '\\' => {
                let esc = any.parse_next(input)?;
                match esc {
                    '"' => s.push('"'),
                    '\'' => s.push('\''),
                    '\\' => s.push('\\'),
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn string_token(input: &mut &str) -> ModalResult<TokenKind> {
    quoted.map(TokenKind::Str).parse_next(input)
}

// -- Identifiers ------------------------------------------------------------

fn is_fstring_prefix(ident: &str) -> bool {
    let lower = ident.to_ascii_lowercase();
    lower.len() <= 2 && lower.contains('f') && lower.chars().all(|c| matches!(c, 'f' | 'r' | 'b'))
}

fn name_token(input: &mut &str) -> ModalResult<TokenKind> {
    let ident: &str = (
        take_while(1.., |c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)?;

    if is_fstring_prefix(ident) && (input.starts_with('"') || input.starts_with('\'')) {
        quoted.parse_next(input)?;
        return Ok(TokenKind::FString);
    }
    Ok(TokenKind::Name(ident.to_owned()))
}

// -- Operators & punctuation ------------------------------------------------

fn long_operator(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        "**=".value(TokenKind::AugAssign("**=")),
        "//=".value(TokenKind::AugAssign("//=")),
        ">>=".value(TokenKind::AugAssign(">>=")),
        "<<=".value(TokenKind::AugAssign("<<=")),
        "**".value(TokenKind::DoubleStar),
        "//".value(TokenKind::DoubleSlash),
        "==".value(TokenKind::EqEq),
        "!=".value(TokenKind::NotEq),
        "<=".value(TokenKind::LtEq),
        ">=".value(TokenKind::GtEq),
        ":=".value(TokenKind::Walrus),
        "<<".value(TokenKind::Bitwise("<<")),
        ">>".value(TokenKind::Bitwise(">>")),
    ))
    .parse_next(input)
}

fn augmented_assignment(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        "+=".value(TokenKind::AugAssign("+=")),
        "-=".value(TokenKind::AugAssign("-=")),
        "*=".value(TokenKind::AugAssign("*=")),
        "/=".value(TokenKind::AugAssign("/=")),
        "%=".value(TokenKind::AugAssign("%=")),
        "&=".value(TokenKind::AugAssign("&=")),
        "|=".value(TokenKind::AugAssign("|=")),
        "^=".value(TokenKind::AugAssign("^=")),
        "@=".value(TokenKind::AugAssign("@=")),
    ))
    .parse_next(input)
}

fn arithmetic_operator(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        '+'.value(TokenKind::Plus),
        '-'.value(TokenKind::Minus),
        '*'.value(TokenKind::Star),
        '/'.value(TokenKind::Slash),
        '%'.value(TokenKind::Percent),
        '<'.value(TokenKind::Lt),
        '>'.value(TokenKind::Gt),
        '='.value(TokenKind::Assign),
        '&'.value(TokenKind::Bitwise("&")),
        '|'.value(TokenKind::Bitwise("|")),
        '^'.value(TokenKind::Bitwise("^")),
        '~'.value(TokenKind::Bitwise("~")),
        '@'.value(TokenKind::Bitwise("@")),
    ))
    .parse_next(input)
}

fn punctuation(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        '('.value(TokenKind::LParen),
        ')'.value(TokenKind::RParen),
        '['.value(TokenKind::LBracket),
        ']'.value(TokenKind::RBracket),
        '{'.value(TokenKind::LBrace),
        '}'.value(TokenKind::RBrace),
        ','.value(TokenKind::Comma),
        '.'.value(TokenKind::Dot),
        ':'.value(TokenKind::Colon),
        ';'.value(TokenKind::Semicolon),
    ))
    .parse_next(input)
}

fn token(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        number,
        string_token,
        name_token,
        long_operator,
        augmented_assignment,
        arithmetic_operator,
        punctuation,
    ))
    .parse_next(input)
}

// -- Driver -----------------------------------------------------------------

fn lex_error(rest: &str, position: usize) -> FormulaError {
    match rest.chars().next() {
        Some('"' | '\'') => FormulaError::syntax("unterminated string literal", position)
            .with_suggestion("close the string with a matching quote"),
        Some('!') => FormulaError::syntax("unexpected character '!'", position)
            .with_suggestion("use 'not' for negation or '!=' for inequality"),
        Some('\\') => FormulaError::syntax("line continuations are not supported", position)
            .with_suggestion("write the formula without '\\'"),
        Some(c) => FormulaError::syntax(format!("unexpected character '{c}'"), position),
        None => FormulaError::syntax("unexpected end of formula", position),
    }
}

/// Split a formula into tokens, always terminated by [`TokenKind::End`].
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let mut input = source;
    let mut tokens = Vec::new();
    let mut consumed_bytes = 0;
    let mut position = 0;

    loop {
        let before = input;
        ws.parse_next(&mut input)
            .map_err(|_| lex_error(before, position))?;
        let offset = source.len() - input.len();
        position += source[consumed_bytes..offset].chars().count();
        consumed_bytes = offset;

        if input.is_empty() {
            tokens.push(Token {
                kind: TokenKind::End,
                position,
            });
            return Ok(tokens);
        }

        let rest = input;
        match token.parse_next(&mut input) {
            Ok(kind) => tokens.push(Token { kind, position }),
            Err(_) => return Err(lex_error(rest, position)),
        }
    }
}
