use crate::types::{BinaryOp, CompareOp, LogicalOp, UnaryOp, Value};

use super::FormulaError;
use super::lexer::{Token, TokenKind};

/// Parse tree before the whitelist walk. Call targets and arguments keep
/// their raw shape here so that rejected forms (method calls, keyword
/// arguments, unpacking) can be reported with a position.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Raw {
    pub kind: RawKind,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawKind {
    Literal(Value),
    Name(String),
    Attribute {
        object: Box<Raw>,
        attr: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Raw>,
        right: Box<Raw>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Raw>,
    },
    Compare {
        first: Box<Raw>,
        rest: Vec<(CompareOp, Raw)>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Raw>,
        right: Box<Raw>,
    },
    Call {
        callee: Box<Raw>,
        args: Vec<RawArg>,
    },
    Conditional {
        test: Box<Raw>,
        then: Box<Raw>,
        otherwise: Box<Raw>,
    },
    List(Vec<Raw>),
    Tuple(Vec<Raw>),
    Subscript {
        object: Box<Raw>,
        index: Box<Raw>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawArg {
    Positional(Raw),
    Keyword { name: String, position: usize },
    Starred { position: usize },
}

/// Statement keywords and the message reported when one appears.
const FORBIDDEN_KEYWORDS: &[(&str, &str)] = &[
    ("import", "import statements are not allowed"),
    ("from", "import statements are not allowed"),
    ("def", "function definitions are not allowed"),
    ("class", "class definitions are not allowed"),
    ("lambda", "lambda expressions are not allowed"),
    ("for", "loops and comprehensions are not allowed"),
    ("while", "loops are not allowed"),
    ("with", "with statements are not allowed"),
    ("del", "del statements are not allowed"),
    ("global", "global declarations are not allowed"),
    ("nonlocal", "nonlocal declarations are not allowed"),
    ("return", "return statements are not allowed"),
    ("yield", "yield expressions are not allowed"),
    ("async", "async constructs are not allowed"),
    ("await", "await expressions are not allowed"),
    ("exec", "exec is not allowed"),
    ("raise", "raise statements are not allowed"),
    ("try", "exception handling is not allowed"),
    ("except", "exception handling is not allowed"),
    ("finally", "exception handling is not allowed"),
    ("assert", "assert statements are not allowed"),
    ("pass", "pass statements are not allowed"),
    ("break", "break statements are not allowed"),
    ("continue", "continue statements are not allowed"),
];

/// Words with grammatical meaning that cannot start an operand.
const STRUCTURAL_KEYWORDS: &[&str] = &["and", "or", "not", "if", "else", "elif", "in", "is"];

static END: TokenKind = TokenKind::End;

fn forbidden_keyword(name: &str) -> Option<&'static str> {
    FORBIDDEN_KEYWORDS
        .iter()
        .find(|(kw, _)| *kw == name)
        .map(|(_, message)| *message)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

/// Parse a token stream produced by the lexer into a [`Raw`] tree.
pub(crate) fn parse_tokens(tokens: &[Token], max_depth: usize) -> Result<Raw, FormulaError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    };
    parser.formula()
}

impl Parser<'_> {
    // -- Cursor -------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(&END, |t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.position)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), TokenKind::Name(n) if n == keyword)
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FormulaError::validation(
                format!(
                    "formula nesting exceeds the maximum depth of {}",
                    self.max_depth
                ),
                self.position(),
            )
            .with_suggestion("split the formula into simpler expressions"));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    // -- Errors -------------------------------------------------------------

    fn assignment_error(&self) -> FormulaError {
        let message = match self.peek() {
            TokenKind::Walrus => "assignment expressions (:=) are not allowed".to_owned(),
            TokenKind::AugAssign(op) => format!("augmented assignment ({op}) is not allowed"),
            _ => "assignment is not allowed".to_owned(),
        };
        FormulaError::validation(message, self.position())
            .with_suggestion("use == to compare values")
    }

    fn keyword_error(&self, message: &str) -> FormulaError {
        FormulaError::validation(message, self.position())
    }

    /// Error for a token that cannot start an operand.
    fn operand_error(&self) -> FormulaError {
        let position = self.position();
        match self.peek() {
            TokenKind::End => {
                let previous = self
                    .pos
                    .checked_sub(1)
                    .and_then(|i| self.tokens.get(i))
                    .map(|t| &t.kind);
                let err = FormulaError::syntax("unexpected end of formula", position);
                match previous {
                    None => err,
                    Some(op) if op.is_binary_operator() => err.with_suggestion(format!(
                        "remove the trailing '{op}' or add an operand after it"
                    )),
                    Some(TokenKind::LParen | TokenKind::LBracket | TokenKind::Comma) => {
                        err.with_suggestion("close the open bracket")
                    }
                    Some(_) => err.with_suggestion("complete the expression"),
                }
            }
            TokenKind::RParen => FormulaError::syntax("unbalanced parentheses: unexpected ')'", position)
                .with_suggestion("remove the extra ')'"),
            TokenKind::Assign | TokenKind::Walrus | TokenKind::AugAssign(_) => {
                self.assignment_error()
            }
            TokenKind::Bitwise(op) => {
                FormulaError::validation(format!("bitwise operator '{op}' is not allowed"), position)
            }
            other => FormulaError::syntax(format!("unexpected '{other}'"), position),
        }
    }

    /// Error for a token left over after a complete expression.
    fn trailing_error(&self) -> FormulaError {
        let position = self.position();
        match self.peek() {
            TokenKind::Assign | TokenKind::Walrus | TokenKind::AugAssign(_) => {
                self.assignment_error()
            }
            TokenKind::Semicolon => {
                FormulaError::validation("multiple statements are not allowed", position)
                    .with_suggestion("write a single expression")
            }
            TokenKind::RParen => FormulaError::syntax("unbalanced parentheses: unexpected ')'", position)
                .with_suggestion("remove the extra ')'"),
            TokenKind::RBracket => FormulaError::syntax("unbalanced brackets: unexpected ']'", position)
                .with_suggestion("remove the extra ']'"),
            TokenKind::Name(n) if n == "in" || n == "is" => self.membership_error(),
            TokenKind::Name(n) => match forbidden_keyword(n) {
                Some(message) => self.keyword_error(message),
                None => FormulaError::syntax(format!("unexpected '{n}'"), position)
                    .with_suggestion("add an operator between the operands"),
            },
            TokenKind::Colon => FormulaError::syntax("unexpected ':'", position)
                .with_suggestion("slices and annotations are not supported"),
            other => FormulaError::syntax(format!("unexpected '{other}'"), position)
                .with_suggestion("add an operator between the operands"),
        }
    }

    fn membership_error(&self) -> FormulaError {
        FormulaError::validation(
            "membership and identity tests (in, is) are not supported",
            self.position(),
        )
        .with_suggestion("use == or != instead")
    }

    fn comprehension_error(&self) -> FormulaError {
        FormulaError::validation("comprehensions are not allowed", self.position())
            .with_suggestion("use sum(), min() or max() over an explicit list")
    }

    fn expect_close(
        &mut self,
        close: &TokenKind,
        open_char: char,
        open_position: usize,
    ) -> Result<(), FormulaError> {
        if self.peek() == close {
            self.advance();
            return Ok(());
        }
        let position = self.position();
        Err(match self.peek() {
            TokenKind::End => FormulaError::syntax(
                format!(
                    "unbalanced parentheses: '{open_char}' at position {open_position} is never closed"
                ),
                open_position,
            )
            .with_suggestion(format!("add a closing '{close}'")),
            TokenKind::Assign | TokenKind::Walrus | TokenKind::AugAssign(_) => {
                self.assignment_error()
            }
            TokenKind::Name(n) if n == "for" => self.comprehension_error(),
            TokenKind::Name(n) if n == "in" || n == "is" => self.membership_error(),
            TokenKind::Colon if open_char == '[' => {
                FormulaError::validation("slices are not allowed", position)
                    .with_suggestion("index a single element with [n]")
            }
            other => FormulaError::syntax(format!("expected '{close}' but found '{other}'"), position),
        })
    }

    // -- Grammar ------------------------------------------------------------

    fn formula(&mut self) -> Result<Raw, FormulaError> {
        if matches!(self.peek(), TokenKind::End) {
            return Err(FormulaError::syntax("formula is empty", 0)
                .with_suggestion("enter an expression such as ram_gb * 2.5"));
        }
        let expr = self.expression()?;
        if matches!(self.peek(), TokenKind::End) {
            Ok(expr)
        } else {
            Err(self.trailing_error())
        }
    }

    fn expression(&mut self) -> Result<Raw, FormulaError> {
        self.enter()?;
        let expr = self.ternary()?;
        self.leave(1);
        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Raw, FormulaError> {
        let then = self.or_expr()?;
        if !self.at_keyword("if") {
            return Ok(then);
        }
        self.advance();
        let test = self.or_expr()?;
        if !self.at_keyword("else") {
            return Err(FormulaError::syntax(
                "conditional expression is missing 'else'",
                self.position(),
            )
            .with_suggestion("write it as: value if condition else other"));
        }
        self.advance();
        let otherwise = self.expression()?;
        let position = then.position;
        Ok(Raw {
            kind: RawKind::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            position,
        })
    }

    fn logical_chain(
        &mut self,
        keyword: &str,
        op: LogicalOp,
        operand: fn(&mut Self) -> Result<Raw, FormulaError>,
    ) -> Result<Raw, FormulaError> {
        let mut left = operand(self)?;
        let mut levels = 0;
        while self.at_keyword(keyword) {
            self.enter()?;
            levels += 1;
            self.advance();
            let right = operand(self)?;
            let position = left.position;
            left = Raw {
                kind: RawKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            };
        }
        self.leave(levels);
        Ok(left)
    }

    fn or_expr(&mut self) -> Result<Raw, FormulaError> {
        self.logical_chain("or", LogicalOp::Or, Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Raw, FormulaError> {
        self.logical_chain("and", LogicalOp::And, Self::not_expr)
    }

    fn not_expr(&mut self) -> Result<Raw, FormulaError> {
        if !self.at_keyword("not") {
            return self.comparison();
        }
        let position = self.position();
        self.enter()?;
        self.advance();
        let operand = self.not_expr()?;
        self.leave(1);
        Ok(Raw {
            kind: RawKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            position,
        })
    }

    fn comparison(&mut self) -> Result<Raw, FormulaError> {
        let first = self.additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => CompareOp::Eq,
                TokenKind::NotEq => CompareOp::Neq,
                TokenKind::Gt => CompareOp::Gt,
                TokenKind::GtEq => CompareOp::Gte,
                TokenKind::Lt => CompareOp::Lt,
                TokenKind::LtEq => CompareOp::Lte,
                TokenKind::Name(n) if n == "in" || n == "is" => {
                    return Err(self.membership_error());
                }
                TokenKind::Name(n) if n == "not" && matches!(self.peek_at(1), TokenKind::Name(m) if m == "in") => {
                    return Err(self.membership_error());
                }
                _ => break,
            };
            self.advance();
            rest.push((op, self.additive()?));
        }
        if rest.is_empty() {
            return Ok(first);
        }
        let position = first.position;
        Ok(Raw {
            kind: RawKind::Compare {
                first: Box::new(first),
                rest,
            },
            position,
        })
    }

    fn binary_chain(
        &mut self,
        select: fn(&TokenKind) -> Option<BinaryOp>,
        operand: fn(&mut Self) -> Result<Raw, FormulaError>,
    ) -> Result<Raw, FormulaError> {
        let mut left = operand(self)?;
        let mut levels = 0;
        loop {
            if let TokenKind::Bitwise(op) = self.peek() {
                return Err(FormulaError::validation(
                    format!("bitwise operator '{op}' is not allowed"),
                    self.position(),
                ));
            }
            let Some(op) = select(self.peek()) else {
                break;
            };
            self.enter()?;
            levels += 1;
            self.advance();
            let right = operand(self)?;
            let position = left.position;
            left = Raw {
                kind: RawKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            };
        }
        self.leave(levels);
        Ok(left)
    }

    fn additive(&mut self) -> Result<Raw, FormulaError> {
        self.binary_chain(
            |kind| match kind {
                TokenKind::Plus => Some(BinaryOp::Add),
                TokenKind::Minus => Some(BinaryOp::Sub),
                _ => None,
            },
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Raw, FormulaError> {
        self.binary_chain(
            |kind| match kind {
                TokenKind::Star => Some(BinaryOp::Mul),
                TokenKind::Slash => Some(BinaryOp::Div),
                TokenKind::DoubleSlash => Some(BinaryOp::FloorDiv),
                TokenKind::Percent => Some(BinaryOp::Mod),
                _ => None,
            },
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Raw, FormulaError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            TokenKind::Bitwise(_) => return Err(self.operand_error()),
            _ => return self.power(),
        };
        let position = self.position();
        self.enter()?;
        self.advance();
        let operand = self.unary()?;
        self.leave(1);
        Ok(Raw {
            kind: RawKind::Unary {
                op,
                operand: Box::new(operand),
            },
            position,
        })
    }

    fn power(&mut self) -> Result<Raw, FormulaError> {
        let base = self.postfix()?;
        if !matches!(self.peek(), TokenKind::DoubleStar) {
            return Ok(base);
        }
        self.enter()?;
        self.advance();
        // Right-associative, and binds tighter than a unary minus on its left.
        let exponent = self.unary()?;
        self.leave(1);
        let position = base.position;
        Ok(Raw {
            kind: RawKind::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            position,
        })
    }

    fn postfix(&mut self) -> Result<Raw, FormulaError> {
        let mut expr = self.atom()?;
        let mut levels = 0;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.enter()?;
                    levels += 1;
                    self.advance();
                    let TokenKind::Name(attr) = self.peek().clone() else {
                        return Err(FormulaError::syntax(
                            "expected an attribute name after '.'",
                            self.position(),
                        ));
                    };
                    self.advance();
                    let position = expr.position;
                    expr = Raw {
                        kind: RawKind::Attribute {
                            object: Box::new(expr),
                            attr,
                        },
                        position,
                    };
                }
                TokenKind::LParen => {
                    self.enter()?;
                    levels += 1;
                    let open = self.position();
                    self.advance();
                    let args = self.call_arguments(open)?;
                    let position = expr.position;
                    expr = Raw {
                        kind: RawKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        position,
                    };
                }
                TokenKind::LBracket => {
                    self.enter()?;
                    levels += 1;
                    let open = self.position();
                    self.advance();
                    let index = self.expression()?;
                    self.expect_close(&TokenKind::RBracket, '[', open)?;
                    let position = expr.position;
                    expr = Raw {
                        kind: RawKind::Subscript {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        position,
                    };
                }
                _ => break,
            }
        }
        self.leave(levels);
        Ok(expr)
    }

    fn call_arguments(&mut self, open: usize) -> Result<Vec<RawArg>, FormulaError> {
        let mut args = Vec::new();
        loop {
            if matches!(self.peek(), TokenKind::RParen) {
                self.advance();
                return Ok(args);
            }
            let position = self.position();
            let keyword = matches!(self.peek_at(1), TokenKind::Assign);
            match self.peek().clone() {
                TokenKind::Star | TokenKind::DoubleStar => {
                    self.advance();
                    self.expression()?;
                    args.push(RawArg::Starred { position });
                }
                TokenKind::Name(name) if keyword => {
                    self.advance();
                    self.advance();
                    self.expression()?;
                    args.push(RawArg::Keyword { name, position });
                }
                _ => {
                    let value = self.expression()?;
                    if self.at_keyword("for") {
                        return Err(self.comprehension_error());
                    }
                    args.push(RawArg::Positional(value));
                }
            }
            if matches!(self.peek(), TokenKind::Comma) {
                self.advance();
            } else {
                self.expect_close(&TokenKind::RParen, '(', open)?;
                return Ok(args);
            }
        }
    }

    /// Comma-separated items up to `close`; returns the items and whether a
    /// comma was seen.
    fn sequence(
        &mut self,
        close: &TokenKind,
        open_char: char,
        open: usize,
    ) -> Result<(Vec<Raw>, bool), FormulaError> {
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            if self.peek() == close {
                self.advance();
                return Ok((items, saw_comma));
            }
            items.push(self.expression()?);
            if self.at_keyword("for") {
                return Err(self.comprehension_error());
            }
            if matches!(self.peek(), TokenKind::Comma) {
                saw_comma = true;
                self.advance();
            } else {
                self.expect_close(close, open_char, open)?;
                return Ok((items, saw_comma));
            }
        }
    }

    fn atom(&mut self) -> Result<Raw, FormulaError> {
        let position = self.position();
        let kind = match self.peek().clone() {
            TokenKind::Int(v) => {
                self.advance();
                RawKind::Literal(Value::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                RawKind::Literal(Value::Float(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                RawKind::Literal(Value::String(s))
            }
            TokenKind::FString => {
                return Err(FormulaError::validation("f-strings are not allowed", position)
                    .with_suggestion("compute numbers with arithmetic instead of string formatting"));
            }
            TokenKind::Name(name) => {
                let literal = match name.as_str() {
                    "True" | "true" => Some(Value::Bool(true)),
                    "False" | "false" => Some(Value::Bool(false)),
                    "None" | "null" => Some(Value::Null),
                    _ => None,
                };
                if let Some(message) = forbidden_keyword(&name) {
                    return Err(self.keyword_error(message));
                }
                if STRUCTURAL_KEYWORDS.contains(&name.as_str()) {
                    return Err(FormulaError::syntax(
                        format!("unexpected keyword '{name}'"),
                        position,
                    )
                    .with_suggestion("add an operand before the keyword"));
                }
                self.advance();
                literal.map_or(RawKind::Name(name), RawKind::Literal)
            }
            TokenKind::LParen => {
                self.advance();
                if matches!(self.peek(), TokenKind::RParen) {
                    self.advance();
                    RawKind::Tuple(Vec::new())
                } else {
                    let (mut items, saw_comma) = self.sequence(&TokenKind::RParen, '(', position)?;
                    if !saw_comma && items.len() == 1 {
                        let mut inner = items.remove(0);
                        inner.position = position;
                        return Ok(inner);
                    }
                    RawKind::Tuple(items)
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let (items, _) = self.sequence(&TokenKind::RBracket, '[', position)?;
                RawKind::List(items)
            }
            TokenKind::LBrace => {
                return Err(FormulaError::validation(
                    "dict and set literals are not allowed",
                    position,
                )
                .with_suggestion("use a list [a, b] instead"));
            }
            _ => return Err(self.operand_error()),
        };
        Ok(Raw { kind, position })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::lexer::tokenize;

    fn parse(source: &str) -> Result<Raw, FormulaError> {
        parse_tokens(&tokenize(source)?, 100)
    }

    fn kind(source: &str) -> RawKind {
        parse(source).unwrap().kind
    }

    fn validation_message(source: &str) -> String {
        match parse(source).unwrap_err() {
            FormulaError::Validation { message, .. } => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn precedence_mul_over_add() {
        let RawKind::Binary { op, right, .. } = kind("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(right.kind, RawKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let RawKind::Unary { op, operand } = kind("-2 ** 2") else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Neg);
        assert!(matches!(operand.kind, RawKind::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn power_is_right_associative() {
        let RawKind::Binary { right, .. } = kind("2 ** 3 ** 2") else {
            panic!("expected binary");
        };
        assert!(matches!(right.kind, RawKind::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn chained_comparison() {
        let RawKind::Compare { rest, .. } = kind("0 < x <= 10") else {
            panic!("expected comparison");
        };
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].0, CompareOp::Lt);
        assert_eq!(rest[1].0, CompareOp::Lte);
    }

    #[test]
    fn conditional_expression() {
        assert!(matches!(kind("1 if x > 0 else 2"), RawKind::Conditional { .. }));
    }

    #[test]
    fn boolean_and_null_literals() {
        assert_eq!(kind("True"), RawKind::Literal(Value::Bool(true)));
        assert_eq!(kind("false"), RawKind::Literal(Value::Bool(false)));
        assert_eq!(kind("None"), RawKind::Literal(Value::Null));
    }

    #[test]
    fn parenthesized_and_tuple() {
        assert!(matches!(kind("(1 + 2)"), RawKind::Binary { .. }));
        assert!(matches!(kind("(1,)"), RawKind::Tuple(items) if items.len() == 1));
        assert!(matches!(kind("[1, 2, 3]"), RawKind::List(items) if items.len() == 3));
    }

    #[test]
    fn call_with_keyword_and_starred_args_is_recorded() {
        let RawKind::Call { args, .. } = kind("round(x, ndigits=2)") else {
            panic!("expected call");
        };
        assert!(matches!(&args[1], RawArg::Keyword { name, .. } if name == "ndigits"));

        let RawKind::Call { args, .. } = kind("max(*xs)") else {
            panic!("expected call");
        };
        assert!(matches!(args[0], RawArg::Starred { .. }));
    }

    #[test]
    fn empty_formula() {
        let err = parse("   ").unwrap_err();
        assert!(err.to_string().contains("formula is empty"));
    }

    #[test]
    fn trailing_operator() {
        let err = parse("ram_gb *").unwrap_err();
        assert!(matches!(err, FormulaError::Syntax { .. }));
        assert_eq!(err.position(), Some(8));
        assert!(err.suggestion().unwrap().contains("'*'"));
    }

    #[test]
    fn unclosed_paren_points_at_opening() {
        let err = parse("max(1, (2 + 3)").unwrap_err();
        assert_eq!(err.position(), Some(3));
        assert!(err.to_string().contains("unbalanced parentheses"));
    }

    #[test]
    fn extra_closing_paren() {
        let err = parse("(1 + 2))").unwrap_err();
        assert_eq!(err.position(), Some(7));
        assert_eq!(err.suggestion(), Some("remove the extra ')'"));
    }

    #[test]
    fn missing_operator() {
        let err = parse("2 3").unwrap_err();
        assert!(matches!(err, FormulaError::Syntax { position: Some(2), .. }));
    }

    #[test]
    fn assignment_forms_are_rejected() {
        assert_eq!(validation_message("x = 1"), "assignment is not allowed");
        assert!(validation_message("x += 1").contains("augmented assignment"));
        assert!(validation_message("(y := 2)").contains(":="));
        let err = parse("x = 1").unwrap_err();
        assert_eq!(err.suggestion(), Some("use == to compare values"));
    }

    #[test]
    fn statement_keywords_are_rejected() {
        for source in [
            "import os",
            "lambda x: x",
            "yield 1",
            "await x",
            "x if y else raise",
            "del x",
        ] {
            assert!(
                matches!(parse(source), Err(FormulaError::Validation { .. })),
                "{source} should be rejected"
            );
        }
    }

    #[test]
    fn comprehensions_and_dicts_are_rejected() {
        assert_eq!(
            validation_message("[x for x in y]"),
            "comprehensions are not allowed"
        );
        assert_eq!(
            validation_message("sum(x for x in y)"),
            "comprehensions are not allowed"
        );
        assert_eq!(
            validation_message("{'a': 1}"),
            "dict and set literals are not allowed"
        );
    }

    #[test]
    fn fstrings_and_bitwise_are_rejected() {
        assert_eq!(validation_message("f'{x}'"), "f-strings are not allowed");
        assert!(validation_message("a & b").contains("bitwise"));
        assert!(validation_message("~a").contains("bitwise"));
        assert!(validation_message("a in b").contains("membership"));
    }

    #[test]
    fn nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        let err = parse_tokens(&tokenize(&deep).unwrap(), 10).unwrap_err();
        assert!(err.to_string().contains("maximum depth of 10"));
        assert!(parse_tokens(&tokenize(&deep).unwrap(), 100).is_ok());
    }

    #[test]
    fn long_flat_chains_count_toward_depth() {
        let chain = vec!["1"; 50].join(" + ");
        assert!(parse_tokens(&tokenize(&chain).unwrap(), 20).is_err());
        assert!(parse_tokens(&tokenize(&chain).unwrap(), 100).is_ok());
    }
}
