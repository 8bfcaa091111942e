use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

/// Comparison operators supported in formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// A validated formula tree.
///
/// Every variant is a construct the formula language explicitly allows; the
/// parser only produces an `Expr` after its whitelist walk succeeds, so there
/// is no variant for method calls, assignment, comprehensions or any other
/// rejected construct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    /// `object.attr`, where `object` is a variable or another attribute.
    Attribute {
        object: Box<Expr>,
        attr: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `first op1 e1 op2 e2 ...`, evaluated pairwise with short-circuit.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    /// `then if test else otherwise`
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    /// The dotted field path for a variable or attribute chain
    /// (`cpu.cores`), or `None` for any other node.
    #[must_use]
    pub fn dotted_path(&self) -> Option<String> {
        match self {
            Expr::Variable(name) => Some(name.clone()),
            Expr::Attribute { object, attr } => {
                let mut path = object.dotted_path()?;
                path.push('.');
                path.push_str(attr);
                Some(path)
            }
            _ => None,
        }
    }

    /// Height of the tree; a lone literal or variable has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Expr::depth)
            .max()
            .unwrap_or(0)
    }

    /// Direct children in source order.
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Variable(_) => Vec::new(),
            Expr::Attribute { object, .. } => vec![object.as_ref()],
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::Unary { operand, .. } => vec![operand.as_ref()],
            Expr::Compare { first, rest } => {
                let mut out: Vec<&Expr> = vec![first.as_ref()];
                out.extend(rest.iter().map(|(_, e)| e));
                out
            }
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => vec![then.as_ref(), test.as_ref(), otherwise.as_ref()],
            Expr::List(items) | Expr::Tuple(items) => items.iter().collect(),
            Expr::Subscript { object, index } => vec![object.as_ref(), index.as_ref()],
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        };
        f.write_str(symbol)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Pos => write!(f, "+"),
            UnaryOp::Not => write!(f, "not "),
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "and"),
            LogicalOp::Or => write!(f, "or"),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Fully parenthesized source form.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Null) => write!(f, "None"),
            Expr::Literal(Value::Bool(true)) => write!(f, "True"),
            Expr::Literal(Value::Bool(false)) => write!(f, "False"),
            Expr::Literal(Value::Float(v)) if v.fract() == 0.0 && v.is_finite() => {
                write!(f, "{v:.1}")
            }
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Attribute { object, attr } => write!(f, "{object}.{attr}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Unary { op, operand } => write!(f, "({op}{operand})"),
            Expr::Compare { first, rest } => {
                write!(f, "({first}")?;
                for (op, e) in rest {
                    write!(f, " {op} {e}")?;
                }
                write!(f, ")")
            }
            Expr::Logical { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Call { function, args } => {
                write!(f, "{function}(")?;
                write_items(f, args)?;
                write!(f, ")")
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => write!(f, "({then} if {test} else {otherwise})"),
            Expr::List(items) => {
                write!(f, "[")?;
                write_items(f, items)?;
                write!(f, "]")
            }
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::Subscript { object, index } => write!(f, "{object}[{index}]"),
        }
    }
}
