//! Whitelist walk from the raw parse tree to a validated [`Expr`].

use crate::types::Expr;

use super::FormulaError;
use super::functions;
use super::parser::{Raw, RawArg, RawKind};

fn allowed_functions() -> String {
    format!("allowed functions: {}", functions::names().join(", "))
}

fn reject_dunder(name: &str, position: usize, what: &str) -> Result<(), FormulaError> {
    if name.starts_with("__") {
        return Err(FormulaError::validation(
            format!("{what} starting with '__' are not allowed: '{name}'"),
            position,
        ));
    }
    Ok(())
}

/// Convert a raw tree into an [`Expr`], rejecting every construct outside
/// the formula language.
pub(crate) fn lower(raw: Raw) -> Result<Expr, FormulaError> {
    let position = raw.position;
    Ok(match raw.kind {
        RawKind::Literal(v) => Expr::Literal(v),
        RawKind::Name(name) => {
            reject_dunder(&name, position, "names")?;
            Expr::Variable(name)
        }
        RawKind::Attribute { object, attr } => {
            reject_dunder(&attr, position, "attributes")?;
            let object = lower(*object)?;
            if object.dotted_path().is_none() {
                return Err(FormulaError::validation(
                    format!("attribute '{attr}' can only be read from a field path"),
                    position,
                )
                .with_suggestion("reference nested fields directly, e.g. cpu.cores"));
            }
            Expr::Attribute {
                object: Box::new(object),
                attr,
            }
        }
        RawKind::Binary { op, left, right } => Expr::Binary {
            op,
            left: Box::new(lower(*left)?),
            right: Box::new(lower(*right)?),
        },
        RawKind::Unary { op, operand } => Expr::Unary {
            op,
            operand: Box::new(lower(*operand)?),
        },
        RawKind::Compare { first, rest } => Expr::Compare {
            first: Box::new(lower(*first)?),
            rest: rest
                .into_iter()
                .map(|(op, e)| Ok((op, lower(e)?)))
                .collect::<Result<_, FormulaError>>()?,
        },
        RawKind::Logical { op, left, right } => Expr::Logical {
            op,
            left: Box::new(lower(*left)?),
            right: Box::new(lower(*right)?),
        },
        RawKind::Call { callee, args } => lower_call(*callee, args, position)?,
        RawKind::Conditional {
            test,
            then,
            otherwise,
        } => Expr::Conditional {
            test: Box::new(lower(*test)?),
            then: Box::new(lower(*then)?),
            otherwise: Box::new(lower(*otherwise)?),
        },
        RawKind::List(items) => Expr::List(lower_all(items)?),
        RawKind::Tuple(items) => Expr::Tuple(lower_all(items)?),
        RawKind::Subscript { object, index } => Expr::Subscript {
            object: Box::new(lower(*object)?),
            index: Box::new(lower(*index)?),
        },
    })
}

fn lower_all(items: Vec<Raw>) -> Result<Vec<Expr>, FormulaError> {
    items.into_iter().map(lower).collect()
}

fn lower_call(callee: Raw, args: Vec<RawArg>, position: usize) -> Result<Expr, FormulaError> {
    let name = match callee.kind {
        RawKind::Name(name) => name,
        RawKind::Attribute { attr, .. } => {
            return Err(FormulaError::validation(
                format!("method calls are not allowed: '.{attr}()'"),
                position,
            )
            .with_suggestion(allowed_functions()));
        }
        _ => {
            return Err(FormulaError::validation(
                "only named functions can be called",
                position,
            )
            .with_suggestion(allowed_functions()));
        }
    };
    reject_dunder(&name, position, "names")?;

    let Some(function) = functions::lookup(&name) else {
        return Err(FormulaError::validation(
            format!("function '{name}' is not allowed"),
            position,
        )
        .with_suggestion(allowed_functions()));
    };

    let mut lowered = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            RawArg::Positional(raw) => lowered.push(lower(raw)?),
            RawArg::Keyword {
                name: keyword,
                position,
            } => {
                return Err(FormulaError::validation(
                    format!("keyword arguments are not supported: '{keyword}='"),
                    position,
                )
                .with_suggestion(format!("pass '{keyword}' positionally")));
            }
            RawArg::Starred { position } => {
                return Err(FormulaError::validation(
                    "argument unpacking is not allowed",
                    position,
                )
                .with_suggestion("pass a list as a single argument instead"));
            }
        }
    }

    if !function.accepts(lowered.len()) {
        return Err(FormulaError::validation(
            format!(
                "{name}() takes {}, got {}",
                function.arity(),
                lowered.len()
            ),
            position,
        ));
    }

    Ok(Expr::Call {
        function: name,
        args: lowered,
    })
}
