use crate::{
    ast::{BinOp, Expr},
    context::Scopes,
    error::{SprigError, SprigResult},
    functions::Functions,
    value::Value,
};

/// How an evaluation site treats a missing name or mapping key.
///
/// Interpolations and conditionals are lenient (missing resolves to Null, so
/// they render empty / read falsy); a `@foreach` iterable is strict because
/// the directive demands a value. Property or index access on a scalar is an
/// error in both modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    Strict,
    Lenient,
}

pub(crate) fn eval(
    expr: &Expr,
    scopes: &Scopes<'_>,
    functions: &Functions,
    mode: Mode,
) -> SprigResult<Value> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(n) => Ok(Value::Float(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),

        Expr::Var(name) => match scopes.lookup(name) {
            Some(value) => Ok(value.clone()),
            None => missing(name, mode),
        },

        Expr::Prop { base, name } => {
            let base_value = eval(base, scopes, functions, mode)?;
            access(&base_value, name, mode)
        }

        Expr::Index { base, index } => {
            let base_value = eval(base, scopes, functions, mode)?;
            let index_value = eval(index, scopes, functions, mode)?;
            match (&base_value, &index_value) {
                (Value::Sequence(items), Value::Int(i)) => {
                    let idx = usize::try_from(*i).ok();
                    match idx.and_then(|i| items.get(i)) {
                        Some(item) => Ok(item.clone()),
                        None => missing(&format!("[{}]", i), mode),
                    }
                }
                (Value::Sequence(_), other) => Err(SprigError::render(format!(
                    "sequence index must be an int, got {}",
                    other.type_name()
                ))),
                _ => {
                    let Some(key) = index_value.render() else {
                        return Err(SprigError::render(format!(
                            "cannot index with a {}",
                            index_value.type_name()
                        )));
                    };
                    access(&base_value, &key, mode)
                }
            }
        }

        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, scopes, functions, mode)?);
            }
            functions.call(name, values)
        }

        Expr::Not(inner) => {
            let value = eval(inner, scopes, functions, mode)?;
            Ok(Value::Bool(!value.is_truthy()))
        }

        Expr::Binary { op, left, right } => eval_binary(*op, left, right, scopes, functions, mode),

        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            let taken = eval(condition, scopes, functions, mode)?.is_truthy();
            if taken {
                eval(then, scopes, functions, mode)
            } else {
                eval(otherwise, scopes, functions, mode)
            }
        }
    }
}

fn eval_binary(
    op: BinOp,
    left: &Expr,
    right: &Expr,
    scopes: &Scopes<'_>,
    functions: &Functions,
    mode: Mode,
) -> SprigResult<Value> {
    // Short-circuit: the right side of &&/|| is not evaluated when the left
    // already decides the result.
    match op {
        BinOp::And => {
            let lhs = eval(left, scopes, functions, mode)?;
            if !lhs.is_truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(right, scopes, functions, mode)?.is_truthy()));
        }
        BinOp::Or => {
            let lhs = eval(left, scopes, functions, mode)?;
            if lhs.is_truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(right, scopes, functions, mode)?.is_truthy()));
        }
        _ => {}
    }

    let lhs = eval(left, scopes, functions, mode)?;
    let rhs = eval(right, scopes, functions, mode)?;
    let result = match op {
        BinOp::EqLoose => lhs.loose_eq(&rhs),
        BinOp::NeLoose => !lhs.loose_eq(&rhs),
        BinOp::EqStrict => lhs.strict_eq(&rhs),
        BinOp::NeStrict => !lhs.strict_eq(&rhs),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let Some(ordering) = lhs.compare(&rhs) else {
                return Err(SprigError::render(format!(
                    "cannot compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            };
            match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    };
    Ok(Value::Bool(result))
}

/// Key access against a mapping (or Null, which in lenient mode lets chained
/// access on a missing base fall through to Null).
fn access(base: &Value, key: &str, mode: Mode) -> SprigResult<Value> {
    match base {
        Value::Mapping(_) => match base.get(key) {
            Some(value) => Ok(value.clone()),
            None => missing(key, mode),
        },
        Value::Null => missing(key, mode),
        other => Err(SprigError::render(format!(
            "cannot access key '{}' on a {}",
            key,
            other.type_name()
        ))),
    }
}

fn missing(name: &str, mode: Mode) -> SprigResult<Value> {
    match mode {
        Mode::Lenient => Ok(Value::Null),
        Mode::Strict => Err(SprigError::undefined(name)),
    }
}
