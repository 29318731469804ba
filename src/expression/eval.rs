//! Expression evaluation against documents.
//!
//! Evaluation is total over well-formed trees except for the documented
//! failure cases (division or modulo by zero, sqrt/log domain errors,
//! string compared with a non-string). The filter layer treats any
//! failure as a non-match, so degraded data yields degraded results
//! rather than failed queries.

use crate::document::Document;
use crate::error::{AcaciaError, Result};
use crate::expression::{BinaryOp, DataType, Expr, ExprValue, Function, UnaryOp};

impl Expr {
    /// Evaluate this expression against a document.
    ///
    /// A field access on a missing path yields the declared type's zero
    /// value rather than an error.
    pub fn evaluate(&self, doc: &Document) -> Result<ExprValue> {
        match self {
            Expr::Const { value, .. } => Ok(value.clone()),
            Expr::Field { path, dtype } => {
                Ok(doc.get_field(path).unwrap_or_else(|| dtype.zero_value()))
            }
            Expr::Binary {
                op,
                result_type,
                left,
                right,
            } => {
                let l = left.evaluate(doc)?;
                let r = right.evaluate(doc)?;
                eval_binary(*op, *result_type, l, r)
            }
            Expr::Unary {
                op,
                result_type,
                operand,
            } => {
                let v = operand.evaluate(doc)?;
                Ok(match op {
                    UnaryOp::Negate => {
                        if *result_type == DataType::Int64 {
                            ExprValue::Int64(v.as_i64().wrapping_neg())
                        } else {
                            ExprValue::Float64(-v.as_f64())
                        }
                    }
                    UnaryOp::Not => ExprValue::Bool(!v.truthy()),
                })
            }
            Expr::Ternary {
                condition,
                then_value,
                else_value,
                ..
            } => {
                if condition.evaluate(doc)?.truthy() {
                    then_value.evaluate(doc)
                } else {
                    else_value.evaluate(doc)
                }
            }
            Expr::Function {
                function,
                result_type,
                args,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(doc)?);
                }
                eval_function(*function, *result_type, &values)
            }
        }
    }
}

/// Evaluate an expression against an ordered sequence of documents.
///
/// Element-wise equivalent to calling [`Expr::evaluate`] per document;
/// a failure on one document does not affect the others.
pub fn evaluate_batch(expr: &Expr, docs: &[Document]) -> Vec<Result<ExprValue>> {
    docs.iter().map(|doc| expr.evaluate(doc)).collect()
}

fn eval_binary(
    op: BinaryOp,
    result_type: DataType,
    l: ExprValue,
    r: ExprValue,
) -> Result<ExprValue> {
    match op {
        BinaryOp::Add => Ok(arith(result_type, &l, &r, i64::wrapping_add, |a, b| a + b)),
        BinaryOp::Subtract => Ok(arith(result_type, &l, &r, i64::wrapping_sub, |a, b| a - b)),
        BinaryOp::Multiply => Ok(arith(result_type, &l, &r, i64::wrapping_mul, |a, b| a * b)),
        BinaryOp::Divide => {
            if result_type == DataType::Int64 {
                let divisor = r.as_i64();
                if divisor == 0 {
                    return Err(AcaciaError::expression("division by zero"));
                }
                Ok(ExprValue::Int64(l.as_i64().wrapping_div(divisor)))
            } else {
                let divisor = r.as_f64();
                if divisor == 0.0 {
                    return Err(AcaciaError::expression("division by zero"));
                }
                Ok(ExprValue::Float64(l.as_f64() / divisor))
            }
        }
        BinaryOp::Modulo => {
            let divisor = r.as_i64();
            if divisor == 0 {
                return Err(AcaciaError::expression("modulo by zero"));
            }
            Ok(ExprValue::Int64(l.as_i64().wrapping_rem(divisor)))
        }
        BinaryOp::Power => Ok(ExprValue::Float64(l.as_f64().powf(r.as_f64()))),
        BinaryOp::Equal => Ok(ExprValue::Bool(values_equal(&l, &r)?)),
        BinaryOp::NotEqual => Ok(ExprValue::Bool(!values_equal(&l, &r)?)),
        BinaryOp::LessThan => Ok(ExprValue::Bool(l.as_f64() < r.as_f64())),
        BinaryOp::LessEqual => Ok(ExprValue::Bool(l.as_f64() <= r.as_f64())),
        BinaryOp::GreaterThan => Ok(ExprValue::Bool(l.as_f64() > r.as_f64())),
        BinaryOp::GreaterEqual => Ok(ExprValue::Bool(l.as_f64() >= r.as_f64())),
        BinaryOp::And => Ok(ExprValue::Bool(l.truthy() && r.truthy())),
        BinaryOp::Or => Ok(ExprValue::Bool(l.truthy() || r.truthy())),
    }
}

/// Arithmetic with the declared-result-type coercion: INT64 results
/// coerce operands to i64 first, everything else promotes to f64.
fn arith(
    result_type: DataType,
    l: &ExprValue,
    r: &ExprValue,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> ExprValue {
    if result_type == DataType::Int64 {
        ExprValue::Int64(int_op(l.as_i64(), r.as_i64()))
    } else {
        ExprValue::Float64(float_op(l.as_f64(), r.as_f64()))
    }
}

/// Equality: booleans compare by truthiness, strings compare byte-wise
/// against strings only, everything else compares as f64. A string
/// against a non-string is an evaluation failure, not a coercion.
fn values_equal(l: &ExprValue, r: &ExprValue) -> Result<bool> {
    match (l, r) {
        (ExprValue::Bool(_), _) | (_, ExprValue::Bool(_)) => Ok(l.truthy() == r.truthy()),
        (ExprValue::String(a), ExprValue::String(b)) => Ok(a == b),
        (ExprValue::String(_), _) | (_, ExprValue::String(_)) => Err(AcaciaError::expression(
            "cannot compare string with non-string",
        )),
        _ => Ok(l.as_f64() == r.as_f64()),
    }
}

fn eval_function(
    function: Function,
    result_type: DataType,
    args: &[ExprValue],
) -> Result<ExprValue> {
    match function {
        Function::Abs => {
            if result_type == DataType::Int64 {
                Ok(ExprValue::Int64(args[0].as_i64().wrapping_abs()))
            } else {
                Ok(ExprValue::Float64(args[0].as_f64().abs()))
            }
        }
        Function::Sqrt => {
            let v = args[0].as_f64();
            if v < 0.0 {
                return Err(AcaciaError::expression("sqrt of negative number"));
            }
            Ok(ExprValue::Float64(v.sqrt()))
        }
        Function::Min => Ok(fold_extreme(result_type, args, f64::min)),
        Function::Max => Ok(fold_extreme(result_type, args, f64::max)),
        Function::Floor => Ok(ExprValue::Int64(args[0].as_f64().floor() as i64)),
        Function::Ceil => Ok(ExprValue::Int64(args[0].as_f64().ceil() as i64)),
        Function::Round => Ok(ExprValue::Int64(args[0].as_f64().round() as i64)),
        Function::Log => {
            let v = args[0].as_f64();
            if v <= 0.0 {
                return Err(AcaciaError::expression("log of non-positive number"));
            }
            Ok(ExprValue::Float64(v.ln()))
        }
        Function::Log10 => {
            let v = args[0].as_f64();
            if v <= 0.0 {
                return Err(AcaciaError::expression("log10 of non-positive number"));
            }
            Ok(ExprValue::Float64(v.log10()))
        }
        Function::Exp => Ok(ExprValue::Float64(args[0].as_f64().exp())),
        Function::Pow => Ok(ExprValue::Float64(args[0].as_f64().powf(args[1].as_f64()))),
        Function::Sin => Ok(ExprValue::Float64(args[0].as_f64().sin())),
        Function::Cos => Ok(ExprValue::Float64(args[0].as_f64().cos())),
        Function::Tan => Ok(ExprValue::Float64(args[0].as_f64().tan())),
    }
}

fn fold_extreme(result_type: DataType, args: &[ExprValue], op: fn(f64, f64) -> f64) -> ExprValue {
    let mut acc = args[0].as_f64();
    for arg in &args[1..] {
        acc = op(acc, arg.as_f64());
    }
    if result_type == DataType::Int64 {
        ExprValue::Int64(acc as i64)
    } else {
        ExprValue::Float64(acc)
    }
}
