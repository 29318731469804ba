//! Binary encoding of predicate expression trees.
//!
//! The format is self-describing and depth-first. Each node starts with
//! a one-byte tag; multi-byte integers are little-endian; strings are
//! length-prefixed (u32 LE) UTF-8. There is no framing header, so the
//! caller passes the exact slice.

use crate::error::{AcaciaError, Result};
use crate::expression::{BinaryOp, DataType, Expr, ExprValue, Function, UnaryOp};

// Node tags. Zero is reserved by the producer for "unknown".
const TAG_CONST: u8 = 1;
const TAG_FIELD: u8 = 2;
const TAG_BINARY: u8 = 3;
const TAG_UNARY: u8 = 4;
const TAG_TERNARY: u8 = 5;
const TAG_FUNCTION: u8 = 6;

/// Decode an expression tree from its binary form.
///
/// Fails on unknown tags, truncated buffers, invalid UTF-8, bad function
/// arity, and trailing bytes. Never panics on malformed input.
pub fn decode(bytes: &[u8]) -> Result<Expr> {
    if bytes.is_empty() {
        return Err(AcaciaError::expression("empty expression buffer"));
    }

    let mut reader = Reader { buf: bytes, pos: 0 };
    let expr = decode_node(&mut reader)?;

    if reader.pos != bytes.len() {
        return Err(AcaciaError::expression(format!(
            "trailing bytes after expression: {} of {} consumed",
            reader.pos,
            bytes.len()
        )));
    }

    Ok(expr)
}

/// Encode an expression tree to its binary form.
///
/// `decode(&encode(expr))` reconstructs a structurally equal tree.
pub fn encode(expr: &Expr) -> Vec<u8> {
    let mut out = Vec::new();
    encode_node(expr, &mut out);
    out
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| AcaciaError::expression("unexpected end of expression buffer"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(AcaciaError::expression(
                "unexpected end of expression buffer",
            ));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.read_bytes(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| AcaciaError::expression("invalid UTF-8 in expression string"))
    }
}

fn decode_node(reader: &mut Reader<'_>) -> Result<Expr> {
    let tag = reader.read_u8()?;

    match tag {
        TAG_CONST => {
            let dtype = decode_data_type(reader.read_u8()?)?;
            let value = match dtype {
                DataType::Bool => ExprValue::Bool(reader.read_u8()? != 0),
                DataType::Int64 => ExprValue::Int64(reader.read_i64()?),
                DataType::Float64 => ExprValue::Float64(reader.read_f64()?),
                DataType::String => ExprValue::String(reader.read_string()?),
            };
            Ok(Expr::Const { value, dtype })
        }
        TAG_FIELD => {
            let dtype = decode_data_type(reader.read_u8()?)?;
            let path = reader.read_string()?;
            Ok(Expr::Field { path, dtype })
        }
        TAG_BINARY => {
            let op = decode_binary_op(reader.read_u8()?)?;
            let result_type = decode_data_type(reader.read_u8()?)?;
            let left = Box::new(decode_node(reader)?);
            let right = Box::new(decode_node(reader)?);
            Ok(Expr::Binary {
                op,
                result_type,
                left,
                right,
            })
        }
        TAG_UNARY => {
            let op = decode_unary_op(reader.read_u8()?)?;
            let result_type = decode_data_type(reader.read_u8()?)?;
            let operand = Box::new(decode_node(reader)?);
            Ok(Expr::Unary {
                op,
                result_type,
                operand,
            })
        }
        TAG_TERNARY => {
            let result_type = decode_data_type(reader.read_u8()?)?;
            let condition = Box::new(decode_node(reader)?);
            let then_value = Box::new(decode_node(reader)?);
            let else_value = Box::new(decode_node(reader)?);
            Ok(Expr::Ternary {
                result_type,
                condition,
                then_value,
                else_value,
            })
        }
        TAG_FUNCTION => {
            let function = decode_function(reader.read_u8()?)?;
            let result_type = decode_data_type(reader.read_u8()?)?;
            let arg_count = reader.read_u32()? as usize;

            // Each argument occupies at least one byte, so an argument
            // count beyond the remaining buffer is malformed.
            if arg_count > reader.remaining() {
                return Err(AcaciaError::expression("argument count exceeds buffer"));
            }
            check_arity(function, arg_count)?;

            let mut args = Vec::with_capacity(arg_count);
            for _ in 0..arg_count {
                args.push(decode_node(reader)?);
            }
            Ok(Expr::Function {
                function,
                result_type,
                args,
            })
        }
        other => Err(AcaciaError::expression(format!(
            "unknown expression tag: {other}"
        ))),
    }
}

fn check_arity(function: Function, arg_count: usize) -> Result<()> {
    match function.arity() {
        None if arg_count == 0 => Err(AcaciaError::expression(format!(
            "{function:?} requires at least one argument"
        ))),
        Some(expected) if arg_count != expected => Err(AcaciaError::expression(format!(
            "{function:?} expects {expected} arguments, got {arg_count}"
        ))),
        _ => Ok(()),
    }
}

fn decode_data_type(byte: u8) -> Result<DataType> {
    match byte {
        1 => Ok(DataType::Bool),
        2 => Ok(DataType::Int64),
        3 => Ok(DataType::Float64),
        4 => Ok(DataType::String),
        other => Err(AcaciaError::expression(format!(
            "unknown data type: {other}"
        ))),
    }
}

fn decode_binary_op(byte: u8) -> Result<BinaryOp> {
    match byte {
        1 => Ok(BinaryOp::Add),
        2 => Ok(BinaryOp::Subtract),
        3 => Ok(BinaryOp::Multiply),
        4 => Ok(BinaryOp::Divide),
        5 => Ok(BinaryOp::Modulo),
        6 => Ok(BinaryOp::Power),
        7 => Ok(BinaryOp::Equal),
        8 => Ok(BinaryOp::NotEqual),
        9 => Ok(BinaryOp::LessThan),
        10 => Ok(BinaryOp::LessEqual),
        11 => Ok(BinaryOp::GreaterThan),
        12 => Ok(BinaryOp::GreaterEqual),
        13 => Ok(BinaryOp::And),
        14 => Ok(BinaryOp::Or),
        other => Err(AcaciaError::expression(format!(
            "unknown binary operator: {other}"
        ))),
    }
}

fn decode_unary_op(byte: u8) -> Result<UnaryOp> {
    match byte {
        0 => Ok(UnaryOp::Negate),
        1 => Ok(UnaryOp::Not),
        other => Err(AcaciaError::expression(format!(
            "unknown unary operator: {other}"
        ))),
    }
}

fn decode_function(byte: u8) -> Result<Function> {
    match byte {
        1 => Ok(Function::Abs),
        2 => Ok(Function::Sqrt),
        3 => Ok(Function::Min),
        4 => Ok(Function::Max),
        5 => Ok(Function::Floor),
        6 => Ok(Function::Ceil),
        7 => Ok(Function::Round),
        8 => Ok(Function::Log),
        9 => Ok(Function::Log10),
        10 => Ok(Function::Exp),
        11 => Ok(Function::Pow),
        12 => Ok(Function::Sin),
        13 => Ok(Function::Cos),
        14 => Ok(Function::Tan),
        other => Err(AcaciaError::expression(format!(
            "unknown function: {other}"
        ))),
    }
}

fn encode_node(expr: &Expr, out: &mut Vec<u8>) {
    match expr {
        Expr::Const { value, dtype } => {
            out.push(TAG_CONST);
            out.push(encode_data_type(*dtype));
            match value {
                ExprValue::Bool(b) => out.push(u8::from(*b)),
                ExprValue::Int64(i) => out.extend_from_slice(&i.to_le_bytes()),
                ExprValue::Float64(f) => out.extend_from_slice(&f.to_le_bytes()),
                ExprValue::String(s) => encode_string(s, out),
            }
        }
        Expr::Field { path, dtype } => {
            out.push(TAG_FIELD);
            out.push(encode_data_type(*dtype));
            encode_string(path, out);
        }
        Expr::Binary {
            op,
            result_type,
            left,
            right,
        } => {
            out.push(TAG_BINARY);
            out.push(encode_binary_op(*op));
            out.push(encode_data_type(*result_type));
            encode_node(left, out);
            encode_node(right, out);
        }
        Expr::Unary {
            op,
            result_type,
            operand,
        } => {
            out.push(TAG_UNARY);
            out.push(match op {
                UnaryOp::Negate => 0,
                UnaryOp::Not => 1,
            });
            out.push(encode_data_type(*result_type));
            encode_node(operand, out);
        }
        Expr::Ternary {
            result_type,
            condition,
            then_value,
            else_value,
        } => {
            out.push(TAG_TERNARY);
            out.push(encode_data_type(*result_type));
            encode_node(condition, out);
            encode_node(then_value, out);
            encode_node(else_value, out);
        }
        Expr::Function {
            function,
            result_type,
            args,
        } => {
            out.push(TAG_FUNCTION);
            out.push(encode_function(*function));
            out.push(encode_data_type(*result_type));
            out.extend_from_slice(&(args.len() as u32).to_le_bytes());
            for arg in args {
                encode_node(arg, out);
            }
        }
    }
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn encode_data_type(dtype: DataType) -> u8 {
    match dtype {
        DataType::Bool => 1,
        DataType::Int64 => 2,
        DataType::Float64 => 3,
        DataType::String => 4,
    }
}

fn encode_binary_op(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => 1,
        BinaryOp::Subtract => 2,
        BinaryOp::Multiply => 3,
        BinaryOp::Divide => 4,
        BinaryOp::Modulo => 5,
        BinaryOp::Power => 6,
        BinaryOp::Equal => 7,
        BinaryOp::NotEqual => 8,
        BinaryOp::LessThan => 9,
        BinaryOp::LessEqual => 10,
        BinaryOp::GreaterThan => 11,
        BinaryOp::GreaterEqual => 12,
        BinaryOp::And => 13,
        BinaryOp::Or => 14,
    }
}

fn encode_function(function: Function) -> u8 {
    match function {
        Function::Abs => 1,
        Function::Sqrt => 2,
        Function::Min => 3,
        Function::Max => 4,
        Function::Floor => 5,
        Function::Ceil => 6,
        Function::Round => 7,
        Function::Log => 8,
        Function::Log10 => 9,
        Function::Exp => 10,
        Function::Pow => 11,
        Function::Sin => 12,
        Function::Cos => 13,
        Function::Tan => 14,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn const_i64(v: i64) -> Expr {
        Expr::Const {
            value: ExprValue::Int64(v),
            dtype: DataType::Int64,
        }
    }

    fn field_f64(path: &str) -> Expr {
        Expr::Field {
            path: path.to_string(),
            dtype: DataType::Float64,
        }
    }

    #[test]
    fn test_round_trip_const() {
        for expr in [
            Expr::Const {
                value: ExprValue::Bool(true),
                dtype: DataType::Bool,
            },
            const_i64(-42),
            Expr::Const {
                value: ExprValue::Float64(3.25),
                dtype: DataType::Float64,
            },
            Expr::Const {
                value: ExprValue::String("hello".to_string()),
                dtype: DataType::String,
            },
        ] {
            let bytes = encode(&expr);
            assert_eq!(decode(&bytes).unwrap(), expr);
        }
    }

    #[test]
    fn test_round_trip_nested() {
        // (price >= 20 && price <= 40) ? 1 : min(price, 10, 0)
        let cmp = |op, rhs| Expr::Binary {
            op,
            result_type: DataType::Bool,
            left: Box::new(field_f64("price")),
            right: Box::new(const_i64(rhs)),
        };
        let expr = Expr::Ternary {
            result_type: DataType::Int64,
            condition: Box::new(Expr::Binary {
                op: BinaryOp::And,
                result_type: DataType::Bool,
                left: Box::new(cmp(BinaryOp::GreaterEqual, 20)),
                right: Box::new(cmp(BinaryOp::LessEqual, 40)),
            }),
            then_value: Box::new(const_i64(1)),
            else_value: Box::new(Expr::Function {
                function: Function::Min,
                result_type: DataType::Int64,
                args: vec![field_f64("price"), const_i64(10), const_i64(0)],
            }),
        };

        let bytes = encode(&expr);
        assert_eq!(decode(&bytes).unwrap(), expr);
    }

    #[test]
    fn test_round_trip_unary() {
        let expr = Expr::Unary {
            op: UnaryOp::Not,
            result_type: DataType::Bool,
            operand: Box::new(Expr::Field {
                path: "active".to_string(),
                dtype: DataType::Bool,
            }),
        };
        assert_eq!(decode(&encode(&expr)).unwrap(), expr);
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert!(decode(&[0]).is_err());
        assert!(decode(&[99]).is_err());
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = encode(&const_i64(7));
        for len in 0..bytes.len() {
            assert!(decode(&bytes[..len]).is_err(), "len {len} should fail");
        }
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = encode(&const_i64(7));
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_bad_arity() {
        // pow with a single argument.
        let expr = Expr::Function {
            function: Function::Pow,
            result_type: DataType::Float64,
            args: vec![const_i64(2), const_i64(3)],
        };
        let mut bytes = encode(&expr);
        // Patch the argument count down to 1: tag, func, dtype, then u32.
        bytes[3] = 1;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_oversized_arg_count() {
        let expr = Expr::Function {
            function: Function::Min,
            result_type: DataType::Float64,
            args: vec![const_i64(1)],
        };
        let mut bytes = encode(&expr);
        bytes[3..7].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_invalid_utf8_string() {
        let mut bytes = vec![TAG_FIELD, 4];
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0xff, 0xfe]);
        assert!(decode(&bytes).is_err());
    }
}
