//! A small expression evaluator injected into the engine for tests. The
//! engine consumes evaluation as an interface and never parses expression
//! text; this implementation covers integer and string literals, record
//! field and context variable references, arithmetic, comparisons and
//! boolean connectives.

use bitplate::result::{Error, Result};
use bitplate::{EvaluationContext, Evaluator, Record, Value, ValueType};

#[derive(Debug)]
pub struct SimpleEvaluator;

impl Evaluator for SimpleEvaluator {
    fn evaluate(
        &self,
        expr: &str,
        record: Option<&Record>,
        context: &EvaluationContext,
        want: ValueType,
    ) -> Result<Value> {
        let mut parser = ExprParser {
            src: expr.as_bytes(),
            pos: 0,
            record,
            context,
        };
        let value = parser.parse_or()?;
        parser.skip_ws();
        if parser.pos != parser.src.len() {
            return Err(parser.fail("trailing input"));
        }
        Ok(value.clone().coerce(want).unwrap_or(value))
    }
}

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
    record: Option<&'a Record>,
    context: &'a EvaluationContext,
}

impl<'a> ExprParser<'a> {
    fn fail(&self, reason: &str) -> Error {
        Error::Evaluation {
            expr: String::from_utf8_lossy(self.src).into_owned(),
            reason: reason.to_owned(),
        }
    }

    fn skip_ws(&mut self) {
        while self.src.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(token.as_bytes()) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn parse_or(&mut self) -> Result<Value> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            let right = self.parse_and()?;
            left = Value::Bool(left.as_bool()? || right.as_bool()?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value> {
        let mut left = self.parse_cmp()?;
        while self.eat("&&") {
            let right = self.parse_cmp()?;
            left = Value::Bool(left.as_bool()? && right.as_bool()?);
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Value> {
        let left = self.parse_add()?;
        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if self.eat(op) {
                let right = self.parse_add()?;
                return compare(op, &left, &right);
            }
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Value> {
        let mut left = self.parse_mul()?;
        loop {
            if self.eat("+") {
                let right = self.parse_mul()?;
                left = Value::I64(left.as_i64()? + right.as_i64()?);
            } else if self.eat("-") {
                let right = self.parse_mul()?;
                left = Value::I64(left.as_i64()? - right.as_i64()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_mul(&mut self) -> Result<Value> {
        let mut left = self.parse_atom()?;
        while self.eat("*") {
            let right = self.parse_atom()?;
            left = Value::I64(left.as_i64()? * right.as_i64()?);
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if !self.eat(")") {
                    return Err(self.fail("missing closing parenthesis"));
                }
                Ok(inner)
            }
            Some(b'!') => {
                self.pos += 1;
                let inner = self.parse_atom()?;
                Ok(Value::Bool(!inner.as_bool()?))
            }
            Some(b'-') => {
                self.pos += 1;
                let inner = self.parse_atom()?;
                Ok(Value::I64(-inner.as_i64()?))
            }
            Some(b'\'') => self.parse_quoted(),
            Some(b'0'..=b'9') => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' || c == b'#' => self.parse_name(),
            _ => Err(self.fail("unexpected token")),
        }
    }

    fn parse_quoted(&mut self) -> Result<Value> {
        self.pos += 1;
        let start = self.pos;
        while let Some(&c) = self.src.get(self.pos) {
            if c == b'\'' {
                let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(Value::Str(text));
            }
            self.pos += 1;
        }
        Err(self.fail("unterminated string literal"))
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.src[self.pos..].starts_with(b"0x") {
            self.pos += 2;
            while matches!(self.src.get(self.pos), Some(c) if c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[start + 2..self.pos]).unwrap();
            let value =
                i64::from_str_radix(text, 16).map_err(|_| self.fail("invalid hex literal"))?;
            return Ok(Value::I64(value));
        }
        while matches!(self.src.get(self.pos), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        let value = text.parse().map_err(|_| self.fail("invalid integer"))?;
        Ok(Value::I64(value))
    }

    fn parse_name(&mut self) -> Result<Value> {
        let context_only = self.src[self.pos] == b'#';
        if context_only {
            self.pos += 1;
        }
        let start = self.pos;
        while matches!(self.src.get(self.pos), Some(c) if c.is_ascii_alphanumeric() || *c == b'_')
        {
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match name {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if !context_only {
            if let Some(value) = self.record.and_then(|r| r.get(name)) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.context.get(name) {
            return Ok(value.clone());
        }
        Err(self.fail(&format!("unknown name '{name}'")))
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<Value> {
    if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
        return Ok(Value::Bool(match op {
            "==" => l == r,
            "!=" => l != r,
            _ => return Err(Error::Evaluation {
                expr: format!("{l} {op} {r}"),
                reason: "strings only compare for equality".to_owned(),
            }),
        }));
    }
    let l = left.as_i64()?;
    let r = right.as_i64()?;
    Ok(Value::Bool(match op {
        "==" => l == r,
        "!=" => l != r,
        "<=" => l <= r,
        ">=" => l >= r,
        "<" => l < r,
        ">" => l > r,
        _ => unreachable!(),
    }))
}
