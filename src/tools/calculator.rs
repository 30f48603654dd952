//! Arithmetic expression evaluation.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Tool;

/// Deepest nesting of parentheses, signs and exponents accepted.
const MAX_DEPTH: usize = 256;

/// Evaluate an arithmetic expression.
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform mathematical calculations. Supports + - * / % ^, parentheses and decimals."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate (e.g., '2 + 2', '10 * (5 + 3)')"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let expression = args["expression"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'expression' argument"))?;

        let value = evaluate(expression)?;
        Ok(format_number(value))
    }
}

/// Evaluate `input` with the usual precedence; `^` is right-associative.
pub fn evaluate(input: &str) -> anyhow::Result<f64> {
    let mut parser = Parser {
        chars: input.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };
    if parser.chars.is_empty() {
        anyhow::bail!("Empty expression");
    }
    let value = parser.expr()?;
    if let Some(c) = parser.peek() {
        anyhow::bail!("Unexpected '{}' at position {}", c, parser.pos);
    }
    if !value.is_finite() {
        anyhow::bail!("Result is not a finite number");
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> anyhow::Result<f64> {
        let mut acc = self.term()?;
        loop {
            if self.eat('+') {
                acc += self.term()?;
            } else if self.eat('-') {
                acc -= self.term()?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> anyhow::Result<f64> {
        let mut acc = self.unary()?;
        loop {
            if self.eat('*') {
                acc *= self.unary()?;
            } else if self.eat('/') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    anyhow::bail!("Division by zero");
                }
                acc /= rhs;
            } else if self.eat('%') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    anyhow::bail!("Modulo by zero");
                }
                acc %= rhs;
            } else {
                return Ok(acc);
            }
        }
    }

    /// Every recursive path passes through here.
    fn unary(&mut self) -> anyhow::Result<f64> {
        if self.depth >= MAX_DEPTH {
            anyhow::bail!("Expression nested too deeply");
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> anyhow::Result<f64> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> anyhow::Result<f64> {
        let base = self.atom()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> anyhow::Result<f64> {
        if self.eat('(') {
            let value = self.expr()?;
            if !self.eat(')') {
                anyhow::bail!("Missing closing parenthesis");
            }
            return Ok(value);
        }

        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if start == self.pos {
            return match self.peek() {
                Some(c) => Err(anyhow::anyhow!("Unexpected '{}' at position {}", c, self.pos)),
                None => Err(anyhow::anyhow!("Unexpected end of expression")),
            };
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("Invalid number: {}", literal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("10 * 5 + 3").unwrap(), 53.0);
        assert_eq!(evaluate("10 * (5 + 3)").unwrap(), 80.0);
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0);
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
        assert_eq!(evaluate("7 % 4").unwrap(), 3.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("").is_err());
        assert!(evaluate("1/0").is_err());
        assert!(evaluate("(1+2").is_err());
        assert!(evaluate("2 + x").is_err());
        assert!(evaluate("1.2.3").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(30_000), ")".repeat(30_000));
        let err = evaluate(&parens).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));

        let signs = format!("{}1", "-".repeat(60_000));
        assert!(evaluate(&signs).is_err());

        let powers = vec!["2"; 20_000].join("^");
        assert!(evaluate(&powers).is_err());
    }

    #[test]
    fn test_moderate_nesting_is_fine() {
        let parens = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(evaluate(&parens).unwrap(), 1.0);
        assert_eq!(evaluate("--1").unwrap(), 1.0);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_tool_requires_expression() {
        let out = tokio_test::block_on(Calculator.execute(json!({"expression": "2+2"})));
        assert_eq!(out.unwrap(), "4");
        assert!(tokio_test::block_on(Calculator.execute(json!({}))).is_err());
    }
}
