//! Single-string tools for the ReAct agent.
//!
//! The agent passes the raw `Action Input:` text as `{"input": "..."}`.

use futures::future::BoxFuture;
use serde::Deserialize;

use weft_core::error::{Result, WeftError};
use weft_core::traits::Tool;
use weft_core::types::{ToolContext, ToolResult};

use super::parse_input;

#[derive(Deserialize)]
struct StringInput {
    #[serde(default)]
    input: String,
}

fn string_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": { "input": { "type": "string", "description": description } },
        "required": ["input"]
    })
}

// ── CalculatorTool ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl std::fmt::Display for Num {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Num::Int(i) => write!(f, "{}", i),
            Num::Float(x) => write!(f, "{:?}", x),
        }
    }
}

/// Recursive-descent evaluator for `+ - * / // % **` and parentheses.
///
/// Integer arithmetic stays integral; `/` always yields a float.
struct Calc<'a> {
    src: &'a [u8],
    pos: usize,
}

type CalcResult = std::result::Result<Num, String>;

impl<'a> Calc<'a> {
    fn eval(expr: &'a str) -> CalcResult {
        let mut calc = Calc {
            src: expr.as_bytes(),
            pos: 0,
        };
        let value = calc.expr()?;
        calc.skip_ws();
        if calc.pos < calc.src.len() {
            return Err(format!("unexpected '{}'", calc.src[calc.pos] as char));
        }
        Ok(value)
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
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

    fn expr(&mut self) -> CalcResult {
        let mut acc = self.term()?;
        loop {
            if self.eat("+") {
                acc = arith(acc, self.term()?, '+')?;
            } else if self.eat("-") {
                acc = arith(acc, self.term()?, '-')?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> CalcResult {
        let mut acc = self.unary()?;
        loop {
            // `//` must be tried before `/`
            if self.eat("//") {
                acc = arith(acc, self.unary()?, 'f')?;
            } else if self.eat("*") {
                acc = arith(acc, self.unary()?, '*')?;
            } else if self.eat("/") {
                acc = arith(acc, self.unary()?, '/')?;
            } else if self.eat("%") {
                acc = arith(acc, self.unary()?, '%')?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn unary(&mut self) -> CalcResult {
        if self.eat("-") {
            return match self.unary()? {
                Num::Int(i) => i.checked_neg().map(Num::Int).ok_or_else(|| "integer overflow".to_string()),
                Num::Float(f) => Ok(Num::Float(-f)),
            };
        }
        if self.eat("+") {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> CalcResult {
        let base = self.atom()?;
        if self.eat("**") {
            // right-associative, binds tighter than unary minus on the left
            let exp = self.unary()?;
            return arith(base, exp, '^');
        }
        Ok(base)
    }

    fn atom(&mut self) -> CalcResult {
        if self.eat("(") {
            let value = self.expr()?;
            if !self.eat(")") {
                return Err("missing ')'".into());
            }
            return Ok(value);
        }
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.src.len()
            && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let literal = std::str::from_utf8(&self.src[start..self.pos]).map_err(|e| e.to_string())?;
        if literal.is_empty() {
            return Err(match self.src.get(self.pos) {
                Some(c) => format!("unexpected '{}'", *c as char),
                None => "unexpected end of expression".into(),
            });
        }
        if literal.contains('.') {
            literal
                .parse::<f64>()
                .map(Num::Float)
                .map_err(|_| format!("invalid number '{}'", literal))
        } else {
            literal
                .parse::<i64>()
                .map(Num::Int)
                .map_err(|_| format!("invalid number '{}'", literal))
        }
    }
}

fn arith(a: Num, b: Num, op: char) -> CalcResult {
    if matches!(op, '/' | 'f' | '%') && b.as_f64() == 0.0 {
        return Err("division by zero".into());
    }
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            let overflow = || "integer overflow".to_string();
            match op {
                '+' => x.checked_add(y).map(Num::Int).ok_or_else(overflow),
                '-' => x.checked_sub(y).map(Num::Int).ok_or_else(overflow),
                '*' => x.checked_mul(y).map(Num::Int).ok_or_else(overflow),
                '/' => Ok(Num::Float(x as f64 / y as f64)),
                // Floor semantics: the remainder takes the divisor's sign.
                'f' => {
                    let q = x.checked_div(y).ok_or_else(overflow)?;
                    let r = x.wrapping_rem(y);
                    Ok(Num::Int(if r != 0 && (r < 0) != (y < 0) { q - 1 } else { q }))
                }
                '%' => {
                    let r = x.wrapping_rem(y);
                    if r != 0 && (r < 0) != (y < 0) {
                        r.checked_add(y).map(Num::Int).ok_or_else(overflow)
                    } else {
                        Ok(Num::Int(r))
                    }
                }
                '^' if y >= 0 => u32::try_from(y)
                    .ok()
                    .and_then(|e| x.checked_pow(e))
                    .map(Num::Int)
                    .ok_or_else(overflow),
                '^' => Ok(Num::Float((x as f64).powf(y as f64))),
                _ => Err(format!("unknown operator '{}'", op)),
            }
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let v = match op {
                '+' => x + y,
                '-' => x - y,
                '*' => x * y,
                '/' => x / y,
                'f' => (x / y).floor(),
                '%' => x - y * (x / y).floor(),
                '^' => x.powf(y),
                _ => return Err(format!("unknown operator '{}'", op)),
            };
            Ok(Num::Float(v))
        }
    }
}

/// Evaluate an arithmetic expression, rendering the result.
pub fn evaluate(expression: &str) -> std::result::Result<String, String> {
    Calc::eval(expression.trim()).map(|n| n.to_string())
}

pub struct CalculatorTool;

impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }
    fn description(&self) -> &str {
        "Useful for performing math calculations."
    }
    fn input_schema(&self) -> serde_json::Value {
        string_schema("Arithmetic expression, e.g. (3 + 4) * 2")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: StringInput = parse_input(input)?;
            evaluate(&p.input).map(ToolResult::success).map_err(|e| WeftError::ToolExecution {
                tool: "calculator".into(),
                message: format!("Error evaluating expression: {}", e),
            })
        })
    }
}

// ── CurrentTimeTool ─────────────────────────────────────────────

pub struct CurrentTimeTool;

impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }
    fn description(&self) -> &str {
        "Useful for getting the current local time."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            Ok(ToolResult::success(
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ))
        })
    }
}

// ── ReverseTextTool ─────────────────────────────────────────────

pub struct ReverseTextTool;

impl Tool for ReverseTextTool {
    fn name(&self) -> &str {
        "reverse_text"
    }
    fn description(&self) -> &str {
        "Useful for reversing a string."
    }
    fn input_schema(&self) -> serde_json::Value {
        string_schema("Text to reverse")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: StringInput = parse_input(input)?;
            Ok(ToolResult::success(p.input.chars().rev().collect::<String>()))
        })
    }
}

// ── MockSearchTool ──────────────────────────────────────────────

pub struct MockSearchTool;

impl Tool for MockSearchTool {
    fn name(&self) -> &str {
        "mock_search"
    }
    fn description(&self) -> &str {
        "Useful for searching information."
    }
    fn input_schema(&self) -> serde_json::Value {
        string_schema("Search query")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: StringInput = parse_input(input)?;
            Ok(ToolResult::success(format!(
                "Found 3 results for '{}': 1. Result A, 2. Result B, 3. Result C",
                p.input
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculator_integer_and_float() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), "14");
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), "20");
        assert_eq!(evaluate("10 / 4").unwrap(), "2.5");
        assert_eq!(evaluate("8 / 2").unwrap(), "4.0");
        assert_eq!(evaluate("7 // 2").unwrap(), "3");
        assert_eq!(evaluate("-7 // 2").unwrap(), "-4");
        assert_eq!(evaluate("-7 % 3").unwrap(), "2");
        assert_eq!(evaluate("1.5 * 2").unwrap(), "3.0");
    }

    #[test]
    fn test_calculator_power() {
        assert_eq!(evaluate("2 ** 10").unwrap(), "1024");
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), "512");
        assert_eq!(evaluate("-2 ** 2").unwrap(), "-4");
        assert_eq!(evaluate("2 * 3 ** 2").unwrap(), "18");
    }

    #[test]
    fn test_calculator_errors() {
        assert_eq!(evaluate("1 / 0").unwrap_err(), "division by zero");
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("import os").is_err());
    }

    #[test]
    fn test_calculator_integer_edges_do_not_overflow() {
        assert_eq!(
            evaluate("9223372036854775806 % 9223372036854775807").unwrap(),
            "9223372036854775806"
        );
        assert_eq!(evaluate("-9223372036854775807 % 9223372036854775807").unwrap(), "0");
        assert_eq!(evaluate("(-9223372036854775807 - 1) % -1").unwrap(), "0");
        assert_eq!(evaluate("7 % -3").unwrap(), "-2");
        assert_eq!(evaluate("7 // -2").unwrap(), "-4");
        assert_eq!(evaluate("-(-9223372036854775807 - 1)").unwrap_err(), "integer overflow");
        assert_eq!(evaluate("(-9223372036854775807 - 1) // -1").unwrap_err(), "integer overflow");
    }

    #[tokio::test]
    async fn test_calculator_tool_error_message() {
        let err = CalculatorTool
            .execute(serde_json::json!({"input": "1/0"}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error evaluating expression: division by zero"));
    }

    #[tokio::test]
    async fn test_reverse_and_mock_search() {
        let reversed = ReverseTextTool
            .execute(serde_json::json!({"input": "hello"}), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(reversed.content, "olleh");

        let found = MockSearchTool
            .execute(serde_json::json!({"input": "rust"}), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(
            found.content,
            "Found 3 results for 'rust': 1. Result A, 2. Result B, 3. Result C"
        );
    }

    #[tokio::test]
    async fn test_current_time_format() {
        let now = CurrentTimeTool
            .execute(serde_json::json!({}), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(now.content.len(), 19);
        assert!(chrono::NaiveDateTime::parse_from_str(&now.content, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
