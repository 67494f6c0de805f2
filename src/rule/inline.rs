//! Inline expressions
//!
//! Two flavours share the `${...}` (or `$->{...}`) placeholder syntax:
//! - node expressions such as `ds_${0..1}.t_order_${[0, 1, 2]}` expand into
//!   the ordered cartesian product of their placeholders;
//! - sharding expressions such as `t_order_${order_id % 2}` are parsed once
//!   into a template and evaluated per routed value.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::error::{ShardingError, ShardingResult};
use crate::value::display_value;

const PLACEHOLDER_PATTERN: &str = r"\$(?:->)?\{([^}]*)\}";

fn placeholder_regex() -> ShardingResult<Regex> {
    Regex::new(PLACEHOLDER_PATTERN)
        .map_err(|e| ShardingError::config(format!("Invalid placeholder pattern: {}", e)))
}

/// Split on commas that are not inside a `${...}` placeholder or a `[...]` list.
fn split_top_level(expression: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in expression.chars() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            ',' if depth == 0 => {
                segments.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        segments.push(current.trim().to_string());
    }
    segments
}

fn unquote(item: &str) -> String {
    let item = item.trim();
    if item.len() >= 2
        && ((item.starts_with('\'') && item.ends_with('\''))
            || (item.starts_with('"') && item.ends_with('"')))
    {
        item[1..item.len() - 1].to_string()
    } else {
        item.to_string()
    }
}

fn expand_placeholder(body: &str) -> ShardingResult<Vec<String>> {
    let body = body.trim();
    if let Some(list) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        return Ok(list
            .split(',')
            .map(unquote)
            .filter(|s| !s.is_empty())
            .collect());
    }
    if let Some((start, end)) = body.split_once("..") {
        let start: i64 = start.trim().parse().map_err(|_| {
            ShardingError::config(format!("Invalid range start in '${{{}}}'", body))
        })?;
        let end: i64 = end.trim().parse().map_err(|_| {
            ShardingError::config(format!("Invalid range end in '${{{}}}'", body))
        })?;
        if start > end {
            return Err(ShardingError::config(format!(
                "Range '${{{}}}' is descending",
                body
            )));
        }
        return Ok((start..=end).map(|i| i.to_string()).collect());
    }
    if body.is_empty() {
        return Err(ShardingError::config("Empty placeholder '${}'"));
    }
    Ok(vec![unquote(body)])
}

/// Expand a node expression into every concrete name it denotes, in order.
///
/// The leftmost placeholder varies slowest, so `ds_${0..1}.t_${0..2}` yields
/// `ds_0.t_0, ds_0.t_1, ds_0.t_2, ds_1.t_0, ...`.
pub fn expand(expression: &str) -> ShardingResult<Vec<String>> {
    let re = placeholder_regex()?;
    let mut result = Vec::new();
    for segment in split_top_level(expression) {
        let mut pieces: Vec<String> = vec![String::new()];
        let mut last = 0;
        for caps in re.captures_iter(&segment) {
            let (whole, body) = match (caps.get(0), caps.get(1)) {
                (Some(w), Some(b)) => (w, b),
                _ => continue,
            };
            let literal = &segment[last..whole.start()];
            let options = expand_placeholder(body.as_str())?;
            let mut next = Vec::with_capacity(pieces.len() * options.len());
            for prefix in &pieces {
                for option in &options {
                    next.push(format!("{}{}{}", prefix, literal, option));
                }
            }
            pieces = next;
            last = whole.end();
        }
        let tail = &segment[last..];
        result.extend(pieces.into_iter().map(|p| format!("{}{}", p, tail)));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> ShardingResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.contains('.') {
                let f = text.parse::<f64>().map_err(|_| {
                    ShardingError::config(format!("Invalid number '{}' in '{}'", text, input))
                })?;
                tokens.push(Token::Float(f));
            } else {
                let n = text.parse::<i64>().map_err(|_| {
                    ShardingError::config(format!("Invalid number '{}' in '{}'", text, input))
                })?;
                tokens.push(Token::Int(n));
            }
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '\'' || c == '"' {
            let quote = c;
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            if i >= chars.len() {
                return Err(ShardingError::config(format!(
                    "Unterminated string in '{}'",
                    input
                )));
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else if "+-*/%".contains(c) {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else {
            return Err(ShardingError::config(format!(
                "Unexpected character '{}' in '{}'",
                c, input
            )));
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Var(String),
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    source: String,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, msg: &str) -> ShardingError {
        ShardingError::config(format!("{} in expression '{}'", msg, self.source))
    }

    fn parse_expr(&mut self) -> ShardingResult<Expr> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ShardingResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ShardingResult<Expr> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ShardingResult<Expr> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::Float(f)) => Ok(Expr::Float(f)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("Expected ')'")),
                }
            }
            _ => Err(self.error("Unexpected end of input")),
        }
    }
}

#[derive(Debug, Clone)]
enum Evaluated {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Evaluated {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Evaluated::Int(i),
                None => Evaluated::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => match s.parse::<i64>() {
                Ok(i) => Evaluated::Int(i),
                Err(_) => Evaluated::Str(s.clone()),
            },
            other => Evaluated::Str(display_value(other)),
        }
    }

    fn render(&self) -> String {
        match self {
            Evaluated::Int(i) => i.to_string(),
            Evaluated::Float(f) => f.to_string(),
            Evaluated::Str(s) => s.clone(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Evaluated::Int(i) => Some(*i as f64),
            Evaluated::Float(f) => Some(*f),
            Evaluated::Str(_) => None,
        }
    }
}

fn eval(expr: &Expr, vars: &HashMap<&str, &Value>) -> ShardingResult<Evaluated> {
    match expr {
        Expr::Int(n) => Ok(Evaluated::Int(*n)),
        Expr::Float(f) => Ok(Evaluated::Float(*f)),
        Expr::Str(s) => Ok(Evaluated::Str(s.clone())),
        Expr::Var(name) => vars
            .get(name.as_str())
            .map(|v| Evaluated::from_value(v))
            .ok_or_else(|| {
                ShardingError::Algorithm(format!("No value bound for variable '{}'", name))
            }),
        Expr::Neg(inner) => match eval(inner, vars)? {
            Evaluated::Int(i) => Ok(Evaluated::Int(-i)),
            Evaluated::Float(f) => Ok(Evaluated::Float(-f)),
            Evaluated::Str(s) => Err(ShardingError::Algorithm(format!(
                "Cannot negate '{}'",
                s
            ))),
        },
        Expr::Binary(op, left, right) => {
            let l = eval(left, vars)?;
            let r = eval(right, vars)?;
            match (&l, &r) {
                (Evaluated::Str(a), _) if *op == '+' => Ok(Evaluated::Str(a.clone() + &r.render())),
                (Evaluated::Int(a), Evaluated::Int(b)) => {
                    let (a, b) = (*a, *b);
                    let result = match op {
                        '+' => a.checked_add(b),
                        '-' => a.checked_sub(b),
                        '*' => a.checked_mul(b),
                        '/' => a.checked_div(b),
                        '%' => a.checked_rem(b),
                        _ => None,
                    };
                    result.map(Evaluated::Int).ok_or_else(|| {
                        ShardingError::Algorithm(format!("Arithmetic error in {} {} {}", a, op, b))
                    })
                }
                _ => {
                    let (a, b) = match (l.as_f64(), r.as_f64()) {
                        (Some(a), Some(b)) => (a, b),
                        _ => {
                            return Err(ShardingError::Algorithm(format!(
                                "Cannot apply '{}' to '{}' and '{}'",
                                op,
                                l.render(),
                                r.render()
                            )))
                        }
                    };
                    let result = match op {
                        '+' => a + b,
                        '-' => a - b,
                        '*' => a * b,
                        '/' => a / b,
                        _ => a % b,
                    };
                    Ok(Evaluated::Float(result))
                }
            }
        }
    }
}

fn collect_vars(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Var(name) => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        Expr::Neg(inner) => collect_vars(inner, out),
        Expr::Binary(_, l, r) => {
            collect_vars(l, out);
            collect_vars(r, out);
        }
        _ => {}
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Expr(Expr),
}

/// A parsed sharding expression, e.g. `t_order_${order_id % 2}`.
#[derive(Debug, Clone)]
pub struct InlineExpression {
    source: String,
    segments: Vec<Segment>,
}

impl InlineExpression {
    pub fn parse(source: &str) -> ShardingResult<Self> {
        let re = placeholder_regex()?;
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(source) {
            let (whole, body) = match (caps.get(0), caps.get(1)) {
                (Some(w), Some(b)) => (w, b),
                _ => continue,
            };
            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            let mut parser = ExprParser {
                tokens: tokenize(body.as_str())?,
                pos: 0,
                source: source.to_string(),
            };
            let expr = parser.parse_expr()?;
            if parser.pos != parser.tokens.len() {
                return Err(parser.error("Trailing tokens"));
            }
            segments.push(Segment::Expr(expr));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }
        if source.trim().is_empty() {
            return Err(ShardingError::config("Inline expression cannot be empty"));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names referenced by the expression, in first-use order.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for segment in &self.segments {
            if let Segment::Expr(expr) = segment {
                collect_vars(expr, &mut vars);
            }
        }
        vars
    }

    pub fn evaluate(&self, vars: &HashMap<&str, &Value>) -> ShardingResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&eval(expr, vars)?.render()),
            }
        }
        Ok(out)
    }

    /// Evaluate with a single variable bound.
    pub fn evaluate_with(&self, name: &str, value: &Value) -> ShardingResult<String> {
        let mut vars = HashMap::new();
        vars.insert(name, value);
        self.evaluate(&vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_cartesian_in_order() {
        let nodes = expand("ds_${0..1}.table_${0..2}").unwrap();
        assert_eq!(
            nodes,
            vec![
                "ds_0.table_0",
                "ds_0.table_1",
                "ds_0.table_2",
                "ds_1.table_0",
                "ds_1.table_1",
                "ds_1.table_2",
            ]
        );
    }

    #[test]
    fn test_expand_lists_and_segments() {
        let nodes = expand("ds_0.t_${['a', 'b']}, ds_1.t_$->{2..3}").unwrap();
        assert_eq!(nodes, vec!["ds_0.t_a", "ds_0.t_b", "ds_1.t_2", "ds_1.t_3"]);
    }

    #[test]
    fn test_expand_plain_names() {
        assert_eq!(expand("ds_0.t_order").unwrap(), vec!["ds_0.t_order"]);
    }

    #[test]
    fn test_expand_rejects_descending_range() {
        assert!(expand("ds_${2..0}.t").is_err());
    }

    #[test]
    fn test_sharding_expression() {
        let expr = InlineExpression::parse("t_order_${order_id % 2}").unwrap();
        assert_eq!(expr.variables(), vec!["order_id".to_string()]);
        assert_eq!(expr.evaluate_with("order_id", &json!(7)).unwrap(), "t_order_1");
        assert_eq!(expr.evaluate_with("order_id", &json!("10")).unwrap(), "t_order_0");
    }

    #[test]
    fn test_sharding_expression_precedence() {
        let expr = InlineExpression::parse("ds_${(user_id + 1) % 3 * 2}").unwrap();
        assert_eq!(expr.evaluate_with("user_id", &json!(4)).unwrap(), "ds_4");
    }

    #[test]
    fn test_sharding_expression_string_substitution() {
        let expr = InlineExpression::parse("t_${region}").unwrap();
        assert_eq!(expr.evaluate_with("region", &json!("eu")).unwrap(), "t_eu");
    }

    #[test]
    fn test_sharding_expression_missing_variable() {
        let expr = InlineExpression::parse("t_${order_id % 2}").unwrap();
        assert!(expr.evaluate_with("user_id", &json!(1)).is_err());
    }

    #[test]
    fn test_sharding_expression_modulo_by_zero() {
        let expr = InlineExpression::parse("t_${order_id % 0}").unwrap();
        assert!(expr.evaluate_with("order_id", &json!(1)).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(InlineExpression::parse("t_${order_id %}").is_err());
        assert!(InlineExpression::parse("t_${(a}").is_err());
        assert!(InlineExpression::parse("").is_err());
    }
}
