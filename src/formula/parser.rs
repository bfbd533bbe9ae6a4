use super::ast::{BinaryOp, Expr, UnaryOp};
use super::ExpressionError;
use crate::core::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Text(String),
    Property(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Op(BinaryOp),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

/// Deepest nesting of parentheses, calls and unary minus.
const MAX_DEPTH: usize = 64;

/// Bounds the size of the tree the evaluator walks recursively.
const MAX_TOKENS: usize = 1024;

/// Parse formula source into an expression tree.
///
/// A single leading `=` is accepted and ignored.
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let body = source.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    if body.trim().is_empty() {
        return Err(ExpressionError::FormulaParse("Formula is empty".into()));
    }

    let tokens = tokenize(body)?;
    if tokens.len() > MAX_TOKENS {
        return Err(ExpressionError::FormulaParse(format!(
            "Formula has more than {} tokens",
            MAX_TOKENS
        )));
    }
    let mut parser = Parser {
        tokens,
        cursor: 0,
        depth: 0,
    };
    let expr = parser.parse_comparison()?;

    if let Some(extra) = parser.peek() {
        return Err(ExpressionError::FormulaParse(format!(
            "Unexpected {:?} at position {}",
            extra.token, extra.pos
        )));
    }

    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let pos = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '+' => {
                i += 1;
                Token::Op(BinaryOp::Add)
            }
            '-' => {
                i += 1;
                Token::Op(BinaryOp::Subtract)
            }
            '*' => {
                i += 1;
                Token::Op(BinaryOp::Multiply)
            }
            '/' => {
                i += 1;
                Token::Op(BinaryOp::Divide)
            }
            '&' => {
                i += 1;
                Token::Op(BinaryOp::Concat)
            }
            '=' => {
                i += 1;
                Token::Op(BinaryOp::Eq)
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Op(BinaryOp::NotEq)
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    i += 2;
                    Token::Op(BinaryOp::LtEq)
                }
                Some('>') => {
                    i += 2;
                    Token::Op(BinaryOp::NotEq)
                }
                _ => {
                    i += 1;
                    Token::Op(BinaryOp::Lt)
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    Token::Op(BinaryOp::GtEq)
                } else {
                    i += 1;
                    Token::Op(BinaryOp::Gt)
                }
            }
            '"' => {
                // "" inside a string is an escaped quote
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ExpressionError::FormulaParse(format!(
                                "Unterminated string starting at position {}",
                                pos
                            )));
                        }
                        Some('"') if chars.get(i + 1) == Some(&'"') => {
                            text.push('"');
                            i += 2;
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                Token::Text(text)
            }
            '[' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|ch| *ch == ']')
                    .map(|offset| start + offset)
                    .ok_or_else(|| {
                        ExpressionError::FormulaParse(format!(
                            "Unterminated property reference at position {}",
                            pos
                        ))
                    })?;
                let name: String = chars[start..end].iter().collect();
                if name.trim().is_empty() {
                    return Err(ExpressionError::FormulaParse(format!(
                        "Empty property reference at position {}",
                        pos
                    )));
                }
                i = end + 1;
                Token::Property(name)
            }
            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                let mut seen_dot = false;
                while let Some(ch) = chars.get(i) {
                    if ch.is_ascii_digit() {
                        i += 1;
                    } else if *ch == '.' && !seen_dot {
                        seen_dot = true;
                        i += 1;
                    } else {
                        break;
                    }
                }
                Token::Number(chars[start..i].iter().collect())
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '.')
                {
                    i += 1;
                }
                Token::Ident(chars[start..i].iter().collect())
            }
            other => {
                return Err(ExpressionError::FormulaParse(format!(
                    "Unexpected character '{}' at position {}",
                    other, pos
                )));
            }
        };

        tokens.push(Spanned { token, pos });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExpressionError::FormulaParse(format!(
                "Formula nests deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn peek_op(&self, accept: impl Fn(BinaryOp) -> bool) -> Option<BinaryOp> {
        match self.peek() {
            Some(Spanned {
                token: Token::Op(op),
                ..
            }) if accept(*op) => Some(*op),
            _ => None,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.next() {
            Some(spanned) if spanned.token == expected => Ok(()),
            Some(spanned) => Err(ExpressionError::FormulaParse(format!(
                "Expected {:?} at position {}, found {:?}",
                expected, spanned.pos, spanned.token
            ))),
            None => Err(ExpressionError::FormulaParse(format!(
                "Expected {:?} but the formula ended",
                expected
            ))),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_concat()?;
        while let Some(op) = self.peek_op(|op| op.is_comparison()) {
            self.cursor += 1;
            let right = self.parse_concat()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_concat(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.peek_op(|op| op == BinaryOp::Concat) {
            self.cursor += 1;
            let right = self.parse_additive()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek_op(|op| matches!(op, BinaryOp::Add | BinaryOp::Subtract)) {
            self.cursor += 1;
            let right = self.parse_term()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_op(|op| matches!(op, BinaryOp::Multiply | BinaryOp::Divide)) {
            self.cursor += 1;
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek_op(|op| op == BinaryOp::Subtract).is_some() {
            self.cursor += 1;
            let expr = self.nested(Self::parse_unary)?;
            return Ok(match expr {
                Expr::Literal(Value::Integer(i)) => Expr::Literal(Value::Integer(-i)),
                Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                other => Expr::UnaryOp {
                    op: UnaryOp::Minus,
                    expr: Box::new(other),
                },
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let Some(spanned) = self.next() else {
            return Err(ExpressionError::FormulaParse(
                "Unexpected end of formula".into(),
            ));
        };

        match spanned.token {
            Token::Number(raw) => parse_number(&raw, spanned.pos),
            Token::Text(text) => Ok(Expr::Literal(Value::Text(text))),
            Token::Property(name) => Ok(Expr::Property(name)),
            Token::LParen => {
                let inner = self.nested(Self::parse_comparison)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(ident) => {
                let is_call = matches!(
                    self.peek(),
                    Some(Spanned {
                        token: Token::LParen,
                        ..
                    })
                );
                if is_call {
                    self.cursor += 1;
                    let args = self.nested(Self::parse_arguments)?;
                    return Ok(Expr::Function {
                        name: ident.to_uppercase(),
                        args,
                    });
                }
                match ident.to_ascii_uppercase().as_str() {
                    "TRUE" => Ok(Expr::Literal(Value::Boolean(true))),
                    "FALSE" => Ok(Expr::Literal(Value::Boolean(false))),
                    "NULL" => Ok(Expr::Literal(Value::Null)),
                    _ => Ok(Expr::Property(ident)),
                }
            }
            other => Err(ExpressionError::FormulaParse(format!(
                "Unexpected {:?} at position {}",
                other, spanned.pos
            ))),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if matches!(
            self.peek(),
            Some(Spanned {
                token: Token::RParen,
                ..
            })
        ) {
            self.cursor += 1;
            return Ok(args);
        }

        loop {
            args.push(self.parse_comparison()?);
            match self.next() {
                Some(Spanned {
                    token: Token::Comma,
                    ..
                }) => continue,
                Some(Spanned {
                    token: Token::RParen,
                    ..
                }) => break,
                Some(spanned) => {
                    return Err(ExpressionError::FormulaParse(format!(
                        "Expected ',' or ')' at position {}, found {:?}",
                        spanned.pos, spanned.token
                    )));
                }
                None => {
                    return Err(ExpressionError::FormulaParse(
                        "Unclosed function call".into(),
                    ));
                }
            }
        }

        Ok(args)
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn parse_number(raw: &str, pos: usize) -> Result<Expr, ExpressionError> {
    if !raw.contains('.') {
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Expr::Literal(Value::Integer(i)));
        }
    }
    raw.parse::<f64>()
        .map(|f| Expr::Literal(Value::Float(f)))
        .map_err(|_| {
            ExpressionError::FormulaParse(format!("Invalid number '{}' at position {}", raw, pos))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(parse(&parens), Err(ExpressionError::FormulaParse(_))));

        let minuses = format!("{}1", "-".repeat(500));
        assert!(matches!(parse(&minuses), Err(ExpressionError::FormulaParse(_))));

        let calls = format!("{}1{}", "LEN(".repeat(100), ")".repeat(100));
        assert!(matches!(parse(&calls), Err(ExpressionError::FormulaParse(_))));

        let chain = vec!["1"; 2000].join(" + ");
        assert!(matches!(parse(&chain), Err(ExpressionError::FormulaParse(_))));

        let modest = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&modest).is_ok());
    }

    #[test]
    fn test_parse_if_with_comparison() {
        let expr = parse(r#"IF([Age]>18,"adult","minor")"#).unwrap();
        let Expr::Function { name, args } = expr else {
            panic!("expected a function call");
        };
        assert_eq!(name, "IF");
        assert_eq!(args.len(), 3);
        assert_eq!(
            args[0],
            Expr::BinaryOp {
                left: Box::new(Expr::Property("Age".into())),
                op: BinaryOp::Gt,
                right: Box::new(Expr::Literal(Value::Integer(18))),
            }
        );
        assert_eq!(args[1], Expr::Literal(Value::Text("adult".into())));
    }

    #[test]
    fn test_leading_equals_and_precedence() {
        let expr = parse("=1 + 2 * 3").unwrap();
        let Expr::BinaryOp { op, right, .. } = expr else {
            panic!("expected a binary op");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::BinaryOp { op: BinaryOp::Multiply, .. }));
    }

    #[test]
    fn test_escaped_quotes_and_negatives() {
        assert_eq!(
            parse(r#""say ""hi""""#).unwrap(),
            Expr::Literal(Value::Text(r#"say "hi""#.into()))
        );
        assert_eq!(parse("-2.5").unwrap(), Expr::Literal(Value::Float(-2.5)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("IF(1, 2").is_err());
        assert!(parse("[Age").is_err());
        assert!(parse(r#""open"#).is_err());
        assert!(parse("1 2").is_err());
        assert!(parse("#").is_err());
    }
}
