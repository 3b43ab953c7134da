use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::rules::expression::{ComparisonOperator, RuleExpression, TimeCondition};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("empty rule")]
    Empty,
    #[error("unexpected end of rule, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("unexpected token `{token}` at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },
    #[error("unable to parse terminal expression: {0}")]
    UnknownTerminal(String),
    #[error("operator `{operator}` is not supported for `{subject}`")]
    UnsupportedOperator { subject: String, operator: String },
    #[error("`{token}` is not a valid number")]
    InvalidNumber { token: String },
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Open,
    Close,
    Word(String),
    Quoted(String),
}

#[derive(Clone, Debug, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

impl Token {
    fn text(&self) -> String {
        match &self.kind {
            TokenKind::Open => "(".to_string(),
            TokenKind::Close => ")".to_string(),
            TokenKind::Word(word) => word.clone(),
            TokenKind::Quoted(text) => format!("\"{text}\""),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(word) if word == keyword)
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, RuleParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Open, position });
            }
            ')' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Close, position });
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == quote {
                        closed = true;
                        break;
                    }
                    text.push(next);
                }
                if !closed {
                    return Err(RuleParseError::UnterminatedString { position });
                }
                tokens.push(Token { kind: TokenKind::Quoted(text), position });
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token { kind: TokenKind::Word(word), position });
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser for textual rule conditions.
///
/// ```text
/// or       := and ("OR" and)*
/// and      := unary ("AND" unary)*
/// unary    := "NOT" unary | "(" or ")" | terminal
/// terminal := subject operator value
/// ```
pub struct RuleParser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl RuleParser {
    pub fn parse(input: &str) -> Result<RuleExpression, RuleParseError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(RuleParseError::Empty);
        }

        let mut parser = Self { tokens, cursor: 0 };
        let expression = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expression),
            Some(token) => Err(RuleParseError::UnexpectedToken {
                token: token.text(),
                position: token.position,
            }),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self, expected: &'static str) -> Result<Token, RuleParseError> {
        let token =
            self.tokens.get(self.cursor).cloned().ok_or(RuleParseError::UnexpectedEnd { expected })?;
        self.cursor += 1;
        Ok(token)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_keyword(keyword)) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn parse_or(&mut self) -> Result<RuleExpression, RuleParseError> {
        let mut children = vec![self.parse_and()?];
        while self.eat_keyword("OR") {
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 { children.remove(0) } else { RuleExpression::or(children) })
    }

    fn parse_and(&mut self) -> Result<RuleExpression, RuleParseError> {
        let mut children = vec![self.parse_unary()?];
        while self.eat_keyword("AND") {
            children.push(self.parse_unary()?);
        }
        Ok(if children.len() == 1 { children.remove(0) } else { RuleExpression::and(children) })
    }

    fn parse_unary(&mut self) -> Result<RuleExpression, RuleParseError> {
        if self.eat_keyword("NOT") {
            return Ok(RuleExpression::not(self.parse_unary()?));
        }

        let is_group = matches!(self.peek(), Some(Token { kind: TokenKind::Open, .. }));
        if is_group {
            self.cursor += 1;
            let inner = self.parse_or()?;
            let close = self.advance("`)`")?;
            if close.kind != TokenKind::Close {
                return Err(RuleParseError::UnexpectedToken {
                    token: close.text(),
                    position: close.position,
                });
            }
            return Ok(inner);
        }

        self.parse_terminal()
    }

    fn parse_terminal(&mut self) -> Result<RuleExpression, RuleParseError> {
        let subject_token = self.advance("a condition")?;
        let TokenKind::Word(subject) = subject_token.kind.clone() else {
            return Err(RuleParseError::UnexpectedToken {
                token: subject_token.text(),
                position: subject_token.position,
            });
        };
        let operator_token = self.advance("a comparison operator")?;
        let TokenKind::Word(operator) = operator_token.kind.clone() else {
            return Err(RuleParseError::UnexpectedToken {
                token: operator_token.text(),
                position: operator_token.position,
            });
        };
        let value_token = self.advance("a value")?;
        if matches!(value_token.kind, TokenKind::Open | TokenKind::Close) {
            return Err(RuleParseError::UnexpectedToken {
                token: value_token.text(),
                position: value_token.position,
            });
        }

        build_terminal(&subject, &operator, &value_token)
    }
}

fn build_terminal(
    subject: &str,
    operator: &str,
    value: &Token,
) -> Result<RuleExpression, RuleParseError> {
    if let Some(attribute) = subject.strip_prefix("user.").filter(|path| !path.is_empty()) {
        return Ok(RuleExpression::user(attribute, ComparisonOperator::parse(operator), literal(value)));
    }

    if let Some(name) = subject.strip_prefix("var.").filter(|name| !name.is_empty()) {
        return Ok(RuleExpression::variable(name, ComparisonOperator::parse(operator), literal(value)));
    }

    if subject == "cart.total" {
        let amount = decimal(value)?;
        return match operator {
            ">" | ">=" => Ok(RuleExpression::min_total(amount)),
            "<" | "<=" => Ok(RuleExpression::total_between(Decimal::ZERO, amount)),
            other => Err(unsupported(subject, other)),
        };
    }

    if let Some(category) = subject
        .strip_prefix("cart.")
        .and_then(|rest| rest.strip_suffix(".count"))
        .filter(|category| !category.is_empty())
    {
        let count = count(value)?;
        return match operator {
            ">=" => Ok(RuleExpression::category_count(category, count)),
            ">" => Ok(RuleExpression::category_count(category, count + 1)),
            other => Err(unsupported(subject, other)),
        };
    }

    if let Some(kind) = subject.strip_prefix("time.") {
        if operator != "===" && operator != "==" {
            return Err(unsupported(subject, operator));
        }
        let condition = match kind {
            "month" => TimeCondition::Month(small_number(value)?),
            "hour" => TimeCondition::Hour(small_number(value)?),
            "dayOfWeek" => TimeCondition::DayOfWeek(raw_text(value)),
            _ => return Err(RuleParseError::UnknownTerminal(subject.to_string())),
        };
        return Ok(RuleExpression::time(condition));
    }

    Err(RuleParseError::UnknownTerminal(format!("{subject} {operator} {}", value.text())))
}

fn unsupported(subject: &str, operator: &str) -> RuleParseError {
    RuleParseError::UnsupportedOperator {
        subject: subject.to_string(),
        operator: operator.to_string(),
    }
}

fn raw_text(token: &Token) -> String {
    match &token.kind {
        TokenKind::Word(word) => word.clone(),
        TokenKind::Quoted(text) => text.clone(),
        TokenKind::Open | TokenKind::Close => token.text(),
    }
}

/// Literal for attribute and variable comparisons. Quoted text is always a string.
fn literal(token: &Token) -> Value {
    let word = match &token.kind {
        TokenKind::Quoted(text) => return Value::String(text.clone()),
        TokenKind::Word(word) => word.as_str(),
        TokenKind::Open | TokenKind::Close => return Value::String(token.text()),
    };

    match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(integer) = word.parse::<i64>() {
                return Value::from(integer);
            }
            word.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(word.to_string()))
        }
    }
}

fn decimal(token: &Token) -> Result<Decimal, RuleParseError> {
    let text = raw_text(token);
    Decimal::from_str(&text).map_err(|_| RuleParseError::InvalidNumber { token: text })
}

fn count(token: &Token) -> Result<usize, RuleParseError> {
    let text = raw_text(token);
    text.parse::<usize>().map_err(|_| RuleParseError::InvalidNumber { token: text })
}

fn small_number(token: &Token) -> Result<u32, RuleParseError> {
    let text = raw_text(token);
    text.parse::<u32>().map_err(|_| RuleParseError::InvalidNumber { token: text })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{RuleParseError, RuleParser};
    use crate::rules::expression::{ComparisonOperator, RuleExpression, TimeCondition};

    #[test]
    fn and_binds_tighter_than_or() {
        let expression =
            RuleParser::parse("user.isStudent === true AND cart.total > 100 OR cart.Books.count >= 2")
                .expect("rule parses");

        assert_eq!(
            expression,
            RuleExpression::or(vec![
                RuleExpression::and(vec![
                    RuleExpression::user("isStudent", ComparisonOperator::Equal, json!(true)),
                    RuleExpression::min_total(Decimal::new(100, 0)),
                ]),
                RuleExpression::category_count("Books", 2),
            ])
        );
    }

    #[test]
    fn parentheses_and_not_override_precedence() {
        let expression = RuleParser::parse(
            "NOT (user.tier === 'gold' OR user.tier === \"platinum member\") AND cart.total <= 50",
        )
        .expect("rule parses");

        assert_eq!(
            expression.to_string(),
            "(NOT ((user.tier === gold OR user.tier === platinum member)) AND cart.total between 0 and 50)"
        );
    }

    #[test]
    fn values_are_typed_like_literals() {
        let parse_value = |source: &str| match RuleParser::parse(source) {
            Ok(RuleExpression::UserAttribute { value, .. }) => value,
            other => panic!("expected attribute expression, got {other:?}"),
        };

        assert_eq!(parse_value("user.age >= 21"), json!(21));
        assert_eq!(parse_value("user.score > 4.5"), json!(4.5));
        assert_eq!(parse_value("user.nickname === null"), json!(null));
        assert_eq!(parse_value("user.city === Paris"), json!("Paris"));
        assert_eq!(parse_value("user.zip === '01234'"), json!("01234"));
    }

    #[test]
    fn variable_and_time_terminals_are_supported() {
        assert_eq!(
            RuleParser::parse("var.tier === gold").expect("variable rule parses"),
            RuleExpression::variable("tier", ComparisonOperator::Equal, json!("gold"))
        );
        assert_eq!(
            RuleParser::parse("time.month === 12").expect("time rule parses"),
            RuleExpression::time(TimeCondition::Month(12))
        );
    }

    #[test]
    fn malformed_rules_report_structured_errors() {
        assert_eq!(RuleParser::parse("   "), Err(RuleParseError::Empty));
        assert_eq!(
            RuleParser::parse("user.isStudent ==="),
            Err(RuleParseError::UnexpectedEnd { expected: "a value" })
        );
        assert!(matches!(
            RuleParser::parse("cart.total includes 5"),
            Err(RuleParseError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            RuleParser::parse("cart.total > lots"),
            Err(RuleParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            RuleParser::parse("inventory.size > 3"),
            Err(RuleParseError::UnknownTerminal(_))
        ));
        assert!(matches!(
            RuleParser::parse("(user.a === 1"),
            Err(RuleParseError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            RuleParser::parse("user.a === 1)"),
            Err(RuleParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            RuleParser::parse("user.a === 'open"),
            Err(RuleParseError::UnterminatedString { .. })
        ));
    }
}
