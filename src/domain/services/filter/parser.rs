//--------------------------------------------------------------------------------------------------
// STRUCTS & ENUMS
//--------------------------------------------------------------------------------------------------
// | Name        | Description                                               | Key Methods          |
// |-------------|-----------------------------------------------------------|----------------------|
// | Filter      | Compiled LDAP-style predicate over event properties      | parse, matches       |
// | Operator    | Comparison operators of a simple item                     |                      |
//--------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::domain::models::{Event, PropertyValue};

use super::FilterError;

/// Comparison used by a simple `(attr op value)` item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    Approx,
    GreaterOrEqual,
    LessOrEqual,
}

/// A compiled filter expression.
///
/// Grammar (whitespace around items is ignored):
///
/// ```text
/// filter   := '(' ( '&' filter+ | '|' filter+ | '!' filter | item ) ')'
/// item     := attr ( '=' | '~=' | '>=' | '<=' ) value
/// value    := '*'            presence
///           | chars with '*' substring
///           | chars          comparison
/// ```
///
/// Attribute names are matched case-insensitively; `\` escapes the next
/// character in values.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Substring {
        attr: String,
        parts: Vec<Option<String>>,
    },
    Compare {
        attr: String,
        op: Operator,
        value: String,
    },
}

impl Filter {
    /// Parses a filter expression.
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let mut parser = Parser {
            input: expression,
            chars: expression.char_indices().collect(),
            pos: 0,
        };
        parser.skip_whitespace();
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(filter)
    }

    /// Evaluates the filter against the event properties.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(event)),
            Filter::Or(items) => items.iter().any(|f| f.matches(event)),
            Filter::Not(inner) => !inner.matches(event),
            Filter::Present(attr) => event.property_ignore_case(attr).is_some(),
            Filter::Substring { attr, parts } => event
                .property_ignore_case(attr)
                .is_some_and(|value| any_value(&value, &|v| substring_matches(v, parts))),
            Filter::Compare { attr, op, value } => event
                .property_ignore_case(attr)
                .is_some_and(|actual| any_value(&actual, &|v| compare(v, *op, value))),
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => write_group(f, '&', items),
            Filter::Or(items) => write_group(f, '|', items),
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Present(attr) => write!(f, "({attr}=*)"),
            Filter::Substring { attr, parts } => {
                write!(f, "({attr}=")?;
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        f.write_str("*")?;
                    }
                    if let Some(part) = part {
                        f.write_str(&escape(part))?;
                    }
                }
                f.write_str(")")
            }
            Filter::Compare { attr, op, value } => {
                let op = match op {
                    Operator::Equal => "=",
                    Operator::Approx => "~=",
                    Operator::GreaterOrEqual => ">=",
                    Operator::LessOrEqual => "<=",
                };
                write!(f, "({attr}{op}{})", escape(value))
            }
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, op: char, items: &[Filter]) -> fmt::Result {
    write!(f, "({op}")?;
    for item in items {
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        match self.next() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{expected}'"))),
        }
    }

    fn error(&self, reason: &str) -> FilterError {
        FilterError::Parse {
            expression: self.input.to_string(),
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect('(')?;
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut items = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('(') {
            items.push(self.parse_filter()?);
            self.skip_whitespace();
        }
        if items.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let mut attr = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            attr.push(c);
            self.pos += 1;
        }
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.next() {
            Some('=') => Operator::Equal,
            Some('~') => {
                self.expect('=')?;
                Operator::Approx
            }
            Some('>') => {
                self.expect('=')?;
                Operator::GreaterOrEqual
            }
            Some('<') => {
                self.expect('=')?;
                Operator::LessOrEqual
            }
            _ => return Err(self.error("expected comparison operator")),
        };

        let parts = self.parse_value()?;

        if op == Operator::Equal && parts.len() > 1 {
            if parts.len() == 2 && parts[0].is_none() && parts[1].is_none() {
                return Ok(Filter::Present(attr));
            }
            return Ok(Filter::Substring { attr, parts });
        }
        if parts.len() > 1 {
            return Err(self.error("wildcards are only allowed with '='"));
        }
        let value = parts.into_iter().next().flatten().unwrap_or_default();
        Ok(Filter::Compare { attr, op, value })
    }

    /// Reads a value up to the closing parenthesis, splitting on unescaped
    /// `*`. Empty segments are `None`.
    fn parse_value(&mut self) -> Result<Vec<Option<String>>, FilterError> {
        let mut parts = Vec::new();
        let mut current = String::new();
        loop {
            match self.peek() {
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('*') => {
                    self.pos += 1;
                    parts.push(non_empty(std::mem::take(&mut current)));
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.next() {
                        Some(c) => current.push(c),
                        None => return Err(self.error("dangling escape")),
                    }
                }
                Some(c) => {
                    self.pos += 1;
                    current.push(c);
                }
                None => return Err(self.error("unterminated value")),
            }
        }
        parts.push(non_empty(current));
        Ok(parts)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn any_value(value: &PropertyValue, test: &dyn Fn(&PropertyValue) -> bool) -> bool {
    match value {
        PropertyValue::List(items) => items.iter().any(|item| any_value(item, test)),
        other => test(other),
    }
}

fn substring_matches(value: &PropertyValue, parts: &[Option<String>]) -> bool {
    let PropertyValue::String(text) = value else {
        return false;
    };
    let mut rest = text.as_str();
    let last = parts.len() - 1;
    for (idx, part) in parts.iter().enumerate() {
        let Some(part) = part else { continue };
        if idx == 0 {
            match rest.strip_prefix(part.as_str()) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if idx == last {
            return rest.ends_with(part.as_str());
        } else {
            match rest.find(part.as_str()) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn compare(actual: &PropertyValue, op: Operator, expected: &str) -> bool {
    let ordering = match actual {
        PropertyValue::String(s) => {
            if op == Operator::Approx {
                return normalize(s) == normalize(expected);
            }
            Some(s.as_str().cmp(expected))
        }
        PropertyValue::Integer(i) => expected.trim().parse::<i64>().ok().map(|e| i.cmp(&e)),
        PropertyValue::Float(v) => expected
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|e| v.partial_cmp(&e)),
        PropertyValue::Bool(b) => {
            let parsed = expected.trim().parse::<bool>().ok();
            return matches!(op, Operator::Equal | Operator::Approx) && parsed == Some(*b);
        }
        PropertyValue::List(_) => None,
    };
    match (ordering, op) {
        (Some(o), Operator::Equal | Operator::Approx) => o == Ordering::Equal,
        (Some(o), Operator::GreaterOrEqual) => o != Ordering::Less,
        (Some(o), Operator::LessOrEqual) => o != Ordering::Greater,
        (None, _) => false,
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
