//! Query Parser
//!
//! Hand-written recursive-descent parser for the path-query language.
//!
//! ```text
//! query        = seed step*
//! seed         = model filters_or_id
//! step         = ","? (relation_step | subquery_step | or_step)
//! relation_step= model "." identifier filter_call* recursion?
//! recursion    = "**" | "*" | "$" | "?"
//! subquery_step= ("+" | "-" | "?")? "(" step+ ")"
//! or_step      = "(" step+ ")" "|" "(" step+ ")" ("|" "(" step+ ")")*
//! filter_call  = "(" filter_args ")" | "." identifier "(" filter_args ")"
//! filter_args  = (kv ("," kv)*)? | identifier | int
//! ```
//!
//! Whitespace separates steps and may appear inside argument lists, but a
//! relation step with its filter calls and recursion marker is written
//! without spaces.

use crate::error::{Error, Result};
use crate::query::ast::*;
use crate::query::date;
use crate::types::Value;
use chrono::{DateTime, Local};

/// Query parser
pub struct QueryParser {
    input: String,
    pos: usize,
    now: DateTime<Local>,
}

impl QueryParser {
    /// Create a new parser
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            pos: 0,
            now: Local::now(),
        }
    }

    /// Fix the reference time used to resolve relative date literals
    pub fn with_now(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }

    /// Parse the whole input as one query
    pub fn parse(&mut self) -> Result<QueryAst> {
        self.skip_whitespace();
        let seed = self.parse_seed()?;

        let mut steps = Vec::new();
        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }
            steps.push(self.parse_step()?);
        }

        Ok(QueryAst { seed, steps })
    }

    // ========================================================================
    // Seed
    // ========================================================================

    fn parse_seed(&mut self) -> Result<ObjectQuery> {
        let model = self.parse_identifier()?;
        if !self.peek_char_is('(') {
            return Err(self.error("expected '(' after seed model"));
        }
        self.pos += 1;

        let mut seed = ObjectQuery::new(model);
        match self.try_parse_id() {
            Some(id) => seed.filters.push(FilterOp::filter(vec![("id", id)])),
            None => {
                let args = self.parse_filter_args()?;
                seed.filters.push(FilterOp::new(FilterMethod::Filter, args));
            }
        }
        seed.filters.extend(self.parse_filter_calls()?);
        Ok(seed)
    }

    /// `( id )`; on anything else the position is left untouched.
    /// A non-numeric id stays a string for the model's object provider.
    fn try_parse_id(&mut self) -> Option<Value> {
        let start = self.pos;
        self.skip_whitespace();
        let id_start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let id = self.input[id_start..self.pos].to_string();
        self.skip_whitespace();
        if id.is_empty() || !self.peek_char_is(')') {
            self.pos = start;
            return None;
        }
        self.pos += 1;

        Some(match id.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::String(id),
        })
    }

    // ========================================================================
    // Steps
    // ========================================================================

    fn parse_step(&mut self) -> Result<Step> {
        let join = self.try_char(',');
        self.skip_whitespace();

        let kind = match self.peek_char() {
            Some(c @ ('+' | '-' | '?')) => {
                let having = match c {
                    '+' => Having::Present,
                    '-' => Having::Absent,
                    _ => Having::Optional,
                };
                self.pos += 1;
                if !self.peek_char_is('(') {
                    return Err(self.error("expected '(' after sub-query modifier"));
                }
                self.pos += 1;
                let steps = self.parse_group()?;
                StepKind::Subquery(SubqueryStep {
                    steps,
                    having: Some(having),
                })
            }
            Some('(') => {
                self.pos += 1;
                let first = self.parse_group()?;
                let after_group = self.pos;
                self.skip_whitespace();
                if self.peek_char_is('|') {
                    let mut alternatives = vec![first];
                    while self.try_char('|') {
                        self.skip_whitespace();
                        if !self.peek_char_is('(') {
                            return Err(self.error("expected '(' after '|'"));
                        }
                        self.pos += 1;
                        alternatives.push(self.parse_group()?);
                    }
                    StepKind::Or(OrStep { alternatives })
                } else {
                    self.pos = after_group;
                    StepKind::Subquery(SubqueryStep {
                        steps: first,
                        having: None,
                    })
                }
            }
            Some(c) if is_identifier_start(c) => StepKind::Relation(self.parse_relation_step()?),
            _ => return Err(self.error("expected a relation, sub-query or or-query")),
        };

        Ok(Step { join, kind })
    }

    /// Steps up to the closing parenthesis; the opening one is already consumed
    fn parse_group(&mut self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek_char_is(')') {
                break;
            }
            if self.at_end() {
                return Err(self.error("unclosed parenthesis"));
            }
            steps.push(self.parse_step()?);
        }
        if steps.is_empty() {
            return Err(self.error("empty parentheses where steps were expected"));
        }
        self.pos += 1;
        Ok(steps)
    }

    fn parse_relation_step(&mut self) -> Result<RelationStep> {
        let model = self.parse_identifier()?;
        if !self.peek_char_is('.') {
            return Err(self.error("expected '.' after model name"));
        }
        self.pos += 1;
        let relation = self.parse_identifier()?;
        let filters = self.parse_filter_calls()?;
        let recursion = self.parse_recursion();

        Ok(RelationStep {
            model,
            relation,
            filters,
            recursion,
        })
    }

    fn parse_recursion(&mut self) -> Option<CollectMode> {
        let (mode, len) = if self.peek_str("**") {
            (CollectMode::All, 2)
        } else if self.peek_char_is('*') {
            (CollectMode::Until, 1)
        } else if self.peek_char_is('$') {
            (CollectMode::Terminal, 1)
        } else if self.peek_char_is('?') {
            (CollectMode::Search, 1)
        } else {
            return None;
        };
        self.pos += len;
        Some(mode)
    }

    // ========================================================================
    // Filters
    // ========================================================================

    fn parse_filter_calls(&mut self) -> Result<Vec<FilterOp>> {
        let mut filters = Vec::new();
        loop {
            if self.peek_char_is('(') {
                if !self.group_is_filter_args() {
                    break;
                }
                self.pos += 1;
                let args = self.parse_filter_args()?;
                filters.push(FilterOp::new(FilterMethod::Filter, args));
            } else if self.peek_char_is('.') {
                self.pos += 1;
                let name_pos = self.pos;
                let name = self.parse_identifier()?;
                let method = FilterMethod::from_name(&name).ok_or_else(|| {
                    self.error_at(name_pos, format!("unknown filter method '{}'", name))
                })?;
                if !self.peek_char_is('(') {
                    return Err(self.error(format!("expected '(' after .{}", name)));
                }
                self.pos += 1;
                let args = self.parse_filter_args()?;
                filters.push(FilterOp::new(method, args));
            } else {
                break;
            }
        }
        Ok(filters)
    }

    /// Looks past an opening parenthesis: a nested `Model.rel` or a step
    /// marker means the group is a sub-query, not an argument list
    fn group_is_filter_args(&self) -> bool {
        let rest = self.input[self.pos + 1..].trim_start();
        let mut chars = rest.chars();
        match chars.next() {
            Some(c) if is_identifier_start(c) => {
                let after = rest.trim_start_matches(is_identifier_char);
                !after.starts_with('.')
            }
            Some('-') => !matches!(chars.next(), Some('(')),
            Some('+') | Some('?') | Some('(') | Some(',') => false,
            _ => true,
        }
    }

    /// Arguments up to and including the closing parenthesis
    fn parse_filter_args(&mut self) -> Result<FilterArgs> {
        self.skip_whitespace();
        if self.try_char(')') {
            return Ok(FilterArgs::Kwargs(Vec::new()));
        }

        if self.peek_char_is_identifier_start() {
            let name = self.parse_identifier()?;
            self.skip_whitespace();
            if !self.peek_char_is('=') {
                self.expect_char(')')?;
                return Ok(FilterArgs::Field(name));
            }
            let mut kwargs = Vec::new();
            let mut key = name;
            loop {
                self.expect_char('=')?;
                self.skip_whitespace();
                let value = self.parse_value()?;
                kwargs.push((key, value));
                if !self.try_char(',') {
                    break;
                }
                self.skip_whitespace();
                key = self.parse_identifier()?;
                self.skip_whitespace();
            }
            self.expect_char(')')?;
            return Ok(FilterArgs::Kwargs(kwargs));
        }

        if self.peek_char_is('-') || self.peek_char_is_digit() {
            let n = self.parse_integer()?;
            self.expect_char(')')?;
            return Ok(FilterArgs::Int(n));
        }

        Err(self.error("expected filter arguments"))
    }

    // ========================================================================
    // Values
    // ========================================================================

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek_char() {
            Some('[') | Some('(') => self.parse_array(),
            Some('"') | Some('\'') => Ok(Value::String(self.parse_string()?)),
            Some('t') if matches!(self.peek_nth_char(1), Some('"') | Some('\'')) => {
                let start = self.pos;
                self.pos += 1;
                let phrase = self.parse_string()?;
                date::resolve(&phrase, self.now)
                    .map(Value::DateTime)
                    .ok_or_else(|| {
                        self.error_at(start, format!("cannot understand date '{}'", phrase))
                    })
            }
            Some('-') => self.parse_number(),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            _ => {
                if self.try_keyword("True") {
                    Ok(Value::Bool(true))
                } else if self.try_keyword("False") {
                    Ok(Value::Bool(false))
                } else if self.try_keyword("None") {
                    Ok(Value::Null)
                } else {
                    Err(self.error("expected a value"))
                }
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            items.push(self.parse_value()?);
            if !self.try_char(',') {
                break;
            }
        }
        self.skip_whitespace();
        if self.peek_char_is(']') || self.peek_char_is(')') {
            self.pos += 1;
            Ok(Value::List(items))
        } else {
            Err(self.error("expected ']' or ')' to close the array"))
        }
    }

    /// `-?[0-9]+(\.[0-9]+)?`
    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek_char_is('-') {
            self.pos += 1;
        }
        self.skip_digits();
        if self.pos == start || &self.input[start..self.pos] == "-" {
            return Err(self.error("expected a number"));
        }
        if self.peek_char_is('.')
            && self
                .peek_nth_char(1)
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            self.pos += 1;
            self.skip_digits();
            let text = &self.input[start..self.pos];
            return text
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.error_at(start, format!("invalid float '{}'", text)));
        }
        let text = &self.input[start..self.pos];
        text.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| self.error_at(start, format!("integer out of range '{}'", text)))
    }

    fn parse_integer(&mut self) -> Result<i64> {
        let start = self.pos;
        match self.parse_number()? {
            Value::Int(n) => Ok(n),
            _ => Err(self.error_at(start, "expected an integer")),
        }
    }

    /// Quoted string without escape sequences
    fn parse_string(&mut self) -> Result<String> {
        let quote = match self.peek_char() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        let start = self.pos;
        self.pos += 1;
        match self.input[self.pos..].find(quote) {
            Some(len) => {
                let s = self.input[self.pos..self.pos + len].to_string();
                self.pos += len + 1;
                Ok(s)
            }
            None => Err(self.error_at(start, "unterminated string")),
        }
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn skip_digits(&mut self) {
        while self.peek_char_is_digit() {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_nth_char(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    fn peek_char_is(&self, c: char) -> bool {
        self.peek_char() == Some(c)
    }

    fn peek_char_is_digit(&self) -> bool {
        self.peek_char()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    }

    fn peek_char_is_identifier_start(&self) -> bool {
        self.peek_char().map(is_identifier_start).unwrap_or(false)
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn try_char(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek_char() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, c: char) -> Result<()> {
        if self.try_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    /// Case-sensitive keyword not followed by an identifier character
    fn try_keyword(&mut self, keyword: &str) -> bool {
        if !self.peek_str(keyword) {
            return false;
        }
        let next = self.input[self.pos + keyword.len()..].chars().next();
        if next.map(is_identifier_char).unwrap_or(false) {
            return false;
        }
        self.pos += keyword.len();
        true
    }

    /// `[_A-Za-z][_A-Za-z0-9]*`
    fn parse_identifier(&mut self) -> Result<String> {
        let start = self.pos;
        match self.peek_char() {
            Some(c) if is_identifier_start(c) => self.pos += 1,
            _ => return Err(self.error("expected identifier")),
        }
        while let Some(c) = self.peek_char() {
            if is_identifier_char(c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn error(&self, message: impl Into<String>) -> Error {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> Error {
        let rest = &self.input[position..];
        let fragment = if rest.is_empty() {
            "<end of input>".to_string()
        } else {
            rest.chars().take(24).collect()
        };
        Error::Syntax {
            position,
            fragment,
            message: message.into(),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a query string
pub fn parse(query: &str) -> Result<QueryAst> {
    QueryParser::new(query).parse()
}
