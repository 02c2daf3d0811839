//! Query documents for ghql.
//!
//! A small executable-document front end: operations, variables, aliases,
//! arguments and nested selections. Fragments and directives are rejected
//! at parse time. Planning validates a document against the [`Registry`].

use crate::error::ErrorCode;
use crate::schema::{ObjectType, Registry};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error raised while parsing or planning a query document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("document contains no operation")]
    NoOperation,

    #[error("document contains several operations; an operation name is required")]
    AmbiguousOperation,

    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("{0} operations are not supported")]
    UnsupportedOperation(&'static str),

    #[error("cannot query field `{field}` on type `{type_name}`")]
    UnknownField { type_name: String, field: String },

    #[error("unknown argument `{argument}` on field `{field}`")]
    UnknownArgument { field: String, argument: String },

    #[error("field `{field}` of type `{type_name}` must not have a selection of subfields")]
    UnexpectedSelection { field: String, type_name: String },

    #[error("field `{field}` of type `{type_name}` must have a selection of subfields")]
    MissingSelection { field: String, type_name: String },

    #[error("field `{0}` may be selected at most once per operation")]
    DuplicateUpstreamField(String),

    #[error("variable `${0}` is not defined by the operation")]
    UndefinedVariable(String),

    #[error("type `{0}` is not declared in the registry")]
    UnknownType(String),

    #[error("fields `{first}` and `{second}` cannot both use the response key `{key}`")]
    ConflictingResponseKey {
        key: String,
        first: String,
        second: String,
    },
}

impl QueryError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Syntax { .. } => ErrorCode::ParseError,
            _ => ErrorCode::ValidationError,
        }
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> QueryError {
    QueryError::Syntax {
        offset,
        message: message.into(),
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Name(String),
    Str(String),
    Int(i64),
    Float(f64),
    Dollar,
    Bang,
    Equals,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name `{name}`"),
            Self::Str(_) => f.write_str("string"),
            Self::Int(_) | Self::Float(_) => f.write_str("number"),
            Self::Dollar => f.write_str("`$`"),
            Self::Bang => f.write_str("`!`"),
            Self::Equals => f.write_str("`=`"),
            Self::Colon => f.write_str("`:`"),
            Self::LParen => f.write_str("`(`"),
            Self::RParen => f.write_str("`)`"),
            Self::LBrace => f.write_str("`{`"),
            Self::RBrace => f.write_str("`}`"),
            Self::LBracket => f.write_str("`[`"),
            Self::RBracket => f.write_str("`]`"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
    }

    fn next_token(&mut self) -> Result<Token, QueryError> {
        self.skip_trivia();

        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset: start,
            });
        };

        let kind = match c {
            b'{' => self.punct(TokenKind::LBrace),
            b'}' => self.punct(TokenKind::RBrace),
            b'(' => self.punct(TokenKind::LParen),
            b')' => self.punct(TokenKind::RParen),
            b'[' => self.punct(TokenKind::LBracket),
            b']' => self.punct(TokenKind::RBracket),
            b':' => self.punct(TokenKind::Colon),
            b'$' => self.punct(TokenKind::Dollar),
            b'!' => self.punct(TokenKind::Bang),
            b'=' => self.punct(TokenKind::Equals),
            b'"' => self.scan_string(start)?,
            b'-' | b'0'..=b'9' => self.scan_number(start)?,
            c if c.is_ascii_alphabetic() || c == b'_' => self.scan_name(start),
            b'.' => return Err(syntax(start, "fragments are not supported")),
            b'@' => return Err(syntax(start, "directives are not supported")),
            _ => {
                let ch = self
                    .source
                    .get(start..)
                    .and_then(|rest| rest.chars().next())
                    .unwrap_or('?');
                return Err(syntax(start, format!("unexpected character `{ch}`")));
            }
        };

        Ok(Token {
            kind,
            offset: start,
        })
    }

    fn punct(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                // Commas are insignificant in GraphQL.
                Some(b' ' | b'\t' | b'\r' | b'\n' | b',') => self.advance(),
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(0xEF) if self.peek_at(1) == Some(0xBB) && self.peek_at(2) == Some(0xBF) => {
                    self.pos += 3;
                }
                _ => break,
            }
        }
    }

    fn scan_name(&mut self, start: usize) -> TokenKind {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Name(self.source[start..self.pos].to_string())
    }

    fn eat_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
    }

    fn scan_number(&mut self, start: usize) -> Result<TokenKind, QueryError> {
        if self.peek() == Some(b'-') {
            self.advance();
        }
        self.eat_digits();

        let mut is_float = false;
        if self.peek() == Some(b'.') {
            is_float = true;
            self.advance();
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            self.eat_digits();
        }

        let text = &self.source[start..self.pos];
        let invalid = || syntax(start, format!("invalid number `{text}`"));
        if is_float {
            text.parse().map(TokenKind::Float).map_err(|_| invalid())
        } else {
            text.parse().map(TokenKind::Int).map_err(|_| invalid())
        }
    }

    fn scan_string(&mut self, start: usize) -> Result<TokenKind, QueryError> {
        self.advance();
        if self.peek() == Some(b'"') && self.peek_at(1) == Some(b'"') {
            self.pos += 2;
            return self.scan_block_string(start);
        }

        let source = self.source;
        let body_start = self.pos;
        let mut value = String::new();
        let mut chars = source[body_start..].char_indices();

        while let Some((i, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.pos = body_start + i + 1;
                    return Ok(TokenKind::Str(value));
                }
                '\n' | '\r' => break,
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    let unescaped = match escaped {
                        '"' => '"',
                        '\\' => '\\',
                        '/' => '/',
                        'b' => '\u{8}',
                        'f' => '\u{c}',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        'u' => {
                            let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                            u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or_else(|| {
                                    syntax(body_start + i, format!("invalid unicode escape `\\u{hex}`"))
                                })?
                        }
                        other => {
                            return Err(syntax(
                                body_start + i,
                                format!("invalid escape sequence `\\{other}`"),
                            ))
                        }
                    };
                    value.push(unescaped);
                }
                _ => value.push(ch),
            }
        }

        Err(syntax(start, "unterminated string"))
    }

    fn scan_block_string(&mut self, start: usize) -> Result<TokenKind, QueryError> {
        let body_start = self.pos;
        let rest = &self.source[body_start..];
        let mut search = 0;

        while let Some(found) = rest[search..].find("\"\"\"") {
            let end = search + found;
            if rest[..end].ends_with('\\') {
                search = end + 3;
                continue;
            }
            self.pos = body_start + end + 3;
            let raw = rest[..end].replace("\\\"\"\"", "\"\"\"");
            return Ok(TokenKind::Str(raw.trim().to_string()));
        }

        Err(syntax(start, "unterminated block string"))
    }
}

// ============================================================================
// AST
// ============================================================================

/// A parsed executable document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub operations: Vec<Operation>,
}

/// Kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// An operation definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: Vec<Field>,
    pub offset: usize,
}

/// A variable definition, e.g. `$login: String = "ada"`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

/// A type reference in a variable definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub selection_set: Option<Vec<Field>>,
    pub offset: usize,
}

impl Field {
    /// The key this field is reported under.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An argument value, possibly referring to variables.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Variable(String),
    Const(Value),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    /// Substitutes variables.
    ///
    /// Returns `None` when the value is a variable the caller did not
    /// provide, so the argument counts as absent. Unprovided variables
    /// nested in lists or objects become `null`.
    pub fn bind(&self, variables: &serde_json::Map<String, Value>) -> Option<Value> {
        match self {
            Self::Variable(name) => variables.get(name).cloned(),
            Self::Const(value) => Some(value.clone()),
            Self::List(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.bind(variables).unwrap_or(Value::Null))
                    .collect(),
            )),
            Self::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.bind(variables).unwrap_or(Value::Null)))
                    .collect(),
            )),
        }
    }

    fn visit_variables<'v>(&'v self, out: &mut Vec<&'v str>) {
        match self {
            Self::Variable(name) => out.push(name),
            Self::Const(_) => {}
            Self::List(items) => items.iter().for_each(|item| item.visit_variables(out)),
            Self::Object(fields) => fields.iter().for_each(|(_, v)| v.visit_variables(out)),
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Nesting limit applied by [`parse`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parses a query document, nesting at most [`DEFAULT_MAX_DEPTH`] levels.
pub fn parse(source: &str) -> Result<Document, QueryError> {
    parse_with_max_depth(source, DEFAULT_MAX_DEPTH)
}

/// Parses a query document.
///
/// Selection sets, list values and object values each count as one level
/// of nesting; a document nesting deeper than `max_depth` is a syntax
/// error.
pub fn parse_with_max_depth(source: &str, max_depth: usize) -> Result<Document, QueryError> {
    Parser::new(source, max_depth)?.parse_document()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, max_depth: usize) -> Result<Self, QueryError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            depth: 0,
            max_depth,
        })
    }

    fn descend(&mut self) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(syntax(
                self.current.offset,
                format!("document nests deeper than {} levels", self.max_depth),
            ));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn advance(&mut self) -> Result<(), QueryError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    #[inline]
    fn at(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Name(name) if name == keyword)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), QueryError> {
        if self.at(&kind) {
            self.advance()
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> QueryError {
        syntax(
            self.current.offset,
            format!("expected {expected}, found {}", self.current.kind),
        )
    }

    fn parse_name(&mut self) -> Result<String, QueryError> {
        match &self.current.kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn parse_document(&mut self) -> Result<Document, QueryError> {
        let mut operations = Vec::new();
        while !self.at(&TokenKind::Eof) {
            operations.push(self.parse_operation()?);
        }
        Ok(Document { operations })
    }

    fn parse_operation(&mut self) -> Result<Operation, QueryError> {
        let offset = self.current.offset;

        // Shorthand `{ ... }` query.
        if self.at(&TokenKind::LBrace) {
            return Ok(Operation {
                kind: OperationKind::Query,
                name: None,
                variables: Vec::new(),
                selection_set: self.parse_selection_set()?,
                offset,
            });
        }

        let kind = if self.at_keyword("query") {
            OperationKind::Query
        } else if self.at_keyword("mutation") {
            OperationKind::Mutation
        } else if self.at_keyword("subscription") {
            OperationKind::Subscription
        } else if self.at_keyword("fragment") {
            return Err(syntax(offset, "fragments are not supported"));
        } else {
            return Err(self.unexpected("an operation"));
        };
        self.advance()?;

        let name = if matches!(self.current.kind, TokenKind::Name(_)) {
            Some(self.parse_name()?)
        } else {
            None
        };

        let variables = if self.at(&TokenKind::LParen) {
            self.parse_variable_definitions()?
        } else {
            Vec::new()
        };

        Ok(Operation {
            kind,
            name,
            variables,
            selection_set: self.parse_selection_set()?,
            offset,
        })
    }

    fn parse_variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, QueryError> {
        self.expect(TokenKind::LParen)?;
        let mut definitions = Vec::new();

        while !self.at(&TokenKind::RParen) {
            self.expect(TokenKind::Dollar)?;
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            let default_value = if self.at(&TokenKind::Equals) {
                self.advance()?;
                match self.parse_value(true)? {
                    InputValue::Const(value) => Some(value),
                    other => other.bind(&serde_json::Map::new()),
                }
            } else {
                None
            };
            definitions.push(VariableDefinition {
                name,
                ty,
                default_value,
            });
        }

        self.expect(TokenKind::RParen)?;
        Ok(definitions)
    }

    fn parse_type(&mut self) -> Result<TypeRef, QueryError> {
        let inner = if self.at(&TokenKind::LBracket) {
            self.advance()?;
            let item = self.parse_type()?;
            self.expect(TokenKind::RBracket)?;
            TypeRef::List(Box::new(item))
        } else {
            TypeRef::Named(self.parse_name()?)
        };

        if self.at(&TokenKind::Bang) {
            self.advance()?;
            Ok(TypeRef::NonNull(Box::new(inner)))
        } else {
            Ok(inner)
        }
    }

    fn parse_selection_set(&mut self) -> Result<Vec<Field>, QueryError> {
        self.descend()?;
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();

        while !self.at(&TokenKind::RBrace) {
            fields.push(self.parse_field()?);
        }
        if fields.is_empty() {
            return Err(self.unexpected("a field"));
        }

        self.expect(TokenKind::RBrace)?;
        self.ascend();
        Ok(fields)
    }

    fn parse_field(&mut self) -> Result<Field, QueryError> {
        let offset = self.current.offset;
        let first = self.parse_name()?;
        let (alias, name) = if self.at(&TokenKind::Colon) {
            self.advance()?;
            (Some(first), self.parse_name()?)
        } else {
            (None, first)
        };

        let arguments = if self.at(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        let selection_set = if self.at(&TokenKind::LBrace) {
            Some(self.parse_selection_set()?)
        } else {
            None
        };

        Ok(Field {
            alias,
            name,
            arguments,
            selection_set,
            offset,
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<(String, InputValue)>, QueryError> {
        self.expect(TokenKind::LParen)?;
        let mut arguments = Vec::new();

        while !self.at(&TokenKind::RParen) {
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            arguments.push((name, self.parse_value(false)?));
        }
        if arguments.is_empty() {
            return Err(self.unexpected("an argument"));
        }

        self.expect(TokenKind::RParen)?;
        Ok(arguments)
    }

    fn parse_value(&mut self, constant: bool) -> Result<InputValue, QueryError> {
        let offset = self.current.offset;
        let value = match &self.current.kind {
            TokenKind::Dollar if constant => {
                return Err(syntax(offset, "variables are not allowed in default values"));
            }
            TokenKind::Dollar => {
                self.advance()?;
                return Ok(InputValue::Variable(self.parse_name()?));
            }
            TokenKind::Str(s) => Value::String(s.clone()),
            TokenKind::Int(i) => Value::from(*i),
            TokenKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| syntax(offset, "number out of range"))?,
            TokenKind::Name(name) => match name.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                // Enum values travel as their names.
                _ => Value::String(name.clone()),
            },
            TokenKind::LBracket => {
                self.descend()?;
                self.advance()?;
                let mut items = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    items.push(self.parse_value(constant)?);
                }
                self.advance()?;
                self.ascend();
                return Ok(InputValue::List(items));
            }
            TokenKind::LBrace => {
                self.descend()?;
                self.advance()?;
                let mut fields = Vec::new();
                while !self.at(&TokenKind::RBrace) {
                    let name = self.parse_name()?;
                    self.expect(TokenKind::Colon)?;
                    fields.push((name, self.parse_value(constant)?));
                }
                self.advance()?;
                self.ascend();
                return Ok(InputValue::Object(fields));
            }
            _ => return Err(self.unexpected("a value")),
        };

        self.advance()?;
        Ok(InputValue::Const(value))
    }
}

// ============================================================================
// Planning
// ============================================================================

/// A validated plan for one operation.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub operation_name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub root: Vec<RootSelection>,
}

/// A selection on the query root.
#[derive(Debug, Clone)]
pub enum RootSelection {
    /// `__typename` on the query root.
    Typename { response_key: String },
    /// The upstream-backed root field.
    Upstream {
        response_key: String,
        arguments: Vec<(String, InputValue)>,
        return_type: String,
        selection: Vec<PlannedField>,
    },
}

/// A validated field selection on an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedField {
    pub response_key: String,
    pub kind: PlannedKind,
}

/// What a planned field resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedKind {
    Typename,
    Field(String),
}

impl PlannedField {
    /// A declared field reported under `response_key`.
    pub fn field(response_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            response_key: response_key.into(),
            kind: PlannedKind::Field(name.into()),
        }
    }

    /// `__typename` reported under `response_key`.
    pub fn typename(response_key: impl Into<String>) -> Self {
        Self {
            response_key: response_key.into(),
            kind: PlannedKind::Typename,
        }
    }
}

const TYPENAME: &str = "__typename";

/// Validates documents against a registry and produces query plans.
#[derive(Debug)]
pub struct QueryPlanner<'r> {
    registry: &'r Registry,
}

impl<'r> QueryPlanner<'r> {
    /// Creates a planner over the given registry.
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Plans the selected operation of `document`.
    pub fn plan(
        &self,
        document: &Document,
        operation_name: Option<&str>,
    ) -> Result<QueryPlan, QueryError> {
        let operation = select_operation(document, operation_name)?;
        if operation.kind != OperationKind::Query {
            return Err(QueryError::UnsupportedOperation(operation.kind.as_str()));
        }

        let root_field = self.registry.root_field();
        let mut root = Vec::with_capacity(operation.selection_set.len());
        let mut keys = ResponseKeys::default();
        let mut upstream_seen = false;

        for field in &operation.selection_set {
            let response_key = field.response_key().to_string();

            if field.name == TYPENAME {
                check_leaf(field, self.registry.query_type())?;
                if keys.insert(field)? {
                    root.push(RootSelection::Typename { response_key });
                }
                continue;
            }

            if field.name != root_field.name {
                return Err(QueryError::UnknownField {
                    type_name: self.registry.query_type().to_string(),
                    field: field.name.clone(),
                });
            }
            if upstream_seen {
                return Err(QueryError::DuplicateUpstreamField(field.name.clone()));
            }
            upstream_seen = true;
            keys.insert(field)?;

            for (argument, value) in &field.arguments {
                if !root_field.arguments.contains_key(argument) {
                    return Err(QueryError::UnknownArgument {
                        field: field.name.clone(),
                        argument: argument.clone(),
                    });
                }
                check_variables_defined(value, operation)?;
            }

            let object = self
                .registry
                .object(&root_field.return_type)
                .ok_or_else(|| QueryError::UnknownType(root_field.return_type.clone()))?;
            let Some(selection) = &field.selection_set else {
                return Err(QueryError::MissingSelection {
                    field: field.name.clone(),
                    type_name: object.name.clone(),
                });
            };

            root.push(RootSelection::Upstream {
                response_key,
                arguments: field.arguments.clone(),
                return_type: object.name.clone(),
                selection: plan_object(object, selection)?,
            });
        }

        Ok(QueryPlan {
            operation_name: operation.name.clone(),
            variables: operation.variables.clone(),
            root,
        })
    }
}

fn select_operation<'d>(
    document: &'d Document,
    operation_name: Option<&str>,
) -> Result<&'d Operation, QueryError> {
    match operation_name {
        Some(name) => document
            .operations
            .iter()
            .find(|op| op.name.as_deref() == Some(name))
            .ok_or_else(|| QueryError::UnknownOperation(name.to_string())),
        None => match document.operations.as_slice() {
            [] => Err(QueryError::NoOperation),
            [single] => Ok(single),
            _ => Err(QueryError::AmbiguousOperation),
        },
    }
}

/// Response keys already claimed in one selection set, with the field each
/// one selects.
#[derive(Default)]
struct ResponseKeys<'d> {
    seen: Vec<(&'d str, &'d str)>,
}

impl<'d> ResponseKeys<'d> {
    /// Claims `field`'s response key. Returns `false` when the same field
    /// already holds the key, in which case the selections merge.
    fn insert(&mut self, field: &'d Field) -> Result<bool, QueryError> {
        let key = field.response_key();
        match self.seen.iter().find(|(seen, _)| *seen == key) {
            None => {
                self.seen.push((key, &field.name));
                Ok(true)
            }
            Some((_, name)) if *name == field.name => Ok(false),
            Some((_, name)) => Err(QueryError::ConflictingResponseKey {
                key: key.to_string(),
                first: (*name).to_string(),
                second: field.name.clone(),
            }),
        }
    }
}

fn plan_object(object: &ObjectType, selection: &[Field]) -> Result<Vec<PlannedField>, QueryError> {
    let mut keys = ResponseKeys::default();
    let mut planned = Vec::with_capacity(selection.len());

    for field in selection {
        let response_key = field.response_key();
        let next = if field.name == TYPENAME {
            check_leaf(field, &object.name)?;
            PlannedField::typename(response_key)
        } else {
            let spec = object
                .get_field(&field.name)
                .ok_or_else(|| QueryError::UnknownField {
                    type_name: object.name.clone(),
                    field: field.name.clone(),
                })?;
            check_leaf(field, spec.ty.name())?;
            PlannedField::field(response_key, spec.name.clone())
        };

        if keys.insert(field)? {
            planned.push(next);
        }
    }

    Ok(planned)
}

/// Scalar fields take no arguments and no subselection.
fn check_leaf(field: &Field, type_name: &str) -> Result<(), QueryError> {
    if let Some((argument, _)) = field.arguments.first() {
        return Err(QueryError::UnknownArgument {
            field: field.name.clone(),
            argument: argument.clone(),
        });
    }
    if field.selection_set.is_some() {
        return Err(QueryError::UnexpectedSelection {
            field: field.name.clone(),
            type_name: type_name.to_string(),
        });
    }
    Ok(())
}

fn check_variables_defined(value: &InputValue, operation: &Operation) -> Result<(), QueryError> {
    let mut used = Vec::new();
    value.visit_variables(&mut used);
    match used
        .into_iter()
        .find(|name| !operation.variables.iter().any(|def| def.name == *name))
    {
        Some(name) => Err(QueryError::UndefinedVariable(name.to_string())),
        None => Ok(()),
    }
}
