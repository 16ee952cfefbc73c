//! Recursive descent parser for executable GraphQL documents.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use grove_core::{diagnostics::codes, DiagnosticBag, Span};

/// Parser for executable documents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    /// End offset of the previously consumed token.
    prev_end: u32,
    diagnostics: DiagnosticBag,
}

/// Result of parsing.
pub struct ParseResult {
    pub document: Document,
    pub diagnostics: DiagnosticBag,
}

impl ParseResult {
    /// Converts the result into the document, or the first reported error.
    pub fn into_result(self, source: &str) -> Result<Document, ParseError> {
        match self.diagnostics.errors().next() {
            Some(diagnostic) => Err(ParseError::from_diagnostic(diagnostic, source)),
            None => Ok(self.document),
        }
    }
}

/// Parses a source string into a document, collecting diagnostics.
pub fn parse(source: &str) -> ParseResult {
    let mut parser = Parser::new(source);
    let document = parser.parse_document();
    ParseResult {
        document,
        diagnostics: parser.diagnostics,
    }
}

/// Parses a source string, failing on the first syntax error.
pub fn parse_document(source: &str) -> Result<Document, ParseError> {
    parse(source).into_result(source)
}

const TYPE_SYSTEM_KEYWORDS: &[&str] = &[
    "schema",
    "scalar",
    "type",
    "interface",
    "union",
    "enum",
    "input",
    "directive",
    "extend",
];

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            prev_end: 0,
            diagnostics: DiagnosticBag::new(),
        }
    }

    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Returns true if at a name token with the given text.
    #[inline]
    fn at_keyword(&self, keyword: &str) -> bool {
        self.at_kind(TokenKind::Name) && self.current_text() == keyword
    }

    fn advance(&mut self) {
        self.prev_end = self.current.span.end;
        self.current = self.lexer.next_token();
    }

    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.at_kind(kind) {
            self.advance();
            true
        } else {
            self.error_expected(kind.as_str());
            false
        }
    }

    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>) {
        let message = message.into();
        self.diagnostics
            .error(code, message.clone(), self.current.span, message);
    }

    fn error_expected(&mut self, expected: &str) {
        let (code, found) = match self.at() {
            TokenKind::Eof => (codes::UNEXPECTED_EOF, "end of input".to_string()),
            TokenKind::Name => (codes::UNEXPECTED_TOKEN, format!("`{}`", self.current_text())),
            kind => (codes::UNEXPECTED_TOKEN, format!("`{kind}`")),
        };
        self.diagnostics.error(
            code,
            "unexpected token",
            self.current.span,
            format!("expected `{expected}`, found {found}"),
        );
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> Document {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        while !self.at_kind(TokenKind::Eof) {
            let before = self.current.span.start;
            if let Some(def) = self.parse_definition() {
                definitions.push(def);
            }
            if self.current.span.start == before && !self.at_kind(TokenKind::Eof) {
                // Recovery: always make progress.
                self.advance();
            }
        }

        Document {
            definitions,
            span: self.span_from(start),
        }
    }

    fn parse_definition(&mut self) -> Option<Definition> {
        // Descriptions only precede type system definitions.
        if matches!(
            self.at(),
            TokenKind::StringLiteral | TokenKind::BlockStringLiteral
        ) {
            self.advance();
        }

        match self.at() {
            TokenKind::LBrace => Some(Definition::Operation(self.parse_operation())),
            TokenKind::Name => match self.current_text() {
                "query" | "mutation" | "subscription" => {
                    Some(Definition::Operation(self.parse_operation()))
                }
                "fragment" => Some(Definition::Fragment(self.parse_fragment_definition())),
                keyword if TYPE_SYSTEM_KEYWORDS.contains(&keyword) => {
                    self.error(
                        codes::TYPE_SYSTEM_DEFINITION,
                        format!("`{keyword}` definitions are not executable"),
                    );
                    self.skip_type_system_definition();
                    None
                }
                _ => {
                    self.error(codes::INVALID_SYNTAX, "expected definition");
                    None
                }
            },
            _ => {
                self.error(codes::INVALID_SYNTAX, "expected definition");
                None
            }
        }
    }

    /// Skips tokens up to and including the next balanced `{ ... }` block, or
    /// up to the next executable definition keyword.
    fn skip_type_system_definition(&mut self) {
        let mut depth = 0usize;
        self.advance();
        loop {
            match self.at() {
                TokenKind::Eof => return,
                TokenKind::Name
                    if depth == 0
                        && matches!(
                            self.current_text(),
                            "query" | "mutation" | "subscription" | "fragment"
                        ) =>
                {
                    return
                }
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_name(&mut self) -> Name {
        if self.at_kind(TokenKind::Name) {
            let name = Name::new(self.current_text(), self.current.span);
            self.advance();
            name
        } else {
            self.error_expected("name");
            Name::new(String::new(), Span::empty(self.current.span.start))
        }
    }

    fn parse_operation(&mut self) -> OperationDefinition {
        let start = self.current.span.start;

        let (operation, name) = if self.at_kind(TokenKind::LBrace) {
            // Query shorthand
            (OperationType::Query, None)
        } else {
            let op = match self.current_text() {
                "mutation" => OperationType::Mutation,
                "subscription" => OperationType::Subscription,
                _ => OperationType::Query,
            };
            self.advance();

            let name = self
                .at_kind(TokenKind::Name)
                .then(|| self.parse_name());
            (op, name)
        };

        let variables = if self.at_kind(TokenKind::LParen) {
            self.advance();
            let vars = self.parse_variable_definitions();
            self.expect(TokenKind::RParen);
            vars
        } else {
            Vec::new()
        };

        let directives = self.parse_directives();
        let selection_set = self.parse_selection_set();

        OperationDefinition {
            operation,
            name,
            variables,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_variable_definitions(&mut self) -> Vec<VariableDefinition> {
        let mut vars = Vec::new();
        while self.at_kind(TokenKind::Dollar) {
            vars.push(self.parse_variable_definition());
        }
        if vars.is_empty() {
            self.error_expected("$");
        }
        vars
    }

    fn parse_variable_definition(&mut self) -> VariableDefinition {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar);
        let name = self.parse_name();
        self.expect(TokenKind::Colon);
        let ty = self.parse_type();

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            let value = self.parse_value();
            if !value.is_const() {
                self.diagnostics.error(
                    codes::INVALID_SYNTAX,
                    "unexpected variable",
                    value.span(),
                    "default values must be constant",
                );
            }
            Some(value)
        } else {
            None
        };

        let directives = self.parse_directives();

        VariableDefinition {
            name,
            ty,
            default_value,
            directives,
            span: self.span_from(start),
        }
    }

    fn parse_type(&mut self) -> Type {
        let start = self.current.span.start;

        let base = if self.at_kind(TokenKind::LBracket) {
            self.advance();
            let inner = self.parse_type();
            self.expect(TokenKind::RBracket);
            Type::List(Box::new(inner), self.span_from(start))
        } else {
            Type::Named(self.parse_name())
        };

        if self.at_kind(TokenKind::Bang) {
            self.advance();
            Type::NonNull(Box::new(base), self.span_from(start))
        } else {
            base
        }
    }

    fn parse_fragment_definition(&mut self) -> FragmentDefinition {
        let start = self.current.span.start;
        self.advance(); // fragment

        let name = self.parse_name();
        if name.value == "on" {
            self.diagnostics.error(
                codes::INVALID_SYNTAX,
                "invalid fragment name",
                name.span,
                "a fragment cannot be named `on`",
            );
        }
        if self.at_keyword("on") {
            self.advance();
        } else {
            self.error_expected("on");
        }
        let type_condition = self.parse_name();
        let directives = self.parse_directives();
        let selection_set = self.parse_selection_set();

        FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_selection_set(&mut self) -> SelectionSet {
        let start = self.current.span.start;
        if !self.expect(TokenKind::LBrace) {
            return SelectionSet {
                selections: Vec::new(),
                span: Span::empty(start),
            };
        }

        let mut selections = Vec::new();
        while !self.at_kind(TokenKind::RBrace) && !self.at_kind(TokenKind::Eof) {
            let before = self.current.span.start;
            if let Some(selection) = self.parse_selection() {
                selections.push(selection);
            }
            if self.current.span.start == before {
                self.advance();
            }
        }
        if selections.is_empty() {
            self.error(codes::INVALID_SYNTAX, "selection set cannot be empty");
        }
        self.expect(TokenKind::RBrace);

        SelectionSet {
            selections,
            span: self.span_from(start),
        }
    }

    fn parse_selection(&mut self) -> Option<Selection> {
        let start = self.current.span.start;
        match self.at() {
            TokenKind::Spread => {
                self.advance();
                if self.at_keyword("on") {
                    self.advance();
                    let type_condition = Some(self.parse_name());
                    Some(self.parse_inline_fragment(start, type_condition))
                } else if self.at_kind(TokenKind::Name) {
                    let name = self.parse_name();
                    let directives = self.parse_directives();
                    Some(Selection::FragmentSpread(FragmentSpread {
                        name,
                        directives,
                        span: self.span_from(start),
                    }))
                } else {
                    Some(self.parse_inline_fragment(start, None))
                }
            }
            TokenKind::Name => Some(Selection::Field(self.parse_field())),
            _ => {
                self.error_expected("name");
                None
            }
        }
    }

    fn parse_inline_fragment(&mut self, start: u32, type_condition: Option<Name>) -> Selection {
        let directives = self.parse_directives();
        let selection_set = self.parse_selection_set();
        Selection::InlineFragment(InlineFragment {
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        })
    }

    fn parse_field(&mut self) -> Field {
        let start = self.current.span.start;

        let first_name = self.parse_name();
        let (alias, name) = if self.at_kind(TokenKind::Colon) {
            self.advance();
            (Some(first_name), self.parse_name())
        } else {
            (None, first_name)
        };

        let arguments = self.parse_arguments();
        let directives = self.parse_directives();

        let selection_set = self
            .at_kind(TokenKind::LBrace)
            .then(|| self.parse_selection_set());

        Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_directives(&mut self) -> Vec<Directive> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) {
            let start = self.current.span.start;
            self.advance();
            let name = self.parse_name();
            let arguments = self.parse_arguments();
            directives.push(Directive {
                name,
                arguments,
                span: self.span_from(start),
            });
        }
        directives
    }

    /// Parses an optional parenthesized argument list.
    fn parse_arguments(&mut self) -> Vec<Argument> {
        if !self.at_kind(TokenKind::LParen) {
            return Vec::new();
        }
        self.advance();

        let mut args = Vec::new();
        while self.at_kind(TokenKind::Name) {
            let start = self.current.span.start;
            let name = self.parse_name();
            self.expect(TokenKind::Colon);
            let value = self.parse_value();
            args.push(Argument {
                name,
                value,
                span: self.span_from(start),
            });
        }
        if args.is_empty() {
            self.error_expected("name");
        }
        self.expect(TokenKind::RParen);
        args
    }

    fn parse_value(&mut self) -> Value {
        let start = self.current.span.start;

        match self.at() {
            TokenKind::Dollar => {
                self.advance();
                Value::Variable(self.parse_name())
            }
            TokenKind::IntLiteral => {
                let text = self.current_text();
                let value = if let Ok(value) = text.parse() {
                    value
                } else {
                    self.error(codes::INVALID_NUMBER, format!("`{text}` is out of range"));
                    0
                };
                self.advance();
                Value::Int(value, self.span_from(start))
            }
            TokenKind::FloatLiteral => {
                let text = self.current_text();
                let value = if let Ok(value) = text.parse() {
                    value
                } else {
                    self.error(codes::INVALID_NUMBER, format!("`{text}` is not a number"));
                    0.0
                };
                self.advance();
                Value::Float(value, self.span_from(start))
            }
            TokenKind::StringLiteral => {
                let text = self.current_text();
                let value = unescape_string(&text[1..text.len() - 1]);
                self.advance();
                Value::String(value, self.span_from(start))
            }
            TokenKind::BlockStringLiteral => {
                let text = self.current_text();
                let value = block_string_value(&text[3..text.len() - 3]);
                self.advance();
                Value::String(value, self.span_from(start))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut values = Vec::new();
                while !self.at_kind(TokenKind::RBracket) && !self.at_kind(TokenKind::Eof) {
                    let before = self.current.span.start;
                    values.push(self.parse_value());
                    if self.current.span.start == before {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket);
                Value::List(values, self.span_from(start))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                while self.at_kind(TokenKind::Name) {
                    let name = self.parse_name();
                    self.expect(TokenKind::Colon);
                    let value = self.parse_value();
                    fields.push((name, value));
                }
                self.expect(TokenKind::RBrace);
                Value::Object(fields, self.span_from(start))
            }
            TokenKind::Name => {
                let name = self.parse_name();
                match name.value.as_str() {
                    "true" => Value::Boolean(true, name.span),
                    "false" => Value::Boolean(false, name.span),
                    "null" => Value::Null(name.span),
                    _ => Value::Enum(name),
                }
            }
            _ => {
                self.error(codes::INVALID_SYNTAX, "expected value");
                Value::Null(Span::empty(start))
            }
        }
    }
}

/// Decodes escape sequences in the body of a quoted string.
fn unescape_string(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32);
                out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Computes the value of a block string: common indentation removed, blank
/// leading/trailing lines dropped.
fn block_string_value(raw: &str) -> String {
    let raw = raw.replace("\\\"\"\"", "\"\"\"");
    let lines: Vec<&str> = raw.lines().collect();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
            (indent < line.len()).then_some(indent)
        })
        .min()
        .unwrap_or(0);

    let mut trimmed: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                *line
            } else {
                line.get(common_indent..).unwrap_or("")
            }
        })
        .collect();

    while trimmed.first().is_some_and(|l| l.trim().is_empty()) {
        trimmed.remove(0);
    }
    while trimmed.last().is_some_and(|l| l.trim().is_empty()) {
        trimmed.pop();
    }
    trimmed.join("\n")
}
