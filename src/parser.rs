use crate::{
    ast::{BinOp, Document, Expr, IfArm, Node},
    error::{ParseError, ParseErrorKind, SprigError},
};

type ParseResult<T> = Result<T, SprigError>;

/// Every directive keyword the scanner recognizes after an `@`. An `@word`
/// outside this set is literal output, so `@media` and friends pass through.
const KEYWORDS: [&str; 11] = [
    "extends",
    "section",
    "endsection",
    "yield",
    "include",
    "if",
    "elseif",
    "else",
    "endif",
    "foreach",
    "endforeach",
];

/// Keywords that close or continue a block and are therefore only legal when
/// the matching block is open.
const CLOSERS: [&str; 5] = ["endif", "endforeach", "endsection", "elseif", "else"];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
    extends: Option<String>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
            extends: None,
        }
    }

    #[inline]
    fn current_column(&self) -> usize {
        self.pos - self.line_start_pos + 1
    }

    #[inline]
    fn make_error(&self, kind: ParseErrorKind) -> SprigError {
        SprigError::Parse(ParseError {
            template_name: None,
            line: self.line,
            column: self.current_column(),
            kind,
        })
    }

    fn structure_error(&self, expected: &str, found: &str) -> SprigError {
        SprigError::Structure {
            template_name: String::new(),
            expected: expected.to_string(),
            found: found.to_string(),
            line: self.line,
            column: self.current_column(),
        }
    }

    /// Advances the parser position by char_len bytes, correctly handling
    /// multi-byte characters. Updates line and column numbers if a newline is
    /// encountered.
    #[inline]
    fn advance_by_char(&mut self, current_char: char, char_len: usize) {
        if current_char == '\n' {
            self.line += 1;
            self.line_start_pos = self.pos + char_len;
        }
        self.pos += char_len;
    }

    /// Advances the parser position by `len` bytes.
    /// This method assumes that the consumed string does NOT contain newlines.
    /// Used for fixed delimiters and keywords.
    #[inline]
    fn advance_bytes_no_newline(&mut self, len: usize) {
        self.pos += len;
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peek if the remaining input starts with `s`
    fn peek(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Consume `s` if the remaining input starts with it.
    /// Assumes `s` does not contain newlines.
    fn consume(&mut self, s: &str) -> bool {
        if self.peek(s) {
            self.advance_bytes_no_newline(s.len());
            true
        } else {
            false
        }
    }

    /// Consume leading whitespace, handling newlines correctly.
    fn consume_whitespace(&mut self) {
        while let Some(current_char) = self.peek_char() {
            if current_char.is_whitespace() {
                self.advance_by_char(current_char, current_char.len_utf8());
            } else {
                break;
            }
        }
    }

    /// Expect `s` to be the start of the remaining input, consume it or
    /// return Err. Assumes `s` does not contain newlines.
    fn expect(&mut self, s: &str) -> ParseResult<()> {
        if self.consume(s) {
            Ok(())
        } else {
            Err(self.make_error(ParseErrorKind::Expected {
                description: format!(
                    "'{}', found '{}'",
                    s,
                    &self.input[self.pos..std::cmp::min(self.pos + s.len() + 10, self.input.len())]
                ),
            }))
        }
    }

    /// Consume and return an identifier (alphanumeric + '_')
    fn consume_identifier(&mut self) -> ParseResult<&'a str> {
        self.consume_whitespace();
        let start = self.pos;
        while let Some(current_char) = self.peek_char() {
            if current_char.is_ascii_alphanumeric() || current_char == '_' {
                self.advance_bytes_no_newline(current_char.len_utf8());
            } else {
                break;
            }
        }
        if start == self.pos {
            Err(self.make_error(ParseErrorKind::Expected {
                description: "identifier".to_string(),
            }))
        } else {
            Ok(&self.input[start..self.pos])
        }
    }

    /// If the input at the cursor is `@` followed by a known directive
    /// keyword, return that keyword without consuming anything.
    fn peek_directive(&self) -> Option<&'a str> {
        if !self.peek("@") {
            return None;
        }
        let rest = &self.input[self.pos + 1..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        let word = &rest[..end];
        KEYWORDS.contains(&word).then_some(word)
    }

    fn consume_directive(&mut self, keyword: &str) {
        // Caller has already peeked; `@` plus the keyword cannot span lines.
        self.advance_bytes_no_newline(1 + keyword.len());
    }

    // --- Node-level parsing ---

    /// Parses nodes until one of `end_keywords` is found at the cursor (left
    /// unconsumed for the caller) or, with no end keywords, until EOF.
    fn parse_nodes_until(&mut self, end_keywords: &[&str]) -> ParseResult<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            if self.eof() {
                if let Some(close) = end_keywords.last() {
                    return Err(self.make_error(ParseErrorKind::unexpected_eof(Some(format!(
                        "@{}",
                        close
                    )))));
                }
                break;
            }

            if self.peek("{!!") {
                nodes.push(self.parse_interpolation(true)?);
            } else if self.peek("{{") {
                nodes.push(self.parse_interpolation(false)?);
            } else if let Some(keyword) = self.peek_directive() {
                if end_keywords.contains(&keyword) {
                    break;
                }
                if CLOSERS.contains(&keyword) {
                    let expected = end_keywords.last().copied().unwrap_or("end of template");
                    return Err(self.structure_error(expected, keyword));
                }
                if let Some(node) = self.parse_directive(keyword)? {
                    nodes.push(node);
                }
            } else {
                let text = self.parse_text();
                if !text.is_empty() {
                    nodes.push(Node::Text(text));
                }
            }
        }
        Ok(nodes)
    }

    /// Accumulates literal text until an interpolation marker or a recognized
    /// directive. `@@` escapes a literal `@`; `@{{` escapes a literal `{{`.
    fn parse_text(&mut self) -> String {
        let mut text = String::new();
        while !self.eof() {
            if self.peek("{{") || self.peek("{!!") {
                break;
            }
            if self.peek("@@") {
                self.advance_bytes_no_newline(2);
                text.push('@');
                continue;
            }
            if self.peek("@{{") {
                self.advance_bytes_no_newline(3);
                text.push_str("{{");
                continue;
            }
            if self.peek_directive().is_some() {
                break;
            }
            // A lone `@` that is not a directive is ordinary output.
            let current_char = self.peek_char().unwrap();
            text.push(current_char);
            self.advance_by_char(current_char, current_char.len_utf8());
        }
        text
    }

    fn parse_interpolation(&mut self, raw: bool) -> ParseResult<Node> {
        let (open, close) = if raw { ("{!!", "!!}") } else { ("{{", "}}") };
        self.expect(open)?;
        self.consume_whitespace();
        let expr = self.parse_expression()?;
        self.consume_whitespace();
        self.expect(close)?;
        Ok(Node::Interpolation { expr, raw })
    }

    /// Parses the directive at the cursor. `@extends` returns no node; it
    /// only records the layout on the parser.
    fn parse_directive(&mut self, keyword: &'a str) -> ParseResult<Option<Node>> {
        self.consume_directive(keyword);
        match keyword {
            "if" => self.parse_if().map(Some),
            "foreach" => self.parse_foreach().map(Some),
            "section" => self.parse_section().map(Some),
            "yield" => self.parse_yield().map(Some),
            "include" => self.parse_include().map(Some),
            "extends" => {
                let name = self.parse_parenthesized_name()?;
                if self.extends.is_some() {
                    return Err(self.make_error(ParseErrorKind::DuplicateExtends));
                }
                self.extends = Some(name);
                Ok(None)
            }
            _ => unreachable!("caller only dispatches opening keywords"),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Node> {
        let mut condition = self.parse_parenthesized_expression()?;
        let mut arms = Vec::new();
        let mut fallback = None;

        loop {
            let body = self.parse_nodes_until(&["elseif", "else", "endif"])?;
            arms.push(IfArm { condition, body });

            // parse_nodes_until guarantees one of the three keywords is next.
            let keyword = self.peek_directive().unwrap();
            self.consume_directive(keyword);
            match keyword {
                "elseif" => {
                    condition = self.parse_parenthesized_expression()?;
                }
                "else" => {
                    let body = self.parse_nodes_until(&["endif"])?;
                    self.consume_directive("endif");
                    fallback = Some(body);
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If { arms, fallback })
    }

    fn parse_foreach(&mut self) -> ParseResult<Node> {
        self.consume_whitespace();
        self.expect("(")?;
        self.consume_whitespace();
        let iterable = self.parse_expression()?;

        let keyword = self.consume_identifier()?;
        if keyword != "as" {
            return Err(self.make_error(ParseErrorKind::Expected {
                description: format!("'as', found '{}'", keyword),
            }));
        }

        let first = self.consume_identifier()?.to_string();
        self.consume_whitespace();
        let (key_var, value_var) = if self.consume("=>") {
            (Some(first), self.consume_identifier()?.to_string())
        } else {
            (None, first)
        };
        self.consume_whitespace();
        self.expect(")")?;

        let body = self.parse_nodes_until(&["endforeach"])?;
        self.consume_directive("endforeach");

        Ok(Node::Foreach {
            iterable,
            key_var,
            value_var,
            body,
        })
    }

    fn parse_section(&mut self) -> ParseResult<Node> {
        let name = self.parse_parenthesized_name()?;
        let body = self.parse_nodes_until(&["endsection"])?;
        self.consume_directive("endsection");
        Ok(Node::Section { name, body })
    }

    fn parse_yield(&mut self) -> ParseResult<Node> {
        self.consume_whitespace();
        self.expect("(")?;
        let name = self.parse_string_literal()?;
        self.consume_whitespace();
        let default = if self.consume(",") {
            self.consume_whitespace();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_whitespace();
        self.expect(")")?;
        Ok(Node::Yield { name, default })
    }

    fn parse_include(&mut self) -> ParseResult<Node> {
        self.consume_whitespace();
        self.expect("(")?;
        let name = self.parse_string_literal()?;
        let mut bindings = Vec::new();
        loop {
            self.consume_whitespace();
            if !self.consume(",") {
                break;
            }
            let key = self.consume_identifier()?.to_string();
            self.consume_whitespace();
            self.expect(":")?;
            self.consume_whitespace();
            bindings.push((key, self.parse_expression()?));
        }
        self.expect(")")?;
        Ok(Node::Include { name, bindings })
    }

    /// `('name')` — the single string argument form shared by
    /// `@extends`/`@section`.
    fn parse_parenthesized_name(&mut self) -> ParseResult<String> {
        self.consume_whitespace();
        self.expect("(")?;
        let name = self.parse_string_literal()?;
        self.consume_whitespace();
        self.expect(")")?;
        Ok(name)
    }

    fn parse_parenthesized_expression(&mut self) -> ParseResult<Expr> {
        self.consume_whitespace();
        self.expect("(")?;
        self.consume_whitespace();
        let expr = self.parse_expression()?;
        self.consume_whitespace();
        self.expect(")")?;
        Ok(expr)
    }

    fn parse_string_literal(&mut self) -> ParseResult<String> {
        self.consume_whitespace();
        let quote = match self.peek_char() {
            Some(c @ ('\'' | '"')) => c,
            _ => {
                return Err(self.make_error(ParseErrorKind::Expected {
                    description: "string literal".to_string(),
                }));
            }
        };
        self.advance_bytes_no_newline(1);

        let mut value = String::new();
        loop {
            let Some(current_char) = self.peek_char() else {
                return Err(self.make_error(ParseErrorKind::UnterminatedString { quote }));
            };
            if current_char == quote {
                self.advance_bytes_no_newline(1);
                return Ok(value);
            }
            if current_char == '\\' {
                self.advance_bytes_no_newline(1);
                let Some(escaped) = self.peek_char() else {
                    return Err(self.make_error(ParseErrorKind::UnterminatedString { quote }));
                };
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                self.advance_by_char(escaped, escaped.len_utf8());
                continue;
            }
            value.push(current_char);
            self.advance_by_char(current_char, current_char.len_utf8());
        }
    }

    // --- Expression parsing (recursive descent) ---
    // Precedence, loosest first: ternary -> || -> && -> equality ->
    // comparison -> unary ! -> postfix access/call -> primary.

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> ParseResult<Expr> {
        let condition = self.parse_or_expression()?;
        self.consume_whitespace();
        if !self.consume("?") {
            return Ok(condition);
        }
        self.consume_whitespace();
        let then = self.parse_expression()?;
        self.consume_whitespace();
        self.expect(":")?;
        self.consume_whitespace();
        let otherwise = self.parse_ternary()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or_expression(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and_expression()?;
        loop {
            self.consume_whitespace();
            if self.consume("||") {
                let right = self.parse_and_expression()?;
                left = Expr::Binary {
                    op: BinOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;
        loop {
            self.consume_whitespace();
            if self.consume("&&") {
                let right = self.parse_equality()?;
                left = Expr::Binary {
                    op: BinOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            self.consume_whitespace();
            // Longest tokens first so `===` is never read as `==` + `=`.
            let op = if self.consume("===") {
                BinOp::EqStrict
            } else if self.consume("!==") {
                BinOp::NeStrict
            } else if self.consume("==") {
                BinOp::EqLoose
            } else if self.consume("!=") {
                BinOp::NeLoose
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            self.consume_whitespace();
            let op = if self.consume("<=") {
                BinOp::Le
            } else if self.consume(">=") {
                BinOp::Ge
            } else if self.consume("<") {
                BinOp::Lt
            } else if self.consume(">") {
                BinOp::Gt
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        self.consume_whitespace();
        // `!` here is negation; `!=`/`!==` only appear in operator position.
        if self.peek("!") && !self.peek("!=") {
            self.advance_bytes_no_newline(1);
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            self.consume_whitespace();
            if self.consume(".") {
                let name = self.consume_identifier()?.to_string();
                expr = Expr::Prop {
                    base: Box::new(expr),
                    name,
                };
            } else if self.consume("[") {
                self.consume_whitespace();
                let index = self.parse_expression()?;
                self.consume_whitespace();
                self.expect("]")?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        self.consume_whitespace();
        let Some(current_char) = self.peek_char() else {
            return Err(self.make_error(ParseErrorKind::unexpected_eof(Some(
                "expression".to_string(),
            ))));
        };

        if current_char == '(' {
            self.advance_bytes_no_newline(1);
            let expr = self.parse_expression()?;
            self.consume_whitespace();
            self.expect(")")?;
            return Ok(expr);
        }

        if current_char == '\'' || current_char == '"' {
            return Ok(Expr::Str(self.parse_string_literal()?));
        }

        let negative_number = current_char == '-'
            && self.input[self.pos + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit());
        if current_char.is_ascii_digit() || negative_number {
            return self.parse_number();
        }

        if current_char.is_ascii_alphabetic() || current_char == '_' {
            let identifier = self.consume_identifier()?;
            return match identifier {
                "null" => Ok(Expr::Null),
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                name => {
                    self.consume_whitespace();
                    if self.consume("(") {
                        let args = self.parse_call_arguments()?;
                        Ok(Expr::Call {
                            name: name.to_string(),
                            args,
                        })
                    } else {
                        Ok(Expr::Var(name.to_string()))
                    }
                }
            };
        }

        Err(self.make_error(ParseErrorKind::Expected {
            description: "expression".to_string(),
        }))
    }

    fn parse_number(&mut self) -> ParseResult<Expr> {
        let start = self.pos;
        if self.peek("-") {
            self.advance_bytes_no_newline(1);
        }
        let mut saw_dot = false;
        while let Some(current_char) = self.peek_char() {
            if current_char.is_ascii_digit() {
                self.advance_bytes_no_newline(1);
            } else if current_char == '.' && !saw_dot {
                // Only a digit after the dot makes this a float; `1.x` is
                // the int 1 followed by a property access.
                let after_dot = self.input[self.pos + 1..].chars().next();
                if !after_dot.is_some_and(|c| c.is_ascii_digit()) {
                    break;
                }
                saw_dot = true;
                self.advance_bytes_no_newline(1);
            } else {
                break;
            }
        }

        let literal = &self.input[start..self.pos];
        if saw_dot {
            literal
                .parse::<f64>()
                .map(Expr::Float)
                .map_err(|_| self.make_error(ParseErrorKind::InvalidNumber {
                    literal: literal.to_string(),
                }))
        } else {
            literal
                .parse::<i64>()
                .map(Expr::Int)
                .map_err(|_| self.make_error(ParseErrorKind::InvalidNumber {
                    literal: literal.to_string(),
                }))
        }
    }

    fn parse_call_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        self.consume_whitespace();
        if self.consume(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            self.consume_whitespace();
            if self.consume(",") {
                self.consume_whitespace();
                continue;
            }
            self.expect(")")?;
            return Ok(args);
        }
    }
}

pub(crate) fn parse(input: &str) -> Result<Document, SprigError> {
    let mut parser = Parser::new(input);
    let nodes = parser.parse_nodes_until(&[])?;

    if !parser.eof() {
        return Err(parser.make_error(ParseErrorKind::Message(format!(
            "Parser did not consume entire input. Remaining: '{}'",
            &parser.input[parser.pos..]
        ))));
    }

    Ok(Document {
        extends: parser.extends,
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    // Helper macros for quick AST node creation in tests
    macro_rules! var {
        ($name:expr) => {
            Expr::Var($name.to_string())
        };
    }
    macro_rules! text {
        ($data:expr) => {
            Node::Text($data.to_string())
        };
    }
    macro_rules! interp {
        ($expr:expr) => {
            Node::Interpolation {
                expr: $expr,
                raw: false,
            }
        };
    }

    fn parse_err(input: &str) -> ParseError {
        match parse(input).unwrap_err() {
            SprigError::Parse(e) => e,
            other => panic!("Expected a parse error, got {:?}", other),
        }
    }

    fn parse_expr(input: &str) -> Expr {
        let doc = parse(&format!("{{{{ {} }}}}", input)).unwrap();
        match doc.nodes.into_iter().next() {
            Some(Node::Interpolation { expr, .. }) => expr,
            other => panic!("Expected an interpolation, got {:?}", other),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_input() {
        let doc = parse("").unwrap();
        assert_eq!(doc.nodes, vec![]);
        assert_eq!(doc.extends, None);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_constant() {
        assert_eq!(parse("hello world").unwrap().nodes, vec![text!("hello world")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_interpolation() {
        assert_eq!(parse("{{name}}").unwrap().nodes, vec![interp!(var!("name"))]);
        assert_eq!(
            parse("{{ name }}").unwrap().nodes,
            vec![interp!(var!("name"))]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_raw_interpolation() {
        assert_eq!(
            parse("{!! body !!}").unwrap().nodes,
            vec![Node::Interpolation {
                expr: var!("body"),
                raw: true
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_constant_and_interpolation() {
        assert_eq!(
            parse("Hello {{name}}!").unwrap().nodes,
            vec![text!("Hello "), interp!(var!("name")), text!("!")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_at_escape() {
        assert_eq!(parse("a@@b").unwrap().nodes, vec![text!("a@b")]);
        assert_eq!(parse("@{{ raw }}").unwrap().nodes, vec![text!("{{ raw }}")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_at_word_is_literal() {
        assert_eq!(
            parse("@media screen { }").unwrap().nodes,
            vec![text!("@media screen { }")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_interpolation() {
        let err = parse_err("{{ name");
        assert!(
            matches!(err.kind, ParseErrorKind::Expected { ref description } if description.contains("'}}'"))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_interpolation() {
        let err = parse_err("{{ }}");
        assert!(matches!(err.kind, ParseErrorKind::Expected { .. }));
    }

    // --- Expressions ---

    #[test]
    #[ntest::timeout(100)]
    fn test_literals() {
        assert_eq!(parse_expr("null"), Expr::Null);
        assert_eq!(parse_expr("true"), Expr::Bool(true));
        assert_eq!(parse_expr("false"), Expr::Bool(false));
        assert_eq!(parse_expr("42"), Expr::Int(42));
        assert_eq!(parse_expr("-3"), Expr::Int(-3));
        assert_eq!(parse_expr("1.5"), Expr::Float(1.5));
        assert_eq!(parse_expr("'hi'"), Expr::Str("hi".to_string()));
        assert_eq!(parse_expr("\"hi\""), Expr::Str("hi".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_string_escapes() {
        assert_eq!(parse_expr(r"'a\'b'"), Expr::Str("a'b".to_string()));
        assert_eq!(parse_expr(r"'a\nb'"), Expr::Str("a\nb".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_property_chain() {
        assert_eq!(
            parse_expr("a.b.c"),
            Expr::Prop {
                base: Box::new(Expr::Prop {
                    base: Box::new(var!("a")),
                    name: "b".to_string()
                }),
                name: "c".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_dynamic_index() {
        assert_eq!(
            parse_expr("rows[key]"),
            Expr::Index {
                base: Box::new(var!("rows")),
                index: Box::new(var!("key"))
            }
        );
        assert_eq!(
            parse_expr("rows['id']"),
            Expr::Index {
                base: Box::new(var!("rows")),
                index: Box::new(Expr::Str("id".to_string()))
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_mixed_access_chain() {
        // a.b[c].d
        assert_eq!(
            parse_expr("a.b[c].d"),
            Expr::Prop {
                base: Box::new(Expr::Index {
                    base: Box::new(Expr::Prop {
                        base: Box::new(var!("a")),
                        name: "b".to_string()
                    }),
                    index: Box::new(var!("c"))
                }),
                name: "d".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_function_call() {
        assert_eq!(
            parse_expr("upper(name)"),
            Expr::Call {
                name: "upper".to_string(),
                args: vec![var!("name")]
            }
        );
        assert_eq!(
            parse_expr("route('home')"),
            Expr::Call {
                name: "route".to_string(),
                args: vec![Expr::Str("home".to_string())]
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_strict_vs_loose_equality_tokens() {
        assert_eq!(
            parse_expr("a === b"),
            Expr::Binary {
                op: BinOp::EqStrict,
                left: Box::new(var!("a")),
                right: Box::new(var!("b"))
            }
        );
        assert_eq!(
            parse_expr("a == b"),
            Expr::Binary {
                op: BinOp::EqLoose,
                left: Box::new(var!("a")),
                right: Box::new(var!("b"))
            }
        );
        assert_eq!(
            parse_expr("a !== b"),
            Expr::Binary {
                op: BinOp::NeStrict,
                left: Box::new(var!("a")),
                right: Box::new(var!("b"))
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_precedence_and_over_or() {
        // a || b && c -> Or(a, And(b, c))
        assert_eq!(
            parse_expr("a || b && c"),
            Expr::Binary {
                op: BinOp::Or,
                left: Box::new(var!("a")),
                right: Box::new(Expr::Binary {
                    op: BinOp::And,
                    left: Box::new(var!("b")),
                    right: Box::new(var!("c"))
                })
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_precedence_comparison_over_equality() {
        // a == b < c -> Eq(a, Lt(b, c))
        assert_eq!(
            parse_expr("a == b < c"),
            Expr::Binary {
                op: BinOp::EqLoose,
                left: Box::new(var!("a")),
                right: Box::new(Expr::Binary {
                    op: BinOp::Lt,
                    left: Box::new(var!("b")),
                    right: Box::new(var!("c"))
                })
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_not_binds_tighter_than_and() {
        assert_eq!(
            parse_expr("!a && b"),
            Expr::Binary {
                op: BinOp::And,
                left: Box::new(Expr::Not(Box::new(var!("a")))),
                right: Box::new(var!("b"))
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_ternary() {
        assert_eq!(
            parse_expr("ok ? 'yes' : 'no'"),
            Expr::Ternary {
                condition: Box::new(var!("ok")),
                then: Box::new(Expr::Str("yes".to_string())),
                otherwise: Box::new(Expr::Str("no".to_string()))
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unterminated_string() {
        let err = parse_err("{{ 'oops }}");
        assert!(matches!(
            err.kind,
            ParseErrorKind::UnterminatedString { quote: '\'' }
        ));
    }

    // --- Directives ---

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_if() {
        let doc = parse("@if(ready)go@endif").unwrap();
        assert_eq!(
            doc.nodes,
            vec![Node::If {
                arms: vec![IfArm {
                    condition: var!("ready"),
                    body: vec![text!("go")]
                }],
                fallback: None,
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_elseif_else() {
        let doc = parse("@if(a)A@elseif(b)B@else C@endif").unwrap();
        assert_eq!(
            doc.nodes,
            vec![Node::If {
                arms: vec![
                    IfArm {
                        condition: var!("a"),
                        body: vec![text!("A")]
                    },
                    IfArm {
                        condition: var!("b"),
                        body: vec![text!("B")]
                    },
                ],
                fallback: Some(vec![text!(" C")]),
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_value_form() {
        let doc = parse("@foreach(items as item){{ item }}@endforeach").unwrap();
        assert_eq!(
            doc.nodes,
            vec![Node::Foreach {
                iterable: var!("items"),
                key_var: None,
                value_var: "item".to_string(),
                body: vec![interp!(var!("item"))],
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_key_value_form() {
        let doc = parse("@foreach(map as k => v){{ k }}@endforeach").unwrap();
        assert_eq!(
            doc.nodes,
            vec![Node::Foreach {
                iterable: var!("map"),
                key_var: Some("k".to_string()),
                value_var: "v".to_string(),
                body: vec![interp!(var!("k"))],
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_nested_foreach_and_if() {
        let doc = parse(concat!(
            "@foreach(users as user)",
            "@if(user.active)",
            "{{ user.name }}",
            "@endif",
            "@endforeach"
        ))
        .unwrap();
        match &doc.nodes[0] {
            Node::Foreach { body, .. } => {
                assert!(matches!(body[0], Node::If { .. }));
            }
            other => panic!("Expected foreach, got {:?}", other),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_extends_section_yield() {
        let doc = parse("@extends('layout')@section('content')Hi@endsection").unwrap();
        assert_eq!(doc.extends, Some("layout".to_string()));
        assert_eq!(
            doc.nodes,
            vec![Node::Section {
                name: "content".to_string(),
                body: vec![text!("Hi")],
            }]
        );

        let layout = parse("<main>@yield('content', 'empty')</main>").unwrap();
        assert_eq!(
            layout.nodes,
            vec![
                text!("<main>"),
                Node::Yield {
                    name: "content".to_string(),
                    default: Some(Expr::Str("empty".to_string())),
                },
                text!("</main>"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_duplicate_extends() {
        let err = parse_err("@extends('a')@extends('b')");
        assert!(matches!(err.kind, ParseErrorKind::DuplicateExtends));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_include_with_bindings() {
        let doc = parse("@include('card', title: post.title, wide: true)").unwrap();
        assert_eq!(
            doc.nodes,
            vec![Node::Include {
                name: "card".to_string(),
                bindings: vec![
                    (
                        "title".to_string(),
                        Expr::Prop {
                            base: Box::new(var!("post")),
                            name: "title".to_string()
                        }
                    ),
                    ("wide".to_string(), Expr::Bool(true)),
                ],
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_if_reports_eof() {
        let err = parse_err("@if(ready)go");
        assert_eq!(err.line, 1);
        assert!(
            matches!(err.kind, ParseErrorKind::UnexpectedEOF { ref expected_what } if expected_what.contains("@endif"))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_foreach_reports_eof() {
        let err = parse_err("@foreach(items as item)x");
        assert!(
            matches!(err.kind, ParseErrorKind::UnexpectedEOF { ref expected_what } if expected_what.contains("@endforeach"))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_mismatched_close_is_structure_error() {
        let err = parse("@if(a)x@endforeach").unwrap_err();
        match err {
            SprigError::Structure {
                expected, found, ..
            } => {
                assert_eq!(expected, "endif");
                assert_eq!(found, "endforeach");
            }
            other => panic!("Expected a structure error, got {:?}", other),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_close_without_open_is_structure_error() {
        let err = parse("text@endif").unwrap_err();
        match err {
            SprigError::Structure {
                expected, found, ..
            } => {
                assert_eq!(expected, "end of template");
                assert_eq!(found, "endif");
            }
            other => panic!("Expected a structure error, got {:?}", other),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_error_position_tracks_lines() {
        let err = parse_err("line one\nline two {{ broken");
        assert_eq!(err.line, 2);
        assert!(err.column > 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_missing_as() {
        let err = parse_err("@foreach(items item)x@endforeach");
        assert!(
            matches!(err.kind, ParseErrorKind::Expected { ref description } if description.contains("'as'"))
        );
    }
}
