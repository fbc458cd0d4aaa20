pub type SprigResult<T> = std::result::Result<T, SprigError>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    UnexpectedToken {
        expected: String,
        found: String,
    },
    UnexpectedEOF {
        /// Describes what was expected, e.g., "(expected '}}')"
        expected_what: String,
    },
    UnterminatedString {
        quote: char,
    },
    InvalidNumber {
        literal: String,
    },
    DuplicateExtends,
    Expected {
        description: String,
    },
    Message(String),
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedToken { expected, found } => {
                write!(f, "Expected {}, found {}", expected, found)
            }
            Self::UnexpectedEOF { expected_what } => {
                write!(f, "Unexpected EOF{}", expected_what)
            }
            Self::UnterminatedString { quote } => {
                write!(f, "Unterminated string literal (missing closing {})", quote)
            }
            Self::InvalidNumber { literal } => {
                write!(f, "Invalid numeric literal '{}'", literal)
            }
            Self::DuplicateExtends => {
                write!(f, "A template may declare @extends at most once")
            }
            Self::Expected { description } => {
                write!(f, "Expected {}", description)
            }
            Self::Message(msg) => {
                write!(f, "Parser error: {}", msg)
            }
        }
    }
}

impl std::error::Error for ParseErrorKind {}

impl ParseErrorKind {
    pub fn unexpected_eof(expected: Option<String>) -> Self {
        Self::UnexpectedEOF {
            expected_what: expected.map_or_else(String::new, |e| format!(" (expected '{}')", e)),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError {
    /// The template the error was raised in, filled by the engine once known.
    pub template_name: Option<String>,
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.template_name {
            Some(name) => write!(
                f,
                "Parse error in '{}' at line {}, column {}: {}",
                name, self.line, self.column, self.kind
            ),
            None => write!(
                f,
                "Parse error at line {}, column {}: {}",
                self.line, self.column, self.kind
            ),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum SprigError {
    /// Malformed directive or expression syntax.
    Parse(ParseError),
    /// A close directive that does not match the innermost open block.
    Structure {
        template_name: String,
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    /// A name or nested key was absent where the directive demanded a value.
    UndefinedReference {
        template_name: String,
        name: String,
    },
    /// A template expression called a function outside the allow-list.
    UnknownFunction { name: String },
    /// Include/extends nesting exceeded the configured depth.
    RecursionLimit {
        template_name: String,
        limit: usize,
    },
    /// The query builder was finalized with missing or inconsistent clause data.
    InvalidQuery { reason: String },
    MissingTemplate { template_name: String },
    /// Any other evaluation or rendering failure.
    Render {
        template_name: String,
        message: String,
    },
}

impl std::fmt::Display for SprigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(parse_error) => {
                write!(f, "{}", parse_error)
            }
            Self::Structure {
                template_name,
                expected,
                found,
                line,
                column,
            } => {
                write!(
                    f,
                    "Structure error in '{}' at line {}, column {}: expected @{}, found @{}",
                    template_name, line, column, expected, found
                )
            }
            Self::UndefinedReference {
                template_name,
                name,
            } => {
                write!(
                    f,
                    "Undefined reference '{}' in template '{}'",
                    name, template_name
                )
            }
            Self::UnknownFunction { name } => {
                write!(f, "Unknown template function '{}'", name)
            }
            Self::RecursionLimit {
                template_name,
                limit,
            } => {
                write!(
                    f,
                    "Include depth limit ({}) exceeded while rendering '{}'",
                    limit, template_name
                )
            }
            Self::InvalidQuery { reason } => {
                write!(f, "Invalid query: {}", reason)
            }
            Self::MissingTemplate { template_name } => {
                write!(f, "Template not found: {}", template_name)
            }
            Self::Render {
                template_name,
                message,
            } => {
                write!(f, "Rendering error in '{}': {}", template_name, message)
            }
        }
    }
}

impl std::error::Error for SprigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(parse_error) => Some(parse_error),
            Self::Structure { .. }
            | Self::UndefinedReference { .. }
            | Self::UnknownFunction { .. }
            | Self::RecursionLimit { .. }
            | Self::InvalidQuery { .. }
            | Self::MissingTemplate { .. }
            | Self::Render { .. } => None,
        }
    }
}

impl From<ParseError> for SprigError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl SprigError {
    /// Back-fills the template name on variants raised before it was known.
    ///
    /// Parsing and expression evaluation do not know which template they are
    /// working on; the engine and renderer attach the name at their boundary.
    pub(crate) fn with_template(mut self, name: &str) -> Self {
        match &mut self {
            Self::Parse(parse_error) => {
                if parse_error.template_name.is_none() {
                    parse_error.template_name = Some(name.to_string());
                }
            }
            Self::Structure { template_name, .. }
            | Self::UndefinedReference { template_name, .. }
            | Self::RecursionLimit { template_name, .. }
            | Self::Render { template_name, .. } => {
                if template_name.is_empty() {
                    *template_name = name.to_string();
                }
            }
            Self::UnknownFunction { .. }
            | Self::InvalidQuery { .. }
            | Self::MissingTemplate { .. } => {}
        }
        self
    }

    /// Shorthand for a rendering error whose template is filled in later.
    pub(crate) fn render<M: Into<String>>(message: M) -> Self {
        Self::Render {
            template_name: String::new(),
            message: message.into(),
        }
    }

    pub(crate) fn undefined<N: Into<String>>(name: N) -> Self {
        Self::UndefinedReference {
            template_name: String::new(),
            name: name.into(),
        }
    }
}
