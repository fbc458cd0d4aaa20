mod ast;
mod context;
mod engine;
mod error;
mod eval;
mod functions;
mod loader;
mod parser;
mod query;
mod template;
mod value;

// Public exports.
pub use context::Context;
pub use engine::SprigEngine;
pub use error::{ParseError, ParseErrorKind, SprigError, SprigResult};
pub use functions::{AssetResolver, RouteResolver};
pub use loader::{MemoryLoader, TemplateLoader, TemplateSource};
pub use query::{Direction, QueryBuilder, SqlValue};
pub use value::Value;
