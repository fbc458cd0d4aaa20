/// A parsed template document: the directive block tree plus the layout it
/// extends, if any.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Document {
    pub extends: Option<String>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    /// A constant block of text, with all escapes processed.
    Text(String),
    /// `{{ expr }}` (escaped) or `{!! expr !!}` (raw).
    Interpolation { expr: Expr, raw: bool },
    /// An `@if`/`@elseif` chain with an optional `@else` body.
    If {
        arms: Vec<IfArm>,
        fallback: Option<Vec<Node>>,
    },
    /// `@foreach(iterable as value)` or `@foreach(iterable as key => value)`.
    Foreach {
        iterable: Expr,
        key_var: Option<String>,
        value_var: String,
        body: Vec<Node>,
    },
    /// `@section('name') ... @endsection` — defines, emits nothing in place.
    Section { name: String, body: Vec<Node> },
    /// `@yield('name')` with an optional default expression.
    Yield { name: String, default: Option<Expr> },
    /// `@include('name', key: expr, ...)`.
    Include {
        name: String,
        bindings: Vec<(String, Expr)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IfArm {
    pub condition: Expr,
    pub body: Vec<Node>,
}

/// An expression inside a directive or interpolation. Owned exclusively by
/// its parent node; no sharing, no cycles.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A bare variable reference.
    Var(String),
    /// Static property access: `base.name`.
    Prop { base: Box<Expr>, name: String },
    /// Computed index access: `base[expr]`.
    Index { base: Box<Expr>, index: Box<Expr> },
    /// A call against the function allow-list.
    Call { name: String, args: Vec<Expr> },
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Inline conditional: `cond ? then : otherwise`.
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum BinOp {
    /// `==` — coercing comparison.
    EqLoose,
    /// `!=`
    NeLoose,
    /// `===` — type and value must match.
    EqStrict,
    /// `!==`
    NeStrict,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}
