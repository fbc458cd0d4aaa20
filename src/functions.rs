use std::borrow::Cow;

use crate::{
    error::{SprigError, SprigResult},
    value::Value,
};

/// External collaborator that turns a route name plus arguments into a URL.
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, name: &str, args: &[Value]) -> Option<String>;
}

/// External collaborator that maps a logical asset path to a served URL.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, path: &str) -> String;
}

/// The fixed allow-list of functions callable from template expressions.
///
/// Everything here is pure except `route`/`asset`, which dispatch to the
/// registered collaborators. Any name outside this set is an
/// [`SprigError::UnknownFunction`] — template content must never reach
/// arbitrary host code.
#[derive(Default)]
pub(crate) struct Functions {
    route: Option<Box<dyn RouteResolver>>,
    asset: Option<Box<dyn AssetResolver>>,
}

impl Functions {
    pub(crate) fn set_route_resolver(&mut self, resolver: Box<dyn RouteResolver>) {
        self.route = Some(resolver);
    }

    pub(crate) fn set_asset_resolver(&mut self, resolver: Box<dyn AssetResolver>) {
        self.asset = Some(resolver);
    }

    pub(crate) fn call(&self, name: &str, args: Vec<Value>) -> SprigResult<Value> {
        match name {
            "upper" => single_string(name, &args).map(|s| Value::String(s.to_uppercase())),
            "lower" => single_string(name, &args).map(|s| Value::String(s.to_lowercase())),
            "trim" => single_string(name, &args).map(|s| Value::String(s.trim().to_string())),
            "length" => {
                let [arg] = arity::<1>(name, &args)?;
                let len = match arg {
                    Value::String(s) => s.chars().count(),
                    Value::Sequence(items) => items.len(),
                    Value::Mapping(pairs) => pairs.len(),
                    other => {
                        return Err(SprigError::render(format!(
                            "length() expects a string, sequence or mapping, got {}",
                            other.type_name()
                        )));
                    }
                };
                Ok(Value::Int(len as i64))
            }
            "json" => {
                let [arg] = arity::<1>(name, &args)?;
                let encoded = serde_json::to_string(&to_json(arg)).map_err(|e| {
                    SprigError::render(format!("json() encoding failed: {}", e))
                })?;
                Ok(Value::String(encoded))
            }
            "escape" => single_string(name, &args).map(|s| Value::String(html_escape(&s).into_owned())),
            "number_format" => {
                let number = match args.first() {
                    Some(Value::Int(n)) => *n as f64,
                    Some(Value::Float(n)) => *n,
                    _ => {
                        return Err(SprigError::render(
                            "number_format() expects a numeric first argument",
                        ));
                    }
                };
                let decimals = match args.get(1) {
                    None => 0,
                    Some(Value::Int(n)) => usize::try_from(*n).map_err(|_| {
                        SprigError::render(
                            "number_format() expects a non-negative integer decimal count",
                        )
                    })?,
                    Some(_) => {
                        return Err(SprigError::render(
                            "number_format() expects a non-negative integer decimal count",
                        ));
                    }
                };
                if args.len() > 2 {
                    return Err(wrong_arity(name, "1 or 2", args.len()));
                }
                Ok(Value::String(number_format(number, decimals)))
            }
            "concat" => {
                let mut out = String::new();
                for arg in &args {
                    match arg.render() {
                        Some(piece) => out.push_str(&piece),
                        None => {
                            return Err(SprigError::render(format!(
                                "concat() cannot render a {}",
                                arg.type_name()
                            )));
                        }
                    }
                }
                Ok(Value::String(out))
            }
            "default" => {
                let [value, fallback] = arity::<2>(name, &args)?;
                if matches!(value, Value::Null) {
                    Ok(fallback.clone())
                } else {
                    Ok(value.clone())
                }
            }
            "route" => {
                let Some(resolver) = &self.route else {
                    return Err(SprigError::UnknownFunction {
                        name: name.to_string(),
                    });
                };
                let Some(Value::String(route_name)) = args.first() else {
                    return Err(SprigError::render(
                        "route() expects a route name as its first argument",
                    ));
                };
                resolver
                    .resolve(route_name, &args[1..])
                    .map(Value::String)
                    .ok_or_else(|| {
                        SprigError::render(format!("no route named '{}'", route_name))
                    })
            }
            "asset" => {
                let Some(resolver) = &self.asset else {
                    return Err(SprigError::UnknownFunction {
                        name: name.to_string(),
                    });
                };
                let path = single_string(name, &args)?;
                Ok(Value::String(resolver.resolve(&path)))
            }
            _ => Err(SprigError::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }
}

fn arity<'a, const N: usize>(name: &str, args: &'a [Value]) -> SprigResult<&'a [Value; N]> {
    args.try_into()
        .map_err(|_| wrong_arity(name, &N.to_string(), args.len()))
}

fn wrong_arity(name: &str, expected: &str, got: usize) -> SprigError {
    SprigError::render(format!(
        "{}() expects {} argument(s), got {}",
        name, expected, got
    ))
}

fn single_string(name: &str, args: &[Value]) -> SprigResult<String> {
    let [arg] = arity::<1>(name, args)?;
    arg.render().map(Cow::into_owned).ok_or_else(|| {
        SprigError::render(format!(
            "{}() cannot render a {}",
            name,
            arg.type_name()
        ))
    })
}

/// Escapes the five HTML-significant characters. Applied to every `{{ }}`
/// interpolation; `{!! !!}` bypasses it.
pub(crate) fn html_escape(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }
    let mut escaped = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Float(n) => serde_json::Value::from(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Mapping(pairs) => serde_json::Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}

/// Grouped thousands with a fixed number of decimals, e.g.
/// `number_format(1234567.891, 2)` -> `"1,234,567.89"`.
fn number_format(number: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, number.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::new();
    let digits = int_part.len();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (digits - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let mut out = String::new();
    if number < 0.0 {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}
