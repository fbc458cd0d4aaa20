use std::collections::BTreeMap;

use crate::value::Value;

/// The data environment a template is rendered against.
///
/// Names map to [`Value`]s. Loop variables and include bindings never touch
/// the caller's context; they live in overlay scopes managed by the renderer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    data: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: AsRef<str>, V: Into<Value>>(&mut self, name: N, value: V) -> &mut Self {
        self.data.insert(name.as_ref().to_string(), value.into());
        self
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Value> {
        self.data.get(name.as_ref())
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.data.contains_key(name.as_ref())
    }
}

/// Lexical scope stack used during a single render call.
///
/// Lookups walk from the innermost overlay down to the caller's context, so
/// a loop variable shadows an outer binding of the same name and the shadow
/// disappears when its scope is popped.
pub(crate) struct Scopes<'a> {
    base: &'a Context,
    overlays: Vec<BTreeMap<String, Value>>,
}

impl<'a> Scopes<'a> {
    pub(crate) fn new(base: &'a Context) -> Self {
        Self {
            base,
            overlays: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self) {
        self.overlays.push(BTreeMap::new());
    }

    pub(crate) fn pop(&mut self) {
        self.overlays.pop();
    }

    /// Binds a name in the innermost scope. Must only be called with at
    /// least one overlay pushed; the caller's context is never mutated.
    pub(crate) fn bind<N: Into<String>>(&mut self, name: N, value: Value) {
        if let Some(top) = self.overlays.last_mut() {
            top.insert(name.into(), value);
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Value> {
        for overlay in self.overlays.iter().rev() {
            if let Some(value) = overlay.get(name) {
                return Some(value);
            }
        }
        self.base.get(name)
    }
}
