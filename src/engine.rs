use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use crate::{
    context::{Context, Scopes},
    error::SprigResult,
    functions::{AssetResolver, Functions, RouteResolver},
    loader::{MemoryLoader, TemplateLoader},
    template::{self, Template, TemplateProvider},
};

const DEFAULT_INCLUDE_LIMIT: usize = 50;

struct CacheEntry {
    modified_at: SystemTime,
    template: Arc<Template>,
}

/// The template engine: a [`TemplateLoader`] plus a compiled-tree cache and
/// the expression function registry.
///
/// The cache stores parsed directive trees, not rendered output (output
/// depends on the context). Entries are keyed by template name and the
/// loader's modification time; a changed timestamp recompiles. Disabling the
/// cache changes performance only, never output.
///
/// # Examples
///
/// ```
/// use sprig::{Context, SprigEngine};
///
/// let engine = SprigEngine::new();
/// engine.add_template("greeting", "Hello, {{ name }}!");
///
/// let mut context = Context::new();
/// context.insert("name", "World");
///
/// let output = engine.render("greeting", Some(&context)).unwrap();
/// assert_eq!(output, "Hello, World!");
/// ```
pub struct SprigEngine<L: TemplateLoader = MemoryLoader> {
    loader: L,
    cache: Option<RwLock<HashMap<String, CacheEntry>>>,
    functions: Functions,
    include_limit: usize,
}

impl SprigEngine<MemoryLoader> {
    /// Creates an engine backed by an in-memory loader.
    pub fn new() -> Self {
        Self::with_loader(MemoryLoader::new())
    }

    /// Adds (or replaces) a template in the in-memory loader. Replacing
    /// bumps the modification time, so a cached compile is invalidated.
    pub fn add_template<N: AsRef<str>, C: Into<String>>(&self, name: N, content: C) {
        self.loader.insert(name, content);
    }
}

impl Default for SprigEngine<MemoryLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: TemplateLoader> SprigEngine<L> {
    pub fn with_loader(loader: L) -> Self {
        Self {
            loader,
            cache: Some(RwLock::new(HashMap::new())),
            functions: Functions::default(),
            include_limit: DEFAULT_INCLUDE_LIMIT,
        }
    }

    /// Disables the compiled-tree cache; every render reparses.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Caps `@include`/`@extends` nesting. The default is 50.
    #[must_use]
    pub fn with_include_limit(mut self, limit: usize) -> Self {
        self.include_limit = limit;
        self
    }

    #[must_use]
    pub fn with_route_resolver<R: RouteResolver + 'static>(mut self, resolver: R) -> Self {
        self.functions.set_route_resolver(Box::new(resolver));
        self
    }

    #[must_use]
    pub fn with_asset_resolver<A: AssetResolver + 'static>(mut self, resolver: A) -> Self {
        self.functions.set_asset_resolver(Box::new(resolver));
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Renders a template by name against the given context.
    ///
    /// Output is all-or-nothing: any failure discards the partial result and
    /// returns the error instead, so a half-rendered page is never shown.
    ///
    /// # Errors
    ///
    /// * [`crate::SprigError::MissingTemplate`] - no template with this name
    /// * [`crate::SprigError::Parse`] - malformed directive or expression syntax
    /// * [`crate::SprigError::Structure`] - mismatched or unterminated block
    /// * [`crate::SprigError::UndefinedReference`] - a directive demanded a missing value
    /// * [`crate::SprigError::UnknownFunction`] - a call outside the allow-list
    /// * [`crate::SprigError::RecursionLimit`] - include/extends nesting too deep
    pub fn render<N: AsRef<str>>(
        &self,
        template_name: N,
        context: Option<&Context>,
    ) -> SprigResult<String> {
        let template = self.template(template_name.as_ref())?;

        let default_context = Context::default();
        let context = context.unwrap_or(&default_context);

        let mut scopes = Scopes::new(context);
        template::render_template(self, &template, &mut scopes)
    }

    /// Fetches the compiled template, recompiling when the loader reports a
    /// newer modification time than the cached entry.
    fn compiled(&self, name: &str) -> SprigResult<Arc<Template>> {
        let Some(cache) = &self.cache else {
            let source = self.loader.load(name)?;
            return Ok(Arc::new(Template::parse(name, &source.text)?));
        };

        let current = self.loader.modified_at(name)?;
        {
            let cache = cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = cache.get(name) {
                if entry.modified_at == current {
                    return Ok(Arc::clone(&entry.template));
                }
            }
        }

        let source = self.loader.load(name)?;
        let template = Arc::new(Template::parse(name, &source.text)?);
        let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            name.to_string(),
            CacheEntry {
                modified_at: source.modified_at,
                template: Arc::clone(&template),
            },
        );
        Ok(template)
    }
}

impl<L: TemplateLoader> TemplateProvider for SprigEngine<L> {
    fn template(&self, name: &str) -> SprigResult<Arc<Template>> {
        self.compiled(name)
    }

    fn functions(&self) -> &Functions {
        &self.functions
    }

    fn include_limit(&self) -> usize {
        self.include_limit
    }
}
