use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{SprigError, SprigResult};

/// Raw template text plus the timestamp the compiled-tree cache is keyed on.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub text: String,
    pub modified_at: SystemTime,
}

/// External collaborator that resolves a logical template name to its source
/// text. Implementations must be `Sync`: a multi-threaded host may render
/// concurrently.
pub trait TemplateLoader: Send + Sync {
    /// Loads the template's current text and modification time.
    ///
    /// # Errors
    /// - [`SprigError::MissingTemplate`] if no template has the given name.
    fn load(&self, name: &str) -> SprigResult<TemplateSource>;

    /// Cheap freshness probe: the current modification time only, used to
    /// decide whether a cached compile is still valid.
    ///
    /// # Errors
    /// - [`SprigError::MissingTemplate`] if no template has the given name.
    fn modified_at(&self, name: &str) -> SprigResult<SystemTime>;
}

/// An in-memory loader. Inserting under an existing name replaces the text
/// and bumps the modification time, which invalidates any cached compile.
///
/// Timestamps come from a monotonic counter rather than the wall clock so
/// that two inserts in the same clock tick still look distinct to the cache.
#[derive(Default)]
pub struct MemoryLoader {
    templates: RwLock<HashMap<String, (String, SystemTime)>>,
    tick: AtomicU64,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: AsRef<str>, C: Into<String>>(&self, name: N, content: C) {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let stamp = UNIX_EPOCH + Duration::from_nanos(tick);
        self.templates
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.as_ref().to_string(), (content.into(), stamp));
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> SprigResult<TemplateSource> {
        let templates = self.templates.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (text, modified_at) =
            templates
                .get(name)
                .ok_or_else(|| SprigError::MissingTemplate {
                    template_name: name.to_string(),
                })?;
        Ok(TemplateSource {
            text: text.clone(),
            modified_at: *modified_at,
        })
    }

    fn modified_at(&self, name: &str) -> SprigResult<SystemTime> {
        let templates = self.templates.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        templates
            .get(name)
            .map(|(_, modified_at)| *modified_at)
            .ok_or_else(|| SprigError::MissingTemplate {
                template_name: name.to_string(),
            })
    }
}
