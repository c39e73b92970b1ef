//! Template lookup by name.

use scout_types::{SearchError, Template};
use std::collections::HashMap;
use std::sync::Arc;

/// Source of named, immutable templates.
pub trait TemplateLibrary: Send + Sync {
    fn load(&self, name: &str) -> Result<Arc<Template>, SearchError>;

    /// Every template name the library can load.
    fn names(&self) -> Vec<String>;
}

/// Library backed by templates registered up front.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateLibrary {
    templates: HashMap<String, Arc<Template>>,
}

impl InMemoryTemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous one with the same name.
    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), Arc::new(template));
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.insert(template);
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateLibrary for InMemoryTemplateLibrary {
    fn load(&self, name: &str) -> Result<Arc<Template>, SearchError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| SearchError::UnknownTemplate {
                name: name.to_string(),
            })
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }
}
