//! Property selectors
//!
//! A [`PropertySelector`] names the fields a caller wants populated, possibly
//! nested (`"ContentTypes.FieldLinks.Name"`). Names are unique per level and
//! order does not matter. An empty selector asks for the server's default
//! property set.

use std::collections::BTreeMap;

use super::errors::DomainError;

/// Set of (optionally nested) property names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySelector {
    fields: BTreeMap<String, PropertySelector>,
    /// Set on navigation properties requested without sub-fields
    expand: bool,
}

impl PropertySelector {
    /// Empty selector: the server's default property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses dotted paths into a selector
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidSelector`] for empty segments.
    pub fn parse<I, S>(paths: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selector = Self::new();
        for path in paths {
            selector.insert_path(path.as_ref())?;
        }
        Ok(selector)
    }

    /// Builder-style [`insert_path`](Self::insert_path)
    pub fn with(mut self, path: &str) -> Result<Self, DomainError> {
        self.insert_path(path)?;
        Ok(self)
    }

    /// Adds a navigation property to expand in full (e.g. `Lists`)
    pub fn expand(mut self, path: &str) -> Result<Self, DomainError> {
        let node = self.node_for(path)?;
        node.expand = true;
        Ok(self)
    }

    /// Adds a dotted path; intermediate segments become navigation properties
    pub fn insert_path(&mut self, path: &str) -> Result<(), DomainError> {
        self.node_for(path).map(|_| ())
    }

    fn node_for(&mut self, path: &str) -> Result<&mut PropertySelector, DomainError> {
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(DomainError::InvalidSelector(path.to_string()));
        }
        let mut node = self;
        for segment in segments {
            node = node.fields.entry(segment.to_string()).or_default();
        }
        Ok(node)
    }

    /// Ensures `name` is selected at the top level (used for key properties)
    #[must_use]
    pub fn with_key(mut self, name: &str) -> Self {
        if !self.fields.is_empty() {
            self.fields.entry(name.to_string()).or_default();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn child(&self, name: &str) -> Option<&PropertySelector> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn is_navigation(&self) -> bool {
        self.expand || !self.fields.is_empty()
    }

    /// Union with another selector
    pub fn merge(&mut self, other: PropertySelector) {
        self.expand |= other.expand;
        for (name, child) in other.fields {
            self.fields.entry(name).or_default().merge(child);
        }
    }

    /// Flattened `/`-separated paths for an OData `$select`
    pub fn select_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_select("", &mut out);
        out
    }

    fn collect_select(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, child) in &self.fields {
            let path = join_path(prefix, name);
            if child.fields.is_empty() {
                out.push(path);
            } else {
                child.collect_select(&path, out);
            }
        }
    }

    /// Navigation paths for an OData `$expand`
    pub fn expand_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_expand("", &mut out);
        out
    }

    fn collect_expand(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, child) in &self.fields {
            if child.is_navigation() {
                let path = join_path(prefix, name);
                child.collect_expand(&path, out);
                out.push(path);
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
