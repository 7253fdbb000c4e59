//! Model and relation registry
//!
//! A `Catalog` is built once, then shared read-only (usually as
//! `Arc<Catalog>`) by every query that validates or executes against it.
//! Models are registered under a full name such as `blog__Entry`; the part
//! after the last `__` is the short name accepted in queries.

use crate::error::{Error, Result};
use crate::provider::{ObjectProvider, RelationProvider};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// How a relation is backed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelationKind {
    /// Foreign key held by the source object
    ToOne,
    /// Reverse side of a foreign key
    ToMany,
    /// Link table, either direction
    ManyToMany,
    /// User-supplied function
    Custom,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationKind::ToOne => "to-one",
            RelationKind::ToMany => "to-many",
            RelationKind::ManyToMany => "many-to-many",
            RelationKind::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

/// A named relation from one model to another
#[derive(Clone)]
pub struct RelationEntry {
    name: String,
    model: String,
    target: String,
    kind: RelationKind,
    provider: Arc<dyn RelationProvider>,
}

impl RelationEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full name of the owning model
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full name of the model the relation leads to
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn provider(&self) -> &dyn RelationProvider {
        self.provider.as_ref()
    }
}

impl fmt::Debug for RelationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationEntry")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A registered model
#[derive(Clone)]
pub struct ModelEntry {
    name: String,
    short_name: String,
    objects: Arc<dyn ObjectProvider>,
    relations: IndexMap<String, RelationEntry>,
    disallowed: HashSet<String>,
}

impl ModelEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn objects(&self) -> &dyn ObjectProvider {
        self.objects.as_ref()
    }

    /// Relations a query may use, in registration order
    pub fn allowed_relations(&self) -> impl Iterator<Item = &RelationEntry> {
        self.relations
            .values()
            .filter(|r| !self.disallowed.contains(&r.name))
    }

    pub fn is_allowed(&self, relation: &str) -> bool {
        self.relations.contains_key(relation) && !self.disallowed.contains(relation)
    }
}

/// Registry of models, their object providers and relations
#[derive(Clone, Default)]
pub struct Catalog {
    models: IndexMap<String, ModelEntry>,
    short_names: HashMap<String, Vec<String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its full name
    pub fn register_model(&mut self, name: &str, objects: Arc<dyn ObjectProvider>) -> Result<()> {
        if self.models.contains_key(name) {
            return Err(Error::Config(format!("model {} registered twice", name)));
        }
        let short_name = name.rsplit("__").next().unwrap_or(name).to_string();
        self.short_names
            .entry(short_name.clone())
            .or_default()
            .push(name.to_string());
        self.models.insert(
            name.to_string(),
            ModelEntry {
                name: name.to_string(),
                short_name,
                objects,
                relations: IndexMap::new(),
                disallowed: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Register a relation; `provider` serves every fetch along it
    pub fn register_relation(
        &mut self,
        model: &str,
        name: &str,
        target: &str,
        kind: RelationKind,
        provider: Arc<dyn RelationProvider>,
    ) -> Result<()> {
        let target = self.resolve_name(target)?.to_string();
        let model = self.resolve_name(model)?.to_string();
        let entry = RelationEntry {
            name: name.to_string(),
            model: model.clone(),
            target,
            kind,
            provider,
        };
        if let Some(m) = self.models.get_mut(&model) {
            m.relations.insert(name.to_string(), entry);
        }
        Ok(())
    }

    /// Register a function as a relation
    pub fn add_custom_relation<F>(&mut self, model: &str, name: &str, target: &str, f: F) -> Result<()>
    where
        F: RelationProvider + 'static,
    {
        self.register_relation(model, name, target, RelationKind::Custom, Arc::new(f))
    }

    /// Keep a registered relation out of queries
    pub fn disallow_relation(&mut self, model: &str, relation: &str) -> Result<()> {
        let entry = self.registered_model_mut(model, relation)?;
        entry.disallowed.insert(relation.to_string());
        Ok(())
    }

    pub fn allow_relation(&mut self, model: &str, relation: &str) -> Result<()> {
        let entry = self.registered_model_mut(model, relation)?;
        entry.disallowed.remove(relation);
        Ok(())
    }

    fn registered_model_mut(&mut self, model: &str, relation: &str) -> Result<&mut ModelEntry> {
        let full = self.resolve_name(model)?.to_string();
        let display = self.display_name(&full).to_string();
        match self.models.get_mut(&full) {
            Some(entry) if entry.relations.contains_key(relation) => Ok(entry),
            _ => Err(Error::UnknownRelation {
                model: display,
                relation: relation.to_string(),
            }),
        }
    }

    /// Full model name for a full or unambiguous short name
    pub fn resolve_name(&self, name: &str) -> Result<&str> {
        if let Some((full, _)) = self.models.get_key_value(name) {
            return Ok(full.as_str());
        }
        match self.short_names.get(name).map(Vec::as_slice) {
            Some([full]) => Ok(full.as_str()),
            Some(candidates) if !candidates.is_empty() => Err(Error::AmbiguousName {
                name: name.to_string(),
                candidates: candidates.to_vec(),
            }),
            _ => Err(Error::UnknownModel(name.to_string())),
        }
    }

    pub fn model(&self, name: &str) -> Result<&ModelEntry> {
        let full = self.resolve_name(name)?;
        self.models
            .get(full)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// Looks up an allowed relation of a model
    pub fn relation(&self, model: &str, relation: &str) -> Result<&RelationEntry> {
        let entry = self.model(model)?;
        let display = self.display_name(entry.name()).to_string();
        match entry.relations.get(relation) {
            None => Err(Error::UnknownRelation {
                model: display,
                relation: relation.to_string(),
            }),
            Some(_) if entry.disallowed.contains(relation) => Err(Error::RelationNotAllowed {
                model: display,
                relation: relation.to_string(),
            }),
            Some(rel) => Ok(rel),
        }
    }

    /// Short name when it is unique, else the full name
    pub fn display_name<'a>(&'a self, full: &'a str) -> &'a str {
        match self.models.get(full) {
            Some(entry) if self.short_names.get(&entry.short_name).map(Vec::len) == Some(1) => {
                &entry.short_name
            }
            _ => full,
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelEntry> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
