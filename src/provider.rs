//! Backing-store capabilities consumed by the query engine
//!
//! The engine never touches records. Seeds come from an [`ObjectProvider`],
//! every relation step goes through a [`RelationProvider`].

use crate::error::Result;
use crate::query::FilterOp;
use crate::types::ObjectId;

/// `(target, immediate source)` as returned by a relation fetch
pub type Edge = (ObjectId, ObjectId);

/// Fetches related objects for a batch of sources.
///
/// Implementations must:
/// - pair every returned target with the id of one of `sources`;
/// - apply `filters` in order to the related objects;
/// - serve the whole batch with a single backend pass.
pub trait RelationProvider: Send + Sync {
    fn fetch(&self, sources: &[ObjectId], filters: &[FilterOp]) -> Result<Vec<Edge>>;
}

/// Any matching closure is a custom relation
impl<F> RelationProvider for F
where
    F: Fn(&[ObjectId], &[FilterOp]) -> Result<Vec<Edge>> + Send + Sync,
{
    fn fetch(&self, sources: &[ObjectId], filters: &[FilterOp]) -> Result<Vec<Edge>> {
        self(sources, filters)
    }
}

/// Object queries against one model.
///
/// A seed `Model(abc_1)` arrives as `filter(id="abc_1")`; providers keyed
/// by something other than the numeric id resolve such seeds themselves.
pub trait ObjectProvider: Send + Sync {
    /// All objects of the model that pass `filters`, in model order
    fn objects(&self, filters: &[FilterOp]) -> Result<Vec<ObjectId>>;

    /// The subset of `ids` that passes `filters`
    fn select(&self, ids: &[ObjectId], filters: &[FilterOp]) -> Result<Vec<ObjectId>>;
}
