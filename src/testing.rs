//! Testing utilities and fixtures.
//!
//! A small blog schema backed by [`MemoryStore`], plus a relation provider
//! wrapper that counts calls.
//!
//! | model   | records                                  |
//! |---------|------------------------------------------|
//! | Blog    | 1 "Rust Weekly", 2 "Graph Notes"         |
//! | Author  | 1 Ann (31), 2 Bob (45), 3 Cid (28)       |
//! | Entry   | 1-3 in blog 1, 4-6 in blog 2             |
//! | Comment | 1, 2 on entry 1; 3 on entry 5            |
//!
//! Entries 4, 5 and 6 reply to 1, 4 and 5 (`Entry.responses`). Entry 1 is
//! by Ann, 2 by Bob, 3 by Ann and Bob, 4-6 by Cid.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::provider::{Edge, RelationProvider};
use crate::query::{FilterOp, QueryExecutor};
use crate::store::{MemoryStore, Record};
use crate::types::{ObjectId, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Blog fixture: a populated store and the catalog built from it.
pub struct BlogFixture {
    store: Arc<MemoryStore>,
    catalog: Arc<Catalog>,
}

impl BlogFixture {
    /// Build the fixture.
    pub fn build() -> Result<Self> {
        let store = MemoryStore::new();
        store.define_model("blog", "Blog")?;
        store.define_model("blog", "Author")?;
        store.define_model("blog", "Entry")?;
        store.define_model("blog", "Comment")?;
        store.foreign_key("Entry", "blog", "Blog", None)?;
        store.foreign_key("Entry", "in_reply_to", "Entry", Some("responses"))?;
        store.foreign_key("Comment", "entry", "Entry", None)?;
        store.many_to_many("Entry", "authors", "Author", None, false)?;

        store.insert("Blog", Record::new(1u64).with("name", "Rust Weekly"))?;
        store.insert("Blog", Record::new(2u64).with("name", "Graph Notes"))?;

        for (id, name, age) in [(1u64, "Ann", 31), (2, "Bob", 45), (3, "Cid", 28)] {
            store.insert("Author", Record::new(id).with("name", name).with("age", age))?;
        }

        let entries: [(u64, i64, &str, i64, Option<i64>, &str, &[u64]); 6] = [
            (1, 1, "Hello world", 4, None, "2014-08-20 09:00:00", &[1]),
            (2, 1, "Borrowing explained", 5, None, "2014-08-21 10:30:00", &[2]),
            (3, 1, "Async in practice", 3, None, "2014-08-22 08:15:00", &[1, 2]),
            (4, 2, "Re: hello world", 2, Some(1), "2014-08-23 12:00:00", &[3]),
            (5, 2, "Graph queries", 5, Some(4), "2014-08-24 18:45:00", &[3]),
            (6, 2, "Re: graph queries", 1, Some(5), "2014-08-25 07:30:00", &[3]),
        ];
        for (id, blog, headline, rating, reply, published, authors) in entries {
            let reply = reply.map(Value::Int).unwrap_or(Value::Null);
            store.insert(
                "Entry",
                Record::new(id)
                    .with("blog_id", blog)
                    .with("headline", headline)
                    .with("rating", rating)
                    .with("in_reply_to_id", reply)
                    .with("pub_date", published),
            )?;
            for author in authors {
                store.link("Entry", "authors", ObjectId(id), ObjectId(*author))?;
            }
        }

        for (id, entry, body) in [(1u64, 1, "First!"), (2, 1, "Nice intro"), (3, 5, "Which engine?")] {
            store.insert("Comment", Record::new(id).with("entry_id", entry).with("body", body))?;
        }

        let catalog = Arc::new(store.catalog()?);
        Ok(Self { store, catalog })
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Mutable catalog, for registering extra relations in a test.
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        Arc::make_mut(&mut self.catalog)
    }

    /// Executor with the default configuration.
    pub fn executor(&self) -> QueryExecutor {
        QueryExecutor::new(Arc::clone(&self.catalog))
    }
}

/// Build the blog fixture, panicking on failure.
pub fn blog_fixture() -> BlogFixture {
    match BlogFixture::build() {
        Ok(fixture) => fixture,
        Err(e) => panic!("blog fixture: {}", e),
    }
}

/// Relation provider wrapper that counts `fetch` calls.
pub struct CountingProvider<P> {
    inner: P,
    calls: Arc<AtomicUsize>,
}

impl<P: RelationProvider> CountingProvider<P> {
    /// Wrap `inner`; the returned counter is shared with the wrapper.
    pub fn new(inner: P) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl<P: RelationProvider> RelationProvider for CountingProvider<P> {
    fn fetch(&self, sources: &[ObjectId], filters: &[FilterOp]) -> Result<Vec<Edge>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(sources, filters)
    }
}

/// Store-backed relation provider, for wrapping built-in relations.
pub fn store_relation(store: &Arc<MemoryStore>, model: &str, relation: &str) -> impl RelationProvider {
    let store = Arc::clone(store);
    let model = model.to_string();
    let relation = relation.to_string();
    move |sources: &[ObjectId], filters: &[FilterOp]| store.related(&model, &relation, sources, filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blog_fixture() {
        let fixture = blog_fixture();
        assert_eq!(fixture.catalog().len(), 4);
        assert_eq!(fixture.store().count("Entry"), 6);
        assert!(fixture.catalog().relation("Entry", "responses").is_ok());
        assert!(fixture.catalog().relation("Author", "entry_set").is_ok());
        assert!(fixture.catalog().relation("Entry", "comment_set").is_ok());
    }

    #[test]
    fn test_counting_provider() {
        let fixture = blog_fixture();
        let (provider, calls) = CountingProvider::new(store_relation(fixture.store(), "Entry", "responses"));
        assert_eq!(
            provider.fetch(&[ObjectId(1)], &[]).unwrap(),
            vec![(ObjectId(4), ObjectId(1))]
        );
        provider.fetch(&[ObjectId(4)], &[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
