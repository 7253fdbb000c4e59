//! End-to-end queries against the blog fixture

use curio::query::Query;
use curio::testing::{blog_fixture, store_relation, CountingProvider};
use curio::query::FilterOp;
use curio::{run, Catalog, EngineConfig, Error, ObjectId, ObjectProvider, QueryExecutor, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn ids(values: &[u64]) -> Vec<ObjectId> {
    values.iter().map(|v| ObjectId(*v)).collect()
}

#[test]
fn test_blog_entries_without_join() {
    let fixture = blog_fixture();
    let result = run("Blog(1) Blog.entry_set", fixture.catalog()).unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].back_index, -1);
    assert_eq!(
        result.groups[0].objects,
        vec![
            (Some(ObjectId(1)), None),
            (Some(ObjectId(2)), None),
            (Some(ObjectId(3)), None),
        ]
    );
    assert_eq!(result.last_model.as_deref(), Some("Entry"));
    assert_eq!(result.stats.provider_calls, 1);
}

#[test]
fn test_blog_entries_with_join() {
    let fixture = blog_fixture();
    let result = run("Blog(1), Blog.entry_set", fixture.catalog()).unwrap();

    assert_eq!(result.groups.len(), 2);
    assert_eq!(result.groups[0].model.as_deref(), Some("Blog"));
    assert_eq!(result.groups[0].back_index, -1);
    assert_eq!(result.groups[0].objects, vec![(Some(ObjectId(1)), None)]);
    assert_eq!(result.groups[1].back_index, 0);
    assert!(result.groups[1]
        .objects
        .iter()
        .all(|(_, src)| *src == Some(ObjectId(1))));
    assert_eq!(result.groups[1].object_ids(), ids(&[1, 2, 3]));
}

#[test]
fn test_response_chain() {
    let fixture = blog_fixture();
    let until = run("Entry(1) Entry.responses*", fixture.catalog()).unwrap();
    assert_eq!(until.groups[0].object_ids(), ids(&[1, 4, 5, 6]));

    let terminal = run("Entry(1) Entry.responses$", fixture.catalog()).unwrap();
    assert_eq!(terminal.groups[0].object_ids(), ids(&[6]));

    // stops at the first entry with a rating below 2
    let bounded = run("Entry(1) Entry.responses(rating__gte=2)*", fixture.catalog()).unwrap();
    assert_eq!(bounded.groups[0].object_ids(), ids(&[1, 4, 5, 6]));
    let bounded = run("Entry(1) Entry.responses(rating__gte=3)*", fixture.catalog()).unwrap();
    assert_eq!(bounded.groups[0].object_ids(), ids(&[1, 4]));
}

#[test]
fn test_validation_makes_no_provider_calls() {
    let mut fixture = blog_fixture();
    let (provider, calls) = CountingProvider::new(store_relation(fixture.store(), "Entry", "responses"));
    fixture
        .catalog_mut()
        .add_custom_relation("Entry", "replies", "Entry", provider)
        .unwrap();

    let err = run("Entry(1) Entry.replies Entry.nothing", fixture.catalog()).unwrap_err();
    assert!(matches!(err, Error::UnknownRelation { .. }));
    assert!(err.is_validation());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let result = run("Entry(1) Entry.replies*", fixture.catalog()).unwrap();
    assert_eq!(result.groups[0].object_ids(), ids(&[1, 4, 5, 6]));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_having_complement() {
    let fixture = blog_fixture();
    let catalog = fixture.catalog();
    let present = run("Entry() +(Entry.authors(age__gte=40))", catalog).unwrap();
    let absent = run("Entry() -(Entry.authors(age__gte=40))", catalog).unwrap();

    assert_eq!(present.groups[0].object_ids(), ids(&[2, 3]));
    assert_eq!(absent.groups[0].object_ids(), ids(&[1, 4, 5, 6]));
}

#[test]
fn test_or_queries() {
    let fixture = blog_fixture();
    let catalog = fixture.catalog();

    let union = run("Blog(2) (Blog.entry_set(rating=5)) | (Blog.entry_set(rating=1))", catalog).unwrap();
    assert_eq!(union.groups[0].object_ids(), ids(&[5, 6]));

    let err = run("Entry(1) (Entry.authors) | (Entry.comment_set)", catalog).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn test_back_index_forms_a_tree() {
    let fixture = blog_fixture();
    let result = run(
        "Blog(), Blog.entry_set ?(Entry.comment_set), Entry.authors +(Author.entry_set(rating=5))",
        fixture.catalog(),
    )
    .unwrap();

    let roots = result.groups.iter().filter(|g| g.back_index == -1).count();
    assert_eq!(roots, 1);
    for (i, group) in result.groups.iter().enumerate() {
        assert!(group.back_index < i as i64);
    }
    // every sourced object points at an object of its parent group
    for group in result.groups.iter().filter(|g| g.back_index >= 0) {
        let parent = result.groups[group.back_index as usize].object_ids();
        for (_, src) in &group.objects {
            let src = src.expect("joined objects carry a source");
            assert!(parent.contains(&src));
        }
    }
}

#[test]
fn test_group_count_follows_query_text() {
    let fixture = blog_fixture();
    let catalog = fixture.catalog();

    // the same shape yields the same groups whether or not objects pass
    for query in [
        "Blog(), +(Blog.entry_set(rating=5))",
        "Blog(), -(Blog.entry_set(rating=5))",
        "Blog(), +(Blog.entry_set(rating=4))",
    ] {
        let result = run(query, catalog).unwrap();
        assert_eq!(result.groups.len(), 2, "{}", query);
        assert_eq!(result.groups[1].back_index, 0, "{}", query);
    }

    let result = run(
        "Entry(blog=2), Entry.responses$ +(Entry.authors(age__lt=30)), Entry.authors",
        catalog,
    )
    .unwrap();
    // entries 4-6, their last response 6, its author Cid
    assert_eq!(result.groups.len(), 3);
    assert_eq!(result.groups[1].object_ids(), ids(&[6]));
    assert_eq!(result.groups[2].object_ids(), ids(&[3]));
    for group in result.groups.iter().filter(|g| g.back_index >= 0) {
        let parent = result.groups[group.back_index as usize].object_ids();
        assert!(group.objects.iter().all(|(_, src)| src.map_or(false, |s| parent.contains(&s))));
    }
}

#[test]
fn test_date_literals() {
    let fixture = blog_fixture();
    let result = run(
        r#"Entry(pub_date__gte=t"2014-08-23", pub_date__lt=t"Aug 25 2014")"#,
        fixture.catalog(),
    )
    .unwrap();
    assert_eq!(result.groups[0].object_ids(), ids(&[4, 5]));
}

#[test]
fn test_aggregates_and_slices() {
    let fixture = blog_fixture();
    let catalog = fixture.catalog();

    let result = run("Entry().count(authors).filter(authors__count__gt=1)", catalog).unwrap();
    assert_eq!(result.groups[0].object_ids(), ids(&[3]));

    let result = run("Blog(1) Blog.entry_set.last(2)", catalog).unwrap();
    assert_eq!(result.groups[0].object_ids(), ids(&[3, 2]));

    let result = run("Author(name__in=['Ann', 'Cid']) Author.entry_set.first(1)", catalog).unwrap();
    assert_eq!(result.groups[0].object_ids(), ids(&[1]));
}

#[test]
fn test_reused_query() {
    let fixture = blog_fixture();
    let query = Query::parse("Entry(blog=1) +(Entry.comment_set)").unwrap();
    query.validate(fixture.catalog()).unwrap();

    let executor = QueryExecutor::new(Arc::clone(fixture.catalog()))
        .with_config(EngineConfig::default().with_traces(true));
    let first = executor.execute(query.ast()).unwrap();
    let second = executor.execute(query.ast()).unwrap();
    assert_eq!(first.groups, second.groups);
    assert_eq!(first.groups[0].object_ids(), ids(&[1]));
}

#[test]
fn test_error_kinds() {
    let fixture = blog_fixture();
    let catalog = fixture.catalog();
    assert!(matches!(run("Blog(1", catalog), Err(Error::Syntax { .. })));
    assert!(matches!(run("Post(1)", catalog), Err(Error::UnknownModel(_))));
    assert!(matches!(
        run("Blog(1) Blog.entry_set.filter(nope=1)", catalog),
        Err(Error::Provider(_))
    ));
    assert!(matches!(
        run("Blog(1) (Blog.entry_set, Entry.authors)", catalog),
        Err(Error::InvalidQuery(_))
    ));
}

#[test]
fn test_demo_snapshot_matches_fixture() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/blog.json");
    let store = curio::MemoryStore::load_json(path).unwrap();
    let catalog = Arc::new(store.catalog().unwrap());
    let fixture = blog_fixture();

    for query in [
        "Blog(1), Blog.entry_set",
        "Entry(1) Entry.responses*",
        "Entry() -(Entry.authors(age__gte=40))",
        r#"Entry(pub_date__gte=t"2014-08-23")"#,
    ] {
        let loaded = run(query, &catalog).unwrap();
        let built = run(query, fixture.catalog()).unwrap();
        assert_eq!(loaded.groups, built.groups, "{}", query);
    }
}

/// Objects addressed by slug rather than numeric id
struct SlugObjects;

impl ObjectProvider for SlugObjects {
    fn objects(&self, filters: &[FilterOp]) -> curio::Result<Vec<ObjectId>> {
        let slug = filters
            .first()
            .and_then(|op| op.kwargs())
            .and_then(|kw| kw.iter().find(|(k, _)| k == "id"))
            .map(|(_, v)| v.clone());
        Ok(match slug {
            Some(Value::String(s)) if s == "abc_1" => vec![ObjectId(7)],
            _ => Vec::new(),
        })
    }

    fn select(&self, ids: &[ObjectId], _filters: &[FilterOp]) -> curio::Result<Vec<ObjectId>> {
        Ok(ids.to_vec())
    }
}

#[test]
fn test_string_seed_ids() {
    let mut catalog = Catalog::new();
    catalog.register_model("shop__Item", Arc::new(SlugObjects)).unwrap();
    let catalog = Arc::new(catalog);
    let result = run("Item(abc_1)", &catalog).unwrap();
    assert_eq!(result.groups[0].object_ids(), ids(&[7]));

    // store ids are integers: nothing matches, and nothing fails
    let fixture = blog_fixture();
    let result = run("Blog(abc_1)", fixture.catalog()).unwrap();
    assert_eq!(result.groups.len(), 1);
    assert!(result.groups[0].is_empty());
}
