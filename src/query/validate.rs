//! Pre-execution checks against the catalog
//!
//! Every model and relation a query names must resolve, and every filter
//! operation must carry arguments of the right shape, before any provider
//! is called.

use super::ast::*;
use crate::catalog::Catalog;
use crate::error::{Error, Result};

/// Checks a parsed query against `catalog`
pub fn validate(query: &QueryAst, catalog: &Catalog) -> Result<()> {
    catalog.model(&query.seed.model)?;
    check_filters(&query.seed.filters)?;
    check_chain(&query.steps, catalog, true)
}

fn check_chain(steps: &[Step], catalog: &Catalog, top_level: bool) -> Result<()> {
    for step in steps {
        if step.join && !top_level {
            return Err(Error::InvalidQuery(format!(
                "join ',{}' inside a sub-query or or-query",
                step.kind_display()
            )));
        }
        match &step.kind {
            StepKind::Relation(rel) => {
                catalog.relation(&rel.model, &rel.relation)?;
                check_filters(&rel.filters)?;
            }
            StepKind::Subquery(sub) => check_chain(&sub.steps, catalog, false)?,
            StepKind::Or(or) => {
                for alternative in &or.alternatives {
                    check_chain(alternative, catalog, false)?;
                }
            }
        }
    }
    Ok(())
}

fn check_filters(filters: &[FilterOp]) -> Result<()> {
    filters
        .iter()
        .try_for_each(|op| op.check_args().map_err(Error::InvalidQuery))
}

impl Step {
    /// The step without its join marker
    fn kind_display(&self) -> String {
        Step {
            join: false,
            kind: self.kind.clone(),
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::testing::blog_fixture;

    fn check(query: &str) -> Result<()> {
        let fixture = blog_fixture();
        validate(&parse(query).unwrap(), fixture.catalog())
    }

    #[test]
    fn test_valid_queries() {
        check("Blog(1)").unwrap();
        check("Blog(1), Blog.entry_set ?(Entry.comment_set)").unwrap();
        check("Entry() (Entry.authors) | (Entry.responses Entry.authors)").unwrap();
        check("blog__Entry(1) Entry.responses*").unwrap();
    }

    #[test]
    fn test_unknown_names() {
        assert!(matches!(check("Nothing(1)"), Err(Error::UnknownModel(_))));
        assert!(matches!(
            check("Blog(1) Blog.nothing"),
            Err(Error::UnknownRelation { .. })
        ));
        assert!(matches!(
            check("Blog(1) (Blog.entry_set Entry.nothing)"),
            Err(Error::UnknownRelation { .. })
        ));
        assert!(matches!(
            check("Entry(1) (Entry.authors) | (Nothing.authors)"),
            Err(Error::UnknownModel(_))
        ));
    }

    #[test]
    fn test_disallowed_relation() {
        let mut fixture = blog_fixture();
        fixture.catalog_mut().disallow_relation("Entry", "authors").unwrap();
        let query = parse("Entry(1) +(Entry.authors)").unwrap();
        assert!(matches!(
            validate(&query, fixture.catalog()),
            Err(Error::RelationNotAllowed { .. })
        ));
    }

    #[test]
    fn test_join_inside_subquery() {
        assert!(matches!(
            check("Blog(1) (Blog.entry_set, Entry.authors)"),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            check("Blog(1) (Blog.entry_set) | (Blog.entry_set, Entry.responses)"),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_argument_shapes() {
        assert!(matches!(check("Entry().limit(abc)"), Err(Error::InvalidQuery(_))));
        assert!(matches!(check("Entry().count(3)"), Err(Error::InvalidQuery(_))));
        assert!(matches!(
            check("Blog(1) Blog.entry_set.filter(headline)"),
            Err(Error::InvalidQuery(_))
        ));
        check("Entry().count(authors).filter(authors__count__gt=1).first(2)").unwrap();
    }
}
