//! Graph query language
//!
//! A query is a seed object query followed by relation steps:
//!
//! ```text
//! Blog(1), Blog.entry_set(rating__gte=4) ?(Entry.comment_set) Entry.responses*
//! ```
//!
//! - relation steps follow a named relation: `Model.relation(filters)`
//! - recursion markers `**` `*` `?` `$` repeat a self-relation to a fixpoint
//! - `(steps)` `+(steps)` `-(steps)` `?(steps)` are subqueries with a having
//!   condition; `(a) | (b)` is a union
//! - `,` starts a new result group

mod ast;
mod date;
mod executor;
mod parser;
mod traverse;
mod validate;

pub use ast::{
    CollectMode, FilterArgs, FilterMethod, FilterOp, Having, ObjectQuery, OrStep, QueryAst,
    RelationStep, Step, StepKind, SubqueryStep,
};
pub use executor::{Pair, QueryExecutor, QueryResult, QueryStats, ResultGroup};
pub use parser::{parse, QueryParser};
pub use validate::validate;

use crate::catalog::Catalog;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A parsed query, reusable across executions
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    ast: QueryAst,
}

impl Query {
    pub fn parse(text: &str) -> Result<Self> {
        let ast = parse(text)?;
        debug!(query = text, steps = ast.steps.len(), "parsed query");
        Ok(Self {
            text: text.to_string(),
            ast,
        })
    }

    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        validate(&self.ast, catalog)
    }

    /// Text the query was parsed from
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &QueryAst {
        &self.ast
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ast)
    }
}

impl AsRef<QueryAst> for Query {
    fn as_ref(&self) -> &QueryAst {
        &self.ast
    }
}

/// Parse, validate and execute `text` with the default configuration
pub fn run(text: &str, catalog: &Arc<Catalog>) -> Result<QueryResult> {
    let query = Query::parse(text)?;
    QueryExecutor::new(Arc::clone(catalog)).execute(query.ast())
}
