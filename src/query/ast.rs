//! Query Abstract Syntax Tree (AST)
//!
//! A query is a seed object query followed by an ordered chain of steps:
//!
//! ```text
//! Blog(1) Blog.entry_set(headline__icontains="mysql"), Entry.authors
//! ```
//!
//! Every node implements `Display`, rendering it back into query text that
//! parses to an equal tree.

use crate::types::Value;
use std::fmt;

// ============================================================================
// Filter operations
// ============================================================================

/// Names of the operations a filter chain may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMethod {
    Filter,
    Exclude,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Order,
    Start,
    Limit,
    First,
    Last,
}

impl FilterMethod {
    pub const ALL: [FilterMethod; 12] = [
        FilterMethod::Filter,
        FilterMethod::Exclude,
        FilterMethod::Count,
        FilterMethod::Sum,
        FilterMethod::Avg,
        FilterMethod::Min,
        FilterMethod::Max,
        FilterMethod::Order,
        FilterMethod::Start,
        FilterMethod::Limit,
        FilterMethod::First,
        FilterMethod::Last,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMethod::Filter => "filter",
            FilterMethod::Exclude => "exclude",
            FilterMethod::Count => "count",
            FilterMethod::Sum => "sum",
            FilterMethod::Avg => "avg",
            FilterMethod::Min => "min",
            FilterMethod::Max => "max",
            FilterMethod::Order => "order",
            FilterMethod::Start => "start",
            FilterMethod::Limit => "limit",
            FilterMethod::First => "first",
            FilterMethod::Last => "last",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == name)
    }

    /// Annotating aggregates: `count`, `sum`, `avg`, `min`, `max`
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            FilterMethod::Count
                | FilterMethod::Sum
                | FilterMethod::Avg
                | FilterMethod::Min
                | FilterMethod::Max
        )
    }
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Arguments inside a filter call's parentheses
#[derive(Debug, Clone, PartialEq)]
pub enum FilterArgs {
    /// `key=value, ...`, possibly empty
    Kwargs(Vec<(String, Value)>),
    /// A bare field or relation name, e.g. `.count(authors)`
    Field(String),
    /// A bare integer, e.g. `.limit(10)`
    Int(i64),
}

impl fmt::Display for FilterArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterArgs::Kwargs(kwargs) => {
                for (i, (k, v)) in kwargs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                Ok(())
            }
            FilterArgs::Field(name) => write!(f, "{}", name),
            FilterArgs::Int(n) => write!(f, "{}", n),
        }
    }
}

/// One operation of a filter chain
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOp {
    pub method: FilterMethod,
    pub args: FilterArgs,
}

impl FilterOp {
    pub fn new(method: FilterMethod, args: FilterArgs) -> Self {
        Self { method, args }
    }

    pub fn filter<K: Into<String>, V: Into<Value>>(kwargs: Vec<(K, V)>) -> Self {
        Self::new(FilterMethod::Filter, kwargs_of(kwargs))
    }

    pub fn exclude<K: Into<String>, V: Into<Value>>(kwargs: Vec<(K, V)>) -> Self {
        Self::new(FilterMethod::Exclude, kwargs_of(kwargs))
    }

    pub fn field(method: FilterMethod, field: impl Into<String>) -> Self {
        Self::new(method, FilterArgs::Field(field.into()))
    }

    pub fn int(method: FilterMethod, n: i64) -> Self {
        Self::new(method, FilterArgs::Int(n))
    }

    /// Keyword arguments, for `filter`/`exclude`
    pub fn kwargs(&self) -> Option<&[(String, Value)]> {
        match &self.args {
            FilterArgs::Kwargs(kw) => Some(kw),
            _ => None,
        }
    }

    /// Field argument, for aggregates and `order`
    pub fn field_arg(&self) -> Option<&str> {
        match &self.args {
            FilterArgs::Field(name) => Some(name),
            _ => None,
        }
    }

    /// Non-negative count argument, for `start`/`limit`/`first`/`last`
    pub fn count_arg(&self) -> Option<usize> {
        match &self.args {
            FilterArgs::Int(n) => usize::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Checks the argument shape against the method
    pub fn check_args(&self) -> Result<(), String> {
        let ok = match self.method {
            FilterMethod::Filter | FilterMethod::Exclude => self.kwargs().is_some(),
            FilterMethod::Order => self.field_arg().is_some(),
            m if m.is_aggregate() => self.field_arg().is_some(),
            _ => self.count_arg().is_some(),
        };
        if ok {
            Ok(())
        } else {
            let expected = match self.method {
                FilterMethod::Filter | FilterMethod::Exclude => "keyword arguments",
                FilterMethod::Start
                | FilterMethod::Limit
                | FilterMethod::First
                | FilterMethod::Last => "a non-negative integer",
                _ => "a field name",
            };
            Err(format!("{}({}) expects {}", self.method, self.args, expected))
        }
    }
}

fn kwargs_of<K: Into<String>, V: Into<Value>>(kwargs: Vec<(K, V)>) -> FilterArgs {
    FilterArgs::Kwargs(
        kwargs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method {
            FilterMethod::Filter => write!(f, "({})", self.args),
            method => write!(f, ".{}({})", method, self.args),
        }
    }
}

fn write_filters(f: &mut fmt::Formatter<'_>, filters: &[FilterOp]) -> fmt::Result {
    for op in filters {
        write!(f, "{}", op)?;
    }
    Ok(())
}

// ============================================================================
// Seed
// ============================================================================

/// The seed object query: `Model(filters)` or `Model(<id>)`
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectQuery {
    pub model: String,
    pub filters: Vec<FilterOp>,
}

impl ObjectQuery {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            filters: Vec::new(),
        }
    }

    /// `Model(<id>)` sugar
    pub fn by_id(model: impl Into<String>, id: impl Into<Value>) -> Self {
        Self::new(model).with_filter(FilterOp::filter(vec![("id", id.into())]))
    }

    pub fn with_filter(mut self, op: FilterOp) -> Self {
        self.filters.push(op);
        self
    }
}

impl fmt::Display for ObjectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.model)?;
        // a seed needs at least one call to parse
        if self.filters.is_empty() {
            return write!(f, "()");
        }
        if self.filters[0].method != FilterMethod::Filter {
            write!(f, "()")?;
        }
        write_filters(f, &self.filters)
    }
}

// ============================================================================
// Steps
// ============================================================================

/// How a recursive relation step collects objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectMode {
    /// `**`: traverse exhaustively, collect every object matching the filter
    All,
    /// `*`: keep traversing through objects passing the filter
    Until,
    /// `?`: collect the first objects passing the filter along each path
    Search,
    /// `$`: collect the last objects of each path
    Terminal,
}

impl CollectMode {
    pub fn marker(&self) -> &'static str {
        match self {
            CollectMode::All => "**",
            CollectMode::Until => "*",
            CollectMode::Search => "?",
            CollectMode::Terminal => "$",
        }
    }
}

impl fmt::Display for CollectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

/// `Model.relation(filters)[recursion]`
#[derive(Debug, Clone, PartialEq)]
pub struct RelationStep {
    pub model: String,
    pub relation: String,
    pub filters: Vec<FilterOp>,
    /// Set when the step carries a recursion marker
    pub recursion: Option<CollectMode>,
}

impl RelationStep {
    pub fn new(model: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            relation: relation.into(),
            filters: Vec::new(),
            recursion: None,
        }
    }

    pub fn with_filter(mut self, op: FilterOp) -> Self {
        self.filters.push(op);
        self
    }

    pub fn recursive(mut self, mode: CollectMode) -> Self {
        self.recursion = Some(mode);
        self
    }

    pub fn is_recursive(&self) -> bool {
        self.recursion.is_some()
    }
}

impl fmt::Display for RelationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.relation)?;
        write_filters(f, &self.filters)?;
        if let Some(mode) = self.recursion {
            write!(f, "{}", mode)?;
        }
        Ok(())
    }
}

/// Subquery modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Having {
    /// `+`: keep objects with at least one inner result
    Present,
    /// `-`: keep objects with no inner result
    Absent,
    /// `?`: keep every object (left join)
    Optional,
}

impl Having {
    pub fn marker(&self) -> char {
        match self {
            Having::Present => '+',
            Having::Absent => '-',
            Having::Optional => '?',
        }
    }
}

/// `[+-?](steps)`
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryStep {
    pub steps: Vec<Step>,
    pub having: Option<Having>,
}

/// `(steps) | (steps) [| (steps)]*`
#[derive(Debug, Clone, PartialEq)]
pub struct OrStep {
    pub alternatives: Vec<Vec<Step>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Relation(RelationStep),
    Subquery(SubqueryStep),
    Or(OrStep),
}

/// One step of the chain; `join` marks a step that starts a new result group
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub join: bool,
    pub kind: StepKind,
}

impl Step {
    pub fn relation(step: RelationStep) -> Self {
        Self {
            join: false,
            kind: StepKind::Relation(step),
        }
    }

    pub fn subquery(steps: Vec<Step>, having: Option<Having>) -> Self {
        Self {
            join: false,
            kind: StepKind::Subquery(SubqueryStep { steps, having }),
        }
    }

    pub fn or(alternatives: Vec<Vec<Step>>) -> Self {
        Self {
            join: false,
            kind: StepKind::Or(OrStep { alternatives }),
        }
    }

    pub fn joined(mut self) -> Self {
        self.join = true;
        self
    }
}

fn write_chain(f: &mut fmt::Formatter<'_>, steps: &[Step]) -> fmt::Result {
    for (i, step) in steps.iter().enumerate() {
        if i > 0 && !step.join {
            write!(f, " ")?;
        }
        write!(f, "{}", step)?;
    }
    Ok(())
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.join {
            write!(f, ", ")?;
        }
        match &self.kind {
            StepKind::Relation(rel) => write!(f, "{}", rel),
            StepKind::Subquery(sub) => {
                if let Some(having) = sub.having {
                    write!(f, "{}", having.marker())?;
                }
                write!(f, "(")?;
                write_chain(f, &sub.steps)?;
                write!(f, ")")
            }
            StepKind::Or(or) => {
                for (i, alt) in or.alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "(")?;
                    write_chain(f, alt)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Query
// ============================================================================

/// Parsed query: a seed plus the steps applied to it in order
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAst {
    pub seed: ObjectQuery,
    pub steps: Vec<Step>,
}

impl fmt::Display for QueryAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seed)?;
        for step in &self.steps {
            if !step.join {
                write!(f, " ")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        for m in FilterMethod::ALL {
            assert_eq!(FilterMethod::from_name(m.as_str()), Some(m));
        }
        assert_eq!(FilterMethod::from_name("annotate"), None);
    }

    #[test]
    fn test_check_args() {
        assert!(FilterOp::field(FilterMethod::Count, "authors").check_args().is_ok());
        assert!(FilterOp::int(FilterMethod::Limit, 3).check_args().is_ok());
        assert!(FilterOp::int(FilterMethod::Limit, -1).check_args().is_err());
        assert!(FilterOp::int(FilterMethod::Filter, 1).check_args().is_err());
        assert!(FilterOp::field(FilterMethod::First, "x").check_args().is_err());
    }

    #[test]
    fn test_display_query() {
        let query = QueryAst {
            seed: ObjectQuery::by_id("Blog", 1),
            steps: vec![
                Step::relation(
                    RelationStep::new("Blog", "entry_set")
                        .with_filter(FilterOp::filter(vec![("headline__icontains", "mysql")]))
                        .with_filter(FilterOp::int(FilterMethod::Limit, 2)),
                ),
                Step::relation(RelationStep::new("Entry", "authors")).joined(),
                Step::subquery(
                    vec![Step::relation(
                        RelationStep::new("Entry", "responses").recursive(CollectMode::Terminal),
                    )],
                    Some(Having::Absent),
                ),
            ],
        };
        assert_eq!(
            query.to_string(),
            "Blog(id=1) Blog.entry_set(headline__icontains=\"mysql\").limit(2), Entry.authors -(Entry.responses$)"
        );
    }

    #[test]
    fn test_display_seed_without_plain_filter() {
        let seed = ObjectQuery::new("Entry").with_filter(FilterOp::int(FilterMethod::First, 1));
        assert_eq!(seed.to_string(), "Entry().first(1)");
    }
}
