//! Query Executor
//!
//! Interprets a parsed query against a [`Catalog`]. The working set is a
//! list of `(object, source)` pairs; every step replaces it, and join
//! points flush it into the flat list of result groups whose
//! `back_index` links rebuild the result tree.

use super::ast::*;
use super::traverse::Traversal;
use super::validate::validate;
use crate::catalog::{Catalog, RelationEntry};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::provider::Edge;
use crate::types::ObjectId;
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// `(object, source)`: `source` is the object that produced this one at the
/// last join point, `None` for objects still tied to the seed
pub type Pair = (ObjectId, Option<ObjectId>);

/// One entry of the result list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultGroup {
    /// Display name of the model, `None` for an empty group
    pub model: Option<String>,
    /// Index of the group these objects continue from, -1 for a root
    pub back_index: i64,
    /// `(object, source)`; `object` is `None` for a left-join miss
    pub objects: Vec<(Option<ObjectId>, Option<ObjectId>)>,
    /// Edges walked by the recursive step that produced the group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<Edge>>,
}

impl ResultGroup {
    /// Distinct non-null objects, in order
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter_map(|(obj, _)| *obj)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryStats {
    /// Seed object queries issued
    pub object_queries: usize,
    /// Relation fetches issued
    pub provider_calls: usize,
    /// Pairs returned by relation fetches
    pub objects_fetched: usize,
    pub execution_time_ms: u64,
}

/// Query result
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub groups: Vec<ResultGroup>,
    /// Model of the final working set
    pub last_model: Option<String>,
    pub stats: QueryStats,
}

/// Working set flowing between steps
#[derive(Debug, Clone, Default)]
struct ObjectSet {
    /// Full model name
    model: Option<String>,
    pairs: Vec<Pair>,
    trace: Option<Vec<Edge>>,
}

impl ObjectSet {
    fn new(model: Option<String>, pairs: impl IntoIterator<Item = Pair>) -> Self {
        Self {
            model,
            pairs: dedup(pairs),
            trace: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Distinct objects, in order
    fn ids(&self) -> Vec<ObjectId> {
        self.pairs
            .iter()
            .map(|(obj, _)| *obj)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Each object becomes its own source
    fn rebased(&self) -> Self {
        Self::new(
            self.model.clone(),
            self.ids().into_iter().map(|id| (id, Some(id))),
        )
    }
}

fn dedup(pairs: impl IntoIterator<Item = Pair>) -> Vec<Pair> {
    pairs
        .into_iter()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Joins fetched `(target, immediate source)` edges with the working set on
/// `immediate source == object`, producing `(target, original source)`
pub(crate) fn join_provenance(pairs: &[Pair], edges: &[Edge]) -> Vec<Pair> {
    let mut origins: HashMap<ObjectId, Vec<Option<ObjectId>>> = HashMap::new();
    for (obj, src) in pairs {
        origins.entry(*obj).or_default().push(*src);
    }
    let mut joined = IndexSet::new();
    for (target, source) in edges {
        if let Some(srcs) = origins.get(source) {
            for src in srcs {
                joined.insert((*target, *src));
            }
        }
    }
    joined.into_iter().collect()
}

/// Flat result list under construction
struct Groups {
    groups: Vec<ResultGroup>,
    /// `back_index` for the next group that continues the current branch
    anchor: i64,
    /// Group already holding the current working set
    recorded: Option<usize>,
}

/// Executor outcome of a subquery step
struct SubqueryOutcome {
    kept: ObjectSet,
    inner: ObjectSet,
    /// Outer object to the inner objects it reached
    reached: HashMap<ObjectId, Vec<ObjectId>>,
}

/// Query executor
pub struct QueryExecutor {
    catalog: Arc<Catalog>,
    config: EngineConfig,
}

impl QueryExecutor {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse, validate and run a query string
    pub fn run(&self, query: &str) -> Result<QueryResult> {
        let ast = super::parser::parse(query)?;
        self.execute(&ast)
    }

    /// Validate and run a parsed query
    pub fn execute(&self, query: &QueryAst) -> Result<QueryResult> {
        let start = Instant::now();
        validate(query, &self.catalog)?;

        let mut stats = QueryStats::default();
        let (groups, last_model) = self.execute_steps(query, &mut stats)?;
        stats.execution_time_ms = start.elapsed().as_millis() as u64;

        info!(
            groups = groups.len(),
            provider_calls = stats.provider_calls,
            elapsed_ms = stats.execution_time_ms,
            "query finished"
        );
        Ok(QueryResult {
            groups,
            last_model,
            stats,
        })
    }

    fn execute_steps(
        &self,
        query: &QueryAst,
        stats: &mut QueryStats,
    ) -> Result<(Vec<ResultGroup>, Option<String>)> {
        let mut current = self.seed(&query.seed, stats)?;
        let mut groups = Groups {
            groups: Vec::new(),
            anchor: -1,
            recorded: None,
        };

        for step in &query.steps {
            if step.join {
                let index = self.record(&mut groups, &current);
                groups.anchor = index as i64;
                current = current.rebased();
                groups.recorded = Some(index);
            }

            match &step.kind {
                StepKind::Relation(rel) => {
                    current = self.relation_step(&current, rel, stats)?;
                    groups.recorded = None;
                }
                StepKind::Or(or) => {
                    current = self.or_step(&current, or, stats)?;
                    groups.recorded = None;
                }
                StepKind::Subquery(sub) => {
                    let unfiltered = current.pairs.len();
                    let outcome = self.subquery_step(&current, sub, stats)?;
                    match sub.having {
                        None | Some(Having::Optional) => {
                            let outer = match groups.recorded {
                                Some(index) if outcome.kept.pairs.len() == unfiltered => index,
                                _ => self.push_group(&mut groups, &outcome.kept),
                            };
                            let inner = self.inner_group(&outcome, sub.having, outer as i64);
                            groups.groups.push(inner);
                            groups.anchor = outer as i64;
                            current = outcome.kept.rebased();
                            groups.recorded = Some(outer);
                        }
                        Some(Having::Present) | Some(Having::Absent) => {
                            // a joined filter always starts its own group
                            if step.join || outcome.kept.pairs.len() != unfiltered {
                                groups.recorded = None;
                            }
                            current = outcome.kept;
                        }
                    }
                }
            }
        }

        if groups.recorded.is_none() {
            self.push_group(&mut groups, &current);
        }
        let last_model = current.model.as_deref().map(|m| self.display(m));
        Ok((groups.groups, last_model))
    }

    fn record(&self, groups: &mut Groups, set: &ObjectSet) -> usize {
        match groups.recorded {
            Some(index) => index,
            None => self.push_group(groups, set),
        }
    }

    /// Appends `set` as a group under the current anchor
    fn push_group(&self, groups: &mut Groups, set: &ObjectSet) -> usize {
        let back_index = groups.anchor;
        let model = if set.is_empty() {
            None
        } else {
            set.model.as_deref().map(|m| self.display(m))
        };
        let trace = if self.config.record_traces {
            set.trace.clone()
        } else {
            None
        };
        groups.groups.push(ResultGroup {
            model,
            back_index,
            objects: set.pairs.iter().map(|(obj, src)| (Some(*obj), *src)).collect(),
            trace,
        });
        groups.groups.len() - 1
    }

    /// The group contributed by a joining subquery; a left join adds a
    /// `(None, outer)` entry for each outer object without inner results
    fn inner_group(&self, outcome: &SubqueryOutcome, having: Option<Having>, back_index: i64) -> ResultGroup {
        let mut objects = Vec::new();
        for outer in outcome.kept.ids() {
            match outcome.reached.get(&outer) {
                Some(inner) => objects.extend(inner.iter().map(|obj| (Some(*obj), Some(outer)))),
                None if having == Some(Having::Optional) => objects.push((None, Some(outer))),
                None => {}
            }
        }
        let model = if objects.iter().any(|(obj, _)| obj.is_some()) {
            outcome.inner.model.as_deref().map(|m| self.display(m))
        } else {
            None
        };
        let trace = if self.config.record_traces {
            outcome.inner.trace.clone()
        } else {
            None
        };
        ResultGroup {
            model,
            back_index,
            objects,
            trace,
        }
    }

    // ========================================================================
    // Steps
    // ========================================================================

    fn seed(&self, seed: &ObjectQuery, stats: &mut QueryStats) -> Result<ObjectSet> {
        let entry = self.catalog.model(&seed.model)?;
        stats.object_queries += 1;
        let ids = entry.objects().objects(&seed.filters)?;
        debug!(model = entry.name(), objects = ids.len(), "seeded query");
        Ok(ObjectSet::new(
            Some(entry.name().to_string()),
            ids.into_iter().map(|id| (id, None)),
        ))
    }

    /// Steps of a subquery or or-alternative, without result groups
    fn run_chain(&self, set: ObjectSet, steps: &[Step], stats: &mut QueryStats) -> Result<ObjectSet> {
        let mut current = set;
        for step in steps {
            if step.join {
                return Err(Error::InvalidQuery(
                    "cannot join inside a sub-query or or-query".to_string(),
                ));
            }
            current = match &step.kind {
                StepKind::Relation(rel) => self.relation_step(&current, rel, stats)?,
                StepKind::Subquery(sub) => self.subquery_step(&current, sub, stats)?.kept,
                StepKind::Or(or) => self.or_step(&current, or, stats)?,
            };
        }
        Ok(current)
    }

    fn relation_step(&self, current: &ObjectSet, step: &RelationStep, stats: &mut QueryStats) -> Result<ObjectSet> {
        let relation = self.catalog.relation(&step.model, &step.relation)?;
        if let Some(actual) = current.model.as_deref() {
            if !current.is_empty() && actual != relation.model() {
                return Err(Error::TypeMismatch {
                    expected: self.display(relation.model()),
                    actual: self.display(actual),
                });
            }
        }
        let target = Some(relation.target().to_string());

        let mode = match step.recursion {
            None => {
                let edges = self.fetch(relation, &current.ids(), &step.filters, stats)?;
                return Ok(ObjectSet::new(target, join_provenance(&current.pairs, &edges)));
            }
            Some(mode) => mode,
        };

        if relation.target() != relation.model() {
            return Err(Error::TypeMismatch {
                expected: self.display(relation.model()),
                actual: self.display(relation.target()),
            });
        }
        let objects = self.catalog.model(relation.model())?.objects();
        let result = Traversal::new(mode, &step.filters, self.config.max_recursion_rounds).run(
            &current.pairs,
            |sources, filters| self.fetch(relation, sources, filters, stats),
            |ids, filters| objects.select(ids, filters),
        )?;
        debug!(
            relation = relation.name(),
            mode = ?mode,
            objects = result.pairs.len(),
            edges = result.trace.len(),
            "recursive step done"
        );

        let mut set = ObjectSet::new(target, result.pairs);
        set.trace = Some(result.trace);
        Ok(set)
    }

    fn subquery_step(&self, current: &ObjectSet, step: &SubqueryStep, stats: &mut QueryStats) -> Result<SubqueryOutcome> {
        let inner = self.run_chain(current.rebased(), &step.steps, stats)?;

        let mut reached: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for (obj, src) in &inner.pairs {
            if let Some(outer) = src {
                reached.entry(*outer).or_default().push(*obj);
            }
        }

        let keep: HashSet<ObjectId> = current
            .ids()
            .into_iter()
            .filter(|id| match step.having {
                None | Some(Having::Present) => reached.contains_key(id),
                Some(Having::Absent) => !reached.contains_key(id),
                Some(Having::Optional) => true,
            })
            .collect();

        let mut kept = ObjectSet::new(
            current.model.clone(),
            current.pairs.iter().copied().filter(|(obj, _)| keep.contains(obj)),
        );
        kept.trace = current.trace.clone();

        Ok(SubqueryOutcome {
            kept,
            inner,
            reached,
        })
    }

    fn or_step(&self, current: &ObjectSet, step: &OrStep, stats: &mut QueryStats) -> Result<ObjectSet> {
        let mut model: Option<String> = None;
        let mut union = IndexSet::new();

        for alternative in &step.alternatives {
            let result = self.run_chain(current.clone(), alternative, stats)?;
            if result.is_empty() {
                continue;
            }
            match (&model, &result.model) {
                (Some(expected), Some(actual)) if expected != actual => {
                    return Err(Error::TypeMismatch {
                        expected: self.display(expected),
                        actual: self.display(actual),
                    });
                }
                (None, _) => model = result.model.clone(),
                _ => {}
            }
            union.extend(result.pairs);
        }

        Ok(ObjectSet::new(model, union))
    }

    /// One batched provider call; checks that every edge answers a requested source
    fn fetch(
        &self,
        relation: &RelationEntry,
        sources: &[ObjectId],
        filters: &[FilterOp],
        stats: &mut QueryStats,
    ) -> Result<Vec<Edge>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        stats.provider_calls += 1;
        let edges = relation.provider().fetch(sources, filters)?;

        let requested: HashSet<ObjectId> = sources.iter().copied().collect();
        if let Some((target, source)) = edges.iter().find(|(_, s)| !requested.contains(s)) {
            return Err(Error::Provider(format!(
                "relation {} returned {} for source {}, which was not requested",
                relation.name(),
                target,
                source
            )));
        }
        stats.objects_fetched += edges.len();
        debug!(
            relation = relation.name(),
            sources = sources.len(),
            edges = edges.len(),
            "fetched relation"
        );
        Ok(edges.into_iter().collect::<IndexSet<_>>().into_iter().collect())
    }

    fn display(&self, full: &str) -> String {
        self.catalog.display_name(full).to_string()
    }
}
