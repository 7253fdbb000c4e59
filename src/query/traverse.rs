//! Recursive traversal along one self-referencing relation
//!
//! Each round makes at most two batched fetches over the whole frontier: an
//! unfiltered one for reachability and a filtered one deciding which reached
//! objects pass the step's filter chain. Edges already walked for the same
//! origin are never walked again, which bounds every mode on a finite graph.

use super::ast::{CollectMode, FilterOp};
use super::executor::Pair;
use crate::error::Result;
use crate::provider::Edge;
use crate::types::ObjectId;
use indexmap::IndexSet;
use std::collections::HashSet;
use tracing::{debug, warn};

/// One walked edge; `origin` is the provenance carried from the start set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Hop {
    to: ObjectId,
    from: ObjectId,
    origin: Option<ObjectId>,
}

impl Hop {
    fn pair(&self) -> Pair {
        (self.to, self.origin)
    }

    fn edge(&self) -> Edge {
        (self.to, self.from)
    }
}

/// Collected pairs plus every edge walked to reach them
#[derive(Debug, Clone, Default)]
pub(crate) struct TraversalResult {
    pub pairs: Vec<Pair>,
    pub trace: Vec<Edge>,
}

pub(crate) struct Traversal<'a> {
    mode: CollectMode,
    filters: &'a [FilterOp],
    max_rounds: Option<usize>,
}

/// Mutable state of one walk
struct Walk<F> {
    fetch: F,
    visited: HashSet<Hop>,
    trace: IndexSet<Edge>,
    collected: IndexSet<Pair>,
}

impl<F> Walk<F>
where
    F: FnMut(&[ObjectId], &[FilterOp]) -> Result<Vec<Edge>>,
{
    /// Every hop out of the frontier, one fetch for all of it
    fn hops(&mut self, frontier: &[Pair], filters: &[FilterOp]) -> Result<Vec<Hop>> {
        let sources: Vec<ObjectId> = frontier
            .iter()
            .map(|(obj, _)| *obj)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        let edges = (self.fetch)(&sources, filters)?;

        let mut hops = IndexSet::new();
        for (to, from) in edges {
            for (obj, origin) in frontier {
                if *obj == from {
                    hops.insert(Hop {
                        to,
                        from,
                        origin: *origin,
                    });
                }
            }
        }
        Ok(hops.into_iter().collect())
    }

    /// Drops hops already walked and marks the rest as walked
    fn fresh(&mut self, hops: Vec<Hop>) -> Vec<Hop> {
        let mut fresh = Vec::new();
        for hop in hops {
            if self.visited.insert(hop) {
                self.trace.insert(hop.edge());
                fresh.push(hop);
            }
        }
        fresh
    }

    /// Edges the filtered fetch keeps
    fn passing(&mut self, frontier: &[Pair], filters: &[FilterOp]) -> Result<HashSet<Edge>> {
        Ok(self
            .hops(frontier, filters)?
            .iter()
            .map(Hop::edge)
            .collect())
    }

    fn collect(&mut self, pairs: impl IntoIterator<Item = Pair>) {
        self.collected.extend(pairs);
    }
}

fn next_frontier<'h>(hops: impl IntoIterator<Item = &'h Hop>) -> Vec<Pair> {
    hops.into_iter()
        .map(Hop::pair)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

impl<'a> Traversal<'a> {
    pub fn new(mode: CollectMode, filters: &'a [FilterOp], max_rounds: Option<usize>) -> Self {
        Self {
            mode,
            filters,
            max_rounds,
        }
    }

    /// Walks from `start`. `fetch` serves relation batches, `select` checks
    /// which start objects pass the filter chain.
    pub fn run<F, S>(&self, start: &[Pair], fetch: F, select: S) -> Result<TraversalResult>
    where
        F: FnMut(&[ObjectId], &[FilterOp]) -> Result<Vec<Edge>>,
        S: FnOnce(&[ObjectId], &[FilterOp]) -> Result<Vec<ObjectId>>,
    {
        let has_filter = !self.filters.is_empty();
        if self.mode == CollectMode::Search && !has_filter {
            return Ok(TraversalResult {
                pairs: start.to_vec(),
                trace: Vec::new(),
            });
        }

        let mut walk = Walk {
            fetch,
            visited: HashSet::new(),
            trace: IndexSet::new(),
            collected: IndexSet::new(),
        };
        let mut frontier: Vec<Pair> = start
            .iter()
            .copied()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();

        match self.mode {
            CollectMode::All if has_filter => {
                let ids: Vec<ObjectId> = frontier.iter().map(|(obj, _)| *obj).collect();
                let matched: HashSet<ObjectId> = select(&ids, self.filters)?.into_iter().collect();
                walk.collect(frontier.iter().copied().filter(|(obj, _)| matched.contains(obj)));
            }
            CollectMode::Until => walk.collect(frontier.iter().copied()),
            _ => {}
        }

        let mut round = 0;
        while !frontier.is_empty() {
            if let Some(max) = self.max_rounds {
                if round >= max {
                    warn!(rounds = round, frontier = frontier.len(), "recursion stopped at round limit");
                    break;
                }
            }
            round += 1;

            frontier = match self.mode {
                CollectMode::All => {
                    let reached = walk.hops(&frontier, &[])?;
                    let reached = walk.fresh(reached);
                    if has_filter && !reached.is_empty() {
                        let passing = walk.passing(&frontier, self.filters)?;
                        walk.collect(
                            reached
                                .iter()
                                .filter(|h| passing.contains(&h.edge()))
                                .map(Hop::pair),
                        );
                    } else {
                        walk.collect(reached.iter().map(Hop::pair));
                    }
                    next_frontier(&reached)
                }
                CollectMode::Until => {
                    let reached = walk.hops(&frontier, &[])?;
                    let reached = walk.fresh(reached);
                    walk.collect(reached.iter().map(Hop::pair));
                    if has_filter && !reached.is_empty() {
                        let passing = walk.passing(&frontier, self.filters)?;
                        next_frontier(reached.iter().filter(|h| passing.contains(&h.edge())))
                    } else {
                        next_frontier(&reached)
                    }
                }
                CollectMode::Search => {
                    let reached = walk.hops(&frontier, &[])?;
                    let reached = walk.fresh(reached);
                    if reached.is_empty() {
                        Vec::new()
                    } else {
                        let passing = walk.passing(&frontier, self.filters)?;
                        let (matched, rest): (Vec<Hop>, Vec<Hop>) = reached
                            .into_iter()
                            .partition(|h| passing.contains(&h.edge()));
                        walk.collect(matched.iter().map(Hop::pair));
                        next_frontier(&rest)
                    }
                }
                CollectMode::Terminal => {
                    // an object with any filtered neighbour is not terminal,
                    // even when every edge out of it was already walked
                    let next = walk.hops(&frontier, self.filters)?;
                    let continuing: HashSet<Pair> =
                        next.iter().map(|h| (h.from, h.origin)).collect();
                    walk.collect(frontier.iter().copied().filter(|p| !continuing.contains(p)));
                    let next = walk.fresh(next);
                    next_frontier(&next)
                }
            };
            debug!(mode = ?self.mode, round, frontier = frontier.len(), collected = walk.collected.len(), "recursion round");
        }

        Ok(TraversalResult {
            pairs: walk.collected.into_iter().collect(),
            trace: walk.trace.into_iter().collect(),
        })
    }
}
