//! Level-synchronous BFS over undirected edge adjacency.
//!
//! Mirrors the recursive CTE in `postgres.rs`: a node's level is the first
//! level it is reached at, and when several edges reach it at that level the
//! edge type whose wire name sorts first is reported.

use std::collections::{BTreeMap, BTreeSet};

use opsgraph_common::{Edge, EdgeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reached {
    pub level: u32,
    /// `None` only for seeds.
    pub edge_kind: Option<EdgeKind>,
}

pub(crate) fn expand<'a, I>(
    edges: I,
    seeds: &[&str],
    hops: u32,
    edge_filter: Option<EdgeKind>,
) -> BTreeMap<String, Reached>
where
    I: IntoIterator<Item = &'a Edge>,
{
    let edges: Vec<&Edge> = edges
        .into_iter()
        .filter(|e| edge_filter.map_or(true, |k| e.kind == k))
        .collect();

    let mut visited: BTreeMap<String, Reached> = seeds
        .iter()
        .map(|s| {
            (
                s.to_string(),
                Reached {
                    level: 0,
                    edge_kind: None,
                },
            )
        })
        .collect();
    let mut frontier: BTreeSet<String> = visited.keys().cloned().collect();

    for level in 1..=hops {
        let mut next: BTreeMap<String, EdgeKind> = BTreeMap::new();

        for edge in &edges {
            for (here, there) in [
                (&edge.from_node, &edge.to_node),
                (&edge.to_node, &edge.from_node),
            ] {
                if !frontier.contains(here) || visited.contains_key(there) {
                    continue;
                }
                next.entry(there.clone())
                    .and_modify(|k| {
                        if edge.kind.as_str() < k.as_str() {
                            *k = edge.kind;
                        }
                    })
                    .or_insert(edge.kind);
            }
        }

        if next.is_empty() {
            break;
        }

        frontier = next.keys().cloned().collect();
        for (id, kind) in next {
            visited.insert(
                id,
                Reached {
                    level,
                    edge_kind: Some(kind),
                },
            );
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use opsgraph_common::Properties;

    use super::*;

    fn edge(id: i64, kind: EdgeKind, from: &str, to: &str) -> Edge {
        let now = Utc::now();
        Edge {
            id,
            kind,
            from_node: from.into(),
            to_node: to.into(),
            properties: Properties::new(),
            source_info: Properties::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn chain() -> Vec<Edge> {
        vec![
            edge(1, EdgeKind::ServiceRequiresEnvVar, "svc:a", "env:X"),
            edge(2, EdgeKind::ServiceRequiresEnvVar, "svc:b", "env:X"),
            edge(3, EdgeKind::IncidentImpactsService, "inc:1", "svc:b"),
        ]
    }

    #[test]
    fn levels_follow_shortest_undirected_path() {
        let edges = chain();
        let reached = expand(&edges, &["svc:a"], 3, None);
        assert_eq!(reached["svc:a"].level, 0);
        assert_eq!(reached["env:X"].level, 1);
        assert_eq!(reached["svc:b"].level, 2);
        assert_eq!(reached["inc:1"].level, 3);
    }

    #[test]
    fn hop_bound_is_respected() {
        let edges = chain();
        let reached = expand(&edges, &["svc:a"], 1, None);
        assert!(reached.contains_key("env:X"));
        assert!(!reached.contains_key("svc:b"));
    }

    #[test]
    fn edge_filter_prunes_other_kinds() {
        let edges = chain();
        let reached = expand(&edges, &["svc:b"], 2, Some(EdgeKind::IncidentImpactsService));
        assert_eq!(reached.len(), 2);
        assert_eq!(
            reached["inc:1"].edge_kind,
            Some(EdgeKind::IncidentImpactsService)
        );
    }

    #[test]
    fn multiple_seeds_share_one_visited_set() {
        let edges = chain();
        let reached = expand(&edges, &["svc:a", "inc:1"], 1, None);
        assert_eq!(reached["svc:b"].level, 1);
        assert_eq!(reached["env:X"].level, 1);
    }
}
