//! The move-constraint graph of one community.
//!
//! Edges are directed (`stage → destination`). Cycles and self-loops are
//! legal: a review loop such as Evaluating ↔ Revising is a normal workflow,
//! and a self-loop lets a pub re-enter its stage.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use uuid::Uuid;

use db::models::MoveConstraintRow;

/// Adjacency view over a set of move constraints.
#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    adjacency: HashMap<Uuid, BTreeSet<Uuid>>,
}

impl StageGraph {
    pub fn new<'a, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = &'a MoveConstraintRow>,
    {
        let mut adjacency: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
        for edge in edges {
            adjacency.entry(edge.stage_id).or_default().insert(edge.destination_id);
        }
        Self { adjacency }
    }

    /// A first placement (`from = None`) is always allowed; otherwise an
    /// edge `from → to` must exist.
    pub fn can_move(&self, from: Option<Uuid>, to: Uuid) -> bool {
        match from {
            None => true,
            Some(from) => self
                .adjacency
                .get(&from)
                .is_some_and(|dests| dests.contains(&to)),
        }
    }

    pub fn destinations_of(&self, stage_id: Uuid) -> BTreeSet<Uuid> {
        self.adjacency.get(&stage_id).cloned().unwrap_or_default()
    }

    /// Every stage reachable in one or more moves, in breadth-first order.
    /// `stage_id` itself is included only if some path leads back to it.
    pub fn reachable_from(&self, stage_id: Uuid) -> Vec<Uuid> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<Uuid> = VecDeque::from([stage_id]);

        while let Some(current) = queue.pop_front() {
            for &next in self.adjacency.get(&current).into_iter().flatten() {
                if seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        order
    }
}
