//! Bidirectional adjacency maps

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of an edge an element sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Relationships leaving the element
    Forward,
    /// Relationships arriving at the element
    Reverse,
    /// Either side
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "forward" | "out" | "outgoing" => Some(Self::Forward),
            "reverse" | "in" | "incoming" => Some(Self::Reverse),
            "both" | "all" => Some(Self::Both),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexed edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipIndexEntry {
    pub relationship_id: String,
    pub source: String,
    pub target: String,
}

impl RelationshipIndexEntry {
    pub fn new(
        relationship_id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            relationship_id: relationship_id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Forward and reverse maps from element ID to relationship IDs
///
/// Every mutation updates both maps together, so an edge present in
/// `forward[source]` is always present in `reverse[target]` and vice versa.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    forward: HashMap<String, BTreeSet<String>>,
    reverse: HashMap<String, BTreeSet<String>>,
    endpoints: HashMap<String, (String, String)>,
}

impl Adjacency {
    pub fn from_entries(entries: impl IntoIterator<Item = RelationshipIndexEntry>) -> Self {
        let mut adjacency = Self::default();
        for entry in entries {
            adjacency.insert(&entry);
        }
        adjacency
    }

    /// Add or move an edge; returns the element keys whose lists changed
    pub fn insert(&mut self, entry: &RelationshipIndexEntry) -> Vec<(Direction, String)> {
        if let Some((source, target)) = self.endpoints.get(&entry.relationship_id) {
            if *source == entry.source && *target == entry.target {
                return Vec::new();
            }
        }

        let mut touched = self.remove(&entry.relationship_id);
        self.forward
            .entry(entry.source.clone())
            .or_default()
            .insert(entry.relationship_id.clone());
        self.reverse
            .entry(entry.target.clone())
            .or_default()
            .insert(entry.relationship_id.clone());
        self.endpoints.insert(
            entry.relationship_id.clone(),
            (entry.source.clone(), entry.target.clone()),
        );

        touched.push((Direction::Forward, entry.source.clone()));
        touched.push((Direction::Reverse, entry.target.clone()));
        touched
    }

    /// Drop an edge; returns the element keys whose lists changed
    pub fn remove(&mut self, relationship_id: &str) -> Vec<(Direction, String)> {
        let Some((source, target)) = self.endpoints.remove(relationship_id) else {
            return Vec::new();
        };
        detach(&mut self.forward, &source, relationship_id);
        detach(&mut self.reverse, &target, relationship_id);
        vec![(Direction::Forward, source), (Direction::Reverse, target)]
    }

    /// Sorted relationship IDs on one side of an element
    pub fn lookup(&self, direction: Direction, element_id: &str) -> Vec<String> {
        let collect = |map: &HashMap<String, BTreeSet<String>>| -> BTreeSet<String> {
            map.get(element_id).cloned().unwrap_or_default()
        };
        let ids = match direction {
            Direction::Forward => collect(&self.forward),
            Direction::Reverse => collect(&self.reverse),
            Direction::Both => {
                let mut ids = collect(&self.forward);
                ids.extend(collect(&self.reverse));
                ids
            }
        };
        ids.into_iter().collect()
    }

    pub fn endpoints(&self, relationship_id: &str) -> Option<(&str, &str)> {
        self.endpoints
            .get(relationship_id)
            .map(|(source, target)| (source.as_str(), target.as_str()))
    }

    /// Element keys in the forward map
    pub fn forward_len(&self) -> usize {
        self.forward.len()
    }

    /// Element keys in the reverse map
    pub fn reverse_len(&self) -> usize {
        self.reverse.len()
    }

    /// Number of indexed edges
    pub fn edge_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the forward and reverse maps describe the same edges
    pub fn is_mirrored(&self) -> bool {
        let forward_edges: usize = self.forward.values().map(BTreeSet::len).sum();
        let reverse_edges: usize = self.reverse.values().map(BTreeSet::len).sum();
        if forward_edges != self.endpoints.len() || reverse_edges != self.endpoints.len() {
            return false;
        }
        self.endpoints.iter().all(|(id, (source, target))| {
            self.forward.get(source).is_some_and(|ids| ids.contains(id))
                && self.reverse.get(target).is_some_and(|ids| ids.contains(id))
        })
    }
}

fn detach(map: &mut HashMap<String, BTreeSet<String>>, element_id: &str, relationship_id: &str) {
    if let Some(ids) = map.get_mut(element_id) {
        ids.remove(relationship_id);
        if ids.is_empty() {
            map.remove(element_id);
        }
    }
}
