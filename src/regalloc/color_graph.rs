use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use log::trace;

use super::interferences::Interferences;
use crate::{asm::AsmInstr, names::Tmp};

pub struct Node {
    /// Neighbors still in the graph. Shrinks during simplification.
    degree_nbrs: BTreeSet<Tmp>,
    /// Every neighbor. Consulted when picking a color.
    color_nbrs: BTreeSet<Tmp>,
    pub reg: Option<usize>,
}

pub struct ColorGraph {
    nodes: BTreeMap<Tmp, Node>,
    /// Nodes that have not been simplified away. Precolored nodes are never in here.
    active: BTreeSet<Tmp>,
    /// Number of colors.
    k: usize,
}

impl ColorGraph {
    pub fn new(interferences: Interferences, k: usize, precolored: &BTreeMap<Tmp, usize>) -> Self {
        let mut nodes = BTreeMap::new();
        let mut active = BTreeSet::new();
        for (tmp, neighbors) in interferences.take_graph() {
            let reg = precolored.get(&tmp).copied();
            if reg.is_none() {
                active.insert(tmp);
            }
            let degree_nbrs = neighbors
                .iter()
                .copied()
                .filter(|nbr| !precolored.contains_key(nbr))
                .collect();
            nodes.insert(
                tmp,
                Node {
                    degree_nbrs,
                    color_nbrs: neighbors,
                    reg,
                },
            );
        }
        Self { nodes, active, k }
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    #[track_caller]
    fn node(&self, tmp: Tmp) -> &Node {
        let Some(node) = self.nodes.get(&tmp) else {
            panic!("Unknown temporary: {tmp:?}");
        };
        node
    }

    #[track_caller]
    pub fn degree(&self, tmp: Tmp) -> usize {
        self.node(tmp).degree_nbrs.len()
    }

    #[track_caller]
    pub fn is_insig_degree(&self, tmp: Tmp) -> bool {
        self.degree(tmp) < self.k
    }

    /// Removes `tmp` from the graph, lowering the degree of its neighbors.
    #[track_caller]
    pub fn take_node(&mut self, tmp: Tmp) {
        self.active.remove(&tmp);
        let Some(node) = self.nodes.get_mut(&tmp) else {
            panic!("Unknown temporary: {tmp:?}");
        };
        let neighbors = std::mem::take(&mut node.degree_nbrs);
        for nbr in neighbors {
            if let Some(node) = self.nodes.get_mut(&nbr) {
                node.degree_nbrs.remove(&tmp);
            }
        }
    }

    /// Removes an arbitrary node as long as the node has fewer than K neighbors. Returns `None`
    /// if no such node can be found.
    pub fn take_some_insig_node(&mut self) -> Option<Tmp> {
        let tmp = self
            .active
            .iter()
            .copied()
            .find(|&tmp| self.is_insig_degree(tmp))?;
        self.take_node(tmp);
        Some(tmp)
    }

    /// Removes the node of highest degree, preferring longer live ranges among equals.
    /// Temporaries introduced by spilling are only picked when nothing else is left.
    pub fn choose_node_to_spill(
        &mut self,
        spans: &BTreeMap<Tmp, usize>,
        spill_tmps: &BTreeSet<Tmp>,
    ) -> Option<Tmp> {
        let tmp = self.active.iter().copied().max_by_key(|&tmp| {
            (
                !spill_tmps.contains(&tmp),
                self.degree(tmp),
                spans.get(&tmp).copied().unwrap_or(0),
                Reverse(tmp),
            )
        })?;
        trace!(
            "spill candidate {tmp:?} (degree {}, span {:?})",
            self.degree(tmp),
            spans.get(&tmp)
        );
        self.take_node(tmp);
        Some(tmp)
    }

    /// Gives `tmp` the lowest register none of its colored neighbors holds.
    pub fn select_once(&mut self, tmp: Tmp) -> Option<usize> {
        let in_use: BTreeSet<usize> = self
            .node(tmp)
            .color_nbrs
            .iter()
            .filter_map(|nbr| self.node(*nbr).reg)
            .collect();
        let reg = (0..self.k).find(|reg| !in_use.contains(reg))?;
        if let Some(node) = self.nodes.get_mut(&tmp) {
            node.reg = Some(reg);
        }
        Some(reg)
    }

    pub fn assignments(&self) -> BTreeMap<Tmp, usize> {
        self.nodes
            .iter()
            .filter_map(|(tmp, node)| Some((*tmp, node.reg?)))
            .collect()
    }
}

impl fmt::Debug for ColorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strict graph {{")?;
        for (tmp, node) in &self.nodes {
            write!(f, "    {tmp:?}")?;
            if let Some(reg) = node.reg {
                write!(f, " [label=\"{tmp:?} ${reg}\"]")?;
            }
            write!(f, " -- {{")?;
            for nbr in &node.color_nbrs {
                write!(f, " {nbr:?}")?;
            }
            writeln!(f, " }}")?;
        }
        writeln!(f, "}}")
    }
}

/// Distance from each temporary's first definition to its last use, in instructions.
pub fn live_range_spans(instrs: &[AsmInstr]) -> BTreeMap<Tmp, usize> {
    let mut first_def = BTreeMap::<Tmp, usize>::new();
    let mut last_use = BTreeMap::<Tmp, usize>::new();
    for (id, instr) in instrs.iter().enumerate() {
        for &def in instr.defs() {
            first_def.entry(def).or_insert(id);
        }
        for &used in instr.uses() {
            last_use.insert(used, id);
        }
    }
    let mut spans = BTreeMap::new();
    for (&tmp, &last) in &last_use {
        let first = first_def.get(&tmp).copied().unwrap_or(0);
        spans.insert(tmp, last.saturating_sub(first));
    }
    for &tmp in first_def.keys() {
        spans.entry(tmp).or_insert(0);
    }
    spans
}
