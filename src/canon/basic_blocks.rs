use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, mem,
};

use log::{debug, trace};
use smallvec::SmallVec;

use super::Stmt;
use crate::{
    chunks::CodeChunk,
    names::{Lbl, NameGen},
};

/// Basic Block
#[derive(Debug, Clone, PartialEq)]
pub struct Bb {
    pub lbl: Lbl,
    /// Straight-line statements between the label and the final jump.
    pub stmts: Vec<Stmt>,
    /// Always a `Jmp` or a `Br`.
    pub last: Stmt,
}

impl Bb {
    pub fn successors(&self) -> SmallVec<[Lbl; 2]> {
        self.last.jump_targets()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bbs {
    entry: Lbl,
    /// Blocks in the order they first appeared.
    order: Vec<Lbl>,
    blocks: BTreeMap<Lbl, Bb>,
    /// `next[a] == b` means `b` must be laid out directly after `a` so that the negative branch
    /// of `a`'s conditional jump lands on it.
    next: BTreeMap<Lbl, Lbl>,
}

#[derive(Debug, Clone, Copy)]
enum State {
    CollectingStmts,
    DroppingTillLbl,
}

/// Removes labels that directly follow another label, pointing every jump to them at the label
/// that survives.
pub fn fold_labels(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut aliases = BTreeMap::<Lbl, Lbl>::new();
    let mut folded = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        if let (Stmt::Lbl(lbl), Some(Stmt::Lbl(prev))) = (&stmt, folded.last()) {
            trace!("folding label {lbl:?} into {prev:?}");
            aliases.insert(*lbl, *prev);
            continue;
        }
        folded.push(stmt);
    }

    for stmt in &mut folded {
        stmt.retarget(|lbl| aliases.get(&lbl).copied().unwrap_or(lbl));
    }
    folded
}

impl Bbs {
    /// Slices a canonical stream into blocks. Statements that no label makes reachable are
    /// dropped; a block that would fall off its end gets an explicit jump.
    pub fn group(names: &NameGen, stmts: Vec<Stmt>, exit: Lbl) -> Self {
        let mut stmts = stmts.into_iter().peekable();
        let entry = match stmts.peek() {
            Some(Stmt::Lbl(lbl)) => *lbl,
            _ => names.fresh_lbl(),
        };

        let mut bbs = Bbs {
            entry,
            order: Vec::new(),
            blocks: BTreeMap::new(),
            next: BTreeMap::new(),
        };

        let mut current_lbl = entry;
        let mut current = Vec::new();
        let mut state = State::CollectingStmts;

        for stmt in stmts {
            match state {
                State::CollectingStmts => match stmt {
                    Stmt::Lbl(lbl) if lbl == current_lbl && current.is_empty() => {}
                    Stmt::Lbl(lbl) => {
                        let stmts = mem::take(&mut current);
                        bbs.insert(current_lbl, stmts, Stmt::Jmp(lbl));
                        current_lbl = lbl;
                    }
                    Stmt::Jmp(_) | Stmt::Br { .. } => {
                        let stmts = mem::take(&mut current);
                        bbs.insert(current_lbl, stmts, stmt);
                        state = State::DroppingTillLbl;
                    }
                    Stmt::Move(..) | Stmt::Store { .. } | Stmt::Call(..) => current.push(stmt),
                },
                State::DroppingTillLbl => match stmt {
                    Stmt::Lbl(lbl) => {
                        current_lbl = lbl;
                        state = State::CollectingStmts;
                    }
                    unreachable => trace!("dropping unreachable {unreachable:?}"),
                },
            }
        }

        if let State::CollectingStmts = state {
            bbs.insert(current_lbl, current, Stmt::Jmp(exit));
        }

        bbs
    }

    fn insert(&mut self, lbl: Lbl, stmts: Vec<Stmt>, last: Stmt) {
        self.order.push(lbl);
        self.blocks.insert(lbl, Bb { lbl, stmts, last });
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Bb> {
        self.order.iter().filter_map(|lbl| self.blocks.get(lbl))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of jumps into each block of this function.
    fn predecessors(&self) -> BTreeMap<Lbl, usize> {
        let mut preds = BTreeMap::new();
        for bb in self.blocks.values() {
            for succ in bb.successors() {
                if self.blocks.contains_key(&succ) {
                    *preds.entry(succ).or_insert(0) += 1;
                }
            }
        }
        preds
    }

    fn drop_unreachable(&mut self) {
        let mut seen = BTreeSet::from([self.entry]);
        let mut to_visit = vec![self.entry];
        while let Some(lbl) = to_visit.pop() {
            let Some(bb) = self.blocks.get(&lbl) else { continue };
            for succ in bb.successors() {
                if self.blocks.contains_key(&succ) && seen.insert(succ) {
                    to_visit.push(succ);
                }
            }
        }
        self.blocks.retain(|lbl, _| {
            let keep = seen.contains(lbl);
            if !keep {
                debug!("dropping unreachable block {lbl:?}");
            }
            keep
        });
        self.order.retain(|lbl| seen.contains(lbl));
    }

    /// The block control certainly continues at after `lbl`, if there is exactly one.
    fn unique_successor(&self, lbl: Lbl) -> Option<Lbl> {
        if let Some(next) = self.next.get(&lbl) {
            return Some(*next);
        }
        match self.blocks.get(&lbl)?.last {
            Stmt::Jmp(target) if self.blocks.contains_key(&target) => Some(target),
            _ => None,
        }
    }

    /// Would placing `to` right after `from` close a loop of unique successors?
    fn forms_cycle(&self, from: Lbl, to: Lbl) -> bool {
        let mut cur = to;
        for _ in 0..=self.blocks.len() {
            if cur == from {
                return true;
            }
            match self.unique_successor(cur) {
                Some(succ) => cur = succ,
                None => return false,
            }
        }
        true
    }

    fn is_chained(&self, lbl: Lbl) -> bool {
        self.next.values().any(|&succ| succ == lbl)
    }

    /// Can `target` be glued onto the end of `from`?
    fn can_merge(&self, preds: &BTreeMap<Lbl, usize>, from: Lbl, target: Lbl) -> bool {
        self.blocks.contains_key(&target)
            && target != self.entry
            && target != from
            && preds.get(&target) == Some(&1)
            && !self.next.contains_key(&from)
            && !self.is_chained(target)
            && !self.forms_cycle(from, target)
    }

    /// Places the negative target of a conditional jump directly after it. Returns whether
    /// anything changed.
    fn merge_cjumps(&mut self) -> bool {
        let mut changed = false;
        loop {
            let preds = self.predecessors();
            let candidate = self.order.iter().copied().find_map(|lbl| {
                let Stmt::Br { if_false, .. } = self.blocks[&lbl].last else {
                    return None;
                };
                self.can_merge(&preds, lbl, if_false)
                    .then_some((lbl, if_false))
            });
            let Some((lbl, neg)) = candidate else {
                return changed;
            };
            trace!("placing {neg:?} after {lbl:?}");
            self.next.insert(lbl, neg);
            changed = true;
        }
    }

    /// Replaces a jump to a block by the block's contents. Returns whether anything changed.
    fn merge_jumps(&mut self) -> bool {
        let mut changed = false;
        loop {
            let preds = self.predecessors();
            let candidate = self.order.iter().copied().find_map(|lbl| {
                let Stmt::Jmp(target) = self.blocks[&lbl].last else {
                    return None;
                };
                self.can_merge(&preds, lbl, target).then_some((lbl, target))
            });
            let Some((lbl, target)) = candidate else {
                return changed;
            };
            trace!("merging {target:?} into {lbl:?}");
            let Some(merged) = self.blocks.remove(&target) else {
                unreachable!("merge target {target:?} vanished");
            };
            self.order.retain(|&other| other != target);
            if let Some(next) = self.next.remove(&target) {
                self.next.insert(lbl, next);
            }
            let Some(bb) = self.blocks.get_mut(&lbl) else {
                unreachable!("merge source {lbl:?} vanished");
            };
            bb.stmts.extend(merged.stmts);
            bb.last = merged.last;
            changed = true;
        }
    }

    /// Runs both merge passes until neither finds anything to do.
    pub fn merge(&mut self) {
        self.drop_unreachable();
        loop {
            self.merge_cjumps();
            if !self.merge_jumps() {
                break;
            }
        }
    }

    /// Lays the blocks out again, keeping chained blocks adjacent.
    pub fn linearize(self) -> Vec<Stmt> {
        let Bbs {
            entry,
            order,
            mut blocks,
            next,
        } = self;
        let chained: BTreeSet<Lbl> = next.values().copied().collect();

        let mut heads = vec![entry];
        heads.extend(order.iter().copied().filter(|lbl| *lbl != entry && !chained.contains(lbl)));
        // Anything left over is only reachable through a chain that loops; lay it out anyway.
        heads.extend(order.iter().copied().filter(|lbl| chained.contains(lbl)));

        let mut stmts = Vec::new();
        for head in heads {
            let mut cur = Some(head);
            while let Some(lbl) = cur {
                let Some(bb) = blocks.remove(&lbl) else { break };
                stmts.push(Stmt::Lbl(bb.lbl));
                stmts.extend(bb.stmts);
                stmts.push(bb.last);
                cur = next.get(&lbl).copied();
            }
        }
        stmts
    }
}

impl fmt::Display for Bbs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bb in self.blocks() {
            write!(f, "{:?}:", bb.lbl)?;
            if let Some(next) = self.next.get(&bb.lbl) {
                write!(f, "  (then {next:?})")?;
            }
            writeln!(f)?;
            for stmt in &bb.stmts {
                writeln!(f, "    {stmt:?}")?;
            }
            writeln!(f, "    {:?}", bb.last)?;
        }
        Ok(())
    }
}

/// Folds labels, builds blocks, merges them and lays them out again.
pub fn build_blocks(names: &NameGen, chunk: &CodeChunk) -> Bbs {
    let stmts = fold_labels(chunk.stmts.clone());
    let mut bbs = Bbs::group(names, stmts, chunk.exit);
    let before = bbs.len();
    bbs.merge();
    debug!(
        "{:?}: {before} blocks, {} after merging",
        chunk.frame.lbl,
        bbs.len()
    );
    bbs
}

pub fn linearize(names: &NameGen, chunk: CodeChunk) -> CodeChunk {
    let stmts = build_blocks(names, &chunk).linearize();
    CodeChunk { stmts, ..chunk }
}
