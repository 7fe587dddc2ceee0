// Natural loop discovery over the dominator tree, in the manner of LLVM's LoopInfo.

use crate::ir::{DomTree, Function, InstKind, Instruction, Value, CFG};
use petgraph::visit::DfsPostOrder;
use smallvec::SmallVec;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct Loop {
    pub(crate) id: usize,
    pub(crate) parent_loop: Option<usize>,
    pub(crate) sub_loops: Vec<usize>,
    // The header always comes first
    pub(crate) blocks: Vec<usize>,
    depth: usize,
}

pub struct LoopAnalysis<'a> {
    pub(crate) func: &'a Function,
    // basic block -> innermost loop
    bb_map: HashMap<usize, usize>,
    pub(crate) loops: Vec<Loop>,
    top_level_loops: Vec<usize>,
}

impl Loop {
    pub fn get_header(&self) -> Option<usize> {
        self.blocks.first().cloned()
    }

    /// Nesting depth, 1 for a top-level loop.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn contains(&self, bb_idx: usize) -> bool {
        self.blocks.iter().any(|x| *x == bb_idx)
    }

    /// The unique block inside the loop that branches back to the header.
    pub fn get_loop_latch(&self, func: &Function) -> Option<usize> {
        let header = self.get_header()?;
        let mut latch_iter = func.basic_blocks[header]
            .predecessors()
            .iter()
            .filter(|p| self.contains(**p));
        let latch = *latch_iter.next()?;
        latch_iter.next().is_none().then_some(latch)
    }

    /// The terminator of the latch block.
    pub fn get_latch_branch<'f>(&self, func: &'f Function) -> Option<&'f Instruction> {
        let latch = self.get_loop_latch(func)?;
        func.basic_blocks[latch].terminator(func)
    }

    /**
     * A value is invariant if it is not computed inside the loop. Constants and
     * kernel parameters are always invariant.
     **/
    pub fn is_loop_invariant(&self, func: &Function, v: &Value) -> bool {
        match v {
            Value::Constant(_) | Value::Argument(_) => true,
            Value::Instruction(idx) => !self.contains(func.instructions[*idx].parent),
        }
    }

    fn get_outermost_loop(&self, li: &LoopAnalysis) -> usize {
        let mut l = self;
        while let Some(up) = l.parent_loop {
            l = &li.loops[up];
        }
        l.id
    }
}

impl<'a> LoopAnalysis<'a> {
    pub fn new(func: &'a Function) -> LoopAnalysis<'a> {
        LoopAnalysis {
            func,
            bb_map: HashMap::new(),
            loops: Vec::new(),
            top_level_loops: vec![],
        }
    }

    pub fn analyze(&mut self, dom: &DomTree<'a>) {
        if self.func.is_declaration() {
            return;
        }
        // Postorder traversal of the dominator tree, so that inner loops are
        // discovered before the loops enclosing them.
        for header in dom.post_order_iter(dom.root()) {
            let header_bb = &self.func.basic_blocks[header];
            let back_edges: SmallVec<[usize; 4]> = header_bb
                .predecessors()
                .iter()
                .filter(|back_edge| {
                    dom.dominates(header, **back_edge) && dom.is_reachable_from_entry(**back_edge)
                })
                .copied()
                .collect();

            if !back_edges.is_empty() {
                let id = self.loops.len();
                self.loops.push(Loop {
                    id,
                    parent_loop: None,
                    sub_loops: vec![],
                    blocks: vec![header],
                    depth: 1,
                });
                self.discover_and_map_subloop(back_edges, id, dom);
            }
        }

        // A single forward CFG traversal populates the block and subloop lists.
        let cfg = &CFG::new(self.func);
        let mut postorder = DfsPostOrder::new(cfg, dom.root());
        while let Some(n) = postorder.next(cfg) {
            self.insert_into_loop(n);
        }

        for id in 0..self.loops.len() {
            let mut depth = 1;
            let mut l = &self.loops[id];
            while let Some(up) = l.parent_loop {
                depth += 1;
                l = &self.loops[up];
            }
            self.loops[id].depth = depth;
        }
        log::trace!(
            "{}: found {} loop(s), {} at top level",
            self.func.name,
            self.loops.len(),
            self.top_level_loops.len()
        );
    }

    /// The innermost loop containing `bb_idx`.
    pub fn get_loop_for(&self, bb_idx: usize) -> Option<&Loop> {
        self.bb_map.get(&bb_idx).map(|x| &self.loops[*x])
    }

    pub fn get_loop(&self, id: usize) -> &Loop {
        &self.loops[id]
    }

    /// Loop depth of a block, 0 outside of any loop.
    pub fn get_loop_depth(&self, bb_idx: usize) -> usize {
        self.get_loop_for(bb_idx).map_or(0, |l| l.depth)
    }

    /// True if `inner` is `outer` or nested inside it.
    pub fn loop_contains(&self, outer: usize, inner: usize) -> bool {
        let mut l = Some(inner);
        while let Some(id) = l {
            if id == outer {
                return true;
            }
            l = self.loops[id].parent_loop;
        }
        false
    }

    /**
     * Discover a subloop with the specified backedges such that all blocks
     * within this loop are mapped to this loop or a subloop, and all subloops
     * within this loop have their parent loop set to this loop or a subloop.
     **/
    fn discover_and_map_subloop(
        &mut self,
        backedges: SmallVec<[usize; 4]>,
        lid: usize,
        dom: &DomTree<'a>,
    ) {
        let mut reverse_cfg_worklist = backedges;
        while let Some(pred_bb) = reverse_cfg_worklist.pop() {
            if let Some(subloop) = self.bb_map.get(&pred_bb) {
                // A discovered block. Find its outermost discovered loop.
                let subloop = self.loops[*subloop].get_outermost_loop(self);
                if subloop == lid {
                    continue;
                }

                self.loops[subloop].parent_loop = Some(lid);
                let header = match self.loops[subloop].get_header() {
                    Some(h) => h,
                    None => continue,
                };
                // Continue along predecessors that are not back edges from
                // within the subloop tree itself.
                let bb = &self.func.basic_blocks[header];
                reverse_cfg_worklist.extend(bb.predecessors().iter().filter_map(|x| {
                    match self.bb_map.get(x) {
                        Some(y) if *y == subloop => None,
                        _ => Some(*x),
                    }
                }));
            } else {
                if !dom.is_reachable_from_entry(pred_bb) {
                    continue;
                }
                // An undiscovered block. Map it to the current loop.
                self.bb_map.insert(pred_bb, lid);
                if self.loops[lid].get_header() == Some(pred_bb) {
                    continue;
                }
                let bb = &self.func.basic_blocks[pred_bb];
                reverse_cfg_worklist.extend_from_slice(bb.predecessors());
            }
        }
    }

    /**
     * Add a single block to its ancestor loops in postorder. If the block is a
     * subloop header, add the subloop to its parent in postorder, then reverse
     * the block and subloop lists of the now complete subloop to get RPO.
     **/
    fn insert_into_loop(&mut self, bb_id: usize) {
        let loop_id = self.bb_map.get(&bb_id).copied();
        let mut iter_id = loop_id;
        if let Some(lid) = loop_id {
            let l = &mut self.loops[lid];
            if l.get_header() == Some(bb_id) {
                // Everything but the header was inserted in postorder.
                l.blocks[1..].reverse();
                l.sub_loops.reverse();
                iter_id = l.parent_loop;

                if let Some(parent_id) = l.parent_loop {
                    self.loops[parent_id].sub_loops.push(lid);
                } else {
                    self.top_level_loops.push(lid);
                }
            }
        }
        while let Some(id) = iter_id {
            let curr = &mut self.loops[id];
            curr.blocks.push(bb_id);
            iter_id = curr.parent_loop;
        }
    }
}

/// The loop-continue condition of a latch branch, i.e. the compare together
/// with whether the loop keeps iterating when it holds.
pub(crate) fn latch_condition<'f>(
    l: &Loop,
    func: &'f Function,
) -> Option<(&'f Instruction, bool)> {
    let branch = l.get_latch_branch(func)?;
    match branch.kind {
        InstKind::CondBr {
            cond,
            on_true,
            on_false,
        } => {
            let continues_on_true = match (l.contains(on_true), l.contains(on_false)) {
                (true, false) => true,
                (false, true) => false,
                _ => return None,
            };
            func.def(&cond)
                .filter(|c| matches!(c.kind, InstKind::ICmp { .. }))
                .map(|c| (c, continues_on_true))
        }
        _ => None,
    }
}
