use crate::ir::{BasicBlock, Function};
use petgraph::algo::dominators::simple_fast;
use petgraph::prelude::DfsPostOrder;
use petgraph::visit::{GraphBase, IntoNeighbors, Visitable};
use smallvec::SmallVec;
use std::collections::HashSet;

/**
 * The dominator tree of a function's CFG, rooted at the entry block.
 **/
#[derive(Clone)]
pub struct DomTree<'a> {
    func: &'a Function,
    nodes: Vec<DomNode>,
}

/// A view of the function as a petgraph graph over block indices.
#[derive(Clone, Copy)]
pub struct CFG<'a>(&'a Function);

#[derive(Clone, Debug, Default)]
struct DomNode {
    idom: Option<usize>,
    children: SmallVec<[usize; 4]>,
}

pub struct DomTreePostOrderIter<'a, 'b> {
    g: &'b DomTree<'a>,
    post_order: DfsPostOrder<usize, HashSet<usize>>,
}

pub struct NeighborIter<'a> {
    iter: std::slice::Iter<'a, usize>,
}

impl Iterator for NeighborIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().copied()
    }
}

impl Iterator for DomTreePostOrderIter<'_, '_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        self.post_order.next(self.g)
    }
}

impl GraphBase for CFG<'_> {
    type EdgeId = usize;
    type NodeId = usize;
}

impl GraphBase for DomTree<'_> {
    type EdgeId = usize;
    type NodeId = usize;
}

impl Visitable for CFG<'_> {
    type Map = HashSet<usize>;

    fn visit_map(&self) -> Self::Map {
        Self::Map::new()
    }

    fn reset_map(&self, map: &mut Self::Map) {
        map.clear()
    }
}

impl Visitable for DomTree<'_> {
    type Map = HashSet<usize>;

    fn visit_map(&self) -> Self::Map {
        Self::Map::new()
    }

    fn reset_map(&self, map: &mut Self::Map) {
        map.clear()
    }
}

impl<'a> IntoNeighbors for &CFG<'a> {
    type Neighbors = NeighborIter<'a>;

    fn neighbors(self, n: Self::NodeId) -> Self::Neighbors {
        NeighborIter {
            iter: self.0.basic_blocks[n].successors.iter(),
        }
    }
}

impl<'b> IntoNeighbors for &'b DomTree<'_> {
    type Neighbors = NeighborIter<'b>;

    fn neighbors(self, n: Self::NodeId) -> Self::Neighbors {
        NeighborIter {
            iter: self.nodes[n].children.iter(),
        }
    }
}

impl<'a> CFG<'a> {
    pub fn new(func: &'a Function) -> CFG<'a> {
        CFG(func)
    }
}

impl<'a> DomTree<'a> {
    pub fn analyze(func: &'a Function) -> DomTree<'a> {
        let mut nodes = vec![DomNode::default(); func.basic_blocks.len()];
        if func.is_declaration() {
            return DomTree { func, nodes };
        }

        let cfg = CFG(func);
        let dom = simple_fast(&cfg, BasicBlock::ENTRY_INDEX);
        for bb in 0..func.basic_blocks.len() {
            let idom = dom.immediate_dominator(bb);
            nodes[bb].idom = idom;
            if let Some(p) = idom {
                nodes[p].children.push(bb);
            }
        }
        DomTree { func, nodes }
    }

    pub fn func(&self) -> &'a Function {
        self.func
    }

    pub fn root(&self) -> usize {
        BasicBlock::ENTRY_INDEX
    }

    /**
     * Return true if a dominates b. Walks up the tree from b, so it is
     * linear in the depth of the tree.
     **/
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        let mut node = Some(b);
        while let Some(n) = node {
            if n == a {
                return true;
            }
            node = self.immediate_dominator(n);
        }
        false
    }

    pub fn properly_dominates(&self, a: usize, b: usize) -> bool {
        a != b && self.dominates(a, b)
    }

    pub fn immediate_dominator(&self, node: usize) -> Option<usize> {
        self.nodes[node].idom
    }

    pub fn is_reachable_from_entry(&self, node: usize) -> bool {
        node == self.root() || self.immediate_dominator(node).is_some()
    }

    pub fn post_order_iter(&self, node: usize) -> DomTreePostOrderIter<'a, '_> {
        DomTreePostOrderIter {
            g: self,
            post_order: DfsPostOrder::new(self, node),
        }
    }
}
