//! Block pool: the tree of cached blocks that are not yet part of the main chain.
//!
//! Nodes live in an arena keyed by block hash. Each node records its parent
//! (when the parent is cached too) and its cached children; blocks whose parent
//! is not cached are fork roots, indexed by the hash they are waiting on.

use crate::config::BlockPoolConfig;
use crate::types::*;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
struct ForkNode {
    block: Block,
    /// Cached parent, `None` for fork roots
    parent: Option<Hash>,
    children: HashSet<Hash>,
}

#[derive(Debug, Default)]
struct ForkTree {
    nodes: HashMap<Hash, ForkNode>,
    /// Missing parent hash -> fork roots waiting on it
    roots_by_parent: HashMap<Hash, HashSet<Hash>>,
}

impl ForkTree {
    fn root_of(&self, hash: &Hash) -> Option<Hash> {
        let mut current = *hash;
        loop {
            match self.nodes.get(&current)?.parent {
                Some(parent) => current = parent,
                None => return Some(current),
            }
        }
    }

    fn link(&mut self, parent: Hash, child: Hash) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(child);
        }
    }

    fn add_root(&mut self, hash: Hash, waiting_on: Hash) {
        self.roots_by_parent.entry(waiting_on).or_default().insert(hash);
    }

    fn forget_root(&mut self, hash: &Hash, waiting_on: &Hash) {
        if let Some(roots) = self.roots_by_parent.get_mut(waiting_on) {
            roots.remove(hash);
            if roots.is_empty() {
                self.roots_by_parent.remove(waiting_on);
            }
        }
    }

    /// Remove one node; its children become roots
    fn remove_node(&mut self, hash: &Hash) -> Option<ForkNode> {
        let node = self.nodes.remove(hash)?;
        match node.parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.remove(hash);
                }
            }
            None => self.forget_root(hash, &node.block.prev_hash()),
        }
        for child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
            self.add_root(*child, *hash);
        }
        Some(node)
    }

    fn descendants(&self, hash: &Hash) -> Vec<Hash> {
        let mut out = Vec::new();
        let mut stack = vec![*hash];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                out.push(current);
                stack.extend(node.children.iter().copied());
            }
        }
        out
    }

    fn remove_subtree(&mut self, hash: &Hash) -> usize {
        let doomed = self.descendants(hash);
        // leaves first so no removed node is re-registered as a root
        for h in doomed.iter().rev() {
            self.remove_node(h);
        }
        doomed.len()
    }

    fn deepest_descendant(&self, hash: &Hash) -> Option<Hash> {
        self.descendants(hash)
            .into_iter()
            .filter_map(|h| self.nodes.get(&h).map(|n| (n.block.height(), h)))
            .max()
            .map(|(_, h)| h)
    }

    fn prune_stale(&mut self, max_height: Natural, retention_window: u64) -> usize {
        let stale: Vec<Hash> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.block.height().saturating_add(retention_window) < max_height)
            .map(|(h, _)| *h)
            .collect();
        for hash in &stale {
            self.remove_node(hash);
        }
        stale.len()
    }
}

/// Thread-safe fork tree
#[derive(Debug)]
pub struct BlockPool {
    tree: Mutex<ForkTree>,
    config: BlockPoolConfig,
}

impl BlockPool {
    pub fn new(config: BlockPoolConfig) -> Self {
        BlockPool { tree: Mutex::new(ForkTree::default()), config }
    }

    /// CacheBlock: insert `block` into the fork tree.
    ///
    /// Returns the hash the block's fork must attach to (the parent of its fork
    /// root), or `None` if the block was not cached:
    /// 1. already cached, genesis, or self-referencing
    /// 2. older than the retention window behind `max_height`
    /// 3. its cached parent is not exactly one height below it
    /// 4. the pool is full of non-stale blocks
    ///
    /// Cached roots waiting on this block are adopted if their height follows
    /// on; roots that claim this parent at the wrong height are dropped.
    pub fn cache_block(&self, block: Block, max_height: Natural) -> Option<Hash> {
        let hash = block.hash();
        let height = block.height();
        let prev_hash = block.prev_hash();
        let mut tree = self.tree.lock();

        // 1. Trivial rejections
        if tree.nodes.contains_key(&hash) {
            trace!(target: "ledger::block_pool", hash = %short_hash(&hash), "block already cached");
            return None;
        }
        if height == 0 || prev_hash == hash {
            debug!(target: "ledger::block_pool", hash = %short_hash(&hash), height, "refusing root block");
            return None;
        }

        // 2. Stale
        if height.saturating_add(self.config.retention_window) < max_height {
            debug!(target: "ledger::block_pool", hash = %short_hash(&hash), height, max_height, "dropping stale block");
            return None;
        }

        // 3. Height must follow a cached parent
        let parent_cached = match tree.nodes.get(&prev_hash) {
            Some(parent) if parent.block.height() + 1 != height => {
                warn!(
                    target: "ledger::block_pool",
                    hash = %short_hash(&hash),
                    height,
                    parent_height = parent.block.height(),
                    "block height does not follow its parent"
                );
                return None;
            }
            Some(_) => true,
            None => false,
        };

        // 4. Capacity
        if tree.nodes.len() >= self.config.cache_limit {
            tree.prune_stale(max_height, self.config.retention_window);
            if tree.nodes.len() >= self.config.cache_limit {
                warn!(target: "ledger::block_pool", limit = self.config.cache_limit, "block pool full");
                return None;
            }
        }

        tree.nodes.insert(hash, ForkNode { block, parent: None, children: HashSet::new() });
        if parent_cached {
            tree.link(prev_hash, hash);
        } else {
            tree.add_root(hash, prev_hash);
        }

        if let Some(waiting) = tree.roots_by_parent.remove(&hash) {
            for orphan in waiting {
                let follows = tree.nodes.get(&orphan).map(|n| n.block.height() == height + 1);
                if follows == Some(true) {
                    tree.link(hash, orphan);
                } else {
                    // re-register so removal can find it, then drop the whole branch
                    tree.add_root(orphan, hash);
                    let dropped = tree.remove_subtree(&orphan);
                    warn!(target: "ledger::block_pool", orphan = %short_hash(&orphan), dropped, "orphan height does not follow parent");
                }
            }
        }

        let root = tree.root_of(&hash)?;
        let attach_to = tree.nodes.get(&root)?.block.prev_hash();
        trace!(
            target: "ledger::block_pool",
            hash = %short_hash(&hash),
            height,
            attach_to = %short_hash(&attach_to),
            "cached block"
        );
        Some(attach_to)
    }

    /// Root of the cached fork containing `hash`
    pub fn fork_root(&self, hash: &Hash) -> Option<Hash> {
        self.tree.lock().root_of(hash)
    }

    /// Highest cached block descending from `root` (the head of its longest branch)
    pub fn longest_fork_head(&self, root: &Hash) -> Option<Hash> {
        self.tree.lock().deepest_descendant(root)
    }

    /// GenerateForkBlocks: blocks from `head` back to its fork root, head first.
    ///
    /// Empty if `head` is unknown or not higher than `max_height`.
    pub fn generate_fork_blocks(&self, head: &Hash, max_height: Natural) -> Vec<Block> {
        let tree = self.tree.lock();
        let mut fork = Vec::new();
        let mut current = match tree.nodes.get(head) {
            Some(node) if node.block.height() > max_height => Some(node),
            _ => return fork,
        };
        while let Some(node) = current {
            fork.push(node.block.clone());
            current = node.parent.and_then(|p| tree.nodes.get(&p));
        }
        fork
    }

    /// CleanCache: drop the blocks of a merged fork, `merged_head` back to its root.
    ///
    /// Side branches hanging off the merged blocks stay cached as new roots;
    /// their parents are now on the main chain.
    pub fn clean_cache(&self, merged_head: &Hash) {
        let mut tree = self.tree.lock();
        let mut current = Some(*merged_head);
        let mut removed = 0;
        while let Some(hash) = current {
            current = tree.nodes.get(&hash).and_then(|n| n.parent);
            if tree.remove_node(&hash).is_some() {
                removed += 1;
            }
        }
        debug!(target: "ledger::block_pool", head = %short_hash(merged_head), removed, "cleaned merged fork");
    }

    /// Drop the whole fork tree containing `hash`
    pub fn remove_fork(&self, hash: &Hash) -> usize {
        let mut tree = self.tree.lock();
        match tree.root_of(hash) {
            Some(root) => tree.remove_subtree(&root),
            None => 0,
        }
    }

    /// Drop blocks that fell behind the retention window
    pub fn prune(&self, max_height: Natural) -> usize {
        let pruned = self.tree.lock().prune_stale(max_height, self.config.retention_window);
        if pruned > 0 {
            debug!(target: "ledger::block_pool", pruned, max_height, "pruned stale blocks");
        }
        pruned
    }

    /// Cached blocks without cached children
    pub fn fork_heads(&self) -> Vec<Hash> {
        let tree = self.tree.lock();
        let mut heads: Vec<(Natural, Hash)> = tree
            .nodes
            .iter()
            .filter(|(_, n)| n.children.is_empty())
            .map(|(h, n)| (n.block.height(), *h))
            .collect();
        heads.sort_by(|a, b| b.cmp(a));
        heads.into_iter().map(|(_, h)| h).collect()
    }

    pub fn num_fork_heads(&self) -> usize {
        self.tree.lock().nodes.values().filter(|n| n.children.is_empty()).count()
    }

    pub fn get_block(&self, hash: &Hash) -> Option<Block> {
        self.tree.lock().nodes.get(hash).map(|n| n.block.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.tree.lock().nodes.contains_key(hash)
    }

    /// Cached parent of `hash`, if linked
    pub fn parent_of(&self, hash: &Hash) -> Option<Hash> {
        self.tree.lock().nodes.get(hash)?.parent
    }

    pub fn len(&self) -> usize {
        self.tree.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.lock().nodes.is_empty()
    }
}
