/*
 * Created on Sun Jan 12 2025
 *
 * This file is a part of ArborDB
 * ArborDB is a free and open-source in-memory key/value database written
 * by Sayan Nandan ("the Author") that serves a line-oriented command
 * protocol over a concurrently locked binary search tree
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The core tree
//!
//! This module implements the in-memory store: a binary search tree ordered by
//! byte-wise lexicographic comparison of names, with one reader/writer lock per
//! node. All traversals use lock coupling: a node's guard is acquired before the
//! guard on its parent is released, so a concurrent writer can never splice out
//! the path below a live search. Readers and writers working on disjoint
//! subtrees only ever contend on their common ancestors.
//!
//! The tree is topped by a sentinel node with an empty name that is never
//! removed. Every live node therefore has a parent that can be locked, which
//! removes the usual special case around the root pointer.

use {
    core::mem,
    parking_lot::{
        lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard},
        RawRwLock, RwLock,
    },
    std::{
        io::{Result as IoResult, Write},
        sync::Arc,
    },
};


/// The maximum length (in bytes) of a name or a value
pub const MAX_DATA_LEN: usize = 255;
/// Indentation per level of depth in [`Tree::print`] output
const PRINT_INDENT: &str = "  ";

type NodeRef = Arc<RwLock<Node>>;
type ReadGuard = ArcRwLockReadGuard<RawRwLock, Node>;
type WriteGuard = ArcRwLockWriteGuard<RawRwLock, Node>;

/// Outcome of [`Tree::add`]
#[derive(Debug, PartialEq, Eq)]
pub enum AddStatus {
    /// The name was not present and a new node was linked into the tree
    Inserted,
    /// A node with this name already exists; the stored value is unchanged
    Duplicate,
}

/// Outcome of [`Tree::remove`]
#[derive(Debug, PartialEq, Eq)]
pub enum RemoveStatus {
    /// The node was unlinked and destroyed
    Removed,
    /// No node with this name exists
    Absent,
}

/// Errors raised while operating on the tree
#[derive(Debug, PartialEq, Eq)]
pub enum TreeError {
    /// The name or value exceeds [`MAX_DATA_LEN`]
    OversizeData,
}

/// A single entry in the tree. The lock that guards it lives in the enclosing
/// `RwLock`, so holding a guard is what "having this node locked" means
struct Node {
    name: Box<[u8]>,
    value: Box<[u8]>,
    left: Option<NodeRef>,
    right: Option<NodeRef>,
}

impl Node {
    fn new(name: &[u8], value: &[u8]) -> Result<Self, TreeError> {
        if name.len() > MAX_DATA_LEN || value.len() > MAX_DATA_LEN {
            return Err(TreeError::OversizeData);
        }
        Ok(Self {
            name: name.into(),
            value: value.into(),
            left: None,
            right: None,
        })
    }
    /// The root sentinel. Its name is empty, so every legal name compares
    /// greater and all live data hangs off its right subtree
    fn sentinel() -> Self {
        Self {
            name: Box::new([]),
            value: Box::new([]),
            left: None,
            right: None,
        }
    }
}

/// The concurrently locked store. Cheap to share: callers hold it behind an
/// `Arc` inside the server context
pub struct Tree {
    root: NodeRef,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Node::sentinel())),
        }
    }
    fn goes_left(name: &[u8], parent: &Node) -> bool {
        name < &*parent.name
    }
    /// Look up `name`, returning a copy of the stored value.
    ///
    /// The descent takes read guards hand-over-hand: with the parent guard
    /// held, the child is locked and only then is the parent released. The
    /// final guard is dropped before returning, so no lock outlives the call.
    pub fn query(&self, name: &[u8]) -> Option<Box<[u8]>> {
        let mut parent: ReadGuard = self.root.read_arc();
        loop {
            let next = if Self::goes_left(name, &parent) {
                parent.left.clone()
            } else {
                parent.right.clone()
            };
            let child = match next {
                Some(child) => child.read_arc(),
                None => return None,
            };
            if &*child.name == name {
                drop(parent);
                return Some(child.value.clone());
            }
            // hand-over-hand: the old parent guard drops here, after the
            // child guard was acquired
            parent = child;
        }
    }
    /// Insert `name` with `value`, or report a duplicate.
    ///
    /// The descent takes write guards hand-over-hand and keeps the guard on
    /// the node that ends up as the attach parent. The new node is built
    /// unlocked and unreachable, then linked in under that retained guard.
    pub fn add(&self, name: &[u8], value: &[u8]) -> Result<AddStatus, TreeError> {
        let mut parent: WriteGuard = self.root.write_arc();
        loop {
            let go_left = Self::goes_left(name, &parent);
            let next = if go_left {
                parent.left.clone()
            } else {
                parent.right.clone()
            };
            match next {
                None => {
                    let fresh = Arc::new(RwLock::new(Node::new(name, value)?));
                    if go_left {
                        parent.left = Some(fresh);
                    } else {
                        parent.right = Some(fresh);
                    }
                    return Ok(AddStatus::Inserted);
                }
                Some(child) => {
                    let child = child.write_arc();
                    if &*child.name == name {
                        // both guards drop on return
                        return Ok(AddStatus::Duplicate);
                    }
                    parent = child;
                }
            }
        }
    }
    /// Remove the node named `name`.
    ///
    /// The write-locked descent retains the parent's guard alongside the
    /// target's. A target with at most one child is spliced out directly. A
    /// target with two children is overwritten with its in-order successor:
    /// the search lock-couples down the left spine of the right subtree, the
    /// successor's name and value are copied over the target in full, and the
    /// successor (which has no left child) is spliced out of the spine.
    pub fn remove(&self, name: &[u8]) -> RemoveStatus {
        let mut parent: WriteGuard = self.root.write_arc();
        loop {
            let go_left = Self::goes_left(name, &parent);
            let next = if go_left {
                parent.left.clone()
            } else {
                parent.right.clone()
            };
            let mut target = match next {
                Some(child) => child.write_arc(),
                None => return RemoveStatus::Absent,
            };
            if &*target.name != name {
                parent = target;
                continue;
            }
            match (target.left.clone(), target.right.clone()) {
                (hoisted, None) => {
                    if go_left {
                        parent.left = hoisted;
                    } else {
                        parent.right = hoisted;
                    }
                }
                (None, hoisted) => {
                    if go_left {
                        parent.left = hoisted;
                    } else {
                        parent.right = hoisted;
                    }
                }
                (Some(_), Some(right)) => {
                    let mut succ: WriteGuard = right.write_arc();
                    let mut spine_parent: Option<WriteGuard> = None;
                    while let Some(further_left) = succ.left.clone() {
                        let next_guard = further_left.write_arc();
                        // the previous spine guard (if any) drops when
                        // overwritten, after its child was locked
                        spine_parent = Some(mem::replace(&mut succ, next_guard));
                    }
                    target.name = succ.name.clone();
                    target.value = succ.value.clone();
                    let orphan = succ.right.take();
                    match spine_parent {
                        Some(mut spine_parent) => spine_parent.left = orphan,
                        // the spine had length zero: the successor was the
                        // target's right child itself
                        None => target.right = orphan,
                    }
                }
            }
            // all retained guards drop here; the unlinked node is destroyed
            // once its last reference goes
            return RemoveStatus::Removed;
        }
    }
    /// Render the whole tree to `out`, one node per line, indented by depth.
    ///
    /// Each subtree root stays read-locked while its subtree is printed, so
    /// the output is consistent within any subtree (though not atomic across
    /// siblings). Readers elsewhere in the tree are not blocked.
    pub fn print(&self, out: &mut dyn Write) -> IoResult<()> {
        Self::print_subtree(Some(&self.root), 0, out)
    }
    fn print_subtree(node: Option<&NodeRef>, depth: usize, out: &mut dyn Write) -> IoResult<()> {
        for _ in 0..depth {
            out.write_all(PRINT_INDENT.as_bytes())?;
        }
        let node = match node {
            Some(node) => node,
            None => return out.write_all(b"(null)\n"),
        };
        let guard = node.read_arc();
        if depth == 0 {
            out.write_all(b"(root)\n")?;
        } else {
            out.write_all(&guard.name)?;
            out.write_all(b" ")?;
            out.write_all(&guard.value)?;
            out.write_all(b"\n")?;
        }
        Self::print_subtree(guard.left.as_ref(), depth + 1, out)?;
        Self::print_subtree(guard.right.as_ref(), depth + 1, out)
        // guard drops here, after the entire subtree was rendered
    }
    /// True if no live node hangs off the sentinel
    pub fn is_empty(&self) -> bool {
        let root = self.root.read_arc();
        root.left.is_none() && root.right.is_none()
    }
    /// Destroy every node below the sentinel.
    ///
    /// Only legal once the server has quiesced: no worker may still be inside
    /// a traversal. Nodes are detached iteratively so that dropping a deep
    /// tree cannot overflow the stack, and the sentinel itself survives.
    pub fn cleanup(&self) {
        let mut pending: Vec<NodeRef> = Vec::new();
        {
            let mut root = self.root.write_arc();
            pending.extend(root.left.take());
            pending.extend(root.right.take());
        }
        while let Some(node) = pending.pop() {
            let mut guard = node.write_arc();
            pending.extend(guard.left.take());
            pending.extend(guard.right.take());
            // `node` is the last reference once the guard drops
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
