//! Nodes of the namespace tree.
//!
//! A directory owns its children through strong [`Rc`] handles; every
//! child keeps a [`Weak`] back-reference to its parent, and the name
//! index holds only weak handles too, so detaching a subtree frees it
//! once no external holder remains. A directory maps each name to a pair
//! of independent slots, letting a file and a directory share a name.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::content::Content;

pub type NodeRef = Rc<RefCell<Node>>;
pub type WeakNodeRef = Weak<RefCell<Node>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Per-name pair of child slots.
#[derive(Debug, Default)]
pub struct ChildSlots {
    pub file: Option<NodeRef>,
    pub dir: Option<NodeRef>,
}

impl ChildSlots {
    pub fn get(&self, kind: NodeKind) -> Option<&NodeRef> {
        match kind {
            NodeKind::File => self.file.as_ref(),
            NodeKind::Directory => self.dir.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.dir.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub modified_at: u64,
    pub byte_size: u64,
    /// Length of the textual decoding of the content.
    pub char_count: u64,
}

#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    kind: NodeKind,
    pub(crate) parent: WeakNodeRef,
    children: BTreeMap<String, ChildSlots>,
    content: Content,
    stats: NodeStats,
}

impl Node {
    pub(crate) fn new_dir(name: String) -> NodeRef {
        Self::new(name, NodeKind::Directory)
    }

    pub(crate) fn new_file(name: String) -> NodeRef {
        Self::new(name, NodeKind::File)
    }

    fn new(name: String, kind: NodeKind) -> NodeRef {
        let now = unix_now();
        Rc::new(RefCell::new(Node {
            name,
            kind,
            parent: Weak::new(),
            children: BTreeMap::new(),
            content: Content::new(),
            stats: NodeStats {
                created_at: now,
                modified_at: now,
                byte_size: 0,
                char_count: 0,
            },
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.upgrade()
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub(crate) fn content_mut(&mut self) -> &mut Content {
        &mut self.content
    }

    pub(crate) fn set_content(&mut self, content: Content) {
        self.content = content;
    }

    pub fn children(&self) -> &BTreeMap<String, ChildSlots> {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut BTreeMap<String, ChildSlots> {
        &mut self.children
    }

    pub fn child(&self, name: &str, kind: NodeKind) -> Option<NodeRef> {
        self.children
            .get(name)
            .and_then(|slots| slots.get(kind))
            .map(Rc::clone)
    }

    /// Refresh the modification time and the content-derived stats.
    pub(crate) fn touch(&mut self) {
        self.stats.modified_at = unix_now();
        self.stats.byte_size = self.content.len() as u64;
        self.stats.char_count = self.content.char_count() as u64;
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
