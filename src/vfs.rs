//! The VFS state machine.
//!
//! Path-addressed operations over the node graph, with a B*-tree name
//! index kept coherent with the tree: every structural change follows
//! the discipline *detach from index, mutate the graph, re-attach to the
//! index, touch the affected parents*. Subtree removal erases every
//! descendant's index entry before the subtree root is detached.

use std::rc::{Rc, Weak};

use tracing::debug;

use crate::compression::{self, Algorithm};
use crate::error::{Result, VfsError};
use crate::index::BStarTree;
use crate::node::{Node, NodeKind, NodeRef, NodeStats, WeakNodeRef};
use crate::path::{self, Preference};
use crate::snapshot;
use crate::stream::{ByteStream, StreamMode};

/// Branching factor of the by-name index.
const INDEX_BRANCHING: usize = 7;

/// Algorithm used by [`Vfs::compress`].
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::LzwAll;

pub struct Vfs {
    root: NodeRef,
    cwd: NodeRef,
    index: BStarTree<String, Vec<WeakNodeRef>>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub fn new() -> Self {
        let root = Node::new_dir("/".to_string());
        let mut vfs = Vfs {
            cwd: Rc::clone(&root),
            root,
            index: BStarTree::new(INDEX_BRANCHING).expect("valid branching factor"),
        };
        let root = Rc::clone(&vfs.root);
        vfs.index_insert(&root);
        vfs
    }

    /// Absolute path of the current directory.
    pub fn pwd(&self) -> String {
        Self::path_of(&self.cwd)
    }

    /// Absolute path of a live node.
    pub fn path_of(node: &NodeRef) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(Rc::clone(node));
        while let Some(n) = cursor {
            parts.push(n.borrow().name().to_string());
            cursor = n.borrow().parent();
        }
        parts.reverse();
        let mut out = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i == 0 && part == "/" {
                out.push('/');
                continue;
            }
            if out.len() > 1 {
                out.push('/');
            }
            out.push_str(part);
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Resolve a path against the current directory (or the root, for an
    /// absolute path). `.` is a no-op, `..` moves to the parent when one
    /// exists; intermediate components traverse directory slots only.
    pub fn resolve(&self, path: &str, preference: Preference) -> Option<NodeRef> {
        let parsed = path::parse(path);
        let mut cursor = if parsed.absolute {
            Rc::clone(&self.root)
        } else {
            Rc::clone(&self.cwd)
        };
        let count = parsed.components.len();
        for (i, component) in parsed.components.iter().enumerate() {
            let last = i + 1 == count;
            match component.as_str() {
                "." => {}
                ".." => {
                    let parent = cursor.borrow().parent();
                    if let Some(parent) = parent {
                        cursor = parent;
                    }
                }
                name => {
                    if last {
                        let want = if preference == Preference::Any && parsed.trailing_slash {
                            Preference::Directory
                        } else {
                            preference
                        };
                        let node = cursor.borrow();
                        return match want {
                            Preference::Any => node
                                .child(name, NodeKind::File)
                                .or_else(|| node.child(name, NodeKind::Directory)),
                            Preference::File => node.child(name, NodeKind::File),
                            Preference::Directory => node.child(name, NodeKind::Directory),
                        };
                    }
                    let next = cursor.borrow().child(name, NodeKind::Directory);
                    match next {
                        Some(dir) => cursor = dir,
                        None => return None,
                    }
                }
            }
        }
        // the path carried no trailing named component
        Self::filter_kind(cursor, preference)
    }

    fn filter_kind(node: NodeRef, preference: Preference) -> Option<NodeRef> {
        let matches = match preference {
            Preference::Any => true,
            Preference::File => node.borrow().is_file(),
            Preference::Directory => node.borrow().is_dir(),
        };
        matches.then_some(node)
    }

    /// Split the last component off and resolve the rest as a directory.
    fn resolve_parent(&self, path: &str) -> Result<(NodeRef, String)> {
        let mut parsed = path::parse(path);
        let leaf = parsed
            .components
            .pop()
            .ok_or_else(|| VfsError::InvalidArg("empty path".into()))?;
        let mut cursor = if parsed.absolute {
            Rc::clone(&self.root)
        } else {
            Rc::clone(&self.cwd)
        };
        for component in &parsed.components {
            match component.as_str() {
                "." => {}
                ".." => {
                    let parent = cursor.borrow().parent();
                    if let Some(parent) = parent {
                        cursor = parent;
                    }
                }
                name => {
                    let next = cursor.borrow().child(name, NodeKind::Directory);
                    cursor = next.ok_or_else(|| VfsError::Path(path.to_string()))?;
                }
            }
        }
        Ok((cursor, leaf))
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(VfsError::InvalidArg(format!("invalid name {name:?}")));
        }
        Ok(())
    }

    pub fn cd(&mut self, path: &str) -> Result<()> {
        match self.resolve(path, Preference::Directory) {
            Some(dir) => {
                self.cwd = dir;
                Ok(())
            }
            None => match self.resolve(path, Preference::Any) {
                Some(_) => Err(VfsError::InvalidArg(format!("not a directory: {path}"))),
                None => Err(VfsError::Path(path.to_string())),
            },
        }
    }

    /// Create a directory, auto-suffixing the name on collision with an
    /// existing directory sibling.
    pub fn mkdir(&mut self, path: &str) -> Result<NodeRef> {
        self.create_node(path, NodeKind::Directory, false)
    }

    /// Like [`mkdir`](Self::mkdir), but a collision fails with
    /// `AlreadyExists` instead of auto-suffixing.
    pub fn mkdir_exclusive(&mut self, path: &str) -> Result<NodeRef> {
        self.create_node(path, NodeKind::Directory, true)
    }

    /// Create an empty file, auto-suffixing the name on collision with an
    /// existing file sibling.
    pub fn create_file(&mut self, path: &str) -> Result<NodeRef> {
        self.create_node(path, NodeKind::File, false)
    }

    /// Like [`create_file`](Self::create_file), but a collision fails
    /// with `AlreadyExists` instead of auto-suffixing.
    pub fn create_file_exclusive(&mut self, path: &str) -> Result<NodeRef> {
        self.create_node(path, NodeKind::File, true)
    }

    fn create_node(&mut self, path: &str, kind: NodeKind, exclusive: bool) -> Result<NodeRef> {
        let (parent, leaf) = self.resolve_parent(path)?;
        Self::validate_name(&leaf)?;
        let name = {
            let p = parent.borrow();
            if Self::slot_occupied(&p, &leaf, kind) {
                if exclusive {
                    return Err(VfsError::AlreadyExists(leaf));
                }
                Self::unique_name(&p, &leaf, kind)
            } else {
                leaf
            }
        };
        let node = match kind {
            NodeKind::Directory => Node::new_dir(name),
            NodeKind::File => Node::new_file(name),
        };
        Self::attach(&parent, &node);
        self.index_insert(&node);
        parent.borrow_mut().touch();
        debug!(path, kind = ?kind, "created node");
        Ok(node)
    }

    /// Remove a node and its whole subtree.
    pub fn rm(&mut self, path: &str) -> Result<()> {
        let node = self
            .resolve(path, Preference::Any)
            .ok_or_else(|| VfsError::Path(path.to_string()))?;
        if Rc::ptr_eq(&node, &self.root) {
            return Err(VfsError::Root);
        }
        let parent = node
            .borrow()
            .parent()
            .ok_or_else(|| VfsError::Path(path.to_string()))?;
        self.index_erase_subtree(&node);
        Self::detach(&parent, &node);
        parent.borrow_mut().touch();
        debug!(path, "removed subtree");
        Ok(())
    }

    /// Rename in place. Renaming to the current name succeeds silently.
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<()> {
        Self::validate_name(new_name)?;
        let node = self
            .resolve(path, Preference::Any)
            .ok_or_else(|| VfsError::Path(path.to_string()))?;
        if Rc::ptr_eq(&node, &self.root) {
            return Err(VfsError::Root);
        }
        if node.borrow().name() == new_name {
            return Ok(());
        }
        let parent = node
            .borrow()
            .parent()
            .ok_or_else(|| VfsError::Path(path.to_string()))?;
        let kind = node.borrow().kind();
        if Self::slot_occupied(&parent.borrow(), new_name, kind) {
            return Err(VfsError::InvalidArg(format!(
                "sibling named {new_name:?} already exists"
            )));
        }
        self.index_erase(&node);
        Self::detach(&parent, &node);
        node.borrow_mut().name = new_name.to_string();
        Self::attach(&parent, &node);
        self.index_insert(&node);
        parent.borrow_mut().touch();
        debug!(path, new_name, "renamed node");
        Ok(())
    }

    /// Reparent `src` into the directory `dst_dir`. Moving into the
    /// current parent is a no-op.
    pub fn mv(&mut self, src: &str, dst_dir: &str) -> Result<()> {
        let node = self
            .resolve(src, Preference::Any)
            .ok_or_else(|| VfsError::Path(src.to_string()))?;
        if Rc::ptr_eq(&node, &self.root) {
            return Err(VfsError::Root);
        }
        let dst = match self.resolve(dst_dir, Preference::Directory) {
            Some(dir) => dir,
            None => {
                return match self.resolve(dst_dir, Preference::Any) {
                    Some(_) => Err(VfsError::InvalidArg(format!(
                        "not a directory: {dst_dir}"
                    ))),
                    None => Err(VfsError::Path(dst_dir.to_string())),
                }
            }
        };
        if Self::is_within_subtree(&dst, &node) {
            return Err(VfsError::Conflict);
        }
        let parent = node
            .borrow()
            .parent()
            .ok_or_else(|| VfsError::Path(src.to_string()))?;
        if Rc::ptr_eq(&parent, &dst) {
            return Ok(());
        }
        let (name, kind) = {
            let n = node.borrow();
            (n.name().to_string(), n.kind())
        };
        if Self::slot_occupied(&dst.borrow(), &name, kind) {
            return Err(VfsError::InvalidArg(format!(
                "destination already holds {name:?}"
            )));
        }
        Self::detach(&parent, &node);
        Self::attach(&dst, &node);
        parent.borrow_mut().touch();
        dst.borrow_mut().touch();
        debug!(src, dst_dir, "moved node");
        Ok(())
    }

    /// Deep-copy `src` to `dst_path`. An existing directory destination
    /// receives the copy under the source's name; an existing file
    /// destination names the copy next to it. Collisions auto-suffix.
    pub fn cp(&mut self, src: &str, dst_path: &str) -> Result<()> {
        let node = self
            .resolve(src, Preference::Any)
            .ok_or_else(|| VfsError::Path(src.to_string()))?;
        if Rc::ptr_eq(&node, &self.root) {
            return Err(VfsError::Root);
        }
        let (target_dir, desired) = match self.resolve(dst_path, Preference::Any) {
            Some(existing) => {
                if existing.borrow().is_file() {
                    let parent = existing
                        .borrow()
                        .parent()
                        .ok_or_else(|| VfsError::Path(dst_path.to_string()))?;
                    let name = existing.borrow().name().to_string();
                    (parent, name)
                } else {
                    let name = node.borrow().name().to_string();
                    (existing, name)
                }
            }
            None => {
                let (parent, leaf) = self.resolve_parent(dst_path)?;
                Self::validate_name(&leaf)?;
                (parent, leaf)
            }
        };
        if Self::is_within_subtree(&target_dir, &node) {
            return Err(VfsError::Conflict);
        }
        let kind = node.borrow().kind();
        let name = {
            let t = target_dir.borrow();
            if Self::slot_occupied(&t, &desired, kind) {
                Self::unique_name(&t, &desired, kind)
            } else {
                desired
            }
        };
        self.copy_rec(&node, &target_dir, name);
        target_dir.borrow_mut().touch();
        debug!(src, dst_path, "copied subtree");
        Ok(())
    }

    fn copy_rec(&mut self, src: &NodeRef, dst: &NodeRef, name: String) {
        let source = src.borrow();
        let clone = match source.kind() {
            NodeKind::File => Node::new_file(name),
            NodeKind::Directory => Node::new_dir(name),
        };
        if source.is_file() {
            let mut c = clone.borrow_mut();
            c.set_content(source.content().clone());
            c.touch();
        }
        Self::attach(dst, &clone);
        self.index_insert(&clone);
        if source.is_dir() {
            for (child_name, slots) in source.children() {
                if let Some(dir) = &slots.dir {
                    self.copy_rec(dir, &clone, child_name.clone());
                }
                if let Some(file) = &slots.file {
                    self.copy_rec(file, &clone, child_name.clone());
                }
            }
        }
    }

    /// Overwrite or append textual content.
    pub fn write_file(&mut self, path: &str, data: &str, append: bool) -> Result<()> {
        let node = self.resolve_file(path)?;
        let mut n = node.borrow_mut();
        if append {
            n.content_mut().append(data.as_bytes());
        } else {
            n.content_mut().assign_text(data);
        }
        n.touch();
        Ok(())
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        Ok(self.resolve_file(path)?.borrow().content().as_text())
    }

    fn resolve_file(&self, path: &str) -> Result<NodeRef> {
        match self.resolve(path, Preference::Any) {
            Some(node) if node.borrow().is_file() => Ok(node),
            Some(_) => Err(VfsError::InvalidArg(format!("not a file: {path}"))),
            None => Err(VfsError::Path(path.to_string())),
        }
    }

    /// Run `body` over a buffered stream on the file's content. Pending
    /// writes are flushed when the stream closes, and the file's stats
    /// are refreshed for writable modes.
    pub fn with_file_stream<R>(
        &self,
        path: &str,
        mode: StreamMode,
        capacity: usize,
        body: impl FnOnce(&mut ByteStream<'_>) -> Result<R>,
    ) -> Result<R> {
        let node = self.resolve_file(path)?;
        let mut guard = node.borrow_mut();
        let writable = matches!(mode, StreamMode::WriteOnly | StreamMode::ReadWrite);
        let result = {
            let mut stream = ByteStream::open(guard.content_mut(), mode, capacity)?;
            let value = body(&mut stream)?;
            stream.close()?;
            value
        };
        if writable {
            guard.touch();
        }
        Ok(result)
    }

    /// Compress every file in the subtree with the default algorithm.
    pub fn compress(&mut self, path: &str) -> Result<()> {
        self.compress_with(path, DEFAULT_ALGORITHM)
    }

    pub fn compress_with(&mut self, path: &str, algorithm: Algorithm) -> Result<()> {
        let node = self
            .resolve(path, Preference::Any)
            .ok_or_else(|| VfsError::Path(path.to_string()))?;
        Self::compress_rec(&node, algorithm)
    }

    fn compress_rec(node: &NodeRef, algorithm: Algorithm) -> Result<()> {
        if node.borrow().is_file() {
            let mut n = node.borrow_mut();
            // already in the target state: leave timestamps alone
            if compression::is_compressed(n.content()) {
                return Ok(());
            }
            compression::compress_in_place(n.content_mut(), algorithm)?;
            n.touch();
            return Ok(());
        }
        let guard = node.borrow();
        for slots in guard.children().values() {
            if let Some(dir) = &slots.dir {
                Self::compress_rec(dir, algorithm)?;
            }
            if let Some(file) = &slots.file {
                Self::compress_rec(file, algorithm)?;
            }
        }
        Ok(())
    }

    /// Decompress every compressed file in the subtree; plain files are
    /// skipped untouched.
    pub fn decompress(&mut self, path: &str) -> Result<()> {
        let node = self
            .resolve(path, Preference::Any)
            .ok_or_else(|| VfsError::Path(path.to_string()))?;
        Self::decompress_rec(&node)
    }

    fn decompress_rec(node: &NodeRef) -> Result<()> {
        if node.borrow().is_file() {
            let mut n = node.borrow_mut();
            if !compression::is_compressed(n.content()) {
                return Ok(());
            }
            compression::decompress_in_place(n.content_mut())?;
            n.touch();
            return Ok(());
        }
        let guard = node.borrow();
        for slots in guard.children().values() {
            if let Some(dir) = &slots.dir {
                Self::decompress_rec(dir)?;
            }
            if let Some(file) = &slots.file {
                Self::decompress_rec(file)?;
            }
        }
        Ok(())
    }

    /// Serialize the whole tree into a file at `json_path`, creating or
    /// overwriting it.
    pub fn save_json(&mut self, json_path: &str) -> Result<()> {
        let (parent, leaf) = self.resolve_parent(json_path)?;
        Self::validate_name(&leaf)?;
        let existing = parent.borrow().child(&leaf, NodeKind::File);
        let target = match existing {
            Some(file) => file,
            None => {
                let node = Node::new_file(leaf);
                Self::attach(&parent, &node);
                self.index_insert(&node);
                parent.borrow_mut().touch();
                node
            }
        };
        let json = snapshot::tree_to_json(&self.root)?;
        let mut t = target.borrow_mut();
        t.content_mut().assign_text(&json);
        t.touch();
        Ok(())
    }

    /// Every live node currently bearing `name`.
    pub fn find_nodes_by_name(&self, name: &str) -> Vec<NodeRef> {
        self.index
            .find(name)
            .map(|bucket| bucket.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Directory listing: `(name, kind)` pairs in name order, the
    /// directory slot before the file slot.
    pub fn list(&self, path: &str) -> Result<Vec<(String, NodeKind)>> {
        let node = if path.is_empty() {
            Rc::clone(&self.cwd)
        } else {
            match self.resolve(path, Preference::Directory) {
                Some(dir) => dir,
                None => {
                    return match self.resolve(path, Preference::Any) {
                        Some(_) => Err(VfsError::InvalidArg(format!("not a directory: {path}"))),
                        None => Err(VfsError::Path(path.to_string())),
                    }
                }
            }
        };
        let guard = node.borrow();
        let mut out = Vec::new();
        for (name, slots) in guard.children() {
            if slots.dir.is_some() {
                out.push((name.clone(), NodeKind::Directory));
            }
            if slots.file.is_some() {
                out.push((name.clone(), NodeKind::File));
            }
        }
        Ok(out)
    }

    /// Indented rendering of the whole tree.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        Self::render_rec(&self.root, 0, &mut out);
        out
    }

    fn render_rec(node: &NodeRef, depth: usize, out: &mut String) {
        let guard = node.borrow();
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(guard.name());
        if guard.is_dir() && guard.name() != "/" {
            out.push('/');
        }
        out.push('\n');
        if guard.is_dir() {
            for slots in guard.children().values() {
                if let Some(dir) = &slots.dir {
                    Self::render_rec(dir, depth + 1, out);
                }
                if let Some(file) = &slots.file {
                    Self::render_rec(file, depth + 1, out);
                }
            }
        }
    }

    pub fn stat(&self, path: &str) -> Result<NodeStats> {
        self.resolve(path, Preference::Any)
            .map(|node| node.borrow().stats())
            .ok_or_else(|| VfsError::Path(path.to_string()))
    }

    fn attach(parent: &NodeRef, node: &NodeRef) {
        node.borrow_mut().parent = Rc::downgrade(parent);
        let (name, kind) = {
            let n = node.borrow();
            (n.name().to_string(), n.kind())
        };
        let mut p = parent.borrow_mut();
        let slots = p.children_mut().entry(name).or_default();
        match kind {
            NodeKind::File => slots.file = Some(Rc::clone(node)),
            NodeKind::Directory => slots.dir = Some(Rc::clone(node)),
        }
    }

    fn detach(parent: &NodeRef, node: &NodeRef) {
        let (name, kind) = {
            let n = node.borrow();
            (n.name().to_string(), n.kind())
        };
        let mut p = parent.borrow_mut();
        let mut now_empty = false;
        if let Some(slots) = p.children_mut().get_mut(&name) {
            match kind {
                NodeKind::File => slots.file = None,
                NodeKind::Directory => slots.dir = None,
            }
            now_empty = slots.is_empty();
        }
        if now_empty {
            p.children_mut().remove(&name);
        }
        drop(p);
        node.borrow_mut().parent = Weak::new();
    }

    fn slot_occupied(parent: &Node, name: &str, kind: NodeKind) -> bool {
        parent
            .children()
            .get(name)
            .map_or(false, |slots| slots.get(kind).is_some())
    }

    /// `<stem>(<k>)<ext>` for the smallest free k. Files split stem and
    /// extension on the last dot unless the name starts with one;
    /// directories take no extension.
    fn unique_name(parent: &Node, base: &str, kind: NodeKind) -> String {
        let (stem, ext) = match kind {
            NodeKind::File => match base.rfind('.') {
                Some(pos) if pos > 0 => base.split_at(pos),
                _ => (base, ""),
            },
            NodeKind::Directory => (base, ""),
        };
        let mut k = 1u32;
        loop {
            let candidate = format!("{stem}({k}){ext}");
            if !Self::slot_occupied(parent, &candidate, kind) {
                return candidate;
            }
            k += 1;
        }
    }

    /// True iff `node` lies in the subtree rooted at `ancestor`
    /// (including `node == ancestor`).
    fn is_within_subtree(node: &NodeRef, ancestor: &NodeRef) -> bool {
        let mut cursor = Some(Rc::clone(node));
        while let Some(n) = cursor {
            if Rc::ptr_eq(&n, ancestor) {
                return true;
            }
            cursor = n.borrow().parent();
        }
        false
    }

    fn index_insert(&mut self, node: &NodeRef) {
        let name = node.borrow().name().to_string();
        let weak = Rc::downgrade(node);
        if let Some(bucket) = self.index.get_mut(&name) {
            bucket.push(weak);
        } else {
            self.index.insert(name, vec![weak]);
        }
    }

    fn index_erase(&mut self, node: &NodeRef) {
        let name = node.borrow().name().to_string();
        let mut emptied = false;
        if let Some(bucket) = self.index.get_mut(&name) {
            bucket.retain(|weak| {
                weak.upgrade()
                    .map_or(false, |live| !Rc::ptr_eq(&live, node))
            });
            emptied = bucket.is_empty();
        }
        if emptied {
            self.index.erase(&name);
        }
    }

    fn index_erase_subtree(&mut self, node: &NodeRef) {
        if node.borrow().is_dir() {
            let children: Vec<NodeRef> = node
                .borrow()
                .children()
                .values()
                .flat_map(|slots| [slots.dir.clone(), slots.file.clone()])
                .flatten()
                .collect();
            for child in children {
                self.index_erase_subtree(&child);
            }
        }
        self.index_erase(node);
    }
}
