//! Snapshot serialization.
//!
//! Renders the tree as a self-contained JSON document: every node
//! carries `name` and `type` (`file` or `folder`), folders with children
//! add a `children` array (directory slot before file slot per name).
//! The result is stored back into the VFS as a regular file, never
//! written to the host filesystem.

use serde::Serialize;

use crate::error::Result;
use crate::node::NodeRef;

#[derive(Serialize)]
struct SnapshotNode {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<SnapshotNode>>,
}

fn build(node: &NodeRef) -> SnapshotNode {
    let guard = node.borrow();
    if guard.is_file() {
        return SnapshotNode {
            name: guard.name().to_string(),
            kind: "file",
            children: None,
        };
    }
    let mut children = Vec::new();
    for slots in guard.children().values() {
        if let Some(dir) = &slots.dir {
            children.push(build(dir));
        }
        if let Some(file) = &slots.file {
            children.push(build(file));
        }
    }
    SnapshotNode {
        name: guard.name().to_string(),
        kind: "folder",
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

pub fn tree_to_json(root: &NodeRef) -> Result<String> {
    let mut text = serde_json::to_string_pretty(&build(root))?;
    text.push('\n');
    Ok(text)
}
