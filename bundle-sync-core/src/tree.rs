//! The bundle's directory tree.
//!
//! A manifest (`structure.json`) is a JSON array of directory objects, each of
//! which may nest more directories under `directories`:
//!
//! ```json
//! [{"id": 1, "title": "A", "order": 0, "directories": [{"id": 2, "title": "B"}]}]
//! ```
//!
//! Nodes are decoded one at a time. A node without an integer `id` is dropped
//! together with its subtree; its siblings and parent are kept. Any other field
//! of the wrong JSON type reads as absent. Only a manifest that is not a JSON
//! array fails as a whole.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TreeError;

/// A file attached to a directory, downloadable when it has a `url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub title: Option<String>,
    pub url: Option<Url>,
    pub mime: Option<String>,
    /// Size of the remote file in bytes.
    pub size: Option<f64>,
    pub description: Option<String>,
}

impl FileDescriptor {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
        Some(FileDescriptor {
            title: text("title"),
            url: object
                .get("url")
                .and_then(Value::as_str)
                .and_then(|raw| Url::parse(raw).ok()),
            mime: text("mime"),
            size: object.get("size").and_then(Value::as_f64),
            description: text("description"),
        })
    }

    pub fn is_downloadable(&self) -> bool {
        self.url.is_some()
    }
}

/// One directory of the bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    /// Display position among siblings.
    pub order: i64,
    pub title: Option<String>,
    /// Markdown, or a path relative to the bundle root.
    pub content: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    #[serde(rename = "directories")]
    pub children: Vec<DirectoryNode>,
    pub attachments: Vec<FileDescriptor>,
    /// Part of the critical path.
    pub critical: bool,
}

impl DirectoryNode {
    fn from_value(value: &Value) -> Option<Self> {
        let Some(object) = value.as_object() else {
            debug!(found = %value, "Dropping manifest node that is not an object");
            return None;
        };
        let Some(id) = object.get("id").and_then(Value::as_i64) else {
            debug!(id = ?object.get("id"), "Dropping manifest node without an integer id");
            return None;
        };

        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);

        let children = object
            .get("directories")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(DirectoryNode::from_value).collect())
            .unwrap_or_default();

        let attachments = object
            .get("attachments")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(FileDescriptor::from_value).collect())
            .unwrap_or_default();

        Some(DirectoryNode {
            id,
            parent_id: object.get("parentId").and_then(Value::as_i64),
            order: object.get("order").and_then(Value::as_i64).unwrap_or(0),
            title: text("title"),
            content: text("content"),
            metadata: object.get("metadata").and_then(Value::as_object).cloned(),
            children,
            attachments,
            critical: object
                .get("critical")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Children ordered by their display position. Ties keep manifest order.
    pub fn sorted_children(&self) -> Vec<&DirectoryNode> {
        let mut children: Vec<&DirectoryNode> = self.children.iter().collect();
        children.sort_by_key(|child| child.order);
        children
    }

    pub fn downloadable_attachments(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.attachments.iter().filter(|a| a.is_downloadable())
    }
}

/// Depth-first pre-order walk over a forest of nodes.
pub struct Preorder<'a> {
    stack: Vec<&'a DirectoryNode>,
}

impl<'a> Preorder<'a> {
    pub fn new(roots: &'a [DirectoryNode]) -> Self {
        Self {
            stack: roots.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a DirectoryNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Find the node with `identifier`.
///
/// Each node is checked before its own subtree, and a subtree is exhausted
/// before the next sibling; with duplicate identifiers the first node in that
/// order wins.
pub fn find(identifier: i64, within: &[DirectoryNode]) -> Option<&DirectoryNode> {
    Preorder::new(within).find(|node| node.id == identifier)
}

/// The parsed manifest of one bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentTree {
    roots: Vec<DirectoryNode>,
    duplicate_ids: Vec<i64>,
}

impl ContentTree {
    pub fn new(roots: Vec<DirectoryNode>) -> Self {
        let duplicate_ids = collect_duplicates(&roots);
        Self {
            roots,
            duplicate_ids,
        }
    }

    /// Parse manifest bytes.
    pub fn parse(manifest: &[u8]) -> Result<Self, TreeError> {
        let value: Value = serde_json::from_slice(manifest)?;
        let Value::Array(items) = value else {
            return Err(TreeError::NotAnArray);
        };

        let roots: Vec<DirectoryNode> = items.iter().filter_map(DirectoryNode::from_value).collect();
        if roots.len() < items.len() {
            debug!(
                dropped = items.len() - roots.len(),
                "Dropped top-level manifest nodes without a usable id"
            );
        }

        let tree = ContentTree::new(roots);
        if !tree.duplicate_ids.is_empty() {
            warn!(ids = ?tree.duplicate_ids, "Manifest contains duplicate directory ids; first in pre-order wins");
        }
        Ok(tree)
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let bytes = std::fs::read(path)?;
        let tree = Self::parse(&bytes)?;
        info!(path = %path.display(), nodes = tree.len(), "Loaded content tree");
        Ok(tree)
    }

    pub fn roots(&self) -> &[DirectoryNode] {
        &self.roots
    }

    pub fn find(&self, identifier: i64) -> Option<&DirectoryNode> {
        find(identifier, &self.roots)
    }

    pub fn iter(&self) -> Preorder<'_> {
        Preorder::new(&self.roots)
    }

    /// Total number of nodes at every depth.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Nodes flagged `critical`, in pre-order.
    pub fn critical_path(&self) -> Vec<&DirectoryNode> {
        self.iter().filter(|node| node.critical).collect()
    }

    /// Identifiers that occur more than once.
    pub fn duplicate_ids(&self) -> &[i64] {
        &self.duplicate_ids
    }
}

fn collect_duplicates(roots: &[DirectoryNode]) -> Vec<i64> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for node in Preorder::new(roots) {
        if !seen.insert(node.id) && !duplicates.contains(&node.id) {
            duplicates.push(node.id);
        }
    }
    duplicates
}
