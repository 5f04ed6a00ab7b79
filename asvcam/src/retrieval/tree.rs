//! Remote file tree and the listing wire format.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Directory listing returned by `GET <base>/files[/<sub>]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// One file in a listing.
///
/// Only `name` is interpreted; the remaining attributes (size, timestamps)
/// are kept as reported.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileEntry {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    /// Lowercased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// A node of the remote tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteNode {
    Directory(RemoteTree),
    File(FileEntry),
}

/// Ordered mapping from entry name to node.
///
/// Built once per run by [`super::RetrievalWalker::enumerate`] and consumed
/// read-only while walking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteTree {
    entries: BTreeMap<String, RemoteNode>,
}

impl RemoteTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_file(&mut self, entry: FileEntry) {
        self.entries.insert(entry.name.clone(), RemoteNode::File(entry));
    }

    pub fn insert_directory(&mut self, name: impl Into<String>, tree: RemoteTree) {
        self.entries.insert(name.into(), RemoteNode::Directory(tree));
    }

    pub fn get(&self, name: &str) -> Option<&RemoteNode> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RemoteNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Immediate subdirectories, in name order.
    pub fn directories(&self) -> impl Iterator<Item = (&str, &RemoteTree)> {
        self.iter().filter_map(|(name, node)| match node {
            RemoteNode::Directory(tree) => Some((name, tree)),
            RemoteNode::File(_) => None,
        })
    }

    /// Immediate files, in name order.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values().filter_map(|node| match node {
            RemoteNode::File(entry) => Some(entry),
            RemoteNode::Directory(_) => None,
        })
    }

    /// Total number of files at any depth.
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                RemoteNode::File(_) => 1,
                RemoteNode::Directory(tree) => tree.file_count(),
            })
            .sum()
    }
}
