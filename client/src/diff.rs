use blockhaus_protocol::{Tree, TreePath};
use std::collections::BTreeSet;

/// Paths to delete from and add to the remote tree. A changed path appears
/// in both sets: every update is a delete-then-replace, never an in-place
/// patch, so the same code path handles create, delete and modify.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub remove: BTreeSet<TreePath>,
    pub add: BTreeSet<TreePath>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

pub fn diff(remote: &Tree, local: &Tree) -> TreeDiff {
    let mut result = TreeDiff {
        remove: remote
            .keys()
            .filter(|path| !local.contains_key(*path))
            .cloned()
            .collect(),
        add: local
            .keys()
            .filter(|path| !remote.contains_key(*path))
            .cloned()
            .collect(),
    };
    for (path, local_node) in local {
        if let Some(remote_node) = remote.get(path) {
            if remote_node != local_node {
                result.remove.insert(path.clone());
                result.add.insert(path.clone());
            }
        }
    }
    result
}
