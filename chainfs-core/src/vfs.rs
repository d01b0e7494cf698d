//! Virtual file system: a directory tree whose leaves are chain head ids,
//! held in memory and synchronized lazily to its own backing chain.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::chain::{ChainStore, Header};
use crate::error::{ChainFsError, Result};
use crate::store::{BlockId, RawStore};

/// Sentinel name of the tree's root directory.
pub const ROOT: &str = "root";

/// One node of the tree: a file leaf holding its chain head, or a nested
/// directory. An entry is always exactly one of the two.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    File(BlockId),
    Directory(BTreeMap<String, Entry>),
}

type Dir = BTreeMap<String, Entry>;

pub struct Vfs<S: RawStore> {
    chains: ChainStore<S>,
    /// Entries under the root sentinel.
    tree: Dir,
    /// Current path; always starts with [`ROOT`].
    path: Vec<String>,
    /// Head of the backing chain holding the serialized tree.
    head: BlockId,
    dirty: bool,
}

impl<S: RawStore> Vfs<S> {
    /// Open the session for the key held by `chains`: find the owned block
    /// whose title equals the key's label and load its chain, or create a
    /// fresh empty tree and upload it immediately.
    pub fn open(mut chains: ChainStore<S>) -> Result<Self> {
        let label = chains.key().label().to_string();
        let owned = chains.client_mut().list_owned()?;
        let existing = owned.into_iter().find(|(_, meta)| meta.title == label);
        let (head, tree) = match existing {
            Some((id, _)) => {
                let (_, bytes) = chains.download(&id)?;
                (id, decode_tree(&bytes)?)
            }
            None => {
                let tree = Dir::new();
                let head = upload_tree(&mut chains, &tree, &label)?;
                (head, tree)
            }
        };
        info!("opened session at head {head}");
        Ok(Self {
            chains,
            tree,
            path: vec![ROOT.to_string()],
            head,
            dirty: false,
        })
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn head(&self) -> &BlockId {
        &self.head
    }

    /// The whole tree, for tree-view rendering.
    pub fn tree(&self) -> &BTreeMap<String, Entry> {
        &self.tree
    }

    pub fn into_chains(self) -> ChainStore<S> {
        self.chains
    }

    pub fn cd(&mut self, name: &str) -> Result<()> {
        if name == ".." {
            if self.path.len() == 1 {
                return Err(ChainFsError::TreeNavigation("already at the root".to_string()));
            }
            self.path.pop();
            return Ok(());
        }
        match self.cwd()?.get(name) {
            Some(Entry::Directory(_)) => {
                self.path.push(name.to_string());
                Ok(())
            }
            Some(Entry::File(_)) => Err(ChainFsError::TreeNavigation(format!(
                "{name:?} is a file, not a directory"
            ))),
            None => Err(ChainFsError::TreeNavigation(format!(
                "no such directory {name:?}"
            ))),
        }
    }

    /// Create an empty directory at `name`, then descend into it.
    pub fn mkdir(&mut self, name: &str) -> Result<()> {
        let dir = self.cwd_mut()?;
        if dir.contains_key(name) {
            return Err(ChainFsError::TreeNavigation(format!(
                "{name:?} already exists"
            )));
        }
        dir.insert(name.to_string(), Entry::Directory(Dir::new()));
        self.dirty = true;
        self.cd(name)
    }

    /// Upload `data` as a new chain and hang its head at `name` in the
    /// current directory. Replacing an existing file uploads the new chain
    /// first and releases the old one only once the leaf points at the new
    /// head, so a failed upload cannot lose the old data. An existing
    /// directory of that name is an error.
    pub fn touch(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let existing = match self.cwd()?.get(name) {
            Some(Entry::Directory(_)) => {
                return Err(ChainFsError::TreeNavigation(format!(
                    "{name:?} is a directory"
                )));
            }
            Some(Entry::File(old)) => Some(old.clone()),
            None => None,
        };
        let mut header = Header::new();
        header.insert("filename".to_string(), name.to_string());
        let head = self.chains.upload(data, &header, None)?;
        self.cwd_mut()?.insert(name.to_string(), Entry::File(head));
        self.dirty = true;
        if let Some(old) = existing
            && let Err(e) = self.chains.remove(&old)
        {
            // the leaf already points at the new chain; the old one is orphaned
            warn!("replaced chain {old} not fully removed: {e}");
            return Err(e);
        }
        Ok(())
    }

    /// Download the named file's chain; returns its header and bytes.
    pub fn fetch(&mut self, name: &str) -> Result<(Header, Vec<u8>)> {
        let head = self.file_head(name)?;
        self.chains.download(&head)
    }

    /// Drop the file leaf, then delete its chain.
    pub fn rm(&mut self, name: &str) -> Result<()> {
        let head = self.file_head(name)?;
        self.cwd_mut()?.remove(name);
        self.dirty = true;
        self.chains.remove(&head)
    }

    /// Remove an empty directory. Non-empty directories are refused, so no
    /// contained file chain can be orphaned.
    pub fn rmdir(&mut self, name: &str) -> Result<()> {
        let dir = self.cwd_mut()?;
        let empty = match dir.get(name) {
            Some(Entry::Directory(d)) => d.is_empty(),
            Some(Entry::File(_)) => {
                return Err(ChainFsError::TreeNavigation(format!("{name:?} is a file")));
            }
            None => {
                return Err(ChainFsError::TreeNavigation(format!(
                    "no such directory {name:?}"
                )));
            }
        };
        if !empty {
            return Err(ChainFsError::TreeNavigation(format!(
                "{name:?} is not empty"
            )));
        }
        dir.remove(name);
        self.dirty = true;
        Ok(())
    }

    /// Entries of the current directory, split into (files, directories).
    pub fn ls(&self) -> Result<(Vec<String>, Vec<String>)> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for (name, entry) in self.cwd()? {
            match entry {
                Entry::File(_) => files.push(name.clone()),
                Entry::Directory(_) => dirs.push(name.clone()),
            }
        }
        Ok((files, dirs))
    }

    /// Persist the in-memory tree: the new backing chain is uploaded first,
    /// the old one deleted second, so there is always a readable tree on the
    /// store. No-op while clean.
    ///
    /// A failed delete strands the previous chain under the same label
    /// title, and a later [`Vfs::open`] may load either copy; the error is
    /// surfaced so the caller can retry the removal.
    pub fn sync(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let label = self.chains.key().label().to_string();
        let new_head = upload_tree(&mut self.chains, &self.tree, &label)?;
        let old_head = std::mem::replace(&mut self.head, new_head);
        self.dirty = false;
        if let Err(e) = self.chains.remove(&old_head) {
            // the new chain is already live; the old one is orphaned
            warn!("previous backing chain {old_head} not fully removed: {e}");
            return Err(e);
        }
        info!("synced tree to head {}", self.head);
        Ok(())
    }

    fn file_head(&self, name: &str) -> Result<BlockId> {
        match self.cwd()?.get(name) {
            Some(Entry::File(id)) => Ok(id.clone()),
            Some(Entry::Directory(_)) => Err(ChainFsError::TreeNavigation(format!(
                "{name:?} is a directory"
            ))),
            None => Err(ChainFsError::TreeNavigation(format!("no such file {name:?}"))),
        }
    }

    fn cwd(&self) -> Result<&Dir> {
        let mut dir = &self.tree;
        for name in &self.path[1..] {
            match dir.get(name) {
                Some(Entry::Directory(d)) => dir = d,
                _ => {
                    return Err(ChainFsError::TreeNavigation(format!(
                        "path segment {name:?} is gone"
                    )));
                }
            }
        }
        Ok(dir)
    }

    fn cwd_mut(&mut self) -> Result<&mut Dir> {
        let mut dir = &mut self.tree;
        for name in &self.path[1..] {
            match dir.get_mut(name) {
                Some(Entry::Directory(d)) => dir = d,
                _ => {
                    return Err(ChainFsError::TreeNavigation(format!(
                        "path segment {name:?} is gone"
                    )));
                }
            }
        }
        Ok(dir)
    }
}

fn encode_tree(tree: &Dir) -> Result<Vec<u8>> {
    let mut root = Dir::new();
    root.insert(ROOT.to_string(), Entry::Directory(tree.clone()));
    let mut out = Vec::new();
    ciborium::ser::into_writer(&root, &mut out)
        .map_err(|e| ChainFsError::Format(format!("directory tree: {e}")))?;
    Ok(out)
}

fn decode_tree(bytes: &[u8]) -> Result<Dir> {
    let mut root: Dir = ciborium::de::from_reader(bytes)
        .map_err(|e| ChainFsError::Format(format!("directory tree: {e}")))?;
    match root.remove(ROOT) {
        Some(Entry::Directory(dir)) => Ok(dir),
        _ => Err(ChainFsError::Format(
            "directory tree has no root sentinel".to_string(),
        )),
    }
}

fn upload_tree<S: RawStore>(chains: &mut ChainStore<S>, tree: &Dir, label: &str) -> Result<BlockId> {
    chains.upload(&encode_tree(tree)?, &Header::new(), Some(label))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::catalog::Catalog;
    use crate::client::Client;
    use crate::config::Config;
    use crate::crypto::kdf::SecretKey;
    use crate::store::mem::MemStore;

    fn vfs_with(config: &Config) -> Vfs<MemStore> {
        let client = Client::new(MemStore::new(), config);
        let chains = ChainStore::new(
            client,
            Catalog::synthetic(),
            SecretKey::derive("test pass").unwrap(),
        );
        Vfs::open(chains).unwrap()
    }

    fn vfs() -> Vfs<MemStore> {
        vfs_with(&Config::default())
    }

    fn fast_retry() -> Config {
        Config {
            min_interval: Duration::ZERO,
            max_attempts: 2,
            retry_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn fresh_session_starts_at_the_root() {
        let vfs = vfs();
        assert_eq!(vfs.path(), [ROOT.to_string()]);
        let (files, dirs) = vfs.ls().unwrap();
        assert!(files.is_empty() && dirs.is_empty());
    }

    #[test]
    fn cd_rejects_bad_targets() {
        let mut vfs = vfs();
        assert!(matches!(
            vfs.cd(".."),
            Err(ChainFsError::TreeNavigation(_))
        ));
        assert!(vfs.cd("nowhere").is_err());
        vfs.touch("a-file", b"x").unwrap();
        assert!(vfs.cd("a-file").is_err());
    }

    #[test]
    fn mkdir_descends_and_rejects_duplicates() {
        let mut vfs = vfs();
        vfs.mkdir("docs").unwrap();
        assert_eq!(vfs.path().last().unwrap(), "docs");
        vfs.cd("..").unwrap();
        assert!(vfs.mkdir("docs").is_err());
    }

    #[test]
    fn ls_splits_files_from_directories() {
        let mut vfs = vfs();
        vfs.mkdir("docs").unwrap();
        vfs.cd("..").unwrap();
        vfs.touch("readme", b"hello").unwrap();
        let (files, dirs) = vfs.ls().unwrap();
        assert_eq!(files, ["readme"]);
        assert_eq!(dirs, ["docs"]);
    }

    #[test]
    fn touch_replaces_and_releases_the_old_chain() {
        let mut vfs = vfs();
        vfs.touch("note", b"first").unwrap();
        let blocks_after_first = vfs.chains.client_mut().raw().len();
        vfs.touch("note", b"second").unwrap();
        // old chain released, same block count
        assert_eq!(vfs.chains.client_mut().raw().len(), blocks_after_first);
        let (_, data) = vfs.fetch("note").unwrap();
        assert_eq!(data, b"second");
    }

    #[test]
    fn failed_replacement_upload_keeps_the_old_file() {
        let mut vfs = vfs_with(&fast_retry());
        vfs.touch("note", b"first").unwrap();
        let blocks = vfs.chains.client_mut().raw().len();

        // initial call plus max_attempts retries, all throttled
        vfs.chains.client_mut().raw_mut().throttle_next = 3;
        let err = vfs.touch("note", b"second").unwrap_err();
        assert!(matches!(err, ChainFsError::RateLimited { .. }));

        // the leaf still points at the old, intact chain
        let (files, _) = vfs.ls().unwrap();
        assert_eq!(files, ["note"]);
        let (_, data) = vfs.fetch("note").unwrap();
        assert_eq!(data, b"first");
        assert_eq!(vfs.chains.client_mut().raw().len(), blocks);
    }

    #[test]
    fn touch_refuses_a_directory_name() {
        let mut vfs = vfs();
        vfs.mkdir("docs").unwrap();
        vfs.cd("..").unwrap();
        assert!(vfs.touch("docs", b"x").is_err());
    }

    #[test]
    fn rm_deletes_leaf_and_chain() {
        let mut vfs = vfs();
        vfs.touch("note", b"bytes").unwrap();
        vfs.rm("note").unwrap();
        assert!(vfs.fetch("note").is_err());
        // only the backing chain block remains
        assert_eq!(vfs.chains.client_mut().raw().len(), 1);
    }

    #[test]
    fn rmdir_refuses_non_empty_directories() {
        let mut vfs = vfs();
        vfs.mkdir("docs").unwrap();
        vfs.touch("inside", b"x").unwrap();
        vfs.cd("..").unwrap();
        assert!(matches!(
            vfs.rmdir("docs"),
            Err(ChainFsError::TreeNavigation(_))
        ));
        vfs.cd("docs").unwrap();
        vfs.rm("inside").unwrap();
        vfs.cd("..").unwrap();
        vfs.rmdir("docs").unwrap();
        let (_, dirs) = vfs.ls().unwrap();
        assert!(dirs.is_empty());
    }

    #[test]
    fn sync_is_a_no_op_while_clean() {
        let mut vfs = vfs();
        let calls = vfs.chains.client_mut().raw().calls;
        vfs.sync().unwrap();
        assert_eq!(vfs.chains.client_mut().raw().calls, calls);
    }

    #[test]
    fn failed_sync_keeps_head_tree_and_dirty_flag() {
        let mut vfs = vfs_with(&fast_retry());
        let old_head = vfs.head().clone();
        vfs.mkdir("docs").unwrap();
        vfs.cd("..").unwrap();

        vfs.chains.client_mut().raw_mut().throttle_next = 3;
        let err = vfs.sync().unwrap_err();
        assert!(matches!(err, ChainFsError::RateLimited { .. }));

        // nothing moved: same head, mutation still in the tree, old
        // backing chain still readable
        assert_eq!(vfs.head(), &old_head);
        let (_, dirs) = vfs.ls().unwrap();
        assert_eq!(dirs, ["docs"]);
        vfs.chains.download(&old_head).unwrap();

        // still dirty, so the next sync publishes the mutation
        vfs.sync().unwrap();
        assert_ne!(vfs.head(), &old_head);
        assert_eq!(vfs.chains.client_mut().raw().len(), 1);
    }

    #[test]
    fn sync_replaces_the_backing_chain() {
        let mut vfs = vfs();
        let old_head = vfs.head().clone();
        vfs.mkdir("docs").unwrap();
        vfs.sync().unwrap();
        assert_ne!(vfs.head(), &old_head);
        // exactly one backing chain block on the store
        assert_eq!(vfs.chains.client_mut().raw().len(), 1);
    }
}
