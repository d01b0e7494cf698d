//! Directory-backed store backend: one CBOR file per block under a root
//! directory. Stands in for the real remote service so the CLI works end to
//! end; listed fingerprints are the token ids themselves.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChainFsError, Result};
use crate::store::{
    BLOCK_CAPACITY, BlockId, BlockMeta, LIST_PAGE, OwnedPage, Page, RawStore, TokenId,
};
use crate::util::random_hex;

const BLOCK_EXT: &str = "blk";

#[derive(Serialize, Deserialize)]
struct StoredBlock {
    meta: BlockMeta,
    tokens: Vec<TokenId>,
}

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{BLOCK_EXT}"))
    }

    fn load(&self, id: &BlockId) -> Result<StoredBlock> {
        let bytes = fs::read(self.path_for(id))
            .map_err(|_| ChainFsError::Remote(format!("no such block {id}")))?;
        ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| ChainFsError::Format(format!("block {id}: {e}")))
    }

    fn save(&self, id: &BlockId, block: &StoredBlock) -> Result<()> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(block, &mut buf)
            .map_err(|e| ChainFsError::Format(format!("block {id}: {e}")))?;
        fs::write(self.path_for(id), buf)?;
        Ok(())
    }

    /// Block ids present on disk, in stable (name) order.
    fn ids(&self) -> Result<Vec<BlockId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BLOCK_EXT)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl RawStore for FsStore {
    fn create(&mut self, meta: &BlockMeta) -> Result<BlockId> {
        let id = random_hex::<8>()?;
        self.save(
            &id,
            &StoredBlock {
                meta: meta.clone(),
                tokens: Vec::new(),
            },
        )?;
        Ok(id)
    }

    fn append_batch(&mut self, id: &BlockId, tokens: &[TokenId]) -> Result<()> {
        let mut block = self.load(id)?;
        if block.tokens.len() + tokens.len() > BLOCK_CAPACITY {
            return Err(ChainFsError::Remote(format!("block {id} is full")));
        }
        block.tokens.extend_from_slice(tokens);
        self.save(id, &block)
    }

    fn list_page(&mut self, id: &BlockId, cursor: Option<u64>) -> Result<Page> {
        let block = self.load(id)?;
        let start = cursor.unwrap_or(0) as usize;
        let end = (start + LIST_PAGE).min(block.tokens.len());
        Ok(Page {
            fingerprints: block.tokens[start..end].to_vec(),
            next: (end < block.tokens.len()).then_some(end as u64),
        })
    }

    fn delete(&mut self, id: &BlockId) -> Result<()> {
        fs::remove_file(self.path_for(id))
            .map_err(|_| ChainFsError::Remote(format!("no such block {id}")))
    }

    fn list_owned_page(&mut self, cursor: Option<u64>) -> Result<OwnedPage> {
        let ids = self.ids()?;
        let start = cursor.unwrap_or(0) as usize;
        let end = (start + LIST_PAGE).min(ids.len());
        let mut blocks = Vec::with_capacity(end - start);
        for id in &ids[start..end] {
            blocks.push((id.clone(), self.load(id)?.meta));
        }
        Ok(OwnedPage {
            blocks,
            next: (end < ids.len()).then_some(end as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str) -> BlockMeta {
        BlockMeta {
            title: title.to_string(),
            description: String::new(),
        }
    }

    fn tokens(n: usize) -> Vec<TokenId> {
        (0..n).map(|i| format!("tok-{i}")).collect()
    }

    #[test]
    fn blocks_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();

        let id = store.create(&meta("first")).unwrap();
        store.append_batch(&id, &tokens(3)).unwrap();

        let page = store.list_page(&id, None).unwrap();
        assert_eq!(page.fingerprints, tokens(3));
        assert!(page.next.is_none());

        let owned = store.list_owned_page(None).unwrap();
        assert_eq!(owned.blocks.len(), 1);
        assert_eq!(owned.blocks[0].0, id);
        assert_eq!(owned.blocks[0].1.title, "first");

        store.delete(&id).unwrap();
        assert!(store.list_page(&id, None).is_err());
    }

    #[test]
    fn listing_pages_by_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        let id = store.create(&meta("paged")).unwrap();
        store.append_batch(&id, &tokens(LIST_PAGE + 7)).unwrap();

        let first = store.list_page(&id, None).unwrap();
        assert_eq!(first.fingerprints.len(), LIST_PAGE);
        let rest = store.list_page(&id, first.next).unwrap();
        assert_eq!(rest.fingerprints.len(), 7);
        assert!(rest.next.is_none());
    }

    #[test]
    fn append_respects_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        let id = store.create(&meta("full")).unwrap();
        store.append_batch(&id, &tokens(BLOCK_CAPACITY)).unwrap();
        assert!(store.append_batch(&id, &tokens(1)).is_err());
    }

    #[test]
    fn delete_of_unknown_block_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        assert!(store.delete(&"missing".to_string()).is_err());
    }
}
