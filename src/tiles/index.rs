use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fxhash::FxHashMap;
use walkdir::WalkDir;

use crate::core::geo::{TileCoord, TileId};
use crate::Result;

/// Walks a `<zoom>/<column>/<row>.<format>` tree and yields every tile file
/// with its size. Unreadable entries, partial writes and files that do not
/// parse as tile addresses are skipped.
pub fn scan_tiles(root: &Path, format: &str) -> impl Iterator<Item = (TileCoord, u64)> {
    let format = format.to_string();
    WalkDir::new(root)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(move |entry| {
            let coord = parse_tile_path(entry.path(), &format)?;
            let size = entry.metadata().ok()?.len();
            Some((coord, size))
        })
}

fn parse_tile_path(path: &Path, format: &str) -> Option<TileCoord> {
    if path.extension()?.to_str()? != format {
        return None;
    }
    let y: u32 = path.file_stem()?.to_str()?.parse().ok()?;
    let column_dir = path.parent()?;
    let x: u32 = column_dir.file_name()?.to_str()?.parse().ok()?;
    let z: u8 = column_dir.parent()?.file_name()?.to_str()?.parse().ok()?;

    let coord = TileCoord::new(z, x, y);
    coord.is_valid().then_some(coord)
}

/// Tiles known to be present on disk, with the bytes each one occupies
#[derive(Debug, Clone)]
pub struct CacheIndex {
    root: PathBuf,
    tiles: FxHashMap<TileId, u64>,
    total_bytes: u64,
}

impl CacheIndex {
    /// An empty index for tiles stored under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tiles: FxHashMap::default(),
            total_bytes: 0,
        }
    }

    /// Builds the index from whatever is already on disk. A missing root just
    /// means an empty cache.
    pub fn init_from_disk(root: impl Into<PathBuf>, format: &str) -> Self {
        let mut index = Self::new(root);
        if !index.root.is_dir() {
            log::debug!("cache root {} not present; starting empty", index.root.display());
            return index;
        }

        for (coord, size) in scan_tiles(&index.root, format) {
            index.insert(coord.id(), size);
        }
        log::info!(
            "cache {}: {} tiles, {:.2} MB",
            index.root.display(),
            index.len(),
            index.total_bytes as f64 / 1024.0 / 1024.0
        );
        index
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains_key(&id)
    }

    /// Records a tile of `bytes` size. Re-inserting replaces the old size.
    pub fn insert(&mut self, id: TileId, bytes: u64) {
        if let Some(previous) = self.tiles.insert(id, bytes) {
            self.total_bytes -= previous;
        }
        self.total_bytes += bytes;
    }

    /// Forgets a tile whose file disappeared
    pub fn remove(&mut self, id: TileId) -> bool {
        match self.tiles.remove(&id) {
            Some(bytes) => {
                self.total_bytes -= bytes;
                true
            }
            None => false,
        }
    }

    /// Deletes the cache tree from disk and empties the index
    pub fn clear(&mut self) -> Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        log::info!(
            "cleared cache {} ({} tiles)",
            self.root.display(),
            self.tiles.len()
        );
        self.tiles.clear();
        self.total_bytes = 0;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::store::DiskStore;

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = CacheIndex::init_from_disk(dir.path().join("nope"), "png");
        assert!(index.is_empty());
        assert_eq!(index.total_bytes(), 0);
    }

    #[test]
    fn test_scan_counts_tiles_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "png");
        store.write(TileCoord::new(0, 0, 0), &[0u8; 10]).unwrap();
        store.write(TileCoord::new(7, 72, 35), &[0u8; 25]).unwrap();
        store.write(TileCoord::new(7, 73, 35), &[0u8; 5]).unwrap();

        let index = CacheIndex::init_from_disk(dir.path(), "png");
        assert_eq!(index.len(), 3);
        assert_eq!(index.total_bytes(), 40);
        assert!(index.contains(TileCoord::new(7, 72, 35).id()));
        assert!(!index.contains(TileCoord::new(7, 72, 36).id()));
    }

    #[test]
    fn test_scan_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("3/1")).unwrap();
        std::fs::write(root.join("3/1/2.png"), b"ok").unwrap();
        std::fs::write(root.join("3/1/4.png.tmp"), b"partial").unwrap();
        std::fs::write(root.join("3/1/5.jpg"), b"other format").unwrap();
        std::fs::write(root.join("3/1/notes.png"), b"not a row").unwrap();
        std::fs::write(root.join("3/1/9.png"), b"row out of range").unwrap();
        std::fs::write(root.join("stray.png"), b"wrong depth").unwrap();
        std::fs::create_dir_all(root.join("x/1")).unwrap();
        std::fs::write(root.join("x/1/1.png"), b"bad zoom").unwrap();

        let found: Vec<_> = scan_tiles(root, "png").collect();
        assert_eq!(found, vec![(TileCoord::new(3, 1, 2), 2)]);
    }

    #[test]
    fn test_insert_and_remove_track_bytes() {
        let mut index = CacheIndex::new("/unused");
        let id = TileCoord::new(1, 1, 1).id();
        index.insert(id, 100);
        index.insert(id, 60);
        assert_eq!(index.len(), 1);
        assert_eq!(index.total_bytes(), 60);
        assert!(index.remove(id));
        assert!(!index.remove(id));
        assert_eq!(index.total_bytes(), 0);
    }

    #[test]
    fn test_clear_deletes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("osm");
        let store = DiskStore::new(&root, "png");
        store.write(TileCoord::new(2, 1, 1), b"bytes").unwrap();

        let mut index = CacheIndex::init_from_disk(&root, "png");
        assert_eq!(index.len(), 1);
        index.clear().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.total_bytes(), 0);
        assert!(!root.exists());

        // Clearing an already missing tree is fine
        index.clear().unwrap();
    }
}
