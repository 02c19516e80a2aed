use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::constants::PARTIAL_SUFFIX;
use crate::core::geo::TileCoord;
use crate::{MapError, Result};

/// Tile files laid out as `<root>/<zoom>/<column>/<row>.<format>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStore {
    root: PathBuf,
    format: String,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            format: format.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn path_for(&self, coord: TileCoord) -> PathBuf {
        self.root
            .join(coord.z.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, self.format))
    }

    fn partial_path_for(&self, coord: TileCoord) -> PathBuf {
        let mut path = self.path_for(coord).into_os_string();
        path.push(".");
        path.push(PARTIAL_SUFFIX);
        PathBuf::from(path)
    }

    /// Writes the tile next to its final path and renames it into place, so a
    /// crash mid-write never leaves a truncated file under the real name.
    pub fn write(&self, coord: TileCoord, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(coord);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial = self.partial_path_for(coord);
        let written = File::create(&partial)
            .map_err(MapError::from)
            .and_then(|file| Self::write_counted(coord, file, bytes));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        if let Err(e) = fs::rename(&partial, &path) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        log::trace!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Writes `bytes` to `out`, failing with `IncompleteWrite` when the sink
    /// stops accepting data early
    fn write_counted(coord: TileCoord, mut out: impl Write, bytes: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match out.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        out.flush()?;
        if written < bytes.len() {
            return Err(MapError::IncompleteWrite {
                id: coord.id(),
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }

    pub fn read(&self, coord: TileCoord) -> Result<Vec<u8>> {
        match fs::read(self.path_for(coord)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(MapError::NotFound(coord.id())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, coord: TileCoord) -> bool {
        self.path_for(coord).is_file()
    }
}
