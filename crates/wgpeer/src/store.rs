// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! On-disk peer records: one directory per peer, one text file per field.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use wgpeer_types::Peer;

const NAME_FILE: &str = "name.txt";
const FULL_NAME_FILE: &str = "full_name.txt";
const PUBLIC_KEY_FILE: &str = "public_key.txt";
const ADDRESS_FILE: &str = "ip.txt";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to list {}: {source}", path.display())]
    List { path: PathBuf, source: io::Error },
}

fn read_field(dir: &Path, file: &str) -> Result<String, StoreError> {
    let path = dir.join(file);
    fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|source| StoreError::Read { path, source })
}

fn write_field(dir: &Path, file: &str, value: &str) -> Result<(), StoreError> {
    let path = dir.join(file);
    fs::write(&path, value).map_err(|source| StoreError::Write { path, source })
}

/// Read one peer from its directory. All four files must exist.
pub fn load(dir: &Path) -> Result<Peer, StoreError> {
    let peer = Peer {
        name: read_field(dir, NAME_FILE)?,
        full_name: read_field(dir, FULL_NAME_FILE)?,
        public_key: read_field(dir, PUBLIC_KEY_FILE)?,
        address: read_field(dir, ADDRESS_FILE)?,
    };
    debug!(path = %dir.display(), name = %peer.name, "loaded peer");
    Ok(peer)
}

/// Write all four files of `peer` into `dir`, creating it if needed.
pub fn save(peer: &Peer, dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|source| StoreError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    write_field(dir, NAME_FILE, &peer.name)?;
    write_field(dir, FULL_NAME_FILE, &peer.full_name)?;
    write_field(dir, PUBLIC_KEY_FILE, &peer.public_key)?;
    write_field(dir, ADDRESS_FILE, &peer.address)?;
    debug!(path = %dir.display(), name = %peer.name, "saved peer");
    Ok(())
}

/// Sorted list of immediate subdirectories of `root`. A missing root is empty.
fn peer_dirs(root: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let list_err = |source| StoreError::List {
        path: root.to_path_buf(),
        source,
    };

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %root.display(), "peer directory not found, no peers");
            return Ok(vec![]);
        }
        Err(e) => return Err(list_err(e)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(list_err)?;
        if entry.file_type().map_err(list_err)?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Load every peer under `root`, ordered by directory name.
pub fn load_all(root: &Path) -> Result<Vec<Peer>, StoreError> {
    let peers = peer_dirs(root)?
        .iter()
        .map(|dir| load(dir))
        .collect::<Result<Vec<_>, _>>()?;
    info!(path = %root.display(), peer_count = peers.len(), "loaded peers");
    Ok(peers)
}

/// Remove peer directories under `root` whose name is not in `keep`.
pub fn prune(root: &Path, keep: &[Peer]) -> Result<usize, StoreError> {
    let mut removed = 0;
    for dir in peer_dirs(root)? {
        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if keep.iter().any(|p| p.name == dir_name) {
            continue;
        }
        fs::remove_dir_all(&dir).map_err(|source| StoreError::Write {
            path: dir.clone(),
            source,
        })?;
        info!(path = %dir.display(), "removed stale peer directory");
        removed += 1;
    }
    Ok(removed)
}
