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

//! Interface state: templates, the peer collection, the rendered
//! configuration file and its single-generation backups.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use wgpeer_types::{Peer, PeerError};

use crate::service::ServiceControl;
use crate::store::{self, StoreError};

pub const HEAD_TEMPLATE_FILE: &str = "wg_head_template.txt";
pub const PEER_TEMPLATE_FILE: &str = "wg_user_template.txt";
pub const ADDRESS_PLACEHOLDER: &str = "<IP>";
pub const PUBLIC_KEY_PLACEHOLDER: &str = "<PublicKey>";

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("template not found: {}", path.display())]
    TemplateMissing { path: PathBuf },

    #[error("failed to read template {}: {source}", path.display())]
    TemplateRead { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("peer already exists: {0}")]
    DuplicatePeer(String),

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

fn io_err(op: &'static str, path: &Path) -> impl FnOnce(io::Error) -> ManagerError {
    let path = path.to_path_buf();
    move |source| ManagerError::Io { op, path, source }
}

/// Result of a restore that may have had no backup to work from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    Restored,
    NothingToRestore,
}

/// Every location derived from a system path and an interface name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfacePaths {
    pub syspath: PathBuf,
    pub interface: String,
    pub interface_dir: PathBuf,
    pub peer_dir: PathBuf,
    pub peer_backup_dir: PathBuf,
    pub config_path: PathBuf,
    pub config_backup_path: PathBuf,
}

impl InterfacePaths {
    pub fn new(syspath: impl Into<PathBuf>, interface: impl Into<String>) -> Self {
        let syspath = syspath.into();
        let interface = interface.into();
        let interface_dir = syspath.join(&interface);
        Self {
            peer_dir: interface_dir.join("users"),
            peer_backup_dir: interface_dir.join("users.bkp"),
            config_path: syspath.join(format!("{interface}.conf")),
            config_backup_path: syspath.join(format!("{interface}.conf.bkp")),
            interface_dir,
            syspath,
            interface,
        }
    }

    /// Read both templates and every stored peer.
    pub fn load_state(self) -> Result<InterfaceManager, ManagerError> {
        info!(path = %self.interface_dir.display(), "reading interface state");
        let head_template = read_template(&self.interface_dir.join(HEAD_TEMPLATE_FILE))?;
        let peer_template = read_template(&self.interface_dir.join(PEER_TEMPLATE_FILE))?;
        let peers = store::load_all(&self.peer_dir)?;
        Ok(InterfaceManager {
            paths: self,
            head_template,
            peer_template,
            peers,
        })
    }
}

fn read_template(path: &Path) -> Result<String, ManagerError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            debug!(path = %path.display(), "read template");
            Ok(contents)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ManagerError::TemplateMissing {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(ManagerError::TemplateRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loaded interface state. Only obtainable through [`InterfacePaths::load_state`].
#[derive(Debug)]
pub struct InterfaceManager {
    paths: InterfacePaths,
    head_template: String,
    peer_template: String,
    peers: Vec<Peer>,
}

impl InterfaceManager {
    pub fn interface(&self) -> &str {
        &self.paths.interface
    }

    pub fn list_peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Append a peer. Names must be path-safe and unique.
    pub fn add_peer(&mut self, peer: Peer) -> Result<(), ManagerError> {
        peer.validate()?;
        if self.peers.iter().any(|p| p.name == peer.name) {
            warn!(name = %peer.name, "peer name already in use");
            return Err(ManagerError::DuplicatePeer(peer.name));
        }
        info!(name = %peer.name, address = %peer.address, "adding peer");
        self.peers.push(peer);
        Ok(())
    }

    /// Remove every peer called `name` and hand them back.
    pub fn delete_peer(&mut self, name: &str) -> Vec<Peer> {
        let (removed, kept): (Vec<Peer>, Vec<Peer>) = std::mem::take(&mut self.peers)
            .into_iter()
            .partition(|p| p.name == name);
        self.peers = kept;

        if removed.is_empty() {
            warn!(name, "no peer with that name");
        } else {
            info!(name, count = removed.len(), "deleted peer");
        }
        removed
    }

    /// Head template, a blank line, then one substituted block per peer.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.head_template.len() + 1 + self.peers.len() * (self.peer_template.len() + 1),
        );
        out.push_str(&self.head_template);
        out.push('\n');
        for peer in &self.peers {
            let block = self
                .peer_template
                .replace(ADDRESS_PLACEHOLDER, &peer.address)
                .replace(PUBLIC_KEY_PLACEHOLDER, &peer.public_key);
            out.push_str(&block);
            out.push('\n');
        }
        out
    }

    /// Persist every peer and overwrite the rendered configuration.
    pub fn write_state(&self) -> Result<(), ManagerError> {
        let peer_dir = &self.paths.peer_dir;
        fs::create_dir_all(peer_dir).map_err(io_err("create", peer_dir))?;

        for peer in &self.peers {
            peer.validate()?;
            store::save(peer, &peer_dir.join(&peer.name))?;
        }
        store::prune(peer_dir, &self.peers)?;

        write_replace(&self.paths.config_path, self.render().as_bytes())?;
        info!(
            path = %self.paths.config_path.display(),
            peer_count = self.peers.len(),
            "configuration written"
        );
        Ok(())
    }

    pub fn backup_peers(&self) -> Result<(), ManagerError> {
        let live = &self.paths.peer_dir;
        let backup = &self.paths.peer_backup_dir;

        if !live.exists() {
            // A backup older than the missing live tree would resurrect stale peers.
            remove_dir_if_exists(backup)?;
            debug!(path = %live.display(), "no peer directory to back up");
            return Ok(());
        }

        let staging = with_suffix(backup, ".tmp");
        remove_dir_if_exists(&staging)?;
        copy_dir(live, &staging)?;
        remove_dir_if_exists(backup)?;
        fs::rename(&staging, backup).map_err(io_err("rename", &staging))?;
        info!(path = %backup.display(), "peer directory backed up");
        Ok(())
    }

    pub fn restore_peers(&self) -> Result<RestoreStatus, ManagerError> {
        let live = &self.paths.peer_dir;
        let backup = &self.paths.peer_backup_dir;

        if !backup.exists() {
            info!("nothing to restore in peer directory");
            return Ok(RestoreStatus::NothingToRestore);
        }

        let old = with_suffix(live, ".old");
        remove_dir_if_exists(&old)?;
        if live.exists() {
            fs::rename(live, &old).map_err(io_err("rename", live))?;
        }
        fs::rename(backup, live).map_err(io_err("rename", backup))?;
        remove_dir_if_exists(&old)?;
        info!(path = %live.display(), "peer directory restored from backup");
        Ok(RestoreStatus::Restored)
    }

    pub fn backup_config(&self) -> Result<(), ManagerError> {
        let live = &self.paths.config_path;
        let backup = &self.paths.config_backup_path;

        if !live.exists() {
            remove_file_if_exists(backup)?;
            debug!(path = %live.display(), "no configuration file to back up");
            return Ok(());
        }

        let staging = with_suffix(backup, ".tmp");
        fs::copy(live, &staging).map_err(io_err("copy", live))?;
        fs::rename(&staging, backup).map_err(io_err("rename", &staging))?;
        info!(path = %backup.display(), "configuration backed up");
        Ok(())
    }

    pub fn restore_config(&self) -> Result<RestoreStatus, ManagerError> {
        let live = &self.paths.config_path;
        let backup = &self.paths.config_backup_path;

        if !backup.exists() {
            info!("nothing to restore in wireguard configuration");
            return Ok(RestoreStatus::NothingToRestore);
        }

        fs::rename(backup, live).map_err(io_err("rename", backup))?;
        info!(path = %live.display(), "configuration restored from backup");
        Ok(RestoreStatus::Restored)
    }

    pub fn backup_all(&self) -> Result<(), ManagerError> {
        self.backup_peers()?;
        self.backup_config()
    }

    /// Restore both backups. Reports `Restored` if either side had one.
    pub fn restore_all(&self) -> Result<RestoreStatus, ManagerError> {
        let peers = self.restore_peers()?;
        let config = self.restore_config()?;
        if peers == RestoreStatus::Restored || config == RestoreStatus::Restored {
            Ok(RestoreStatus::Restored)
        } else {
            Ok(RestoreStatus::NothingToRestore)
        }
    }

    pub fn stop_service<S: ServiceControl>(&self, service: &S) -> bool {
        match service.stop(self.interface()) {
            Ok(()) => true,
            Err(e) => {
                warn!(interface = %self.interface(), error = %e, "failed to stop service");
                false
            }
        }
    }

    pub fn start_service<S: ServiceControl>(&self, service: &S) -> bool {
        match service.start(self.interface()) {
            Ok(()) => true,
            Err(e) => {
                warn!(interface = %self.interface(), error = %e, "failed to start service");
                false
            }
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_dir_if_exists(path: &Path) -> Result<(), ManagerError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err("remove", path)(e)),
    }
}

fn remove_file_if_exists(path: &Path) -> Result<(), ManagerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err("remove", path)(e)),
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), ManagerError> {
    fs::create_dir_all(to).map_err(io_err("create", to))?;
    for entry in fs::read_dir(from).map_err(io_err("list", from))? {
        let entry = entry.map_err(io_err("list", from))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if entry.file_type().map_err(io_err("stat", &src))?.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            fs::copy(&src, &dst).map_err(io_err("copy", &src))?;
        }
    }
    Ok(())
}

/// Write to a sibling temp file, then rename it over `path`.
fn write_replace(path: &Path, contents: &[u8]) -> Result<(), ManagerError> {
    let staging = with_suffix(path, ".tmp");
    fs::write(&staging, contents).map_err(io_err("write", &staging))?;
    fs::rename(&staging, path).map_err(io_err("rename", &staging))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const HEAD: &str = "[Interface]\nAddress = 10.0.0.1/24\nPrivateKey = SERVER\n";
    const BLOCK: &str = "[Peer]\nPublicKey = <PublicKey>\nAllowedIPs = <IP>\n";

    fn fixture(root: &Path) -> InterfacePaths {
        let paths = InterfacePaths::new(root, "wg0");
        fs::create_dir_all(&paths.interface_dir).unwrap();
        fs::write(paths.interface_dir.join(HEAD_TEMPLATE_FILE), HEAD).unwrap();
        fs::write(paths.interface_dir.join(PEER_TEMPLATE_FILE), BLOCK).unwrap();
        paths
    }

    fn alice() -> Peer {
        Peer::new("alice", "Alice A", "10.0.0.2/32", "ABCD")
    }

    fn bob() -> Peer {
        Peer::new("bob", "Bob B", "10.0.0.3/32", "EFGH")
    }

    #[test]
    fn derives_paths() {
        let paths = InterfacePaths::new("/etc/wireguard", "wg0");
        assert_eq!(paths.interface_dir, Path::new("/etc/wireguard/wg0"));
        assert_eq!(paths.peer_dir, Path::new("/etc/wireguard/wg0/users"));
        assert_eq!(paths.peer_backup_dir, Path::new("/etc/wireguard/wg0/users.bkp"));
        assert_eq!(paths.config_path, Path::new("/etc/wireguard/wg0.conf"));
        assert_eq!(paths.config_backup_path, Path::new("/etc/wireguard/wg0.conf.bkp"));
    }

    #[test_case(HEAD_TEMPLATE_FILE; "head template")]
    #[test_case(PEER_TEMPLATE_FILE; "peer template")]
    fn load_state_requires_templates(missing: &str) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = fixture(tmp.path());
        fs::remove_file(paths.interface_dir.join(missing)).unwrap();

        match paths.load_state() {
            Err(ManagerError::TemplateMissing { path }) => assert!(path.ends_with(missing)),
            other => panic!("expected TemplateMissing, got {other:?}"),
        }
    }

    #[test]
    fn load_state_with_no_peers() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = fixture(tmp.path()).load_state().unwrap();
        assert!(mgr.list_peers().is_empty());
    }

    #[test]
    fn add_peer_rejects_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = fixture(tmp.path()).load_state().unwrap();
        mgr.add_peer(alice()).unwrap();

        let err = mgr.add_peer(alice()).unwrap_err();
        assert!(matches!(err, ManagerError::DuplicatePeer(ref n) if n == "alice"));
        assert_eq!(mgr.list_peers().len(), 1);
    }

    #[test_case(""; "empty")]
    #[test_case("../escape"; "traversal")]
    fn add_peer_rejects_unsafe_names(name: &str) {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = fixture(tmp.path()).load_state().unwrap();
        let peer = Peer::new(name, "X", "10.0.0.9/32", "KEY");
        assert!(matches!(mgr.add_peer(peer), Err(ManagerError::Peer(_))));
        assert!(mgr.list_peers().is_empty());
    }

    #[test]
    fn delete_peer_returns_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = fixture(tmp.path()).load_state().unwrap();
        mgr.add_peer(alice()).unwrap();
        mgr.add_peer(bob()).unwrap();

        assert_eq!(mgr.delete_peer("alice"), vec![alice()]);
        assert_eq!(mgr.list_peers(), &[bob()]);
    }

    #[test]
    fn delete_unknown_peer_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = fixture(tmp.path()).load_state().unwrap();
        mgr.add_peer(alice()).unwrap();

        let before = mgr.list_peers().len();
        assert!(mgr.delete_peer("mallory").is_empty());
        assert_eq!(mgr.list_peers().len(), before);
    }

    #[test]
    fn render_empty_collection_is_head_and_blank_line() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = fixture(tmp.path()).load_state().unwrap();
        assert_eq!(mgr.render(), format!("{HEAD}\n"));
    }

    #[test]
    fn render_substitutes_placeholders_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = fixture(tmp.path()).load_state().unwrap();
        mgr.add_peer(bob()).unwrap();
        mgr.add_peer(alice()).unwrap();

        let expected = format!(
            "{HEAD}\n\
             [Peer]\nPublicKey = EFGH\nAllowedIPs = 10.0.0.3/32\n\n\
             [Peer]\nPublicKey = ABCD\nAllowedIPs = 10.0.0.2/32\n\n"
        );
        let rendered = mgr.render();
        assert_eq!(rendered, expected);
        assert_eq!(rendered.matches("[Interface]").count(), 1);
        assert_eq!(rendered.matches("[Peer]").count(), 2);
        assert!(!rendered.contains(ADDRESS_PLACEHOLDER));
        assert!(!rendered.contains(PUBLIC_KEY_PLACEHOLDER));
    }

    #[test]
    fn write_state_prunes_deleted_peers() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = fixture(tmp.path());
        let mut mgr = paths.clone().load_state().unwrap();
        mgr.add_peer(alice()).unwrap();
        mgr.add_peer(bob()).unwrap();
        mgr.write_state().unwrap();

        let mut mgr = paths.clone().load_state().unwrap();
        mgr.delete_peer("alice");
        mgr.write_state().unwrap();

        assert!(!paths.peer_dir.join("alice").exists());
        let reloaded = paths.load_state().unwrap();
        assert_eq!(reloaded.list_peers(), &[bob()]);
    }

    #[test]
    fn write_state_leaves_no_staging_file() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = fixture(tmp.path());
        let mgr = paths.clone().load_state().unwrap();
        mgr.write_state().unwrap();

        assert!(paths.config_path.exists());
        assert!(!with_suffix(&paths.config_path, ".tmp").exists());
    }

    #[test]
    fn backup_without_live_state_discards_stale_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = fixture(tmp.path());
        fs::create_dir_all(paths.peer_backup_dir.join("ghost")).unwrap();
        fs::write(&paths.config_backup_path, "stale").unwrap();

        let mgr = paths.clone().load_state().unwrap();
        mgr.backup_all().unwrap();

        assert!(!paths.peer_backup_dir.exists());
        assert!(!paths.config_backup_path.exists());
    }

    #[test]
    fn backup_replaces_previous_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = fixture(tmp.path());
        let mut mgr = paths.clone().load_state().unwrap();
        mgr.add_peer(alice()).unwrap();
        mgr.write_state().unwrap();
        mgr.backup_all().unwrap();

        mgr.delete_peer("alice");
        mgr.add_peer(bob()).unwrap();
        mgr.write_state().unwrap();
        mgr.backup_all().unwrap();

        assert!(!paths.peer_backup_dir.join("alice").exists());
        assert!(paths.peer_backup_dir.join("bob").join("name.txt").exists());
        assert_eq!(
            fs::read(&paths.config_backup_path).unwrap(),
            fs::read(&paths.config_path).unwrap()
        );
    }

    #[test]
    fn restore_consumes_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = fixture(tmp.path());
        let mut mgr = paths.clone().load_state().unwrap();
        mgr.add_peer(alice()).unwrap();
        mgr.write_state().unwrap();
        mgr.backup_all().unwrap();

        assert_eq!(mgr.restore_all().unwrap(), RestoreStatus::Restored);
        assert!(!paths.peer_backup_dir.exists());
        assert!(!paths.config_backup_path.exists());
        assert!(!with_suffix(&paths.peer_dir, ".old").exists());
        assert_eq!(mgr.restore_all().unwrap(), RestoreStatus::NothingToRestore);
    }
}
