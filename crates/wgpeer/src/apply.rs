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

use tracing::{error, info, warn};

use crate::manager::{InterfaceManager, ManagerError, RestoreStatus};
use crate::service::ServiceControl;

/// How a mutating run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New configuration written and the service came back up.
    Applied,
    /// New configuration written; the service was stopped and left for the operator.
    ReloadSkipped,
    /// Service failed to start, the previous state was restored and started.
    RolledBack,
    /// Service failed to start, and failed again after restoring.
    RecoveryFailed,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Applied | Self::ReloadSkipped)
    }

    pub fn exit_code(self) -> u8 {
        match self {
            Self::Applied | Self::ReloadSkipped => 0,
            Self::RolledBack => 2,
            Self::RecoveryFailed => 3,
        }
    }
}

/// Push the in-memory state out to disk and bounce the service.
///
/// 1. Back up the peer tree and configuration file
/// 2. Write the new state
/// 3. Stop the service, then start it unless `reload` is off
/// 4. If the start fails, restore the backup and stop/start once more
#[tracing::instrument(skip_all, fields(interface = %manager.interface(), reload = reload))]
pub fn apply<S: ServiceControl>(
    manager: &InterfaceManager,
    service: &S,
    reload: bool,
) -> Result<Outcome, ManagerError> {
    manager.backup_all()?;
    info!("backup taken");

    if let Err(e) = manager.write_state() {
        error!(error = %e, "failed to write configuration, restoring backup");
        if let Err(restore_err) = manager.restore_all() {
            error!(error = %restore_err, "failed to restore backup");
        }
        return Err(e);
    }

    if !manager.stop_service(service) {
        warn!("service did not stop cleanly, continuing");
    }

    if !reload {
        info!("reloading disabled");
        return Ok(Outcome::ReloadSkipped);
    }

    info!("injecting configuration into wireguard");
    if manager.start_service(service) {
        info!("service started with new configuration");
        return Ok(Outcome::Applied);
    }

    error!("service failed to start with new configuration, rolling back");
    if manager.restore_all()? == RestoreStatus::NothingToRestore {
        warn!("no backup was available, retrying with the new configuration");
    }
    manager.stop_service(service);

    if manager.start_service(service) {
        warn!("backup restored and service started");
        Ok(Outcome::RolledBack)
    } else {
        error!("service failed to start after restoring backup");
        Ok(Outcome::RecoveryFailed)
    }
}
