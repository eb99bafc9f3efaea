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

use std::process::{Command, ExitStatus};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{unit} {verb} exited with {status}")]
    Failed {
        unit: String,
        verb: &'static str,
        status: ExitStatus,
    },
}

/// Stops and starts the system service backing a WireGuard interface.
pub trait ServiceControl {
    fn stop(&self, interface: &str) -> Result<(), ServiceError>;
    fn start(&self, interface: &str) -> Result<(), ServiceError>;
}

/// Which service manager front-end to shell out to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceManager {
    /// `service wg-quick@<iface> <verb>`
    #[default]
    Service,
    /// `systemctl <verb> wg-quick@<iface>`
    Systemctl,
}

pub fn unit_name(interface: &str) -> String {
    format!("wg-quick@{interface}")
}

/// Runs the service manager as a child process and waits for it.
#[derive(Debug, Clone, Copy)]
pub struct CommandService {
    manager: ServiceManager,
}

impl CommandService {
    pub fn new(manager: ServiceManager) -> Self {
        Self { manager }
    }

    fn command(&self, verb: &'static str, unit: &str) -> Command {
        match self.manager {
            ServiceManager::Service => {
                let mut cmd = Command::new("service");
                cmd.args([unit, verb]);
                cmd
            }
            ServiceManager::Systemctl => {
                let mut cmd = Command::new("systemctl");
                cmd.args([verb, unit]);
                cmd
            }
        }
    }

    fn run(&self, verb: &'static str, interface: &str) -> Result<(), ServiceError> {
        let unit = unit_name(interface);
        let mut cmd = self.command(verb, &unit);
        debug!(command = ?cmd, "invoking service manager");

        let status = cmd.status().map_err(|source| ServiceError::Spawn {
            program: cmd.get_program().to_string_lossy().into_owned(),
            source,
        })?;

        if status.success() {
            info!(unit = %unit, verb, "service command succeeded");
            Ok(())
        } else {
            Err(ServiceError::Failed { unit, verb, status })
        }
    }
}

impl ServiceControl for CommandService {
    fn stop(&self, interface: &str) -> Result<(), ServiceError> {
        self.run("stop", interface)
    }

    fn start(&self, interface: &str) -> Result<(), ServiceError> {
        self.run("start", interface)
    }
}
