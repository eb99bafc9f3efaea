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

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use wgpeer_types::{Peer, PeerError, validate_address, validate_name};

use crate::config::{DEFAULT_CONFIG_PATH, WgpeerToml};
use crate::service::ServiceManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Action {
    /// Print every peer
    List,
    /// Snapshot the peer directory and configuration file
    MakeBackup,
    /// Put the last snapshot back in place
    RestoreBackup,
    /// Add a peer and reload the interface
    AddUser,
    /// Remove a peer and reload the interface
    DelUser,
}

#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("WGPEER_VERSION"))]
#[command(about = "Manage WireGuard peers rendered from templates")]
pub struct Args {
    /// Action to perform
    #[arg(value_enum)]
    pub action: Action,

    /// Peer name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Full peer name
    #[arg(short, long)]
    pub fullname: Option<String>,

    /// Peer's tunnel IP
    #[arg(short, long)]
    pub ip: Option<String>,

    /// Peer's public key
    #[arg(short, long)]
    pub key: Option<String>,

    /// System path to WireGuard configuration
    #[arg(short = 'S', long)]
    pub syspath: Option<PathBuf>,

    /// WireGuard interface
    #[arg(short = 'W', long)]
    pub wg_interface: Option<String>,

    /// Restart the interface after writing
    #[arg(long, overrides_with = "no_reload")]
    pub reload: bool,

    /// Write the configuration without restarting the interface
    #[arg(long, overrides_with = "reload")]
    pub no_reload: bool,

    /// Service manager used to stop and start the interface
    #[arg(long, value_enum)]
    pub service_manager: Option<ServiceManager>,

    /// Print the peer list as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to the defaults file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("add_user action requires name, full name, ip and key")]
    AddUserArgs,

    #[error("del_user action requires only name")]
    DelUserArgs,

    #[error("--json only applies to the list action")]
    JsonWithoutList,

    #[error(transparent)]
    Peer(#[from] PeerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List { json: bool },
    MakeBackup,
    RestoreBackup,
    AddUser(Peer),
    DelUser { name: String },
}

/// Everything one run needs, after merging flags over file defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub request: Request,
    pub syspath: PathBuf,
    pub interface: String,
    pub reload: bool,
    pub service_manager: ServiceManager,
}

/// Exit status for a failed parse. `--help` and `--version` are not failures.
pub fn parse_failure_code(err: &clap::Error) -> u8 {
    if err.use_stderr() { 1 } else { 0 }
}

impl Args {
    pub fn resolve(self, defaults: WgpeerToml) -> Result<Invocation, UsageError> {
        if self.json && self.action != Action::List {
            return Err(UsageError::JsonWithoutList);
        }

        let request = match self.action {
            Action::List => Request::List { json: self.json },
            Action::MakeBackup => Request::MakeBackup,
            Action::RestoreBackup => Request::RestoreBackup,
            Action::AddUser => {
                let (Some(name), Some(full_name), Some(address), Some(public_key)) =
                    (self.name, self.fullname, self.ip, self.key)
                else {
                    return Err(UsageError::AddUserArgs);
                };
                validate_name(&name)?;
                validate_address(&address)?;
                Request::AddUser(Peer::new(name, full_name, address, public_key))
            }
            Action::DelUser => match (self.name, &self.fullname, &self.ip, &self.key) {
                (Some(name), None, None, None) => Request::DelUser { name },
                _ => return Err(UsageError::DelUserArgs),
            },
        };

        let reload = if self.no_reload {
            false
        } else if self.reload {
            true
        } else {
            defaults.reload
        };

        Ok(Invocation {
            request,
            syspath: self.syspath.unwrap_or(defaults.syspath),
            interface: self.wg_interface.unwrap_or(defaults.interface),
            reload,
            service_manager: self.service_manager.unwrap_or(defaults.service_manager),
        })
    }
}
