use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use wgpeer::apply::{self, Outcome};
use wgpeer::cli::{Args, Invocation, Request, parse_failure_code};
use wgpeer::config;
use wgpeer::manager::{InterfacePaths, RestoreStatus};
use wgpeer::service::CommandService;
use wgpeer_types::Peer;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(distribute)]
    {
        fmt().json().with_writer(std::io::stderr).with_env_filter(filter).init();
    }

    #[cfg(not(distribute))]
    {
        fmt().compact().with_writer(std::io::stderr).with_env_filter(filter).init();
    }
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

fn print_peers(peers: &[Peer], json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(peers)?);
    } else {
        for peer in peers {
            println!("{peer}");
        }
    }
    Ok(())
}

fn run(invocation: Invocation) -> Result<u8, Box<dyn std::error::Error>> {
    info!(
        syspath = %invocation.syspath.display(),
        interface = %invocation.interface,
        "starting wgpeer"
    );

    let mut manager = InterfacePaths::new(invocation.syspath, invocation.interface).load_state()?;

    match invocation.request {
        Request::List { json } => {
            print_peers(manager.list_peers(), json)?;
            return Ok(0);
        }
        Request::MakeBackup => {
            manager.backup_all()?;
            println!("Backup taken");
            return Ok(0);
        }
        Request::RestoreBackup => {
            match manager.restore_all()? {
                RestoreStatus::Restored => println!("Backup restored"),
                RestoreStatus::NothingToRestore => println!("Nothing to restore"),
            }
            return Ok(0);
        }
        Request::AddUser(peer) => {
            println!("Add user:");
            println!("{peer}");
            manager.add_peer(peer)?;
        }
        Request::DelUser { name } => {
            println!("Delete user:");
            for peer in manager.delete_peer(&name) {
                println!("{peer}");
            }
        }
    }

    let service = CommandService::new(invocation.service_manager);
    let outcome = apply::apply(&manager, &service, invocation.reload)?;
    if outcome.is_success() {
        println!("OK");
    } else if outcome == Outcome::RolledBack {
        println!("Failed, backup restored");
    } else {
        println!("Failed, backup restored, but the service is still down");
    }
    Ok(outcome.exit_code())
}

fn main() -> ExitCode {
    init_tracing();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_failure_code(&e));
        }
    };

    if !running_as_root() {
        eprintln!("Please run wgpeer as root (sudo)");
        return ExitCode::FAILURE;
    }

    let defaults = match config::load(&args.config) {
        Ok(defaults) => defaults,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let invocation = match args.resolve(defaults) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(invocation) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "aborting");
            ExitCode::FAILURE
        }
    }
}
