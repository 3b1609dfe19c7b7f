pub mod config;
pub mod error;
pub mod git;
pub mod guard;
pub mod interrupt;
pub mod lfs;
pub mod lock;
pub mod marker;
pub mod reconcile;
pub mod snapshot;
pub mod types;

use clap::Parser;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

use crate::config::{CheckoutArgs, CheckoutConfig, Cli, Commands};
use crate::error::{Outcome, ReconcileError};
use crate::git::GitCli;
use crate::reconcile::WorkdirState;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = interrupt::install() {
        log::warn!("Failed to install signal handler: {}", e);
    }

    let code = match cli.command {
        Commands::Checkout(args) => cmd_checkout(args),
        Commands::Doctor { dir, git_path } => cmd_doctor(dir.as_deref(), &git_path),
    };

    std::process::exit(code);
}

fn cmd_checkout(args: CheckoutArgs) -> i32 {
    let config = match CheckoutConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            let err = ReconcileError::from(e);
            eprintln!("Error: {}", err);
            return err.exit_code();
        }
    };

    let outcome = reconcile::run(&config);
    match &outcome {
        Outcome::CheckedOut { commit } => println!("{}", commit),
        Outcome::StaleReference { commit } => {
            eprintln!("Error: commit {} is gone from the remote", commit);
            eprintln!();
            eprintln!(
                "Hint: the branch was probably force-pushed; re-resolve {} instead of retrying",
                config.revision.branch()
            );
        }
        other => eprintln!("Error: {}", other),
    }
    outcome.exit_code()
}

fn tool_available(program: &OsStr, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn cmd_doctor(dir: Option<&Path>, git_path: &OsStr) -> i32 {
    println!("reposync System Check\n");

    let git_ok = tool_available(git_path, &["--version"]);
    println!(
        "[{}] git: {}",
        if git_ok { "OK" } else { "FAIL" },
        if git_ok { "available" } else { "not found" }
    );

    let lfs_ok = git_ok && tool_available(git_path, &["lfs", "version"]);
    println!(
        "[{}] git-lfs: {}",
        if lfs_ok { "OK" } else { "INFO" },
        if lfs_ok {
            "available"
        } else {
            "not found (needed only with --lfs)"
        }
    );

    let marker_dir = config::default_marker_dir();
    println!(
        "[{}] Marker dir: {}",
        if marker_dir.exists() { "OK" } else { "INFO" },
        marker_dir.display()
    );

    if let Some(dir) = dir {
        let state = WorkdirState::inspect(&GitCli::new(dir).with_git_path(git_path));
        println!(
            "[{}] Working dir: {} ({})",
            if state.is_reusable() { "OK" } else { "INFO" },
            dir.display(),
            state
        );

        let lock_path = lock::WorkdirLock::lock_path(dir);
        let busy =
            lock_path.exists() && matches!(lock::WorkdirLock::try_acquire(dir), Ok(None));
        println!(
            "[{}] Lock: {}",
            if busy { "INFO" } else { "OK" },
            if busy {
                format!("held by another invocation ({})", lock_path.display())
            } else {
                "free".to_string()
            }
        );
    }

    if git_ok { 0 } else { 1 }
}
