//! Configuration related structures

use crate::version;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

/// An OCI-compliant container runtime scheduling firmware onto Linux
/// remoteproc devices.
#[derive(Parser)]
#[command(
    name = "remoteproc-runtime",
    version = version::VERSION,
    long_version = version::long()
)]
pub struct Cli {
    /// The logging level of the application
    #[arg(
        long,
        global = true,
        default_value = "info",
        value_name = "LEVEL",
        env = "REMOTEPROC_LOG_LEVEL"
    )]
    pub log_level: LevelFilter,

    /// Accepted for Podman compatibility; co-processors are not
    /// cgroup-controlled, so the flag is ignored.
    #[arg(long, global = true, hide = true)]
    pub systemd_cgroup: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new container from an OCI bundle
    Create {
        /// Container ID, unique per host
        container_id: String,

        /// Path to the bundle directory (defaults to the current working
        /// directory)
        #[arg(long, default_value = ".")]
        bundle: PathBuf,

        /// File to write the proxy process PID to
        #[arg(long)]
        pid_file: Option<PathBuf>,
    },

    /// Start an existing container
    Start {
        /// Container ID
        container_id: String,
    },

    /// Send a signal to the container process
    Kill {
        /// Container ID
        container_id: String,

        /// Signal to deliver: TERM (default), KILL or INT, by name or number
        signal: Option<String>,
    },

    /// Delete a container
    Delete {
        /// Force delete a running container
        #[arg(short = 'f', long)]
        force: bool,

        /// Container ID
        container_id: String,
    },

    /// Print the state of a container as JSON
    State {
        /// Container ID
        container_id: String,
    },

    /// Proxy process standing in for a remote processor
    #[command(hide = true)]
    Proxy {
        /// Resolved sysfs directory of the device to manage
        #[arg(long)]
        device_path: PathBuf,
    },
}
