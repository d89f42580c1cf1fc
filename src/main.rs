use clap::Parser;
use log::debug;
use remoteproc_runtime::config::{Cli, Command};
use remoteproc_runtime::{error, proxy, runtime};
use std::process;

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .init();
    if cli.systemd_cgroup {
        debug!("ignoring --systemd-cgroup, co-processors are not cgroup-controlled");
    }

    match run(cli.command) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{}", error::chain(err));
            process::exit(1);
        }
    }
}

fn run(command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Create {
            container_id,
            bundle,
            pid_file,
        } => runtime::create(&container_id, &bundle, pid_file.as_deref())?,
        Command::Start { container_id } => runtime::start(&container_id)?,
        Command::Kill {
            container_id,
            signal,
        } => runtime::kill(&container_id, signal.as_deref())?,
        Command::Delete {
            force,
            container_id,
        } => runtime::delete(&container_id, force)?,
        Command::State { container_id } => {
            let state = runtime::state(&container_id)?;
            println!("{}", serde_json::to_string(&state)?);
        }
        Command::Proxy { device_path } => return Ok(proxy::run(&device_path)?),
    }
    Ok(0)
}
