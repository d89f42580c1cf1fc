use crate::error::{Result, RuntimeError};
use crate::oci::{self, Status};
use crate::proxy;
use log::debug;
use nix::sys::signal::Signal;

/// Signal a container's proxy process and mark the container stopped.
///
/// The call does not wait for the proxy to exit; the shim's process watcher
/// observes that separately.
pub fn kill(container_id: &str, signal: Option<&str>) -> Result<()> {
    let sig = parse_signal(signal.unwrap_or("TERM"))?;
    let mut state = oci::read_state(container_id, &[])?;

    if state.pid > 0 {
        match proxy::send_signal(state.pid, sig) {
            Ok(()) => {}
            // A proxy that already exited satisfies a stop request.
            Err(RuntimeError::IoPath { ref source, .. })
                if source.raw_os_error() == Some(libc::ESRCH) =>
            {
                debug!("proxy process {} already exited", state.pid);
            }
            Err(err) => return Err(err),
        }
    }

    state.status = Status::Stopped;
    oci::write_state(&state)
}

/// Parse a signal token: the supported names or their numbers.
pub fn parse_signal(token: &str) -> Result<Signal> {
    match token.to_uppercase().as_str() {
        "TERM" | "SIGTERM" | "15" => Ok(Signal::SIGTERM),
        "KILL" | "SIGKILL" | "9" => Ok(Signal::SIGKILL),
        "INT" | "SIGINT" | "2" => Ok(Signal::SIGINT),
        _ => Err(RuntimeError::UnsupportedSignal(token.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_signal_tokens() {
        for (token, want) in [
            ("TERM", Signal::SIGTERM),
            ("term", Signal::SIGTERM),
            ("SIGTERM", Signal::SIGTERM),
            ("15", Signal::SIGTERM),
            ("KILL", Signal::SIGKILL),
            ("9", Signal::SIGKILL),
            ("INT", Signal::SIGINT),
            ("2", Signal::SIGINT),
        ] {
            assert_eq!(parse_signal(token).unwrap(), want);
        }
    }

    #[test]
    fn rejects_signals_outside_the_supported_set() {
        for token in ["HUP", "USR1", "11", ""] {
            assert!(matches!(
                parse_signal(token).unwrap_err(),
                RuntimeError::UnsupportedSignal(_)
            ));
        }
    }
}
