//! Integration tests against a fake sysfs tree: error paths through the
//! library surface, and the full container lifecycle driving the compiled
//! binary as a subprocess with a simulator thread standing in for the
//! kernel driver. The root prefix and the state directory are redirected
//! into a per-process sandbox before anything touches the lazily
//! initialized prefix.

use anyhow::{bail, ensure, Context, Result};
use lazy_static::lazy_static;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use remoteproc_runtime::oci::{self, annotations, ContainerState, Status};
use remoteproc_runtime::{remoteproc, rootpath, runtime, userdirs, RuntimeError};
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

#[ctor::ctor]
fn sandbox_filesystem_roots() {
    let root = std::env::temp_dir().join(format!("remoteproc-it-{}", std::process::id()));
    fs::create_dir_all(root.join("sys/class/remoteproc")).expect("create fake sysfs");
    fs::create_dir_all(root.join("run")).expect("create fake runtime dir");
    std::env::set_var(rootpath::ROOT_ENV, &root);
    std::env::set_var("XDG_RUNTIME_DIR", root.join("run"));
}

lazy_static! {
    // The fake device class directory is shared by every test in this
    // binary; device-creating tests take this lock and clean up after
    // themselves so discovery results stay exact.
    static ref SYSFS: Mutex<()> = Mutex::new(());
}

fn sysfs_lock() -> MutexGuard<'static, ()> {
    SYSFS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A device directory in the fake sysfs tree, removed on drop.
struct FakeDevice {
    dir: PathBuf,
}

impl FakeDevice {
    fn new(index: u32, name: &str) -> Result<Self> {
        let dir = rootpath::remoteproc_class_dir().join(format!("remoteproc{index}"));
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("name"), format!("{name}\n"))?;
        fs::write(dir.join("state"), "offline\n")?;
        Ok(Self { dir })
    }

    fn state(&self) -> Result<String> {
        Ok(fs::read_to_string(self.dir.join("state"))?.trim().to_owned())
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Reacts to the kernel verbs like a real remoteproc driver: a `start`
/// written into the `state` attribute becomes `running`, a `stop` becomes
/// `offline`.
struct DeviceSimulator {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DeviceSimulator {
    fn start(device_dir: PathBuf) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            let state_file = device_dir.join("state");
            while !flag.load(Ordering::Relaxed) {
                if let Ok(raw) = fs::read_to_string(&state_file) {
                    match raw.trim() {
                        "start" => {
                            let _ = fs::write(&state_file, "running\n");
                        }
                        "stop" => {
                            let _ = fs::write(&state_file, "offline\n");
                        }
                        _ => {}
                    }
                }
                thread::sleep(Duration::from_millis(5));
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for DeviceSimulator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Run the compiled runtime binary, failing the test on a non-zero exit
/// with its stderr attached.
fn invoke_runtime(args: &[&OsStr]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_remoteproc-runtime"))
        .args(args)
        .output()
        .context("failed to invoke remoteproc-runtime")?;
    ensure!(
        output.status.success(),
        "remoteproc-runtime {} failed: {}",
        args.first()
            .map(|arg| arg.to_string_lossy())
            .unwrap_or_default(),
        String::from_utf8_lossy(&output.stderr).trim()
    );
    Ok(output)
}

fn container_state(id: &str) -> Result<ContainerState> {
    let output = invoke_runtime(&[OsStr::new("state"), OsStr::new(id)])?;
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn wait_for_device_state(device: &FakeDevice, want: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let state = device.state()?;
        if state == want {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("device state is {state}, expected {want} within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Write a minimal OCI bundle requesting `device_name` with a firmware
/// image at `rootfs/<firmware>`.
fn write_bundle(dir: &std::path::Path, device_name: &str, firmware: Option<&str>) -> Result<()> {
    let rootfs = dir.join("rootfs");
    fs::create_dir_all(&rootfs)?;
    let args = firmware.unwrap_or("hello_world.elf");
    if let Some(firmware) = firmware {
        fs::write(rootfs.join(firmware), b"firmware data!")?;
    }
    let config = format!(
        r#"{{
            "ociVersion": "1.0.2",
            "annotations": {{"remoteproc.name": "{device_name}"}},
            "process": {{"cwd": "/", "args": ["{args}"]}},
            "root": {{"path": "rootfs"}}
        }}"#
    );
    fs::write(dir.join("config.json"), config)?;
    Ok(())
}

#[test]
fn create_reports_available_devices_on_name_mismatch() -> Result<()> {
    let _guard = sysfs_lock();
    let _device = FakeDevice::new(10, "some-processor")?;
    let bundle = tempfile::TempDir::new()?;
    write_bundle(bundle.path(), "other-processor", Some("hello_world.elf"))?;

    let err = runtime::create("mismatch-container", bundle.path(), None).unwrap_err();
    assert!(
        err.to_string().contains(
            "remote processor other-processor does not exist, \
             available remote processors: some-processor"
        ),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn create_rejects_a_bundle_without_firmware() -> Result<()> {
    let _guard = sysfs_lock();
    let _device = FakeDevice::new(11, "fw-missing-dev")?;
    let bundle = tempfile::TempDir::new()?;
    write_bundle(bundle.path(), "fw-missing-dev", None)?;

    let err = runtime::create("fw-missing-container", bundle.path(), None).unwrap_err();
    assert!(matches!(err, RuntimeError::FirmwareMissing { .. }));
    Ok(())
}

#[test]
fn device_discovery_and_state_verbs_work_through_the_root_prefix() -> Result<()> {
    let _guard = sysfs_lock();
    let device = FakeDevice::new(12, "verb-dev")?;

    let resolved = remoteproc::find_device_path("verb-dev")?;
    assert_eq!(resolved, device.dir);
    assert_eq!(
        remoteproc::get_state(&resolved)?,
        remoteproc::DeviceState::Offline
    );

    remoteproc::set_firmware(&resolved, "fw_123.elf")?;
    assert_eq!(fs::read_to_string(resolved.join("firmware"))?, "fw_123.elf");

    remoteproc::start(&resolved)?;
    assert_eq!(device.state()?, "start");

    remoteproc::stop(&resolved)?;
    assert_eq!(device.state()?, "stop");
    Ok(())
}

#[test]
fn firmware_staging_honors_the_kernel_override_path() -> Result<()> {
    let _guard = sysfs_lock();
    let override_file = rootpath::firmware_search_override_file();
    fs::create_dir_all(override_file.parent().unwrap())?;
    let custom_dir = rootpath::join("my/firmware/path");
    fs::write(&override_file, format!("{}\n", custom_dir.display()))?;

    let search_path = remoteproc::system_firmware_path()?;
    assert_eq!(search_path, custom_dir);

    let source_dir = tempfile::TempDir::new()?;
    let source = source_dir.path().join("hello_world.elf");
    fs::write(&source, b"firmware data!")?;
    let staged = remoteproc::store_firmware(&source, &search_path)?;

    let staged_names: Vec<String> = fs::read_dir(&custom_dir)?
        .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_>>()?;
    assert!(staged_names
        .iter()
        .any(|name| name.starts_with("hello_world")));

    remoteproc::remove_firmware(&staged);
    fs::remove_file(&override_file)?;
    Ok(())
}

#[test]
fn state_records_round_trip_through_the_store() -> Result<()> {
    let mut state = ContainerState::new("store-roundtrip", "/bundles/b");
    state.status = Status::Created;
    state.pid = 12345;
    state.annotations.insert(
        annotations::STATE_RESOLVED_PATH.to_owned(),
        "/sys/class/remoteproc/remoteproc0".to_owned(),
    );

    oci::write_state(&state)?;
    let loaded = oci::read_state("store-roundtrip", &[annotations::STATE_RESOLVED_PATH])?;
    assert_eq!(loaded, state);

    oci::remove_state("store-roundtrip")?;
    assert!(oci::read_state("store-roundtrip", &[]).is_err());
    Ok(())
}

#[test]
fn concurrent_creates_for_one_id_conflict() -> Result<()> {
    oci::create_state_dir("exclusive-id")?;
    let err = oci::create_state_dir("exclusive-id").unwrap_err();
    assert!(matches!(err, RuntimeError::ContainerExists(_)));

    oci::remove_state("exclusive-id")?;
    Ok(())
}

#[test]
fn delete_without_force_refuses_a_running_container() -> Result<()> {
    let mut state = ContainerState::new("running-delete", "/bundles/b");
    state.status = Status::Running;
    oci::write_state(&state)?;

    let err = runtime::delete("running-delete", false).unwrap_err();
    assert!(matches!(err, RuntimeError::ContainerRunning));

    // The record survives a refused delete unchanged.
    let loaded = oci::read_state("running-delete", &[])?;
    assert_eq!(loaded, state);

    runtime::delete("running-delete", true)?;
    assert!(oci::read_state("running-delete", &[]).is_err());
    Ok(())
}

#[test]
fn force_delete_always_cleans_up() -> Result<()> {
    // Even a container whose record never made it to disk.
    runtime::delete("never-created", true)?;

    let mut state = ContainerState::new("force-delete", "/bundles/b");
    state.status = Status::Running;
    state.annotations.insert(
        annotations::STATE_STORED_FIRMWARE_PATH.to_owned(),
        "/nonexistent/firmware_copy.elf".to_owned(),
    );
    oci::write_state(&state)?;

    runtime::delete("force-delete", true)?;
    assert!(oci::read_state("force-delete", &[]).is_err());
    Ok(())
}

#[test]
fn kill_marks_a_created_container_stopped() -> Result<()> {
    let mut state = ContainerState::new("kill-me", "/bundles/b");
    state.status = Status::Created;
    oci::write_state(&state)?;

    runtime::kill("kill-me", None)?;
    assert_eq!(oci::read_state("kill-me", &[])?.status, Status::Stopped);

    oci::remove_state("kill-me")?;
    Ok(())
}

#[test]
fn kill_rejects_unsupported_signals() {
    let err = runtime::kill("whatever", Some("HUP")).unwrap_err();
    assert!(matches!(err, RuntimeError::UnsupportedSignal(_)));
}

#[test]
fn container_lifecycle_against_the_real_binary() -> Result<()> {
    let _guard = sysfs_lock();
    let device = FakeDevice::new(20, "yolo-device")?;
    let _simulator = DeviceSimulator::start(device.dir.clone());
    let bundle = tempfile::TempDir::new()?;
    write_bundle(bundle.path(), "yolo-device", Some("hello_world.elf"))?;

    invoke_runtime(&[
        OsStr::new("create"),
        OsStr::new("--bundle"),
        bundle.path().as_os_str(),
        OsStr::new("lifecycle-container"),
    ])?;
    let state = container_state("lifecycle-container")?;
    assert_eq!(state.status, Status::Created);
    assert!(state.pid > 0);
    assert_eq!(
        state.annotations.get(annotations::SPEC_NAME).map(String::as_str),
        Some("yolo-device")
    );
    assert_eq!(device.state()?, "offline");

    invoke_runtime(&[OsStr::new("start"), OsStr::new("lifecycle-container")])?;
    assert_eq!(container_state("lifecycle-container")?.status, Status::Running);
    wait_for_device_state(&device, "running", Duration::from_secs(2))?;

    invoke_runtime(&[OsStr::new("kill"), OsStr::new("lifecycle-container")])?;
    assert_eq!(container_state("lifecycle-container")?.status, Status::Stopped);
    wait_for_device_state(&device, "offline", Duration::from_millis(500))?;

    invoke_runtime(&[OsStr::new("delete"), OsStr::new("lifecycle-container")])?;
    assert!(!userdirs::runtime_dir()?.join("lifecycle-container").exists());
    Ok(())
}

#[test]
fn sigterm_to_the_proxy_pid_stops_the_device_within_500ms() -> Result<()> {
    let _guard = sysfs_lock();
    let device = FakeDevice::new(21, "pid-kill-dev")?;
    let _simulator = DeviceSimulator::start(device.dir.clone());
    let bundle = tempfile::TempDir::new()?;
    write_bundle(bundle.path(), "pid-kill-dev", Some("hello_world.elf"))?;

    invoke_runtime(&[
        OsStr::new("create"),
        OsStr::new("--bundle"),
        bundle.path().as_os_str(),
        OsStr::new("pid-kill-container"),
    ])?;
    invoke_runtime(&[OsStr::new("start"), OsStr::new("pid-kill-container")])?;
    wait_for_device_state(&device, "running", Duration::from_secs(2))?;

    let pid = container_state("pid-kill-container")?.pid;
    assert!(pid > 0);
    signal::kill(Pid::from_raw(pid), Signal::SIGTERM)?;
    wait_for_device_state(&device, "offline", Duration::from_millis(500))?;

    // The proxy is gone; kill still transitions the record and delete
    // cleans up.
    invoke_runtime(&[OsStr::new("kill"), OsStr::new("pid-kill-container")])?;
    invoke_runtime(&[OsStr::new("delete"), OsStr::new("pid-kill-container")])?;
    Ok(())
}

#[test]
fn create_writes_the_proxy_pid_to_the_pid_file() -> Result<()> {
    let _guard = sysfs_lock();
    let _device = FakeDevice::new(22, "pidfile-dev")?;
    let bundle = tempfile::TempDir::new()?;
    write_bundle(bundle.path(), "pidfile-dev", Some("hello_world.elf"))?;
    let pid_file = bundle.path().join("pidfile");

    invoke_runtime(&[
        OsStr::new("create"),
        OsStr::new("--bundle"),
        bundle.path().as_os_str(),
        OsStr::new("--pid-file"),
        pid_file.as_os_str(),
        OsStr::new("pidfile-container"),
    ])?;

    let written: i32 = fs::read_to_string(&pid_file)?.trim().parse()?;
    assert!(written > 0);
    assert_eq!(written, container_state("pidfile-container")?.pid);

    // Stand the armed proxy down before removing the container.
    signal::kill(Pid::from_raw(written), Signal::SIGTERM)?;
    invoke_runtime(&[OsStr::new("delete"), OsStr::new("pidfile-container")])?;
    Ok(())
}

#[test]
fn start_requires_a_created_container() -> Result<()> {
    let mut state = ContainerState::new("already-stopped", "/bundles/b");
    state.status = Status::Stopped;
    state.annotations.insert(
        annotations::STATE_RESOLVED_PATH.to_owned(),
        "/sys/class/remoteproc/remoteproc0".to_owned(),
    );
    state.annotations.insert(
        annotations::STATE_FIRMWARE_PATH.to_owned(),
        "/bundles/b/rootfs/fw.elf".to_owned(),
    );
    oci::write_state(&state)?;

    let err = runtime::start("already-stopped").unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidState { .. }));

    state.status = Status::Running;
    oci::write_state(&state)?;
    let err = runtime::start("already-stopped").unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyRunning));

    oci::remove_state("already-stopped")?;
    Ok(())
}
