//! The containerd task service, backed by the runtime CLI.

use super::events::{self, TaskEvent};
use super::runtime;
use super::watcher::{ExitReason, ProcessWatcher, StopHandle};
use crate::oci::Status as OciStatus;
use containerd_shim::api;
use containerd_shim::publisher::RemotePublisher;
use containerd_shim_protos::events::task::{TaskCreate, TaskDelete, TaskExit, TaskStart};
use containerd_shim_protos::protobuf::well_known_types::timestamp::Timestamp;
use containerd_shim_protos::protobuf::MessageField;
use containerd_shim::{self as shim, Config, ExitSignal, Flags, StartOpts, TtrpcContext, TtrpcResult};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, warn};
use nix::mount::{umount2, MntFlags};
use nix::sys::signal::Signal;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Poll interval of the `Wait` RPC.
const WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// The shim service: implements both the manager side (socket bootstrap via
/// the framework) and the per-container task RPCs.
#[derive(Clone)]
pub struct Service {
    namespace: String,
    exit: Arc<ExitSignal>,
    events: Sender<TaskEvent>,
    // Handed to the forwarder once the publisher is available.
    pending_events: Arc<Mutex<Option<Receiver<TaskEvent>>>>,
    // Single-flight: at most one live watcher per shim.
    watcher: Arc<Mutex<Option<StopHandle>>>,
}

impl shim::Shim for Service {
    type T = Service;

    fn new(_runtime_id: &str, args: &Flags, _config: &mut Config) -> Self {
        let (events, receiver) = events::channel();
        Service {
            namespace: args.namespace.clone(),
            exit: Arc::new(ExitSignal::default()),
            events,
            pending_events: Arc::new(Mutex::new(Some(receiver))),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    fn start_shim(&mut self, opts: StartOpts) -> shim::Result<String> {
        let grouping = opts.id.clone();
        let (_pid, address) = shim::spawn(opts, &grouping, Vec::new())?;
        Ok(address)
    }

    fn delete_shim(&mut self) -> shim::Result<api::DeleteResponse> {
        let mut response = api::DeleteResponse::new();
        response.pid = std::process::id();
        response.exited_at = MessageField::some(now_timestamp());
        Ok(response)
    }

    fn wait(&mut self) {
        self.exit.wait();
    }

    fn create_task_service(&self, publisher: RemotePublisher) -> Self::T {
        if let Some(receiver) = lock(&self.pending_events).take() {
            events::forward(publisher, self.namespace.clone(), receiver);
        }
        self.clone()
    }
}

impl shim::Task for Service {
    fn create(
        &self,
        _ctx: &TtrpcContext,
        req: api::CreateTaskRequest,
    ) -> TtrpcResult<api::CreateTaskResponse> {
        debug!("-> service.Create: {:?}", req);
        let bundle = Path::new(&req.bundle);
        // Assumption shared with the runc shim: the rootfs mount point lives
        // inside the bundle.
        let rootfs = bundle.join("rootfs");
        fs::create_dir_all(&rootfs).map_err(other_error)?;

        for m in &req.rootfs {
            shim::mount::mount_rootfs(
                Some(m.type_.as_str()),
                Some(m.source.as_str()),
                &m.options,
                &rootfs,
            )
            .map_err(other_error)?;
        }

        if let Err(err) = runtime::create(&req.id, bundle) {
            if let Err(umount_err) = umount2(&rootfs, MntFlags::MNT_DETACH) {
                warn!("failed to cleanup rootfs mount: {umount_err}");
            }
            return Err(other_error(err));
        }

        let pid = runtime::pid(&req.id);
        let mut event = TaskCreate::new();
        event.container_id = req.id.clone();
        event.bundle = req.bundle.clone();
        event.pid = pid as u32;
        self.send(TaskEvent::Create(event));

        let mut response = api::CreateTaskResponse::new();
        response.pid = pid as u32;
        debug!("<- service.Create: {:?}", response);
        Ok(response)
    }

    fn start(&self, _ctx: &TtrpcContext, req: api::StartRequest) -> TtrpcResult<api::StartResponse> {
        debug!("-> service.Start: {:?}", req);
        runtime::start(&req.id).map_err(other_error)?;

        let pid = runtime::pid(&req.id);
        if pid > 0 {
            self.start_process_watcher(&req.id, pid);
        }

        let mut event = TaskStart::new();
        event.container_id = req.id.clone();
        event.pid = pid as u32;
        self.send(TaskEvent::Start(event));

        let mut response = api::StartResponse::new();
        response.pid = pid as u32;
        debug!("<- service.Start: {:?}", response);
        Ok(response)
    }

    fn kill(&self, _ctx: &TtrpcContext, req: api::KillRequest) -> TtrpcResult<api::Empty> {
        debug!("-> service.Kill: {:?}", req);
        // Stop watching before the signal lands so the exit is not reported
        // twice.
        self.stop_process_watcher();

        let pid = runtime::pid(&req.id);
        let signal = match req.signal {
            9 => Signal::SIGKILL,
            _ => Signal::SIGTERM,
        };
        runtime::kill(&req.id, signal).map_err(other_error)?;

        let mut event = TaskExit::new();
        event.container_id = req.id.clone();
        event.id = req.id.clone();
        event.pid = pid as u32;
        event.exited_at = MessageField::some(now_timestamp());
        self.send(TaskEvent::Exit(event));

        Ok(api::Empty::new())
    }

    fn delete(
        &self,
        _ctx: &TtrpcContext,
        req: api::DeleteRequest,
    ) -> TtrpcResult<api::DeleteResponse> {
        debug!("-> service.Delete: {:?}", req);
        let pid = runtime::pid(&req.id);
        runtime::delete(&req.id).map_err(other_error)?;

        let mut event = TaskDelete::new();
        event.container_id = req.id.clone();
        event.pid = pid as u32;
        event.exited_at = MessageField::some(now_timestamp());
        self.send(TaskEvent::Delete(event));

        let mut response = api::DeleteResponse::new();
        response.pid = pid as u32;
        response.exited_at = MessageField::some(now_timestamp());
        debug!("<- service.Delete: {:?}", response);
        Ok(response)
    }

    fn state(&self, _ctx: &TtrpcContext, req: api::StateRequest) -> TtrpcResult<api::StateResponse> {
        debug!("-> service.State: {:?}", req);
        let state = runtime::state(&req.id).map_err(other_error)?;

        let mut response = api::StateResponse::new();
        response.id = state.id;
        response.bundle = state.bundle.display().to_string();
        response.pid = state.pid as u32;
        response.status = match state.status {
            OciStatus::Creating | OciStatus::Created => api::Status::CREATED,
            OciStatus::Running => api::Status::RUNNING,
            OciStatus::Stopped => api::Status::STOPPED,
        }
        .into();
        debug!("<- service.State: {:?}", response);
        Ok(response)
    }

    fn wait(&self, ctx: &TtrpcContext, req: api::WaitRequest) -> TtrpcResult<api::WaitResponse> {
        debug!("-> service.Wait: {:?}", req);
        let deadline = (ctx.timeout_nano > 0)
            .then(|| Instant::now() + Duration::from_nanos(ctx.timeout_nano as u64));

        loop {
            thread::sleep(WAIT_INTERVAL);
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(ttrpc::Error::RpcStatus(ttrpc::error::get_status(
                        ttrpc::Code::DEADLINE_EXCEEDED,
                        format!("wait for container {} timed out", req.id),
                    )));
                }
            }
            let state = runtime::state(&req.id).map_err(other_error)?;
            if state.status == OciStatus::Stopped {
                let mut response = api::WaitResponse::new();
                response.exit_status = 0;
                response.exited_at = MessageField::some(now_timestamp());
                debug!("<- service.Wait: {:?}", response);
                return Ok(response);
            }
        }
    }

    fn connect(
        &self,
        _ctx: &TtrpcContext,
        req: api::ConnectRequest,
    ) -> TtrpcResult<api::ConnectResponse> {
        debug!("-> service.Connect: {:?}", req);
        let mut response = api::ConnectResponse::new();
        response.shim_pid = std::process::id();
        response.task_pid = runtime::pid(&req.id) as u32;
        Ok(response)
    }

    fn shutdown(&self, _ctx: &TtrpcContext, req: api::ShutdownRequest) -> TtrpcResult<api::Empty> {
        debug!("-> service.Shutdown: {:?}", req);
        self.exit.signal();
        Ok(api::Empty::new())
    }
}

impl Service {
    fn send(&self, event: TaskEvent) {
        if let Err(err) = self.events.send(event) {
            error!("event queue closed: {err}");
        }
    }

    fn start_process_watcher(&self, container_id: &str, pid: i32) {
        let (watcher, handle) = match ProcessWatcher::new(pid) {
            Ok(pair) => pair,
            Err(err) => {
                error!(
                    "failed to create process watcher for container {container_id}, \
                     pid {pid}: {err}"
                );
                return;
            }
        };
        // Replacing the slot drops any previous handle, which stands its
        // watcher down.
        *lock(&self.watcher) = Some(handle);

        let events = self.events.clone();
        let exit = self.exit.clone();
        let container_id = container_id.to_owned();
        thread::spawn(move || {
            if watcher.wait_for_exit() == ExitReason::ProcessExited {
                let mut event = TaskExit::new();
                event.container_id = container_id.clone();
                event.id = container_id;
                event.pid = pid as u32;
                event.exited_at = MessageField::some(now_timestamp());
                if events.send(TaskEvent::Exit(event)).is_ok() {
                    exit.signal();
                }
            }
        });
    }

    fn stop_process_watcher(&self) {
        if let Some(handle) = lock(&self.watcher).take() {
            handle.stop();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn other_error(err: impl std::fmt::Display) -> ttrpc::Error {
    ttrpc::Error::RpcStatus(ttrpc::error::get_status(
        ttrpc::Code::UNKNOWN,
        err.to_string(),
    ))
}

fn now_timestamp() -> Timestamp {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let mut timestamp = Timestamp::new();
    timestamp.seconds = now.as_secs() as i64;
    timestamp.nanos = now.subsec_nanos() as i32;
    timestamp
}
