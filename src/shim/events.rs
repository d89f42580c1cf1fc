//! Decoupled event delivery: RPC handlers enqueue, one forwarder thread
//! publishes on the containerd event bus.

use containerd_shim::publisher::RemotePublisher;
use containerd_shim_protos::events::task::{TaskCreate, TaskDelete, TaskExit, TaskStart};
use containerd_shim_protos::protobuf::MessageDyn;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::error;
use std::thread::{self, JoinHandle};
use ttrpc::context::Context;

/// Queue depth between the RPC handlers and the forwarder.
const QUEUE_CAPACITY: usize = 128;

pub enum TaskEvent {
    Create(TaskCreate),
    Start(TaskStart),
    Exit(TaskExit),
    Delete(TaskDelete),
}

impl TaskEvent {
    fn topic(&self) -> &'static str {
        match self {
            TaskEvent::Create(_) => "/tasks/create",
            TaskEvent::Start(_) => "/tasks/start",
            TaskEvent::Exit(_) => "/tasks/exit",
            TaskEvent::Delete(_) => "/tasks/delete",
        }
    }

    fn into_message(self) -> Box<dyn MessageDyn> {
        match self {
            TaskEvent::Create(event) => Box::new(event),
            TaskEvent::Start(event) => Box::new(event),
            TaskEvent::Exit(event) => Box::new(event),
            TaskEvent::Delete(event) => Box::new(event),
        }
    }
}

pub fn channel() -> (Sender<TaskEvent>, Receiver<TaskEvent>) {
    bounded(QUEUE_CAPACITY)
}

/// Drain the queue in enqueue order, publishing each event under its topic.
/// Exits once every sender is gone, which closes the queue.
pub fn forward(
    publisher: RemotePublisher,
    namespace: String,
    events: Receiver<TaskEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in events {
            let topic = event.topic();
            if let Err(err) =
                publisher.publish(Context::default(), topic, &namespace, event.into_message())
            {
                error!("post event {topic}: {err}");
            }
        }
    })
}
