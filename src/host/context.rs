use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use super::{Host, HostError};

type Job = Box<dyn FnOnce(&mut dyn Host) + Send>;

enum Message {
    Run(Job),
    Stop,
}

/// The host's single-threaded execution context.
///
/// Owns the [`Host`] on a dedicated thread and runs submitted closures against
/// it in arrival order.
pub struct MainContext {
    sender: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl MainContext {
    /// Move `host` onto a new main-context thread.
    pub fn spawn<H: Host + 'static>(host: H) -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();
        let handle = thread::Builder::new()
            .name("host-main".to_string())
            .spawn(move || {
                let mut host = host;
                for message in receiver {
                    match message {
                        Message::Run(job) => job(&mut host),
                        Message::Stop => break,
                    }
                }
                tracing::debug!("Host main context stopped");
            })
            .map_err(|e| tracing::error!(error = %e, "Failed to start host main context"))
            .ok();
        Self { sender, handle }
    }

    pub fn handle(&self) -> MainContextHandle {
        MainContextHandle {
            sender: self.sender.clone(),
        }
    }

    /// Stop after already-queued work; later calls through handles fail with
    /// [`HostError::Unavailable`].
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(Message::Stop);
            if handle.join().is_err() {
                tracing::error!("Host main context panicked");
            }
        }
    }
}

impl Drop for MainContext {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable entry point into the [`MainContext`].
#[derive(Clone)]
pub struct MainContextHandle {
    sender: Sender<Message>,
}

impl MainContextHandle {
    /// Queue `job` without waiting for it.
    pub fn post<F>(&self, job: F) -> Result<(), HostError>
    where
        F: FnOnce(&mut dyn Host) + Send + 'static,
    {
        self.sender
            .send(Message::Run(Box::new(job)))
            .map_err(|_| HostError::Unavailable)
    }

    /// Run `job` on the main context and wait for its result.
    pub fn call<T, F>(&self, job: F) -> Result<T, HostError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Host) -> T + Send + 'static,
    {
        let (reply, result) = mpsc::sync_channel(1);
        self.post(move |host| {
            let _ = reply.send(job(host));
        })?;
        result.recv().map_err(|_| HostError::Unavailable)
    }
}
