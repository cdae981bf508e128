use std::thread;
use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use crate::address::BindingAddress;
use crate::binding::{Binder, LocalBinder, RemoteBinding};
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::launcher::ProcessLauncher;
use crate::protocol::Request;

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing bound yet.
    Uninitialized,
    /// A binding exists but the worker has not answered a readiness probe.
    Bound,
    /// The worker answered a readiness probe.
    Ready,
    /// [`ServiceClient::shutdown`] released everything.
    ShutDown,
}

struct Connection<T> {
    address: Option<BindingAddress>,
    binding: Option<T>,
    bound: bool,
    ready: bool,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self {
            address: None,
            binding: None,
            bound: false,
            ready: false,
        }
    }
}

impl<T> Connection<T> {
    fn release(&mut self) {
        self.address = None;
        self.binding = None;
        self.bound = false;
        self.ready = false;
    }
}

/// Supervisor-side handle on the worker.
///
/// Owns the [`ProcessLauncher`] and the binding to the worker it started.
/// Every playback operation is guarded by "worker started and binding built";
/// when the guard fails, or the call faults for any reason, the operation
/// returns `false` and nothing propagates to the caller.
pub struct ServiceClient<B: Binder = LocalBinder> {
    launcher: ProcessLauncher,
    binder: B,
    config: ServiceConfig,
    connection: Connection<B::Binding>,
    shut_down: bool,
}

impl ServiceClient<LocalBinder> {
    /// Client using the local socket binder and default configuration.
    pub fn new(launcher: ProcessLauncher) -> Self {
        Self::with_config(launcher, ServiceConfig::default())
    }

    pub fn with_config(launcher: ProcessLauncher, config: ServiceConfig) -> Self {
        let binder = LocalBinder::from_config(&config);
        Self::with_binder(launcher, binder, config)
    }
}

impl<B: Binder> ServiceClient<B> {
    pub fn with_binder(launcher: ProcessLauncher, binder: B, config: ServiceConfig) -> Self {
        Self {
            launcher,
            binder,
            config,
            connection: Connection::default(),
            shut_down: false,
        }
    }

    pub fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    pub fn launcher_mut(&mut self) -> &mut ProcessLauncher {
        &mut self.launcher
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Whether the worker process was started.
    pub fn is_started(&self) -> bool {
        self.launcher.is_started()
    }

    /// Whether a binding has been built.
    pub fn is_bound(&self) -> bool {
        self.connection.bound
    }

    /// The composed address of the current binding.
    pub fn address(&self) -> Option<&BindingAddress> {
        self.connection.address.as_ref()
    }

    pub fn state(&self) -> ClientState {
        match (self.connection.bound, self.connection.ready) {
            (true, true) => ClientState::Ready,
            (true, false) => ClientState::Bound,
            (false, _) if self.shut_down => ClientState::ShutDown,
            (false, _) => ClientState::Uninitialized,
        }
    }

    /// Bind to the started worker and wait for it to accept calls.
    ///
    /// Returns `false` when the worker was never started, when the address
    /// cannot be composed or bound, or when the worker does not answer within
    /// the readiness window. A readiness timeout releases the binding again,
    /// so a later attempt starts from [`ClientState::Uninitialized`].
    pub fn connect(&mut self) -> bool {
        if !self.launcher.is_started() {
            debug!("connect skipped: worker not started");
            return false;
        }
        if self.connection.bound {
            debug!("connect: rebuilding existing binding");
            self.connection.release();
        }

        let address = match self.binder.compose(&self.config) {
            Ok(address) => address,
            Err(err) => {
                debug!(error = %err, "binding address composition failed");
                return false;
            }
        };
        let binding = match self.binder.bind(&address) {
            Ok(binding) => binding,
            Err(err) => {
                debug!(error = %err, %address, "binding construction failed");
                return false;
            }
        };

        self.connection.address = Some(address);
        self.connection.binding = Some(binding);
        self.connection.bound = true;
        self.shut_down = false;

        if self.wait_for_ready() {
            self.connection.ready = true;
            true
        } else {
            debug!(
                attempts = self.config.ready_max_attempts,
                "worker not ready in time; releasing binding"
            );
            self.connection.release();
            false
        }
    }

    /// Probe the binding at a fixed interval until the worker answers, the
    /// attempt budget runs out, or the readiness window closes. A probe is
    /// never allowed to outlive the window, so a worker that accepts and then
    /// stays silent cannot stretch the wait.
    fn wait_for_ready(&mut self) -> bool {
        let Some(binding) = self.connection.binding.as_mut() else {
            return false;
        };
        let interval = self.config.ready_poll_interval;
        let max_attempts = self.config.ready_max_attempts.max(1);
        let deadline = Instant::now() + self.config.ready_window();

        for attempt in 1..=max_attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(attempt, "readiness window elapsed");
                break;
            }
            match binding.is_listening(remaining) {
                Ok(()) => {
                    debug!(attempt, "worker ready");
                    return true;
                }
                Err(err) if attempt == max_attempts => {
                    debug!(attempt, error = %err, "last readiness probe failed");
                }
                Err(_) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    thread::sleep(interval.min(left));
                }
            }
        }
        false
    }

    fn permitted(&self) -> bool {
        self.launcher.is_started() && self.connection.bound
    }

    fn guarded<F>(&mut self, operation: &str, f: F) -> bool
    where
        F: FnOnce(&mut B::Binding) -> Result<()>,
    {
        let permitted = self.permitted();
        let result = match self.connection.binding.as_mut() {
            Some(binding) if permitted => f(binding),
            _ => Err(ServiceError::NotConnected),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                debug!(operation, error = %err, "worker call failed");
                false
            }
        }
    }

    /// Hand a complete song to the worker: PrepareNewSong, then one AddChunk.
    ///
    /// Both calls must succeed; there is no partial-success reporting.
    pub fn register_song(&mut self, data: &[u8]) -> bool {
        if !self.permitted() {
            debug!(operation = "RegisterSong", "worker call refused: not connected");
            return false;
        }
        if data.len() > self.config.max_chunk_size {
            debug!(size = data.len(), "song exceeds chunk limit");
            return false;
        }
        self.guarded("RegisterSong", |binding| {
            binding.call(&Request::PrepareNewSong)?;
            binding.call(&Request::AddChunk(Bytes::copy_from_slice(data)))
        })
    }

    pub fn play_song(&mut self, looping: bool) -> bool {
        self.guarded("PlaySong", |binding| {
            binding.call(&Request::PlaySong { looping })
        })
    }

    pub fn stop_song(&mut self) -> bool {
        self.guarded("StopSong", |binding| binding.call(&Request::StopSong))
    }

    pub fn set_volume(&mut self, level: i32) -> bool {
        self.guarded("SetVolume", |binding| {
            binding.call(&Request::ChangeVolume(level))
        })
    }

    pub fn pause_song(&mut self) -> bool {
        self.guarded("PauseSong", |binding| binding.call(&Request::PauseSong))
    }

    pub fn resume_song(&mut self) -> bool {
        self.guarded("ResumeSong", |binding| binding.call(&Request::ResumeSong))
    }

    /// Tell the worker to exit and release every local resource.
    ///
    /// Safe to call at any point, including when nothing was started. A
    /// worker that already died is not an error here. When the binding was
    /// rolled back after a readiness timeout, a fresh one is built just for
    /// the StopServer call, since the worker may have come up late.
    pub fn shutdown(&mut self) {
        if self.launcher.is_started() {
            match self.connection.binding.as_mut() {
                Some(binding) => send_stop(binding),
                None => match self.bind_for_stop() {
                    Ok(mut binding) => send_stop(&mut binding),
                    Err(err) => debug!(error = %err, "no binding for StopServer"),
                },
            }
            self.launcher.release();
        }
        self.connection.release();
        self.shut_down = true;
    }

    fn bind_for_stop(&self) -> Result<B::Binding> {
        let address = self.binder.compose(&self.config)?;
        self.binder.bind(&address)
    }
}

fn send_stop<T: RemoteBinding>(binding: &mut T) {
    if let Err(err) = binding.call(&Request::StopServer) {
        debug!(error = %err, "StopServer not delivered");
    }
}

impl<B: Binder> std::fmt::Debug for ServiceClient<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("state", &self.state())
            .field("started", &self.launcher.is_started())
            .field("address", &self.connection.address)
            .finish()
    }
}
