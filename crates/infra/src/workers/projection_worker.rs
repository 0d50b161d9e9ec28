use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use forgeerp_core::TenantId;
use forgeerp_events::{EventBus, Subscription, TenantScoped};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<u64>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown and wait for the worker to stop.
    ///
    /// Returns how many messages the handler accepted, or `None` if the
    /// worker thread panicked.
    pub fn shutdown(mut self) -> Option<u64> {
        let _ = self.shutdown.send(());
        self.join.take().and_then(|j| j.join().ok())
    }
}

/// Drives a projection from a bus subscription on its own thread.
///
/// The subscription is taken before the thread starts, so nothing published
/// after `spawn` returns is missed. Handler errors are logged and the loop
/// keeps going; the projection's cursors make redelivery harmless.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread.
    ///
    /// - `tenant_id`: when provided, messages for other tenants are ignored
    /// - `handler`: must be idempotent (at-least-once delivery safe)
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        info!(worker = name, tenant_id = ?tenant_id, "projection worker started");
        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) -> u64
where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(50);
    let mut applied = 0u64;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            // Finish what is already buffered so a shutdown after a command
            // leaves the read model caught up.
            for msg in sub.drain() {
                handle_one(name, tenant_id, handler, msg, &mut applied);
            }
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => handle_one(name, tenant_id, handler, msg, &mut applied),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = name, applied, "projection worker stopped");
    applied
}

fn handle_one<M, H, E>(
    name: &'static str,
    tenant_id: Option<TenantId>,
    handler: &mut H,
    msg: M,
    applied: &mut u64,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    if let Some(t) = tenant_id {
        if msg.tenant_id() != t {
            debug!(worker = name, "skipping message for another tenant");
            return;
        }
    }

    match handler(msg) {
        Ok(()) => *applied += 1,
        Err(err) => warn!(worker = name, error = ?err, "projection worker handler failed"),
    }
}
