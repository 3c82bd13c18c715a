use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use shelf_events::{EventBus, EventEnvelope};

use crate::event_store::EventStore;
use crate::service::CirculationService;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Periodic overdue sweep.
///
/// Runs [`CirculationService::sweep_overdue`] once per interval on its own
/// thread. The sweep is idempotent, so a worker racing request-time sweeps
/// (or another worker) converges on the same loan state.
#[derive(Debug)]
pub struct OverdueSweepWorker;

impl OverdueSweepWorker {
    pub fn spawn<S, B>(
        service: Arc<CirculationService<S, B>>,
        interval: Duration,
    ) -> std::io::Result<WorkerHandle>
    where
        S: EventStore + 'static,
        B: EventBus<EventEnvelope<JsonValue>> + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("overdue-sweep".to_string())
            .spawn(move || sweep_loop(&service, interval, &shutdown_rx))?;

        info!(interval_secs = interval.as_secs(), "overdue sweep worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn sweep_loop<S, B>(service: &CirculationService<S, B>, interval: Duration, shutdown_rx: &mpsc::Receiver<()>)
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => match service.sweep_overdue() {
                Ok(report) => debug!(
                    items_scanned = report.items_scanned,
                    loans_marked = report.loans_marked,
                    "overdue sweep tick"
                ),
                Err(err) => warn!(error = %err, "overdue sweep failed"),
            },
            // Explicit shutdown or every handle dropped.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("overdue sweep worker stopped");
}
