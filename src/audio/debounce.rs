use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Temporizador de coalescencia para escrituras.
///
/// Scheduling cancels the pending job and restarts the delay, so only the last
/// job of a burst runs. Jobs that pass the delay run one at a time.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn schedule<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let in_flight = self.in_flight.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // La escritura sigue aunque llegue otro schedule después.
            tokio::spawn(async move {
                let _writing = in_flight.lock().await;
                job().await;
            });
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancela lo pendiente y ejecuta `job` ya, esperando a que termine.
    pub async fn run_now<Fut>(&self, job: Fut)
    where
        Fut: Future<Output = ()>,
    {
        self.cancel();
        let _writing = self.in_flight.lock().await;
        job.await;
    }

    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
