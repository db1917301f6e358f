//! Performer: one supervised message pump task.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::{BrighterError, ConsumerState};
use crate::ports::Channel;

/// The pump loop a performer drives, already bound to its channel.
pub type PumpRun = BoxFuture<'static, Result<ConsumerState, BrighterError>>;

pub struct Performer {
    name: String,
    state: Arc<Mutex<ConsumerState>>,
    stop_tx: watch::Sender<bool>,
    channel: Arc<dyn Channel>,
    supervisor: JoinHandle<()>,
}

impl Performer {
    /// Spawn `pump` and a supervisor that records how it ended.
    ///
    /// An error or a panic in the pump leaves the performer `Closed`.
    pub fn start(
        name: String,
        channel: Arc<dyn Channel>,
        stop_tx: watch::Sender<bool>,
        pump: PumpRun,
    ) -> Self {
        let state = Arc::new(Mutex::new(ConsumerState::Open));
        let pump = tokio::spawn(pump);

        let supervisor = {
            let state = Arc::clone(&state);
            let name = name.clone();
            tokio::spawn(async move {
                let ended = match pump.await {
                    Ok(Ok(ended)) => ended,
                    Ok(Err(e)) => {
                        error!(performer = %name, error = %e, "performer failed");
                        ConsumerState::Closed
                    }
                    Err(join) => {
                        error!(performer = %name, error = %join, "performer panicked");
                        ConsumerState::Closed
                    }
                };
                info!(performer = %name, state = ?ended, "performer exited");
                *state.lock() = ended;
            })
        };

        Self {
            name,
            state,
            stop_tx,
            channel,
            supervisor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Shared handle on the state the supervisor writes when the pump ends.
    pub(crate) fn state_handle(&self) -> Arc<Mutex<ConsumerState>> {
        Arc::clone(&self.state)
    }

    /// Ask the pump to stop after its current message, and wait until it has.
    pub async fn stop(self) -> ConsumerState {
        let Performer {
            name,
            state,
            stop_tx,
            channel,
            supervisor,
        } = self;
        let _ = stop_tx.send(true);
        if let Err(e) = channel.stop().await {
            error!(performer = %name, error = %e, "failed to stop channel");
        }
        let _ = supervisor.await;
        *state.lock()
    }
}
