use std::any::Any;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{SendTimeoutError, Sender};

use crate::config::InferConfig;
use crate::engine::{GradientMachine, OutputRow};
use crate::feeder::Sample;

use super::core::Inference;
use super::error::InferenceError;
use super::streaming::CancelToken;

const STREAM_CAPACITY: usize = 10;
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// A batch loop running on its own thread.
///
/// Output rows arrive on `stream`, one message per input batch. Joining returns the
/// session once the loop is done.
pub struct JobHandle<M: GradientMachine> {
    pub stream: crossbeam::channel::Receiver<Vec<OutputRow>>,
    cancel: CancelToken,
    join: JoinHandle<Result<Inference<M>, InferenceError>>,
}

impl<M: GradientMachine> JobHandle<M> {
    /// Stops the loop before its next batch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn join(self) -> Result<Inference<M>, InferenceError> {
        self.join
            .join()
            .unwrap_or_else(|payload| Err(InferenceError::ThreadPanicked(panic_message(&*payload))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        format!("{payload:?}")
    }
}

impl<M: GradientMachine + Send + 'static> Inference<M> {
    /// Moves the session to a worker thread and streams the output of every batch.
    pub fn spawn<I>(self, input: I, config: InferConfig) -> JobHandle<M>
    where
        I: IntoIterator<Item = Sample> + Send + 'static,
    {
        let (tx, stream) = crossbeam::channel::bounded(STREAM_CAPACITY);
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let join = std::thread::spawn(move || -> Result<Inference<M>, InferenceError> {
            let mut session = self;
            session.stream(input, &config, &tx, &token)?;
            Ok(session)
        });
        JobHandle {
            stream,
            cancel,
            join,
        }
    }

    fn stream<I>(
        &mut self,
        input: I,
        config: &InferConfig,
        tx: &Sender<Vec<OutputRow>>,
        cancel: &CancelToken,
    ) -> Result<(), InferenceError>
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut run = self.iter_infer(input, config)?;
        loop {
            if cancel.is_cancelled() {
                log::debug!("Inference job cancelled");
                run.close()?;
                return Err(InferenceError::Cancelled);
            }
            let Some(rows) = run.next() else {
                return Ok(());
            };
            if let Err(e) = rows.and_then(|rows| send(tx, rows, cancel)) {
                if let Err(close) = run.close() {
                    log::error!("Failed to finish gradient machine: {close}");
                }
                return Err(e);
            }
        }
    }
}

fn send(
    tx: &Sender<Vec<OutputRow>>,
    mut rows: Vec<OutputRow>,
    cancel: &CancelToken,
) -> Result<(), InferenceError> {
    loop {
        match tx.send_timeout(rows, CANCEL_POLL) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(pending)) => {
                if cancel.is_cancelled() {
                    return Err(InferenceError::Cancelled);
                }
                rows = pending;
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                log::debug!("Inference stream receiver dropped");
                return Err(InferenceError::Cancelled);
            }
        }
    }
}
