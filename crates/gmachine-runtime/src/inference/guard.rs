use crate::engine::{GradientMachine, InputBatch, OutputRow};
use crate::machine::MachineError;

/// Keeps a machine started for as long as it lives.
///
/// `finish` is called exactly once: by [`RunGuard::close`], or on drop when the run
/// was abandoned before that.
pub(crate) struct RunGuard<'a, M: GradientMachine> {
    machine: &'a mut M,
    running: bool,
}

impl<'a, M: GradientMachine> RunGuard<'a, M> {
    pub(crate) fn start(machine: &'a mut M) -> Result<Self, MachineError> {
        machine.start()?;
        Ok(Self {
            machine,
            running: true,
        })
    }

    pub(crate) fn forward(&mut self, batch: &InputBatch) -> Result<Vec<OutputRow>, MachineError> {
        log::debug!("Forwarding batch of {} sample(s)", batch.size);
        self.machine.forward_test(batch)
    }

    pub(crate) fn close(mut self) -> Result<(), MachineError> {
        self.running = false;
        self.machine.finish()
    }
}

impl<M: GradientMachine> Drop for RunGuard<'_, M> {
    fn drop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        log::warn!("Inference run dropped before its input was exhausted");
        if let Err(e) = self.machine.finish() {
            log::error!("Failed to finish gradient machine: {e}");
        }
    }
}
