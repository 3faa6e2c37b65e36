use crate::batch::Batches;
use crate::engine::{GradientMachine, OutputRow};
use crate::feeder::{DataFeeder, Sample};
use crate::field::{FieldSelection, FieldValue};

use super::error::InferenceError;
use super::guard::RunGuard;

/// Output rows of each input batch, in input order.
///
/// The machine is started when the iterator is created and finished once the input is
/// exhausted, after the first error, or when the iterator is dropped. Nothing is yielded
/// after an error.
pub struct InferIter<'a, M: GradientMachine, I: Iterator<Item = Sample>> {
    feeder: DataFeeder,
    batches: Batches<I>,
    guard: Option<RunGuard<'a, M>>,
}

impl<'a, M: GradientMachine, I: Iterator<Item = Sample>> InferIter<'a, M, I> {
    pub(crate) fn new(
        machine: &'a mut M,
        feeder: DataFeeder,
        batches: Batches<I>,
    ) -> Result<Self, InferenceError> {
        let guard = RunGuard::start(machine)?;
        Ok(Self {
            feeder,
            batches,
            guard: Some(guard),
        })
    }

    /// Finishes the run if it is still going. Later calls to `next` yield `None`.
    pub(crate) fn close(&mut self) -> Result<(), InferenceError> {
        match self.guard.take() {
            Some(guard) => Ok(guard.close()?),
            None => Ok(()),
        }
    }

    fn forward(&mut self, samples: &[Sample]) -> Result<Vec<OutputRow>, InferenceError> {
        let batch = self.feeder.feed(samples)?;
        match self.guard.as_mut() {
            Some(guard) => Ok(guard.forward(&batch)?),
            None => Ok(Vec::new()),
        }
    }
}

impl<M: GradientMachine, I: Iterator<Item = Sample>> Iterator for InferIter<'_, M, I> {
    type Item = Result<Vec<OutputRow>, InferenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.guard.as_ref()?;

        let Some(samples) = self.batches.next() else {
            return self.close().err().map(Err);
        };

        let rows = self.forward(&samples);
        if rows.is_err() {
            if let Err(e) = self.close() {
                log::error!("Failed to finish gradient machine after an error: {e}");
            }
        }
        Some(rows)
    }
}

/// The requested fields of every output row, in request order.
pub struct FieldIter<'a, M: GradientMachine, I: Iterator<Item = Sample>> {
    inner: InferIter<'a, M, I>,
    fields: FieldSelection,
    rows: std::vec::IntoIter<OutputRow>,
    failed: bool,
}

impl<'a, M: GradientMachine, I: Iterator<Item = Sample>> FieldIter<'a, M, I> {
    pub(crate) fn new(inner: InferIter<'a, M, I>, fields: FieldSelection) -> Self {
        Self {
            inner,
            fields,
            rows: Vec::new().into_iter(),
            failed: false,
        }
    }

    pub fn fields(&self) -> &FieldSelection {
        &self.fields
    }

    fn project(&self, row: &OutputRow) -> Result<Vec<FieldValue>, InferenceError> {
        self.fields
            .iter()
            .map(|field| {
                row.project(*field)
                    .ok_or(InferenceError::FieldUnavailable(*field))
            })
            .collect()
    }
}

impl<M: GradientMachine, I: Iterator<Item = Sample>> Iterator for FieldIter<'_, M, I> {
    type Item = Result<Vec<FieldValue>, InferenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(row) = self.rows.next() {
                let projected = self.project(&row);
                if projected.is_err() {
                    self.failed = true;
                    if let Err(e) = self.inner.close() {
                        log::error!("Failed to finish gradient machine after an error: {e}");
                    }
                }
                return Some(projected);
            }
            match self.inner.next()? {
                Ok(rows) => self.rows = rows.into_iter(),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
