use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// How samples are grouped into forward passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSize {
    /// One batch holding the whole input. The input must be finite.
    #[default]
    WholeInput,
    /// Batches of at most `n` samples; the last one may be shorter.
    Fixed(NonZeroUsize),
}

impl BatchSize {
    pub fn fixed(size: usize) -> Option<Self> {
        NonZeroUsize::new(size).map(BatchSize::Fixed)
    }
}

/// Lazily groups the items of an iterator into vectors of `size` items.
pub struct Batched<I: Iterator> {
    iter: I,
    size: NonZeroUsize,
}

impl<I: Iterator> Iterator for Batched<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<I::Item> = self.iter.by_ref().take(self.size.get()).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }
}

pub fn batch<I: IntoIterator>(iter: I, size: NonZeroUsize) -> Batched<I::IntoIter> {
    Batched {
        iter: iter.into_iter(),
        size,
    }
}

/// Batches produced according to a [`BatchSize`].
pub enum Batches<I: Iterator> {
    Whole(Option<Vec<I::Item>>),
    Fixed(Batched<I>),
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Batches::Whole(all) => all.take(),
            Batches::Fixed(batched) => batched.next(),
        }
    }
}

pub fn batches<I: IntoIterator>(input: I, size: BatchSize) -> Batches<I::IntoIter> {
    match size {
        BatchSize::WholeInput => {
            let all: Vec<I::Item> = input.into_iter().collect();
            Batches::Whole((!all.is_empty()).then_some(all))
        }
        BatchSize::Fixed(size) => Batches::Fixed(batch(input, size)),
    }
}
