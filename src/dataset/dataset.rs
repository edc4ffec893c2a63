// Copyright 2019 The T5 Authors.
// Copyright 2020 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::error::T5DataError;
use crate::dataset::Example;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Boxed stream of examples produced by one pass over a `Dataset`
pub type ExampleIterator = Box<dyn Iterator<Item = Result<Example, T5DataError>> + Send>;

type SourceFn = dyn Fn() -> ExampleIterator + Send + Sync;

/// # Lazy, re-iterable stream of examples
/// A `Dataset` describes how to produce examples rather than holding them: every call to `iter`
/// replays the full pipeline from its source. Transformations return a new `Dataset` and are
/// cheap to build; work only happens while iterating. Errors raised by a stage are yielded in
/// place of the example that caused them.
///
/// # Example
///
/// ```no_run
/// use t5_data::dataset::{Dataset, Example};
/// # fn main() -> Result<(), t5_data::T5DataError> {
/// let dataset = Dataset::from_examples(vec![
///     Example::new().with("inputs", "a").with("targets", "b"),
///     Example::new().with("inputs", "c").with("targets", "d"),
/// ]);
/// let swapped = dataset.map(|example| {
///     Ok(Example::new()
///         .with("inputs", example.text("targets")?)
///         .with("targets", example.text("inputs")?))
/// });
/// let examples = swapped.shuffle(10, Some(0)).collect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dataset {
    source: Arc<SourceFn>,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset").finish()
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

const PASS_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Random generators for successive passes over a dataset. Pass `n` of a seeded dataset is
/// seeded from `seed` and `n`: the order changes from one pass to the next but the sequence of
/// passes is reproducible.
pub(crate) struct PassRng {
    seed: Option<u64>,
    passes: AtomicU64,
}

impl PassRng {
    pub(crate) fn new(seed: Option<u64>) -> PassRng {
        PassRng {
            seed,
            passes: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_rng(&self) -> StdRng {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed);
        seeded_rng(
            self.seed
                .map(|seed| seed.wrapping_add(pass.wrapping_mul(PASS_SEED_STRIDE))),
        )
    }
}

impl Dataset {
    /// Creates a dataset from a function producing a fresh iterator for every pass
    pub fn from_fn<F>(source: F) -> Dataset
    where
        F: Fn() -> ExampleIterator + Send + Sync + 'static,
    {
        Dataset {
            source: Arc::new(source),
        }
    }

    pub fn empty() -> Dataset {
        Dataset::from_fn(|| -> ExampleIterator { Box::new(std::iter::empty()) })
    }

    /// Creates a dataset replaying the given in-memory examples
    pub fn from_examples(examples: Vec<Example>) -> Dataset {
        let examples = Arc::new(examples);
        Dataset::from_fn(move || -> ExampleIterator {
            let examples = examples.clone();
            Box::new((0..examples.len()).map(move |index| -> Result<Example, T5DataError> {
                Ok(examples[index].clone())
            }))
        })
    }

    /// Creates a dataset reading one JSON example per line from `path`. Blank lines are skipped.
    /// The file is opened at the start of every pass; failures are yielded as errors.
    pub fn from_jsonl<P: AsRef<Path>>(path: P) -> Dataset {
        let path = path.as_ref().to_path_buf();
        Dataset::from_fn(move || -> ExampleIterator {
            match File::open(&path) {
                Ok(file) => {
                    let path = path.clone();
                    Box::new(
                        BufReader::new(file)
                            .lines()
                            .enumerate()
                            .filter_map(move |(line_num, line)| parse_line(&path, line_num, line)),
                    )
                }
                Err(e) => Box::new(std::iter::once(Err::<Example, T5DataError>(
                    T5DataError::IOError(format!("Failed to open {}: {}", path.display(), e)),
                ))),
            }
        })
    }

    /// Starts a new pass over the dataset
    pub fn iter(&self) -> ExampleIterator {
        (self.source)()
    }

    /// Runs a full pass and gathers every example, stopping at the first error.
    /// Never returns for infinite (repeated) datasets.
    pub fn collect(&self) -> Result<Vec<Example>, T5DataError> {
        self.iter().collect()
    }

    /// Gathers at most `count` examples from a new pass
    pub fn take_examples(&self, count: usize) -> Result<Vec<Example>, T5DataError> {
        self.iter().take(count).collect()
    }

    pub fn map<F>(&self, f: F) -> Dataset
    where
        F: Fn(Example) -> Result<Example, T5DataError> + Send + Sync + 'static,
    {
        let source = self.source.clone();
        let f = Arc::new(f);
        Dataset::from_fn(move || -> ExampleIterator {
            let f = f.clone();
            Box::new(source().map(move |example| example.and_then(|example| f(example))))
        })
    }

    /// Keeps the examples matching the predicate. Errors are always kept.
    pub fn filter<F>(&self, predicate: F) -> Dataset
    where
        F: Fn(&Example) -> bool + Send + Sync + 'static,
    {
        let source = self.source.clone();
        let predicate = Arc::new(predicate);
        Dataset::from_fn(move || -> ExampleIterator {
            let predicate = predicate.clone();
            Box::new(source().filter(move |example| match example {
                Ok(example) => predicate(example),
                Err(_) => true,
            }))
        })
    }

    /// Maps every example to zero or more examples
    pub fn flat_map<F>(&self, f: F) -> Dataset
    where
        F: Fn(Example) -> Result<Vec<Example>, T5DataError> + Send + Sync + 'static,
    {
        let source = self.source.clone();
        let f = Arc::new(f);
        Dataset::from_fn(move || -> ExampleIterator {
            let f = f.clone();
            Box::new(source().flat_map(
                move |example| -> Vec<Result<Example, T5DataError>> {
                    match example.and_then(|example| f(example)) {
                        Ok(examples) => examples.into_iter().map(Ok).collect(),
                        Err(e) => vec![Err(e)],
                    }
                },
            ))
        })
    }

    pub fn take(&self, count: usize) -> Dataset {
        let source = self.source.clone();
        Dataset::from_fn(move || -> ExampleIterator { Box::new(source().take(count)) })
    }

    pub fn skip(&self, count: usize) -> Dataset {
        let source = self.source.clone();
        Dataset::from_fn(move || -> ExampleIterator { Box::new(source().skip(count)) })
    }

    /// Appends the examples of `other` after the examples of `self`
    pub fn concatenate(&self, other: &Dataset) -> Dataset {
        let first = self.source.clone();
        let second = other.source.clone();
        Dataset::from_fn(move || -> ExampleIterator { Box::new(first().chain(second())) })
    }

    /// Replays the dataset indefinitely. A pass that yields nothing ends the iteration, so
    /// repeating an empty dataset stays empty.
    pub fn repeat(&self) -> Dataset {
        let source = self.source.clone();
        Dataset::from_fn(move || -> ExampleIterator {
            Box::new(Repeat {
                source: source.clone(),
                current: source(),
                yielded: false,
            })
        })
    }

    /// Shuffles with a buffer of `buffer_size` examples: the buffer is filled from the
    /// underlying stream and each output is drawn uniformly from it. A buffer at least as large
    /// as the dataset gives a uniform permutation. Every pass is shuffled differently; with a
    /// seed, the orders of successive passes are reproducible.
    pub fn shuffle(&self, buffer_size: usize, seed: Option<u64>) -> Dataset {
        let source = self.source.clone();
        let buffer_size = buffer_size.max(1);
        let pass_rng = Arc::new(PassRng::new(seed));
        Dataset::from_fn(move || -> ExampleIterator {
            Box::new(Shuffle {
                inner: source(),
                buffer: Vec::with_capacity(buffer_size.min(4096)),
                buffer_size,
                rng: pass_rng.next_rng(),
                exhausted: false,
            })
        })
    }

    /// Cycles through `cycle_length` datasets at a time, taking `block_length` consecutive
    /// examples from each before moving to the next. An exhausted dataset is replaced by the next
    /// unopened one.
    pub fn interleave(datasets: Vec<Dataset>, cycle_length: usize, block_length: usize) -> Dataset {
        let datasets = Arc::new(datasets);
        let cycle_length = cycle_length.max(1);
        let block_length = block_length.max(1);
        Dataset::from_fn(move || -> ExampleIterator {
            Box::new(Interleave {
                pending: datasets.iter().cloned().collect(),
                active: Vec::with_capacity(cycle_length),
                cycle_length,
                block_length,
                cursor: 0,
                emitted_in_block: 0,
            })
        })
    }

    /// Materializes the dataset in memory. Fails on the first error of the pass.
    pub fn cache(&self) -> Result<Dataset, T5DataError> {
        Ok(Dataset::from_examples(self.collect()?))
    }
}

fn parse_line(
    path: &Path,
    line_num: usize,
    line: io::Result<String>,
) -> Option<Result<Example, T5DataError>> {
    match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(|e| {
            T5DataError::SerializationError(format!(
                "{}:{}: {}",
                path.display(),
                line_num + 1,
                e
            ))
        })),
        Err(e) => Some(Err(T5DataError::IOError(format!(
            "Failed to read line {} of {}: {}",
            line_num + 1,
            path.display(),
            e
        )))),
    }
}

struct Repeat {
    source: Arc<SourceFn>,
    current: ExampleIterator,
    yielded: bool,
}

impl Iterator for Repeat {
    type Item = Result<Example, T5DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                self.yielded = true;
                return Some(item);
            }
            if !self.yielded {
                return None;
            }
            self.current = (self.source)();
            self.yielded = false;
        }
    }
}

struct Shuffle {
    inner: ExampleIterator,
    buffer: Vec<Result<Example, T5DataError>>,
    buffer_size: usize,
    rng: StdRng,
    exhausted: bool,
}

impl Iterator for Shuffle {
    type Item = Result<Example, T5DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.buffer.len() < self.buffer_size {
            match self.inner.next() {
                Some(item) => self.buffer.push(item),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(index))
    }
}

struct Interleave {
    pending: VecDeque<Dataset>,
    active: Vec<ExampleIterator>,
    cycle_length: usize,
    block_length: usize,
    cursor: usize,
    emitted_in_block: usize,
}

impl Iterator for Interleave {
    type Item = Result<Example, T5DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while self.active.len() < self.cycle_length {
                match self.pending.pop_front() {
                    Some(dataset) => self.active.push(dataset.iter()),
                    None => break,
                }
            }
            if self.active.is_empty() {
                return None;
            }
            if self.cursor >= self.active.len() {
                self.cursor = 0;
            }
            match self.active[self.cursor].next() {
                Some(item) => {
                    self.emitted_in_block += 1;
                    if self.emitted_in_block >= self.block_length {
                        self.emitted_in_block = 0;
                        self.cursor += 1;
                    }
                    return Some(item);
                }
                None => {
                    match self.pending.pop_front() {
                        Some(dataset) => self.active[self.cursor] = dataset.iter(),
                        None => {
                            self.active.remove(self.cursor);
                        }
                    }
                    self.emitted_in_block = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn numbered(range: std::ops::Range<i64>) -> Dataset {
        Dataset::from_examples(range.map(|i| Example::new().with("idx", i)).collect())
    }

    fn indices(examples: &[Example]) -> Vec<i64> {
        examples
            .iter()
            .map(|example| match example.get("idx") {
                Some(crate::dataset::Feature::Int(value)) => *value,
                _ => panic!("missing idx"),
            })
            .collect()
    }

    #[test]
    fn map_filter_flat_map() -> anyhow::Result<()> {
        let dataset = numbered(0..6)
            .filter(|example| example.get("idx") != Some(&crate::dataset::Feature::Int(3)))
            .map(|mut example| {
                example.insert("copy", "x");
                Ok(example)
            })
            .flat_map(|example| Ok(vec![example.clone(), example]));

        let examples = dataset.collect()?;
        assert_eq!(indices(&examples), vec![0, 0, 1, 1, 2, 2, 4, 4, 5, 5]);
        assert!(examples.iter().all(|example| example.contains_key("copy")));
        Ok(())
    }

    #[test]
    fn errors_flow_through_the_pipeline() {
        let dataset = numbered(0..3)
            .map(|example| {
                if example.get("idx") == Some(&crate::dataset::Feature::Int(1)) {
                    Err(T5DataError::ValidationError("bad example".to_string()))
                } else {
                    Ok(example)
                }
            })
            .filter(|_| false);

        let results: Vec<_> = dataset.iter().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(T5DataError::ValidationError(_))));
        assert!(dataset.collect().is_err());
    }

    #[test]
    fn dataset_is_reiterable() -> anyhow::Result<()> {
        let dataset = numbered(0..4).skip(1).take(2);
        assert_eq!(indices(&dataset.collect()?), vec![1, 2]);
        assert_eq!(indices(&dataset.collect()?), vec![1, 2]);
        Ok(())
    }

    #[test]
    fn repeat_cycles_and_stops_on_empty() -> anyhow::Result<()> {
        let repeated = numbered(0..3).repeat();
        assert_eq!(
            indices(&repeated.take_examples(7)?),
            vec![0, 1, 2, 0, 1, 2, 0]
        );
        assert!(Dataset::empty().repeat().collect()?.is_empty());
        Ok(())
    }

    #[test]
    fn seeded_shuffle_is_a_deterministic_permutation() -> anyhow::Result<()> {
        let dataset = numbered(0..50);
        let first = indices(&dataset.shuffle(100, Some(42)).collect()?);
        let second = indices(&dataset.shuffle(100, Some(42)).collect()?);
        assert_eq!(first, second);
        assert_ne!(first, (0..50).collect::<Vec<_>>());

        let mut sorted = first;
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn repeated_seeded_shuffle_changes_order_between_passes() -> anyhow::Result<()> {
        let epochs = indices(
            &numbered(0..20)
                .shuffle(100, Some(3))
                .repeat()
                .take_examples(40)?,
        );
        let (first, second) = epochs.split_at(20);
        assert_ne!(first, second);
        for epoch in &[first, second] {
            let mut sorted = epoch.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..20).collect::<Vec<_>>());
        }

        let replayed = indices(
            &numbered(0..20)
                .shuffle(100, Some(3))
                .repeat()
                .take_examples(40)?,
        );
        assert_eq!(epochs, replayed);
        Ok(())
    }

    #[test]
    fn small_shuffle_buffer_bounds_displacement() -> anyhow::Result<()> {
        let shuffled = indices(&numbered(0..100).shuffle(1, Some(7)).collect()?);
        assert_eq!(shuffled, (0..100).collect::<Vec<_>>());

        let shuffled = indices(&numbered(0..100).shuffle(4, Some(7)).collect()?);
        for (position, value) in shuffled.iter().enumerate() {
            assert!(*value <= position as i64 + 3);
        }
        Ok(())
    }

    #[test]
    fn interleave_blocks() -> anyhow::Result<()> {
        let interleaved = Dataset::interleave(vec![numbered(0..4), numbered(10..14)], 2, 2);
        assert_eq!(
            indices(&interleaved.collect()?),
            vec![0, 1, 10, 11, 2, 3, 12, 13]
        );

        let sequential = Dataset::interleave(
            vec![numbered(0..2), numbered(10..12), numbered(20..22)],
            1,
            16,
        );
        assert_eq!(
            indices(&sequential.collect()?),
            vec![0, 1, 10, 11, 20, 21]
        );
        Ok(())
    }

    #[test]
    fn interleave_refills_exhausted_slots() -> anyhow::Result<()> {
        let interleaved = Dataset::interleave(
            vec![numbered(0..1), numbered(10..13), numbered(20..22)],
            2,
            1,
        );
        let mut values = indices(&interleaved.collect()?);
        assert_eq!(values.len(), 6);
        assert_eq!(&values[..3], &[0, 10, 20]);
        values.sort_unstable();
        assert_eq!(values, vec![0, 10, 11, 12, 20, 21]);
        Ok(())
    }

    #[test]
    fn concatenate_and_cache() -> anyhow::Result<()> {
        let dataset = numbered(0..2).concatenate(&numbered(5..7)).cache()?;
        assert_eq!(indices(&dataset.collect()?), vec![0, 1, 5, 6]);
        Ok(())
    }

    #[test]
    fn jsonl_source() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.jsonl");
        let mut f = File::create(&path)?;
        writeln!(f, r#"{{"inputs": "a", "targets": "b"}}"#)?;
        writeln!(f)?;
        writeln!(f, r#"{{"inputs": "c", "targets": [1, 2]}}"#)?;

        let examples = Dataset::from_jsonl(&path).collect()?;
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].text("inputs")?, "a");
        assert_eq!(examples[1].tokens("targets")?, &[1, 2]);

        writeln!(f, "not json")?;
        drop(f);
        assert!(matches!(
            Dataset::from_jsonl(&path).collect(),
            Err(T5DataError::SerializationError(_))
        ));
        assert!(matches!(
            Dataset::from_jsonl(dir.path().join("missing.jsonl")).collect(),
            Err(T5DataError::IOError(_))
        ));
        Ok(())
    }
}
