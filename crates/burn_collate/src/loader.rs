//! Batch iteration over a sample source with collation.

use std::marker::PhantomData;
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::bundle::FormatBundle;
use crate::collate::collate_samples;
use crate::config::CollateConfig;
use crate::types::{CollateError, CollateResult};
use crate::value::Value;

/// Random-access view over per-sample records.
pub trait SampleSource<B: Backend> {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> CollateResult<Value<B>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B: Backend> SampleSource<B> for Vec<Value<B>> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> CollateResult<Value<B>> {
        self.as_slice()
            .get(index)
            .cloned()
            .ok_or(CollateError::IndexOutOfRange {
                index,
                len: self.as_slice().len(),
            })
    }
}

pub struct CollateLoader<B: Backend, S: SampleSource<B>> {
    source: S,
    cfg: CollateConfig,
    bundle: Option<FormatBundle>,
    indices: Vec<usize>,
    cursor: usize,
    epoch: u64,
    processed_samples: usize,
    processed_batches: usize,
    dropped_samples: usize,
    started: Instant,
    total_collate_time: Duration,
    last_logged_batches: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend, S: SampleSource<B>> CollateLoader<B, S> {
    pub fn new(source: S, cfg: CollateConfig) -> CollateResult<Self> {
        cfg.validate()?;
        let indices = (0..source.len()).collect();
        let seed = cfg.seed;
        let mut loader = Self {
            source,
            cfg,
            bundle: None,
            indices,
            cursor: 0,
            epoch: 0,
            processed_samples: 0,
            processed_batches: 0,
            dropped_samples: 0,
            started: Instant::now(),
            total_collate_time: Duration::ZERO,
            last_logged_batches: 0,
            _backend: PhantomData,
        };
        loader.shuffle(seed);
        Ok(loader)
    }

    /// Wraps each sample with `bundle` before collation.
    pub fn with_bundle(mut self, bundle: FormatBundle) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Rewinds for a new epoch and reshuffles.
    ///
    /// An explicit `seed` is used as is. Otherwise a configured seed is offset
    /// by the epoch number, so seeded runs get a fresh but reproducible order
    /// every epoch.
    pub fn reset(&mut self, seed: Option<u64>) {
        self.cursor = 0;
        self.epoch += 1;
        self.indices = (0..self.source.len()).collect();
        let seed = seed.or_else(|| self.cfg.seed.map(|s| s.wrapping_add(self.epoch)));
        self.shuffle(seed);
    }

    /// Number of `reset` calls since construction.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn shuffle(&mut self, seed: Option<u64>) {
        if !self.cfg.shuffle {
            return;
        }
        let mut rng = match seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        self.indices.shuffle(&mut rng);
    }

    pub fn config(&self) -> &CollateConfig {
        &self.cfg
    }

    /// Sample order for the current epoch.
    pub fn order(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Batches per epoch. An incomplete tail counts only if it is kept and
    /// splits evenly across devices.
    pub fn num_batches(&self) -> usize {
        let batch_size = self.cfg.batch_size();
        let n = self.source.len();
        let full = n / batch_size;
        let tail = n % batch_size;
        let keeps_tail = !self.cfg.drop_last && tail > 0 && tail % self.cfg.samples_per_gpu == 0;
        full + usize::from(keeps_tail)
    }

    pub fn dropped_samples(&self) -> usize {
        self.dropped_samples
    }

    pub fn next_batch(&mut self) -> CollateResult<Option<Value<B>>> {
        if self.cursor >= self.indices.len() {
            return Ok(None);
        }
        let batch_size = self.cfg.batch_size();
        let samples_per_gpu = self.cfg.samples_per_gpu;
        let start = self.cursor;
        let end = (start + batch_size).min(self.indices.len());
        self.cursor = end;

        let len = end - start;
        if len < batch_size {
            if self.cfg.drop_last {
                self.dropped_samples += len;
                return Ok(None);
            }
            if len % samples_per_gpu != 0 {
                warn!(
                    samples = len,
                    samples_per_gpu, "dropping final batch that does not split evenly across devices"
                );
                self.dropped_samples += len;
                return Ok(None);
            }
        }

        let samples = self.indices[start..end]
            .iter()
            .map(|&index| {
                let sample = self.source.get(index)?;
                match &self.bundle {
                    Some(bundle) => bundle.apply(sample),
                    None => Ok(sample),
                }
            })
            .collect::<CollateResult<Vec<_>>>()?;

        let t_collate = Instant::now();
        let batch = collate_samples(samples, samples_per_gpu)?;
        self.total_collate_time += t_collate.elapsed();
        self.processed_samples += len;
        self.processed_batches += 1;
        self.maybe_log_progress();
        Ok(Some(batch))
    }

    fn maybe_log_progress(&mut self) {
        let Some(every) = self.cfg.log_every else {
            return;
        };
        if self.processed_batches - self.last_logged_batches < every {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        let avg_collate_ms =
            (self.total_collate_time.as_secs_f64() * 1000.0) / self.processed_batches as f64;
        info!(
            batches = self.processed_batches,
            samples = self.processed_samples,
            dropped = self.dropped_samples,
            elapsed_s = secs,
            rate = self.processed_samples as f32 / secs,
            avg_collate_ms,
            "collate loader progress"
        );
        self.last_logged_batches = self.processed_batches;
    }
}

impl<B: Backend, S: SampleSource<B>> Iterator for CollateLoader<B, S> {
    type Item = CollateResult<Value<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}
