use std::sync::Arc;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    CachingCons, CachingProd, HeapRb,
};

/// Transport between the real-time audio callback and the analysis thread.
/// Lock-free Single-Producer Single-Consumer ring buffer carrying mono
/// samples.
///
/// Unlike a playback buffer, this is a telemetry path: when the analysis
/// thread falls behind, excess samples are discarded instead of making the
/// producer wait. The audio callback must never block here.
pub struct SampleBufferProducer {
    inner: CachingProd<Arc<HeapRb<f32>>>,
    dropped: u64,
}

/// Consumer handle drained by the analysis thread.
pub struct SampleBufferConsumer {
    inner: CachingCons<Arc<HeapRb<f32>>>,
}

impl SampleBufferProducer {
    /// Queues mono samples for analysis. Samples that do not fit are
    /// discarded. Returns the number of samples actually queued.
    pub fn push_samples(&mut self, samples: &[f32]) -> usize {
        let pushed = self.inner.push_slice(samples);
        self.dropped += (samples.len() - pushed) as u64;
        pushed
    }

    /// Total samples discarded because the buffer was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    /// Free space remaining, in samples.
    pub fn vacant_len(&self) -> usize {
        self.inner.vacant_len()
    }
}

impl SampleBufferConsumer {
    /// Pops queued samples into `out`. Returns the number popped.
    pub fn pop_samples(&mut self, out: &mut [f32]) -> usize {
        self.inner.pop_slice(out)
    }

    /// Number of samples currently queued.
    pub fn occupied_len(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Discards everything currently queued.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Creates the tap-to-analysis buffer with the given capacity in mono
/// samples. Returns a (Producer, Consumer) pair.
pub fn create_sample_buffer(capacity: usize) -> (SampleBufferProducer, SampleBufferConsumer) {
    let rb = HeapRb::<f32>::new(capacity);
    let (prod, cons) = rb.split();
    (
        SampleBufferProducer {
            inner: prod,
            dropped: 0,
        },
        SampleBufferConsumer { inner: cons },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_round_trip_in_order() {
        let (mut prod, mut cons) = create_sample_buffer(8);
        assert_eq!(prod.push_samples(&[1.0, 2.0, 3.0]), 3);

        let mut out = [0.0f32; 8];
        let n = cons.pop_samples(&mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn overflow_drops_instead_of_blocking() {
        let (mut prod, mut cons) = create_sample_buffer(4);
        let pushed = prod.push_samples(&[0.0; 10]);
        assert_eq!(pushed, 4);
        assert_eq!(prod.dropped_samples(), 6);

        // The queued samples are still intact.
        assert_eq!(cons.occupied_len(), 4);
    }

    #[test]
    fn clear_discards_queued_samples() {
        let (mut prod, mut cons) = create_sample_buffer(8);
        prod.push_samples(&[1.0; 5]);
        cons.clear();
        assert_eq!(cons.occupied_len(), 0);
        assert_eq!(prod.vacant_len(), 8);
    }
}
