use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::buffer::{create_sample_buffer, SampleBufferProducer};
use crate::engine::config::VizConfig;
use crate::engine::dispatch::{DispatcherHandle, EnergyDispatcher, EnergyRelay, EnergySink};
use crate::engine::error::VizError;
use crate::engine::fft::{mix_to_mono, SpectrumAnalyzer};
use crate::engine::spectral::bands::{BandMapper, BandSmoother, BAND_COUNT};
use crate::engine::spectral::SpectralEnergyProcessor;

/// Handle moved into the external audio callback.
///
/// Mixes incoming interleaved PCM down to mono and queues it for the
/// analysis thread. `feed` never blocks and never allocates after the
/// first call, so it is safe inside a real-time callback.
pub struct AudioTap {
    producer: SampleBufferProducer,
    sample_rate: Arc<AtomicU32>,
    enabled: Arc<AtomicBool>,
    mono: Vec<f32>,
    last_rate: u32,
    last_channels: usize,
}

impl AudioTap {
    /// Feeds one callback's worth of interleaved samples. The sample rate
    /// and channel count ride along with the data; the engine only uses
    /// them for mixdown and window bookkeeping.
    pub fn feed(&mut self, sample_rate: u32, channel_count: usize, interleaved: &[f32]) {
        if channel_count == 0 || interleaved.is_empty() {
            return;
        }
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }

        if sample_rate != self.last_rate || channel_count != self.last_channels {
            log::trace!("tap format: {} Hz, {} ch", sample_rate, channel_count);
            self.last_rate = sample_rate;
            self.last_channels = channel_count;
        }
        self.sample_rate.store(sample_rate, Ordering::Relaxed);

        self.mono.clear();
        mix_to_mono(interleaved, channel_count, &mut self.mono);
        let queued = self.producer.push_samples(&self.mono);
        if queued < self.mono.len() {
            log::trace!(
                "analysis buffer full, dropped {} samples",
                self.mono.len() - queued
            );
        }
    }

    /// Total samples discarded because analysis fell behind.
    pub fn dropped_samples(&self) -> u64 {
        self.producer.dropped_samples()
    }
}

/// Owns the whole visualization pipeline: the tap-to-analysis buffer, the
/// analysis thread and the energy dispatcher.
///
/// There is deliberately no shared global instance; construct one engine
/// per audio source and let its owner decide the lifetime.
pub struct VisualizerEngine {
    dispatcher: EnergyDispatcher,
    tap: Option<AudioTap>,
    analysis_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    enabled: Arc<AtomicBool>,
    band_levels: Arc<Mutex<[f32; BAND_COUNT]>>,
}

impl VisualizerEngine {
    pub fn new(config: VizConfig) -> Result<Self, VizError> {
        config.validate()?;

        let (producer, mut consumer) = create_sample_buffer(config.buffer_capacity);
        let dispatcher = EnergyDispatcher::new();
        let publisher = dispatcher.handle();

        let is_running = Arc::new(AtomicBool::new(true));
        let enabled = Arc::new(AtomicBool::new(true));
        let sample_rate = Arc::new(AtomicU32::new(0));
        let band_levels = Arc::new(Mutex::new([0.0f32; BAND_COUNT]));

        let tap = AudioTap {
            producer,
            sample_rate: sample_rate.clone(),
            enabled: enabled.clone(),
            mono: Vec::new(),
            last_rate: 0,
            last_channels: 0,
        };

        let run_flag = is_running.clone();
        let enabled_flag = enabled.clone();
        let band_slot = band_levels.clone();

        let analysis_thread = thread::spawn(move || {
            let mut analyzer = SpectrumAnalyzer::new(config.fft_size);
            let relay = EnergyRelay::new(
                SpectralEnergyProcessor::new(config.spectrum_capacity, config.gain),
                publisher,
            );
            let mapper = BandMapper::new(config.fft_size);
            let mut smoother = BandSmoother::new(config.band_smoothing);
            let mut drain = vec![0.0f32; config.fft_size.min(2048)];
            let mut was_enabled = true;

            while run_flag.load(Ordering::Relaxed) {
                if !enabled_flag.load(Ordering::Relaxed) {
                    if was_enabled {
                        analyzer.reset();
                        smoother.reset();
                        if let Ok(mut levels) = band_slot.lock() {
                            *levels = [0.0; BAND_COUNT];
                        }
                        was_enabled = false;
                    }
                    consumer.clear();
                    thread::sleep(Duration::from_millis(10));
                    continue;
                }
                was_enabled = true;

                let popped = consumer.pop_samples(&mut drain);
                if popped == 0 {
                    thread::sleep(Duration::from_millis(5));
                    continue;
                }

                let rate = sample_rate.load(Ordering::Relaxed);
                analyzer.push_samples(rate, &drain[..popped], |magnitudes| {
                    // Analysis runs on the mono mixdown.
                    relay.on_frame(rate, 1, magnitudes);

                    let mapped = mapper.map(magnitudes, rate);
                    let smoothed = smoother.smooth(&mapped);
                    if let Ok(mut levels) = band_slot.lock() {
                        *levels = smoothed;
                    }
                });
            }
        });

        Ok(Self {
            dispatcher,
            tap: Some(tap),
            analysis_thread: Some(analysis_thread),
            is_running,
            enabled,
            band_levels,
        })
    }

    /// Takes the tap handle for the audio callback. There is exactly one
    /// producer; a second call fails.
    pub fn tap(&mut self) -> Result<AudioTap, VizError> {
        self.tap.take().ok_or(VizError::TapTaken)
    }

    /// Registers an energy sink. Delivery order follows registration order.
    pub fn subscribe(&self, sink: Arc<dyn EnergySink>) {
        self.dispatcher.subscribe(sink);
    }

    /// Removes every registration of `sink`. No-op if it was never added.
    pub fn unsubscribe(&self, sink: &Arc<dyn EnergySink>) {
        self.dispatcher.unsubscribe(sink);
    }

    /// Control surface for threads and sinks that manage their own
    /// registration.
    pub fn dispatcher_handle(&self) -> DispatcherHandle {
        self.dispatcher.handle()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Suspends analysis. Queued and future samples are discarded and the
    /// band levels fall back to zero until re-enabled.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Latest smoothed 31-band loudness snapshot, each value in 0.0..=1.0.
    pub fn band_levels(&self) -> [f32; BAND_COUNT] {
        match self.band_levels.lock() {
            Ok(levels) => *levels,
            Err(_) => [0.0; BAND_COUNT],
        }
    }

    /// Stops the analysis and delivery threads. Called automatically on
    /// drop; safe to call more than once.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.analysis_thread.take() {
            let _ = handle.join();
        }
        // The dispatcher joins its delivery thread when dropped.
    }
}

impl Drop for VisualizerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_can_only_be_taken_once() {
        let mut engine = VisualizerEngine::new(VizConfig::default()).unwrap();
        assert!(engine.tap().is_ok());
        assert!(matches!(engine.tap(), Err(VizError::TapTaken)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = VizConfig {
            fft_size: 777,
            ..Default::default()
        };
        assert!(VisualizerEngine::new(config).is_err());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut engine = VisualizerEngine::new(VizConfig::default()).unwrap();
        engine.stop();
        engine.stop();
    }

    #[test]
    fn disabled_tap_drops_input() {
        let mut engine = VisualizerEngine::new(VizConfig::default()).unwrap();
        let mut tap = engine.tap().unwrap();

        engine.disable();
        assert!(!engine.is_enabled());
        tap.feed(44_100, 1, &[0.5; 512]);
        // Nothing was queued, so nothing was dropped either.
        assert_eq!(tap.dropped_samples(), 0);

        engine.enable();
        assert!(engine.is_enabled());
    }
}
