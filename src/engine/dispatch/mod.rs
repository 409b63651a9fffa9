use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::engine::spectral::{EnergySample, SpectralEnergyProcessor};

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Capability implemented by visualization consumers.
///
/// `receive` runs on the dispatcher's delivery thread. Implementations may
/// subscribe or unsubscribe other sinks from inside `receive`; the registry
/// lock is never held while sinks run, so this cannot deadlock.
pub trait EnergySink: Send + Sync {
    fn receive(&self, spectrum: &[f32], total_energy: f32) -> Result<(), SinkError>;
}

enum DeliverySignal {
    Publish,
    Shutdown,
}

struct DispatchShared {
    /// Registration order is delivery order. Duplicate registrations are
    /// permitted; `unsubscribe` removes every entry for the given sink.
    sinks: Mutex<Vec<Arc<dyn EnergySink>>>,
    /// Latest-wins slot. A publish that lands before the delivery thread
    /// wakes up simply replaces the pending sample.
    latest: Mutex<Option<EnergySample>>,
}

/// Fans energy samples out to registered sinks on one dedicated delivery
/// thread.
///
/// Publishing is fire-and-forget: the producer stores the sample and
/// signals the delivery thread without ever waiting for sinks. When samples
/// arrive faster than sinks can run, intermediate samples are superseded
/// and only the most recent is delivered.
pub struct EnergyDispatcher {
    shared: Arc<DispatchShared>,
    signal_tx: Sender<DeliverySignal>,
    delivery_thread: Option<JoinHandle<()>>,
}

/// Cheap cloneable control surface over a dispatcher, for worker threads
/// and for sinks that mutate the registry from inside `receive`.
#[derive(Clone)]
pub struct DispatcherHandle {
    shared: Arc<DispatchShared>,
    signal_tx: Sender<DeliverySignal>,
}

impl EnergyDispatcher {
    pub fn new() -> Self {
        let shared = Arc::new(DispatchShared {
            sinks: Mutex::new(Vec::new()),
            latest: Mutex::new(None),
        });
        let (signal_tx, signal_rx) = mpsc::channel();

        let thread_shared = shared.clone();
        let delivery_thread = thread::spawn(move || {
            delivery_loop(&thread_shared, &signal_rx);
        });

        Self {
            shared,
            signal_tx,
            delivery_thread: Some(delivery_thread),
        }
    }

    /// Appends `sink` to the registry unless it is already the most
    /// recently added entry. Delivery happens in registration order; a sink
    /// registered more than once (interleaved with others) is delivered to
    /// once per registration.
    pub fn subscribe(&self, sink: Arc<dyn EnergySink>) {
        subscribe_shared(&self.shared, sink);
    }

    /// Removes every registration of `sink` (matched by pointer identity).
    /// No-op when the sink was never registered.
    pub fn unsubscribe(&self, sink: &Arc<dyn EnergySink>) {
        unsubscribe_shared(&self.shared, sink);
    }

    /// Queues `sample` for delivery and returns immediately. Supersedes any
    /// sample the delivery thread has not picked up yet.
    pub fn publish(&self, sample: EnergySample) {
        publish_shared(&self.shared, &self.signal_tx, sample);
    }

    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            shared: self.shared.clone(),
            signal_tx: self.signal_tx.clone(),
        }
    }
}

impl Default for EnergyDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EnergyDispatcher {
    fn drop(&mut self) {
        let _ = self.signal_tx.send(DeliverySignal::Shutdown);
        if let Some(handle) = self.delivery_thread.take() {
            let _ = handle.join();
        }
    }
}

impl DispatcherHandle {
    pub fn subscribe(&self, sink: Arc<dyn EnergySink>) {
        subscribe_shared(&self.shared, sink);
    }

    pub fn unsubscribe(&self, sink: &Arc<dyn EnergySink>) {
        unsubscribe_shared(&self.shared, sink);
    }

    /// Same semantics as [`EnergyDispatcher::publish`]. Publishing after
    /// the dispatcher was dropped is a silent no-op.
    pub fn publish(&self, sample: EnergySample) {
        publish_shared(&self.shared, &self.signal_tx, sample);
    }
}

/// Entry point for periodic frequency-frame callbacks: transforms raw
/// magnitudes and publishes the result in one step.
///
/// The source's sample rate and channel count ride along for logging only;
/// the energy path does not depend on them.
pub struct EnergyRelay {
    processor: SpectralEnergyProcessor,
    publisher: DispatcherHandle,
}

impl EnergyRelay {
    pub fn new(processor: SpectralEnergyProcessor, publisher: DispatcherHandle) -> Self {
        Self {
            processor,
            publisher,
        }
    }

    pub fn on_frame(&self, sample_rate: u32, channel_count: usize, frame: &[f32]) {
        log::trace!(
            "frequency frame: {} bins at {} Hz, {} ch",
            frame.len(),
            sample_rate,
            channel_count
        );
        self.publisher.publish(self.processor.transform(frame));
    }
}

fn subscribe_shared(shared: &DispatchShared, sink: Arc<dyn EnergySink>) {
    if let Ok(mut sinks) = shared.sinks.lock() {
        // Guard against accidental back-to-back double registration. The
        // same sink can still appear more than once when interleaved with
        // others; full idempotency is the caller's responsibility.
        if sinks.last().is_some_and(|last| Arc::ptr_eq(last, &sink)) {
            return;
        }
        sinks.push(sink);
    }
}

fn unsubscribe_shared(shared: &DispatchShared, sink: &Arc<dyn EnergySink>) {
    if let Ok(mut sinks) = shared.sinks.lock() {
        sinks.retain(|registered| !Arc::ptr_eq(registered, sink));
    }
}

fn publish_shared(
    shared: &DispatchShared,
    signal_tx: &Sender<DeliverySignal>,
    sample: EnergySample,
) {
    if let Ok(mut slot) = shared.latest.lock() {
        *slot = Some(sample);
    }
    let _ = signal_tx.send(DeliverySignal::Publish);
}

fn delivery_loop(shared: &DispatchShared, signal_rx: &Receiver<DeliverySignal>) {
    loop {
        match signal_rx.recv() {
            Ok(DeliverySignal::Publish) => deliver_latest(shared),
            Ok(DeliverySignal::Shutdown) | Err(_) => break,
        }
    }
}

fn deliver_latest(shared: &DispatchShared) {
    let sample = match shared.latest.lock() {
        // None means a newer publish already consumed this wake-up.
        Ok(mut slot) => match slot.take() {
            Some(sample) => sample,
            None => return,
        },
        Err(_) => return,
    };

    // Snapshot under the lock, iterate outside it: registry mutation and
    // re-entrant subscribe/unsubscribe calls never interleave with the
    // delivery loop.
    let snapshot: Vec<Arc<dyn EnergySink>> = match shared.sinks.lock() {
        Ok(sinks) => sinks.clone(),
        Err(_) => return,
    };

    for sink in snapshot {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            sink.receive(&sample.spectrum, sample.total_energy)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("energy sink failed: {err}"),
            Err(_) => log::error!("energy sink panicked during delivery"),
        }
    }
}
