//! Real-time spectral-energy visualization engine.
//!
//! Taps interleaved PCM from an audio callback, runs a windowed FFT on a
//! dedicated analysis thread and fans the resulting energy data out to
//! registered sinks on a single delivery thread.

pub mod engine;
