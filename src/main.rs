use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use viz_engine::engine::config::VizConfig;
use viz_engine::engine::dispatch::{EnergySink, SinkError};
use viz_engine::engine::engine::VisualizerEngine;

/// Prints a coarse terminal meter for every delivered energy sample.
struct ConsoleMeter;

impl EnergySink for ConsoleMeter {
    fn receive(&self, spectrum: &[f32], total_energy: f32) -> Result<(), SinkError> {
        let average = total_energy / spectrum.len().max(1) as f32;
        let width = ((average * 4.0).min(1.0) * 50.0) as usize;
        print!("\r[{:<50}] energy {:>12.2}", "#".repeat(width), total_energy);
        std::io::stdout().flush()?;
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut engine = VisualizerEngine::new(VizConfig::default())?;
    engine.subscribe(Arc::new(ConsoleMeter));
    let mut tap = engine.tap()?;

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;
    println!("Capturing from: {}", device.name()?);

    let config: cpal::StreamConfig = device.default_input_config()?.into();
    let sample_rate = config.sample_rate;
    let channels = config.channels as usize;

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            tap.feed(sample_rate, channels, data);
        },
        |err| log::error!("input stream error: {}", err),
        None,
    )?;
    stream.play()?;

    println!("Visualizing input... press Enter to stop.");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    drop(stream);
    engine.stop();
    println!();
    Ok(())
}
