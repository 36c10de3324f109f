//! Microphone-driven speaking-rate source.
//!
//! The capture stream lives on its own thread for its whole lifetime; the
//! audio callback runs the [`RateEstimator`] and publishes each new
//! [`RateState`] through a [`RateHandle`]. Failures never propagate: they
//! end up as [`MicPermission::Denied`] and a zero rate.

use super::rate::{RateConfig, RateState};
use super::{MicPermission, RateHandle};
use log::{debug, info, warn};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

pub struct MicSpeechRate {
    config: RateConfig,
    permission: MicPermission,
    rate: RateHandle,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MicSpeechRate {
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            permission: MicPermission::Idle,
            rate: RateHandle::default(),
            stop_tx: None,
            worker: None,
        }
    }

    /// Handle the session polls for the latest rate.
    pub fn rate_handle(&self) -> RateHandle {
        self.rate.clone()
    }

    pub fn permission(&self) -> MicPermission {
        self.permission
    }

    pub fn is_listening(&self) -> bool {
        self.worker.is_some()
    }

    /// Acquire the default input device and start estimating.
    pub fn start(&mut self) -> MicPermission {
        if self.worker.is_some() {
            debug!("Microphone already listening");
            return self.permission;
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let config = self.config;
        let rate = self.rate.clone();

        let worker = thread::spawn(move || capture::run(config, rate, ready_tx, stop_rx));

        self.permission = match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Microphone capture started");
                self.stop_tx = Some(stop_tx);
                self.worker = Some(worker);
                MicPermission::Granted
            }
            Ok(Err(e)) => {
                warn!("Microphone unavailable: {}", e);
                let _ = worker.join();
                MicPermission::Denied
            }
            Err(_) => {
                warn!("Microphone worker exited before reporting readiness");
                let _ = worker.join();
                MicPermission::Denied
            }
        };
        self.permission
    }

    /// Release the device. The published rate drops back to zero.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            debug!("Microphone capture stopped");
        }
        self.rate.publish(RateState::default());
    }
}

impl Drop for MicSpeechRate {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "mic")]
mod capture {
    use super::super::dsp::downmix;
    use super::super::rate::{RateConfig, RateEstimator};
    use super::super::RateHandle;
    use anyhow::{anyhow, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::SampleFormat;
    use log::{error, info};
    use std::sync::mpsc;

    pub(super) fn run(
        config: RateConfig,
        rate: RateHandle,
        ready_tx: mpsc::Sender<Result<(), String>>,
        stop_rx: mpsc::Receiver<()>,
    ) {
        let stream = match open_stream(config, rate) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(format!("Failed to start input stream: {}", e)));
            return;
        }
        let _ = ready_tx.send(Ok(()));

        // Blocks until stop() or until the owner is dropped
        let _ = stop_rx.recv();
        drop(stream);
    }

    fn open_stream(config: RateConfig, rate: RateHandle) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;
        let supported = device
            .default_input_config()
            .map_err(|e| anyhow!("Failed to query input config: {}", e))?;

        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.config();
        let channels = stream_config.channels as usize;
        let sample_rate = stream_config.sample_rate.0;

        info!(
            "Opening input device {:?} at {}Hz, {} channel(s), {:?}",
            device.name().unwrap_or_default(),
            sample_rate,
            channels,
            sample_format
        );

        let mut estimator = RateEstimator::new(sample_rate, config);
        let err_fn = |e: cpal::StreamError| error!("Input stream error: {}", e);

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix(data, channels);
                    rate.publish(estimator.push_samples(&mono));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    let mono = downmix(&floats, channels);
                    rate.publish(estimator.push_samples(&mono));
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> = data
                        .iter()
                        .map(|&s| (s as f32 - 32_768.0) / 32_768.0)
                        .collect();
                    let mono = downmix(&floats, channels);
                    rate.publish(estimator.push_samples(&mono));
                },
                err_fn,
                None,
            ),
            other => return Err(anyhow!("Unsupported sample format: {:?}", other)),
        }
        .map_err(|e| anyhow!("Failed to build input stream: {}", e))?;

        Ok(stream)
    }
}

#[cfg(not(feature = "mic"))]
mod capture {
    use super::super::rate::RateConfig;
    use super::super::RateHandle;
    use std::sync::mpsc;

    pub(super) fn run(
        _config: RateConfig,
        _rate: RateHandle,
        ready_tx: mpsc::Sender<Result<(), String>>,
        _stop_rx: mpsc::Receiver<()>,
    ) {
        let _ = ready_tx.send(Err(
            "built without the `mic` feature; no capture backend available".to_string(),
        ));
    }
}
