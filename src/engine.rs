use crate::NATIVE_SAMPLE_RATE;
use crate::config::AudioConfig;
use crate::error::{Result, WadMixError};
use crate::events::AudioEvent;
use crate::sample::Stereo;
use crate::source::Source;
use crate::world::SoundWorld;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Channels in a mixed frame.
const OUTPUT_CHANNELS: usize = 2;

/// Drives a [`SoundWorld`] from the default output device.
///
/// The device callback locks the world for the duration of one buffer and
/// pulls native-rate stereo from it. Control calls from the game thread take
/// the same lock through [`AudioEngine::world`].
pub struct AudioEngine {
    config: AudioConfig,
    world: Arc<Mutex<SoundWorld>>,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
    event_sender: Sender<AudioEvent>,
    event_receiver: Receiver<AudioEvent>,
}

impl AudioEngine {
    /// Create a new audio engine with the given configuration. No device is
    /// opened until [`start`](Self::start).
    pub fn new(config: AudioConfig) -> Result<Self> {
        config.validate()?;
        let (event_sender, event_receiver) = bounded(config.event_capacity);
        let world = SoundWorld::new(&config, event_sender.clone());

        Ok(Self {
            config,
            world: Arc::new(Mutex::new(world)),
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
            event_sender,
            event_receiver,
        })
    }

    /// Shared handle to the live graph.
    pub fn world(&self) -> Arc<Mutex<SoundWorld>> {
        Arc::clone(&self.world)
    }

    pub fn events(&self) -> Receiver<AudioEvent> {
        self.event_receiver.clone()
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Opens the default output device and starts pulling the world.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            WadMixError::AudioDevice("No default output device available".into())
        })?;

        let default_config = device.default_output_config().map_err(|e| {
            WadMixError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        // The mix is stereo; open the device with its own channel layout and
        // map the pair onto it in `write_frames`.
        let config = cpal::StreamConfig {
            channels: default_config.channels().max(1),
            sample_rate: cpal::SampleRate(NATIVE_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Fixed(self.config.block_size as u32),
        };

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            other => {
                return Err(WadMixError::AudioDevice(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| WadMixError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Audio engine started at {} Hz, {} channels, {} frame blocks",
            NATIVE_SAMPLE_RATE,
            config.channels,
            self.config.block_size
        );
        let _ = self.event_sender.try_send(AudioEvent::EngineStarted);

        Ok(())
    }

    /// Stop the audio engine
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Audio engine stopped");
            let _ = self.event_sender.try_send(AudioEvent::EngineStopped);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Number of frames delivered to the device since creation.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let world = Arc::clone(&self.world);
        let is_running = Arc::clone(&self.is_running);
        let frames_processed = Arc::clone(&self.frames_processed);
        let errors = self.event_sender.clone();
        let mut mix = vec![Stereo::SILENCE; self.config.block_size];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        data.fill(T::from_sample(0.0f32));
                        return;
                    }

                    let frames = data.len() / channels;
                    if mix.len() < frames {
                        mix.resize(frames, Stereo::SILENCE);
                    }
                    let mix = &mut mix[..frames];

                    match world.lock() {
                        Ok(mut world) => {
                            world.generate(mix);
                        }
                        // A panicked control thread leaves the graph in an
                        // unknown state; play silence.
                        Err(_) => mix.fill(Stereo::SILENCE),
                    }

                    write_frames(data, channels, mix);
                    frames_processed.fetch_add(frames, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    let _ = errors.try_send(AudioEvent::StreamError {
                        error: err.to_string(),
                    });
                },
                None,
            )
            .map_err(|e| WadMixError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

/// Interleaves clamped stereo frames into a device buffer of `channels`
/// channels. A mono device gets the average of the pair; channels past the
/// front pair are silent.
fn write_frames<T>(data: &mut [T], channels: usize, mix: &[Stereo])
where
    T: SizedSample + FromSample<f32>,
{
    for (out, frame) in data.chunks_exact_mut(channels).zip(mix) {
        if let [mono] = out {
            *mono = T::from_sample(((frame[0] + frame[1]) * 0.5).clamp(-1.0, 1.0));
            continue;
        }
        for (c, sample) in out.iter_mut().enumerate() {
            let value = if c < OUTPUT_CHANNELS { frame[c] } else { 0.0 };
            *sample = T::from_sample(value.clamp(-1.0, 1.0));
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_is_idle() {
        let engine = AudioEngine::new(AudioConfig::new().sound_channels(4)).unwrap();
        assert!(!engine.is_running());
        assert_eq!(engine.frames_processed(), 0);
        assert_eq!(engine.world().lock().unwrap().sound_channels(), 4);
        assert!(engine.events().try_recv().is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(AudioEngine::new(AudioConfig::new().block_size(0)).is_err());
    }

    #[test]
    fn output_is_clamped_and_converted() {
        let mix = [Stereo::new([2.0, -0.5]), Stereo::new([0.25, -3.0])];
        let mut data = [0.0f32; 4];
        write_frames(&mut data, 2, &mix);
        assert_eq!(data, [1.0, -0.5, 0.25, -1.0]);
    }

    #[test]
    fn mono_device_gets_the_average_of_the_pair() {
        let mix = [Stereo::new([0.5, 0.25]), Stereo::new([1.5, 1.0])];
        let mut data = [0.0f32; 2];
        write_frames(&mut data, 1, &mix);
        assert_eq!(data, [0.375, 1.0]);
    }

    #[test]
    fn surround_device_gets_the_pair_up_front_and_silence_after() {
        let mix = [Stereo::new([0.5, -0.25]), Stereo::new([0.1, 0.2])];
        let mut data = [9.0f32; 12];
        write_frames(&mut data, 6, &mix);
        assert_eq!(
            data,
            [0.5, -0.25, 0.0, 0.0, 0.0, 0.0, 0.1, 0.2, 0.0, 0.0, 0.0, 0.0]
        );
    }
}
