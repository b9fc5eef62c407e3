// ABOUTME: Composition root: wires Transport + ProtocolEngine + decode front-end + Scheduler + sink
// ABOUTME: Single-threaded cooperative event loop driven by tokio::select!

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, sleep, Interval, Sleep};

use crate::audio::decode::{make_decoder, Decoder};
use crate::audio::output::AudioOutput;
use crate::audio::{AudioFormat, DecodedAudioFrame};
use crate::config::Config;
use crate::error::Result;
use crate::protocol::client::{Command, EngineEvent, ProtocolEngine, VolumeSink};
use crate::protocol::transport::{Transport, WsTransport};
use crate::scheduler::{BufferedSink, Scheduler};
use crate::state::{NoopObserver, StateObserver};

const TIME_SYNC_INTERVAL: Duration = Duration::from_secs(5);
const STATE_INTERVAL: Duration = Duration::from_secs(5);
const DEBOUNCE: Duration = Duration::from_millis(50);
const SINK_TICK: Duration = Duration::from_millis(20);

/// Owns the whole receiver: connection, clock sync, decode, and playback.
/// Runs a single-threaded cooperative loop; the only suspension points are
/// the transport, the periodic timers, and the debounce timer.
pub struct Session {
    engine: ProtocolEngine,
    scheduler: Scheduler,
    decoder: Option<Box<dyn Decoder>>,
    decoder_generation: u32,
    output_format: AudioFormat,
}

impl Session {
    pub async fn connect(
        config: Config,
        output: impl AudioOutput + 'static,
        observer: Option<Arc<dyn StateObserver>>,
        volume_sink: Option<Box<dyn VolumeSink>>,
    ) -> Result<Self> {
        let url = config.websocket_url()?;
        let transport: Box<dyn Transport> = Box::new(WsTransport::connect(&url).await?);
        let output_format = *output.format();
        let observer = observer.unwrap_or_else(|| Arc::new(NoopObserver));

        let mut engine = ProtocolEngine::new(transport, config.clone(), observer, volume_sink);
        engine.handshake().await?;

        let sink = BufferedSink::new(output);
        let scheduler = Scheduler::new(
            Box::new(sink),
            config.correction_mode,
            config.sync_delay_ms,
            config.use_output_latency_compensation,
        );

        Ok(Self {
            engine,
            scheduler,
            decoder: None,
            decoder_generation: 0,
            output_format,
        })
    }

    pub async fn send_command(&mut self, command: Command) -> Result<()> {
        self.engine.send_command(command).await
    }

    /// Run the receive/decode/schedule loop until the transport closes.
    pub async fn run(&mut self) -> Result<()> {
        let mut sync_timer: Interval = interval(TIME_SYNC_INTERVAL);
        let mut state_timer: Interval = interval(STATE_INTERVAL);
        let mut sink_timer: Interval = interval(SINK_TICK);
        let mut debounce: Option<Pin<Box<Sleep>>> = None;

        self.engine.set_output_latency_us(self.scheduler.raw_output_latency_micros());
        self.engine.send_client_time(crate::now_us()).await?;

        loop {
            tokio::select! {
                event = self.engine.recv_event() => {
                    match event {
                        Some(EngineEvent::Disconnected) | None => return Ok(()),
                        Some(other) => {
                            if self.handle_event(other) {
                                debounce = Some(Box::pin(sleep(DEBOUNCE)));
                            }
                        }
                    }
                }
                _ = sync_timer.tick() => {
                    self.engine.send_client_time(crate::now_us()).await?;
                }
                _ = state_timer.tick() => {
                    self.engine.send_client_state().await?;
                }
                _ = sink_timer.tick() => {
                    self.scheduler.advance_sink(SINK_TICK.as_micros() as u64);
                    self.engine.set_output_latency_us(self.scheduler.raw_output_latency_micros());
                }
                _ = async { debounce.as_mut().unwrap().as_mut().await }, if debounce.is_some() => {
                    debounce = None;
                    self.run_scheduling_pass();
                }
            }
        }
    }

    /// Apply a higher-level engine event to decode/scheduler state. Returns
    /// `true` if a scheduling pass should be (re)armed via the debounce timer.
    fn handle_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::StreamStarted { format, generation, .. } => {
                self.decoder_generation = generation;
                if format.sample_rate != self.output_format.sample_rate
                    || format.channel_count != self.output_format.channels
                {
                    log::warn!(
                        "stream format {}Hz/{}ch does not match output device {}Hz/{}ch; \
                         playback will run at the wrong pitch until the next stream/start",
                        format.sample_rate,
                        format.channel_count,
                        self.output_format.sample_rate,
                        self.output_format.channels,
                    );
                }
                self.decoder = make_decoder(&format).map_err(|e| {
                    log::error!("failed to create decoder for {:?}: {e}", format.codec);
                    e
                }).ok();
                false
            }
            EngineEvent::StreamCleared { generation } => {
                self.decoder_generation = generation;
                self.scheduler.clear_buffers();
                false
            }
            EngineEvent::StreamEnded => {
                self.decoder = None;
                self.scheduler.clear_buffers();
                false
            }
            EngineEvent::AudioFrame(chunk) => self.decode_and_enqueue(chunk.timestamp, &chunk.data),
            EngineEvent::ArtworkFrame(_) | EngineEvent::VisualizerFrame(_) => false,
            EngineEvent::VolumeChanged { .. } | EngineEvent::GroupUpdated | EngineEvent::Ready => false,
            EngineEvent::Disconnected => false,
        }
    }

    fn decode_and_enqueue(&mut self, server_time_us: i64, payload: &[u8]) -> bool {
        let generation = self.decoder_generation;
        let Some(decoder) = self.decoder.as_mut() else {
            log::warn!("audio chunk arrived with no active decoder; dropping");
            return false;
        };

        let samples = match decoder.decode(payload) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("decode failed: {e}");
                return false;
            }
        };

        // The generation is captured before decode started; if it changed
        // while we were decoding (a stream/clear or stream/end landed), this
        // frame is stale and is dropped rather than enqueued.
        if generation != self.decoder_generation {
            return false;
        }

        self.scheduler.enqueue(DecodedAudioFrame {
            samples,
            server_time_us,
            generation,
            sample_rate: decoder.sample_rate(),
            channel_count: decoder.channel_count(),
        });
        true
    }

    fn run_scheduling_pass(&mut self) {
        self.scheduler
            .run_pass(self.engine.time_filter(), crate::now_us(), self.decoder_generation);
    }

    pub async fn disconnect(&mut self, reason: crate::protocol::messages::GoodbyeReason) -> Result<()> {
        self.scheduler.close();
        self.engine.send_goodbye(reason).await
    }
}
