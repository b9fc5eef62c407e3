// ABOUTME: Session state aggregate: volume/mute, playback/format, stream generation, cached server/group state
// ABOUTME: Notifies a single observer on every local mutation; external code never mutates SessionState directly

mod merge;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::Codec;
use crate::protocol::messages::PlayerSyncState;

/// The stream format currently in effect, set by `stream/start` and cleared
/// by `stream/end`. Exactly one may be current at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFormat {
    pub codec: Codec,
    pub sample_rate: u32,
    pub channel_count: u8,
    pub bit_depth: Option<u8>,
    /// Decoded (not base64) codec-specific initialization data, if any.
    pub codec_header: Option<Vec<u8>>,
}

/// Single-method observer notified after every local state mutation.
pub trait StateObserver: Send + Sync {
    fn on_state_changed(&self, state: &SessionState);
}

/// An observer that does nothing; the default for headless use and tests.
pub struct NoopObserver;

impl StateObserver for NoopObserver {
    fn on_state_changed(&self, _state: &SessionState) {}
}

/// Session-wide mutable state, held by the session and mutated only through
/// `StateStore`.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub volume: u8,
    pub muted: bool,
    pub player_state: PlayerSyncState,
    pub is_playing: bool,
    pub current_format: Option<StreamFormat>,
    pub stream_generation: u32,
    pub server_state: Map<String, Value>,
    pub group_state: Map<String, Value>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            volume: 100,
            muted: false,
            player_state: PlayerSyncState::Error,
            is_playing: false,
            current_format: None,
            stream_generation: 0,
            server_state: Map::new(),
            group_state: Map::new(),
        }
    }
}

/// Owns `SessionState` and notifies a single `StateObserver` after each mutation.
pub struct StateStore {
    state: SessionState,
    observer: Arc<dyn StateObserver>,
}

impl StateStore {
    pub fn new(observer: Arc<dyn StateObserver>) -> Self {
        Self {
            state: SessionState::default(),
            observer,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn notify(&self) {
        self.observer.on_state_changed(&self.state);
    }

    /// Set volume, clamped to [0, 100].
    pub fn set_volume(&mut self, volume: i32) {
        self.state.volume = volume.clamp(0, 100) as u8;
        self.notify();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.muted = muted;
        self.notify();
    }

    pub fn set_player_state(&mut self, player_state: PlayerSyncState) {
        self.state.player_state = player_state;
        self.notify();
    }

    pub fn set_is_playing(&mut self, is_playing: bool) {
        self.state.is_playing = is_playing;
        self.notify();
    }

    /// Apply a `stream/start`. Returns `true` if the stream generation was
    /// bumped (no prior format was current), `false` for a format update
    /// (a format was already current; buffers are not cleared, generation
    /// is not bumped).
    pub fn start_stream(&mut self, format: StreamFormat) -> bool {
        let is_new_stream = self.state.current_format.is_none();
        self.state.current_format = Some(format);
        if is_new_stream {
            self.state.stream_generation += 1;
            self.state.is_playing = true;
        }
        self.notify();
        is_new_stream
    }

    /// Apply a `stream/end`: clear the format and stop playback.
    pub fn end_stream(&mut self) {
        self.state.current_format = None;
        self.state.is_playing = false;
        self.notify();
    }

    /// Bump the stream generation counter, invalidating in-flight decodes
    /// and queued scheduler frames. Returns the new generation.
    pub fn reset_stream_anchors(&mut self) -> u32 {
        self.state.stream_generation += 1;
        self.notify();
        self.state.stream_generation
    }

    pub fn stream_generation(&self) -> u32 {
        self.state.stream_generation
    }

    pub fn current_format(&self) -> Option<&StreamFormat> {
        self.state.current_format.as_ref()
    }

    /// Merge a `server/state` payload (already reduced to JSON) into the
    /// cached server state.
    pub fn merge_server_state(&mut self, diff: &Value) {
        if let Some(diff_obj) = diff.as_object() {
            merge::merge_one_level(&mut self.state.server_state, diff_obj);
        }
        self.notify();
    }

    /// Merge a `group/update` payload (already reduced to JSON) into the
    /// cached group state.
    pub fn merge_group_state(&mut self, diff: &Value) {
        if let Some(diff_obj) = diff.as_object() {
            merge::merge_one_level(&mut self.state.group_state, diff_obj);
        }
        self.notify();
    }

    /// The `controller.supported_commands` list cached from `server/state`,
    /// if the server has reported one.
    pub fn supported_commands(&self) -> Option<Vec<String>> {
        self.state
            .server_state
            .get("controller")?
            .get("supported_commands")?
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
    }
}
