//! Local playback of synthesized audio files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::cpal::traits::HostTrait;
use rodio::{Decoder, OutputStream, Sink};

use crate::engine::session::lock;
use crate::engine::CancelToken;

use super::OnlineError;

// ---------------------------------------------------------------------------
// AudioPlayer trait
// ---------------------------------------------------------------------------

/// Plays an encoded audio file to completion.
///
/// `play` blocks, polling the player's busy state until the queue drains or
/// `cancel` is set.  `halt` may be called from any thread and must make a
/// concurrent `play` return promptly.
pub trait AudioPlayer: Send + Sync {
    /// Whether an output device exists right now.
    fn is_available(&self) -> bool;

    fn play(&self, path: &Path, cancel: &CancelToken) -> Result<(), OnlineError>;

    fn halt(&self);
}

const _: fn() = || {
    fn _assert_object_safe(_: &dyn AudioPlayer) {}
};

// ---------------------------------------------------------------------------
// RodioPlayer
// ---------------------------------------------------------------------------

/// [`AudioPlayer`] on the default output device via `rodio`.
///
/// The output stream is opened per `play` call and dropped when it returns;
/// the stream handle is not `Send` and must stay on the playing thread.
pub struct RodioPlayer {
    poll: Duration,
    current: Mutex<Option<Arc<Sink>>>,
}

impl RodioPlayer {
    pub fn new(poll: Duration) -> Self {
        Self {
            poll,
            current: Mutex::new(None),
        }
    }
}

impl AudioPlayer for RodioPlayer {
    fn is_available(&self) -> bool {
        rodio::cpal::default_host().default_output_device().is_some()
    }

    fn play(&self, path: &Path, cancel: &CancelToken) -> Result<(), OnlineError> {
        let (_stream, handle) =
            OutputStream::try_default().map_err(|e| OnlineError::Player(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| OnlineError::Player(e.to_string()))?;

        let file = File::open(path)?;
        let source =
            Decoder::new(BufReader::new(file)).map_err(|e| OnlineError::Player(e.to_string()))?;
        sink.append(source);

        let sink = Arc::new(sink);
        *lock(&self.current) = Some(Arc::clone(&sink));
        log::debug!("playing {}", path.display());

        let result = loop {
            if cancel.is_cancelled() {
                sink.stop();
                break Err(OnlineError::Cancelled);
            }
            if sink.empty() {
                break Ok(());
            }
            std::thread::sleep(self.poll);
        };

        lock(&self.current).take();
        result
    }

    fn halt(&self) {
        if let Some(sink) = lock(&self.current).as_ref() {
            sink.stop();
        }
    }
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
