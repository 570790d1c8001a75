//! dubforge-backends: built-in engines for each capability kind.
//!
//! Most backends shell out to an external engine through
//! [`dubforge_av::ToolCommand`]; Speaches is reached over HTTP. Installation
//! checks live in `is_available` only, which the registry runs off the async
//! workers. A backend that vanishes between the check and the call fails with
//! the spawn or connect error instead.

pub mod faster_whisper;
pub mod piper;
pub mod speaches;
pub mod voice_clone;
pub mod wav2lip;
pub mod whisper_cpp;

use std::sync::Arc;
use std::time::Duration;

use dubforge_core::{BackendHandle, Config};

pub use faster_whisper::FasterWhisperStt;
pub use piper::PiperTts;
pub use speaches::SpeachesTts;
pub use voice_clone::CommandVoiceCloner;
pub use wav2lip::Wav2LipSync;
pub use whisper_cpp::WhisperCppStt;

/// Built-in backends in registration order.
///
/// Registration order is the tie-break for backend selection, so this order
/// is part of the deployment contract.
pub fn builtin(config: &Config) -> Vec<BackendHandle> {
    let timeout = Duration::from_secs(config.tools.timeout_secs.max(1));
    let backends = &config.backends;

    vec![
        BackendHandle::SpeechToText(Arc::new(WhisperCppStt::new(&backends.whisper_cpp, timeout))),
        BackendHandle::SpeechToText(Arc::new(FasterWhisperStt::new(
            &backends.faster_whisper,
            timeout,
        ))),
        BackendHandle::TextToSpeech(Arc::new(PiperTts::new(&backends.piper, timeout))),
        BackendHandle::TextToSpeech(Arc::new(SpeachesTts::new(&backends.speaches, timeout))),
        BackendHandle::VoiceCloning(Arc::new(CommandVoiceCloner::new(
            &backends.voice_clone,
            timeout,
        ))),
        BackendHandle::LipSync(Arc::new(Wav2LipSync::new(&backends.wav2lip, timeout))),
    ]
}
