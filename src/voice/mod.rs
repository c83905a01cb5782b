//! Voice command control
//!
//! One continuous speech-recognition session turned into navigation intents.

mod engine;
mod recognizer;

pub use engine::{VoiceCommandEngine, VoiceSession};
pub use recognizer::{
    ConsoleRecognizer, RecognitionConfig, RecognitionEvent, SpeechRecognizer,
    UnavailableRecognizer, VoiceMode,
};
