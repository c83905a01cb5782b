//! Speech recognition capability

use anyhow::{bail, Result};
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Session parameters handed to the recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: "en-US".into(),
        }
    }
}

/// Events produced by a running recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Latest utterance, possibly interim
    Result { transcript: String, is_final: bool },
    /// The session failed and is over
    Error { error: String },
    /// The session ended on its own
    End,
}

/// Source of recognized speech
pub trait SpeechRecognizer: Send + 'static {
    /// Whether recognition works on this host at all
    fn is_available(&self) -> bool;

    /// Begin a session. Events arrive on the returned channel until it closes.
    fn start(&mut self, config: &RecognitionConfig) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>>;

    fn stop(&mut self);
}

/// Stand-in when no recognition capability exists
#[derive(Debug, Default)]
pub struct UnavailableRecognizer;

impl SpeechRecognizer for UnavailableRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _config: &RecognitionConfig) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>> {
        bail!("speech recognition is not available")
    }

    fn stop(&mut self) {}
}

/// Treats each line typed on stdin as a final utterance
#[derive(Debug, Default)]
pub struct ConsoleRecognizer {
    reader: Option<JoinHandle<()>>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    fn start(&mut self, config: &RecognitionConfig) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>> {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        info!("Listening on stdin ({})", config.language);

        self.reader = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let event = match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => RecognitionEvent::Result {
                        transcript: line,
                        is_final: true,
                    },
                    Ok(None) => RecognitionEvent::End,
                    Err(e) => RecognitionEvent::Error {
                        error: e.to_string(),
                    },
                };
                let done = !matches!(event, RecognitionEvent::Result { .. });
                if tx.send(event).is_err() || done {
                    break;
                }
            }
            debug!("Console recognizer finished");
        }));

        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Recognizer selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceMode {
    #[default]
    Console,
    Off,
}

impl VoiceMode {
    pub fn recognizer(self) -> Box<dyn SpeechRecognizer> {
        match self {
            VoiceMode::Console => Box::new(ConsoleRecognizer::new()),
            VoiceMode::Off => Box::new(UnavailableRecognizer),
        }
    }
}

impl FromStr for VoiceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(VoiceMode::Console),
            "off" => Ok(VoiceMode::Off),
            other => bail!("unknown voice mode: {}", other),
        }
    }
}
