//! Voice command engine

use super::recognizer::{RecognitionConfig, RecognitionEvent, SpeechRecognizer, UnavailableRecognizer};
use crate::events::{EventBus, Subscription};
use sageguard_shared::intent::{match_intent, normalize};
use sageguard_shared::NavigationIntent;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Observable state of the recognition session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceSession {
    pub is_listening: bool,
    /// Lower-cased latest utterance
    pub transcript: String,
}

/// Owns the recognizer and turns utterances into navigation intents
pub struct VoiceCommandEngine {
    recognizer: Box<dyn SpeechRecognizer>,
    available: bool,
    config: RecognitionConfig,
    events: Option<mpsc::UnboundedReceiver<RecognitionEvent>>,
    session_tx: watch::Sender<VoiceSession>,
    intents: EventBus<NavigationIntent>,
}

impl VoiceCommandEngine {
    /// Availability is checked once here. Without it the engine stays a no-op.
    pub fn new(recognizer: Box<dyn SpeechRecognizer>, config: RecognitionConfig) -> Self {
        let available = recognizer.is_available();
        let recognizer = if available {
            recognizer
        } else {
            info!("Speech recognition unavailable, voice commands disabled");
            Box::new(UnavailableRecognizer)
        };
        let (session_tx, _) = watch::channel(VoiceSession::default());

        Self {
            recognizer,
            available,
            config,
            events: None,
            session_tx,
            intents: EventBus::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn session(&self) -> VoiceSession {
        self.session_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<VoiceSession> {
        self.session_tx.subscribe()
    }

    /// Subscribe to recognized navigation intents
    pub fn subscribe(&self) -> Subscription<NavigationIntent> {
        self.intents.subscribe()
    }

    pub fn start_listening(&mut self) {
        if !self.available {
            debug!("Start listening ignored, recognition unavailable");
            return;
        }
        if self.session_tx.borrow().is_listening {
            return;
        }

        match self.recognizer.start(&self.config) {
            Ok(events) => {
                self.events = Some(events);
                self.set_listening(true);
                info!("Voice recognition started");
            }
            Err(e) => error!("Failed to start voice recognition: {}", e),
        }
    }

    pub fn stop_listening(&mut self) {
        if self.events.is_none() && !self.session_tx.borrow().is_listening {
            return;
        }
        self.recognizer.stop();
        self.end_session();
        info!("Voice recognition stopped");
    }

    pub fn toggle_listening(&mut self) {
        if self.session_tx.borrow().is_listening {
            self.stop_listening();
        } else {
            self.start_listening();
        }
    }

    /// Wait for the next recognizer event. Pends while not listening and
    /// reports `End` once the session's channel closes.
    pub async fn next_event(&mut self) -> RecognitionEvent {
        match self.events.as_mut() {
            Some(events) => events.recv().await.unwrap_or(RecognitionEvent::End),
            None => std::future::pending().await,
        }
    }

    /// Apply one recognizer event, returning the intent it triggered
    pub fn handle_event(&mut self, event: RecognitionEvent) -> Option<NavigationIntent> {
        match event {
            RecognitionEvent::Result {
                transcript,
                is_final,
            } => {
                let transcript = normalize(&transcript);
                debug!("Heard {:?} (final={})", transcript, is_final);
                let intent = match_intent(&transcript);
                self.session_tx.send_modify(|session| session.transcript = transcript);

                if let Some(intent) = intent {
                    info!("Voice command: {}", intent);
                    self.intents.publish(intent);
                }
                intent
            }
            RecognitionEvent::Error { error } => {
                warn!("Voice recognition error: {}", error);
                self.end_session();
                None
            }
            RecognitionEvent::End => {
                debug!("Voice recognition session ended");
                self.end_session();
                None
            }
        }
    }

    fn end_session(&mut self) {
        self.events = None;
        self.set_listening(false);
    }

    fn set_listening(&self, listening: bool) {
        self.session_tx.send_if_modified(|session| {
            let changed = session.is_listening != listening;
            session.is_listening = listening;
            changed
        });
    }
}
