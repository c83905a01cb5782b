//! Voice navigation intents and their trigger phrases

/// Navigation commands recognized from speech
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationIntent {
    ShowDashboard,
    ShowMap,
    ShowAnalytics,
}

impl NavigationIntent {
    /// Route the router collaborator should display
    pub fn route(&self) -> &'static str {
        match self {
            NavigationIntent::ShowDashboard => "/",
            NavigationIntent::ShowMap => "/map",
            NavigationIntent::ShowAnalytics => "/analytics",
        }
    }
}

impl std::fmt::Display for NavigationIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationIntent::ShowDashboard => write!(f, "ShowDashboard"),
            NavigationIntent::ShowMap => write!(f, "ShowMap"),
            NavigationIntent::ShowAnalytics => write!(f, "ShowAnalytics"),
        }
    }
}

/// Trigger phrases in priority order
pub const TRIGGERS: [(&str, NavigationIntent); 3] = [
    ("show dashboard", NavigationIntent::ShowDashboard),
    ("show map", NavigationIntent::ShowMap),
    ("show analytics", NavigationIntent::ShowAnalytics),
];

/// Lower-case a raw utterance the way transcripts are stored
pub fn normalize(utterance: &str) -> String {
    utterance.to_lowercase()
}

/// First trigger contained in the (already normalized) transcript
pub fn match_intent(transcript: &str) -> Option<NavigationIntent> {
    TRIGGERS
        .iter()
        .find(|(phrase, _)| transcript.contains(phrase))
        .map(|(_, intent)| *intent)
}
