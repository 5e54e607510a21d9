//! Error types for guildtune.
//!
//! [`MusicError`] is the taxonomy the queue and the dispatcher speak. Raw
//! provider failures only travel as [`MusicError::Provider`] inside the
//! resolver and streamer chains; everything that reaches a user goes through
//! [`classify`] first.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    /// Empty or whitespace-only query
    #[error("Please provide a song name or YouTube URL.")]
    InvalidInput,

    /// No resolver produced a result
    #[error("No songs found for `{0}`")]
    NotFound(String),

    /// Every stream provider failed; holds the classified cause
    #[error("{0}")]
    StreamUnavailable(String),

    /// Bot lacks connect/speak in the caller's channel
    #[error("I need permission to join and speak in your voice channel!")]
    Permission,

    /// Operation needs a non-empty queue
    #[error("The queue is empty!")]
    EmptyQueue,

    /// Pause/resume outside the matching state
    #[error("{0}")]
    InvalidState(&'static str),

    /// Voice connection dropped for good or could not be established
    #[error("Voice connection lost: {0}")]
    ConnectionLost(String),

    /// Raw failure from a single provider
    #[error("{provider}: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
}

impl MusicError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Text safe to show in Discord.
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider { message, .. } => classify(message),
            Self::ConnectionLost(message) => classify(message),
            other => other.to_string(),
        }
    }
}

/// Kinds of provider failure that get a dedicated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Copyright,
    PrivateVideo,
    AgeRestricted,
    VoiceConnection,
    AudioResource,
    Other,
}

impl FailureKind {
    /// Inspects provider error text for known markers. First match wins.
    pub fn detect(message: &str) -> Self {
        let has = |needle: &str| message.contains(needle);

        if has("status code: 403") || has("status code: 429") || has("HTTP Error 429") {
            Self::RateLimited
        } else if has("copyright") || has("COPYRIGHT_CLAIM") {
            Self::Copyright
        } else if has("private") || has("PRIVATE_VIDEO") {
            Self::PrivateVideo
        } else if has("age") || has("AGE_RESTRICTED") {
            Self::AgeRestricted
        } else if has("voice connection") || has("VOICE_CONNECTION_ERROR") {
            Self::VoiceConnection
        } else if has("audio resource") || has("RESOURCE_ERROR") {
            Self::AudioResource
        } else {
            Self::Other
        }
    }
}

/// Maps provider error text to a human-readable message.
pub fn classify(message: &str) -> String {
    match FailureKind::detect(message) {
        FailureKind::RateLimited => {
            "YouTube API rate limit reached. Please try again later.".to_string()
        }
        FailureKind::Copyright => {
            "This song cannot be played due to copyright restrictions.".to_string()
        }
        FailureKind::PrivateVideo => "This video is private and cannot be played.".to_string(),
        FailureKind::AgeRestricted => {
            "This video is age-restricted and cannot be played.".to_string()
        }
        FailureKind::VoiceConnection => "Failed to connect to the voice channel. Please check permissions or try again later.".to_string(),
        FailureKind::AudioResource => {
            "Failed to create audio resource. The song format may be unsupported.".to_string()
        }
        FailureKind::Other => format!("An error occurred: {}", message),
    }
}

pub type Result<T> = std::result::Result<T, MusicError>;
