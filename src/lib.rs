pub mod config;
pub mod logging;
pub mod transcription;

pub use config::{Config, ConfigManager, ProviderKind};
pub use transcription::{
    PendingTranscription, ProviderDispatcher, TranscriptionError, TranscriptionObserver,
    TranscriptionOutcome, TranscriptionRequest,
};
