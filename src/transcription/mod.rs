mod audio;
mod cloud;
mod dispatcher;
mod error;
mod local;
mod multipart;
mod outcome;
mod request;
mod transport;

pub use audio::{normalize, read_audio_file, MAX_DURATION_SECS, SAMPLE_RATE_HZ, WINDOW_SAMPLES};
pub use cloud::{build_form, parse_response, resolve_mime_type, CloudSettings, CloudTranscriber};
pub use dispatcher::{
    check_availability, PendingTranscription, ProviderDispatcher, ResolvedProvider,
};
pub use error::TranscriptionError;
pub use local::{
    EngineLoader, EngineState, LocalEngine, LocalEngineHandle, LocalEngineSlot, Transcriber,
    MODEL_FILENAME,
};
pub use multipart::{FilePart, MultipartEncoder};
pub use outcome::{TranscriptionObserver, TranscriptionOutcome};
pub use request::TranscriptionRequest;
pub use transport::{classify, HttpTransport, TransportResponse, CONNECT_TIMEOUT, READ_TIMEOUT};
