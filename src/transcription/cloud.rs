use std::path::Path;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::Deserialize;
use tracing::{error, info};

use super::error::TranscriptionError;
use super::multipart::{FilePart, MultipartEncoder};
use super::request::TranscriptionRequest;
use super::transport::{truncate, HttpTransport};

pub const PROVIDER_NAME: &str = "cloud";
const DEFAULT_MIME: &str = "audio/ogg";

/// Credentials and target resolved from config for a single request.
#[derive(Clone)]
pub struct CloudSettings {
    pub api_key: String,
    pub model: String,
    pub endpoint: Url,
}

impl std::fmt::Debug for CloudSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

/// Whisper-compatible `audio/transcriptions` client.
#[derive(Debug, Clone)]
pub struct CloudTranscriber {
    transport: HttpTransport,
}

impl CloudTranscriber {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub async fn transcribe(
        &self,
        settings: &CloudSettings,
        request: &TranscriptionRequest,
        audio: Bytes,
    ) -> Result<String, TranscriptionError> {
        let mime_type = resolve_mime_type(request);
        info!(
            provider = PROVIDER_NAME,
            model = %settings.model,
            bytes = audio.len(),
            "🧠 Uploading {} ({}) for transcription",
            request.file_name(),
            mime_type
        );

        let form = build_form(settings, request, &mime_type, audio);
        let headers = auth_headers(&settings.api_key)?;
        let body = self.transport.post(&settings.endpoint, headers, &form).await?;

        parse_response(&body)
    }
}

/// Explicit MIME type if given, otherwise inferred from the extension, with
/// `audio/ogg` as the voice-note default.
pub fn resolve_mime_type(request: &TranscriptionRequest) -> String {
    if let Some(explicit) = request.mime_type() {
        return explicit.to_string();
    }

    mime_for_path(request.file_path()).to_string()
}

fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("ogg") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        _ => DEFAULT_MIME,
    }
}

pub fn build_form(
    settings: &CloudSettings,
    request: &TranscriptionRequest,
    mime_type: &str,
    audio: Bytes,
) -> MultipartEncoder {
    let mut form = MultipartEncoder::new();
    form.add_field("model", settings.model.clone());

    if let Some(prompt) = request.prompt_hint() {
        form.add_field("prompt", prompt);
    }

    form.set_file(FilePart::new("file", request.file_name(), mime_type, audio));
    form
}

fn auth_headers(api_key: &str) -> Result<HeaderMap, TranscriptionError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
        TranscriptionError::unavailable(PROVIDER_NAME, "API key is not a valid header value")
    })?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

/// Pulls `text` out of the JSON body. A missing field is a parse error and the
/// raw body is logged.
pub fn parse_response(body: &[u8]) -> Result<String, TranscriptionError> {
    let raw = String::from_utf8_lossy(body);
    let payload: TranscriptionResponse = serde_json::from_slice(body).map_err(|err| {
        error!("Unparseable transcription response ({}): {}", err, truncate(&raw));
        TranscriptionError::parse(err.to_string())
    })?;

    match payload.text {
        Some(text) => Ok(text),
        None => {
            error!("No text field in transcription response: {}", truncate(&raw));
            Err(TranscriptionError::parse("response has no 'text' field"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CloudSettings {
        CloudSettings {
            api_key: "sk-test".into(),
            model: "whisper-1".into(),
            endpoint: Url::parse("http://127.0.0.1:1/v1/audio/transcriptions").unwrap(),
        }
    }

    #[test]
    fn mime_type_from_extension() {
        let cases = [
            ("a.ogg", "audio/ogg"),
            ("a.mp3", "audio/mpeg"),
            ("a.WAV", "audio/wav"),
            ("a.m4a", "audio/mp4"),
            ("a.opus", "audio/ogg"),
            ("noext", "audio/ogg"),
        ];
        for (file, expected) in cases {
            assert_eq!(resolve_mime_type(&TranscriptionRequest::new(file)), expected);
        }
    }

    #[test]
    fn explicit_mime_type_wins() {
        let request = TranscriptionRequest::new("clip.mp3").with_mime_type("audio/webm");
        assert_eq!(resolve_mime_type(&request), "audio/webm");
    }

    #[test]
    fn form_carries_model_prompt_and_file() {
        let request = TranscriptionRequest::new("/tmp/voice.mp3").with_prompt_hint("Kubernetes");
        let form = build_form(&settings(), &request, "audio/mpeg", Bytes::from_static(b"ID3"));
        let body = String::from_utf8(form.encode().unwrap().to_vec()).unwrap();

        assert!(body.contains("name=\"model\"\r\n\r\nwhisper-1\r\n"));
        assert!(body.contains("name=\"prompt\"\r\n\r\nKubernetes\r\n"));
        assert!(body.contains(concat!(
            "name=\"file\"; filename=\"voice.mp3\"\r\n",
            "Content-Type: audio/mpeg\r\n\r\nID3\r\n"
        )));
    }

    #[test]
    fn form_omits_prompt_without_hint() {
        let request = TranscriptionRequest::new("voice.ogg");
        let form = build_form(&settings(), &request, "audio/ogg", Bytes::new());
        let body = String::from_utf8(form.encode().unwrap().to_vec()).unwrap();
        assert!(!body.contains("name=\"prompt\""));
    }

    #[test]
    fn parses_text_field() {
        assert_eq!(
            parse_response(br#"{"text":"  hello world  "}"#).unwrap(),
            "  hello world  "
        );
        assert!(matches!(
            parse_response(br#"{"transcript":"hi"}"#),
            Err(TranscriptionError::ResponseParse(_))
        ));
        assert!(parse_response(b"<html>").is_err());
    }
}
