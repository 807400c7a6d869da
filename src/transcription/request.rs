use std::path::{Path, PathBuf};

/// A single transcription job as handed over by the caller.
///
/// Fields are fixed at construction; the dispatcher only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionRequest {
    file_path: PathBuf,
    mime_type: Option<String>,
    prompt_hint: Option<String>,
    system_context: Option<String>,
}

impl TranscriptionRequest {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            mime_type: None,
            prompt_hint: None,
            system_context: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = non_blank(mime_type.into());
        self
    }

    pub fn with_prompt_hint(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_hint = non_blank(prompt.into());
        self
    }

    pub fn with_system_context(mut self, context: impl Into<String>) -> Self {
        self.system_context = non_blank(context.into());
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn has_file_path(&self) -> bool {
        !self.file_path.as_os_str().is_empty()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn prompt_hint(&self) -> Option<&str> {
        self.prompt_hint.as_deref()
    }

    pub fn system_context(&self) -> Option<&str> {
        self.system_context.as_deref()
    }

    /// Base name of the audio file, used as the upload's `filename`.
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string())
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_optionals_are_dropped() {
        let request = TranscriptionRequest::new("/tmp/voice.ogg")
            .with_mime_type("  ")
            .with_prompt_hint("")
            .with_system_context("chat with Bob");

        assert_eq!(request.mime_type(), None);
        assert_eq!(request.prompt_hint(), None);
        assert_eq!(request.system_context(), Some("chat with Bob"));
        assert_eq!(request.file_name(), "voice.ogg");
    }

    #[test]
    fn empty_path_is_detected() {
        assert!(!TranscriptionRequest::new("").has_file_path());
        assert!(TranscriptionRequest::new("a.wav").has_file_path());
    }
}
