use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::audio::{SAMPLE_RATE_HZ, WINDOW_SAMPLES};
use super::error::TranscriptionError;

pub const MODEL_FILENAME: &str = "whisper_base.tflite";
const PLACEHOLDER_TRANSCRIPT: &str = "Transcription pending - on-device inference not available";

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        samples: Vec<f32>,
        sample_rate_hz: u32,
    ) -> Result<String, TranscriptionError>;
}

/// Builds an engine from a resolved model file. Runs on a blocking thread.
pub type EngineLoader =
    Arc<dyn Fn(&Path) -> Result<Arc<dyn Transcriber>, TranscriptionError> + Send + Sync>;

/// On-device engine stand-in. Loading only validates the model file; every
/// transcription yields a fixed placeholder.
#[derive(Debug)]
pub struct LocalEngine {
    model_path: PathBuf,
}

impl LocalEngine {
    pub fn load(model_path: &Path) -> Result<Self, TranscriptionError> {
        if !model_path.is_file() {
            return Err(TranscriptionError::NotFound(model_path.to_path_buf()));
        }

        info!("Initialized on-device engine from {:?}", model_path);
        Ok(Self {
            model_path: model_path.to_path_buf(),
        })
    }

    pub fn loader() -> EngineLoader {
        Arc::new(|path: &Path| {
            let engine: Arc<dyn Transcriber> = Arc::new(LocalEngine::load(path)?);
            Ok(engine)
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn run_inference(&self, samples: &[f32]) -> String {
        debug!(
            samples = samples.len(),
            "Running placeholder inference with {:?}", self.model_path
        );
        warn!("Using placeholder transcription - on-device inference is not wired up");
        PLACEHOLDER_TRANSCRIPT.to_string()
    }
}

#[async_trait]
impl Transcriber for LocalEngine {
    async fn transcribe(
        &self,
        samples: Vec<f32>,
        sample_rate_hz: u32,
    ) -> Result<String, TranscriptionError> {
        if sample_rate_hz != SAMPLE_RATE_HZ {
            return Err(TranscriptionError::Engine(format!(
                "expected {} Hz input, got {} Hz",
                SAMPLE_RATE_HZ, sample_rate_hz
            )));
        }
        if samples.len() != WINDOW_SAMPLES {
            return Err(TranscriptionError::Engine(format!(
                "expected a {}-sample window, got {}",
                WINDOW_SAMPLES,
                samples.len()
            )));
        }

        Ok(self.run_inference(&samples))
    }
}

/// An initialized engine plus the gate that keeps inference single-flight.
pub struct LocalEngineHandle {
    engine: Arc<dyn Transcriber>,
    model_path: PathBuf,
    inference: Mutex<()>,
}

impl LocalEngineHandle {
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Runs inference on its own task so a panicking engine surfaces as an
    /// `Engine` error instead of unwinding through the worker.
    pub async fn transcribe(&self, samples: Vec<f32>) -> Result<String, TranscriptionError> {
        let _guard = self.inference.lock().await;
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.transcribe(samples, SAMPLE_RATE_HZ).await })
            .await
            .map_err(|err| TranscriptionError::Engine(format!("inference panicked: {}", err)))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
}

/// Holds the engine once it has been built. Concurrent first callers wait on
/// the same initialization; the loader runs at most once per successful
/// initialization, and a failed load leaves the slot empty for the next call.
pub struct LocalEngineSlot {
    cell: OnceCell<LocalEngineHandle>,
    loader: EngineLoader,
}

impl Default for LocalEngineSlot {
    fn default() -> Self {
        Self::new(LocalEngine::loader())
    }
}

impl LocalEngineSlot {
    pub fn new(loader: EngineLoader) -> Self {
        Self {
            cell: OnceCell::new(),
            loader,
        }
    }

    pub fn state(&self) -> EngineState {
        if self.cell.initialized() {
            EngineState::Ready
        } else {
            EngineState::Uninitialized
        }
    }

    pub fn get(&self) -> Option<&LocalEngineHandle> {
        self.cell.get()
    }

    pub async fn get_or_init(
        &self,
        model_path: &Path,
    ) -> Result<&LocalEngineHandle, TranscriptionError> {
        let handle = self
            .cell
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let path = model_path.to_path_buf();
                let engine = tokio::task::spawn_blocking({
                    let path = path.clone();
                    move || loader(&path)
                })
                .await
                .map_err(|err| {
                    TranscriptionError::Engine(format!("engine loader panicked: {}", err))
                })??;

                Ok::<_, TranscriptionError>(LocalEngineHandle {
                    engine,
                    model_path: path,
                    inference: Mutex::new(()),
                })
            })
            .await?;

        if handle.model_path != model_path {
            warn!(
                "Local model path changed to {:?}; keeping engine loaded from {:?}",
                model_path, handle.model_path
            );
        }

        Ok(handle)
    }
}
