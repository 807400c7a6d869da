use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use reqwest::Url;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigManager, ProviderKind};
use crate::logging::{record_transcription, TranscriptionRecord};

use super::audio::{normalize, read_audio_file};
use super::cloud::{CloudSettings, CloudTranscriber};
use super::error::TranscriptionError;
use super::local::{EngineState, LocalEngineSlot};
use super::outcome::{TranscriptionObserver, TranscriptionOutcome};
use super::request::TranscriptionRequest;
use super::transport::HttpTransport;

/// What a request needs from config once it has passed the availability
/// check.
#[derive(Debug, Clone)]
pub enum ResolvedProvider {
    Cloud(CloudSettings),
    Local { model_path: PathBuf },
}

impl ResolvedProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ResolvedProvider::Cloud(_) => ProviderKind::Cloud,
            ResolvedProvider::Local { .. } => ProviderKind::Local,
        }
    }
}

/// Decides whether `provider` can serve `request` with the given config.
///
/// Only looks at config values and, for the local provider, whether the model
/// file exists. Never reads audio or touches the network.
pub fn check_availability(
    config: &Config,
    provider: ProviderKind,
    request: &TranscriptionRequest,
) -> Result<ResolvedProvider, TranscriptionError> {
    if !request.has_file_path() {
        return Err(TranscriptionError::InvalidRequest(
            "audio file path is empty".to_string(),
        ));
    }

    match provider {
        ProviderKind::Cloud => {
            let cloud = &config.cloud;
            if !cloud.enabled {
                return Err(TranscriptionError::unavailable("cloud", "provider is disabled"));
            }
            let api_key = cloud.api_key();
            if api_key.is_empty() {
                return Err(TranscriptionError::unavailable("cloud", "API key is not set"));
            }
            let endpoint = Url::parse(&cloud.endpoint).map_err(|err| {
                TranscriptionError::unavailable("cloud", format!("invalid endpoint: {}", err))
            })?;

            Ok(ResolvedProvider::Cloud(CloudSettings {
                api_key,
                model: cloud.model.clone(),
                endpoint,
            }))
        }
        ProviderKind::Local => {
            let local = &config.local;
            if !local.enabled {
                return Err(TranscriptionError::unavailable("local", "provider is disabled"));
            }
            if !local.model_downloaded {
                return Err(TranscriptionError::unavailable(
                    "local",
                    "model has not been downloaded",
                ));
            }
            let model_path = local.resolve_model_path().ok_or_else(|| {
                TranscriptionError::unavailable("local", "model file is missing on disk")
            })?;

            Ok(ResolvedProvider::Local { model_path })
        }
    }
}

const WORKER_STOPPED: &str = "transcription worker stopped";

enum ReplyTarget {
    Channel(oneshot::Sender<TranscriptionOutcome>),
    Observer(Arc<dyn TranscriptionObserver>),
}

impl ReplyTarget {
    fn send(self, outcome: TranscriptionOutcome) {
        match self {
            ReplyTarget::Channel(tx) => {
                if tx.send(outcome).is_err() {
                    debug!("Caller dropped the pending transcription before completion");
                }
            }
            ReplyTarget::Observer(observer) => observer.deliver(outcome),
        }
    }
}

/// Where a request's outcome goes. A reply dropped without being sent (a
/// worker task that died mid-job) still reports `Failed`.
struct Reply {
    target: Option<ReplyTarget>,
}

impl Reply {
    fn channel(tx: oneshot::Sender<TranscriptionOutcome>) -> Self {
        Self {
            target: Some(ReplyTarget::Channel(tx)),
        }
    }

    fn observer(observer: Arc<dyn TranscriptionObserver>) -> Self {
        Self {
            target: Some(ReplyTarget::Observer(observer)),
        }
    }

    fn send(mut self, outcome: TranscriptionOutcome) {
        if let Some(target) = self.target.take() {
            target.send(outcome);
        }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            warn!("Transcription job ended without an outcome");
            target.send(TranscriptionOutcome::Failed(WORKER_STOPPED.to_string()));
        }
    }
}

struct Job {
    request: TranscriptionRequest,
    provider: ResolvedProvider,
    reply: Reply,
    enqueued_at: Instant,
}

/// Resolves to the request's single outcome.
pub struct PendingTranscription {
    rx: oneshot::Receiver<TranscriptionOutcome>,
}

impl PendingTranscription {
    /// The outcome if it is already known, without waiting.
    pub fn try_outcome(&mut self) -> Option<TranscriptionOutcome> {
        self.rx.try_recv().ok()
    }
}

impl Future for PendingTranscription {
    type Output = TranscriptionOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| TranscriptionOutcome::Failed(WORKER_STOPPED.to_string()))
        })
    }
}

struct Backends {
    cloud: CloudTranscriber,
    local: LocalEngineSlot,
}

impl Backends {
    async fn execute(
        &self,
        provider: &ResolvedProvider,
        request: &TranscriptionRequest,
        audio: Bytes,
    ) -> Result<String, TranscriptionError> {
        match provider {
            ResolvedProvider::Cloud(settings) => {
                self.cloud.transcribe(settings, request, audio).await
            }
            ResolvedProvider::Local { model_path } => {
                let engine = self.local.get_or_init(model_path).await?;
                let samples = tokio::task::spawn_blocking(move || normalize(&audio))
                    .await
                    .map_err(|err| {
                        TranscriptionError::Engine(format!("preprocessing panicked: {}", err))
                    })?;
                engine.transcribe(samples).await
            }
        }
    }

    async fn run(&self, job: Job) {
        let Job {
            request,
            provider,
            reply,
            enqueued_at,
        } = job;
        let started = Instant::now();
        debug!(
            provider = provider.kind().as_str(),
            queued_ms = started.duration_since(enqueued_at).as_millis() as u64,
            "Starting transcription of {:?}",
            request.file_path()
        );

        let mut audio_bytes = None;
        let result = match read_audio_file(request.file_path()).await {
            Ok(audio) => {
                audio_bytes = Some(audio.len() as u64);
                self.execute(&provider, &request, audio).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!(
                provider = provider.kind().as_str(),
                "Transcription of {:?} failed: {}",
                request.file_path(),
                err
            );
        }
        let outcome = TranscriptionOutcome::from_result(result);

        info!(
            provider = provider.kind().as_str(),
            outcome = outcome.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "✅ Transcription finished"
        );
        record_transcription(TranscriptionRecord::new(
            provider.kind(),
            &request,
            &outcome,
            audio_bytes,
            started.elapsed(),
        ));

        reply.send(outcome);
    }
}

/// Entry point for transcription requests.
///
/// Each request goes through: availability check (rejected requests resolve
/// to `Failed` on the caller's thread), bounded queue (a full queue also
/// resolves to `Failed` right away), then a worker that reads the file and runs
/// the cloud or local path. Exactly one outcome is delivered per request.
///
/// Must be constructed inside a tokio runtime.
pub struct ProviderDispatcher {
    config: ConfigManager,
    jobs: mpsc::Sender<Job>,
    backends: Arc<Backends>,
}

impl ProviderDispatcher {
    pub fn new(config: ConfigManager) -> Result<Self, TranscriptionError> {
        Ok(Self::with_components(
            config,
            HttpTransport::new()?,
            LocalEngineSlot::default(),
        ))
    }

    pub fn with_components(
        config: ConfigManager,
        transport: HttpTransport,
        local: LocalEngineSlot,
    ) -> Self {
        let workers = config.get().workers;
        let (jobs, queue) = mpsc::channel(workers.queue_capacity.max(1));
        let backends = Arc::new(Backends {
            cloud: CloudTranscriber::new(transport),
            local,
        });

        spawn_scheduler(queue, Arc::clone(&backends), workers.max_concurrent.max(1));
        info!(
            max_concurrent = workers.max_concurrent.max(1),
            queue_capacity = workers.queue_capacity.max(1),
            "Transcription dispatcher ready"
        );

        Self {
            config,
            jobs,
            backends,
        }
    }

    pub fn engine_state(&self) -> EngineState {
        self.backends.local.state()
    }

    /// Whether the configured provider could take a request right now.
    pub fn is_available(&self, provider: ProviderKind) -> bool {
        let placeholder = TranscriptionRequest::new("availability-check");
        check_availability(&self.config.get(), provider, &placeholder).is_ok()
    }

    /// Queues `request` on the configured provider.
    pub fn submit(&self, request: TranscriptionRequest) -> PendingTranscription {
        let provider = self.config.get().provider;
        self.submit_to(provider, request)
    }

    pub fn submit_to(
        &self,
        provider: ProviderKind,
        request: TranscriptionRequest,
    ) -> PendingTranscription {
        let (tx, rx) = oneshot::channel();
        if let Err((outcome, reply)) = self.enqueue(provider, request, Reply::channel(tx)) {
            reply.send(outcome);
        }
        PendingTranscription { rx }
    }

    /// Callback flavour of `submit`: `observer` hears exactly one of its four
    /// notifications. Rejections are delivered before this returns.
    pub fn prompt(
        &self,
        request: TranscriptionRequest,
        observer: Arc<dyn TranscriptionObserver>,
    ) {
        let provider = self.config.get().provider;
        self.prompt_to(provider, request, observer);
    }

    pub fn prompt_to(
        &self,
        provider: ProviderKind,
        request: TranscriptionRequest,
        observer: Arc<dyn TranscriptionObserver>,
    ) {
        if let Err((outcome, reply)) = self.enqueue(provider, request, Reply::observer(observer)) {
            reply.send(outcome);
        }
    }

    fn enqueue(
        &self,
        provider: ProviderKind,
        request: TranscriptionRequest,
        reply: Reply,
    ) -> Result<(), (TranscriptionOutcome, Reply)> {
        let config = self.config.get();
        let resolved = match check_availability(&config, provider, &request) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(provider = provider.as_str(), "Rejected transcription request: {}", err);
                return Err((TranscriptionOutcome::from_result(Err(err)), reply));
            }
        };

        let job = Job {
            request,
            provider: resolved,
            reply,
            enqueued_at: Instant::now(),
        };

        match self.jobs.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    "Transcription queue is full, rejecting {:?}",
                    job.request.file_path()
                );
                let outcome =
                    TranscriptionOutcome::from_result(Err(TranscriptionError::QueueFull));
                Err((outcome, job.reply))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => Err((
                TranscriptionOutcome::Failed("transcription dispatcher has shut down".to_string()),
                job.reply,
            )),
        }
    }
}

fn spawn_scheduler(
    mut queue: mpsc::Receiver<Job>,
    backends: Arc<Backends>,
    max_concurrent: usize,
) {
    let permits = Arc::new(Semaphore::new(max_concurrent));

    // A job leaves the queue only once a worker slot is free, so the queue's
    // capacity bounds everything that is waiting.
    tokio::spawn(async move {
        loop {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let Some(job) = queue.recv().await else {
                break;
            };
            let backends = Arc::clone(&backends);
            tokio::spawn(async move {
                backends.run(job).await;
                drop(permit);
            });
        }
        debug!("Transcription scheduler stopped");
    });
}
