use anyhow::{bail, Context, Result};
use futures::future::join_all;
use notescribe_rs::{
    logging::NotescribeFormatter, ConfigManager, ProviderDispatcher, ProviderKind,
    TranscriptionOutcome, TranscriptionRequest,
};
use std::env;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str =
    "usage: notescribe [--local|--cloud] [--prompt TEXT] [--mime TYPE] FILE...";

struct CliArgs {
    provider: Option<ProviderKind>,
    prompt: Option<String>,
    mime_type: Option<String>,
    files: Vec<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs {
        provider: None,
        prompt: None,
        mime_type: None,
        files: Vec::new(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--local" => parsed.provider = Some(ProviderKind::Local),
            "--cloud" => parsed.provider = Some(ProviderKind::Cloud),
            "--prompt" => parsed.prompt = Some(args.next().context("--prompt needs a value")?),
            "--mime" => parsed.mime_type = Some(args.next().context("--mime needs a value")?),
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown flag '{}'\n{}", flag, USAGE),
            _ => parsed.files.push(arg),
        }
    }

    if parsed.files.is_empty() {
        bail!(USAGE);
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notescribe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().event_format(NotescribeFormatter::new()))
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<bool> {
    let args = parse_args(env::args().skip(1))?;

    let config_manager = ConfigManager::load()?;
    config_manager.start_watching();
    apply_environment(&config_manager)?;

    let config = config_manager.get();
    let provider = args.provider.unwrap_or(config.provider);
    info!("✅ Configuration loaded");
    info!("   Provider: {}", provider);
    info!("   Cloud model: {}", config.cloud.model);
    info!(
        "   Workers: {} (queue {})",
        config.workers.max_concurrent, config.workers.queue_capacity
    );

    let dispatcher = ProviderDispatcher::new(config_manager)
        .context("Failed to start the transcription dispatcher")?;

    let pending: Vec<_> = args
        .files
        .iter()
        .map(|file| {
            let mut request = TranscriptionRequest::new(file.as_str());
            if let Some(prompt) = &args.prompt {
                request = request.with_prompt_hint(prompt.as_str());
            }
            if let Some(mime) = &args.mime_type {
                request = request.with_mime_type(mime.as_str());
            }
            dispatcher.submit_to(provider, request)
        })
        .collect();

    let outcomes = join_all(pending).await;

    let mut all_ok = true;
    for (file, outcome) in args.files.iter().zip(outcomes) {
        if matches!(
            outcome,
            TranscriptionOutcome::Failed(_) | TranscriptionOutcome::RateLimited
        ) {
            all_ok = false;
        }
        println!("{}: {}", file, outcome);
    }

    Ok(all_ok)
}

fn apply_environment(config_manager: &ConfigManager) -> Result<()> {
    if let Ok(raw) = env::var("NOTESCRIBE_PROVIDER") {
        if !raw.trim().is_empty() {
            let provider: ProviderKind = raw.parse()?;
            config_manager.update(|config| config.provider = provider);
        }
    }

    if let Ok(key) = env::var("OPENAI_API_KEY") {
        if !key.trim().is_empty() && config_manager.get().cloud.api_key().is_empty() {
            config_manager.update(|config| config.cloud.api_key = key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_flags_and_files() {
        let parsed = parse_args(args(&[
            "--local", "--prompt", "names", "a.ogg", "--mime", "audio/wav", "b.wav",
        ]))
        .unwrap();

        assert_eq!(parsed.provider, Some(ProviderKind::Local));
        assert_eq!(parsed.prompt.as_deref(), Some("names"));
        assert_eq!(parsed.mime_type.as_deref(), Some("audio/wav"));
        assert_eq!(parsed.files, vec!["a.ogg", "b.wav"]);
    }

    #[test]
    fn requires_at_least_one_file() {
        assert!(parse_args(args(&["--cloud"])).is_err());
        assert!(parse_args(args(&["--prompt"])).is_err());
        assert!(parse_args(args(&["--bogus", "a.ogg"])).is_err());
    }
}
