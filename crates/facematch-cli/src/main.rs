use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facematch_chat::{ChatEngine, ChatReply, ChatRequest, OpenAiResponder};
use facematch_core::{BboxMode, OnnxExtractor};
use facematchd::dto::{DetectRequest, DetectResponse, HealthResponse, RecognizeRequest, RecognizeResponse};
use facematchd::{spawn_engine, Config, FaceService};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facematch", version, about = "Face recognition from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in a `{"imageData": ...}` request
    Detect {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Match faces against the request's `knownFaces`
    Recognize {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        engine: EngineArgs,
        /// Match tolerance (overrides config and the request)
        #[arg(short, long)]
        tolerance: Option<f32>,
    },
    /// Answer a `{"message": ..., "context": ...}` question
    Chat {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Query a running facematchd
    Status {
        /// Daemon base URL
        #[arg(long, env = "FACEMATCH_URL", default_value = "http://127.0.0.1:8000")]
        url: String,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Read the JSON request from a file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[derive(Args)]
struct EngineArgs {
    /// Directory holding det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "FACEMATCH_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Bounding box format: absolute or percentage
    #[arg(long, env = "FACEMATCH_BBOX_MODE")]
    bbox_mode: Option<BboxMode>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Past this point every outcome, failures included, is a JSON document on stdout.
    match cli.command {
        Commands::Detect { input, engine } => {
            let Some(request) = read_request::<DetectRequest>(&input) else {
                return ExitCode::FAILURE;
            };
            let response = detect(&request, &engine).await;
            emit(&response, response.error.is_none())
        }
        Commands::Recognize {
            input,
            engine,
            tolerance,
        } => {
            let Some(mut request) = read_request::<RecognizeRequest>(&input) else {
                return ExitCode::FAILURE;
            };
            if tolerance.is_some() {
                request.tolerance = tolerance;
            }
            let response = recognize(&request, &engine).await;
            emit(&response, response.error.is_none())
        }
        Commands::Chat { input } => {
            let Some(request) = read_request::<ChatRequest>(&input) else {
                return ExitCode::FAILURE;
            };
            match chat(&request).await {
                Ok(reply) => emit(&reply, true),
                Err(e) => emit(&ChatReply::failure(format!("{e:#}")), false),
            }
        }
        Commands::Status { url } => status(&url).await,
    }
}

async fn detect(request: &DetectRequest, args: &EngineArgs) -> DetectResponse {
    match local_service(args) {
        Ok(service) => service.detect(request).await,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "cannot start engine");
            DetectResponse::failure(format!("{e:#}"), 0)
        }
    }
}

async fn recognize(request: &RecognizeRequest, args: &EngineArgs) -> RecognizeResponse {
    match local_service(args) {
        Ok(service) => service.recognize(request).await,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "cannot start engine");
            RecognizeResponse::failure(format!("{e:#}"), Vec::new(), 0)
        }
    }
}

async fn chat(request: &ChatRequest) -> Result<ChatReply> {
    let config = Config::load()?;
    let responder = OpenAiResponder::new(config.responder_config())?;
    let engine = ChatEngine::new(Arc::new(responder), config.chat_settings());
    Ok(engine.answer(request).await?)
}

/// Read and parse the request. On failure prints `{"error": ...}` and returns `None`.
fn read_request<T: DeserializeOwned>(args: &InputArgs) -> Option<T> {
    let parsed = read_input(args).and_then(|raw| {
        serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid request: {e}"))
    });
    match parsed {
        Ok(request) => Some(request),
        Err(e) => {
            emit(&serde_json::json!({ "error": format!("{e:#}") }), false);
            None
        }
    }
}

fn read_input(args: &InputArgs) -> Result<String> {
    match &args.input {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn local_service(args: &EngineArgs) -> Result<FaceService> {
    let mut config = Config::load()?;
    if let Some(dir) = &args.model_dir {
        config.models.dir = dir.clone();
    }
    if let Some(mode) = args.bbox_mode {
        config.matching.bbox_mode = mode;
    }

    let extractor = OnnxExtractor::load(&config.models.dir)
        .with_context(|| format!("loading models from {}", config.models.dir.display()))?;
    let engine = spawn_engine(Box::new(extractor))?;
    Ok(FaceService::new(
        engine,
        config.recognize_options(),
        config.expected_dim(),
        None,
    ))
}

fn emit(value: &impl Serialize, ok: bool) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            println!("{}", serde_json::json!({ "error": format!("cannot serialize response: {e}") }));
            return ExitCode::FAILURE;
        }
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn status(url: &str) -> ExitCode {
    let endpoint = format!("{}/health", url.trim_end_matches('/'));
    let response = match reqwest::get(&endpoint).await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "health request failed");
            println!("facematchd: not reachable at {url}");
            return ExitCode::FAILURE;
        }
    };
    if !response.status().is_success() {
        println!("facematchd: unhealthy ({})", response.status());
        return ExitCode::FAILURE;
    }
    match response.json::<HealthResponse>().await {
        Ok(health) => {
            println!("facematchd {}: {} ({})", health.version, health.status, url);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("facematchd: unexpected health response: {e}");
            ExitCode::FAILURE
        }
    }
}
