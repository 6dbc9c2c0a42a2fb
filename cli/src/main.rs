use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ask::config::Config;
use ask::playback::{PlaybackSink, RodioOutput};
use ask::session::PipelineSession;
use llm_core::ChatClient;
use tts_core::{OpenTtsClient, SynthesisStage};

/// Ask a local AI agent something and hear the answer as it streams in.
#[derive(Parser)]
#[command(name = "ask", version)]
struct Cli {
    /// Prompt text (words are joined with spaces)
    prompt: Vec<String>,

    /// Read the prompt from a file instead
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Save prompt and reply transcripts under the output folder
    #[arg(short = 's', long = "save")]
    save: bool,

    /// Voice identifier passed to the synthesis service
    #[arg(long)]
    voice: Option<String>,

    /// Model name passed to the chat service
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let config = Config::from_env();

    let prompt = match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot open prompt file {}", path.display()))?,
        None => cli.prompt.join(" "),
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("say something to reach me");
    }

    let model = cli.model.unwrap_or_else(|| config.llm_model.clone());
    let voice = cli.voice.unwrap_or_else(|| config.default_voice.clone());

    let cancel = CancellationToken::new();
    {
        // first Ctrl-C silences playback; the transcript still completes
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("stop requested, silencing playback");
                cancel.cancel();
            }
        });
    }

    let chat = ChatClient::new(&config.ollama_base_url, &model);
    let synth = Arc::new(SynthesisStage::new(
        Arc::new(OpenTtsClient::new(&config.opentts_base_url)),
        voice,
    ));
    let sink = Arc::new(PlaybackSink::new(Arc::new(RodioOutput::new(cancel.clone()))));

    let session = PipelineSession::new(synth, sink, cancel);

    let outcome = session
        .run(chat.stream_chat(prompt.clone()), |delta| {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .await;
    println!("\n");

    if cli.save {
        if let Err(e) = save_transcripts(&config.output_dir, &prompt, &outcome.transcript) {
            warn!(error = %e, "could not save transcript files");
        }
    }

    match outcome.error {
        Some(e) => Err(anyhow::Error::new(e).context("session ended with an error")),
        None => Ok(()),
    }
}

/// Persist the prompt and the full reply under a per-generation id.
fn save_transcripts(dir: &str, prompt: &str, reply: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create output folder {dir}"))?;

    let now = chrono::Local::now();
    let short = uuid::Uuid::new_v4().simple().to_string();
    let id = format!("{}_{}", now.format("%Y-%m-%d_%H:%M:%S"), &short[..5]);

    let prompt_path = format!("{dir}/{id}.prompt.txt");
    std::fs::write(&prompt_path, prompt)?;
    info!("saved prompt to {prompt_path}");

    let reply_path = format!("{dir}/{id}.reply.txt");
    std::fs::write(&reply_path, reply)?;
    info!("saved reply to {reply_path}");

    Ok(())
}
