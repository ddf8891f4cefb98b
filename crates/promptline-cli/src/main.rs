use std::io::Write;

use anyhow::Context;
use clap::Parser;
use promptline_client::{
    Client, CompletionRequest, Message, MessageRequest, StreamError, TypedStream,
};
use promptline_core::PromptlineConfig;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "promptline",
    about = "Send a prompt to the generation API and print the reply."
)]
struct Args {
    /// API key; overrides the config file.
    #[arg(long, env = "PROMPTLINE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = "claude-1")]
    model: String,

    /// Prompt text, or the user message in chat mode.
    #[arg(long)]
    prompt: String,

    /// Print fragments as they arrive.
    #[arg(long)]
    stream: bool,

    /// Use the messages endpoint instead of completions.
    #[arg(long)]
    chat: bool,

    #[arg(long, default_value_t = 256)]
    max_tokens: u32,

    /// Config file (default: ~/.promptline/promptline.toml).
    #[arg(long, env = "PROMPTLINE_CONFIG", value_name = "PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptline=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = PromptlineConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PromptlineConfig::default()
    });
    if args.api_key.is_some() {
        config.api_key = args.api_key.clone();
    }

    let client = Client::from_config(&config).context("set --api-key or PROMPTLINE_API_KEY")?;
    info!(model = %args.model, base_url = client.base_url(), chat = args.chat, "sending prompt");

    match (args.chat, args.stream) {
        (false, false) => {
            let req = CompletionRequest::new(&args.model, &args.prompt, args.max_tokens);
            let resp = client.create_completion(&req).await?;
            println!("{}", resp.text());
        }
        (false, true) => {
            let req = CompletionRequest::new(&args.model, &args.prompt, args.max_tokens);
            let stream = client.stream_completions(&req).await;
            print_stream(stream, |chunk| chunk.text()).await?;
        }
        (true, false) => {
            let req = chat_request(&args);
            let resp = client.create_message(&req).await?;
            println!("{}", resp.content());
        }
        (true, true) => {
            let req = chat_request(&args);
            let stream = client.stream_messages(&req).await;
            print_stream(stream, |chunk| chunk.content().to_string()).await?;
        }
    }

    Ok(())
}

fn chat_request(args: &Args) -> MessageRequest {
    MessageRequest::new(
        &args.model,
        vec![Message::user(&args.prompt)],
        args.max_tokens,
    )
}

/// Drain both channels, writing fragments to stdout and errors to stderr.
///
/// Returns the last stream error, if any, once the stream has closed.
async fn print_stream<T, F>(mut stream: TypedStream<T>, fragment: F) -> anyhow::Result<()>
where
    F: Fn(&T) -> String,
{
    let mut stdout = std::io::stdout();
    let mut last_err: Option<StreamError> = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                write!(stdout, "{}", fragment(&chunk))?;
                stdout.flush()?;
            }
            Err(e) => {
                eprintln!("stream error: {e}");
                last_err = Some(e);
            }
        }
    }
    writeln!(stdout)?;

    match last_err {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
