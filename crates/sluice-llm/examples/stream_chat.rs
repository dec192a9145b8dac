use anyhow::Result;
use sluice_llm::{
    CancellationToken, ChatClient, Message, ModelDescriptor, ModelSelector, ModelType,
    OpenAIClient, ProviderSettings, StreamEvent,
};
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Streams one completion to stdout.
///
/// ```bash
/// export OPENAI_API_KEY=sk-...
/// # optional: OPENAI_BASE_URL=https://my-resource.openai.azure.com
/// # (Azure endpoints also need OPENAI_API_VERSION=2024-10-21)
/// cargo run -p sluice-llm --example stream_chat -- "Why is the sky blue?"
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sluice_llm=debug,info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let prompt = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let prompt = if prompt.is_empty() {
        "Say hello in three languages.".to_string()
    } else {
        prompt
    };

    let model = ModelSelector::new(|model_type| match model_type {
        ModelType::Large => ModelDescriptor::new("gpt-4o", 4096).with_name("GPT-4o"),
        ModelType::Small => ModelDescriptor::new("gpt-4o-mini", 2048).with_name("GPT-4o mini"),
    });
    let options = ProviderSettings::from_env().into_options(model)?;
    let client = OpenAIClient::new(options)?;

    tracing::info!(variant = ?client.options().variant(), "starting stream");

    // Ctrl-C cancels the in-flight stream
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut events = client.stream(cancel, &[Message::user(prompt)], &[])?;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::ContentDelta { content } => {
                print!("{}", content);
                stdout.flush()?;
            }
            StreamEvent::ReasoningDelta { .. } | StreamEvent::ToolCallDelta { .. } => {}
            StreamEvent::Complete { response } => {
                println!();
                println!("\n[finish: {:?}, usage: {:?}]", response.finish_reason, response.usage);
            }
            StreamEvent::Error { error } => {
                println!();
                anyhow::bail!("stream failed ({:?}): {}", error.kind, error.message);
            }
        }
    }

    Ok(())
}
