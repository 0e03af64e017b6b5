//! Streaming example for the llm-relay dispatcher.
//!
//! Demonstrates:
//! - Loading engine configuration from the environment
//! - Streaming one output unit at a time
//! - Requesting several outputs and buffering them
//! - Serving a repeated request from the in-memory cache
//!
//! To run this example, set at least one provider key:
//!
//! ```bash
//! export OPENAI_API_KEY=your_api_key_here   # or ANTHROPIC_API_KEY
//! cargo run --example stream_completion
//! ```

use futures_util::StreamExt;
use llm_relay::{
    CompletionInput, CompletionRequest, Dispatcher, EngineConfig, Error, MemoryCache, OutputUnit,
    Quality,
};
use std::io::Write;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env()?;
    let model = std::env::var("LLM_MODEL").ok();
    let dispatcher = Dispatcher::new(config)?.with_cache(Arc::new(MemoryCache::default()));

    let prompt = CompletionInput::system("You are a helpful assistant that responds concisely.")
        .with_user("Tell me a short story about a robot learning to paint.");
    let mut request = CompletionRequest::new(prompt)
        .quality(Quality::Low)
        .temperature(0.7)
        .max_tokens(150);
    request.model_id = model.clone();

    println!("=== Streaming ===");
    let completion = dispatcher.dispatch(request.clone()).await?;
    println!("[{} / {}]", completion.provider(), completion.model());
    let mut stream = completion.into_stream();
    while let Some(unit) = stream.next().await {
        match unit? {
            OutputUnit::TextDelta { text } => {
                print!("{text}");
                std::io::stdout().flush()?;
            }
            OutputUnit::ChatMessage { content, .. } => println!("{content}"),
            OutputUnit::MediaReference { uri, .. } => println!("[media: {uri}]"),
        }
    }

    println!("\n\n=== Cached replay ===");
    let completion = dispatcher.dispatch(request).await?;
    println!("served from cache: {}", completion.is_cached());
    println!("{}", completion.text().await?);

    println!("\n=== Two outputs, buffered ===");
    let mut request = CompletionRequest::new(CompletionInput::user("Name a colour."))
        .num_outputs(2)
        .no_cache();
    request.model_id = model;
    let outputs = dispatcher.dispatch(request).await?.buffer().await?;
    for (index, output) in outputs.iter().enumerate() {
        println!("choice {index}: {}", output.text);
    }

    Ok(())
}
