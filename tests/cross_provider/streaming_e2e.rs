use futures_util::StreamExt;
use llm_relay::{CompletionInput, CompletionRequest, Dispatcher, OutputUnit, Quality};
use wiremock::MockServer;

use super::providers::{
    anthropic::AnthropicTestSetup, openai::OpenAITestSetup, ProviderTestSetup, ANSWER, QUESTION,
    SYSTEM,
};

fn request(model_id: &str, stream: bool) -> CompletionRequest {
    CompletionRequest::new(CompletionInput::system(SYSTEM).with_user(QUESTION))
        .model(model_id)
        .quality(Quality::Low)
        .temperature(0.0)
        .streaming(stream)
}

/// Streamed deltas must reconstruct exactly what the single-document response returns.
async fn run_stream_equivalence_test<T: ProviderTestSetup>(
) -> Result<(), Box<dyn std::error::Error>> {
    let config = T::get_config();

    let mock_server = MockServer::start().await;
    T::mount_answer_mocks(&mock_server).await?;

    let dispatcher = Dispatcher::new(T::engine_config(&mock_server.uri()))?;

    // Streamed: only text deltas, delivered one by one
    let completion = dispatcher.dispatch(request(config.model_id, true)).await?;
    assert_eq!(completion.provider(), config.name);
    assert_eq!(completion.model(), config.concrete_model);

    let mut stream = completion.into_stream();
    let mut deltas = Vec::new();
    while let Some(unit) = stream.next().await {
        match unit? {
            OutputUnit::TextDelta { text } => deltas.push(text),
            other => panic!("{}: unexpected unit in stream: {other:?}", config.name),
        }
    }
    assert!(
        deltas.len() > 1,
        "{}: expected incremental delivery",
        config.name
    );
    let streamed = deltas.concat();

    // Buffered: one complete message
    let completion = dispatcher.dispatch(request(config.model_id, false)).await?;
    let outputs = completion.buffer().await?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].messages.len(), 1);
    let buffered = outputs[0].text.clone();

    assert_eq!(streamed, ANSWER, "{}: streamed text", config.name);
    assert_eq!(streamed, buffered, "{}: stream/document mismatch", config.name);

    Ok(())
}

#[tokio::test]
async fn test_openai_stream_matches_document() {
    run_stream_equivalence_test::<OpenAITestSetup>()
        .await
        .expect("OpenAI stream equivalence failed");
}

#[tokio::test]
async fn test_anthropic_stream_matches_document() {
    run_stream_equivalence_test::<AnthropicTestSetup>()
        .await
        .expect("Anthropic stream equivalence failed");
}
