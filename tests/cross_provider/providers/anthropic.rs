use super::{load_fixture, ProviderConfig, ProviderTestSetup, QUESTION, SYSTEM};
use llm_relay::{EngineConfig, ProviderKind};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct AnthropicTestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for AnthropicTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "anthropic",
            model_id: "anthropic",
            concrete_model: "claude-3-5-haiku-latest",
        }
    }

    fn engine_config(base_url: &str) -> EngineConfig {
        EngineConfig::new()
            .with_anthropic_key("test-api-key")
            .with_base_url(ProviderKind::Anthropic, base_url)
    }

    async fn mount_answer_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let payload = |stream: bool| {
            let mut payload = json!({
                "model": "claude-3-5-haiku-latest",
                "messages": [{"role": "user", "content": QUESTION}],
                "system": SYSTEM,
                "max_tokens": 1024,
                "temperature": 0.0
            });
            if stream {
                payload["stream"] = json!(true);
            }
            payload
        };

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_json(payload(true)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/anthropic/messages_stream.sse",
                    ))
                    .insert_header("content-type", "text/event-stream"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_json(payload(false)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/anthropic/message_response.json",
                    ))
                    .insert_header("content-type", "application/json"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
