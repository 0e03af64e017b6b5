use super::{load_fixture, ProviderConfig, ProviderTestSetup, QUESTION, SYSTEM};
use llm_relay::{EngineConfig, ProviderKind};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct OpenAITestSetup;

#[async_trait::async_trait]
impl ProviderTestSetup for OpenAITestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "openai",
            model_id: "openai",
            concrete_model: "gpt-4o-mini",
        }
    }

    fn engine_config(base_url: &str) -> EngineConfig {
        EngineConfig::new()
            .with_openai_key("test-api-key")
            .with_base_url(ProviderKind::OpenAI, base_url)
    }

    async fn mount_answer_mocks(
        mock_server: &MockServer,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let messages = json!([
            {"role": "system", "content": SYSTEM},
            {"role": "user", "content": QUESTION}
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_json(json!({
                "model": "gpt-4o-mini",
                "messages": messages,
                "temperature": 0.0,
                "stream": true
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/openai/chat_stream.sse",
                    ))
                    .insert_header("content-type", "text/event-stream")
                    .insert_header("cache-control", "no-cache"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_json(json!({
                "model": "gpt-4o-mini",
                "messages": messages,
                "temperature": 0.0
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(load_fixture(
                        "tests/cross_provider/fixtures/openai/chat_response.json",
                    ))
                    .insert_header("content-type", "application/json"),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Ok(())
    }
}
