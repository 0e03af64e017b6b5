pub mod anthropic;
pub mod openai;

use llm_relay::EngineConfig;
use wiremock::MockServer;

/// Question every provider fixture answers.
pub const QUESTION: &str = "What is the capital of France?";
pub const SYSTEM: &str = "Answer in one sentence.";
pub const ANSWER: &str = "The capital of France is Paris.";

/// Provider configuration for cross-provider testing
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub model_id: &'static str,
    pub concrete_model: &'static str,
}

/// Load test fixture from file
pub fn load_fixture(filename: &str) -> String {
    std::fs::read_to_string(filename)
        .unwrap_or_else(|_| panic!("Failed to load test fixture: {filename}"))
}

/// Trait for provider-specific test setup
#[async_trait::async_trait]
pub trait ProviderTestSetup {
    /// Get the provider configuration
    fn get_config() -> ProviderConfig;

    /// Engine configuration pointing the provider at the mock server
    fn engine_config(base_url: &str) -> EngineConfig;

    /// Mount the streamed and the single-document answer on the provided mock server
    async fn mount_answer_mocks(mock_server: &MockServer) -> Result<(), Box<dyn std::error::Error>>;
}
