mod descriptor;
pub mod types;

pub use descriptor::AnthropicDescriptor;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
