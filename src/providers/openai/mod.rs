mod descriptor;
mod images;
pub mod types;

pub use descriptor::{ModelSelection, OpenAIDescriptor};
pub use images::ImageDescriptor;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
