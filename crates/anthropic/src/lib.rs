// Docket Anthropic provider
//
// Primary generative capability backed by Anthropic's Messages API.

mod driver;

pub use driver::{AnthropicConfig, AnthropicGenerator, DEFAULT_MODEL};

#[cfg(test)]
mod tests;
