//! AI Integration Module
//!
//! LLM provider abstraction and the capability wrapper the segmentation
//! engine branches on.

pub mod capability;
pub mod provider;

pub use capability::{
    complete_with_retry, extract_json_payload, parse_json_response, LlmCallOptions, LlmCapability,
};
pub use provider::{
    AIProvider, CompletionRequest, CompletionResponse, FailingAIProvider, MockAIProvider,
};
