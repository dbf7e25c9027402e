//! API Module
//!
//! Gemini `generateContent` wire types.

pub mod generate;

pub use generate::{
    Candidate, Content, ErrorBody, ErrorDetail, ErrorEnvelope, GenerateContentRequest,
    GenerateContentResponse, InlineData, Part, UsageMetadata,
};
