#![deny(missing_docs)]

//! Core library for the RAGForge document question-answering session service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Conversation engine and generative backend clients.
pub mod conversation;
/// Uploaded document validation.
pub mod document;
/// Structured logging and tracing setup.
pub mod logging;
/// Session activity counters.
pub mod metrics;
/// Simulated pipeline configuration model.
pub mod pipeline;
/// Timed processing stage sequencer.
pub mod sequencer;
/// Session lifecycle orchestration.
pub mod session;
