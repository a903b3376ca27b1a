//! Relay between WebSocket clients and an OpenAI-compatible chat-completion
//! service.
//!
//! A client message names a prompt template, carries the conversation and
//! picks a response mode (`int`, `string`, `full`, `stream`). The relay
//! injects the template as the system message, calls upstream, shapes the
//! answer for the mode and pushes it back to the client's connection.

pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod logger;
pub mod relay;
pub mod subsystems;
