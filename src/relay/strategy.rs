//! Response modes and the strategy each one runs.
//!
//! | mode     | upstream  | post-processing        | pushes                      |
//! |----------|-----------|------------------------|-----------------------------|
//! | `full`   | sync      | none                   | 1 (raw answer)              |
//! | `int`    | sync      | integer grammar        | 1 (digit run)               |
//! | `string` | sync      | word grammar           | 1 (matched words)           |
//! | `stream` | streaming | confusables per chunk  | 1 per fragment + `<END>`    |
//!
//! A strategy either delivers and returns `Ok`, or returns `Err`. A failed
//! extraction pushes nothing.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::llm::{AssembledMessages, CompletionClient};

use super::extract::{Grammar, extract};
use super::sink::{ConnectionTarget, DeliverySink};
use super::{DeliveryReport, RelayError, confusables};

/// Final push of every successful stream.
pub const SENTINEL: &str = "<END>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Int,
    String,
    Full,
    Stream,
}

impl ResponseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Int => "int",
            ResponseMode::String => "string",
            ResponseMode::Full => "full",
            ResponseMode::Stream => "stream",
        }
    }

    pub fn strategy(self) -> &'static dyn Strategy {
        const INT: Extract = Extract { grammar: Grammar::Integer };
        const WORDS: Extract = Extract { grammar: Grammar::Words };
        match self {
            ResponseMode::Int => &INT,
            ResponseMode::String => &WORDS,
            ResponseMode::Full => &FullText,
            ResponseMode::Stream => &Streamed,
        }
    }
}

impl FromStr for ResponseMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(ResponseMode::Int),
            "string" => Ok(ResponseMode::String),
            "full" => Ok(ResponseMode::Full),
            "stream" => Ok(ResponseMode::Stream),
            other => Err(RelayError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a strategy needs for one call.
pub struct CallContext<'a> {
    pub client: &'a CompletionClient,
    pub messages: &'a AssembledMessages,
    pub sink: &'a dyn DeliverySink,
    pub target: &'a ConnectionTarget,
}

impl CallContext<'_> {
    async fn push(&self, data: &[u8]) -> Result<(), RelayError> {
        self.sink
            .push(self.target, data)
            .await
            .map_err(RelayError::ConnectionGone)
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn run(&self, ctx: &CallContext<'_>) -> Result<DeliveryReport, RelayError>;
}

// ── full ──────────────────────────────────────────────────────────────────────

pub struct FullText;

#[async_trait]
impl Strategy for FullText {
    async fn run(&self, ctx: &CallContext<'_>) -> Result<DeliveryReport, RelayError> {
        let model = ctx.client.resolve_model().await;
        let answer = ctx
            .client
            .complete_sync(&model, ctx.messages)
            .await
            .map_err(RelayError::Upstream)?;

        ctx.push(answer.as_bytes()).await?;
        Ok(DeliveryReport { pushes: 1 })
    }
}

// ── int / string ──────────────────────────────────────────────────────────────

pub struct Extract {
    grammar: Grammar,
}

#[async_trait]
impl Strategy for Extract {
    async fn run(&self, ctx: &CallContext<'_>) -> Result<DeliveryReport, RelayError> {
        let model = ctx.client.resolve_model().await;
        let answer = ctx
            .client
            .complete_sync(&model, ctx.messages)
            .await
            .map_err(RelayError::Upstream)?;

        let value = match extract(self.grammar, &answer) {
            Ok(value) => value,
            Err(no_match) => {
                warn!(
                    connection_id = %ctx.target.connection_id,
                    grammar = ?self.grammar,
                    "no delimited value in upstream answer"
                );
                return Err(RelayError::ExtractionFailed { source_text: no_match.source_text });
            }
        };

        debug!(value = %value.as_str(), "extracted value");
        ctx.push(value.as_str().as_bytes()).await?;
        Ok(DeliveryReport { pushes: 1 })
    }
}

// ── stream ────────────────────────────────────────────────────────────────────

pub struct Streamed;

#[async_trait]
impl Strategy for Streamed {
    async fn run(&self, ctx: &CallContext<'_>) -> Result<DeliveryReport, RelayError> {
        let model = ctx.client.resolve_model().await;
        let mut fragments = ctx
            .client
            .complete_stream(&model, ctx.messages)
            .await
            .map_err(RelayError::Upstream)?;

        // Early returns drop `fragments`, which closes the upstream body.
        let mut pushes = 0;
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment.map_err(RelayError::Stream)?;
            ctx.push(confusables::normalize(&fragment).as_bytes()).await?;
            pushes += 1;
        }
        drop(fragments);

        debug!(connection_id = %ctx.target.connection_id, fragments = pushes, "stream complete");
        ctx.push(SENTINEL.as_bytes()).await?;
        Ok(DeliveryReport { pushes: pushes + 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        for mode in [ResponseMode::Int, ResponseMode::String, ResponseMode::Full, ResponseMode::Stream] {
            assert_eq!(mode.as_str().parse::<ResponseMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_is_invalid() {
        let err = "json".parse::<ResponseMode>().unwrap_err();
        assert!(matches!(err, RelayError::InvalidMode(m) if m == "json"));
    }

    #[test]
    fn modes_are_case_sensitive() {
        assert!("FULL".parse::<ResponseMode>().is_err());
        assert!("".parse::<ResponseMode>().is_err());
    }
}
