//! Conversational command handling.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::session::{ConversationState, SessionStore};
use crate::chart::{ChartRenderer, Variant};
use crate::delivery::{deliver_artifact, ConversationId, MessageSink, RetryPolicy};
use crate::depth::{Band, DepthDataset, Symbol};
use crate::error::DeliveryError;
use crate::utils::{chunk_messages, MAX_MESSAGE_LEN};

const START_TEXT: &str = "Hi! I draw limit order book depth charts.\nSend /help for the list of commands.";
const HELP_TEXT: &str = "/symbols - list available tickers\n\
/depth - bid and ask depth\n\
/depth_ratio - bid to ask depth ratio\n\
/depth_diff - bid and ask depth difference, %\n\
/cancel - drop the pending command\n\n\
After a chart command send a ticker, e.g. BTCUSDT.";
const IDLE_HINT: &str = "Send a chart command first. /help lists them.";
const TICKER_PROMPT: &str = "Input ticker";

/// Routes incoming text to commands and drives the fetch, render and
/// deliver pipeline.
pub struct Dispatcher {
    datasets: DepthDataset,
    renderer: ChartRenderer,
    sink: Arc<dyn MessageSink>,
    sessions: Arc<SessionStore>,
    policy: RetryPolicy,
    limit: u32,
    send_interval: Duration,
    symbols: RwLock<Arc<HashSet<String>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("limit", &self.limit)
            .field("policy", &self.policy)
            .field("pending", &self.sessions.pending())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher with a 1000-record limit, the default send policy and a
    /// 500 ms pause between charts.
    pub fn new(
        datasets: DepthDataset,
        renderer: ChartRenderer,
        sink: Arc<dyn MessageSink>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            datasets,
            renderer,
            sink,
            sessions,
            policy: RetryPolicy::default(),
            limit: 1000,
            send_interval: Duration::from_millis(500),
            symbols: RwLock::new(Arc::new(HashSet::new())),
        }
    }

    /// Set the send retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the depth record limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Set the pause between consecutive charts.
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Conversation states.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Handle one incoming message. Errors are text send failures; chart
    /// failures are reported to the conversation and logged.
    #[instrument(skip(self, conversation), fields(conversation = %conversation))]
    pub async fn handle(&self, conversation: &ConversationId, text: &str) -> Result<(), DeliveryError> {
        let text = text.trim();
        if let Some(command) = parse_command(text) {
            return self.command(conversation, &command).await;
        }

        // Taking the state claims the ticker; a second message racing this
        // one sees Idle.
        match self.sessions.take(conversation) {
            ConversationState::AwaitingTicker { variant } => {
                self.ticker(conversation, text, variant).await
            }
            ConversationState::Idle => self.reply(conversation, IDLE_HINT).await,
        }
    }

    async fn command(&self, conversation: &ConversationId, command: &str) -> Result<(), DeliveryError> {
        match command {
            "start" => self.reply(conversation, START_TEXT).await,
            "help" => self.reply(conversation, HELP_TEXT).await,
            "symbols" => self.list_symbols(conversation).await,
            "depth" => self.await_ticker(conversation, Variant::Raw).await,
            "depth_ratio" => self.await_ticker(conversation, Variant::Ratio).await,
            "depth_diff" => self.await_ticker(conversation, Variant::Differential).await,
            "cancel" => {
                self.sessions.take(conversation);
                self.reply(conversation, "Cancelled").await
            }
            other => {
                self.reply(conversation, &format!("Unknown command /{}. Send /help", other))
                    .await
            }
        }
    }

    async fn list_symbols(&self, conversation: &ConversationId) -> Result<(), DeliveryError> {
        let symbols = self.datasets.fetch_symbols().await;
        if symbols.is_empty() {
            return self.reply(conversation, "No symbols available").await;
        }
        self.remember_symbols(&symbols);
        for chunk in chunk_messages(&symbols, MAX_MESSAGE_LEN, ", ") {
            self.reply(conversation, &chunk).await?;
        }
        Ok(())
    }

    async fn await_ticker(&self, conversation: &ConversationId, variant: Variant) -> Result<(), DeliveryError> {
        let symbols = self.datasets.fetch_symbols().await;
        self.remember_symbols(&symbols);
        self.sessions
            .set(conversation, ConversationState::AwaitingTicker { variant });
        self.reply(conversation, TICKER_PROMPT).await
    }

    async fn ticker(
        &self,
        conversation: &ConversationId,
        text: &str,
        variant: Variant,
    ) -> Result<(), DeliveryError> {
        let symbol = match Symbol::parse(text) {
            Ok(symbol) => symbol,
            Err(e) => {
                self.keep_waiting(conversation, variant);
                return self
                    .reply(conversation, &format!("{}. {}", e, TICKER_PROMPT))
                    .await;
            }
        };
        if !self.is_known(&symbol) {
            self.keep_waiting(conversation, variant);
            return self
                .reply(conversation, &format!("Unknown ticker {}. {}", symbol, TICKER_PROMPT))
                .await;
        }

        info!(symbol = %symbol, variant = %variant, "Ticker accepted");

        let Some(dataset) = self.datasets.fetch_depth(symbol.as_str(), self.limit).await else {
            return self
                .reply(conversation, &format!("No data for {}", symbol))
                .await;
        };
        self.reply(conversation, &format!("Len:{}", dataset.len()))
            .await?;

        let dataset = Arc::new(dataset);
        let renders = join_all(
            Band::all().map(|band| self.renderer.render_blocking(dataset.clone(), band, variant)),
        )
        .await;

        for (index, (band, rendered)) in Band::all().zip(renders).enumerate() {
            if index > 0 && !self.send_interval.is_zero() {
                tokio::time::sleep(self.send_interval).await;
            }
            match rendered {
                Ok(artifact) => {
                    if let Err(e) =
                        deliver_artifact(self.sink.as_ref(), conversation, artifact, &self.policy).await
                    {
                        warn!(band = %band, error = %e, "Chart not delivered");
                    }
                }
                Err(e) => {
                    warn!(band = %band, error = %e, "Chart not rendered");
                    self.reply(
                        conversation,
                        &format!("Failed to render {}: {}", variant.description(band), e),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    fn keep_waiting(&self, conversation: &ConversationId, variant: Variant) {
        self.sessions
            .restore(conversation, ConversationState::AwaitingTicker { variant });
    }

    fn remember_symbols(&self, symbols: &[String]) {
        if symbols.is_empty() {
            return;
        }
        let known: HashSet<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        if let Ok(mut guard) = self.symbols.write() {
            *guard = Arc::new(known);
        }
    }

    /// Membership is only enforced once a symbol list has been seen.
    fn is_known(&self, symbol: &Symbol) -> bool {
        let known = match self.symbols.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(_) => return true,
        };
        known.is_empty() || known.contains(symbol.as_str())
    }

    async fn reply(&self, conversation: &ConversationId, text: &str) -> Result<(), DeliveryError> {
        self.sink.send_text(conversation, text).await
    }
}

/// `/cmd@bot args` -> `cmd`, lowercased.
fn parse_command(text: &str) -> Option<String> {
    let rest = text.strip_prefix('/')?;
    let word = rest.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    (!name.is_empty()).then(|| name.to_lowercase())
}
