pub mod accumulator;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod status;
pub mod store;
pub mod tools;
pub mod transport;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use accumulator::MessageAccumulator;
pub use config::EngineConfig;
pub use decoder::{FrameDecoder, FrameStream, DATA_PREFIX, DEFAULT_MAX_LINE_BYTES};
pub use error::{EngineError, ExchangeError, TransportError};
pub use events::{ChannelSink, EngineEvent, NoopSink, RenderSink, Severity};
pub use protocol::{ChatRequest, StreamEvent};
pub use session::{HttpSessionLoader, NoSessionLoader, Role, SessionLoader, SessionMessage};
pub use status::{Phase, Status};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use tools::{
    truncate_for_display, HttpToolCatalog, InvocationId, InvocationStatus, ToolCatalog,
    ToolCorrelator, ToolDescriptor, ToolInvocation, ToolStats, ToolStatsSnapshot,
};
pub use transport::{ByteStream, ChatTransport, HttpTransport};

use status::StatusInputs;

const SESSION_RESET_NOTICE: &str = "Previous session could not be loaded. Starting a new one.";
const SESSION_LOADED_NOTICE: &str = "Session loaded successfully";

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEnd {
    /// `complete` event, or the stream closed without a terminal event.
    Completed { session_id: Option<String> },
    Failed(ExchangeError),
    /// Stopped by the caller. Never reported as a failure.
    Aborted,
}

/// Result of one submit-to-terminal cycle.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub end: ExchangeEnd,
    /// Accumulated assistant text as last rendered.
    pub content: String,
    /// False when a failed exchange received no fragment and its message was
    /// discarded.
    pub content_kept: bool,
    pub fragments: usize,
    pub invocations: Vec<ToolInvocation>,
    pub malformed_frames: usize,
}

struct Shared {
    phase: Phase,
    cancel: Option<CancellationToken>,
    agent_ready: bool,
    tools_open: bool,
    content_seen: bool,
    last_status: Status,
    /// Bumped by every accepted submit.
    exchange_seq: u64,
}

impl Shared {
    fn status(&self) -> Status {
        status::project(
            self.phase,
            StatusInputs {
                agent_ready: self.agent_ready,
                tools_open: self.tools_open,
                content_seen: self.content_seen,
            },
        )
    }
}

/// Mutable state of the exchange in flight.
struct Exchange {
    accumulator: MessageAccumulator,
    tools: ToolCorrelator,
}

/// Drives one exchange at a time against the remote agent.
///
/// Exchange state lives for the duration of [`SessionEngine::submit`]; the
/// only state carried between exchanges is the persisted session id, the
/// transcript and the tool counters.
pub struct SessionEngine {
    transport: Box<dyn ChatTransport>,
    store: Box<dyn SessionStore>,
    loader: Box<dyn SessionLoader>,
    sink: Box<dyn RenderSink>,
    stats: Arc<ToolStats>,
    shared: Mutex<Shared>,
    transcript: Mutex<Vec<SessionMessage>>,
}

impl SessionEngine {
    pub fn new(
        transport: impl ChatTransport + 'static,
        store: impl SessionStore + 'static,
        sink: impl RenderSink + 'static,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            store: Box::new(store),
            loader: Box::new(NoSessionLoader),
            sink: Box::new(sink),
            stats: Arc::new(ToolStats::new()),
            shared: Mutex::new(Shared {
                phase: Phase::Idle,
                cancel: None,
                agent_ready: true,
                tools_open: false,
                content_seen: false,
                last_status: Status::Idle,
                exchange_seq: 0,
            }),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// HTTP transport, HTTP session loader and a file or memory store, all
    /// taken from `config`.
    pub fn from_config(config: &EngineConfig, sink: impl RenderSink + 'static) -> Self {
        let client = config.http_client();
        let transport = config.transport(client.clone());
        let loader = config.session_loader(client);
        let engine = match &config.session_file {
            Some(path) => Self::new(transport, FileSessionStore::new(path), sink),
            None => Self::new(transport, MemorySessionStore::new(), sink),
        };
        engine.with_loader(loader)
    }

    pub fn with_loader(mut self, loader: impl SessionLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn status(&self) -> Status {
        self.shared().status()
    }

    pub fn phase(&self) -> Phase {
        self.shared().phase
    }

    pub fn is_busy(&self) -> bool {
        !self.shared().phase.is_idle()
    }

    pub fn tool_stats(&self) -> ToolStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn transcript(&self) -> Vec<SessionMessage> {
        self.transcript_lock().clone()
    }

    pub async fn session_id(&self) -> Result<Option<String>, EngineError> {
        self.store.get().await
    }

    /// Toggle the `initializing` overlay. Fed by an external readiness poller.
    pub fn set_agent_ready(&self, ready: bool) {
        let changed = {
            let mut shared = self.shared();
            shared.agent_ready = ready;
            Self::take_status_change(&mut shared)
        };
        if let Some(status) = changed {
            self.sink.on_status_changed(status);
        }
    }

    /// Restore the persisted session, seeding the transcript with its prior
    /// messages. A session that fails to load is forgotten, not fatal.
    pub async fn restore_session(&self) -> Result<Vec<SessionMessage>, EngineError> {
        if self.is_busy() {
            return Err(EngineError::Busy);
        }

        let Some(session_id) = self.store.get().await? else {
            return Ok(Vec::new());
        };

        match self.loader.load(&session_id).await {
            Ok(messages) => {
                info!(session_id = %session_id, messages = messages.len(), "session restored");
                *self.transcript_lock() = messages.clone();
                self.sink.on_history(&messages);
                self.sink
                    .on_system_message(SESSION_LOADED_NOTICE, Severity::Success);
                Ok(messages)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to load session, starting fresh");
                if let Err(e) = self.store.remove().await {
                    warn!(error = %e, "failed to clear session id");
                }
                self.sink
                    .on_system_message(SESSION_RESET_NOTICE, Severity::Info);
                Ok(Vec::new())
            }
        }
    }

    /// Forget the current session and transcript.
    pub async fn new_chat(&self) -> Result<(), EngineError> {
        if self.is_busy() {
            return Err(EngineError::Busy);
        }
        self.store.remove().await?;
        self.transcript_lock().clear();
        info!("started new chat");
        Ok(())
    }

    /// Cancel the exchange in flight. Returns false when there is none.
    pub fn stop(&self) -> bool {
        match &self.shared().cancel {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Send `message` and stream the reply until a terminal event, a failure
    /// or [`stop`](Self::stop).
    ///
    /// Only caller errors are returned as `Err`; failed exchanges come back as
    /// an outcome with [`ExchangeEnd::Failed`] once the engine is idle again.
    pub async fn submit(&self, message: &str) -> Result<ExchangeOutcome, EngineError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let cancel = CancellationToken::new();
        let (status, seq) = {
            let mut shared = self.shared();
            if !shared.phase.is_idle() {
                return Err(EngineError::Busy);
            }
            shared.phase = Phase::Sending;
            shared.cancel = Some(cancel.clone());
            shared.tools_open = false;
            shared.content_seen = false;
            shared.exchange_seq += 1;
            shared.last_status = shared.status();
            (shared.last_status, shared.exchange_seq)
        };
        let _idle = IdleOnDrop { engine: self, seq };
        self.sink.on_status_changed(status);

        self.transcript_lock()
            .push(SessionMessage::now(Role::User, message));

        let session_id = match self.store.get().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to read session id, sending without one");
                None
            }
        };
        info!(has_session = session_id.is_some(), "exchange started");

        let request = ChatRequest {
            message: message.to_string(),
            session_id,
        };
        let mut exchange = Exchange {
            accumulator: MessageAccumulator::new(),
            tools: ToolCorrelator::new(self.stats.clone()),
        };

        let (end, malformed_frames) = self.run(&request, &cancel, &mut exchange).await;
        Ok(self.finish(end, exchange, malformed_frames).await)
    }

    async fn run(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        exchange: &mut Exchange,
    ) -> (ExchangeEnd, usize) {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (ExchangeEnd::Aborted, 0),
            result = self.transport.open(request) => result,
        };
        let mut body = match opened {
            Ok(stream) => stream.peekable(),
            Err(e) => return (ExchangeEnd::Failed(e.into()), 0),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return (ExchangeEnd::Aborted, 0),
            _ = std::pin::Pin::new(&mut body).peek() => {}
        }
        self.transition(Phase::Streaming);

        let mut frames = FrameStream::new(body);
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break ExchangeEnd::Aborted,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    if let Some(end) = self.apply(event, exchange) {
                        break end;
                    }
                }
                Some(Err(e)) => break ExchangeEnd::Failed(e.into()),
                None => {
                    debug!("stream closed without a terminal event");
                    break ExchangeEnd::Completed { session_id: None };
                }
            }
        };
        (end, frames.decoder().malformed())
    }

    /// Apply one event in wire order. Returns the end of the exchange for
    /// terminal events.
    fn apply(&self, event: StreamEvent, exchange: &mut Exchange) -> Option<ExchangeEnd> {
        match event {
            StreamEvent::Content { content } => {
                let full = exchange.accumulator.append(&content);
                self.sink.on_content_update(full);
            }
            StreamEvent::ToolStart { tool, args } => {
                let invocation = exchange.tools.open(tool, args);
                self.sink.on_tool_opened(invocation);
            }
            StreamEvent::ToolResult {
                tool,
                success,
                result,
            } => {
                if let Some(invocation) = exchange.tools.close(&tool, success, result) {
                    self.sink.on_tool_closed(invocation);
                }
            }
            StreamEvent::Error { message } => {
                return Some(ExchangeEnd::Failed(ExchangeError::Remote(message)));
            }
            StreamEvent::Complete { session_id } => {
                return Some(ExchangeEnd::Completed { session_id });
            }
        }

        let changed = {
            let mut shared = self.shared();
            shared.tools_open = exchange.tools.has_open();
            shared.content_seen = exchange.accumulator.has_fragments();
            Self::take_status_change(&mut shared)
        };
        if let Some(status) = changed {
            self.sink.on_status_changed(status);
        }
        None
    }

    async fn finish(
        &self,
        end: ExchangeEnd,
        exchange: Exchange,
        malformed_frames: usize,
    ) -> ExchangeOutcome {
        match &end {
            ExchangeEnd::Completed { session_id } => {
                self.transition(Phase::Completing);
                if let Some(id) = session_id {
                    if let Err(e) = self.store.set(id).await {
                        warn!(session_id = %id, error = %e, "failed to persist session id");
                    }
                }
                info!(
                    fragments = exchange.accumulator.fragment_count(),
                    "exchange complete"
                );
            }
            ExchangeEnd::Failed(e) => {
                self.transition(Phase::Failing);
                warn!(error = %e, "exchange failed");
                self.sink.on_system_message(&e.to_string(), Severity::Error);
            }
            ExchangeEnd::Aborted => {
                self.transition(Phase::Aborting);
                info!(
                    fragments = exchange.accumulator.fragment_count(),
                    "exchange aborted"
                );
            }
        }

        let fragments = exchange.accumulator.fragment_count();
        let content_kept = fragments > 0;
        let content = exchange.accumulator.into_content();
        if content_kept {
            self.transcript_lock()
                .push(SessionMessage::now(Role::Assistant, content.clone()));
        }

        let outcome = ExchangeOutcome {
            end,
            content,
            content_kept,
            fragments,
            invocations: exchange.tools.into_invocations(),
            malformed_frames,
        };

        self.reset_to_idle();
        self.sink.on_exchange_end(&outcome);
        outcome
    }

    fn transition(&self, phase: Phase) {
        let status = {
            let mut shared = self.shared();
            debug!(from = ?shared.phase, to = ?phase, "phase transition");
            shared.phase = phase;
            let status = shared.status();
            shared.last_status = status;
            status
        };
        self.sink.on_status_changed(status);
    }

    fn reset_to_idle(&self) {
        {
            let mut shared = self.shared();
            shared.cancel = None;
            shared.tools_open = false;
            shared.content_seen = false;
        }
        self.transition(Phase::Idle);
    }

    fn take_status_change(shared: &mut Shared) -> Option<Status> {
        let status = shared.status();
        if status == shared.last_status {
            return None;
        }
        shared.last_status = status;
        Some(status)
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transcript_lock(&self) -> MutexGuard<'_, Vec<SessionMessage>> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the engine to idle if a submit future is dropped mid-exchange.
/// Only touches the exchange it was created for.
struct IdleOnDrop<'a> {
    engine: &'a SessionEngine,
    seq: u64,
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        let token = {
            let mut shared = self.engine.shared();
            if shared.phase.is_idle() || shared.exchange_seq != self.seq {
                return;
            }
            shared.cancel.take()
        };
        debug!(seq = self.seq, "exchange dropped before finishing");
        if let Some(token) = token {
            token.cancel();
        }
        self.engine.reset_to_idle();
    }
}
