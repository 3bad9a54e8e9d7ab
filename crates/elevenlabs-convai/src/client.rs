//! Conversation session over the ElevenLabs Conversational AI WebSocket.

use crate::messages::{ClientMessage, ServerMessage, SignedUrlResponse};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use callbridge_core::{
    AgentConnector, AgentSession, AgentSessionError, AudioInterface, SessionObservers,
};
use futures_util::{SinkExt, Stream, StreamExt, stream::SplitSink};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{Instrument, debug, error, info, warn};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.elevenlabs.io";
pub const DEFAULT_WS_BASE: &str = "wss://api.elevenlabs.io";

type AgentSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Connection settings for one agent.
#[derive(Debug)]
pub struct ConversationConfig {
    pub agent_id: String,
    pub api_key: Option<SecretString>,
    /// When set, a signed URL is fetched with the API key before connecting.
    pub requires_auth: bool,
    pub api_base: String,
    pub ws_base: String,
}

impl ConversationConfig {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            api_key: None,
            requires_auth: true,
            api_base: DEFAULT_API_BASE.to_string(),
            ws_base: DEFAULT_WS_BASE.to_string(),
        }
    }

    /// URL of the unauthenticated conversation endpoint.
    pub fn public_url(&self) -> Result<Url, AgentSessionError> {
        let mut url = Url::parse(&format!(
            "{}/v1/convai/conversation",
            self.ws_base.trim_end_matches('/')
        ))
        .map_err(|e| AgentSessionError::Connect(format!("invalid WebSocket base: {e}")))?;
        url.query_pairs_mut().append_pair("agent_id", &self.agent_id);
        Ok(url)
    }

    /// URL of the endpoint that hands out signed conversation URLs.
    pub fn signed_url_endpoint(&self) -> Result<Url, AgentSessionError> {
        let mut url = Url::parse(&format!(
            "{}/v1/convai/conversation/get_signed_url",
            self.api_base.trim_end_matches('/')
        ))
        .map_err(|e| AgentSessionError::Connect(format!("invalid API base: {e}")))?;
        url.query_pairs_mut().append_pair("agent_id", &self.agent_id);
        Ok(url)
    }

    async fn resolve_url(&self, http: &reqwest::Client) -> Result<String, AgentSessionError> {
        if !self.requires_auth {
            return Ok(self.public_url()?.to_string());
        }
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            AgentSessionError::Connect("an API key is required for authenticated agents".into())
        })?;
        let response = http
            .get(self.signed_url_endpoint()?)
            .header("xi-api-key", api_key.expose_secret())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AgentSessionError::Connect(format!("signed URL request failed: {e}")))?;
        let body: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| AgentSessionError::Protocol(format!("bad signed URL response: {e}")))?;
        Ok(body.signed_url)
    }
}

/// Creates one [`Conversation`] per call from a shared configuration.
pub struct ElevenLabsConnector {
    config: Arc<ConversationConfig>,
    http: reqwest::Client,
}

impl ElevenLabsConnector {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }
}

impl AgentConnector for ElevenLabsConnector {
    fn connect(
        &self,
        audio: Arc<dyn AudioInterface>,
        observers: SessionObservers,
    ) -> Box<dyn AgentSession> {
        Box::new(Conversation::new(
            self.config.clone(),
            self.http.clone(),
            audio,
            observers,
        ))
    }
}

/// One conversation with an ElevenLabs agent.
pub struct Conversation {
    config: Arc<ConversationConfig>,
    http: reqwest::Client,
    audio: Arc<dyn AudioInterface>,
    observers: SessionObservers,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<Option<String>>>,
    started: bool,
}

impl Conversation {
    pub fn new(
        config: Arc<ConversationConfig>,
        http: reqwest::Client,
        audio: Arc<dyn AudioInterface>,
        observers: SessionObservers,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            http,
            audio,
            observers,
            shutdown,
            task: None,
            started: false,
        }
    }
}

#[async_trait]
impl AgentSession for Conversation {
    async fn start_session(&mut self) -> Result<(), AgentSessionError> {
        if self.started {
            return Err(AgentSessionError::AlreadyStarted);
        }
        self.started = true;

        let url = self.config.resolve_url(&self.http).await?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| AgentSessionError::Connect(e.to_string()))?;
        info!(agent_id = %self.config.agent_id, "Connected to conversational agent.");

        let (mut agent_tx, agent_rx) = ws_stream.split();
        send_message(&mut agent_tx, &ClientMessage::initiation())
            .await
            .map_err(|e| AgentSessionError::Protocol(e.to_string()))?;

        let (input_tx, input_rx) = mpsc::unbounded_channel::<Bytes>();
        self.audio.start(Arc::new(move |chunk: Bytes| {
            // The receiver only goes away once the session loop has exited.
            let _ = input_tx.send(chunk);
        }));

        let shutdown_rx = self.shutdown.subscribe();
        let audio = self.audio.clone();
        let observers = self.observers.clone();
        self.task = Some(tokio::spawn(run_session(
            agent_tx,
            agent_rx,
            input_rx,
            shutdown_rx,
            audio,
            observers,
        )
        .in_current_span()));
        Ok(())
    }

    fn end_session(&self) {
        self.shutdown.send_replace(true);
    }

    async fn wait_for_session_end(&mut self) -> Result<Option<String>, AgentSessionError> {
        match self.task.take() {
            Some(handle) => handle
                .await
                .map_err(|e| AgentSessionError::Task(e.to_string())),
            None => Ok(None),
        }
    }
}

async fn send_message(sink: &mut AgentSink, message: &ClientMessage) -> anyhow::Result<()> {
    let payload = serde_json::to_string(message)?;
    sink.send(WsMessage::Text(payload.into())).await?;
    Ok(())
}

/// Per-conversation bookkeeping for server events.
#[derive(Debug, Default)]
struct ConversationState {
    conversation_id: Option<String>,
    last_interrupt_id: u64,
}

impl ConversationState {
    /// Applies one server event, returning a reply to send back if any.
    fn apply(
        &mut self,
        message: ServerMessage,
        audio: &dyn AudioInterface,
        observers: &SessionObservers,
    ) -> Option<ClientMessage> {
        match message {
            ServerMessage::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: event,
            } => {
                info!(conversation_id = %event.conversation_id, "Conversation initiated.");
                self.conversation_id = Some(event.conversation_id);
                None
            }
            ServerMessage::Audio { audio_event } => {
                if audio_event.event_id <= self.last_interrupt_id {
                    debug!(
                        event_id = audio_event.event_id,
                        "Dropping audio superseded by an interruption."
                    );
                    return None;
                }
                match BASE64.decode(audio_event.audio_base_64.as_bytes()) {
                    Ok(decoded) => audio.output(Bytes::from(decoded)),
                    Err(e) => warn!(event_id = audio_event.event_id, "Undecodable agent audio: {}", e),
                }
                None
            }
            ServerMessage::Interruption { interruption_event } => {
                info!(event_id = interruption_event.event_id, "Agent interrupted.");
                self.last_interrupt_id = interruption_event.event_id;
                audio.interrupt();
                None
            }
            ServerMessage::AgentResponse {
                agent_response_event,
            } => {
                observers.agent_response(&agent_response_event.agent_response);
                None
            }
            ServerMessage::UserTranscript {
                user_transcription_event,
            } => {
                observers.user_transcript(&user_transcription_event.user_transcript);
                None
            }
            ServerMessage::Ping { ping_event } => Some(ClientMessage::pong(ping_event.event_id)),
            ServerMessage::Other => None,
        }
    }
}

async fn run_session<R>(
    mut agent_tx: AgentSink,
    mut agent_rx: R,
    mut input_rx: mpsc::UnboundedReceiver<Bytes>,
    mut shutdown_rx: watch::Receiver<bool>,
    audio: Arc<dyn AudioInterface>,
    observers: SessionObservers,
) -> Option<String>
where
    R: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut state = ConversationState::default();
    let mut running = !*shutdown_rx.borrow();

    while running {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Conversation end requested.");
                    running = false;
                }
            }
            Some(chunk) = input_rx.recv() => {
                let message = ClientMessage::user_audio(BASE64.encode(&chunk));
                if let Err(e) = send_message(&mut agent_tx, &message).await {
                    error!("Failed to send caller audio to agent: {}", e);
                    running = false;
                }
            }
            msg_result = agent_rx.next() => {
                match msg_result {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if let Some(reply) = state.apply(message, audio.as_ref(), &observers) {
                                    if let Err(e) = send_message(&mut agent_tx, &reply).await {
                                        error!("Failed to reply to agent: {}", e);
                                        running = false;
                                    }
                                }
                            }
                            Err(e) => warn!("Unparseable agent message ({}): {}", e, text),
                        }
                    }
                    Some(Ok(WsMessage::Close(close_frame))) => {
                        info!(?close_frame, "Agent closed the conversation.");
                        running = false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Error reading from agent WebSocket: {}", e);
                        running = false;
                    }
                    None => running = false,
                }
            }
        }
    }

    audio.stop();
    if let Err(e) = agent_tx.close().await {
        debug!("Agent socket close failed: {}", e);
    }
    state.conversation_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AudioEvent, InterruptionEvent, PingEvent, UserTranscriptionEvent};
    use callbridge_core::InputCallback;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAudio {
        events: Mutex<Vec<String>>,
    }

    impl AudioInterface for RecordingAudio {
        fn start(&self, _input_callback: InputCallback) {
            self.events.lock().unwrap().push("start".into());
        }
        fn stop(&self) {
            self.events.lock().unwrap().push("stop".into());
        }
        fn output(&self, audio: Bytes) {
            self.events
                .lock()
                .unwrap()
                .push(format!("output:{}", audio.len()));
        }
        fn interrupt(&self) {
            self.events.lock().unwrap().push("interrupt".into());
        }
    }

    fn audio_event(event_id: u64, bytes: &[u8]) -> ServerMessage {
        ServerMessage::Audio {
            audio_event: AudioEvent {
                audio_base_64: BASE64.encode(bytes),
                event_id,
            },
        }
    }

    #[test]
    fn test_public_url_encodes_agent_id() {
        let mut config = ConversationConfig::new("agent 42");
        config.ws_base = "wss://example.test/".into();
        assert_eq!(
            config.public_url().unwrap().as_str(),
            "wss://example.test/v1/convai/conversation?agent_id=agent+42"
        );
    }

    #[test]
    fn test_signed_url_endpoint() {
        let config = ConversationConfig::new("abc");
        assert_eq!(
            config.signed_url_endpoint().unwrap().as_str(),
            "https://api.elevenlabs.io/v1/convai/conversation/get_signed_url?agent_id=abc"
        );
    }

    #[tokio::test]
    async fn test_resolve_url_without_key_fails_when_auth_required() {
        let config = ConversationConfig::new("abc");
        let err = config
            .resolve_url(&reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentSessionError::Connect(_)));
    }

    #[tokio::test]
    async fn test_resolve_url_public_agent() {
        let mut config = ConversationConfig::new("abc");
        config.requires_auth = false;
        let url = config.resolve_url(&reqwest::Client::new()).await.unwrap();
        assert_eq!(url, "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=abc");
    }

    #[test]
    fn test_audio_after_interruption_is_dropped() {
        let audio = RecordingAudio::default();
        let observers = SessionObservers::default();
        let mut state = ConversationState::default();

        state.apply(audio_event(1, &[1, 2, 3]), &audio, &observers);
        state.apply(
            ServerMessage::Interruption {
                interruption_event: InterruptionEvent { event_id: 2 },
            },
            &audio,
            &observers,
        );
        state.apply(audio_event(2, &[4]), &audio, &observers);
        state.apply(audio_event(3, &[5, 6]), &audio, &observers);

        assert_eq!(
            *audio.events.lock().unwrap(),
            vec!["output:3", "interrupt", "output:2"]
        );
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let audio = RecordingAudio::default();
        let mut state = ConversationState::default();
        let reply = state.apply(
            ServerMessage::Ping {
                ping_event: PingEvent {
                    event_id: 11,
                    ping_ms: Some(40),
                },
            },
            &audio,
            &SessionObservers::default(),
        );
        assert_eq!(reply, Some(ClientMessage::pong(11)));
    }

    #[test]
    fn test_transcripts_reach_observers() {
        let audio = RecordingAudio::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observers = SessionObservers {
            agent_response: None,
            user_transcript: Some(Arc::new(move |text: &str| {
                sink.lock().unwrap().push(text.to_string())
            })),
        };
        let mut state = ConversationState::default();
        state.apply(
            ServerMessage::UserTranscript {
                user_transcription_event: UserTranscriptionEvent {
                    user_transcript: "I need an appointment".into(),
                },
            },
            &audio,
            &observers,
        );
        assert_eq!(*seen.lock().unwrap(), vec!["I need an appointment"]);
    }

    #[tokio::test]
    async fn test_wait_without_start_returns_none() {
        let mut conversation = Conversation::new(
            Arc::new(ConversationConfig::new("abc")),
            reqwest::Client::new(),
            Arc::new(RecordingAudio::default()),
            SessionObservers::default(),
        );
        conversation.end_session();
        assert_eq!(conversation.wait_for_session_end().await.unwrap(), None);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_task_logs_inside_the_caller_span() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let agent = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            // Initiation message.
            ws.next().await.unwrap().unwrap();
            let metadata = r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv_1"}}"#;
            ws.send(WsMessage::Text(metadata.into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut config = ConversationConfig::new("abc");
        config.requires_auth = false;
        config.ws_base = format!("ws://{addr}");
        let mut conversation = Conversation::new(
            Arc::new(config),
            reqwest::Client::new(),
            Arc::new(RecordingAudio::default()),
            SessionObservers::default(),
        );
        let span = tracing::info_span!("call", call_id = "C1");
        conversation.start_session().instrument(span).await.unwrap();
        let conversation_id = conversation.wait_for_session_end().await.unwrap();
        agent.await.unwrap();

        assert_eq!(conversation_id.as_deref(), Some("conv_1"));
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = text
            .lines()
            .find(|line| line.contains("Conversation initiated."))
            .expect("session task should log the initiation");
        assert!(line.contains("call{call_id=\"C1\"}"), "{line}");
    }
}
