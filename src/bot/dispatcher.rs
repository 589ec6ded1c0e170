//! Update dispatcher: long-poll loop, message routing and the expiry sweeper.
//!
//! Each chat has one lane: a task fed through a channel that handles the
//! chat's messages one at a time, in arrival order, across `getUpdates`
//! batches. Different chats run concurrently. A lane stops after sitting idle;
//! the next message for that chat starts a fresh lane, which first waits for
//! the old one to finish.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::{AudioItem, ConversationId, PipelineOrchestrator, Reply, EXPIRED};
use crate::pipeline::{GENERIC_FAILURE, SEND_AUDIO_FIRST};

use super::telegram::{ChatTransport, FileRef, Message, Update};

pub const START_TEXT: &str = "Hi! Send me an audio file or a voice message and I will \
transcribe it or translate its transcript into another language.";

pub const HELP_TEXT: &str = "How to use this bot:\n\
1. Send an audio file or a voice message.\n\
2. Pick \"Transcribe\" or \"Translate\".\n\
3. For a translation, send the target language as a FLORES-200 code \
(fra_Latn, deu_Latn, rus_Cyrl, zho_Hans…).\n\
Commands: /start, /help, /info";

pub const INFO_TEXT: &str = "Speech is recognised with Whisper and translated with \
NLLB-200, one line per recognised segment.";

pub const UNKNOWN_COMMAND: &str = "Sorry, I don't know that command. Try /help.";

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How long a chat lane waits for another message before stopping.
const LANE_IDLE: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Inbound classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Info,
    Unknown(String),
}

impl Command {
    /// Parse `/name@bot args`; only the name matters.
    fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or_default();
        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "info" => Command::Info,
            _ => Command::Unknown(name.to_string()),
        })
    }
}

/// What an inbound message means to the bot.
#[derive(Debug, Clone)]
pub enum Inbound {
    Command(Command),
    Audio(FileRef),
    Text(String),
    Unsupported,
}

/// Route a message. Audio wins over text; documents count as audio only
/// when their MIME type says so.
pub fn classify(message: &Message) -> Inbound {
    if let Some(file) = message.audio.as_ref().or(message.voice.as_ref()) {
        return Inbound::Audio(file.clone());
    }
    if let Some(doc) = &message.document {
        let is_audio = doc
            .mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("audio/"));
        return if is_audio {
            Inbound::Audio(doc.clone())
        } else {
            Inbound::Unsupported
        };
    }
    match message.text.as_deref() {
        Some(text) => match Command::parse(text) {
            Some(cmd) => Inbound::Command(cmd),
            None => Inbound::Text(text.to_string()),
        },
        None => Inbound::Unsupported,
    }
}

fn command_reply(command: &Command, pipeline: &PipelineOrchestrator) -> Reply {
    match command {
        Command::Start => Reply::with_keyboard(START_TEXT, pipeline.labels().keyboard()),
        Command::Help => Reply::text(HELP_TEXT),
        Command::Info => Reply::text(INFO_TEXT),
        Command::Unknown(name) => {
            log::debug!("bot: unknown command /{name}");
            Reply::text(UNKNOWN_COMMAND)
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    pipeline: Arc<PipelineOrchestrator>,
    audio_dir: PathBuf,
    sweep_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        pipeline: Arc<PipelineOrchestrator>,
        audio_dir: PathBuf,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            transport,
            pipeline,
            audio_dir,
            sweep_interval,
        }
    }

    /// Poll forever. Transport errors back off exponentially up to 30 s.
    pub async fn run(self) {
        let sweeper = tokio::spawn(sweep_loop(
            Arc::clone(&self.transport),
            Arc::clone(&self.pipeline),
            self.sweep_interval,
        ));

        let mut lanes = Lanes::new(Arc::new(self.worker()), LANE_IDLE);
        let mut offset: Option<i64> = None;
        let mut backoff = Duration::from_secs(1);

        loop {
            let updates = match self.transport.get_updates(offset).await {
                Ok(updates) => {
                    backoff = Duration::from_secs(1);
                    updates
                }
                Err(e) => {
                    log::warn!("bot: getUpdates failed ({e}); retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            if let Some(last) = updates.iter().map(|u| u.update_id).max() {
                offset = Some(last + 1);
            }

            lanes.prune();
            for (conversation, messages) in group_by_conversation(updates) {
                for message in messages {
                    lanes.push(conversation, message);
                }
            }

            if sweeper.is_finished() {
                log::error!("bot: expiry sweeper stopped");
                break;
            }
        }

        lanes.close().await;
    }

    fn worker(&self) -> Worker {
        Worker {
            transport: Arc::clone(&self.transport),
            pipeline: Arc::clone(&self.pipeline),
            audio_dir: self.audio_dir.clone(),
        }
    }
}

/// Messages per chat, chats in first-seen order, messages in update order.
fn group_by_conversation(updates: Vec<Update>) -> Vec<(ConversationId, Vec<Message>)> {
    let mut groups: Vec<(ConversationId, Vec<Message>)> = Vec::new();
    for message in updates.into_iter().filter_map(|u| u.message) {
        let id = message.conversation();
        match groups.iter_mut().find(|(c, _)| *c == id) {
            Some((_, list)) => list.push(message),
            None => groups.push((id, vec![message])),
        }
    }
    groups
}

// ---------------------------------------------------------------------------
// Lanes
// ---------------------------------------------------------------------------

struct Lane {
    tx: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

/// One ordered message lane per conversation.
struct Lanes {
    worker: Arc<Worker>,
    idle: Duration,
    lanes: HashMap<ConversationId, Lane>,
}

impl Lanes {
    fn new(worker: Arc<Worker>, idle: Duration) -> Self {
        Self {
            worker,
            idle,
            lanes: HashMap::new(),
        }
    }

    /// Queue `message` behind everything already sent for `conversation`.
    fn push(&mut self, conversation: ConversationId, message: Message) {
        let message = match self.lanes.get(&conversation) {
            Some(lane) => match lane.tx.send(message) {
                Ok(()) => return,
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let previous = self.lanes.remove(&conversation).map(|lane| lane.task);
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(message).is_err() {
            return;
        }
        let task = tokio::spawn(run_lane(
            Arc::clone(&self.worker),
            conversation,
            rx,
            previous,
            self.idle,
        ));
        self.lanes.insert(conversation, Lane { tx, task });
    }

    /// Forget lanes whose task has ended.
    fn prune(&mut self) {
        self.lanes.retain(|_, lane| !lane.task.is_finished());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Stop accepting messages and wait until every queued one is handled.
    async fn close(self) {
        for (conversation, lane) in self.lanes {
            drop(lane.tx);
            if let Err(e) = lane.task.await {
                log::error!("bot: lane for {conversation} panicked: {e}");
            }
        }
    }
}

async fn run_lane(
    worker: Arc<Worker>,
    conversation: ConversationId,
    mut rx: mpsc::UnboundedReceiver<Message>,
    previous: Option<JoinHandle<()>>,
    idle: Duration,
) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            log::error!("bot: previous lane for {conversation} panicked: {e}");
        }
    }

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(message)) => worker.handle_message(conversation, message).await,
            Ok(None) => return,
            Err(_) => break,
        }
    }

    // Idle: refuse new messages, then finish whatever slipped in meanwhile.
    rx.close();
    while let Some(message) = rx.recv().await {
        worker.handle_message(conversation, message).await;
    }
    log::debug!("bot: lane for {conversation} idle, stopped");
}

async fn sweep_loop(
    transport: Arc<dyn ChatTransport>,
    pipeline: Arc<PipelineOrchestrator>,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        for conversation in pipeline.sweep_expired(Instant::now()).await {
            if let Err(e) = transport.send_reply(conversation, &Reply::text(EXPIRED)).await {
                log::warn!("bot: expiry notice to {conversation} failed: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Handles the messages of one conversation.
struct Worker {
    transport: Arc<dyn ChatTransport>,
    pipeline: Arc<PipelineOrchestrator>,
    audio_dir: PathBuf,
}

impl Worker {
    async fn handle_message(&self, conversation: ConversationId, message: Message) {
        let reply = self.respond(conversation, classify(&message)).await;
        if let Err(e) = self.transport.send_reply(conversation, &reply).await {
            log::warn!("bot: reply to {conversation} failed: {e}");
        }
    }

    async fn respond(&self, conversation: ConversationId, inbound: Inbound) -> Reply {
        match inbound {
            Inbound::Command(command) => command_reply(&command, &self.pipeline),
            Inbound::Audio(file) => {
                match self.transport.fetch_audio(&file, &self.audio_dir).await {
                    Ok(path) => {
                        let audio = AudioItem::new(file.file_id, path);
                        self.pipeline.handle_audio(conversation, audio).await
                    }
                    Err(e) => {
                        log::error!("bot: download for {conversation} failed: {e}");
                        Reply::text(GENERIC_FAILURE)
                    }
                }
            }
            Inbound::Text(text) => self.pipeline.handle_text(conversation, &text).await,
            Inbound::Unsupported => Reply::text(SEND_AUDIO_FIRST),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::telegram::{BotError, Chat};
    use crate::config::AppConfig;
    use crate::pipeline::{PROMPT_ACTION, PROMPT_LANGUAGE};
    use crate::stt::MockEngine;
    use crate::translate::{languages, TranslateError, Translator};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ConversationId, Reply)>>,
        fail_downloads: bool,
        download_delay: Duration,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn get_updates(&self, _offset: Option<i64>) -> Result<Vec<Update>, BotError> {
            Ok(Vec::new())
        }

        async fn send_reply(
            &self,
            conversation: ConversationId,
            reply: &Reply,
        ) -> Result<(), BotError> {
            self.sent.lock().unwrap().push((conversation, reply.clone()));
            Ok(())
        }

        async fn fetch_audio(&self, file: &FileRef, dir: &Path) -> Result<PathBuf, BotError> {
            if self.fail_downloads {
                return Err(BotError::MissingFilePath(file.file_id.clone()));
            }
            if !self.download_delay.is_zero() {
                tokio::time::sleep(self.download_delay).await;
            }
            Ok(dir.join(format!("{}.ogg", file.file_id)))
        }
    }

    struct Upper;

    #[async_trait]
    impl Translator for Upper {
        fn supports(&self, tag: &str) -> bool {
            languages::is_supported(tag)
        }

        async fn translate(&self, text: &str, _s: &str, _t: &str) -> Result<String, TranslateError> {
            Ok(text.to_uppercase())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn message(chat: i64) -> Message {
        Message {
            message_id: 1,
            chat: Chat { id: chat },
            text: None,
            audio: None,
            voice: None,
            document: None,
        }
    }

    fn text(chat: i64, body: &str) -> Message {
        Message {
            text: Some(body.into()),
            ..message(chat)
        }
    }

    fn voice(chat: i64, id: &str) -> Message {
        Message {
            voice: Some(FileRef {
                file_id: id.into(),
                mime_type: Some("audio/ogg".into()),
                file_name: None,
            }),
            ..message(chat)
        }
    }

    fn worker(transport: Arc<RecordingTransport>) -> Worker {
        let stt = Arc::new(MockEngine::ok(&[("Hello", 0, 1_000), ("world", 1_000, 2_000)]));
        let pipeline = PipelineOrchestrator::from_config(&AppConfig::default(), stt, Arc::new(Upper));
        Worker {
            transport,
            pipeline: Arc::new(pipeline),
            audio_dir: PathBuf::from("/nonexistent/audio"),
        }
    }

    fn replies(transport: &RecordingTransport) -> Vec<String> {
        transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.text.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    #[test]
    fn commands_are_recognised() {
        assert!(matches!(classify(&text(1, "/start")), Inbound::Command(Command::Start)));
        assert!(matches!(classify(&text(1, "/help@scribe_bot")), Inbound::Command(Command::Help)));
        assert!(matches!(classify(&text(1, " /INFO now")), Inbound::Command(Command::Info)));
        assert!(matches!(
            classify(&text(1, "/foo")),
            Inbound::Command(Command::Unknown(ref n)) if n == "foo"
        ));
    }

    #[test]
    fn plain_text_is_text() {
        assert!(matches!(classify(&text(1, "Transcribe")), Inbound::Text(ref t) if t == "Transcribe"));
    }

    #[test]
    fn voice_and_audio_documents_are_audio() {
        assert!(matches!(classify(&voice(1, "v")), Inbound::Audio(ref f) if f.file_id == "v"));

        let doc = Message {
            document: Some(FileRef {
                file_id: "d".into(),
                mime_type: Some("audio/mpeg".into()),
                file_name: Some("talk.mp3".into()),
            }),
            ..message(1)
        };
        assert!(matches!(classify(&doc), Inbound::Audio(_)));

        let pdf = Message {
            document: Some(FileRef {
                file_id: "p".into(),
                mime_type: Some("application/pdf".into()),
                file_name: None,
            }),
            ..message(1)
        };
        assert!(matches!(classify(&pdf), Inbound::Unsupported));
        assert!(matches!(classify(&message(1)), Inbound::Unsupported));
    }

    #[test]
    fn updates_group_per_chat_in_order() {
        let updates = vec![
            Update { update_id: 1, message: Some(text(10, "a")) },
            Update { update_id: 2, message: Some(text(20, "b")) },
            Update { update_id: 3, message: None },
            Update { update_id: 4, message: Some(text(10, "c")) },
        ];
        let groups = group_by_conversation(updates);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, ConversationId(10));
        let texts: Vec<_> = groups[0].1.iter().map(|m| m.text.clone().unwrap()).collect();
        assert_eq!(texts, ["a", "c"]);
    }

    // -----------------------------------------------------------------------
    // Conversations end to end
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn transcribe_conversation() {
        let transport = Arc::new(RecordingTransport::default());
        let w = worker(transport.clone());
        let chat = ConversationId(3);

        w.handle_message(chat, voice(3, "v1")).await;
        w.handle_message(chat, text(3, "Transcribe")).await;

        assert_eq!(replies(&transport), [PROMPT_ACTION, "Hello\nworld"]);
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].1.keyboard.is_some());
        assert!(sent.iter().all(|(c, _)| *c == chat));
    }

    #[tokio::test]
    async fn translate_conversation() {
        let transport = Arc::new(RecordingTransport::default());
        let w = worker(transport.clone());
        let chat = ConversationId(3);

        w.handle_message(chat, voice(3, "v1")).await;
        w.handle_message(chat, text(3, "Translate")).await;
        w.handle_message(chat, text(3, "deu_Latn")).await;

        assert_eq!(
            replies(&transport),
            [PROMPT_ACTION, PROMPT_LANGUAGE, "Translation into deu_Latn:\nHELLO\nWORLD"]
        );
    }

    #[tokio::test]
    async fn commands_and_stray_messages_get_canned_replies() {
        let transport = Arc::new(RecordingTransport::default());
        let w = worker(transport.clone());
        let chat = ConversationId(3);

        w.handle_message(chat, text(3, "/start")).await;
        w.handle_message(chat, text(3, "/nope")).await;
        w.handle_message(chat, message(3)).await;
        w.handle_message(chat, text(3, "Transcribe")).await;

        assert_eq!(
            replies(&transport),
            [START_TEXT, UNKNOWN_COMMAND, SEND_AUDIO_FIRST, SEND_AUDIO_FIRST]
        );
        assert!(transport.sent.lock().unwrap()[0].1.keyboard.is_some());
    }

    #[tokio::test]
    async fn failed_download_is_reported_and_leaves_no_state() {
        let transport = Arc::new(RecordingTransport {
            fail_downloads: true,
            ..RecordingTransport::default()
        });
        let w = worker(transport.clone());
        let chat = ConversationId(3);

        w.handle_message(chat, voice(3, "v1")).await;
        assert_eq!(replies(&transport), [GENERIC_FAILURE]);
        assert!(w.pipeline.store().is_empty());
    }

    // -----------------------------------------------------------------------
    // Lanes
    // -----------------------------------------------------------------------

    fn slow_download_lanes(transport: Arc<RecordingTransport>, idle: Duration) -> Lanes {
        Lanes::new(Arc::new(worker(transport)), idle)
    }

    #[tokio::test(start_paused = true)]
    async fn later_batch_waits_for_slow_download() {
        let transport = Arc::new(RecordingTransport {
            download_delay: Duration::from_secs(5),
            ..RecordingTransport::default()
        });
        let mut lanes = slow_download_lanes(transport.clone(), LANE_IDLE);
        let chat = ConversationId(3);

        // Two separate getUpdates batches.
        lanes.push(chat, voice(3, "v1"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        lanes.push(chat, text(3, "Transcribe"));
        assert_eq!(lanes.len(), 1);

        lanes.close().await;
        assert_eq!(replies(&transport), [PROMPT_ACTION, "Hello\nworld"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_lane_is_replaced_and_keeps_state() {
        let transport = Arc::new(RecordingTransport::default());
        let mut lanes = slow_download_lanes(transport.clone(), Duration::from_secs(1));
        let chat = ConversationId(3);

        lanes.push(chat, voice(3, "v1"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        lanes.prune();
        assert_eq!(lanes.len(), 0);

        lanes.push(chat, text(3, "Transcribe"));
        lanes.close().await;
        assert_eq!(replies(&transport), [PROMPT_ACTION, "Hello\nworld"]);
    }

    #[tokio::test(start_paused = true)]
    async fn chats_do_not_wait_for_each_other() {
        let transport = Arc::new(RecordingTransport {
            download_delay: Duration::from_secs(5),
            ..RecordingTransport::default()
        });
        let mut lanes = slow_download_lanes(transport.clone(), LANE_IDLE);

        lanes.push(ConversationId(3), voice(3, "v1"));
        lanes.push(ConversationId(4), text(4, "/help"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(replies(&transport), [HELP_TEXT]);

        lanes.close().await;
        assert_eq!(replies(&transport), [HELP_TEXT, PROMPT_ACTION]);
    }
}
