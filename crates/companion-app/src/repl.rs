//! Line-oriented front end.
//!
//! Each input line is parsed into a [`Command`] and executed against the
//! turn pipeline or the help-desk widget. Plain text is sent as a chat turn;
//! everything else starts with `/`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;

use companion_chat::{
    AttachmentUpload, FeedbackLog, FeedbackRating, HealthProbe, TurnOutcome, TurnPipeline,
};
use companion_core::types::{Attachment, AttachmentKind, Message};
use companion_dialogue::{
    DepartmentKind, DialogueController, DialogueState, EmailTemplateKind, PersonSelection,
    AVAILABLE_SLOTS,
};

pub const HELP: &str = "\
Chat:
  <text>                   send a message in the current conversation
  /send [text]             send, including queued attachments
  /attach <path>           queue a file for the next message
  /new                     start a new conversation
  /list                    list conversations
  /select <n>              switch to conversation n
  /delete <n>              delete conversation n
  /show                    print the current conversation
  /edit <n> <text>         replace the text of message n
  /feedback <n> <up|down> [details]
                           rate reply n in the current conversation
  /status                  backend reachability and learning model
Help desk:
  /widget [show]           current stage and choices
  /widget book <coach|department|admin>
  /widget person <id>      /widget date <YYYY-MM-DD>   /widget time <HH:MM>
  /widget note <text>      /widget submit
  /widget chat             /widget agent <id>          /widget say <text>
  /widget email            /widget to <id>             /widget template <id>
  /widget subject <text>   /widget body <text>         /widget send
  /widget back             /widget reset
  /quit";

// =============================================================================
// Parsing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    New,
    List,
    Select(usize),
    Delete(usize),
    Show,
    Edit { index: usize, text: String },
    Attach(PathBuf),
    Feedback {
        index: usize,
        rating: FeedbackRating,
        details: Option<String>,
    },
    Status,
    Widget(WidgetCommand),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetCommand {
    Show,
    Book(DepartmentKind),
    Person(u32),
    Date(NaiveDate),
    Time(String),
    Note(String),
    Submit,
    Chat,
    Agent(u32),
    Say(String),
    Email,
    To(u32),
    Template(EmailTemplateKind),
    Subject(String),
    Body(String),
    Send,
    Back,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command: /{0}")]
    UnknownCommand(String),
    #[error("/{command} needs {expected}")]
    MissingArgument {
        command: String,
        expected: &'static str,
    },
    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, args) = split_word(rest);
    let command = match name {
        "new" => Command::New,
        "list" | "ls" => Command::List,
        "show" => Command::Show,
        "select" => Command::Select(position(name, args)?),
        "delete" => Command::Delete(position(name, args)?),
        "edit" => {
            let (n, text) = split_word(args);
            Command::Edit {
                index: position(name, n)?,
                text: text.to_string(),
            }
        }
        "attach" => Command::Attach(PathBuf::from(required(name, args, "a file path")?)),
        "send" => Command::Say(args.to_string()),
        "feedback" | "rate" => {
            let (n, rest) = split_word(args);
            let index = position(name, n)?;
            let (rating, details) = split_word(rest);
            let rating = match required(name, rating, "up or down")? {
                "up" | "+" => FeedbackRating::Positive,
                "down" | "-" => FeedbackRating::Negative,
                other => {
                    return Err(ParseError::Invalid {
                        what: "rating",
                        value: other.to_string(),
                    })
                }
            };
            Command::Feedback {
                index,
                rating,
                details: (!details.is_empty()).then(|| details.to_string()),
            }
        }
        "status" => Command::Status,
        "widget" | "w" => Command::Widget(parse_widget(args)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_widget(args: &str) -> Result<WidgetCommand, ParseError> {
    let (sub, rest) = split_word(args);
    let command = match sub {
        "" | "show" => WidgetCommand::Show,
        "book" => {
            let key = required("widget book", rest, "a department list")?;
            WidgetCommand::Book(DepartmentKind::from_key(key).ok_or_else(|| {
                ParseError::Invalid {
                    what: "department list",
                    value: key.to_string(),
                }
            })?)
        }
        "person" => WidgetCommand::Person(id("widget person", rest)?),
        "date" => {
            let raw = required("widget date", rest, "a date")?;
            WidgetCommand::Date(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ParseError::Invalid {
                    what: "date",
                    value: raw.to_string(),
                }
            })?)
        }
        "time" => WidgetCommand::Time(required("widget time", rest, "a time slot")?.to_string()),
        "note" => WidgetCommand::Note(rest.to_string()),
        "submit" => WidgetCommand::Submit,
        "chat" => WidgetCommand::Chat,
        "agent" => WidgetCommand::Agent(id("widget agent", rest)?),
        "say" => WidgetCommand::Say(required("widget say", rest, "a message")?.to_string()),
        "email" => WidgetCommand::Email,
        "to" => WidgetCommand::To(id("widget to", rest)?),
        "template" => {
            let key = required("widget template", rest, "a template id")?;
            WidgetCommand::Template(EmailTemplateKind::from_id(key).ok_or_else(|| {
                ParseError::Invalid {
                    what: "template",
                    value: key.to_string(),
                }
            })?)
        }
        "subject" => WidgetCommand::Subject(rest.to_string()),
        // Line-based input: `\n` stands for a line break in the body.
        "body" => WidgetCommand::Body(rest.replace("\\n", "\n")),
        "send" => WidgetCommand::Send,
        "back" => WidgetCommand::Back,
        "reset" => WidgetCommand::Reset,
        other => return Err(ParseError::UnknownCommand(format!("widget {}", other))),
    };
    Ok(command)
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn required<'a>(command: &str, arg: &'a str, expected: &'static str) -> Result<&'a str, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument {
            command: command.to_string(),
            expected,
        });
    }
    Ok(arg)
}

/// 1-based position in a listing.
fn position(command: &str, arg: &str) -> Result<usize, ParseError> {
    let raw = required(command, arg, "a number")?;
    raw.parse::<usize>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| ParseError::Invalid {
            what: "number",
            value: raw.to_string(),
        })
}

fn id(command: &str, arg: &str) -> Result<u32, ParseError> {
    let raw = required(command, arg, "an id")?;
    raw.parse::<u32>().map_err(|_| ParseError::Invalid {
        what: "id",
        value: raw.to_string(),
    })
}

/// MIME type guessed from the file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Execution
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Engine handles the REPL drives, plus attachments queued for the next send.
pub struct Session {
    pipeline: TurnPipeline,
    widget: DialogueController,
    probe: Arc<HealthProbe>,
    feedback: FeedbackLog,
    pending: Vec<AttachmentUpload>,
}

impl Session {
    pub fn new(
        pipeline: TurnPipeline,
        widget: DialogueController,
        probe: Arc<HealthProbe>,
        feedback: FeedbackLog,
    ) -> Self {
        Self {
            pipeline,
            widget,
            probe,
            feedback,
            pending: Vec::new(),
        }
    }

    pub fn pipeline(&self) -> &TurnPipeline {
        &self.pipeline
    }

    pub fn widget(&self) -> &DialogueController {
        &self.widget
    }

    /// Run `command`, writing its output to `out`. Engine errors are printed,
    /// not returned; only a failing `out` is an error.
    pub async fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> std::io::Result<Flow> {
        let repo = self.pipeline.repository().clone();
        match command {
            Command::Say(text) => {
                let conversation_id = match repo.current_id() {
                    Some(id) => id,
                    None => repo.create_conversation(),
                };
                let uploads = std::mem::take(&mut self.pending);
                match self.pipeline.send(conversation_id, &text, uploads).await {
                    Ok(TurnOutcome::Replied { reply, .. }) => writeln!(out, "assistant: {}", reply.text)?,
                    Ok(TurnOutcome::Failed { error, .. }) => writeln!(out, "(no reply: {})", error)?,
                    Ok(TurnOutcome::Abandoned { .. }) => writeln!(out, "(conversation was deleted)")?,
                    Err(e) => writeln!(out, "error: {}", e)?,
                }
            }
            Command::New => {
                repo.create_conversation();
                writeln!(out, "started a new conversation")?;
            }
            Command::List => {
                let current = repo.current_id();
                for (n, conversation) in repo.conversations().iter().enumerate() {
                    let marker = if Some(conversation.id) == current { '*' } else { ' ' };
                    writeln!(
                        out,
                        "{}{:>3}. {} ({} messages)",
                        marker,
                        n + 1,
                        conversation.title,
                        conversation.messages.len()
                    )?;
                }
            }
            Command::Select(n) => match repo.conversations().get(n - 1) {
                Some(conversation) if repo.select_conversation(conversation.id) => {
                    writeln!(out, "switched to \"{}\"", conversation.title)?
                }
                _ => writeln!(out, "error: no conversation {}", n)?,
            },
            Command::Delete(n) => match repo.conversations().get(n - 1) {
                Some(conversation) if repo.delete_conversation(conversation.id) => {
                    writeln!(out, "deleted \"{}\"", conversation.title)?
                }
                _ => writeln!(out, "error: no conversation {}", n)?,
            },
            Command::Show => match repo.current_conversation() {
                Some(conversation) => {
                    writeln!(out, "# {}", conversation.title)?;
                    for (n, message) in conversation.messages.iter().enumerate() {
                        write_message(out, n + 1, message)?;
                    }
                }
                None => writeln!(out, "(no conversation)")?,
            },
            Command::Edit { index, text } => {
                let target = repo
                    .current_conversation()
                    .and_then(|c| c.messages.get(index - 1).map(|m| (c.id, m.id)));
                match target {
                    Some((conversation_id, message_id)) => {
                        match self.pipeline.edit_message(conversation_id, message_id, &text) {
                            Ok(outcome) if outcome.reply_may_be_stale => {
                                writeln!(out, "edited (the reply after it may be stale)")?
                            }
                            Ok(_) => writeln!(out, "edited")?,
                            Err(e) => writeln!(out, "error: {}", e)?,
                        }
                    }
                    None => writeln!(out, "error: no message {}", index)?,
                }
            }
            Command::Attach(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.display().to_string());
                    writeln!(
                        out,
                        "queued {} ({} bytes) for the next message",
                        name,
                        bytes.len()
                    )?;
                    self.pending
                        .push(AttachmentUpload::new(name, mime_for(&path), bytes));
                }
                Err(e) => writeln!(out, "error: cannot read {}: {}", path.display(), e)?,
            },
            Command::Feedback {
                index,
                rating,
                details,
            } => {
                let target = repo
                    .current_conversation()
                    .and_then(|c| c.messages.get(index - 1).map(|m| (c.id, m.id)));
                match target {
                    Some((conversation_id, message_id)) => {
                        match self.feedback.record(
                            &repo,
                            conversation_id,
                            message_id,
                            rating,
                            details.as_deref(),
                        ) {
                            Ok(_) => writeln!(out, "thanks for the feedback")?,
                            Err(e) => writeln!(out, "error: {}", e)?,
                        }
                    }
                    None => writeln!(out, "error: no message {}", index)?,
                }
            }
            Command::Status => {
                let status = self.probe.status().await;
                writeln!(out, "{}", status.message)?;
                let learning = self.probe.learning_status().await;
                if learning.ready {
                    writeln!(
                        out,
                        "learning model ready ({} observations, rate {})",
                        learning.learning.observation_count, learning.learning.learning_rate
                    )?;
                } else {
                    writeln!(out, "learning model not ready")?;
                }
            }
            Command::Widget(command) => self.widget_command(command, out).await?,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn widget_command<W: Write>(&mut self, command: WidgetCommand, out: &mut W) -> std::io::Result<()> {
        let widget = &mut self.widget;
        let result = match command {
            WidgetCommand::Show => Ok(()),
            WidgetCommand::Book(kind) => widget.select_department(kind),
            WidgetCommand::Person(id) => match widget.select_person(id) {
                Ok(PersonSelection::External { url }) => {
                    writeln!(out, "book on their calendar: {}", url)?;
                    Ok(())
                }
                Ok(PersonSelection::Booking) => Ok(()),
                Err(e) => Err(e),
            },
            WidgetCommand::Date(date) => widget.set_date(date),
            WidgetCommand::Time(time) => widget.set_time(&time),
            WidgetCommand::Note(note) => widget.set_note(&note),
            WidgetCommand::Submit => widget.submit_booking().await,
            WidgetCommand::Chat => widget.open_human_chat(),
            WidgetCommand::Agent(id) => widget.select_agent(id),
            WidgetCommand::Say(text) => match widget.send_live_message(&text).await {
                Ok(reply) => {
                    writeln!(out, "agent: {}", reply.text)?;
                    return Ok(());
                }
                Err(e) => Err(e),
            },
            WidgetCommand::Email => widget.open_email_inquiry(),
            WidgetCommand::To(id) => widget.select_email_department(id),
            WidgetCommand::Template(kind) => widget.choose_template(kind),
            WidgetCommand::Subject(subject) => widget.set_subject(&subject),
            WidgetCommand::Body(body) => widget.set_body(&body),
            WidgetCommand::Send => widget.send_email().await,
            WidgetCommand::Back => widget.back().map(|_| ()),
            WidgetCommand::Reset => {
                widget.reset();
                Ok(())
            }
        };
        if let Err(e) = result {
            writeln!(out, "error: {}", e)?;
        }
        render_widget(&self.widget, out)
    }
}

fn write_message<W: Write>(out: &mut W, n: usize, message: &Message) -> std::io::Result<()> {
    writeln!(out, "{:>3}. {}: {}", n, message.sender.role(), message.text)?;
    for Attachment { kind, name, .. } in &message.attachments {
        let kind = match kind {
            AttachmentKind::Image => "image",
            AttachmentKind::File => "file",
        };
        writeln!(out, "     [{}: {}]", kind, name)?;
    }
    Ok(())
}

fn render_widget<W: Write>(widget: &DialogueController, out: &mut W) -> std::io::Result<()> {
    let directory = widget.directory();
    writeln!(out, "[{}]", widget.stage())?;
    match widget.state() {
        DialogueState::Initial => {
            for kind in DepartmentKind::ALL {
                writeln!(out, "  book: {}", kind.label())?;
            }
            writeln!(out, "  chat with an agent | send an email")?;
        }
        DialogueState::SelectionList { kind } => {
            writeln!(out, "{}", kind.heading())?;
            for contact in directory.contacts(*kind) {
                let external = if contact.calendar_link.is_some() { " (calendar)" } else { "" };
                writeln!(out, "  {:>2}  {} - {}{}", contact.id, contact.name, contact.detail, external)?;
            }
        }
        DialogueState::Booking { person, draft, .. } => {
            writeln!(out, "Booking with {}", person.name)?;
            let date = draft.date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
            writeln!(out, "  date: {}  time: {}", date, draft.time.as_deref().unwrap_or("-"))?;
            writeln!(out, "  slots: {}", AVAILABLE_SLOTS.join(", "))?;
        }
        DialogueState::Confirmation { person, date, time, note, .. } => {
            writeln!(out, "Booked {} on {} at {}", person.name, date, time)?;
            if !note.is_empty() {
                writeln!(out, "  note: {}", note)?;
            }
        }
        DialogueState::HumanChat => {
            for agent in &directory.agents {
                let status = if agent.is_available() { "online" } else { "away" };
                writeln!(out, "  {:>2}  {} ({}) {}", agent.id, agent.name, agent.department, status)?;
            }
        }
        DialogueState::HumanChatActive { agent } => {
            writeln!(out, "Chatting with {}", agent.name)?;
            if let Some(last) = widget.thread().last() {
                writeln!(out, "  {}: {}", last.sender.role(), last.text)?;
            }
        }
        DialogueState::EmailInquiry { draft } => {
            for department in &directory.email_departments {
                let chosen = draft.department.as_ref().is_some_and(|d| d.id == department.id);
                writeln!(
                    out,
                    "  {} {:>2}  {} <{}>",
                    if chosen { '*' } else { ' ' },
                    department.id,
                    department.name,
                    department.email
                )?;
            }
            let templates: Vec<&str> = EmailTemplateKind::ALL.iter().map(|k| k.id()).collect();
            writeln!(out, "  templates: {}", templates.join(", "))?;
            writeln!(out, "  subject: {}", draft.subject)?;
        }
        DialogueState::EmailSent { department, subject } => {
            writeln!(out, "Sent \"{}\" to {}", subject, department.email)?;
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use companion_chat::generation::{GenerationReply, GenerationRequest, GenerationService};
    use companion_chat::{
        AttachmentRegistry, ConversationRepository, EngineSettings, GenerationError, PipelineConfig,
    };
    use companion_core::config::ConversationConfig;
    use companion_core::events::EventBus;
    use companion_dialogue::{Directory, LiveChat, LiveChatConfig, SimulatedDesk, Stage};
    use companion_store::{DurableStore, MemoryStore};

    struct Upper;

    #[async_trait]
    impl GenerationService for Upper {
        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, GenerationError> {
            Ok(GenerationReply {
                response: request.message.to_uppercase(),
            })
        }
    }

    fn session() -> Session {
        let events = EventBus::new(256);
        let store = DurableStore::new(Arc::new(MemoryStore::new()), events.clone());
        let feedback = FeedbackLog::new(store.clone(), &EngineSettings::default());
        let repo = Arc::new(ConversationRepository::new(
            store,
            Arc::new(AttachmentRegistry::new()),
            ConversationConfig::default(),
        ));
        repo.initialize();
        let generator: Arc<dyn GenerationService> = Arc::new(Upper);
        let pipeline = TurnPipeline::new(repo, generator.clone(), PipelineConfig::default());
        let widget = DialogueController::new(
            Directory::builtin(),
            Arc::new(SimulatedDesk::instant()),
            LiveChat::new(generator, LiveChatConfig::default()),
            events,
        );
        let probe = Arc::new(HealthProbe::new(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            Duration::from_secs(30),
        ));
        Session::new(pipeline, widget, probe, feedback)
    }

    async fn run(session: &mut Session, line: &str) -> String {
        let mut out = Vec::new();
        let command = parse(line).unwrap().unwrap();
        session.execute(command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_plain_text_is_a_chat_turn() {
        assert_eq!(parse("  hello there ").unwrap(), Some(Command::Say("hello there".to_string())));
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("/send").unwrap(), Some(Command::Say(String::new())));
    }

    #[test]
    fn test_parse_conversation_commands() {
        assert_eq!(parse("/select 2").unwrap(), Some(Command::Select(2)));
        assert_eq!(
            parse("/edit 3 fixed typo").unwrap(),
            Some(Command::Edit {
                index: 3,
                text: "fixed typo".to_string()
            })
        );
        assert_eq!(
            parse("/attach /tmp/notes.pdf").unwrap(),
            Some(Command::Attach(PathBuf::from("/tmp/notes.pdf")))
        );
        assert!(matches!(parse("/select 0"), Err(ParseError::Invalid { .. })));
        assert!(matches!(parse("/delete"), Err(ParseError::MissingArgument { .. })));
        assert_eq!(
            parse("/frobnicate").unwrap_err(),
            ParseError::UnknownCommand("frobnicate".to_string())
        );
    }

    #[test]
    fn test_parse_widget_commands() {
        assert_eq!(
            parse("/widget book coach").unwrap(),
            Some(Command::Widget(WidgetCommand::Book(DepartmentKind::LearningCoach)))
        );
        assert_eq!(
            parse("/w date 2030-01-15").unwrap(),
            Some(Command::Widget(WidgetCommand::Date(
                NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()
            )))
        );
        assert_eq!(
            parse("/widget body Dear team,\\nThanks").unwrap(),
            Some(Command::Widget(WidgetCommand::Body("Dear team,\nThanks".to_string())))
        );
        assert_eq!(parse("/widget").unwrap(), Some(Command::Widget(WidgetCommand::Show)));
        assert!(matches!(parse("/widget date tomorrow"), Err(ParseError::Invalid { what: "date", .. })));
        assert!(matches!(parse("/widget template poetry"), Err(ParseError::Invalid { .. })));
    }

    #[test]
    fn test_parse_feedback() {
        assert_eq!(
            parse("/feedback 3 down wrong office hours").unwrap(),
            Some(Command::Feedback {
                index: 3,
                rating: FeedbackRating::Negative,
                details: Some("wrong office hours".to_string()),
            })
        );
        assert_eq!(
            parse("/rate 2 up").unwrap(),
            Some(Command::Feedback {
                index: 2,
                rating: FeedbackRating::Positive,
                details: None,
            })
        );
        assert!(matches!(parse("/feedback 2"), Err(ParseError::MissingArgument { .. })));
        assert!(matches!(
            parse("/feedback 2 meh"),
            Err(ParseError::Invalid { what: "rating", .. })
        ));
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("notes.pdf")), "application/pdf");
        assert_eq!(mime_for(Path::new("Makefile")), "application/octet-stream");
    }

    // =========================================================================
    // Execution
    // =========================================================================

    #[tokio::test]
    async fn test_chat_and_list() {
        let mut session = session();
        assert_eq!(run(&mut session, "hello").await, "assistant: HELLO\n");

        let listing = run(&mut session, "/list").await;
        assert!(listing.starts_with('*'));
        assert!(listing.contains("hello (3 messages)"));

        let shown = run(&mut session, "/show").await;
        assert!(shown.contains("2. user: hello"));
        assert!(shown.contains("3. assistant: HELLO"));
    }

    #[tokio::test]
    async fn test_edit_warns_about_stale_reply() {
        let mut session = session();
        run(&mut session, "hello").await;
        assert_eq!(
            run(&mut session, "/edit 2 hello again").await,
            "edited (the reply after it may be stale)\n"
        );
        assert!(run(&mut session, "/edit 9 nope").await.starts_with("error"));
    }

    #[tokio::test]
    async fn test_attachment_rides_on_next_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let mut session = session();
        let queued = run(&mut session, &format!("/attach {}", path.display())).await;
        assert!(queued.contains("scan.png (16 bytes)"));

        run(&mut session, "/send").await;
        let shown = run(&mut session, "/show").await;
        assert!(shown.contains("[image: scan.png]"));
        assert_eq!(session.pipeline().repository().attachments().live_count(), 1);
    }

    #[tokio::test]
    async fn test_deleting_last_conversation_leaves_a_fresh_one() {
        let mut session = session();
        assert!(run(&mut session, "/delete 1").await.starts_with("deleted"));
        assert!(run(&mut session, "/delete 7").await.starts_with("error"));

        let repo = session.pipeline().repository().clone();
        assert_eq!(repo.len(), 1);
        assert!(repo.conversations()[0].messages.is_empty());

        assert_eq!(run(&mut session, "anyone there?").await, "assistant: ANYONE THERE?\n");
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_widget_round_trip() {
        let mut session = session();
        let output = run(&mut session, "/widget book coach").await;
        assert!(output.starts_with("[selectionList]"));

        let output = run(&mut session, "/widget person 1").await;
        assert!(output.contains("book on their calendar: https://"));

        run(&mut session, "/widget back").await;
        run(&mut session, "/widget chat").await;
        let output = run(&mut session, "/widget agent 3").await;
        assert!(output.contains("error: Amina Hassan is away"));

        run(&mut session, "/widget agent 1").await;
        assert_eq!(session.widget().stage(), Stage::HumanChatActive);
        let output = run(&mut session, "/widget say hi").await;
        assert!(output.starts_with("agent: HI"));

        run(&mut session, "/widget reset").await;
        assert_eq!(session.widget().stage(), Stage::Initial);
    }

    #[tokio::test]
    async fn test_feedback_on_replies() {
        let mut session = session();
        run(&mut session, "hello").await;

        assert!(run(&mut session, "/feedback 2 up").await.starts_with("error"));
        assert_eq!(
            run(&mut session, "/feedback 3 down too loud").await,
            "thanks for the feedback\n"
        );
        assert!(run(&mut session, "/feedback 3 up").await.starts_with("error"));
        assert!(run(&mut session, "/feedback 9 up").await.starts_with("error"));

        let entries = session.feedback.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_query, "hello");
        assert_eq!(entries[0].details.as_deref(), Some("too loud"));
    }

    #[tokio::test]
    async fn test_status_without_backend() {
        let mut session = session();
        assert_eq!(
            run(&mut session, "/status").await,
            "Knowledge base unavailable\nlearning model not ready\n"
        );
    }

    #[tokio::test]
    async fn test_quit() {
        let mut session = session();
        let mut out = Vec::new();
        assert_eq!(session.execute(Command::Quit, &mut out).await.unwrap(), Flow::Quit);
    }
}
