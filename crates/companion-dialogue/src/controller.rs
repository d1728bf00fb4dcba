//! Dialogue controller.
//!
//! Owns the widget's [`DialogueState`] and its live-chat thread. Every
//! forward and back move goes through [`Stage::can_transition_to`];
//! actions issued in the wrong stage are rejected with
//! [`DialogueError::WrongStage`] and leave the state untouched.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use companion_core::events::{EngineEvent, EventBus};
use companion_core::NoticeLevel;

use crate::desk::{AppointmentDesk, BookingRequest, InquiryRequest};
use crate::directory::{DepartmentKind, Directory, EmailTemplateKind, AVAILABLE_SLOTS};
use crate::error::DialogueError;
use crate::live_chat::{ChatTurn, LiveChat};
use crate::state::{BookingDraft, DialogueState, EmailDraft, Stage};

/// Assistant turn appended when the live-chat backend cannot answer.
pub const LIVE_CHAT_FALLBACK: &str =
    "I'm having trouble connecting to our knowledge base. Please try again later.";

/// What selecting a person from a list led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonSelection {
    /// The booking form is open.
    Booking,
    /// The person books through an external calendar; the stage is unchanged.
    External { url: String },
}

pub struct DialogueController {
    state: DialogueState,
    thread: Vec<ChatTurn>,
    saved_email: Option<EmailDraft>,
    directory: Directory,
    desk: Arc<dyn AppointmentDesk>,
    live: LiveChat,
    events: EventBus,
}

impl std::fmt::Debug for DialogueController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueController")
            .field("state", &self.state)
            .field("thread", &self.thread.len())
            .finish_non_exhaustive()
    }
}

impl DialogueController {
    pub fn new(
        directory: Directory,
        desk: Arc<dyn AppointmentDesk>,
        live: LiveChat,
        events: EventBus,
    ) -> Self {
        let thread = vec![ChatTurn::assistant(live.greeting())];
        Self {
            state: DialogueState::Initial,
            thread,
            saved_email: None,
            directory,
            desk,
            live,
            events,
        }
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Live-chat thread, starting with the greeting.
    pub fn thread(&self) -> &[ChatTurn] {
        &self.thread
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Email draft kept from an inquiry the user backed out of.
    pub fn saved_email(&self) -> Option<&EmailDraft> {
        self.saved_email.as_ref()
    }

    fn transition(&mut self, next: DialogueState) -> Result<(), DialogueError> {
        let from = self.state.stage();
        let to = next.stage();
        if !from.can_transition_to(&to) {
            return Err(DialogueError::InvalidTransition { from, to });
        }
        debug!(%from, %to, "Dialogue stage changed");
        self.state = next;
        self.events.publish(EngineEvent::StageChanged {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
        Ok(())
    }

    fn require(&self, expected: Stage) -> Result<(), DialogueError> {
        let actual = self.stage();
        if actual != expected {
            return Err(DialogueError::WrongStage { expected, actual });
        }
        Ok(())
    }

    // =========================================================================
    // Booking
    // =========================================================================

    pub fn select_department(&mut self, kind: DepartmentKind) -> Result<(), DialogueError> {
        self.require(Stage::Initial)?;
        self.transition(DialogueState::SelectionList { kind })
    }

    pub fn select_person(&mut self, id: u32) -> Result<PersonSelection, DialogueError> {
        let DialogueState::SelectionList { kind } = self.state else {
            return Err(DialogueError::WrongStage {
                expected: Stage::SelectionList,
                actual: self.stage(),
            });
        };
        let person = self
            .directory
            .contact(kind, id)
            .cloned()
            .ok_or_else(|| DialogueError::UnknownEntry {
                kind: "contact",
                id: id.to_string(),
            })?;

        if let Some(url) = &person.calendar_link {
            info!(person = %person.name, "Booking handed to external calendar");
            self.events
                .notice(NoticeLevel::Info, format!("Opening {}'s calendar", person.name));
            return Ok(PersonSelection::External { url: url.clone() });
        }

        self.transition(DialogueState::Booking {
            kind,
            person,
            draft: BookingDraft::default(),
        })?;
        Ok(PersonSelection::Booking)
    }

    fn booking_draft_mut(&mut self) -> Result<&mut BookingDraft, DialogueError> {
        match &mut self.state {
            DialogueState::Booking { draft, .. } => Ok(draft),
            other => Err(DialogueError::WrongStage {
                expected: Stage::Booking,
                actual: other.stage(),
            }),
        }
    }

    /// Pick the appointment date; dates before today are rejected.
    pub fn set_date(&mut self, date: NaiveDate) -> Result<(), DialogueError> {
        let today = chrono::Local::now().date_naive();
        let draft = self.booking_draft_mut()?;
        if date < today {
            return Err(DialogueError::Validation(format!(
                "{} is in the past",
                date
            )));
        }
        draft.date = Some(date);
        Ok(())
    }

    pub fn set_time(&mut self, time: &str) -> Result<(), DialogueError> {
        let time = time.trim();
        let draft = self.booking_draft_mut()?;
        if !AVAILABLE_SLOTS.contains(&time) {
            return Err(DialogueError::Validation(format!(
                "{} is not an available slot",
                time
            )));
        }
        draft.time = Some(time.to_string());
        Ok(())
    }

    pub fn set_note(&mut self, note: &str) -> Result<(), DialogueError> {
        self.booking_draft_mut()?.note = note.to_string();
        Ok(())
    }

    /// Hand the completed booking to the desk and move to confirmation.
    ///
    /// A desk failure keeps the form as it was so the user can retry.
    pub async fn submit_booking(&mut self) -> Result<(), DialogueError> {
        let request = match &self.state {
            DialogueState::Booking {
                kind,
                person,
                draft,
            } => match (draft.date, &draft.time) {
                (Some(date), Some(time)) => BookingRequest {
                    kind: *kind,
                    person: person.clone(),
                    date,
                    time: time.clone(),
                    note: draft.note.clone(),
                },
                _ => {
                    self.events.error("Please select a date and time");
                    return Err(DialogueError::IncompleteForm(
                        "date and time are required".to_string(),
                    ));
                }
            },
            other => {
                return Err(DialogueError::WrongStage {
                    expected: Stage::Booking,
                    actual: other.stage(),
                })
            }
        };

        if let Err(e) = self.desk.book(&request).await {
            warn!(error = %e, "Booking failed");
            self.events.error(format!("Booking failed: {}", e));
            return Err(e);
        }

        let name = request.person.name.clone();
        self.transition(DialogueState::Confirmation {
            kind: request.kind,
            person: request.person,
            date: request.date,
            time: request.time,
            note: request.note,
        })?;
        self.events
            .success(format!("Appointment booked with {}", name));
        Ok(())
    }

    // =========================================================================
    // Live Chat
    // =========================================================================

    pub fn open_human_chat(&mut self) -> Result<(), DialogueError> {
        self.require(Stage::Initial)?;
        self.transition(DialogueState::HumanChat)
    }

    /// Start chatting with an agent. Agents who are away cannot be picked.
    pub fn select_agent(&mut self, id: u32) -> Result<(), DialogueError> {
        self.require(Stage::HumanChat)?;
        let agent = self
            .directory
            .agent(id)
            .cloned()
            .ok_or_else(|| DialogueError::UnknownEntry {
                kind: "agent",
                id: id.to_string(),
            })?;
        if !agent.is_available() {
            self.events
                .warning(format!("{} is currently away", agent.name));
            return Err(DialogueError::AgentUnavailable(agent.name));
        }
        self.transition(DialogueState::HumanChatActive { agent })
    }

    /// Send `text` on the live-chat thread and return the assistant's turn.
    ///
    /// Backend failures do not surface as errors: the thread gets a fallback
    /// assistant turn and an error notice is published.
    pub async fn send_live_message(&mut self, text: &str) -> Result<ChatTurn, DialogueError> {
        self.require(Stage::HumanChatActive)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DialogueError::Validation(
                "message cannot be empty".to_string(),
            ));
        }

        let prior = self.thread.len();
        self.thread.push(ChatTurn::user(text));
        let reply = match self.live.reply(&self.thread[..prior], text).await {
            Ok(response) => ChatTurn::assistant(response),
            Err(e) => {
                warn!(error = %e, "Live chat reply failed");
                self.events.error("Error connecting to AI service");
                ChatTurn::assistant(LIVE_CHAT_FALLBACK)
            }
        };
        self.thread.push(reply.clone());
        Ok(reply)
    }

    // =========================================================================
    // Email Inquiry
    // =========================================================================

    /// Open the email form, restoring a draft the user backed out of.
    pub fn open_email_inquiry(&mut self) -> Result<(), DialogueError> {
        self.require(Stage::Initial)?;
        let draft = self.saved_email.clone().unwrap_or_default();
        self.transition(DialogueState::EmailInquiry { draft })?;
        self.saved_email = None;
        Ok(())
    }

    fn email_draft_mut(&mut self) -> Result<&mut EmailDraft, DialogueError> {
        match &mut self.state {
            DialogueState::EmailInquiry { draft } => Ok(draft),
            other => Err(DialogueError::WrongStage {
                expected: Stage::EmailInquiry,
                actual: other.stage(),
            }),
        }
    }

    pub fn select_email_department(&mut self, id: u32) -> Result<(), DialogueError> {
        self.require(Stage::EmailInquiry)?;
        let department = self
            .directory
            .email_department(id)
            .cloned()
            .ok_or_else(|| DialogueError::UnknownEntry {
                kind: "email department",
                id: id.to_string(),
            })?;
        self.email_draft_mut()?.department = Some(department);
        Ok(())
    }

    /// Apply a template; it replaces the current subject and body.
    pub fn choose_template(&mut self, kind: EmailTemplateKind) -> Result<(), DialogueError> {
        let template = kind.template();
        let draft = self.email_draft_mut()?;
        draft.template = Some(kind);
        draft.subject = template.subject.to_string();
        draft.body = template.body.to_string();
        Ok(())
    }

    pub fn set_subject(&mut self, subject: &str) -> Result<(), DialogueError> {
        self.email_draft_mut()?.subject = subject.to_string();
        Ok(())
    }

    pub fn set_body(&mut self, body: &str) -> Result<(), DialogueError> {
        self.email_draft_mut()?.body = body.to_string();
        Ok(())
    }

    pub async fn send_email(&mut self) -> Result<(), DialogueError> {
        let request = match &self.state {
            DialogueState::EmailInquiry { draft } => match &draft.department {
                Some(department) if draft.is_complete() => InquiryRequest {
                    department: department.clone(),
                    subject: draft.subject.trim().to_string(),
                    body: draft.body.clone(),
                },
                _ => {
                    self.events.error("Please fill in all fields");
                    return Err(DialogueError::IncompleteForm(
                        "department, subject and body are required".to_string(),
                    ));
                }
            },
            other => {
                return Err(DialogueError::WrongStage {
                    expected: Stage::EmailInquiry,
                    actual: other.stage(),
                })
            }
        };

        if let Err(e) = self.desk.send_inquiry(&request).await {
            warn!(error = %e, "Email inquiry failed");
            self.events.error(format!("Failed to send email: {}", e));
            return Err(e);
        }

        let name = request.department.name.clone();
        self.transition(DialogueState::EmailSent {
            department: request.department,
            subject: request.subject,
        })?;
        self.events.success(format!("Email sent to {}", name));
        Ok(())
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Step back one stage and return the stage reached.
    ///
    /// Going back from a booking keeps the department list; going back from
    /// an email form keeps a non-blank draft for the next visit.
    pub fn back(&mut self) -> Result<Stage, DialogueError> {
        let from = self.stage();
        let next = match &self.state {
            DialogueState::SelectionList { .. }
            | DialogueState::HumanChat
            | DialogueState::EmailInquiry { .. } => DialogueState::Initial,
            DialogueState::Booking { kind, .. } => DialogueState::SelectionList { kind: *kind },
            DialogueState::HumanChatActive { .. } => DialogueState::HumanChat,
            _ => return Err(DialogueError::NoBackTarget(from)),
        };
        if let DialogueState::EmailInquiry { draft } = &self.state {
            if !draft.is_blank() {
                self.saved_email = Some(draft.clone());
            }
        }
        self.transition(next)?;
        Ok(self.stage())
    }

    /// Return to the initial stage from anywhere, clearing every field and
    /// starting a fresh live-chat thread.
    pub fn reset(&mut self) {
        let from = self.stage();
        self.state = DialogueState::Initial;
        self.thread = vec![ChatTurn::assistant(self.live.greeting())];
        self.saved_email = None;
        debug!(%from, "Dialogue reset");
        self.events.publish(EngineEvent::StageChanged {
            from: from.as_str().to_string(),
            to: Stage::Initial.as_str().to_string(),
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
