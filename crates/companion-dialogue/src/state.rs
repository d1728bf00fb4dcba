//! Dialogue stages and their per-stage payloads.
//!
//! Transitions (back edges in parentheses):
//! - Initial -> SelectionList | HumanChat | EmailInquiry
//! - SelectionList -> Booking (-> Initial)
//! - Booking -> Confirmation (-> SelectionList)
//! - HumanChat -> HumanChatActive (-> Initial)
//! - HumanChatActive (-> HumanChat)
//! - EmailInquiry -> EmailSent (-> Initial)
//!
//! Confirmation and EmailSent are terminal: only a reset leaves them.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::directory::{Agent, Contact, DepartmentKind, EmailDepartment, EmailTemplateKind};

/// Name of a dialogue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Initial,
    SelectionList,
    Booking,
    Confirmation,
    HumanChat,
    HumanChatActive,
    EmailInquiry,
    EmailSent,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::SelectionList => "selectionList",
            Stage::Booking => "booking",
            Stage::Confirmation => "confirmation",
            Stage::HumanChat => "humanChat",
            Stage::HumanChatActive => "humanChatActive",
            Stage::EmailInquiry => "emailInquiry",
            Stage::EmailSent => "emailSent",
        }
    }

    /// Where back-navigation leads. `None` for the root and terminal stages.
    pub fn back_target(&self) -> Option<Stage> {
        match self {
            Stage::SelectionList | Stage::HumanChat | Stage::EmailInquiry => Some(Stage::Initial),
            Stage::Booking => Some(Stage::SelectionList),
            Stage::HumanChatActive => Some(Stage::HumanChat),
            Stage::Initial | Stage::Confirmation | Stage::EmailSent => None,
        }
    }

    /// Terminal stages are left only through a reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Confirmation | Stage::EmailSent)
    }

    /// Whether a forward or back transition from `self` to `target` is valid.
    /// Reset is not a transition and is always allowed.
    pub fn can_transition_to(&self, target: &Stage) -> bool {
        matches!(
            (self, target),
            (Stage::Initial, Stage::SelectionList)
                | (Stage::Initial, Stage::HumanChat)
                | (Stage::Initial, Stage::EmailInquiry)
                | (Stage::SelectionList, Stage::Booking)
                | (Stage::Booking, Stage::Confirmation)
                | (Stage::HumanChat, Stage::HumanChatActive)
                | (Stage::EmailInquiry, Stage::EmailSent)
                // Back edges
                | (Stage::SelectionList, Stage::Initial)
                | (Stage::Booking, Stage::SelectionList)
                | (Stage::HumanChat, Stage::Initial)
                | (Stage::HumanChatActive, Stage::HumanChat)
                | (Stage::EmailInquiry, Stage::Initial)
        )
    }
}

/// Booking form being filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub note: String,
}

impl BookingDraft {
    /// Submit is allowed once both a date and a time are chosen.
    pub fn is_complete(&self) -> bool {
        self.date.is_some() && self.time.is_some()
    }
}

/// Email inquiry form being filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub department: Option<EmailDepartment>,
    pub template: Option<EmailTemplateKind>,
    pub subject: String,
    pub body: String,
}

impl EmailDraft {
    /// Send is allowed once department, subject and body are all set.
    pub fn is_complete(&self) -> bool {
        self.department.is_some() && !self.subject.trim().is_empty() && !self.body.trim().is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.department.is_none()
            && self.template.is_none()
            && self.subject.is_empty()
            && self.body.is_empty()
    }
}

/// Current stage plus exactly the fields valid in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum DialogueState {
    #[default]
    Initial,
    SelectionList {
        kind: DepartmentKind,
    },
    Booking {
        kind: DepartmentKind,
        person: Contact,
        draft: BookingDraft,
    },
    Confirmation {
        kind: DepartmentKind,
        person: Contact,
        date: NaiveDate,
        time: String,
        note: String,
    },
    HumanChat,
    HumanChatActive {
        agent: Agent,
    },
    EmailInquiry {
        draft: EmailDraft,
    },
    EmailSent {
        department: EmailDepartment,
        subject: String,
    },
}

impl DialogueState {
    pub fn stage(&self) -> Stage {
        match self {
            DialogueState::Initial => Stage::Initial,
            DialogueState::SelectionList { .. } => Stage::SelectionList,
            DialogueState::Booking { .. } => Stage::Booking,
            DialogueState::Confirmation { .. } => Stage::Confirmation,
            DialogueState::HumanChat => Stage::HumanChat,
            DialogueState::HumanChatActive { .. } => Stage::HumanChatActive,
            DialogueState::EmailInquiry { .. } => Stage::EmailInquiry,
            DialogueState::EmailSent { .. } => Stage::EmailSent,
        }
    }

    /// Department list chosen in this or an earlier stage of the booking branch.
    pub fn department_kind(&self) -> Option<DepartmentKind> {
        match self {
            DialogueState::SelectionList { kind }
            | DialogueState::Booking { kind, .. }
            | DialogueState::Confirmation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
