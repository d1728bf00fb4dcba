//! Guided-assistance dialogue flow.
//!
//! A bounded state machine that walks the user through department
//! selection, appointment booking, live-agent chat and email inquiries,
//! with back-navigation and reset.

pub mod controller;
pub mod desk;
pub mod directory;
pub mod error;
pub mod live_chat;
pub mod state;

pub use controller::{DialogueController, PersonSelection};
pub use desk::{AppointmentDesk, BookingRequest, InquiryRequest, SimulatedDesk};
pub use directory::{
    Agent, AgentStatus, Contact, DepartmentKind, Directory, EmailDepartment, EmailTemplate,
    EmailTemplateKind, AVAILABLE_SLOTS,
};
pub use error::DialogueError;
pub use live_chat::{ChatTurn, LiveChat, LiveChatConfig};
pub use state::{BookingDraft, DialogueState, EmailDraft, Stage};
