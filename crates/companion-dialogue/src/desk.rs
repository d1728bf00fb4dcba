//! Appointment desk port.
//!
//! Completes bookings and delivers email inquiries. The widget only needs to
//! know when the request finished; [`SimulatedDesk`] stands in for a real
//! scheduling backend with a fixed latency.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use companion_core::config::WidgetConfig;

use crate::directory::{Contact, DepartmentKind, EmailDepartment};
use crate::error::DialogueError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub kind: DepartmentKind,
    pub person: Contact,
    pub date: NaiveDate,
    pub time: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryRequest {
    pub department: EmailDepartment,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait AppointmentDesk: Send + Sync {
    async fn book(&self, request: &BookingRequest) -> Result<(), DialogueError>;

    async fn send_inquiry(&self, request: &InquiryRequest) -> Result<(), DialogueError>;
}

/// Desk that accepts everything after a fixed delay.
#[derive(Debug, Clone)]
pub struct SimulatedDesk {
    booking_latency: Duration,
    email_latency: Duration,
}

impl SimulatedDesk {
    pub fn new(booking_latency: Duration, email_latency: Duration) -> Self {
        Self {
            booking_latency,
            email_latency,
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(
            Duration::from_millis(config.booking_latency_ms),
            Duration::from_millis(config.email_latency_ms),
        )
    }

    /// A desk with no latency.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

#[async_trait]
impl AppointmentDesk for SimulatedDesk {
    async fn book(&self, request: &BookingRequest) -> Result<(), DialogueError> {
        tokio::time::sleep(self.booking_latency).await;
        info!(
            person = %request.person.name,
            date = %request.date,
            time = %request.time,
            "Appointment booked"
        );
        Ok(())
    }

    async fn send_inquiry(&self, request: &InquiryRequest) -> Result<(), DialogueError> {
        tokio::time::sleep(self.email_latency).await;
        info!(
            department = %request.department.name,
            email = %request.department.email,
            "Email inquiry sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;

    fn booking() -> BookingRequest {
        let directory = Directory::builtin();
        BookingRequest {
            kind: DepartmentKind::LearningCoach,
            person: directory.coaches[1].clone(),
            date: NaiveDate::from_ymd_opt(2030, 3, 4).unwrap(),
            time: "09:00".to_string(),
            note: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_desk_waits_for_latency() {
        let desk = SimulatedDesk::from_config(&WidgetConfig::default());
        let started = tokio::time::Instant::now();
        desk.book(&booking()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_instant_desk() {
        let desk = SimulatedDesk::instant();
        desk.book(&booking()).await.unwrap();
        let directory = Directory::builtin();
        desk.send_inquiry(&InquiryRequest {
            department: directory.email_departments[0].clone(),
            subject: "Hello".to_string(),
            body: "Question".to_string(),
        })
        .await
        .unwrap();
    }
}
