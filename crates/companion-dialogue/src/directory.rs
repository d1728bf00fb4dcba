//! Directory data shown by the guided-assistance widget.
//!
//! The built-in directory mirrors the campus contacts the widget ships with;
//! a custom [`Directory`] can be supplied for tests or other deployments.

use serde::{Deserialize, Serialize};

/// Appointment slots offered on every bookable day.
pub const AVAILABLE_SLOTS: [&str; 6] = ["09:00", "10:00", "11:00", "14:00", "15:00", "16:00"];

const SHARED_CALENDAR: &str = "https://calendar.google.com/calendar/appointments";

// =============================================================================
// Entries
// =============================================================================

/// Which list the user picks a contact from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepartmentKind {
    LearningCoach,
    AcademicDepartment,
    Administration,
}

impl DepartmentKind {
    pub const ALL: [DepartmentKind; 3] = [
        DepartmentKind::LearningCoach,
        DepartmentKind::AcademicDepartment,
        DepartmentKind::Administration,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DepartmentKind::LearningCoach => "Learning Coach",
            DepartmentKind::AcademicDepartment => "Academic Department",
            DepartmentKind::Administration => "Administration",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            DepartmentKind::LearningCoach => "Select a Learning Coach",
            DepartmentKind::AcademicDepartment => "Select a Department",
            DepartmentKind::Administration => "Select an Administration Office",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "learning-coach" | "coach" => Some(DepartmentKind::LearningCoach),
            "department" | "academic-department" => Some(DepartmentKind::AcademicDepartment),
            "administration" | "admin" => Some(DepartmentKind::Administration),
            _ => None,
        }
    }
}

/// A coach, department or office that can be booked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: u32,
    pub name: String,
    /// Course taught, department head or contact address.
    pub detail: String,
    /// Booking happens on this external calendar instead of in the widget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_link: Option<String>,
}

impl Contact {
    fn new(id: u32, name: &str, detail: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            detail: detail.to_string(),
            calendar_link: None,
        }
    }

    fn with_calendar(mut self, link: &str) -> Self {
        self.calendar_link = Some(link.to_string());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    Online,
    Away,
}

/// A live support agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: u32,
    pub name: String,
    pub department: String,
    pub status: AgentStatus,
}

impl Agent {
    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Online
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDepartment {
    pub id: u32,
    pub name: String,
    pub email: String,
}

// =============================================================================
// Email Templates
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplateKind {
    General,
    Assignment,
    Academic,
    Finance,
    Technical,
    Custom,
}

/// Subject and body a template fills in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmailTemplate {
    pub kind: EmailTemplateKind,
    pub name: &'static str,
    pub subject: &'static str,
    pub body: &'static str,
}

impl EmailTemplateKind {
    pub const ALL: [EmailTemplateKind; 6] = [
        EmailTemplateKind::General,
        EmailTemplateKind::Assignment,
        EmailTemplateKind::Academic,
        EmailTemplateKind::Finance,
        EmailTemplateKind::Technical,
        EmailTemplateKind::Custom,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            EmailTemplateKind::General => "general",
            EmailTemplateKind::Assignment => "assignment",
            EmailTemplateKind::Academic => "academic",
            EmailTemplateKind::Finance => "finance",
            EmailTemplateKind::Technical => "technical",
            EmailTemplateKind::Custom => "custom",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == id.trim().to_ascii_lowercase())
    }

    pub fn template(&self) -> EmailTemplate {
        let (name, subject, body) = match self {
            EmailTemplateKind::General => (
                "General Inquiry",
                "General Inquiry - [Your Name]",
                "Dear [Department],\n\nMy name is [Your Name], a [Your Year/Program] student. I am writing to inquire about [Brief Description].\n\n[Your Question or Request]\n\nThank you for your assistance.\n\nBest regards,\n[Your Name]\n[Your Student ID]",
            ),
            EmailTemplateKind::Assignment => (
                "Assignment Help",
                "Assignment Clarification - [Course Code]",
                "Dear Professor/Department,\n\nI am a student in [Course Name] (Course Code: [Course Code]). I am writing regarding the assignment due on [Due Date].\n\n[Specific Questions about Assignment]\n\nThank you for your guidance.\n\nBest regards,\n[Your Name]\n[Your Student ID]",
            ),
            EmailTemplateKind::Academic => (
                "Academic Advising",
                "Academic Advising Request - [Your Name]",
                "Dear Academic Advisor,\n\nI hope this email finds you well. I am [Your Name], a [Your Year/Program] student (ID: [Your Student ID]).\n\nI would like to request guidance on [Course Selection/Program Requirements/Career Planning].\n\n[Specific Details about Your Situation]\n\nWhen would be a good time to schedule a meeting to discuss this?\n\nThank you for your support.\n\nBest regards,\n[Your Name]",
            ),
            EmailTemplateKind::Finance => (
                "Financial Aid",
                "Financial Aid Inquiry - [Your Name]",
                "Dear Financial Aid Office,\n\nI am [Your Name], a [Your Year/Program] student (ID: [Your Student ID]).\n\nI am writing regarding [Scholarship/Tuition Payment/Financial Aid Application].\n\n[Specific Details about Your Financial Query]\n\nThank you for your assistance with this matter.\n\nBest regards,\n[Your Name]\n[Your Contact Information]",
            ),
            EmailTemplateKind::Technical => (
                "Technical Support",
                "Technical Support Request - [Brief Issue Description]",
                "Dear IT Support Team,\n\nI am experiencing technical difficulties with [System/Platform/Service].\n\nIssue Details:\n- Issue: [Brief Description]\n- When it started: [Date/Time]\n- Steps I've already taken: [Any troubleshooting steps]\n- Error messages: [Any error messages received]\n\nPlease advise on how to resolve this issue.\n\nThank you,\n[Your Name]\n[Your Student ID]\n[Your Contact Information]",
            ),
            EmailTemplateKind::Custom => ("Custom Email", "", ""),
        };
        EmailTemplate {
            kind: *self,
            name,
            subject,
            body,
        }
    }
}

// =============================================================================
// Directory
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub coaches: Vec<Contact>,
    pub departments: Vec<Contact>,
    pub offices: Vec<Contact>,
    pub agents: Vec<Agent>,
    pub email_departments: Vec<EmailDepartment>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Directory {
    pub fn builtin() -> Self {
        let coaches = [
            ("Mr. Marvin Muyonga Ogore", "Machine Learning"),
            ("Prof. Kwame Osei", "Entrepreneurship"),
            ("Dr. Fatima Nkosi", "Data Science"),
            ("Prof. Thabo Mbeki", "African Political History"),
            ("Dr. Zainab Ahmed", "Global Health"),
            ("Prof. Nelson Mandela", "Social Justice"),
            ("Dr. Chinua Achebe", "African Literature"),
            ("Prof. Wangari Maathai", "Environmental Studies"),
            ("Dr. Ngozi Okonjo-Iweala", "Economics"),
            ("Prof. Chimamanda Adichie", "Creative Writing"),
            ("Dr. Kofi Annan", "International Relations"),
            ("Prof. Fred Swaniker", "Leadership"),
            ("Dr. Stella Nkomo", "Business Management"),
            ("Prof. Thandika Mkandawire", "Development Economics"),
            ("Dr. Mercy Tembon", "Education Policy"),
            ("Prof. Ali Mazrui", "African Politics"),
            ("Dr. Nkosazana Dlamini-Zuma", "Public Health"),
            ("Prof. Mahmood Mamdani", "Political Science"),
            ("Dr. Akinwumi Adesina", "Agricultural Economics"),
            ("Prof. Calestous Juma", "Innovation Studies"),
        ];
        let mut coaches: Vec<Contact> = coaches
            .iter()
            .zip(1..)
            .map(|((name, course), id)| Contact::new(id, name, course))
            .collect();
        coaches[0].calendar_link = Some(
            "https://calendar.google.com/calendar/u/0/appointments/schedules/AcZssZ3IinSwaZGWuW1XZJAv7Mkiwokt8Pl_k1STcIWjMF_wXw5pzfY-SEECflnGm-2dhO7QAWFIOtcd"
                .to_string(),
        );

        let departments = [
            ("Computer Science Department", "Prof. Ada Obi"),
            ("Business School", "Dr. James Mwangi"),
            ("Global Challenges", "Prof. Graça Machel"),
            ("Entrepreneurship", "Dr. Ashish Thakkar"),
            ("Engineering", "Prof. Venansius Baryamureeba"),
        ]
        .iter()
        .zip(1..)
        .map(|((name, head), id)| Contact::new(id, name, head).with_calendar(SHARED_CALENDAR))
        .collect();

        let offices = [
            ("Registrar's Office", "registrar@alu.edu"),
            ("Financial Aid", "finaid@alu.edu"),
            ("Student Affairs", "studentaffairs@alu.edu"),
            ("Career Development", "careers@alu.edu"),
            ("International Student Services", "international@alu.edu"),
        ]
        .iter()
        .zip(1..)
        .map(|((name, contact), id)| Contact::new(id, name, contact).with_calendar(SHARED_CALENDAR))
        .collect();

        let agents = [
            ("Sarah Kimani", "Student Support", AgentStatus::Online),
            ("John Okafor", "Technical Support", AgentStatus::Online),
            ("Amina Hassan", "Admissions", AgentStatus::Away),
        ]
        .iter()
        .zip(1..)
        .map(|((name, department, status), id)| Agent {
            id,
            name: name.to_string(),
            department: department.to_string(),
            status: *status,
        })
        .collect();

        let email_departments = [
            ("General Inquiries", "info@alu.edu"),
            ("Admissions", "admissions@alu.edu"),
            ("Student Affairs", "studentaffairs@alu.edu"),
            ("Financial Aid", "financial.aid@alu.edu"),
            ("Technical Support", "itsupport@alu.edu"),
        ]
        .iter()
        .zip(1..)
        .map(|((name, email), id)| EmailDepartment {
            id,
            name: name.to_string(),
            email: email.to_string(),
        })
        .collect();

        Self {
            coaches,
            departments,
            offices,
            agents,
            email_departments,
        }
    }

    pub fn contacts(&self, kind: DepartmentKind) -> &[Contact] {
        match kind {
            DepartmentKind::LearningCoach => &self.coaches,
            DepartmentKind::AcademicDepartment => &self.departments,
            DepartmentKind::Administration => &self.offices,
        }
    }

    pub fn contact(&self, kind: DepartmentKind, id: u32) -> Option<&Contact> {
        self.contacts(kind).iter().find(|c| c.id == id)
    }

    pub fn agent(&self, id: u32) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn email_department(&self, id: u32) -> Option<&EmailDepartment> {
        self.email_departments.iter().find(|d| d.id == id)
    }
}
