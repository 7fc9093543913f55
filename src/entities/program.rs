// 📋 Program Entity - Programs, their modules, content and form
//
// A program belongs to a division and applies either to one panchayath or,
// with `all_panchayaths`, to every panchayath. Features are attached as
// modules, at most one per (program, module type).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// MODULE TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Announcement,
    Registration,
    Advertisement,
}

impl ModuleType {
    pub const ALL: [ModuleType; 3] = [
        ModuleType::Announcement,
        ModuleType::Registration,
        ModuleType::Advertisement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Announcement => "announcement",
            ModuleType::Registration => "registration",
            ModuleType::Advertisement => "advertisement",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModuleType::Announcement => "Announcement",
            ModuleType::Registration => "Registration",
            ModuleType::Advertisement => "Advertisement",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "announcement" => Ok(ModuleType::Announcement),
            "registration" => Ok(ModuleType::Registration),
            "advertisement" => Ok(ModuleType::Advertisement),
            other => Err(format!("Unknown module type: {}", other)),
        }
    }
}

// ============================================================================
// PROGRAM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub division_id: Option<String>,

    /// Single panchayath this program is tied to (ignored when all_panchayaths)
    pub panchayath_id: Option<String>,

    /// Program applies to every panchayath
    pub all_panchayaths: bool,

    pub is_active: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Program {
    /// Public registration URL for this program
    pub fn public_url(&self, base_url: &str) -> String {
        format!("{}/program/{}", base_url.trim_end_matches('/'), self.id)
    }
}

/// Partial update from the program detail form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramUpdate {
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

// ============================================================================
// PROGRAM MODULE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramModule {
    pub id: String,
    pub program_id: String,
    pub module_type: ModuleType,
    pub is_published: bool,
}

/// Program row with the nested projections the public listing needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramListing {
    #[serde(flatten)]
    pub program: Program,
    pub division_name: Option<String>,
    pub panchayath_name: Option<String>,
    pub modules: Vec<ProgramModule>,
}

impl ProgramListing {
    /// At least one module is visible to the public
    pub fn has_published_content(&self) -> bool {
        self.modules.iter().any(|m| m.is_published)
    }

    pub fn has_module(&self, module_type: ModuleType) -> bool {
        self.modules.iter().any(|m| m.module_type == module_type)
    }
}

// ============================================================================
// PROGRAM CONTENT (announcements & advertisements)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Announcement,
    Advertisement,
}

impl ContentKind {
    pub fn table(&self) -> &'static str {
        match self {
            ContentKind::Announcement => "program_announcements",
            ContentKind::Advertisement => "program_advertisements",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Announcement => "Announcement",
            ContentKind::Advertisement => "Advertisement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramContent {
    pub id: String,
    pub program_id: String,
    pub kind: ContentKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub video_url: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl ProgramContent {
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => title.clone(),
            _ => format!("Untitled {}", self.kind.label()),
        }
    }
}

/// Form input for creating or editing announcements/advertisements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub poster_url: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub is_published: bool,
}

// ============================================================================
// FORM QUESTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormQuestion {
    pub id: String,
    pub program_id: String,
    pub question_text: String,
    pub question_type: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub is_required: bool,
    pub sort_order: i64,
}

impl FormQuestion {
    /// Questions in ascending sort_order; ties keep input order
    pub fn sorted(questions: &[FormQuestion]) -> Vec<&FormQuestion> {
        let mut sorted: Vec<&FormQuestion> = questions.iter().collect();
        sorted.sort_by_key(|q| q.sort_order);
        sorted
    }
}
