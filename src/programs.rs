// 🗂️ Program Management - Listing, modules, content and registrations
//
// Thin rules over the DataStore: every validation runs before the first
// mutation, so a rejected request leaves the store untouched.

use crate::context::RequestContext;
use crate::entities::{
    ContentInput, ContentKind, FixedField, ModuleType, Program, ProgramContent, ProgramListing,
    ProgramModule, ProgramUpdate, Registration, RegistrationAnswers,
};
use crate::error::{AdminError, Result};
use crate::store::DataStore;
use chrono::Utc;
use tracing::info;

// ============================================================================
// PUBLIC LISTING
// ============================================================================

/// Programs with published content, optionally limited to one division name.
/// `None` or "all" means every division; names compare case-insensitively.
pub fn filter_public_programs(listings: Vec<ProgramListing>, division: Option<&str>) -> Vec<ProgramListing> {
    let division = division
        .map(str::trim)
        .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("all"))
        .map(str::to_lowercase);

    listings
        .into_iter()
        .filter(|listing| match &division {
            Some(wanted) => listing
                .division_name
                .as_deref()
                .map(|name| name.to_lowercase() == *wanted)
                .unwrap_or(false),
            None => true,
        })
        .filter(ProgramListing::has_published_content)
        .collect()
}

pub async fn public_programs(store: &dyn DataStore, division: Option<&str>) -> Result<Vec<ProgramListing>> {
    let listings = store.public_programs().await?;
    Ok(filter_public_programs(listings, division))
}

// ============================================================================
// MODULES
// ============================================================================

/// Enable (insert unpublished) or disable (delete) one module type.
/// Returns the module row when it is enabled afterwards.
pub async fn set_module_enabled(
    store: &dyn DataStore,
    program_id: &str,
    module_type: ModuleType,
    enabled: bool,
) -> Result<Option<ProgramModule>> {
    let existing = store
        .program_modules(program_id)
        .await?
        .into_iter()
        .find(|m| m.module_type == module_type);

    match (existing, enabled) {
        (Some(module), true) => Ok(Some(module)),
        (None, true) => {
            let module = store.insert_program_module(program_id, module_type).await?;
            info!("Module enabled: {} on program {}", module_type, program_id);
            Ok(Some(module))
        }
        (Some(module), false) => {
            store.delete_program_module(&module.id).await?;
            info!("Module disabled: {} on program {}", module_type, program_id);
            Ok(None)
        }
        (None, false) => Ok(None),
    }
}

pub async fn toggle_module_published(store: &dyn DataStore, module: &ProgramModule) -> Result<bool> {
    let published = !module.is_published;
    store.set_module_published(&module.id, published).await?;
    info!(
        "Module {} {}",
        module.module_type,
        if published { "published" } else { "unpublished" }
    );
    Ok(published)
}

/// Registration tabs are shown only for programs with this module
pub fn has_registration_module(modules: &[ProgramModule]) -> bool {
    modules.iter().any(|m| m.module_type == ModuleType::Registration)
}

// ============================================================================
// ANNOUNCEMENTS & ADVERTISEMENTS
// ============================================================================

fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Validated content fields: trimmed, blanks stored as null.
/// Announcements need a title; advertisements may go untitled.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDraft {
    pub kind: ContentKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub video_url: Option<String>,
    pub is_published: bool,
}

impl ContentDraft {
    pub fn validate(kind: ContentKind, input: &ContentInput) -> Result<Self> {
        let title = trimmed(&input.title);
        if kind == ContentKind::Announcement && title.is_none() {
            return Err(AdminError::validation("Title is required"));
        }

        Ok(ContentDraft {
            kind,
            title,
            description: trimmed(&input.description),
            poster_url: trimmed(&input.poster_url),
            video_url: trimmed(&input.video_url),
            is_published: input.is_published,
        })
    }
}

/// Create (`existing_id` = None) or update one announcement/advertisement
pub async fn save_content(
    store: &dyn DataStore,
    kind: ContentKind,
    program_id: &str,
    existing_id: Option<&str>,
    input: &ContentInput,
) -> Result<ProgramContent> {
    let draft = ContentDraft::validate(kind, input)?;

    let created_at = match existing_id {
        Some(id) => store
            .program_content(kind, program_id)
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .map(|c| c.created_at)
            .ok_or_else(|| AdminError::NotFound(format!("{} {}", kind.label(), id)))?,
        None => Utc::now(),
    };

    let content = ProgramContent {
        id: existing_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        program_id: program_id.to_string(),
        kind,
        title: draft.title,
        description: draft.description,
        poster_url: draft.poster_url,
        video_url: draft.video_url,
        is_published: draft.is_published,
        created_at,
    };

    if existing_id.is_some() {
        store.update_program_content(&content).await?;
        info!("{} updated: {}", kind.label(), content.display_title());
    } else {
        store.insert_program_content(&content).await?;
        info!("{} created: {}", kind.label(), content.display_title());
    }

    Ok(content)
}

pub async fn delete_content(store: &dyn DataStore, kind: ContentKind, id: &str) -> Result<()> {
    store.delete_program_content(kind, id).await?;
    info!("{} deleted: {}", kind.label(), id);
    Ok(())
}

pub async fn toggle_content_published(store: &dyn DataStore, content: &ProgramContent) -> Result<bool> {
    let published = !content.is_published;
    store
        .set_content_published(content.kind, &content.id, published)
        .await?;
    Ok(published)
}

// ============================================================================
// PROGRAM DETAIL
// ============================================================================

pub async fn update_program(store: &dyn DataStore, id: &str, update: &ProgramUpdate) -> Result<ProgramUpdate> {
    let name = trimmed(&update.name).ok_or_else(|| AdminError::validation("Program name is required"))?;

    let cleaned = ProgramUpdate {
        name,
        description: update.description.as_deref().and_then(trimmed),
        start_date: update.start_date,
        end_date: update.end_date,
        is_active: update.is_active,
    };

    store.update_program(id, &cleaned).await?;
    info!("Program updated: {}", cleaned.name);
    Ok(cleaned)
}

pub async fn toggle_program_active(store: &dyn DataStore, program: &Program) -> Result<bool> {
    let active = !program.is_active;
    store.set_program_active(&program.id, active).await?;
    info!("Program {} {}", program.name, if active { "activated" } else { "deactivated" });
    Ok(active)
}

pub async fn delete_program(store: &dyn DataStore, id: &str) -> Result<()> {
    store.delete_program(id).await
}

// ============================================================================
// REGISTRATIONS
// ============================================================================

/// Keep registrations whose `_fixed.panchayath_id` matches; `None` keeps all
pub fn filter_by_panchayath(registrations: Vec<Registration>, panchayath_id: Option<&str>) -> Vec<Registration> {
    match panchayath_id {
        Some(wanted) => registrations
            .into_iter()
            .filter(|r| r.answers.panchayath_id() == Some(wanted))
            .collect(),
        None => registrations,
    }
}

/// Load a program the caller may see. Programs outside the caller's
/// divisions are reported the same way as missing ones.
pub async fn scoped_program(store: &dyn DataStore, ctx: &RequestContext, program_id: &str) -> Result<Program> {
    let program = store.program(program_id).await?;
    match (program, ctx.accessible_scope()) {
        (Some(program), Some(scope)) if scope.allows(program.division_id.as_deref()) => Ok(program),
        _ => Err(AdminError::NotFound(format!("program {}", program_id))),
    }
}

/// Registrations for one program, newest first
pub async fn program_registrations(
    store: &dyn DataStore,
    program_id: &str,
    panchayath_id: Option<&str>,
) -> Result<Vec<Registration>> {
    let registrations = store.registrations(&[program_id.to_string()]).await?;
    Ok(filter_by_panchayath(registrations, panchayath_id))
}

/// Public form submission
pub async fn submit_registration(
    store: &dyn DataStore,
    program_id: &str,
    answers: RegistrationAnswers,
) -> Result<Registration> {
    let program = store
        .program(program_id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("program {}", program_id)))?;

    if !program.is_active {
        return Err(AdminError::validation("Program is not active"));
    }

    let modules = store.program_modules(program_id).await?;
    let open = modules
        .iter()
        .any(|m| m.module_type == ModuleType::Registration && m.is_published);
    if !open {
        return Err(AdminError::validation("Registration is not open for this program"));
    }

    let fixed = answers.fixed.as_ref();
    if fixed.and_then(|f| f.get(FixedField::Name)).is_none() {
        return Err(AdminError::validation("Name is required"));
    }
    if fixed.and_then(|f| f.get(FixedField::Mobile)).is_none() {
        return Err(AdminError::validation("Mobile number is required"));
    }

    let questions = store.form_questions(program_id).await?;
    if let Some(missing) = questions
        .iter()
        .filter(|q| q.is_required)
        .find(|q| answers.get(&q.id).map(|a| a.is_empty()).unwrap_or(true))
    {
        return Err(AdminError::validation(format!("{} is required", missing.question_text)));
    }

    let registration = Registration {
        id: uuid::Uuid::new_v4().to_string(),
        program_id: program_id.to_string(),
        answers,
        created_at: Utc::now(),
    };
    store.insert_registration(&registration).await?;

    info!("New registration for \"{}\"", program.name);
    Ok(registration)
}
