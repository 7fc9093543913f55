// 🗃️ SQLite Store - DataStore backed by rusqlite
//
// One connection behind a mutex, shared by every request. Timestamps are
// stored as fixed-width RFC 3339 text so ORDER BY created_at sorts correctly.

use crate::context::DivisionScope;
use crate::entities::{
    Admin, AdminInfo, AdminProfile, Agent, AgentRole, Cluster, ClusterPatch,
    ClusterWithPanchayath, ContentKind, Division, FormQuestion, Member, ModuleType, NewCluster,
    NewPanchayath, Panchayath, PanchayathPatch, Program, ProgramContent, ProgramListing,
    ProgramModule, ProgramUpdate, Registration, RegistrationAnswers,
};
use crate::error::{AdminError, Result};
use crate::store::{DataStore, RegistrationWithProgram};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS divisions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS panchayaths (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            panchayath_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            cluster_id TEXT,
            division_id TEXT
        );

        CREATE TABLE IF NOT EXISTS profiles (
            user_id TEXT PRIMARY KEY,
            full_name TEXT,
            email TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS admins (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            division_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            phone TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS programs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            division_id TEXT,
            panchayath_id TEXT,
            all_panchayaths INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS program_modules (
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            module_type TEXT NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            UNIQUE(program_id, module_type)
        );

        CREATE TABLE IF NOT EXISTS program_announcements (
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            title TEXT,
            description TEXT,
            poster_url TEXT,
            video_url TEXT,
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS program_advertisements (
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            title TEXT,
            description TEXT,
            poster_url TEXT,
            video_url TEXT,
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS program_form_questions (
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            question_text TEXT NOT NULL,
            question_type TEXT NOT NULL,
            options TEXT NOT NULL DEFAULT '[]',
            is_required INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS program_registrations (
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            answers TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pennyekart_agents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mobile TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            parent_agent_id TEXT,
            panchayath_id TEXT,
            ward TEXT NOT NULL DEFAULT '',
            customer_count INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_programs_division ON programs(division_id);
        CREATE INDEX IF NOT EXISTS idx_registrations_program ON program_registrations(program_id);
        CREATE INDEX IF NOT EXISTS idx_registrations_created ON program_registrations(created_at);
        CREATE INDEX IF NOT EXISTS idx_members_division ON members(division_id);
        CREATE INDEX IF NOT EXISTS idx_agents_parent ON pennyekart_agents(parent_agent_id);",
    )?;

    Ok(())
}

// ============================================================================
// ROW HELPERS
// ============================================================================

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width UTC timestamp
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date(idx: usize, value: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn placeholders(count: usize) -> String {
    (1..=count).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// WHERE clause restricting `column` to the scope's divisions
fn scope_filter(scope: &DivisionScope, column: &str) -> (String, Vec<String>) {
    match scope {
        DivisionScope::Unrestricted => (String::new(), Vec::new()),
        DivisionScope::Divisions(ids) => (
            format!(" WHERE {} IN ({})", column, placeholders(ids.len())),
            ids.clone(),
        ),
    }
}

fn ensure_changed(changed: usize, what: &str, id: &str) -> Result<()> {
    if changed == 0 {
        Err(AdminError::NotFound(format!("{} {}", what, id)))
    } else {
        Ok(())
    }
}

const PROGRAM_COLUMNS: &str = "p.id, p.name, p.description, p.division_id, p.panchayath_id,
    p.all_panchayaths, p.is_active, p.start_date, p.end_date, p.created_at";

fn program_from_row(row: &Row) -> rusqlite::Result<Program> {
    Ok(Program {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        division_id: row.get(3)?,
        panchayath_id: row.get(4)?,
        all_panchayaths: row.get(5)?,
        is_active: row.get(6)?,
        start_date: parse_date(7, row.get(7)?)?,
        end_date: parse_date(8, row.get(8)?)?,
        created_at: parse_timestamp(9, row.get(9)?)?,
    })
}

fn module_from_row(row: &Row) -> rusqlite::Result<ProgramModule> {
    let module_type: String = row.get(2)?;
    Ok(ProgramModule {
        id: row.get(0)?,
        program_id: row.get(1)?,
        module_type: module_type
            .parse::<ModuleType>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
        is_published: row.get(3)?,
    })
}

fn registration_from_row(row: &Row) -> rusqlite::Result<Registration> {
    Ok(Registration {
        id: row.get(0)?,
        program_id: row.get(1)?,
        answers: parse_json::<RegistrationAnswers>(2, row.get(2)?)?,
        created_at: parse_timestamp(3, row.get(3)?)?,
    })
}

fn panchayath_from_row(row: &Row) -> rusqlite::Result<Panchayath> {
    Ok(Panchayath {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
    })
}

fn cluster_from_row(row: &Row) -> rusqlite::Result<ClusterWithPanchayath> {
    Ok(ClusterWithPanchayath {
        cluster: Cluster {
            id: row.get(0)?,
            name: row.get(1)?,
            panchayath_id: row.get(2)?,
            is_active: row.get(3)?,
        },
        panchayath_name: row.get(4)?,
    })
}

fn agent_from_row(row: &Row) -> rusqlite::Result<Agent> {
    let role: String = row.get(3)?;
    let customer_count: i64 = row.get(8)?;
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        mobile: row.get(2)?,
        role: role
            .parse::<AgentRole>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?,
        parent_agent_id: row.get(4)?,
        panchayath_id: row.get(5)?,
        panchayath_name: row.get(6)?,
        ward: row.get(7)?,
        customer_count: customer_count.max(0) as u64,
        is_active: row.get(9)?,
        created_at: parse_timestamp(10, row.get(10)?)?,
    })
}

fn write_program(conn: &Connection, program: &Program) -> Result<()> {
    conn.execute(
        "INSERT INTO programs (id, name, description, division_id, panchayath_id,
            all_panchayaths, is_active, start_date, end_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            program.id,
            program.name,
            program.description,
            program.division_id,
            program.panchayath_id,
            program.all_panchayaths,
            program.is_active,
            program.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
            program.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
            timestamp(&program.created_at),
        ],
    )?;
    Ok(())
}

fn write_agent(conn: &Connection, agent: &Agent) -> Result<()> {
    conn.execute(
        "INSERT INTO pennyekart_agents (id, name, mobile, role, parent_agent_id,
            panchayath_id, ward, customer_count, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            agent.id,
            agent.name,
            agent.mobile,
            agent.role.as_str(),
            agent.parent_agent_id,
            agent.panchayath_id,
            agent.ward,
            agent.customer_count as i64,
            agent.is_active,
            timestamp(&agent.created_at),
        ],
    )?;
    Ok(())
}

const CLUSTER_SELECT: &str = "SELECT c.id, c.name, c.panchayath_id, c.is_active, p.name
    FROM clusters c LEFT JOIN panchayaths p ON p.id = c.panchayath_id";

// ============================================================================
// SQLITE STORE
// ============================================================================

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        info!("Opened database at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AdminError::Database("connection lock poisoned".to_string()))
    }

    /// Run raw statements against the connection (imports, maintenance)
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one transaction; any error rolls everything back
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Seeding inserts (imports, fixtures)
    // ------------------------------------------------------------------

    pub fn insert_division(&self, division: &Division) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO divisions (id, name, description, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![division.id, division.name, division.description, division.is_active],
        )?;
        Ok(())
    }

    pub fn insert_panchayath(&self, panchayath: &Panchayath) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO panchayaths (id, name, is_active) VALUES (?1, ?2, ?3)",
            params![panchayath.id, panchayath.name, panchayath.is_active],
        )?;
        Ok(())
    }

    pub fn insert_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO clusters (id, name, panchayath_id, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![cluster.id, cluster.name, cluster.panchayath_id, cluster.is_active],
        )?;
        Ok(())
    }

    pub fn insert_member(&self, member: &Member) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO members (id, cluster_id, division_id) VALUES (?1, ?2, ?3)",
            params![member.id, member.cluster_id, member.division_id],
        )?;
        Ok(())
    }

    pub fn insert_admin(&self, admin: &Admin, profile: Option<&AdminProfile>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO admins (id, user_id, division_id, is_active, phone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                admin.id,
                admin.user_id,
                admin.division_id,
                admin.is_active,
                admin.phone,
                timestamp(&admin.created_at),
            ],
        )?;
        if let Some(profile) = profile {
            conn.execute(
                "INSERT OR REPLACE INTO profiles (user_id, full_name, email) VALUES (?1, ?2, ?3)",
                params![admin.user_id, profile.full_name, profile.email],
            )?;
        }
        Ok(())
    }

    pub fn insert_program(&self, program: &Program) -> Result<()> {
        write_program(&*self.lock()?, program)
    }

    pub fn insert_form_question(&self, question: &FormQuestion) -> Result<()> {
        let options = serde_json::to_string(&question.options)?;
        self.lock()?.execute(
            "INSERT INTO program_form_questions
                (id, program_id, question_text, question_type, options, is_required, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                question.id,
                question.program_id,
                question.question_text,
                question.question_type,
                options,
                question.is_required,
                question.sort_order,
            ],
        )?;
        Ok(())
    }

    pub fn insert_agent(&self, agent: &Agent) -> Result<()> {
        write_agent(&*self.lock()?, agent)
    }

    fn content_from_row(kind: ContentKind, row: &Row) -> rusqlite::Result<ProgramContent> {
        Ok(ProgramContent {
            id: row.get(0)?,
            program_id: row.get(1)?,
            kind,
            title: row.get(2)?,
            description: row.get(3)?,
            poster_url: row.get(4)?,
            video_url: row.get(5)?,
            is_published: row.get(6)?,
            created_at: parse_timestamp(7, row.get(7)?)?,
        })
    }

    fn fetch_panchayath(conn: &Connection, id: &str) -> Result<Panchayath> {
        conn.query_row(
            "SELECT id, name, is_active FROM panchayaths WHERE id = ?1",
            params![id],
            panchayath_from_row,
        )
        .optional()?
        .ok_or_else(|| AdminError::NotFound(format!("panchayath {}", id)))
    }

    fn fetch_cluster(conn: &Connection, id: &str) -> Result<Cluster> {
        conn.query_row(
            "SELECT id, name, panchayath_id, is_active FROM clusters WHERE id = ?1",
            params![id],
            |row| {
                Ok(Cluster {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    panchayath_id: row.get(2)?,
                    is_active: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| AdminError::NotFound(format!("cluster {}", id)))
    }
}

// ============================================================================
// DataStore IMPLEMENTATION
// ============================================================================

#[async_trait]
impl DataStore for SqliteStore {
    async fn programs(&self, scope: &DivisionScope) -> Result<Vec<Program>> {
        let (filter, args) = scope_filter(scope, "p.division_id");
        let sql = format!(
            "SELECT {} FROM programs p{} ORDER BY p.created_at DESC",
            PROGRAM_COLUMNS, filter
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let programs = stmt
            .query_map(params_from_iter(args.iter()), program_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("Fetched {} programs", programs.len());
        Ok(programs)
    }

    async fn program(&self, id: &str) -> Result<Option<Program>> {
        let sql = format!("SELECT {} FROM programs p WHERE p.id = ?1", PROGRAM_COLUMNS);
        let conn = self.lock()?;
        Ok(conn.query_row(&sql, params![id], program_from_row).optional()?)
    }

    async fn program_names(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT id, name FROM programs WHERE id IN ({})",
            placeholders(ids.len())
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        Ok(names)
    }

    async fn public_programs(&self) -> Result<Vec<ProgramListing>> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {}, d.name, pa.name
             FROM programs p
             LEFT JOIN divisions d ON d.id = p.division_id
             LEFT JOIN panchayaths pa ON pa.id = p.panchayath_id
             WHERE p.is_active = 1
             ORDER BY p.created_at DESC",
            PROGRAM_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((program_from_row(row)?, row.get::<_, Option<String>>(10)?, row.get::<_, Option<String>>(11)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut modules: HashMap<String, Vec<ProgramModule>> = HashMap::new();
        if !rows.is_empty() {
            let ids: Vec<&String> = rows.iter().map(|(p, _, _)| &p.id).collect();
            let sql = format!(
                "SELECT id, program_id, module_type, is_published FROM program_modules
                 WHERE program_id IN ({}) ORDER BY rowid",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            for module in stmt.query_map(params_from_iter(ids.iter()), module_from_row)? {
                let module = module?;
                modules.entry(module.program_id.clone()).or_default().push(module);
            }
        }

        Ok(rows
            .into_iter()
            .map(|(program, division_name, panchayath_name)| ProgramListing {
                modules: modules.remove(&program.id).unwrap_or_default(),
                program,
                division_name,
                panchayath_name,
            })
            .collect())
    }

    async fn update_program(&self, id: &str, update: &ProgramUpdate) -> Result<()> {
        let changed = self.lock()?.execute(
            "UPDATE programs SET name = ?2, description = ?3, start_date = ?4, end_date = ?5, is_active = ?6
             WHERE id = ?1",
            params![
                id,
                update.name,
                update.description,
                update.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
                update.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
                update.is_active,
            ],
        )?;
        ensure_changed(changed, "program", id)
    }

    async fn set_program_active(&self, id: &str, is_active: bool) -> Result<()> {
        let changed = self
            .lock()?
            .execute("UPDATE programs SET is_active = ?2 WHERE id = ?1", params![id, is_active])?;
        ensure_changed(changed, "program", id)
    }

    async fn delete_program(&self, id: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for table in [
            "program_modules",
            "program_announcements",
            "program_advertisements",
            "program_form_questions",
            "program_registrations",
        ] {
            tx.execute(&format!("DELETE FROM {} WHERE program_id = ?1", table), params![id])?;
        }
        let changed = tx.execute("DELETE FROM programs WHERE id = ?1", params![id])?;
        ensure_changed(changed, "program", id)?;
        tx.commit()?;

        info!("Deleted program {}", id);
        Ok(())
    }

    async fn program_modules(&self, program_id: &str) -> Result<Vec<ProgramModule>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, program_id, module_type, is_published FROM program_modules
             WHERE program_id = ?1 ORDER BY rowid",
        )?;
        let modules = stmt
            .query_map(params![program_id], module_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(modules)
    }

    async fn insert_program_module(&self, program_id: &str, module_type: ModuleType) -> Result<ProgramModule> {
        let module = ProgramModule {
            id: new_id(),
            program_id: program_id.to_string(),
            module_type,
            is_published: false,
        };

        let result = self.lock()?.execute(
            "INSERT INTO program_modules (id, program_id, module_type, is_published) VALUES (?1, ?2, ?3, ?4)",
            params![module.id, module.program_id, module_type.as_str(), module.is_published],
        );

        match result {
            Ok(_) => Ok(module),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AdminError::BadRequest(format!(
                    "{} module already enabled",
                    module_type.label()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_program_module(&self, module_id: &str) -> Result<()> {
        let changed = self
            .lock()?
            .execute("DELETE FROM program_modules WHERE id = ?1", params![module_id])?;
        ensure_changed(changed, "module", module_id)
    }

    async fn set_module_published(&self, module_id: &str, is_published: bool) -> Result<()> {
        let changed = self.lock()?.execute(
            "UPDATE program_modules SET is_published = ?2 WHERE id = ?1",
            params![module_id, is_published],
        )?;
        ensure_changed(changed, "module", module_id)
    }

    async fn program_content(&self, kind: ContentKind, program_id: &str) -> Result<Vec<ProgramContent>> {
        let sql = format!(
            "SELECT id, program_id, title, description, poster_url, video_url, is_published, created_at
             FROM {} WHERE program_id = ?1 ORDER BY created_at DESC",
            kind.table()
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![program_id], |row| Self::content_from_row(kind, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    async fn insert_program_content(&self, content: &ProgramContent) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, program_id, title, description, poster_url, video_url, is_published, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            content.kind.table()
        );
        self.lock()?.execute(
            &sql,
            params![
                content.id,
                content.program_id,
                content.title,
                content.description,
                content.poster_url,
                content.video_url,
                content.is_published,
                timestamp(&content.created_at),
            ],
        )?;
        Ok(())
    }

    async fn update_program_content(&self, content: &ProgramContent) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET title = ?2, description = ?3, poster_url = ?4, video_url = ?5, is_published = ?6
             WHERE id = ?1",
            content.kind.table()
        );
        let changed = self.lock()?.execute(
            &sql,
            params![
                content.id,
                content.title,
                content.description,
                content.poster_url,
                content.video_url,
                content.is_published,
            ],
        )?;
        ensure_changed(changed, content.kind.label(), &content.id)
    }

    async fn delete_program_content(&self, kind: ContentKind, id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", kind.table());
        let changed = self.lock()?.execute(&sql, params![id])?;
        ensure_changed(changed, kind.label(), id)
    }

    async fn set_content_published(&self, kind: ContentKind, id: &str, is_published: bool) -> Result<()> {
        let sql = format!("UPDATE {} SET is_published = ?2 WHERE id = ?1", kind.table());
        let changed = self.lock()?.execute(&sql, params![id, is_published])?;
        ensure_changed(changed, kind.label(), id)
    }

    async fn form_questions(&self, program_id: &str) -> Result<Vec<FormQuestion>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, program_id, question_text, question_type, options, is_required, sort_order
             FROM program_form_questions WHERE program_id = ?1 ORDER BY sort_order, rowid",
        )?;
        let questions = stmt
            .query_map(params![program_id], |row| {
                Ok(FormQuestion {
                    id: row.get(0)?,
                    program_id: row.get(1)?,
                    question_text: row.get(2)?,
                    question_type: row.get(3)?,
                    options: parse_json(4, row.get(4)?)?,
                    is_required: row.get(5)?,
                    sort_order: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(questions)
    }

    async fn registrations(&self, program_ids: &[String]) -> Result<Vec<Registration>> {
        if program_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, program_id, answers, created_at FROM program_registrations
             WHERE program_id IN ({}) ORDER BY created_at DESC",
            placeholders(program_ids.len())
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let registrations = stmt
            .query_map(params_from_iter(program_ids.iter()), registration_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("Fetched {} registrations for {} programs", registrations.len(), program_ids.len());
        Ok(registrations)
    }

    async fn recent_registrations(&self, limit: usize) -> Result<Vec<RegistrationWithProgram>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.program_id, r.answers, r.created_at, p.name
             FROM program_registrations r
             LEFT JOIN programs p ON p.id = r.program_id
             ORDER BY r.created_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RegistrationWithProgram {
                    registration: registration_from_row(row)?,
                    program_name: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn count_registrations(&self) -> Result<u64> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM program_registrations", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    async fn insert_registration(&self, registration: &Registration) -> Result<()> {
        let answers = serde_json::to_string(&registration.answers)?;
        self.lock()?.execute(
            "INSERT INTO program_registrations (id, program_id, answers, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                registration.id,
                registration.program_id,
                answers,
                timestamp(&registration.created_at),
            ],
        )?;
        Ok(())
    }

    async fn members(&self, scope: &DivisionScope) -> Result<Vec<Member>> {
        let (filter, args) = scope_filter(scope, "division_id");
        let sql = format!("SELECT id, cluster_id, division_id FROM members{} ORDER BY rowid", filter);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let members = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(Member {
                    id: row.get(0)?,
                    cluster_id: row.get(1)?,
                    division_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    async fn active_panchayaths(&self) -> Result<Vec<Panchayath>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, is_active FROM panchayaths WHERE is_active = 1 ORDER BY rowid")?;
        let panchayaths = stmt
            .query_map([], panchayath_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(panchayaths)
    }

    async fn active_clusters(&self) -> Result<Vec<ClusterWithPanchayath>> {
        let sql = format!("{} WHERE c.is_active = 1 ORDER BY c.rowid", CLUSTER_SELECT);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let clusters = stmt
            .query_map([], cluster_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(clusters)
    }

    async fn divisions(&self) -> Result<Vec<Division>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, description, is_active FROM divisions ORDER BY name")?;
        let divisions = stmt
            .query_map([], |row| {
                Ok(Division {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    is_active: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(divisions)
    }

    async fn admins(&self) -> Result<Vec<AdminInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.user_id, a.division_id, a.is_active, a.phone, a.created_at,
                    d.name, pr.full_name, pr.email
             FROM admins a
             LEFT JOIN divisions d ON d.id = a.division_id
             LEFT JOIN profiles pr ON pr.user_id = a.user_id
             ORDER BY a.created_at DESC",
        )?;
        let admins = stmt
            .query_map([], |row| {
                let email: Option<String> = row.get(8)?;
                let full_name: Option<String> = row.get(7)?;
                Ok(AdminInfo {
                    admin: Admin {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        division_id: row.get(2)?,
                        is_active: row.get(3)?,
                        phone: row.get(4)?,
                        created_at: parse_timestamp(5, row.get(5)?)?,
                    },
                    division_name: row.get(6)?,
                    profile: email.map(|email| AdminProfile { full_name, email }),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(admins)
    }

    async fn set_admin_active(&self, id: &str, is_active: bool) -> Result<()> {
        let changed = self
            .lock()?
            .execute("UPDATE admins SET is_active = ?2 WHERE id = ?1", params![id, is_active])?;
        ensure_changed(changed, "admin", id)
    }

    async fn list_panchayaths(&self) -> Result<Vec<Panchayath>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, is_active FROM panchayaths ORDER BY name")?;
        let panchayaths = stmt
            .query_map([], panchayath_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(panchayaths)
    }

    async fn create_panchayath(&self, input: &NewPanchayath) -> Result<Panchayath> {
        let panchayath = Panchayath {
            id: new_id(),
            name: input.name.clone(),
            is_active: input.is_active,
        };
        self.insert_panchayath(&panchayath)?;
        Ok(panchayath)
    }

    async fn update_panchayath(&self, patch: &PanchayathPatch) -> Result<Panchayath> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE panchayaths SET name = COALESCE(?2, name), is_active = COALESCE(?3, is_active)
             WHERE id = ?1",
            params![patch.id, patch.name, patch.is_active],
        )?;
        ensure_changed(changed, "panchayath", &patch.id)?;
        Self::fetch_panchayath(&conn, &patch.id)
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterWithPanchayath>> {
        let sql = format!("{} ORDER BY c.name", CLUSTER_SELECT);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let clusters = stmt
            .query_map([], cluster_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(clusters)
    }

    async fn create_cluster(&self, input: &NewCluster) -> Result<Cluster> {
        let cluster = Cluster {
            id: new_id(),
            name: input.name.clone(),
            panchayath_id: input.panchayath_id.clone(),
            is_active: input.is_active,
        };
        self.insert_cluster(&cluster)?;
        Ok(cluster)
    }

    async fn update_cluster(&self, patch: &ClusterPatch) -> Result<Cluster> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE clusters SET name = COALESCE(?2, name),
                panchayath_id = COALESCE(?3, panchayath_id),
                is_active = COALESCE(?4, is_active)
             WHERE id = ?1",
            params![patch.id, patch.name, patch.panchayath_id, patch.is_active],
        )?;
        ensure_changed(changed, "cluster", &patch.id)?;
        Self::fetch_cluster(&conn, &patch.id)
    }

    async fn agents(&self) -> Result<Vec<Agent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, a.mobile, a.role, a.parent_agent_id, a.panchayath_id, p.name,
                    a.ward, a.customer_count, a.is_active, a.created_at
             FROM pennyekart_agents a
             LEFT JOIN panchayaths p ON p.id = a.panchayath_id
             ORDER BY a.rowid",
        )?;
        let agents = stmt
            .query_map([], agent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }
}

// ============================================================================
// CSV IMPORT
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DivisionRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PanchayathRecord {
    pub name: String,
}

/// One agent row; the parent is referenced by mobile number
#[derive(Debug, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub mobile: String,
    pub role: String,
    #[serde(default)]
    pub parent_mobile: Option<String>,
    #[serde(default)]
    pub panchayath: Option<String>,
    #[serde(default)]
    pub ward: String,
    #[serde(default)]
    pub customer_count: u64,
}

/// One program row; division and panchayath are referenced by name,
/// modules as a `;`-separated list enabled and published on import
#[derive(Debug, Deserialize)]
pub struct ProgramRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub panchayath: Option<String>,
    #[serde(default)]
    pub all_panchayaths: bool,
    #[serde(default)]
    pub modules: String,
}

pub fn load_csv<T: serde::de::DeserializeOwned>(csv_path: &Path) -> anyhow::Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result.context("Failed to deserialize CSV record")?;
        records.push(record);
    }

    Ok(records)
}

fn id_by_name(conn: &Connection, table: &str, name: &str) -> Result<Option<String>> {
    let sql = format!("SELECT id FROM {} WHERE lower(name) = lower(?1)", table);
    Ok(conn.query_row(&sql, params![name.trim()], |row| row.get(0)).optional()?)
}

pub fn import_divisions(store: &SqliteStore, records: &[DivisionRecord]) -> anyhow::Result<usize> {
    let inserted = store.with_transaction(|conn| {
        let mut inserted = 0;
        for record in records {
            if id_by_name(conn, "divisions", &record.name)?.is_some() {
                continue;
            }
            conn.execute(
                "INSERT INTO divisions (id, name, description, is_active) VALUES (?1, ?2, ?3, 1)",
                params![
                    new_id(),
                    record.name.trim(),
                    record.description.as_deref().filter(|d| !d.is_empty())
                ],
            )?;
            inserted += 1;
        }
        Ok(inserted)
    })?;

    info!("Imported {} divisions", inserted);
    Ok(inserted)
}

pub fn import_panchayaths(store: &SqliteStore, records: &[PanchayathRecord]) -> anyhow::Result<usize> {
    let inserted = store.with_transaction(|conn| {
        let mut inserted = 0;
        for record in records {
            if id_by_name(conn, "panchayaths", &record.name)?.is_some() {
                continue;
            }
            conn.execute(
                "INSERT INTO panchayaths (id, name, is_active) VALUES (?1, ?2, 1)",
                params![new_id(), record.name.trim()],
            )?;
            inserted += 1;
        }
        Ok(inserted)
    })?;

    info!("Imported {} panchayaths", inserted);
    Ok(inserted)
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validate every row, then insert agents and link parents by mobile in one
/// transaction so the file may list children before their parents.
/// Agents whose mobile is already stored are skipped, so a re-run only adds
/// the missing rows.
pub fn import_agents(store: &SqliteStore, records: &[AgentRecord]) -> anyhow::Result<usize> {
    let mut roles = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();
    for record in records {
        let role: AgentRole = record
            .role
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("Invalid role for agent {}", record.name))?;
        let mobile = record.mobile.trim();
        if mobile.is_empty() {
            anyhow::bail!("Mobile is required for agent {}", record.name);
        }
        if !seen.insert(mobile) {
            anyhow::bail!("Duplicate mobile {} in import", mobile);
        }
        roles.push(role);
    }

    let inserted = store.with_transaction(|conn| {
        let mut by_mobile: HashMap<String, String> = HashMap::new();
        {
            let mut stmt = conn.prepare("SELECT mobile, id FROM pennyekart_agents")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                let (mobile, id) = row?;
                by_mobile.insert(mobile, id);
            }
        }

        let mut new_ids: HashMap<&str, String> = HashMap::new();
        for (record, role) in records.iter().zip(roles.iter().copied()) {
            let mobile = record.mobile.trim();
            if by_mobile.contains_key(mobile) {
                debug!("Agent {} already imported", mobile);
                continue;
            }

            let panchayath_id = match trimmed(record.panchayath.as_deref()) {
                Some(name) => {
                    let id = id_by_name(conn, "panchayaths", name)?;
                    if id.is_none() {
                        warn!("Unknown panchayath {} for agent {}", name, record.name);
                    }
                    id
                }
                None => None,
            };

            let agent = Agent {
                id: new_id(),
                name: record.name.trim().to_string(),
                mobile: mobile.to_string(),
                role,
                parent_agent_id: None,
                panchayath_id,
                panchayath_name: None,
                ward: record.ward.clone(),
                customer_count: if role.is_leaf() { record.customer_count } else { 0 },
                is_active: true,
                created_at: Utc::now(),
            };
            write_agent(conn, &agent)?;
            new_ids.insert(mobile, agent.id);
        }

        for record in records {
            let Some(child) = new_ids.get(record.mobile.trim()) else {
                continue;
            };
            let Some(parent_mobile) = trimmed(record.parent_mobile.as_deref()) else {
                continue;
            };
            let parent = new_ids
                .get(parent_mobile)
                .or_else(|| by_mobile.get(parent_mobile));
            let Some(parent) = parent else {
                warn!("Parent {} not found for agent {}", parent_mobile, record.mobile);
                continue;
            };
            conn.execute(
                "UPDATE pennyekart_agents SET parent_agent_id = ?2 WHERE id = ?1",
                params![child, parent],
            )?;
        }

        Ok(new_ids.len())
    })?;

    info!("Imported {} agents ({} already present)", inserted, records.len() - inserted);
    Ok(inserted)
}

/// Validate every row's modules, then insert programs in one transaction.
/// A program already stored under the same name and division is skipped.
pub fn import_programs(store: &SqliteStore, records: &[ProgramRecord]) -> anyhow::Result<usize> {
    let mut modules_per_record = Vec::with_capacity(records.len());
    for record in records {
        let mut modules: Vec<ModuleType> = Vec::new();
        for module in record.modules.split(';').map(str::trim).filter(|m| !m.is_empty()) {
            let module_type: ModuleType = module
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid module for program {}", record.name))?;
            if modules.contains(&module_type) {
                anyhow::bail!("Duplicate module {} for program {}", module, record.name);
            }
            modules.push(module_type);
        }
        modules_per_record.push(modules);
    }

    let inserted = store.with_transaction(|conn| {
        let mut inserted = 0;
        for (record, modules) in records.iter().zip(&modules_per_record) {
            let lookup = |table: &str, name: Option<&str>| -> Result<Option<String>> {
                match trimmed(name) {
                    Some(name) => id_by_name(conn, table, name),
                    None => Ok(None),
                }
            };
            let name = record.name.trim();
            let division_id = lookup("divisions", record.division.as_deref())?;

            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM programs WHERE lower(name) = lower(?1) AND division_id IS ?2",
                    params![name, division_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                debug!("Program {} already imported", name);
                continue;
            }

            let program = Program {
                id: new_id(),
                name: name.to_string(),
                description: record.description.clone().filter(|d| !d.is_empty()),
                division_id,
                panchayath_id: lookup("panchayaths", record.panchayath.as_deref())?,
                all_panchayaths: record.all_panchayaths,
                is_active: true,
                start_date: None,
                end_date: None,
                created_at: Utc::now(),
            };
            write_program(conn, &program)?;

            for module_type in modules {
                conn.execute(
                    "INSERT INTO program_modules (id, program_id, module_type, is_published)
                     VALUES (?1, ?2, ?3, 1)",
                    params![new_id(), program.id, module_type.as_str()],
                )?;
            }
            inserted += 1;
        }
        Ok(inserted)
    })?;

    info!("Imported {} programs", inserted);
    Ok(inserted)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::io::Write;

    pub(crate) fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 9, minute, 0).unwrap()
    }

    pub(crate) fn program(id: &str, division: &str, panchayath: Option<&str>, all: bool, minute: u32) -> Program {
        Program {
            id: id.to_string(),
            name: format!("Program {}", id),
            description: None,
            division_id: Some(division.to_string()),
            panchayath_id: panchayath.map(str::to_string),
            all_panchayaths: all,
            is_active: true,
            start_date: None,
            end_date: None,
            created_at: at(minute),
        }
    }

    pub(crate) fn registration(id: &str, program_id: &str, answers: serde_json::Value, minute: u32) -> Registration {
        Registration {
            id: id.to_string(),
            program_id: program_id.to_string(),
            answers: RegistrationAnswers::try_from(answers).unwrap(),
            created_at: at(minute),
        }
    }

    pub(crate) fn agent(id: &str, role: AgentRole, parent: Option<&str>, customers: u64) -> Agent {
        Agent {
            id: id.to_string(),
            name: format!("Agent {}", id),
            mobile: format!("90000000{}", id),
            role,
            parent_agent_id: parent.map(str::to_string),
            panchayath_id: None,
            panchayath_name: None,
            ward: "1".to_string(),
            customer_count: customers,
            is_active: true,
            created_at: at(0),
        }
    }

    #[tokio::test]
    async fn test_programs_scoped_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_program(&program("a", "d1", None, false, 1)).unwrap();
        store.insert_program(&program("b", "d2", None, false, 2)).unwrap();
        store.insert_program(&program("c", "d1", None, false, 3)).unwrap();

        let all = store.programs(&DivisionScope::Unrestricted).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let scoped = store.programs(&DivisionScope::from_ids(["d1"])).await.unwrap();
        let ids: Vec<&str> = scoped.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_module_uniqueness() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_program(&program("p1", "d1", None, false, 1)).unwrap();

        store.insert_program_module("p1", ModuleType::Registration).await.unwrap();
        let err = store
            .insert_program_module("p1", ModuleType::Registration)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::BadRequest(_)));

        assert_eq!(store.program_modules("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_registration_answers_persist() {
        let store = SqliteStore::open_in_memory().unwrap();
        let reg = registration("r1", "p1", json!({"_fixed": {"name": "Asha"}, "q1": ["a", "b"]}), 5);
        store.insert_registration(&reg).await.unwrap();

        let fetched = store.registrations(&["p1".to_string()]).await.unwrap();
        assert_eq!(fetched, vec![reg]);
        assert!(store.registrations(&[]).await.unwrap().is_empty());
        assert_eq!(store.count_registrations().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.set_program_active("missing", false).await.unwrap_err();
        assert!(matches!(err, AdminError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_panchayath_patch_keeps_unset_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store
            .create_panchayath(&NewPanchayath { name: "Kodur".into(), is_active: true })
            .await
            .unwrap();

        let updated = store
            .update_panchayath(&PanchayathPatch { id: created.id.clone(), name: None, is_active: Some(false) })
            .await
            .unwrap();
        assert_eq!(updated.name, "Kodur");
        assert!(!updated.is_active);
    }

    #[tokio::test]
    async fn test_delete_program_cascades() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_program(&program("p1", "d1", None, false, 1)).unwrap();
        store.insert_program_module("p1", ModuleType::Announcement).await.unwrap();
        store
            .insert_registration(&registration("r1", "p1", json!({}), 2))
            .await
            .unwrap();

        store.delete_program("p1").await.unwrap();
        assert!(store.program("p1").await.unwrap().is_none());
        assert_eq!(store.count_registrations().await.unwrap(), 0);
        assert!(store.program_modules("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_agents_links_parents_by_mobile() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,mobile,role,parent_mobile,panchayath,ward,customer_count").unwrap();
        writeln!(file, "Pro One,300,pro,200,,3,7").unwrap();
        writeln!(file, "Leader,100,team_leader,,,1,5").unwrap();
        writeln!(file, "Coord,200,coordinator,100,,2,0").unwrap();
        file.flush().unwrap();

        let records: Vec<AgentRecord> = load_csv(file.path()).unwrap();
        assert_eq!(import_agents(&store, &records).unwrap(), 3);

        let agents = store.agents().await.unwrap();
        let by_mobile: HashMap<&str, &Agent> = agents.iter().map(|a| (a.mobile.as_str(), a)).collect();
        assert_eq!(by_mobile["300"].parent_agent_id.as_deref(), Some(by_mobile["200"].id.as_str()));
        assert_eq!(by_mobile["200"].parent_agent_id.as_deref(), Some(by_mobile["100"].id.as_str()));
        assert_eq!(by_mobile["100"].customer_count, 0);
        assert_eq!(by_mobile["300"].customer_count, 7);

        println!("✅ Agent import test passed");
    }

    fn agent_record(name: &str, mobile: &str, role: &str, parent: Option<&str>) -> AgentRecord {
        AgentRecord {
            name: name.to_string(),
            mobile: mobile.to_string(),
            role: role.to_string(),
            parent_mobile: parent.map(str::to_string),
            panchayath: None,
            ward: String::new(),
            customer_count: 0,
        }
    }

    #[tokio::test]
    async fn test_import_agents_bad_row_leaves_nothing_and_rerun_succeeds() {
        let store = SqliteStore::open_in_memory().unwrap();
        let broken = vec![
            agent_record("A", "111", "team_leader", None),
            agent_record("B", "222", "manager", Some("111")),
        ];
        let err = import_agents(&store, &broken).unwrap_err();
        assert!(err.to_string().contains("Invalid role for agent B"));
        assert!(store.agents().await.unwrap().is_empty());

        let fixed = vec![
            agent_record("A", "111", "team_leader", None),
            agent_record("B", "222", "coordinator", Some("111")),
        ];
        assert_eq!(import_agents(&store, &fixed).unwrap(), 2);
        assert_eq!(import_agents(&store, &fixed).unwrap(), 0);

        let agents = store.agents().await.unwrap();
        assert_eq!(agents.len(), 2);
        let a = agents.iter().find(|a| a.mobile == "111").unwrap();
        let b = agents.iter().find(|a| a.mobile == "222").unwrap();
        assert_eq!(b.parent_agent_id.as_deref(), Some(a.id.as_str()));
    }

    #[tokio::test]
    async fn test_import_agents_links_to_previously_imported_parent() {
        let store = SqliteStore::open_in_memory().unwrap();
        import_agents(&store, &[agent_record("A", "111", "team_leader", None)]).unwrap();
        import_agents(&store, &[agent_record("B", "222", "coordinator", Some("111"))]).unwrap();

        let agents = store.agents().await.unwrap();
        assert_eq!(agents[1].parent_agent_id.as_deref(), Some(agents[0].id.as_str()));
    }

    #[test]
    fn test_import_agents_rejects_duplicate_mobile() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records = vec![
            agent_record("A", "111", "team_leader", None),
            agent_record("A again", " 111 ", "coordinator", None),
        ];
        assert!(import_agents(&store, &records).is_err());
        let count: i64 = store
            .with_connection(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM pennyekart_agents", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    fn program_record(name: &str, modules: &str) -> ProgramRecord {
        ProgramRecord {
            name: name.to_string(),
            description: None,
            division: None,
            panchayath: None,
            all_panchayaths: true,
            modules: modules.to_string(),
        }
    }

    #[tokio::test]
    async fn test_import_programs_is_atomic_and_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();

        let err = import_programs(&store, &[program_record("Fair", "registration"), program_record("Camp", "bogus")])
            .unwrap_err();
        assert!(err.to_string().contains("Invalid module for program Camp"));
        assert!(import_programs(&store, &[program_record("Fair", "registration;registration")]).is_err());
        assert!(store.programs(&DivisionScope::Unrestricted).await.unwrap().is_empty());

        let records = vec![program_record("Fair", "registration;announcement"), program_record("Camp", "")];
        assert_eq!(import_programs(&store, &records).unwrap(), 2);
        assert_eq!(import_programs(&store, &records).unwrap(), 0);

        let programs = store.programs(&DivisionScope::Unrestricted).await.unwrap();
        assert_eq!(programs.len(), 2);
        let fair = programs.iter().find(|p| p.name == "Fair").unwrap();
        let modules = store.program_modules(&fair.id).await.unwrap();
        assert_eq!(modules.len(), 2);
        assert!(modules.iter().all(|m| m.is_published));
    }
}
