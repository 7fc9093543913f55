// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use division_admin::export::{
    agents_filename, agents_report_html, agents_table, format_datetime, registrations_filename,
    registrations_table,
};
use division_admin::entities::{FixedField, FormQuestion};
use division_admin::hierarchy::{build_forest, RowKind, TreeView};
use division_admin::stats::{fetch_admin_stats, fetch_super_admin_stats};
use division_admin::{
    import_agents, import_divisions, import_panchayaths, import_programs, load_csv, programs, AdminError, Config,
    DataStore, RequestContext, SqliteStore,
};

#[derive(Parser)]
#[command(name = "division-admin")]
#[command(about = "Division and program administration: stats, agent hierarchy and exports")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "division-admin.toml", env = "DIVISION_ADMIN_CONFIG")]
    config: PathBuf,

    /// SQLite database (overrides config file)
    #[arg(long, env = "DIVISION_ADMIN_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load divisions, panchayaths, agents or programs from CSV
    Import {
        #[arg(value_enum)]
        kind: ImportKind,
        path: PathBuf,
    },
    /// Division admin dashboard numbers
    Stats(ContextArgs),
    /// System-wide dashboard numbers
    SuperStats,
    /// Print the agent hierarchy per panchayath
    Tree,
    /// List published programs with their public registration links
    Programs {
        /// Only programs of this division (name, case-insensitive)
        #[arg(long)]
        division: Option<String>,
    },
    /// Print a program's registrations as a table
    Registrations {
        program_id: String,
        /// Only registrations from this panchayath id
        #[arg(long)]
        panchayath: Option<String>,
    },
    /// Write a program's registrations to CSV
    ExportRegistrations {
        program_id: String,
        /// Only registrations from this panchayath id
        #[arg(long)]
        panchayath: Option<String>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Write the agents list as CSV or a printable HTML report
    ExportAgents {
        #[arg(long, value_enum, default_value_t = AgentFormat::Csv)]
        format: AgentFormat,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Sign an admin token for the proxy endpoints
    IssueToken {
        #[arg(long)]
        admin_id: String,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Interactive dashboard (default)
    Ui(ContextArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Divisions,
    Panchayaths,
    Agents,
    Programs,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AgentFormat {
    Csv,
    Html,
}

/// Who the command runs as
#[derive(Args, Clone, Default)]
struct ContextArgs {
    /// Run as super admin (all divisions)
    #[arg(long)]
    super_admin: bool,

    /// Primary division of the division admin
    #[arg(long)]
    division: Option<String>,

    /// Extra divisions the admin may see
    #[arg(long = "also", value_delimiter = ',')]
    additional_divisions: Vec<String>,

    /// Admin sees every division
    #[arg(long)]
    all_divisions: bool,
}

impl ContextArgs {
    fn context(&self) -> RequestContext {
        if self.super_admin {
            return RequestContext::super_admin();
        }
        match &self.division {
            Some(division) => RequestContext::division_admin(division.clone())
                .with_additional_divisions(self.additional_divisions.clone())
                .with_access_all(self.all_divisions),
            None => RequestContext::member(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    config.logging.init_tracing();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let store = Arc::new(SqliteStore::open(&config.database.path)?);
    let offset = config.display.offset()?;
    info!("Database: {}", config.database.path.display());

    let local_operator = ContextArgs { super_admin: true, ..Default::default() };
    match cli.command.unwrap_or(Command::Ui(local_operator)) {
        Command::Import { kind, path } => run_import(&store, kind, &path),
        Command::Stats(args) => runtime.block_on(run_stats(store, &args.context(), &offset)),
        Command::SuperStats => runtime.block_on(run_super_stats(store)),
        Command::Tree => runtime.block_on(run_tree(store)),
        Command::Programs { division } => runtime.block_on(run_programs(
            store,
            division.as_deref(),
            &config.server.public_base_url,
        )),
        Command::Registrations { program_id, panchayath } => {
            runtime.block_on(run_registrations(store, &program_id, panchayath.as_deref(), &offset))
        }
        Command::ExportRegistrations { program_id, panchayath, out } => runtime.block_on(run_export_registrations(
            store,
            &program_id,
            panchayath.as_deref(),
            &out,
            &offset,
        )),
        Command::ExportAgents { format, out } => runtime.block_on(run_export_agents(store, format, &out, &offset)),
        Command::IssueToken { admin_id, context } => run_issue_token(&config, &admin_id, &context.context()),
        Command::Ui(args) => run_ui_mode(store, args.context(), &runtime, offset),
    }
}

fn run_import(store: &SqliteStore, kind: ImportKind, path: &Path) -> Result<()> {
    println!("🗄️  Import: {}", path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let count = match kind {
        ImportKind::Divisions => import_divisions(store, &load_csv(path)?)?,
        ImportKind::Panchayaths => import_panchayaths(store, &load_csv(path)?)?,
        ImportKind::Agents => import_agents(store, &load_csv(path)?)?,
        ImportKind::Programs => import_programs(store, &load_csv(path)?)?,
    };

    println!("✓ Imported {} rows", count);
    Ok(())
}

async fn run_stats(store: Arc<SqliteStore>, ctx: &RequestContext, offset: &FixedOffset) -> Result<()> {
    let stats = fetch_admin_stats(store.as_ref(), ctx).await?;

    println!("📊 {} Dashboard", ctx.role.label());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Programs:      {} ({} active)", stats.total_programs, stats.active_programs);
    println!("Registrations: {}", stats.total_registrations);
    println!("Members:       {}", stats.total_members);

    if !stats.panchayath_stats.is_empty() {
        println!("\nPanchayaths");
        for p in &stats.panchayath_stats {
            println!("  {:<30} {:>6} registrations  {:>4} programs", p.name, p.registrations, p.programs);
        }
    }

    if !stats.cluster_stats.is_empty() {
        println!("\nClusters");
        for c in &stats.cluster_stats {
            println!("  {:<30} {:>6} members  ({})", c.name, c.members, c.panchayath_name);
        }
    }

    if !stats.recent_registrations.is_empty() {
        println!("\nRecent registrations");
        for r in &stats.recent_registrations {
            println!("  {}  {:<24} {}", format_datetime(&r.created_at, offset), r.registrant_name, r.program_name);
        }
    }

    Ok(())
}

async fn run_super_stats(store: Arc<SqliteStore>) -> Result<()> {
    let stats = fetch_super_admin_stats(store.as_ref()).await?;

    println!("🛡️  Super Admin Dashboard");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Admins:        {} ({} active)", stats.total_admins, stats.active_admins);
    println!("Divisions:     {} ({} active)", stats.total_divisions, stats.active_divisions);
    println!("Programs:      {} ({} active)", stats.total_programs, stats.active_programs);
    println!("Registrations: {}", stats.total_registrations);
    println!("Members:       {}", stats.total_members);

    println!("\nDivisions");
    for d in &stats.divisions {
        println!(
            "  {:<30} {:>4} programs  {:>6} members",
            d.division.name, d.program_count, d.member_count
        );
    }

    println!("\nRecent activity");
    for activity in &stats.recent_activity {
        println!("  {}  {}", activity.timestamp.format("%Y-%m-%d %H:%M"), activity.description);
    }

    Ok(())
}

async fn run_tree(store: Arc<SqliteStore>) -> Result<()> {
    let agents = store.agents().await?;
    let forest = build_forest(&agents);

    println!("🌳 Agent Hierarchy ({} agents)", agents.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for row in TreeView::new().rows(&forest) {
        let indent = "  ".repeat(row.depth);
        let customers = row.customers.map(|c| format!("  [{}]", c)).unwrap_or_default();
        match &row.kind {
            RowKind::Panchayath { agent_count } => println!("{} ({} agents)", row.label, agent_count),
            RowKind::Agent { role, mobile, .. } => {
                let ward = row.ward_tag().map(|w| format!(" {}", w)).unwrap_or_default();
                println!("{}{} - {} {}{}{}", indent, row.label, role.label(), mobile, ward, customers)
            }
        }
    }

    Ok(())
}

async fn run_programs(store: Arc<SqliteStore>, division: Option<&str>, base_url: &str) -> Result<()> {
    let listings = programs::public_programs(store.as_ref(), division).await?;

    println!("📋 Published Programs ({})", listings.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for listing in &listings {
        let division = listing.division_name.as_deref().unwrap_or("-");
        println!("  {:<30} {:<20} {}", listing.program.name, division, listing.program.public_url(base_url));
    }

    Ok(())
}

async fn run_registrations(
    store: Arc<SqliteStore>,
    program_id: &str,
    panchayath: Option<&str>,
    offset: &FixedOffset,
) -> Result<()> {
    let program = store
        .program(program_id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("program {}", program_id)))?;
    let (questions, registrations) = futures::try_join!(
        store.form_questions(program_id),
        programs::program_registrations(store.as_ref(), program_id, panchayath),
    )?;
    let questions = FormQuestion::sorted(&questions);

    println!("📝 {} ({} registrations)", program.name, registrations.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (i, registration) in registrations.iter().enumerate() {
        let answers = &registration.answers;
        println!(
            "{:>4}. {}  {}  {}",
            i + 1,
            format_datetime(&registration.created_at, offset),
            answers.fixed_display(FixedField::Name),
            answers.fixed_display(FixedField::Mobile),
        );
        for question in &questions {
            println!("      {}: {}", question.question_text, answers.display(&question.id));
        }
    }

    Ok(())
}

async fn run_export_registrations(
    store: Arc<SqliteStore>,
    program_id: &str,
    panchayath: Option<&str>,
    out: &Path,
    offset: &FixedOffset,
) -> Result<()> {
    let program = store
        .program(program_id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("program {}", program_id)))?;

    let questions = store.form_questions(program_id).await?;
    let registrations = programs::program_registrations(store.as_ref(), program_id, panchayath).await?;

    let table = registrations_table(&registrations, &questions, offset);
    let path = out.join(registrations_filename(&program.name, Utc::now().with_timezone(offset).date_naive()));
    table.write_csv_file(&path)?;

    println!("✅ Exported {} registrations to {}", registrations.len(), path.display());
    Ok(())
}

async fn run_export_agents(store: Arc<SqliteStore>, format: AgentFormat, out: &Path, offset: &FixedOffset) -> Result<()> {
    let (agents, panchayaths) = futures::try_join!(store.agents(), store.list_panchayaths())?;
    let now = Utc::now();
    let csv_name = agents_filename(now.with_timezone(offset).date_naive());

    let path = match format {
        AgentFormat::Csv => {
            let path = out.join(&csv_name);
            agents_table(&agents, &panchayaths, offset).write_csv_file(&path)?;
            path
        }
        AgentFormat::Html => {
            let path = out.join(Path::new(&csv_name).with_extension("html"));
            std::fs::write(&path, agents_report_html(&agents, &panchayaths, offset, &now))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            path
        }
    };

    println!("✅ Exported {} agents to {}", agents.len(), path.display());
    Ok(())
}

fn run_issue_token(config: &Config, admin_id: &str, ctx: &RequestContext) -> Result<()> {
    let signer = config.auth.signer()?;
    let token = signer.issue(admin_id, ctx, Utc::now())?;
    println!("{}", token);
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(
    store: Arc<SqliteStore>,
    ctx: RequestContext,
    runtime: &tokio::runtime::Runtime,
    offset: FixedOffset,
) -> Result<()> {
    println!("🖥️  Loading Division Admin dashboard...\n");

    let store: Arc<dyn DataStore> = store;
    let mut app = ui::App::new(store, ctx, runtime.handle().clone(), offset);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(
    _store: Arc<SqliteStore>,
    _ctx: RequestContext,
    _runtime: &tokio::runtime::Runtime,
    _offset: FixedOffset,
) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin division-admin-server --features server");
    std::process::exit(1);
}
