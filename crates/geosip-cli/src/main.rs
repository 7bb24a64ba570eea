//! geosip - land survey record keeping from the command line.
//!
//! Usage:
//!   geosip [--config PATH] status
//!   geosip list [--village V] [--search S] [--status S] [--sort KEY] [--page N]
//!   geosip --user U --password P add --owner NAME --gu N1 --doc C-1 ...
//!   geosip --user U --password P import rows.json
//!   geosip --user U --password P export out.json

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use geosip_core::{
    DraftForm, GeosipConfig, GroupQuery, NewUser, RawRow, RecordService, Session, Sha256Hasher,
    SortKey, StatusFilter, UserDirectory, VillageFilter, Workbook, authenticate,
    ensure_super_admin, remarks_prompt,
};
use geosip_store::{FileLegacySource, MigrationOutcome, Store};
use geosip_types::{LandRecord, MeasurementStatus, RecordDraft, RecordId, UserPermissions};

#[derive(Parser, Debug)]
#[command(name = "geosip")]
#[command(about = "Land parcel survey records")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Username or email for commands that change data
    #[arg(long, global = true)]
    user: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which backend this session uses and the record counts
    Status,
    /// Grouped, filtered and sorted records, one page at a time
    List(ListArgs),
    /// Create a record; document and drawing numbers autofill from existing records
    Add(RecordArgs),
    /// Change fields of an existing record
    Edit {
        id: String,
        #[command(flatten)]
        fields: RecordArgs,
    },
    Delete {
        id: String,
    },
    /// Delete every record (super-admin only)
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Append the rows of a JSON file (row array or exported workbook)
    Import {
        file: PathBuf,
    },
    /// Write every record as a workbook, one sheet per village
    Export {
        out: PathBuf,
    },
    /// Write the empty import template
    Template {
        out: PathBuf,
    },
    /// Move legacy local records into the store now
    Migrate,
    /// Set the file link on every record of a survey drawing number
    SyncLink {
        gu: String,
        link: String,
    },
    /// Print the remarks prompt for a draft
    RemarksPrompt(RecordArgs),
    /// List user accounts (super-admin only)
    Users,
    AddUser(AddUserArgs),
    DeleteUser {
        username: String,
    },
}

#[derive(Args, Debug, Default)]
struct ListArgs {
    /// Village name, or "all"
    #[arg(long, default_value = "all")]
    village: String,

    /// Case-insensitive match on owner name, drawing number, document number,
    /// village, block, plot number or remarks
    #[arg(long, default_value = "")]
    search: String,

    /// Status label or "all"
    #[arg(long, default_value = "all")]
    status: String,

    /// gu_asc, gu_desc, newest, oldest, area_high, area_low
    #[arg(long, default_value = "gu_asc")]
    sort: String,

    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Print the page as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct RecordArgs {
    #[arg(long)]
    owner: Option<String>,
    /// Survey drawing number (NO. GU)
    #[arg(long)]
    gu: Option<String>,
    #[arg(long)]
    village: Option<String>,
    #[arg(long)]
    block: Option<String>,
    #[arg(long)]
    plot: Option<String>,
    /// Document number (C number)
    #[arg(long)]
    doc: Option<String>,
    #[arg(long)]
    area: Option<f64>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    remarks: Option<String>,
    /// Map or drawing file link
    #[arg(long)]
    link: Option<String>,
}

#[derive(Args, Debug)]
struct AddUserArgs {
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long = "new-password")]
    new_password: String,
    /// Grant every record permission
    #[arg(long)]
    all: bool,
    #[arg(long)]
    can_add: bool,
    #[arg(long)]
    can_edit: bool,
    #[arg(long)]
    can_delete: bool,
    #[arg(long)]
    can_export_import: bool,
}

impl AddUserArgs {
    fn permissions(&self) -> UserPermissions {
        if self.all {
            return UserPermissions::all();
        }
        UserPermissions {
            can_add: self.can_add,
            can_edit: self.can_edit,
            can_delete: self.can_delete,
            can_export_import: self.can_export_import,
        }
    }
}

/// An import file holds either bare rows or an exported workbook.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Rows(Vec<RawRow>),
    Workbook(Workbook),
}

impl ImportFile {
    fn into_rows(self) -> Vec<RawRow> {
        match self {
            ImportFile::Rows(rows) => rows,
            ImportFile::Workbook(workbook) => workbook.rows_as_raw(),
        }
    }
}

struct App {
    config: GeosipConfig,
    store: Store,
    service: RecordService,
}

impl App {
    async fn boot(config_path: Option<&Path>) -> Result<Self> {
        let config = GeosipConfig::load_with_env(config_path)?;
        let legacy = FileLegacySource::new(&config.store.legacy.dir);
        let store = Store::connect(&config.store, Arc::new(legacy))
            .await
            .context("failed to open record store")?;
        ensure_super_admin(&store, &Sha256Hasher, &config.admin)
            .await
            .context("failed to bootstrap admin account")?;
        let service = RecordService::new(store.clone(), config.page_size);
        Ok(Self {
            config,
            store,
            service,
        })
    }

    async fn session(&self, cli: &Cli) -> Result<Session> {
        let (Some(user), Some(password)) = (cli.user.as_deref(), cli.password.as_deref()) else {
            bail!("this command needs --user and --password");
        };
        Ok(authenticate(&self.store, &Sha256Hasher, user, password).await?)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    if let Command::RemarksPrompt(args) = &cli.command {
        let mut draft = RecordDraft::default();
        args.apply(&mut draft)?;
        println!("{}", remarks_prompt(&draft));
        return Ok(());
    }

    let app = App::boot(cli.config.as_deref()).await?;

    match &cli.command {
        Command::Status => cmd_status(&app).await,
        Command::List(args) => cmd_list(&app, args).await,
        Command::Add(args) => cmd_add(&app, &app.session(cli).await?, args).await,
        Command::Edit { id, fields } => cmd_edit(&app, &app.session(cli).await?, id, fields).await,
        Command::Delete { id } => {
            let session = app.session(cli).await?;
            app.service.delete(&session, &RecordId::from_raw(id.as_str())).await?;
            println!("deleted {id}");
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear every record without --yes");
            }
            let session = app.session(cli).await?;
            app.service.clear(&session).await?;
            println!("all records deleted");
            Ok(())
        }
        Command::Import { file } => cmd_import(&app, &app.session(cli).await?, file).await,
        Command::Export { out } => {
            let session = app.session(cli).await?;
            let workbook = app.service.export(&session).await?;
            write_json(out, &workbook).await?;
            let rows: usize = workbook.sheets.iter().map(|s| s.rows.len()).sum();
            println!("exported {rows} records in {} sheets to {}", workbook.sheets.len(), out.display());
            Ok(())
        }
        Command::Template { out } => {
            write_json(out, &app.service.template()).await?;
            println!("template written to {}", out.display());
            Ok(())
        }
        Command::Migrate => {
            match app.service.migrate().await? {
                MigrationOutcome::NoSource => println!("no legacy records found"),
                MigrationOutcome::Empty => println!("legacy store was empty"),
                MigrationOutcome::Migrated(n) => println!("migrated {n} records"),
            }
            Ok(())
        }
        Command::SyncLink { gu, link } => {
            let session = app.session(cli).await?;
            let updated = app.service.sync_link(&session, gu, link).await?;
            println!("updated {updated} records");
            Ok(())
        }
        Command::Users => {
            let session = app.session(cli).await?;
            for user in directory(&app).list_users(&session).await? {
                let role = if user.is_super_admin { "super-admin" } else { "user" };
                println!("{:<20} {:<30} {role} {:?}", user.username, user.email, user.permissions);
            }
            Ok(())
        }
        Command::AddUser(args) => {
            let session = app.session(cli).await?;
            let user = directory(&app)
                .add_user(
                    &session,
                    NewUser {
                        username: args.username.clone(),
                        password: args.new_password.clone(),
                        email: args.email.clone(),
                        permissions: args.permissions(),
                    },
                )
                .await?;
            println!("saved user {}", user.username);
            Ok(())
        }
        Command::DeleteUser { username } => {
            let session = app.session(cli).await?;
            directory(&app).delete_user(&session, username).await?;
            println!("deleted user {username}");
            Ok(())
        }
        Command::RemarksPrompt(_) => Ok(()),
    }
}

fn directory(app: &App) -> UserDirectory<Store> {
    UserDirectory::new(app.store.clone(), Arc::new(Sha256Hasher))
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn cmd_status(app: &App) -> Result<()> {
    let page = app.service.browse(&GroupQuery::default(), 1).await?;
    println!("backend: {}", app.service.status_label());
    println!("page size: {}", app.config.page_size);
    println!("records: {}", page.counts.total);
    for (village, count) in &page.counts.per_village {
        println!("  {:<24} {count}", village.label());
    }
    println!("groups: {}", page.total_groups);
    Ok(())
}

fn list_query(args: &ListArgs) -> Result<GroupQuery> {
    let Some(status) = StatusFilter::parse(&args.status) else {
        bail!("unknown status: {}", args.status);
    };
    Ok(GroupQuery {
        village: VillageFilter::parse(&args.village),
        search: args.search.clone(),
        status,
        sort: SortKey::parse_or_default(&args.sort),
    })
}

async fn cmd_list(app: &App, args: &ListArgs) -> Result<()> {
    let query = list_query(args)?;
    let page = app.service.browse(&query, args.page).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    for group in &page.groups {
        println!(
            "GU {}  |  {}  |  {} m2  |  {} owner(s)",
            group.key.drawing_label(),
            group.key.document_label(),
            group.unified_area,
            group.member_count,
        );
        for record in &group.members {
            print_record(record, "    ");
        }
    }
    println!(
        "page {}/{} ({} groups, {} records)",
        page.page, page.total_pages, page.total_groups, page.counts.total
    );
    Ok(())
}

fn print_record(record: &LandRecord, indent: &str) {
    println!(
        "{indent}{}  {:<24} {:<22} blok {:<4} bidang {:<4} {}{}",
        record.id,
        record.owner_name,
        record.village,
        record.block,
        record.plot_number,
        record.status.label(),
        record.link().map(|l| format!("  [{l}]")).unwrap_or_default(),
    );
}

impl RecordArgs {
    /// Copy the given fields into `draft`. Document and drawing numbers are
    /// left to the caller so their cascades run.
    fn apply(&self, draft: &mut RecordDraft) -> Result<()> {
        if let Some(v) = &self.owner {
            draft.owner_name = v.clone();
        }
        if let Some(v) = &self.village {
            draft.village = v.clone();
        }
        if let Some(v) = &self.block {
            draft.block = v.clone();
        }
        if let Some(v) = &self.plot {
            draft.plot_number = v.clone();
        }
        if let Some(v) = self.area {
            draft.area = v;
        }
        if let Some(v) = &self.status {
            draft.status = match MeasurementStatus::parse(v) {
                Some(status) => status,
                None => bail!("unknown status: {v}"),
            };
        }
        if let Some(v) = &self.remarks {
            draft.remarks = v.clone();
        }
        if let Some(v) = &self.gu {
            draft.survey_drawing_number = v.clone();
        }
        if let Some(v) = &self.doc {
            draft.document_number = v.clone();
        }
        if let Some(v) = &self.link {
            draft.file_link = v.clone();
        }
        Ok(())
    }
}

fn report_form(form: &DraftForm) {
    if form.document_autofilled() {
        println!("parcel fields filled from document {}", form.draft().document_number);
    }
    if let Some(divergence) = form.divergence() {
        println!(
            "warning: records of document {} disagree ({} records); used the first",
            divergence.document_number,
            divergence.record_ids.len()
        );
    }
    if form.link_autofilled() {
        println!("file link filled from drawing {}", form.draft().survey_drawing_number);
    }
}

async fn finish_save(app: &App, session: &Session, form: DraftForm) -> Result<()> {
    report_form(&form);
    let outcome = app.service.save(session, form).await?;
    print_record(&outcome.record, "");
    if let Some(task) = outcome.link_sync {
        let updated = task.wait().await;
        info!(updated, "link propagated");
        println!("file link set on {updated} records of the drawing");
    }
    Ok(())
}

/// Re-apply the fields given on the command line after the cascades ran, so
/// explicit values win over autofill. An explicit drawing number re-runs the
/// link cascade; an explicit link wins over both.
fn apply_explicit(form: &mut DraftForm, args: &RecordArgs, existing: &[LandRecord]) {
    let draft = form.draft_mut();
    if let Some(area) = args.area {
        draft.area = area;
    }
    if let Some(v) = &args.village {
        draft.village = v.clone();
    }
    if let Some(v) = &args.block {
        draft.block = v.clone();
    }
    if let Some(v) = &args.plot {
        draft.plot_number = v.clone();
    }
    if let Some(gu) = &args.gu {
        form.set_drawing_number(gu, existing);
    }
    if let Some(link) = &args.link {
        form.set_file_link(link);
    }
}

async fn cmd_add(app: &App, session: &Session, args: &RecordArgs) -> Result<()> {
    let mut typed = RecordDraft::default();
    args.apply(&mut typed)?;
    let existing = app.service.records().await?;
    let mut form = app.service.new_form(typed).await?;
    apply_explicit(&mut form, args, &existing);
    finish_save(app, session, form).await
}

async fn cmd_edit(app: &App, session: &Session, id: &str, args: &RecordArgs) -> Result<()> {
    let existing = app.service.records().await?;
    let mut form = app.service.edit_form(&RecordId::from_raw(id)).await?;

    if let Some(gu) = &args.gu {
        form.set_drawing_number(gu, &existing);
    }
    if let Some(doc) = &args.doc {
        form.set_document_number(doc, &existing);
    }
    if let Some(link) = &args.link {
        form.set_file_link(link);
    }
    let rest = RecordArgs {
        gu: None,
        doc: None,
        link: None,
        ..args.clone()
    };
    rest.apply(form.draft_mut())?;

    finish_save(app, session, form).await
}

async fn cmd_import(app: &App, session: &Session, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let rows = serde_json::from_str::<ImportFile>(&text)
        .with_context(|| format!("{} is not a row array or workbook", file.display()))?
        .into_rows();
    let imported = app.service.import(session, &rows).await?;
    println!("imported {} records", imported.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_args() {
        let cli = Cli::try_parse_from([
            "geosip", "list", "--village", "Desa Dangdeur", "--sort", "newest", "--page", "3",
        ])
        .unwrap();
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        let query = list_query(&args).unwrap();
        assert_eq!(query.village, VillageFilter::Only("Desa Dangdeur".into()));
        assert_eq!(query.sort, SortKey::Newest);
        assert_eq!(args.page, 3);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let args = ListArgs {
            status: "bogus".into(),
            ..ListArgs::default()
        };
        assert!(list_query(&args).is_err());
    }

    #[test]
    fn test_global_credentials_after_subcommand() {
        let cli = Cli::try_parse_from([
            "geosip", "sync-link", "N1", "https://maps/n1", "--user", "admin", "--password", "pw",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("admin"));
        assert!(matches!(cli.command, Command::SyncLink { .. }));
    }

    #[test]
    fn test_import_file_shapes() {
        let rows: ImportFile = serde_json::from_str(r#"[{"NO. GU":"N1"}]"#).unwrap();
        assert_eq!(rows.into_rows().len(), 1);

        let workbook = serde_json::to_string(&geosip_core::template_workbook()).unwrap();
        let parsed: ImportFile = serde_json::from_str(&workbook).unwrap();
        assert_eq!(parsed.into_rows().len(), 1);
    }

    #[test]
    fn test_record_args_status() {
        let mut draft = RecordDraft::default();
        let args = RecordArgs {
            status: Some("selesai diukur".into()),
            area: Some(12.5),
            ..RecordArgs::default()
        };
        args.apply(&mut draft).unwrap();
        assert_eq!(draft.area, 12.5);
        assert_eq!(draft.status, MeasurementStatus::Completed);
    }

    #[test]
    fn test_explicit_args_win_over_document_autofill() {
        let stored = |gu: &str, doc: &str, link: &str| {
            LandRecord::from_draft(
                RecordDraft {
                    survey_drawing_number: gu.into(),
                    document_number: doc.into(),
                    village: "Desa Dangdeur".into(),
                    block: "Blok 2".into(),
                    plot_number: "17".into(),
                    area: 100.0,
                    file_link: link.into(),
                    ..RecordDraft::default()
                },
                RecordId::new(),
                1,
            )
        };
        let existing = vec![stored("N1", "C-1", "https://maps/n1"), stored("N9", "", "https://maps/n9")];

        let args = RecordArgs {
            gu: Some("N9".into()),
            doc: Some("C-1".into()),
            area: Some(5.0),
            ..RecordArgs::default()
        };
        let mut typed = RecordDraft::default();
        args.apply(&mut typed).unwrap();
        let mut form = DraftForm::create_from(typed, &existing);
        assert_eq!(form.draft().survey_drawing_number, "N1");

        apply_explicit(&mut form, &args, &existing);
        assert!(form.document_autofilled());
        assert_eq!(form.draft().survey_drawing_number, "N9");
        assert_eq!(form.draft().file_link, "https://maps/n9");
        assert_eq!(form.draft().area, 5.0);
        assert_eq!(form.draft().block, "Blok 2");

        let args = RecordArgs {
            link: Some("https://maps/own".into()),
            ..args
        };
        apply_explicit(&mut form, &args, &existing);
        assert_eq!(form.draft().file_link, "https://maps/own");
        assert!(!form.link_autofilled());
    }
}
