use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use reception_api::{ReceptionApi, API_CONTRACT_VERSION};
use reception_core::{
    parse_date, ReceptionDraft, ReceptionId, ReceptionPatch, ReportFormat, SortDirection,
    SortField, SortState, StatusFilter, ViewQuery,
};
use reception_store_json::FileBackend;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Parser)]
#[command(name = "wr")]
#[command(about = "Warehouse reception tracker")]
struct Cli {
    #[arg(long, env = "WR_DATA_DIR", default_value = "./.warehouse-reception")]
    data_dir: PathBuf,

    /// Tracing filter, e.g. `info` or `reception_store_json=debug`. Falls back to
    /// `RUST_LOG`, then `warn`.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Reception {
        #[command(subcommand)]
        command: Box<ReceptionCommand>,
    },
    /// Derived figures for a form that has not been submitted.
    Preview(PreviewArgs),
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ReceptionCommand {
    Add(AddArgs),
    List(ViewArgs),
    Show(IdArgs),
    Delete(IdArgs),
    Update(UpdateArgs),
}

#[derive(Debug, Subcommand)]
enum ReportCommand {
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct AddArgs {
    #[arg(long)]
    product_name: String,
    #[arg(long)]
    pallet_number: Option<String>,
    #[arg(long)]
    cartons: String,
    #[arg(long)]
    units_per_carton: String,
    #[arg(long)]
    barcode: String,
    #[arg(long)]
    production_date: Option<String>,
    #[arg(long)]
    expiration_date: Option<String>,
    /// Classification time (RFC 3339); defaults to now.
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[arg(long, default_value = "")]
    product_name: String,
    #[arg(long, default_value = "")]
    cartons: String,
    #[arg(long, default_value = "")]
    units_per_carton: String,
    #[arg(long, default_value = "")]
    barcode: String,
    #[arg(long)]
    production_date: Option<String>,
    #[arg(long)]
    expiration_date: Option<String>,
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Args)]
struct ViewArgs {
    #[arg(long, default_value = "")]
    search: String,
    /// `all`, `fresh`, `near_expiry` or `expired`.
    #[arg(long, default_value = "all")]
    status: String,
    /// Record field to order by; newest first when omitted.
    #[arg(long)]
    sort: Option<String>,
    #[arg(long, value_enum)]
    direction: Option<DirectionArg>,
}

#[derive(Debug, Args)]
struct IdArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    product_name: Option<String>,
    #[arg(long, conflicts_with = "clear_pallet")]
    pallet_number: Option<String>,
    #[arg(long, default_value_t = false)]
    clear_pallet: bool,
    #[arg(long)]
    cartons: Option<u32>,
    #[arg(long)]
    units_per_carton: Option<u32>,
    #[arg(long)]
    barcode: Option<String>,
    #[arg(long)]
    production_date: Option<String>,
    #[arg(long)]
    expiration_date: Option<String>,
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Directory the report file is written to.
    #[arg(long)]
    out: PathBuf,
    #[arg(long, value_enum, default_value_t = FormatArg::Html)]
    format: FormatArg,
    #[command(flatten)]
    view: ViewArgs,
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DirectionArg {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Plaintext,
    Html,
    Json,
}

impl From<DirectionArg> for SortDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Asc => Self::Asc,
            DirectionArg::Desc => Self::Desc,
        }
    }
}

impl From<FormatArg> for ReportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Plaintext => Self::Plaintext,
            FormatArg::Html => Self::Html,
            FormatArg::Json => Self::Json,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Command::Reception { command } => {
            let mut api = open_api(&cli.data_dir)?;
            run_reception(*command, &mut api)
        }
        Command::Preview(args) => run_preview(&args),
        Command::Report { command: ReportCommand::Export(args) } => {
            let api = open_api(&cli.data_dir)?;
            run_report_export(&args, &api)
        }
    }
}

fn open_api(data_dir: &Path) -> Result<ReceptionApi<FileBackend>> {
    tracing::debug!("Opening receptions under {}", data_dir.display());
    ReceptionApi::open(data_dir)
        .with_context(|| format!("failed to open data dir {}", data_dir.display()))
}

fn run_reception(command: ReceptionCommand, api: &mut ReceptionApi<FileBackend>) -> Result<()> {
    match command {
        ReceptionCommand::Add(args) => run_reception_add(args, api),
        ReceptionCommand::List(args) => run_reception_list(&args, api),
        ReceptionCommand::Show(args) => run_reception_show(&args, api),
        ReceptionCommand::Delete(args) => run_reception_delete(&args, api),
        ReceptionCommand::Update(args) => run_reception_update(args, api),
    }
}

fn run_reception_add(args: AddArgs, api: &mut ReceptionApi<FileBackend>) -> Result<()> {
    let now = resolve_now(args.as_of.as_deref())?;
    let draft = ReceptionDraft {
        product_name: args.product_name,
        pallet_number: args.pallet_number,
        cartons: args.cartons,
        units_per_carton: args.units_per_carton,
        barcode: args.barcode,
        production_date: args.production_date,
        expiration_date: args.expiration_date,
    };
    let result = api.submit(&draft, now).context("failed to add reception")?;
    emit_json(serde_json::json!({
        "api_contract_version": API_CONTRACT_VERSION,
        "record": result.record,
        "warnings": result.warnings
    }))
}

fn run_reception_list(args: &ViewArgs, api: &ReceptionApi<FileBackend>) -> Result<()> {
    let query = view_query(args)?;
    let view = api.view(&query).context("failed to list receptions")?;
    let mut value = serde_json::to_value(&view)?;
    if let Value::Object(object) = &mut value {
        object.insert("has_active_filters".to_string(), Value::Bool(query.has_active_filters()));
    }
    emit_json(value)
}

fn run_reception_show(args: &IdArgs, api: &ReceptionApi<FileBackend>) -> Result<()> {
    let id = ReceptionId::from(args.id.as_str());
    let record = api
        .get(&id)
        .context("failed to read receptions")?
        .ok_or_else(|| anyhow!("reception {id} not found"))?;
    emit_json(serde_json::json!({ "record": record }))
}

fn run_reception_delete(args: &IdArgs, api: &mut ReceptionApi<FileBackend>) -> Result<()> {
    let id = ReceptionId::from(args.id.as_str());
    let result = api.delete(&id).context("failed to delete reception")?;
    emit_json(serde_json::to_value(result)?)
}

fn run_reception_update(args: UpdateArgs, api: &mut ReceptionApi<FileBackend>) -> Result<()> {
    let now = resolve_now(args.as_of.as_deref())?;
    let pallet_number = if args.clear_pallet {
        Some(None)
    } else {
        args.pallet_number.map(|pallet| {
            let pallet = pallet.trim().to_string();
            (!pallet.is_empty()).then_some(pallet)
        })
    };
    let patch = ReceptionPatch {
        product_name: args.product_name.map(|name| name.trim().to_string()),
        pallet_number,
        cartons: args.cartons,
        units_per_carton: args.units_per_carton,
        barcode: args.barcode,
        production_date: args.production_date.as_deref().map(parse_date).transpose()?,
        expiration_date: args.expiration_date.as_deref().map(parse_date).transpose()?,
        ..ReceptionPatch::default()
    };

    let id = ReceptionId::from(args.id.as_str());
    let updated = api.update(&id, &patch, now).context("failed to update reception")?;
    emit_json(serde_json::json!({
        "id": id,
        "updated": updated.is_some(),
        "record": updated
    }))
}

fn run_preview(args: &PreviewArgs) -> Result<()> {
    let now = resolve_now(args.as_of.as_deref())?;
    let draft = ReceptionDraft {
        product_name: args.product_name.clone(),
        pallet_number: None,
        cartons: args.cartons.clone(),
        units_per_carton: args.units_per_carton.clone(),
        barcode: args.barcode.clone(),
        production_date: args.production_date.clone(),
        expiration_date: args.expiration_date.clone(),
    };
    let preview = draft.preview(now);
    let problems = draft.validate().err().map(|err| err.to_string());
    emit_json(serde_json::json!({
        "preview": preview,
        "status_label": preview.status.label(),
        "ready_to_submit": problems.is_none(),
        "problem": problems
    }))
}

fn run_report_export(args: &ExportArgs, api: &ReceptionApi<FileBackend>) -> Result<()> {
    let now = resolve_now(args.as_of.as_deref())?;
    let query = view_query(&args.view)?;
    let export =
        api.export(&query, args.format.into(), now).context("failed to export receptions")?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let path = args.out.join(&export.file_name);
    fs::write(&path, &export.content)
        .with_context(|| format!("failed to write {}", path.display()))?;

    emit_json(serde_json::json!({
        "path": path.display().to_string(),
        "file_name": export.file_name,
        "format": export.format,
        "record_count": export.record_count,
        "total_units": export.total_units
    }))
}

fn view_query(args: &ViewArgs) -> Result<ViewQuery> {
    let status_filter = StatusFilter::parse(&args.status)?;
    let sort = match (args.sort.as_deref(), args.direction) {
        (None, None) => SortState::default(),
        (None, Some(direction)) => {
            SortState { field: SortField::CreatedAt, direction: direction.into() }
        }
        (Some(raw), direction) => {
            let field = SortField::parse(raw).ok_or_else(|| anyhow!("unknown sort field `{raw}`"))?;
            SortState { field, direction: direction.map_or(SortDirection::Asc, Into::into) }
        }
    };
    Ok(ViewQuery { search_term: args.search.clone(), status_filter, sort })
}

fn resolve_now(as_of: Option<&str>) -> Result<OffsetDateTime> {
    match as_of {
        Some(raw) => OffsetDateTime::parse(raw, &Rfc3339)
            .with_context(|| format!("invalid --as-of timestamp `{raw}`")),
        None => Ok(OffsetDateTime::now_utc()),
    }
}
