use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thingdb::{EngineConfig, FieldDefinition, FieldKind, Schema, Value, Workspace};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "thing-tool")]
#[command(about = "Developer tooling for ThingDB workspaces")]
struct Cli {
    /// Overrides THINGDB_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a thing's properties and its unset declared fields
    Show { thing: Uuid },
    /// Set one property and save
    Set {
        thing: Uuid,
        name: String,
        value: String,
    },
    /// Recompute calculated fields and save
    Recompute { thing: Uuid },
    DescribeSchema {
        schema: Uuid,
        #[arg(long)]
        verbose: bool,
    },
    CreateSchema {
        name: String,
        #[arg(long)]
        plural: Option<String>,
    },
    /// Kinds: text, integer, number, boolean, email, uri, date, month-day,
    /// increment, array, schema, ref:<schema-id>, enum:<a|b|c>, calculated:<formula>
    AddField {
        schema: Uuid,
        name: String,
        kind: String,
        #[arg(long)]
        required: bool,
    },
    CreateThing {
        name: String,
        #[arg(long = "schema")]
        schemas: Vec<Uuid>,
    },
}

fn parse_kind(text: &str) -> Result<FieldKind> {
    let (head, arg) = match text.split_once(':') {
        Some((head, arg)) => (head, Some(arg)),
        None => (text, None),
    };
    let kind = match (head.to_ascii_lowercase().as_str(), arg) {
        ("text", None) => FieldKind::text(),
        ("integer", None) => FieldKind::Integer,
        ("number", None) => FieldKind::Number,
        ("boolean", None) => FieldKind::Boolean,
        ("email", None) => FieldKind::Email,
        ("uri", None) => FieldKind::uri(),
        ("date", None) => FieldKind::Date,
        ("month-day", None) => FieldKind::MonthDay,
        ("increment", None) => FieldKind::increment(),
        ("array", None) => FieldKind::array(),
        ("schema", None) => FieldKind::SchemaRef,
        ("ref", Some(id)) => FieldKind::reference(
            Uuid::parse_str(id).with_context(|| format!("Invalid schema id '{}'", id))?,
        ),
        ("enum", Some(values)) => FieldKind::enumeration(values.split('|').map(str::trim)),
        ("calculated", Some(formula)) => FieldKind::calculated(formula),
        _ => bail!("Unknown field kind '{}'", text),
    };
    Ok(kind)
}

async fn show(workspace: &Workspace, id: Uuid) -> Result<()> {
    let thing = workspace.load_thing(id).await?;
    println!("{} ({})", thing.name(), thing.id());
    for property in workspace.enumerate(&thing).await? {
        println!(
            "  {} = {}{}",
            property.full_display_name,
            property.value,
            if property.valid { "" } else { "  (invalid)" }
        );
    }
    for unset in workspace.unset_properties(&thing).await? {
        println!(
            "  {} is unset{}",
            unset.full_display_name,
            if unset.field.required { " (required)" } else { "" }
        );
    }
    Ok(())
}

async fn set(workspace: &Workspace, id: Uuid, name: &str, value: &str) -> Result<()> {
    let mut thing = workspace.load_thing(id).await?;
    let result = workspace
        .set(&mut thing, name, Value::from(value), None)
        .await?;
    println!("{}", result);
    if !result.success {
        return Err(anyhow!("Set failed"));
    }
    if thing.is_dirty() {
        workspace
            .save_thing(&mut thing)
            .await
            .context("Failed to save thing")?;
    }
    Ok(())
}

async fn recompute(workspace: &Workspace, id: Uuid) -> Result<()> {
    let mut thing = workspace.load_thing(id).await?;
    let result = workspace.recompute_calculated(&mut thing).await?;
    println!("{}", result);
    Ok(())
}

async fn describe_schema(workspace: &Workspace, id: Uuid, verbose: bool) -> Result<()> {
    let schema = workspace.load_schema(id).await?;
    println!("{} ({})", schema.name(), schema.id());
    if let Some(description) = schema.description() {
        println!("  {}", description);
    }
    for line in schema.describe_fields(verbose) {
        println!("  {}", line);
    }
    Ok(())
}

async fn create_schema(workspace: &Workspace, name: &str, plural: Option<String>) -> Result<()> {
    let mut schema = Schema::new(name)?;
    schema.set_plural(plural);
    workspace.save_schema(&schema).await?;
    println!("{}", schema.id());
    Ok(())
}

async fn add_field(
    workspace: &Workspace,
    id: Uuid,
    name: &str,
    kind: &str,
    required: bool,
) -> Result<()> {
    let mut schema = workspace.load_schema(id).await?;
    let mut field = FieldDefinition::new(name, parse_kind(kind)?);
    field.required = required;
    schema.add_field(field)?;
    workspace.save_schema(&schema).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::from_env().context("Invalid THINGDB_* environment")?;
    if let Some(dir) = cli.data_dir {
        config = config.data_dir(dir);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // never prompts
    let workspace = Workspace::open(config.interactive(false))
        .await
        .context("Failed to open workspace")?;

    match cli.command {
        Command::Show { thing } => show(&workspace, thing).await,
        Command::Set { thing, name, value } => set(&workspace, thing, &name, &value).await,
        Command::Recompute { thing } => recompute(&workspace, thing).await,
        Command::DescribeSchema { schema, verbose } => {
            describe_schema(&workspace, schema, verbose).await
        }
        Command::CreateSchema { name, plural } => create_schema(&workspace, &name, plural).await,
        Command::AddField {
            schema,
            name,
            kind,
            required,
        } => add_field(&workspace, schema, &name, &kind, required).await,
        Command::CreateThing { name, schemas } => {
            let thing = workspace.create_thing(&name, &schemas).await?;
            println!("{}", thing.id());
            Ok(())
        }
    }
}
