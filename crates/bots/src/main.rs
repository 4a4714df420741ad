//! Remediation bots CLI
//!
//! Polls ServiceNow for incidents matching each enabled workflow and drives
//! them through reachability checks, remediation and ticket updates. The
//! offline subcommands parse descriptions, preview payloads and validate a
//! workflow catalog.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use remediation::actions::{self, reachable_statuses};
use remediation::{IncidentParser, PayloadFormatter, WorkflowCatalog};
use remediation_bots::settings::{ServiceNowArgs, TransportArgs};
use remediation_bots::{Poller, ProcessTransport, ServiceNowGateway};

/// Automated incident remediation for ServiceNow
#[derive(Parser)]
#[command(name = "remediation-bots")]
#[command(about = "Automated incident remediation for ServiceNow")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workflow catalog (YAML or JSON)
    #[arg(
        long,
        env = "REMEDIATION_CONFIG",
        default_value = "config/workflows.yaml",
        global = true
    )]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll ServiceNow and remediate matching incidents
    Poll {
        /// Run a single sweep and exit
        #[arg(long)]
        once: bool,

        /// Seconds between sweeps
        #[arg(long, env = "REMEDIATION_POLL_INTERVAL", default_value = "300")]
        interval: u64,

        /// Restrict polling to these workflows (repeatable or comma separated)
        #[arg(long = "workflow", env = "REMEDIATION_WORKFLOWS", value_delimiter = ',')]
        workflows: Vec<String>,

        #[command(flatten)]
        servicenow: ServiceNowArgs,

        #[command(flatten)]
        transport: TransportArgs,
    },
    /// Parse an incident description and print the device configuration
    Parse {
        /// Description text (reads --file when omitted)
        text: Option<String>,

        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Render the payload a workflow would send for a status
    Render {
        #[arg(long)]
        workflow: String,

        #[arg(long)]
        status: String,

        /// Description text used to build the device configuration
        #[arg(long)]
        description: Option<String>,

        /// Read the description from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Measured usage to substitute for TOTAL_USAGE
        #[arg(long)]
        usage: Option<String>,

        /// Failure label to substitute for FAILURE_TYPE
        #[arg(long)]
        failure_type: Option<String>,
    },
    /// Check the catalog for unknown actions and missing templates
    Validate,
}

fn init_logging(format: LogFormat, verbose: bool) {
    let default = if verbose {
        "remediation=debug,remediation_bots=debug"
    } else {
        "remediation=info,remediation_bots=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so command output on stdout stays machine readable
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn load_catalog(path: &Path) -> Result<Arc<WorkflowCatalog>> {
    let catalog = WorkflowCatalog::load_from(path)
        .with_context(|| format!("Failed to load workflow catalog from {}", path.display()))?;
    Ok(Arc::new(catalog))
}

fn read_description(text: Option<String>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => Ok(String::new()),
    }
}

fn parser_for(catalog: &WorkflowCatalog) -> IncidentParser {
    catalog
        .cluster_markers()
        .map(IncidentParser::new)
        .unwrap_or_default()
}

async fn poll(
    catalog: Arc<WorkflowCatalog>,
    once: bool,
    interval: u64,
    workflows: &[String],
    servicenow: &ServiceNowArgs,
    transport: &TransportArgs,
) -> Result<()> {
    let (username, password) = servicenow.credentials()?;
    let gateway = ServiceNowGateway::new(
        servicenow.resolved_base_url()?,
        username,
        password,
        servicenow.timeout(),
    )?;
    let transport = ProcessTransport::new(transport);

    let poller = Poller::new(catalog, Arc::new(transport), Arc::new(gateway), workflows)?;
    if poller.workflow_names().is_empty() {
        bail!("No runnable workflows selected");
    }
    info!(workflows = ?poller.workflow_names(), "Starting poller");

    if once {
        let summary = poller.sweep().await;
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "workflows": summary.workflows,
            "incidents": summary.incidents,
            "resolved": summary.resolved,
            "escalated": summary.escalated,
            "aborted": summary.aborted,
            "searchFailures": summary.search_failures,
        }))?);
        return Ok(());
    }

    poller
        .run_until(Duration::from_secs(interval.max(1)), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;
    Ok(())
}

fn render(
    catalog: Arc<WorkflowCatalog>,
    workflow: &str,
    status: &str,
    description: &str,
    usage: Option<String>,
    failure_type: Option<String>,
) -> Result<()> {
    let mut config = parser_for(&catalog).parse(description);
    catalog.resolver_table()?.apply(&mut config);
    if usage.is_some() {
        config.total_usage = usage;
    }
    if failure_type.is_some() {
        config.failure_type = failure_type;
    }

    let formatter = PayloadFormatter::new(catalog);
    match formatter.resolve(workflow, status, &config, None)? {
        Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
        None => bail!("No template for {workflow}/{status}"),
    }
    Ok(())
}

/// Report catalog problems; returns the number of problems found
fn validate(catalog: &WorkflowCatalog) -> usize {
    println!(
        "{}",
        format!("Catalog version {}", catalog.version).cyan().bold()
    );

    let mut problems = 0;
    for (name, def) in &catalog.workflows {
        let action_name = def.action_name(name);
        let state = if def.enabled { "enabled" } else { "disabled" };

        let Some(action) = actions::builtin(action_name) else {
            problems += 1;
            println!(
                "{} {name} ({state}): unknown action '{action_name}' (known: {})",
                "✗".red(),
                actions::BUILTIN_ACTIONS.join(", ")
            );
            continue;
        };

        let statuses: Vec<&str> = reachable_statuses(action.as_ref());
        let missing = catalog.missing_templates([(name.as_str(), &statuses[..])]);
        if def.combined_filter().is_none() {
            println!("{} {name} ({state}): no search filters", "!".yellow());
        }
        if missing.is_empty() {
            println!(
                "{} {name} ({state}): {} statuses covered",
                "✓".green(),
                statuses.len()
            );
        } else {
            problems += missing.len();
            for entry in missing {
                println!("{} {entry}", "✗".red());
            }
        }
    }
    problems
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose);

    match cli.command {
        Commands::Poll {
            once,
            interval,
            workflows,
            servicenow,
            transport,
        } => {
            let catalog = load_catalog(&cli.config)?;
            poll(catalog, once, interval, &workflows, &servicenow, &transport).await?;
        }
        Commands::Parse { text, file } => {
            let description = read_description(text, file.as_deref())?;
            let parser = match WorkflowCatalog::load_from(&cli.config) {
                Ok(catalog) => parser_for(&catalog),
                Err(_) => IncidentParser::default(),
            };
            let config = parser.parse(&description);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Render {
            workflow,
            status,
            description,
            file,
            usage,
            failure_type,
        } => {
            let catalog = load_catalog(&cli.config)?;
            let description = read_description(description, file.as_deref())?;
            render(catalog, &workflow, &status, &description, usage, failure_type)?;
        }
        Commands::Validate => {
            let catalog = load_catalog(&cli.config)?;
            let problems = validate(&catalog);
            if problems > 0 {
                println!("{}", format!("{problems} problem(s) found").yellow());
            }
        }
    }

    Ok(())
}
