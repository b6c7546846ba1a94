//! LZ-016: CLI subcommands — init, validate, schema, plan, apply, status.

use crate::core::directory::StaticDirectory;
use crate::core::emitter::SimulatedEmitter;
use crate::core::error::Error;
use crate::core::events::{JsonlEventLog, MultiSink, TracingSink};
use crate::core::hasher::plan_fingerprint;
use crate::core::index::{is_account_id, ReferenceIndex};
use crate::core::params::FileParameterStore;
use crate::core::resolver::{self, Resolution};
use crate::core::schema::{json_schema, DocumentKind, SchemaRegistry};
use crate::core::types::{ChangeSet, Partition, PlanAction, ProvisioningPlan, ValidatedConfig};
use crate::core::{executor, parser, planner, state};
use clap::Subcommand;
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scaffold a landing zone configuration, directory snapshot and state dir
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate the configuration documents and, optionally, their references
    Validate {
        /// Directory holding the four configuration documents
        #[arg(short, long, env = "LZP_CONFIG_DIR", default_value = "config")]
        config_dir: PathBuf,

        /// Directory snapshot to resolve account, OU and resource names against
        #[arg(short, long, env = "LZP_DIRECTORY")]
        directory: Option<PathBuf>,
    },

    /// Print the JSON Schema of a configuration document
    Schema {
        /// Document kind
        #[arg(value_enum)]
        kind: DocumentKind,
    },

    /// Show the provisioning plan (declared vs recorded state)
    Plan {
        /// Directory holding the four configuration documents
        #[arg(short, long, env = "LZP_CONFIG_DIR", default_value = "config")]
        config_dir: PathBuf,

        /// Directory snapshot
        #[arg(short, long, env = "LZP_DIRECTORY", default_value = "directory.yaml")]
        directory: PathBuf,

        /// State directory
        #[arg(long, env = "LZP_STATE_DIR", default_value = "state")]
        state_dir: PathBuf,

        /// Target a single partition (ACCOUNT/REGION)
        #[arg(short, long)]
        partition: Option<String>,

        /// Print the resolved plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Emit the plan through the simulated emitter
    Apply {
        /// Directory holding the four configuration documents
        #[arg(short, long, env = "LZP_CONFIG_DIR", default_value = "config")]
        config_dir: PathBuf,

        /// Directory snapshot
        #[arg(short, long, env = "LZP_DIRECTORY", default_value = "directory.yaml")]
        directory: PathBuf,

        /// State directory
        #[arg(long, env = "LZP_STATE_DIR", default_value = "state")]
        state_dir: PathBuf,

        /// Target a single partition (ACCOUNT/REGION)
        #[arg(short, long)]
        partition: Option<String>,

        /// Re-emit nodes whose recorded state is unchanged
        #[arg(long)]
        force: bool,

        /// Make the emitter fail a node (ID or logical name); repeatable
        #[arg(long, value_name = "NODE")]
        fail: Vec<String>,
    },

    /// Show recorded state from partition lock files
    Status {
        /// State directory
        #[arg(long, env = "LZP_STATE_DIR", default_value = "state")]
        state_dir: PathBuf,

        /// Target a single partition (ACCOUNT/REGION)
        #[arg(short, long)]
        partition: Option<String>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate {
            config_dir,
            directory,
        } => cmd_validate(&config_dir, directory.as_deref()),
        Commands::Schema { kind } => cmd_schema(kind),
        Commands::Plan {
            config_dir,
            directory,
            state_dir,
            partition,
            json,
        } => cmd_plan(
            &config_dir,
            &directory,
            &state_dir,
            partition.as_deref(),
            json,
        ),
        Commands::Apply {
            config_dir,
            directory,
            state_dir,
            partition,
            force,
            fail,
        } => cmd_apply(
            &config_dir,
            &directory,
            &state_dir,
            partition.as_deref(),
            force,
            &fail,
        ),
        Commands::Status {
            state_dir,
            partition,
        } => cmd_status(&state_dir, partition.as_deref()),
    }
}

const GLOBAL_TEMPLATE: &str = r#"homeRegion: us-east-1
enabledRegions: [us-east-1, us-west-2]
logging:
  account: Log Archive
  cloudtrail:
    enable: true
    organizationTrail: true
policy:
  failure: stop_on_first
  parallelPartitions: false
  events: true
  lockFile: true
"#;

const ACCOUNTS_TEMPLATE: &str = r#"mandatoryAccounts:
  - name: Management
    email: management@example.com
    organizationalUnit: Root
  - name: Log Archive
    email: log-archive@example.com
    organizationalUnit: Security
workloadAccounts:
  - name: Network
    email: network@example.com
    organizationalUnit: Infrastructure
"#;

const ORGANIZATION_TEMPLATE: &str = r#"organizationalUnits:
  - name: Security
  - name: Infrastructure
"#;

const NETWORK_TEMPLATE: &str = r#"transitGateways:
  - name: Network-Main
    asn: 65521
    deploymentTargets:
      accounts: [Network]
      regions: [us-east-1]
    routeTables:
      - name: Network-Main-Core
      - name: Network-Main-Segregated
    shareTargets:
      organizationalUnits: [Infrastructure]
resourceShares: []
"#;

const DIRECTORY_TEMPLATE: &str = r#"accounts:
  management@example.com: "000000000000"
  log-archive@example.com: "111111111111"
  network@example.com: "222222222222"
organizationalUnits:
  Security:
    arn: arn:aws:organizations::000000000000:ou/o-example/ou-security
    accounts: ["111111111111"]
  Infrastructure:
    arn: arn:aws:organizations::000000000000:ou/o-example/ou-infrastructure
    accounts: ["222222222222"]
accountRegions: {}
resources: {}
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_dir = path.join("config");
    let marker = config_dir.join(DocumentKind::Global.file_name());
    if marker.exists() {
        return Err(format!("{} already exists", marker.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&config_dir)
        .map_err(|e| format!("cannot create {}: {}", config_dir.display(), e))?;
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    let files = [
        (config_dir.join(DocumentKind::Global.file_name()), GLOBAL_TEMPLATE),
        (config_dir.join(DocumentKind::Accounts.file_name()), ACCOUNTS_TEMPLATE),
        (
            config_dir.join(DocumentKind::Organization.file_name()),
            ORGANIZATION_TEMPLATE,
        ),
        (config_dir.join(DocumentKind::Network.file_name()), NETWORK_TEMPLATE),
        (path.join("directory.yaml"), DIRECTORY_TEMPLATE),
    ];
    println!("Initialized landing zone at {}", path.display());
    for (file, content) in &files {
        std::fs::write(file, content)
            .map_err(|e| format!("cannot write {}: {}", file.display(), e))?;
        println!("  Created: {}", file.display());
    }
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

/// Print each error and return the summary line.
fn report<E: Display>(errors: &[E], summary: Error) -> String {
    for e in errors {
        eprintln!("  ERROR: {}", e);
    }
    summary.to_string()
}

fn load_validated(config_dir: &Path) -> Result<ValidatedConfig, String> {
    parser::load_config_dir(config_dir, &SchemaRegistry::v1()).map_err(|errors| {
        let shown: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        report(&shown, Error::Config(errors))
    })
}

fn load_directory(path: &Path) -> Result<StaticDirectory, String> {
    StaticDirectory::load(path).map_err(|e| Error::from(e).to_string())
}

fn cmd_validate(config_dir: &Path, directory: Option<&Path>) -> Result<(), String> {
    let config = load_validated(config_dir)?;

    if let Some(path) = directory {
        let directory = load_directory(path)?;
        if let Err(errors) = ReferenceIndex::build(&config, &directory) {
            let shown: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(report(&shown, Error::Resolution(errors)));
        }
    }

    println!(
        "OK: {} ({} accounts, {} transit gateways, {} resource shares)",
        config_dir.display(),
        config.accounts.all().count(),
        config.network.transit_gateways.len(),
        config.network.resource_shares.len()
    );
    Ok(())
}

fn cmd_schema(kind: DocumentKind) -> Result<(), String> {
    let schema = serde_json::to_string_pretty(&json_schema(kind)).map_err(|e| e.to_string())?;
    println!("{}", schema);
    Ok(())
}

/// Parse `ACCOUNT/REGION`.
fn parse_partition(value: &str) -> Result<Partition, String> {
    let invalid = |reason: String| Error::Usage(format!("invalid partition '{}': {}", value, reason)).to_string();
    let Some((account, region)) = value.split_once('/') else {
        return Err(invalid("expected ACCOUNT/REGION".to_string()));
    };
    if !is_account_id(account) {
        return Err(invalid(format!("'{}' is not an account ID", account)));
    }
    if region.is_empty() || region.contains('/') {
        return Err(invalid(format!("'{}' is not a region", region)));
    }
    Ok(Partition::new(account, region))
}

/// Load, index and resolve. Unresolvable parts are reported and left out.
fn load_plan(
    config_dir: &Path,
    directory: &Path,
) -> Result<(ValidatedConfig, ReferenceIndex, Resolution), String> {
    let config = load_validated(config_dir)?;
    let directory = load_directory(directory)?;
    let (index, unresolved) = ReferenceIndex::build_partial(&config, &directory);
    for e in &unresolved {
        eprintln!("  UNRESOLVED: {}", e);
    }
    let resolution = resolver::resolve_partial(&config, &index);
    for e in &resolution.errors {
        eprintln!("  EXCLUDED: {}", e);
    }
    Ok((config, index, resolution))
}

fn excluded(resolution: &Resolution) -> Result<(), String> {
    if resolution.errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Plan(resolution.errors.clone()).to_string())
    }
}

fn cmd_plan(
    config_dir: &Path,
    directory: &Path,
    state_dir: &Path,
    partition: Option<&str>,
    json: bool,
) -> Result<(), String> {
    let filter = partition.map(parse_partition).transpose()?;
    let (_, _, resolution) = load_plan(config_dir, directory)?;

    let mut plan = resolution.plan.clone();
    if let Some(filter) = &filter {
        plan.partitions.retain(|p| &p.partition == filter);
    }

    if json {
        let out = serde_json::to_string_pretty(&plan).map_err(|e| e.to_string())?;
        println!("{}", out);
    } else {
        let locks = state::load_locks(state_dir, plan.partitions.iter().map(|p| &p.partition))
            .map_err(|e| e.to_string())?;
        let changes = planner::plan(&plan, &locks);
        print_plan(&plan, &changes);
    }
    excluded(&resolution)
}

/// Display a change set to stdout.
fn print_plan(plan: &ProvisioningPlan, changes: &ChangeSet) {
    println!(
        "Planning: {} node(s) in {} partition(s)",
        plan.node_count(),
        plan.partitions.len()
    );
    println!();

    let mut current: Option<&Partition> = None;
    for change in &changes.changes {
        if current != Some(&change.partition) {
            current = Some(&change.partition);
            println!("{}:", change.partition);
        }
        let symbol = match change.action {
            PlanAction::Create => "+",
            PlanAction::Update => "~",
            PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!(
        "Plan: {} to create, {} to update, {} unchanged.",
        changes.to_create, changes.to_update, changes.unchanged
    );
    println!("Fingerprint: {}", plan_fingerprint(plan));
}

fn cmd_apply(
    config_dir: &Path,
    directory: &Path,
    state_dir: &Path,
    partition: Option<&str>,
    force: bool,
    fail: &[String],
) -> Result<(), String> {
    let filter = partition.map(parse_partition).transpose()?;
    let (config, mut index, resolution) = load_plan(config_dir, directory)?;
    let policy = &config.global.policy;

    let emitter = SimulatedEmitter::failing(fail.iter().cloned());
    let mut sinks = MultiSink::new().with(TracingSink);
    if policy.events {
        sinks = sinks.with(JsonlEventLog::new(state_dir));
    }
    let mut parameters = FileParameterStore::new(state_dir);

    let cfg = executor::EmitConfig {
        plan: &resolution.plan,
        emitter: &emitter,
        events: &sinks,
        state_dir,
        policy,
        force,
        partition_filter: filter.as_ref(),
    };
    let results = executor::emit(&cfg, &mut index, &mut parameters)
        .map_err(|e| Error::from(e).to_string())?;

    let mut total_succeeded = 0;
    let mut total_unchanged = 0;
    let mut total_failed = 0;
    let mut total_skipped = 0;

    for result in &results {
        println!(
            "{}: {} emitted, {} unchanged, {} failed, {} skipped ({:.1}s)",
            result.partition,
            result.succeeded,
            result.unchanged,
            result.failed,
            result.skipped,
            result.total_duration.as_secs_f64()
        );
        total_succeeded += result.succeeded;
        total_unchanged += result.unchanged;
        total_failed += result.failed;
        total_skipped += result.skipped;
    }

    println!();
    if total_failed > 0 {
        println!(
            "Apply completed with errors: {} emitted, {} unchanged, {} FAILED, {} skipped",
            total_succeeded, total_unchanged, total_failed, total_skipped
        );
        return Err(Error::Emission(total_failed).to_string());
    }

    println!(
        "Apply complete: {} emitted, {} unchanged.",
        total_succeeded, total_unchanged
    );
    excluded(&resolution)
}

fn cmd_status(state_dir: &Path, partition: Option<&str>) -> Result<(), String> {
    let filter = partition.map(parse_partition).transpose()?;
    let locks = state::list_locks(state_dir).map_err(|e| e.to_string())?;

    let mut found = false;
    for lock in locks
        .iter()
        .filter(|l| filter.as_ref().is_none_or(|f| &l.partition() == f))
    {
        found = true;
        println!("Partition: {}", lock.partition());
        println!("  Generated: {}", lock.generated_at);
        println!("  Generator: {}", lock.generator);
        println!("  Nodes: {}", lock.nodes.len());

        for (id, node) in &lock.nodes {
            let duration = node
                .duration_seconds
                .map(|d| format!(" ({:.2}s)", d))
                .unwrap_or_default();
            let resolved = node.resolved_id.as_deref().unwrap_or("-");
            println!(
                "    {}: {} [{}] {}{}",
                id, node.status, node.kind, resolved, duration
            );
        }
        println!();
    }

    if !found {
        println!("No state found. Run `lzp apply` first.");
    }
    Ok(())
}
