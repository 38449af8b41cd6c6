use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use dataset_registry::config::{self, RegistryConfig};
use dataset_registry::profiling::{DatasetStatistics, ProfileOptions, ScoreSet, profile_file};
use dataset_registry::registry::{
    AccessLevel, DEFAULT_SUMMARY_LIMIT, DatasetRegistry, DatasetStatus, DatasetUpdate,
    DiffOptions, ExportOptions, FieldFilter, FieldValue, FilterOperator, ImportOptions,
    ListFilter, MetricsDocument, NewDataset, SearchQuery, SortField, SortOrder,
};
use dataset_registry::utils::{fmt_opt, fmt_ratio};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dsreg", about = "Dataset registry: versions, statistics and access control")]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true, env = "DSREG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registry root; overrides the storage and state locations of the config
    #[arg(long, global = true, env = "DSREG_ROOT")]
    pub root: Option<PathBuf>,

    /// Username to act as
    #[arg(short, long, global = true, env = "DSREG_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn load_config(&self) -> Result<RegistryConfig> {
        let path = self.config.clone().unwrap_or_else(config::get_config_path);
        let mut config = config::load_config(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        if let Some(root) = &self.root {
            let rooted = RegistryConfig::rooted_at(root);
            config.storage_root = rooted.storage_root;
            config.state_file = rooted.state_file;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Profile an NDJSON file without registering it
    Profile {
        file: PathBuf,

        /// Number of most common values kept per categorical column
        #[arg(long)]
        top: Option<usize>,

        /// Print a readable summary instead of JSON
        #[arg(long)]
        summary: bool,
    },
    #[command(flatten)]
    Registry(RegistryCommand),
}

/// Commands that open the registry
#[derive(Subcommand)]
pub enum RegistryCommand {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Manage groups
    #[command(subcommand)]
    Group(GroupCommand),
    /// Manage datasets, their metadata and grants
    #[command(subcommand)]
    Dataset(DatasetCommand),
    /// Manage versions of a dataset
    #[command(subcommand)]
    Version(VersionCommand),
    /// Statistics and quality metrics of a version
    Stats {
        dataset: String,

        /// Version label; latest when omitted
        #[arg(long)]
        version: Option<String>,

        /// Ignore cached results
        #[arg(long)]
        recalculate: bool,

        /// Print a readable summary instead of JSON
        #[arg(long)]
        summary: bool,
    },
    /// Compare two versions of a dataset
    Compare {
        dataset: String,
        version1: String,
        version2: String,

        #[arg(long)]
        no_metadata: bool,

        #[arg(long)]
        no_metrics: bool,
    },
    /// Export a dataset to a .tar.gz archive
    Export {
        dataset: String,
        output: PathBuf,

        #[arg(long)]
        no_versions: bool,

        #[arg(long)]
        no_metrics: bool,
    },
    /// Import a dataset archive
    Import {
        archive: PathBuf,

        /// Name of the new dataset; defaults to the archived name
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },
    /// Search visible datasets
    Search(SearchArgs),
    /// Tag usage across visible datasets
    Tags {
        #[arg(long)]
        prefix: Option<String>,

        #[arg(long, default_value_t = DEFAULT_SUMMARY_LIMIT)]
        limit: usize,
    },
    /// Custom field usage across visible datasets
    Fields {
        #[arg(long)]
        prefix: Option<String>,

        #[arg(long, default_value_t = DEFAULT_SUMMARY_LIMIT)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Register a user
    Add {
        username: String,

        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum GroupCommand {
    /// Create a group
    Create {
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Initial members (usernames)
        #[arg(long = "member")]
        members: Vec<String>,
    },
    /// Add users to a group
    Add { group: String, users: Vec<String> },
    /// Remove users from a group
    Remove { group: String, users: Vec<String> },
    /// List members of a group
    Members { group: String },
}

#[derive(Subcommand)]
pub enum DatasetCommand {
    /// Create a dataset
    Create {
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// JSON schema file describing the expected columns
        #[arg(long)]
        schema: Option<PathBuf>,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Show a dataset with its metadata
    Show { name: String },
    /// List visible datasets
    List {
        #[arg(long)]
        status: Option<DatasetStatus>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Only datasets where the user holds at least this level
        #[arg(long)]
        level: Option<AccessLevel>,
    },
    /// Update description, status or tags
    Update {
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        status: Option<DatasetStatus>,

        /// Replaces all tags when given
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// Set a custom metadata field; the value is parsed as JSON, else taken as text
    SetField {
        name: String,
        key: String,
        value: String,
    },
    /// Remove a custom metadata field
    UnsetField { name: String, key: String },
    /// Delete a dataset and all its versions
    Delete { name: String },
    /// Grant a group access
    Grant {
        name: String,
        group: String,
        level: AccessLevel,
    },
    /// Revoke a group's access
    Revoke { name: String, group: String },
    /// List grants on a dataset
    Access { name: String },
}

#[derive(Subcommand)]
pub enum VersionCommand {
    /// Add a version from a file
    Add {
        dataset: String,
        label: String,
        file: PathBuf,

        /// JSON file with quality metrics to cache on the version
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Versions in creation order
    History {
        dataset: String,

        #[arg(long)]
        metadata: bool,

        #[arg(long)]
        metrics: bool,
    },
    /// Record a validation check for a version
    Validate {
        dataset: String,
        label: String,
        metric_type: String,

        /// Reported metric, as name=value
        #[arg(long = "value", value_parser = parse_metric)]
        values: Vec<(String, f64)>,

        /// Minimum acceptable value, as name=value
        #[arg(long = "threshold", value_parser = parse_metric)]
        thresholds: Vec<(String, f64)>,
    },
    /// Validation records of a dataset, newest first
    Validations {
        dataset: String,

        #[arg(long)]
        metric_type: Option<String>,
    },
}

#[derive(Args)]
pub struct SearchArgs {
    /// Substring of name or description, case-insensitive
    #[arg(long)]
    text: Option<String>,

    #[arg(long = "tag")]
    tags: Vec<String>,

    #[arg(long)]
    status: Option<DatasetStatus>,

    /// Custom field condition, as field:op:value with op one of eq, gt, lt, contains, in
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<FieldFilter>,

    #[arg(long)]
    sort: Option<SortField>,

    #[arg(long, default_value = "desc")]
    order: SortOrder,

    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Defaults to the configured page size
    #[arg(long)]
    per_page: Option<usize>,
}

fn parse_metric(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let value = value
        .parse::<f64>()
        .map_err(|e| format!("invalid number '{value}': {e}"))?;
    Ok((name.to_owned(), value))
}

fn parse_field_value(s: &str) -> FieldValue {
    serde_json::from_str(s).unwrap_or_else(|_| FieldValue::Text(s.to_owned()))
}

fn parse_filter(s: &str) -> Result<FieldFilter, String> {
    let mut parts = s.splitn(3, ':');
    let (Some(field), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected field:op:value, got '{s}'"));
    };
    let operator: FilterOperator = op.parse().map_err(|e| format!("{e}"))?;
    Ok(FieldFilter::new(field, operator, parse_field_value(value)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary(statistics: &DatasetStatistics, completeness: &ScoreSet, uniqueness: &ScoreSet) {
    println!(
        "{} rows, {} columns, {} missing cells",
        statistics.row_count,
        statistics.column_count,
        statistics.total_missing()
    );
    println!(
        "completeness {}, uniqueness {}",
        fmt_ratio(completeness.overall),
        fmt_ratio(uniqueness.overall)
    );
    for (column, kind) in &statistics.data_types {
        if let Some(n) = statistics.numeric_statistics.get(column) {
            println!(
                "  {column} ({}): mean {} std {} min {} median {} max {}",
                kind.as_str(),
                fmt_opt(n.mean),
                fmt_opt(n.std),
                fmt_opt(n.min),
                fmt_opt(n.median),
                fmt_opt(n.max)
            );
        } else if let Some(c) = statistics.categorical_statistics.get(column) {
            let top: Vec<String> = c
                .most_common
                .iter()
                .map(|v| format!("{} ({})", v.value, v.count))
                .collect();
            println!(
                "  {column} ({}): {} distinct, missing {}, top {}",
                kind.as_str(),
                c.unique_count,
                fmt_ratio(c.missing_ratio),
                top.join(", ")
            );
        }
    }
}

struct Session {
    registry: DatasetRegistry,
    user: Option<String>,
}

impl Session {
    fn user_id(&self) -> Result<Uuid> {
        let name = self
            .user
            .as_deref()
            .context("This command needs --user (or DSREG_USER)")?;
        Ok(self.registry.find_user(name)?.id)
    }

    fn dataset_id(&self, name: &str, user: &Uuid) -> Result<Uuid> {
        Ok(self.registry.find_dataset(name, user)?.id)
    }

    fn user_ids(&self, names: &[String]) -> Result<Vec<Uuid>> {
        names
            .iter()
            .map(|n| Ok(self.registry.find_user(n)?.id))
            .collect()
    }
}

pub fn run_command(cli: Cli, config: RegistryConfig) -> Result<()> {
    match cli.command {
        Commands::Profile { file, top, summary } => {
            let options = ProfileOptions {
                top_values: top.unwrap_or(config.profiling.top_values),
            };
            let profile = profile_file(&file, &options)?;
            if summary {
                print_summary(
                    &profile.statistics,
                    &profile.quality_metrics.completeness,
                    &profile.quality_metrics.uniqueness,
                );
                return Ok(());
            }
            print_json(&profile)
        }
        Commands::Registry(command) => {
            let default_per_page = config.search.default_per_page;
            let session = Session {
                registry: DatasetRegistry::open(config)?,
                user: cli.user,
            };
            handle_registry(&session, command, default_per_page)
        }
    }
}

fn handle_registry(session: &Session, command: RegistryCommand, default_per_page: usize) -> Result<()> {
    match command {
        RegistryCommand::User(command) => handle_user(session, command),
        RegistryCommand::Group(command) => handle_group(session, command),
        RegistryCommand::Dataset(command) => handle_dataset(session, command),
        RegistryCommand::Version(command) => handle_version(session, command),
        RegistryCommand::Stats {
            dataset,
            version,
            recalculate,
            summary,
        } => {
            let user = session.user_id()?;
            let id = session.dataset_id(&dataset, &user)?;
            let report = session
                .registry
                .get_statistics(&id, version.as_deref(), recalculate, &user)?;
            match report.quality_metrics.scores() {
                Some(scores) if summary => {
                    println!("version {}", report.version);
                    print_summary(&report.statistics, &scores.completeness, &scores.uniqueness);
                    Ok(())
                }
                _ => print_json(&report),
            }
        }
        RegistryCommand::Compare {
            dataset,
            version1,
            version2,
            no_metadata,
            no_metrics,
        } => {
            let user = session.user_id()?;
            let id = session.dataset_id(&dataset, &user)?;
            let options = DiffOptions {
                include_metadata: !no_metadata,
                include_metrics: !no_metrics,
            };
            let diff = session
                .registry
                .compare_versions(&id, &version1, &version2, options, &user)?;
            if !diff.has_changes() {
                tracing::info!("Versions '{version1}' and '{version2}' are identical");
            }
            print_json(&diff)
        }
        RegistryCommand::Export {
            dataset,
            output,
            no_versions,
            no_metrics,
        } => {
            let user = session.user_id()?;
            let id = session.dataset_id(&dataset, &user)?;
            let options = ExportOptions {
                include_versions: !no_versions,
                include_metrics: !no_metrics,
            };
            let path = session.registry.export_dataset(&id, &output, options, &user)?;
            println!("{}", path.display());
            Ok(())
        }
        RegistryCommand::Import {
            archive,
            name,
            description,
        } => {
            let user = session.user_id()?;
            let imported = session
                .registry
                .import_dataset(&archive, &user, ImportOptions { name, description })?;
            print_json(&imported.dataset)
        }
        RegistryCommand::Search(args) => {
            let user = session.user_id()?;
            let query = SearchQuery {
                text: args.text,
                tags: args.tags,
                status: args.status,
                field_filters: args.filters,
                sort_by: args.sort,
                sort_order: args.order,
                page: args.page,
                per_page: args.per_page.unwrap_or(default_per_page),
                ..SearchQuery::default()
            };
            print_json(&session.registry.search(&user, &query)?)
        }
        RegistryCommand::Tags { prefix, limit } => {
            let user = session.user_id()?;
            print_json(&session.registry.tag_summary(&user, prefix.as_deref(), limit)?)
        }
        RegistryCommand::Fields { prefix, limit } => {
            let user = session.user_id()?;
            print_json(&session.registry.field_summary(&user, prefix.as_deref(), limit)?)
        }
    }
}

fn handle_user(session: &Session, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add { username, email } => {
            print_json(&session.registry.register_user(&username, email)?)
        }
    }
}

fn handle_group(session: &Session, command: GroupCommand) -> Result<()> {
    let user = session.user_id()?;
    match command {
        GroupCommand::Create {
            name,
            description,
            members,
        } => {
            let members = session.user_ids(&members)?;
            print_json(&session.registry.create_group(&name, &description, &user, &members)?)
        }
        GroupCommand::Add { group, users } => {
            let group = session.registry.find_group(&group)?;
            let users = session.user_ids(&users)?;
            print_json(&session.registry.add_users_to_group(&group.id, &users)?)
        }
        GroupCommand::Remove { group, users } => {
            let group = session.registry.find_group(&group)?;
            let users = session.user_ids(&users)?;
            print_json(&session.registry.remove_users_from_group(&group.id, &users)?)
        }
        GroupCommand::Members { group } => {
            let group = session.registry.find_group(&group)?;
            print_json(&session.registry.group_members(&group.id)?)
        }
    }
}

fn handle_dataset(session: &Session, command: DatasetCommand) -> Result<()> {
    let user = session.user_id()?;
    let registry = &session.registry;
    match command {
        DatasetCommand::Create {
            name,
            description,
            schema,
            tags,
        } => {
            let mut new = NewDataset::new(name).description(description);
            new.tags = tags;
            if let Some(path) = schema {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read schema {}", path.display()))?;
                new = new.schema(serde_json::from_str(&text).context("Schema is not valid JSON")?);
            }
            print_json(&registry.create_dataset(new, &user)?)
        }
        DatasetCommand::Show { name } => print_json(&registry.find_dataset(&name, &user)?),
        DatasetCommand::List {
            status,
            tags,
            level,
        } => {
            let filter = ListFilter {
                status,
                tags,
                level,
            };
            print_json(&registry.list_datasets(&user, &filter)?)
        }
        DatasetCommand::Update {
            name,
            description,
            status,
            tags,
        } => {
            let id = session.dataset_id(&name, &user)?;
            let update = DatasetUpdate {
                description,
                status,
                tags,
            };
            print_json(&registry.update_dataset(&id, &user, update)?)
        }
        DatasetCommand::SetField { name, key, value } => {
            let id = session.dataset_id(&name, &user)?;
            print_json(&registry.set_custom_field(&id, &user, &key, parse_field_value(&value))?)
        }
        DatasetCommand::UnsetField { name, key } => {
            let id = session.dataset_id(&name, &user)?;
            print_json(&registry.remove_custom_field(&id, &user, &key)?)
        }
        DatasetCommand::Delete { name } => {
            let id = session.dataset_id(&name, &user)?;
            registry.delete_dataset(&id, &user)?;
            println!("deleted {name}");
            Ok(())
        }
        DatasetCommand::Grant { name, group, level } => {
            let id = session.dataset_id(&name, &user)?;
            let group = registry.find_group(&group)?;
            print_json(&registry.grant_access(&id, &group.id, level, &user)?)
        }
        DatasetCommand::Revoke { name, group } => {
            let id = session.dataset_id(&name, &user)?;
            let group = registry.find_group(&group)?;
            let removed = registry.revoke_access(&id, &group.id, &user)?;
            println!("{}", if removed { "revoked" } else { "no grant" });
            Ok(())
        }
        DatasetCommand::Access { name } => {
            let id = session.dataset_id(&name, &user)?;
            print_json(&registry.access_list(&id, &user)?)
        }
    }
}

fn handle_version(session: &Session, command: VersionCommand) -> Result<()> {
    let user = session.user_id()?;
    let registry = &session.registry;
    match command {
        VersionCommand::Add {
            dataset,
            label,
            file,
            metrics,
        } => {
            let id = session.dataset_id(&dataset, &user)?;
            let metrics = metrics
                .map(|path| -> Result<MetricsDocument> {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read metrics {}", path.display()))?;
                    serde_json::from_str(&text).context("Metrics file must be a JSON object")
                })
                .transpose()?;
            print_json(&registry.add_version(&id, &label, &file, &user, metrics)?)
        }
        VersionCommand::History {
            dataset,
            metadata,
            metrics,
        } => {
            let id = session.dataset_id(&dataset, &user)?;
            print_json(&registry.version_history(&id, &user, metadata, metrics)?)
        }
        VersionCommand::Validate {
            dataset,
            label,
            metric_type,
            values,
            thresholds,
        } => {
            let found = registry.find_dataset(&dataset, &user)?;
            let version = found
                .version(&label)
                .with_context(|| format!("No version '{label}' in dataset '{dataset}'"))?;
            let values: BTreeMap<String, f64> = values.into_iter().collect();
            let threshold = (!thresholds.is_empty())
                .then(|| thresholds.into_iter().collect::<BTreeMap<String, f64>>());
            print_json(&registry.validate_version(&version.id, &metric_type, values, threshold, &user)?)
        }
        VersionCommand::Validations {
            dataset,
            metric_type,
        } => {
            let id = session.dataset_id(&dataset, &user)?;
            print_json(&registry.validation_history(&id, metric_type.as_deref(), &user)?)
        }
    }
}
