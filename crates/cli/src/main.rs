use anyhow::Result;
use clap::{Parser, Subcommand};

use sample_worker::commands::*;

/// Worker that runs external analysis tools over stored samples.
///
/// This CLI is a thin wrapper around `sample-pipeline-core` (exposed in code as
/// `sample_pipeline_core`). All substantive logic lives in the library so it can
/// be tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "sample-worker",
    version,
    about = "Run external analyzers over stored samples",
    long_about = None
)]
struct Cli {
    /// Emit process logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new sample store at the given root.
    ///
    /// This will:
    /// - Create `.store`, `samples`, and `analyses` directories.
    /// - Write a `.store/storage.json` config file.
    /// - Create the sample database.
    InitStorage {
        /// Store root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional store name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show basic information about an existing sample store.
    StorageInfo {
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Create a case to group samples under.
    AddCase {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List all cases.
    ListCases {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Ingest a file as a sample of a case.
    ///
    /// The file is hashed with SHA-256 and stored once per digest.
    AddSample {
        #[arg(long, default_value = ".")]
        root: String,

        /// Guid of the owning case.
        #[arg(long = "case")]
        case_guid: String,

        /// Path to the file to ingest.
        #[arg(long)]
        path: String,

        /// Optional sample name. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// List samples, optionally for a single case.
    ListSamples {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long = "case")]
        case_guid: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the analyzers registered by a worker config.
    Analyzers {
        /// Worker config (YAML).
        #[arg(long)]
        config: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Run analyzers over every sample sharing a digest.
    ///
    /// Selected analyzers run concurrently. Ctrl-C cancels them and removes
    /// their workspaces. Exits non-zero if any analyzer failed.
    Analyze {
        /// Store root. Defaults to `storage_root` from the config, then the current directory.
        #[arg(long)]
        root: Option<String>,

        /// Worker config (YAML).
        #[arg(long)]
        config: String,

        /// SHA-256 digest of the sample to analyze.
        #[arg(long)]
        digest: String,

        /// Analyzer to run; repeat to run several. Defaults to every registered analyzer.
        #[arg(long = "analyzer")]
        analyzers: Vec<String>,
    },

    /// List recorded analyzer runs.
    ListRuns {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        digest: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        sample_pipeline_core::logging::init_tracing_json();
    } else {
        sample_pipeline_core::logging::init_tracing();
    }

    match cli.command {
        Command::InitStorage { root, name } => init_storage_command(&root, name)?,
        Command::StorageInfo { root, json } => storage_info_command(&root, json)?,
        Command::AddCase { root, name, description } => {
            add_case_command(&root, &name, description)?
        }
        Command::ListCases { root, json } => list_cases_command(&root, json)?,
        Command::AddSample { root, case_guid, path, name } => {
            add_sample_command(&root, &case_guid, &path, name)?
        }
        Command::ListSamples { root, case_guid, json } => {
            list_samples_command(&root, case_guid.as_deref(), json)?
        }
        Command::Analyzers { config, json } => analyzers_command(&config, json)?,
        Command::Analyze { root, config, digest, analyzers } => {
            analyze_command(root.as_deref(), &config, &digest, &analyzers).await?
        }
        Command::ListRuns { root, digest, json } => {
            list_runs_command(&root, digest.as_deref(), json)?
        }
    }

    Ok(())
}
