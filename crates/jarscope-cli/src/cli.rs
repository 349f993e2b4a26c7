//! CLI argument definitions for jarscope.
//!
//! Uses `clap` derive macros to define the full command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "jarscope",
    version,
    about = "Inventory, version, and diff Java artifacts across a fleet",
    long_about = "jarscope collects JAR and class-file metadata from deployed services, \
                  decompiles the binaries, assigns stable version numbers to distinct \
                  contents, and answers which services run which version and what \
                  changed between two versions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Database path
    #[arg(long, global = true, env = "JARSCOPE_DB")]
    pub db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// The `--service`/`--all-services` selector shared by the batch stages.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectorArgs {
    /// Operate on a single registered service
    #[arg(long, conflicts_with = "all_services")]
    pub service: Option<String>,

    /// Operate on every registered service
    #[arg(long)]
    pub all_services: bool,

    /// Narrow to one environment
    #[arg(long)]
    pub environment: Option<String>,
}

/// Decompiler knobs shared by the two decompile stages.
#[derive(Args, Debug, Clone)]
pub struct DecompileArgs {
    /// Re-run even when output already exists
    #[arg(long)]
    pub force: bool,

    /// Also decompile third-party JARs
    #[arg(long)]
    pub third_party: bool,

    /// Worker pool width across services
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,

    /// Decompiler command template; {input} is the binary, {output} the
    /// directory to fill with .java files
    #[arg(
        long,
        env = "JARSCOPE_DECOMPILER",
        default_value = "java -jar cfr.jar --silent true --outputdir {output} {input}"
    )]
    pub decompiler: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync the service registry from a JSON config document
    RegisterServices {
        /// Services document to load
        #[arg(long, required_unless_present = "create_sample", conflicts_with = "create_sample")]
        config: Option<PathBuf>,

        /// Write a sample services document and exit
        #[arg(long)]
        create_sample: Option<PathBuf>,
    },

    /// List JAR metadata from the selected services
    CollectJars {
        #[command(flatten)]
        selector: SelectorArgs,
    },

    /// List loose class-file metadata from the selected services
    CollectClasses {
        #[command(flatten)]
        selector: SelectorArgs,
    },

    /// Fetch and decompile the selected services' JARs
    DecompileJars {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        decompile: DecompileArgs,
    },

    /// Fetch and decompile the selected services' loose classes
    DecompileClasses {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        decompile: DecompileArgs,
    },

    /// Walk decompile output and deduplicate sources into the store
    IngestSources {
        #[command(flatten)]
        selector: SelectorArgs,

        /// Only trees belonging to this JAR name
        #[arg(long)]
        jar_name: Option<String>,

        /// Only trees belonging to this class name
        #[arg(long)]
        class_name: Option<String>,

        /// Report planned writes without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Assign fleet-wide version numbers per artifact name
    AssignVersions {
        /// Only JAR names
        #[arg(long)]
        jars: bool,

        /// Only class names
        #[arg(long)]
        classes: bool,

        /// Narrow to one JAR name
        #[arg(long)]
        jar_name: Option<String>,

        /// Narrow to one class name
        #[arg(long)]
        class_name: Option<String>,
    },

    /// Delete source versions nothing references (dry run by default)
    SweepOrphans {
        /// Actually delete instead of reporting
        #[arg(long)]
        execute: bool,
    },

    /// Unified diff between two versions of an artifact
    Diff {
        /// Artifact kind: jar or class
        kind: String,
        /// Artifact name (jar file name or fully-qualified class name)
        name: String,
        /// Version to diff from
        from: i64,
        /// Version to diff to
        to: i64,

        /// Narrow to a single file
        #[arg(long)]
        file: Option<String>,

        /// Also list files identical on both sides
        #[arg(long)]
        include_unchanged: bool,
    },

    /// Show the assigned versions of an artifact name
    Versions {
        /// Artifact kind: jar or class
        kind: String,
        /// Artifact name
        name: String,
    },

    /// Substring search over artifact names
    Search {
        query: String,

        /// Restrict to one kind: jar or class
        #[arg(long)]
        kind: Option<String>,
    },

    /// List registered services
    Services,
}

pub fn parse() -> Cli {
    Cli::parse()
}
