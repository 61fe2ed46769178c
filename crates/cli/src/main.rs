//! Application bridge CLI
//!
//! Translates application documents offline, inspects formulas and YAML
//! content, and publishes to the message bus.

mod bus;
mod commands;
mod document;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{inspect, messaging, translate};
use std::path::PathBuf;

/// Application bridge CLI
#[derive(Parser)]
#[command(name = "appctl")]
#[command(author, version, about = "CLI for the Application Bridge", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate an application document
    #[command(subcommand)]
    Translate(TranslateCommands),

    /// List the variables of a formula
    Formula {
        /// Formula, e.g. "mean(latency) / replicas"
        formula: String,
    },

    /// Inspect YAML application content
    #[command(subcommand)]
    Content(ContentCommands),

    /// Talk to the message bus
    #[command(subcommand)]
    Bus(BusCommands),
}

#[derive(Subcommand)]
pub enum TranslateCommands {
    /// Print the component descriptor
    Descriptor {
        /// Application document (JSON, or YAML by extension)
        file: PathBuf,
    },

    /// Print the metric model
    MetricModel {
        /// Application document (JSON, or YAML by extension)
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ContentCommands {
    /// List addressable keys
    Keys {
        /// YAML content file
        file: PathBuf,
    },

    /// List declared component names
    Components {
        /// YAML content file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum BusCommands {
    /// Publish the translated DSL of a document
    Publish {
        file: PathBuf,
        #[command(flatten)]
        bus: bus::BusArgs,
    },

    /// Validate the SLOs of a document
    Validate {
        file: PathBuf,
        #[command(flatten)]
        bus: bus::BusArgs,
    },

    /// Upsert a policy bundle
    Policies {
        /// JSON array of {name, policyItem, model}
        file: PathBuf,
        #[command(flatten)]
        bus: bus::BusArgs,
    },

    /// Request an undeploy
    Undeploy {
        /// Application uuid
        uuid: String,
        #[command(flatten)]
        bus: bus::BusArgs,
    },

    /// List node candidates
    NodeCandidates {
        #[command(flatten)]
        bus: bus::BusArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Translate(translate_cmd) => match translate_cmd {
            TranslateCommands::Descriptor { file } => translate::descriptor(&file, cli.format),
            TranslateCommands::MetricModel { file } => translate::metric_model_of(&file, cli.format),
        },
        Commands::Formula { formula } => inspect::formula_variables(&formula, cli.format),
        Commands::Content(content_cmd) => match content_cmd {
            ContentCommands::Keys { file } => inspect::keys(&file, cli.format),
            ContentCommands::Components { file } => inspect::components(&file, cli.format),
        },
        Commands::Bus(bus_cmd) => match bus_cmd {
            BusCommands::Publish { file, bus } => messaging::publish_dsl(&bus, &file).await,
            BusCommands::Validate { file, bus } => messaging::validate(&bus, &file, cli.format).await,
            BusCommands::Policies { file, bus } => messaging::policies(&bus, &file).await,
            BusCommands::Undeploy { uuid, bus } => {
                messaging::undeploy(&bus, &uuid, cli.format).await
            }
            BusCommands::NodeCandidates { bus } => {
                messaging::node_candidates(&bus, cli.format).await
            }
        },
    };

    if let Err(e) = &result {
        output::print_error(&format!("{:#}", e));
    }
    result
}
