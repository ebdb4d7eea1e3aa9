// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "templify")]
#[command(about = "Publish disk images as Exoscale compute templates")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (default: templify.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter templify.yml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Upload an image and publish it as a template in every zone
    Publish {
        /// Image file produced by the build
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Id of the producer that built the image
        #[arg(long, default_value = "packer.file")]
        builder_id: String,

        /// Write the published templates to this JSON file
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Run against in-memory backends; nothing leaves this machine
        #[arg(long)]
        dry_run: bool,

        /// Ask for confirmation after each step
        #[arg(long)]
        debug: bool,
    },

    /// Delete the templates recorded in a manifest
    Destroy {
        /// Manifest written by `publish --manifest`
        #[arg(short, long)]
        manifest: PathBuf,

        /// List the templates without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}
