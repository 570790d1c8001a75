use clap::{Args, Parser, Subcommand};
use dubforge_core::{CapabilityKind, QualityTier};
use std::path::PathBuf;

use dubforge::app::TaskOptions;

#[derive(Parser)]
#[command(name = "dubforge")]
#[command(author, version, about = "Media dubbing orchestration tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by `dub` and `batch`.
#[derive(Args, Debug, Clone)]
pub struct TaskArgs {
    /// Target language code (e.g. es, fr, de)
    #[arg(short, long)]
    pub target: String,

    /// Source language code (auto-detected when omitted)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Reference audio for voice cloning
    #[arg(long)]
    pub voice_reference: Option<PathBuf>,

    /// Speech-to-text backend (selected automatically when omitted)
    #[arg(long)]
    pub stt: Option<String>,

    /// Text-to-speech backend (selected automatically when omitted)
    #[arg(long)]
    pub tts: Option<String>,

    /// Voice cloning backend
    #[arg(long)]
    pub voice_cloning: Option<String>,

    /// Lip sync backend
    #[arg(long)]
    pub lip_sync_backend: Option<String>,

    /// Skip lip synchronization
    #[arg(long)]
    pub no_lip_sync: bool,

    /// Output quality tier: low, medium or high
    #[arg(long, default_value = "medium")]
    pub quality: QualityTier,

    /// Keep intermediate files (extracted audio, synthesized speech, ...)
    #[arg(long)]
    pub keep_intermediates: bool,
}

impl TaskArgs {
    pub fn options(&self) -> TaskOptions {
        TaskOptions {
            target_language: self.target.clone(),
            source_language: self.source.clone(),
            voice_reference: self.voice_reference.clone(),
            stt: self.stt.clone(),
            tts: self.tts.clone(),
            voice_cloning: self.voice_cloning.clone(),
            lip_sync_backend: self.lip_sync_backend.clone(),
            lip_sync: !self.no_lip_sync,
            quality: self.quality,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dub a single video or audio file
    Dub {
        /// Input file to dub
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (defaults to <input>_dubbed.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        task: TaskArgs,

        /// Run quality checks on the result
        #[arg(long)]
        validate: bool,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dub a directory or a list of files concurrently
    Batch {
        /// Input directory, or a list of files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory to write dubbed files into
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Maximum number of files processed at once
        #[arg(long)]
        max_concurrency: Option<usize>,

        #[command(flatten)]
        task: TaskArgs,

        /// Output the batch result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered backends and their availability
    List {
        /// Only show one capability kind (stt, tts, voice_cloning, lip_sync)
        #[arg(short, long)]
        kind: Option<CapabilityKind>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show details about one backend
    Info {
        /// Capability kind (stt, tts, voice_cloning, lip_sync)
        kind: CapabilityKind,

        /// Backend name
        name: String,
    },

    /// Compare a dubbed file against its original
    Validate {
        /// Original media file
        reference: PathBuf,

        /// Dubbed media file
        output: PathBuf,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    CheckConfig {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
