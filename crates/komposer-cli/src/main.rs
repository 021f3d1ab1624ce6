//! Komposer CLI - one subcommand per tool in the external interface
//! (spec §6).
//!
//! Unlike a terminal-facing tool, every subcommand here prints exactly one
//! JSON object to stdout shaped `{ success, ... }` (spec §7), since the
//! intended caller is a dispatch layer relaying the result verbatim rather
//! than a person reading a terminal.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "komposer")]
#[command(author, version, about = "Komposer media-composition engine CLI", long_about = None)]
struct Cli {
    /// Path to an optional `komposer.toml` overlay, layered on top of the
    /// environment-derived configuration.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List source files under the configured source roots.
    ListFiles,

    /// List generated/temp files under the configured temp root.
    ListGeneratedFiles,

    /// Probe a file's container/stream metadata.
    FileInfo(commands::files::FileInfoArgs),

    /// Remove stale temp-class files.
    CleanupTempFiles(commands::files::CleanupArgs),

    /// List every whitelisted operation and its declared parameters.
    AvailableOperations,

    /// Run a single catalog operation against one input file.
    ProcessFile(commands::operations::ProcessFileArgs),

    /// Run a chained sequence of catalog operations.
    BatchProcess(commands::operations::BatchProcessArgs),

    /// Detect scenes and derive highlight/suggestion insights for a video.
    AnalyzeVideoContent(commands::analysis::AnalyzeVideoContentArgs),

    /// Return cached highlight/suggestion insights for a video.
    VideoInsights(commands::analysis::VideoInsightsArgs),

    /// Extract (or return cached) representative screenshots per scene.
    SceneScreenshots(commands::analysis::SceneScreenshotsArgs),

    /// Detect speech segments and total speech duration for a source.
    DetectSpeechSegments(commands::analysis::DetectSpeechSegmentsArgs),

    /// Plan and render a komposition document into a final artifact.
    ProcessKompositionFile(commands::composition::ProcessKompositionFileArgs),

    /// Render an already-built composition plan.
    ProcessCompositionPlan(commands::composition::ProcessCompositionPlanArgs),

    /// Plan and render a komposition document, reporting only the final handle.
    ProcessTransitionEffectsKomposition(commands::composition::ProcessTransitionEffectsArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = commands::common::load_config(cli.config.as_deref())?;

    tracing::debug!(command = ?std::mem::discriminant(&cli.command), "dispatching command");

    match cli.command {
        Commands::ListFiles => commands::files::list_files(&config),
        Commands::ListGeneratedFiles => commands::files::list_generated_files(&config),
        Commands::FileInfo(args) => commands::files::file_info(&config, args),
        Commands::CleanupTempFiles(args) => commands::files::cleanup_temp_files(&config, args),
        Commands::AvailableOperations => commands::operations::available_operations(),
        Commands::ProcessFile(args) => commands::operations::process_file(&config, args),
        Commands::BatchProcess(args) => commands::operations::batch_process(&config, args),
        Commands::AnalyzeVideoContent(args) => {
            commands::analysis::analyze_video_content(&config, args)
        }
        Commands::VideoInsights(args) => commands::analysis::video_insights(&config, args),
        Commands::SceneScreenshots(args) => commands::analysis::scene_screenshots(&config, args),
        Commands::DetectSpeechSegments(args) => {
            commands::analysis::detect_speech_segments(&config, args)
        }
        Commands::ProcessKompositionFile(args) => {
            commands::composition::process_komposition_file(&config, args)
        }
        Commands::ProcessCompositionPlan(args) => {
            commands::composition::process_composition_plan(&config, args)
        }
        Commands::ProcessTransitionEffectsKomposition(args) => {
            commands::composition::process_transition_effects_komposition(&config, args)
        }
    }

    Ok(())
}
