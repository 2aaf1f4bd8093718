use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tidymidi::{validate_input, Config, PipelineOptions, TidyMidi};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MIDI Post-Processing Pipeline
#[derive(Parser)]
#[command(name = "tidymidi")]
#[command(about = "Quantize, drift-correct and prettify transcribed MIDI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Custom configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snap notes to the sixteenth grid and set the tempo
    Quantize {
        /// Input MIDI file
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Target BPM (defaults to the configured tempo)
        #[arg(short, long)]
        bpm: Option<u32>,
    },
    /// Detect and undo per-chunk drum drift
    Drift {
        /// Input MIDI file (already quantized)
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Target BPM (defaults to the configured tempo)
        #[arg(short, long)]
        bpm: Option<u32>,
    },
    /// Rewrite note durations from the onset grid
    Prettify {
        /// Input MIDI file
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },
    /// Rescale a file rendered at a fixed tempo to the target tempo
    Retime {
        /// Input MIDI file
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Target BPM (defaults to the configured tempo)
        #[arg(short, long)]
        bpm: Option<u32>,

        /// Tempo the input was rendered at (defaults to the configured source tempo)
        #[arg(long)]
        source_bpm: Option<u32>,
    },
    /// Run every stage in order and write the final file
    Pipeline {
        /// Input MIDI file
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Target BPM (defaults to the configured tempo)
        #[arg(short, long)]
        bpm: Option<u32>,

        /// Retime from this BPM before quantizing
        #[arg(long)]
        source_bpm: Option<u32>,

        /// Quantize only (melodic material)
        #[arg(long)]
        quantize_only: bool,

        /// Also save each intermediate stage
        #[arg(long)]
        intermediates: bool,

        /// Write qa/statistics.txt
        #[arg(long)]
        qa: bool,

        /// Skip the JSON analysis report
        #[arg(long)]
        no_analysis: bool,
    },
    /// Combine per-stem MIDI files into one multi-track file
    Combine {
        /// Stem MIDI files; the file stem selects the instrument
        #[arg(required = true)]
        stems: Vec<PathBuf>,

        /// Song name for the conductor track
        #[arg(short, long)]
        name: String,

        /// Output file (defaults to <name>.mid)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a MIDI file against the pipeline postconditions
    Audit {
        /// MIDI file to audit
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        #[arg(value_name = "CONFIG")]
        file: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let level = if verbose {
        "tidymidi=debug"
    } else if quiet {
        "tidymidi=warn"
    } else {
        "tidymidi=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    init_logging(cli.verbose, cli.quiet)?;

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        tidymidi::config::load_config(config_path)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Quantize { input, output, bpm } => {
            let processor = TidyMidi::new(config);
            let bpm = processor.tempo(bpm)?.bpm();
            let (path, summary) = processor.quantize_file(&input, &output, bpm)?;
            println!(
                "Quantized {} note events ({} moved) -> {}",
                summary.note_events,
                summary.moved_note_events,
                path.display()
            );
        }
        Commands::Drift { input, output, bpm } => {
            let processor = TidyMidi::new(config);
            let bpm = processor.tempo(bpm)?.bpm();
            let (path, report) = processor.correct_drift_file(&input, &output, bpm)?;
            for chunk in report.shifted_chunks() {
                println!(
                    "Chunk {} (tick {}): shifted {} ticks",
                    chunk.index + 1,
                    chunk.start_tick,
                    chunk.detected_shift
                );
            }
            println!(
                "Total shift {} ticks over {} chunks -> {}",
                report.total_shift,
                report.chunks.len(),
                path.display()
            );
        }
        Commands::Prettify { input, output } => {
            let processor = TidyMidi::new(config);
            let (path, summary) = processor.prettify_file(&input, &output)?;
            println!(
                "Prettified {} notes in {} groups -> {}",
                summary.notes,
                summary.note_groups,
                path.display()
            );
        }
        Commands::Retime {
            input,
            output,
            bpm,
            source_bpm,
        } => {
            if let Some(source_bpm) = source_bpm {
                config.tempo.source_bpm = source_bpm;
            }
            let processor = TidyMidi::new(config);
            let bpm = processor.tempo(bpm)?.bpm();
            let (path, summary) = processor.retime_file(&input, &output, bpm)?;
            println!(
                "Retimed {} -> {} BPM (scale {:.4}) -> {}",
                summary.source_bpm,
                summary.target_bpm,
                summary.scale,
                path.display()
            );
        }
        Commands::Pipeline {
            input,
            output,
            bpm,
            source_bpm,
            quantize_only,
            intermediates,
            qa,
            no_analysis,
        } => {
            config.export.write_intermediates |= intermediates;
            config.export.write_qa |= qa;
            if no_analysis {
                config.export.write_analysis = false;
            }

            validate_input(&input, &config)?;
            let processor = TidyMidi::new(config);
            let options = PipelineOptions {
                source_bpm,
                quantize_only,
            };

            if !cli.quiet {
                println!("Processing {}...", input.display());
            }
            let report = processor.process(&input, &output, bpm, &options)?;
            if !cli.quiet {
                println!(
                    "Stages: {} -> {}",
                    report.stages.join(", "),
                    report.output.as_deref().unwrap_or_default()
                );
            }
        }
        Commands::Combine {
            stems,
            name,
            output,
        } => {
            let processor = TidyMidi::new(config);
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.mid", name)));
            let path = processor.combine_files(stems.as_slice(), &name, &output)?;
            println!("Combined {} stems -> {}", stems.len(), path.display());
        }
        Commands::Audit { input, json } => {
            let processor = TidyMidi::new(config);
            let report = processor.audit_file(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} notes, {} off-grid, {} duration violations, {} malformed track ends",
                    report.note_on_count(),
                    report.off_grid_note_events,
                    report.duration_violations,
                    report.malformed_track_ends
                );
            }
            if !report.passed() {
                anyhow::bail!("{} failed the audit", input.display());
            }
        }
        Commands::ValidateConfig { file } => {
            let config = tidymidi::config::load_config(file)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
