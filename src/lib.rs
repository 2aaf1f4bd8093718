//! MIDI Post-Processing Pipeline
//!
//! Turns raw transcribed MIDI (unquantized, drifting, with detector-driven
//! note lengths) into tempo-locked, readable MIDI. The stages run in a fixed
//! order: optional tempo remap, quantization, chunked drift correction and
//! duration prettifying. Each stage reads a [`Document`] and returns a new one.

pub mod analysis;
pub mod combine;
pub mod config;
pub mod document;
pub mod error;
pub mod midi;
pub mod passes;
pub mod qa;
pub mod timebase;
pub mod timeline;

pub use config::Config;
pub use document::Document;
pub use error::{PolishError, Result};
pub use timebase::{Tempo, TimeBase};

use analysis::{DriftReport, PipelineReport, PrettifySummary, QuantizeSummary, RetimeSummary};
use qa::QaReport;
use std::path::{Path, PathBuf};

/// A pipeline stage, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retime,
    Quantize,
    Drift,
    Prettify,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Retime => "retime",
            Stage::Quantize => "quantize",
            Stage::Drift => "drift",
            Stage::Prettify => "prettify",
        }
    }

    /// File-name prefix of this stage's output
    pub fn prefix<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            Stage::Retime => &config.export.retimed_prefix,
            Stage::Quantize => &config.export.quantized_prefix,
            Stage::Drift => &config.export.adjusted_prefix,
            Stage::Prettify => &config.export.prettified_prefix,
        }
    }
}

/// Per-run choices that are not configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOptions {
    /// Remap from this tempo before quantizing (drum transcriptions)
    pub source_bpm: Option<u32>,
    /// Stop after quantization (melodic material has no drums to align)
    pub quantize_only: bool,
}

impl PipelineOptions {
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(4);
        if self.source_bpm.is_some() {
            stages.push(Stage::Retime);
        }
        stages.push(Stage::Quantize);
        if !self.quantize_only {
            stages.push(Stage::Drift);
            stages.push(Stage::Prettify);
        }
        stages
    }
}

/// Main processing pipeline for MIDI post-processing
pub struct TidyMidi {
    config: Config,
}

impl TidyMidi {
    /// Create a new processor with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tempo from an explicit BPM or the configured default
    pub fn tempo(&self, bpm: Option<u32>) -> Result<Tempo> {
        Tempo::from_bpm(bpm.unwrap_or(self.config.tempo.default_bpm))
    }

    /// Pass 0 on a file: writes `<retimed_prefix><name>` into `output_dir`
    pub fn retime_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
        bpm: u32,
    ) -> Result<(PathBuf, RetimeSummary)> {
        let target = Tempo::from_bpm(bpm)?;
        let source = Tempo::from_bpm(self.config.tempo.source_bpm)?;
        let document = Document::load(input.as_ref())?;
        let (document, summary) = passes::pass_0::run(&document, source, target)?;
        let path = self.save_stage(&document, input.as_ref(), output_dir.as_ref(), Stage::Retime)?;
        Ok((path, summary))
    }

    /// Pass 1 on a file: writes `<quantized_prefix><name>` into `output_dir`
    pub fn quantize_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
        bpm: u32,
    ) -> Result<(PathBuf, QuantizeSummary)> {
        let tempo = Tempo::from_bpm(bpm)?;
        let document = Document::load(input.as_ref())?;
        let (document, summary) = passes::pass_1::run(&document, tempo)?;
        let path =
            self.save_stage(&document, input.as_ref(), output_dir.as_ref(), Stage::Quantize)?;
        Ok((path, summary))
    }

    /// Pass 2 on a file: writes `<adjusted_prefix><name>` into `output_dir`
    pub fn correct_drift_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
        bpm: u32,
    ) -> Result<(PathBuf, DriftReport)> {
        let tempo = Tempo::from_bpm(bpm)?;
        let document = Document::load(input.as_ref())?;
        let (document, report) = passes::pass_2::run(&document, tempo, &self.config)?;
        let path = self.save_stage(&document, input.as_ref(), output_dir.as_ref(), Stage::Drift)?;
        Ok((path, report))
    }

    /// Pass 3 on a file: writes `<prettified_prefix><name>` into `output_dir`
    pub fn prettify_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
    ) -> Result<(PathBuf, PrettifySummary)> {
        let document = Document::load(input.as_ref())?;
        let (document, summary) = passes::pass_3::run(&document, &self.config.prettify)?;
        let path =
            self.save_stage(&document, input.as_ref(), output_dir.as_ref(), Stage::Prettify)?;
        Ok((path, summary))
    }

    /// Run every stage in memory and return the final document
    pub fn run_pipeline(
        &self,
        document: &Document,
        tempo: Tempo,
        options: &PipelineOptions,
    ) -> Result<(Document, PipelineReport)> {
        self.run_stages(document, tempo, options, |_, _| Ok(()))
    }

    /// Execute the fixed-order pipeline, handing each stage's output to `on_stage`
    fn run_stages<F>(
        &self,
        document: &Document,
        tempo: Tempo,
        options: &PipelineOptions,
        mut on_stage: F,
    ) -> Result<(Document, PipelineReport)>
    where
        F: FnMut(Stage, &Document) -> Result<()>,
    {
        let mut report = PipelineReport::new(document.ticks_per_beat, tempo.bpm());
        let mut current = document.clone();

        for stage in options.stages() {
            current = match stage {
                Stage::Retime => {
                    let source = Tempo::from_bpm(
                        options.source_bpm.unwrap_or(self.config.tempo.source_bpm),
                    )?;
                    let (next, summary) = passes::pass_0::run(&current, source, tempo)?;
                    report.retime = Some(summary);
                    next
                }
                Stage::Quantize => {
                    let (next, summary) = passes::pass_1::run(&current, tempo)?;
                    report.quantize = Some(summary);
                    next
                }
                Stage::Drift => {
                    let (next, drift) = passes::pass_2::run(&current, tempo, &self.config)?;
                    report.drift = Some(drift);
                    next
                }
                Stage::Prettify => {
                    let (next, summary) = passes::pass_3::run(&current, &self.config.prettify)?;
                    report.prettify = Some(summary);
                    next
                }
            };
            report.stages.push(stage.name().to_string());
            on_stage(stage, &current)?;
        }

        Ok((current, report))
    }

    /// Load, run the pipeline and save the final document.
    ///
    /// The final file name carries the prefix of every stage that ran,
    /// innermost first: `prettified_adjusted_quantized_song.mid`.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
        bpm: Option<u32>,
        options: &PipelineOptions,
    ) -> Result<PipelineReport> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();
        let tempo = self.tempo(bpm)?;
        let document = Document::load(input)?;
        tracing::info!(
            "Loaded {} ({} tracks, {} notes, {} ticks per beat)",
            input.display(),
            document.tracks.len(),
            document.note_on_count(),
            document.ticks_per_beat
        );
        let file_name = file_name(input);

        let export = &self.config.export;
        let mut name = file_name.clone();
        let mut final_path = output_dir.join(&name);
        let (result, mut report) =
            self.run_stages(&document, tempo, options, |stage, staged| {
                name = format!("{}{}", stage.prefix(&self.config), name);
                final_path = output_dir.join(&name);
                if export.write_intermediates {
                    create_output_dir(output_dir)?;
                    staged.save(&final_path)?;
                    tracing::debug!("Saved {} output to {}", stage.name(), final_path.display());
                }
                Ok(())
            })?;

        if !export.write_intermediates {
            create_output_dir(output_dir)?;
            result.save(&final_path)?;
        }
        tracing::info!("Processed MIDI saved to {}", final_path.display());

        report.input = Some(input.display().to_string());
        report.output = Some(final_path.display().to_string());

        if export.write_analysis {
            analysis::export_analysis(&report, output_dir, &name)?;
        }
        if export.write_qa {
            let audit = qa::audit(&result, &self.config.prettify)?;
            qa::write_statistics_report(&audit, output_dir)?;
        }

        Ok(report)
    }

    /// Merge stems into one file at `output_path`
    pub fn combine_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        stems: &[P],
        song_name: &str,
        output_path: Q,
    ) -> Result<PathBuf> {
        let combined = combine::combine(stems, song_name, &self.config.combine)?;
        let output_path = output_path.as_ref();
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_output_dir(parent)?;
        }
        combined.save(output_path)?;
        tracing::info!(
            "Successfully saved combined MIDI file to {}",
            output_path.display()
        );
        Ok(output_path.to_path_buf())
    }

    /// Audit a MIDI file against the pipeline postconditions
    pub fn audit_file<P: AsRef<Path>>(&self, input: P) -> Result<QaReport> {
        let document = Document::load(input)?;
        qa::audit(&document, &self.config.prettify)
    }

    fn save_stage(
        &self,
        document: &Document,
        input: &Path,
        output_dir: &Path,
        stage: Stage,
    ) -> Result<PathBuf> {
        create_output_dir(output_dir)?;
        let path = output_dir.join(format!(
            "{}{}",
            stage.prefix(&self.config),
            file_name(input)
        ));
        document.save(&path)?;
        tracing::info!("Saved {} output to {}", stage.name(), path.display());
        Ok(path)
    }
}

/// Validate configuration and input file
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> Result<()> {
    config::validate_config(config)
        .map_err(|e| PolishError::ConfigValidationFailed(e.to_string()))?;
    Document::load(input_path)?;
    Ok(())
}

/// Create an output directory, reporting failure as a write error
fn create_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PolishError::Write {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mid".to_string())
}
