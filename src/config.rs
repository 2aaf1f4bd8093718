//! Configuration system for the MIDI post-processor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub tempo: TempoConfig,
    pub drift: DriftConfig,
    pub prettify: PrettifyConfig,
    pub export: ExportConfig,
    pub combine: CombineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            tempo: TempoConfig::default(),
            drift: DriftConfig::default(),
            prettify: PrettifyConfig::default(),
            export: ExportConfig::default(),
            combine: CombineConfig::default(),
        }
    }
}

/// Tempo defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// BPM used when none is given on the command line
    pub default_bpm: u32,
    /// Tempo the drum transcriber renders at, rescaled away by pass 0
    pub source_bpm: u32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            default_bpm: 120,
            source_bpm: 120,
        }
    }
}

/// Chunked drift correction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Measures per analysis chunk
    pub chunk_measures: u32,
    /// Zero-based channel carrying drums (9 = General MIDI channel 10)
    pub drum_channel: u8,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            chunk_measures: 8,
            drum_channel: 9,
        }
    }
}

/// Note-duration bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrettifyConfig {
    /// Shortest written duration, in sixteenth notes
    pub min_sixteenths: u32,
    /// Longest written duration, in quarter notes
    pub max_quarters: u32,
}

impl Default for PrettifyConfig {
    fn default() -> Self {
        Self {
            min_sixteenths: 1,
            max_quarters: 1,
        }
    }
}

/// Output naming and side artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub retimed_prefix: String,
    pub quantized_prefix: String,
    pub adjusted_prefix: String,
    pub prettified_prefix: String,
    /// Save the output of every pipeline stage, not only the last one
    pub write_intermediates: bool,
    /// Write the JSON pipeline report next to the output
    pub write_analysis: bool,
    /// Write qa/statistics.txt
    pub write_qa: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            retimed_prefix: "retimed_".to_string(),
            quantized_prefix: "quantized_".to_string(),
            adjusted_prefix: "adjusted_".to_string(),
            prettified_prefix: "prettified_".to_string(),
            write_intermediates: false,
            write_analysis: true,
            write_qa: false,
        }
    }
}

/// General MIDI instrument assignment for one stem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub program: u8,
    pub name: String,
    pub family: String,
    pub percussion: bool,
}

impl InstrumentInfo {
    fn new(program: u8, name: &str, family: &str, percussion: bool) -> Self {
        Self {
            program,
            name: name.to_string(),
            family: family.to_string(),
            percussion,
        }
    }
}

/// Stem combination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Resolution of the combined file
    pub ticks_per_beat: u16,
    /// Keyed by lower-cased stem file name without extension
    pub instruments: BTreeMap<String, InstrumentInfo>,
    /// Used for stems missing from `instruments`
    pub fallback: InstrumentInfo,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: 220,
            instruments: default_instruments(),
            fallback: InstrumentInfo::new(0, "acoustic grand piano", "keyboard", false),
        }
    }
}

impl CombineConfig {
    pub fn instrument_for(&self, stem: &str) -> &InstrumentInfo {
        self.instruments
            .get(&stem.to_lowercase())
            .unwrap_or(&self.fallback)
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.tempo.default_bpm == 0 || config.tempo.source_bpm == 0 {
        anyhow::bail!("tempo BPM values must be positive");
    }
    if config.drift.chunk_measures == 0 {
        anyhow::bail!("drift.chunk_measures must be at least 1");
    }
    if config.drift.drum_channel > 15 {
        anyhow::bail!(
            "drift.drum_channel {} is outside 0..=15",
            config.drift.drum_channel
        );
    }
    if config.prettify.min_sixteenths == 0 {
        anyhow::bail!("prettify.min_sixteenths must be at least 1");
    }
    if config.prettify.min_sixteenths > config.prettify.max_quarters.saturating_mul(4) {
        anyhow::bail!("prettify.min_sixteenths must not exceed prettify.max_quarters");
    }
    if config.combine.ticks_per_beat < 4 || config.combine.ticks_per_beat > 0x7FFF {
        anyhow::bail!(
            "combine.ticks_per_beat {} is outside 4..=32767",
            config.combine.ticks_per_beat
        );
    }
    for (stem, info) in &config.combine.instruments {
        if info.program > 127 {
            anyhow::bail!("instrument '{}' has program {} > 127", stem, info.program);
        }
    }
    if config.combine.fallback.program > 127 {
        anyhow::bail!(
            "fallback instrument has program {} > 127",
            config.combine.fallback.program
        );
    }
    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn default_instruments() -> BTreeMap<String, InstrumentInfo> {
    let mut instruments = BTreeMap::new();
    instruments.insert(
        "vocals".to_string(),
        InstrumentInfo::new(80, "lead 1 (square)", "synth lead", false),
    );
    instruments.insert(
        "no_vocals".to_string(),
        InstrumentInfo::new(1, "acoustic grand piano", "keyboard", false),
    );
    instruments.insert(
        "drums".to_string(),
        InstrumentInfo::new(0, "standard kit", "drums", true),
    );
    instruments.insert(
        "guitar".to_string(),
        InstrumentInfo::new(27, "electric guitar (clean)", "guitar", false),
    );
    instruments.insert(
        "bass".to_string(),
        InstrumentInfo::new(33, "electric bass (finger)", "bass", false),
    );
    instruments.insert(
        "piano".to_string(),
        InstrumentInfo::new(1, "bright acoustic piano", "keyboard", false),
    );
    instruments.insert(
        "other".to_string(),
        InstrumentInfo::new(20, "reed organ", "organ", false),
    );
    instruments
}
