//! twocolor - two-color microarray normalization CLI
//!
//! Command-line interface for control-probe based intensity normalization.

use clap::{Args, Parser, Subcommand, ValueEnum};
use twocolor_norm::data::{ColumnMapping, ProbeAnnotationTable, SpotTable};
use twocolor_norm::error::Result;
use twocolor_norm::pipeline::{NormalizationSession, NormalizeConfig};
use std::path::PathBuf;

/// Two-color microarray normalization
#[derive(Parser)]
#[command(name = "twocolor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a spot table and write the result TSV
    Normalize {
        #[command(flatten)]
        input: InputArgs,

        /// Output path for the normalized TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Write the probe annotations after the run to this TSV
        #[arg(long)]
        probes_out: Option<PathBuf>,
    },

    /// Report filter and curve statistics without writing results
    Summary {
        #[command(flatten)]
        input: InputArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: SummaryFormat,
    },

    /// Print the default configuration as YAML
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SummaryFormat {
    Text,
    Json,
}

#[derive(Args)]
struct InputArgs {
    /// Spot table TSV (one row per spot)
    #[arg(short, long)]
    data: PathBuf,

    /// Probe annotation TSV (idA, idB, ratio, colorRGB, symbol)
    #[arg(short, long)]
    probes: Option<PathBuf>,

    /// Configuration YAML; defaults are used for missing keys
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Probe identifier column
    #[arg(long)]
    id: Option<String>,

    /// Secondary identifier column (valB)
    #[arg(long)]
    id_b: Option<String>,

    /// Sample signal column
    #[arg(long)]
    sig_smpl: Option<String>,

    /// Reference signal column
    #[arg(long)]
    sig_ref: Option<String>,

    /// Sample background column
    #[arg(long)]
    bg_smpl: Option<String>,

    /// Reference background column
    #[arg(long)]
    bg_ref: Option<String>,

    /// Sample background standard deviation column
    #[arg(long)]
    bg_smpl_sd: Option<String>,

    /// Reference background standard deviation column
    #[arg(long)]
    bg_ref_sd: Option<String>,

    /// Extra column to carry to the output (repeatable)
    #[arg(long = "other")]
    others: Vec<String>,
}

impl InputArgs {
    /// Column mapping from the header guess, overridden by explicit flags.
    fn mapping(&self, table: &SpotTable) -> Result<ColumnMapping> {
        let explicit = [&self.sig_smpl, &self.sig_ref, &self.bg_smpl, &self.bg_ref];
        let mut mapping = match explicit {
            [Some(ss), Some(sr), Some(bs), Some(br)] => {
                ColumnMapping::with_signal_columns(table.headers(), ss, sr, bs, br)?
            }
            _ => {
                let mut m = ColumnMapping::detect(table.headers())?;
                if let Some(c) = &self.sig_smpl {
                    m.sig_smpl = c.clone();
                }
                if let Some(c) = &self.sig_ref {
                    m.sig_ref = c.clone();
                }
                if let Some(c) = &self.bg_smpl {
                    m.bg_smpl = c.clone();
                }
                if let Some(c) = &self.bg_ref {
                    m.bg_ref = c.clone();
                }
                m
            }
        };
        if let Some(c) = &self.id {
            mapping.id_a = c.clone();
        }
        if let Some(c) = &self.id_b {
            mapping = mapping.with_id_b(c.as_str());
        }
        if self.bg_smpl_sd.is_some() {
            mapping.bg_smpl_sd = self.bg_smpl_sd.clone();
        }
        if self.bg_ref_sd.is_some() {
            mapping.bg_ref_sd = self.bg_ref_sd.clone();
        }
        mapping.validate(table)?;
        Ok(mapping.with_others(self.others.clone()))
    }

    fn session(&self) -> Result<NormalizationSession> {
        let config = match &self.config {
            Some(path) => {
                eprintln!("Loading configuration from {:?}...", path);
                NormalizeConfig::from_file(path)?
            }
            None => NormalizeConfig::default(),
        };

        eprintln!("Loading spot table from {:?}...", self.data);
        let table = SpotTable::from_tsv(&self.data)?;
        let mapping = self.mapping(&table)?;
        eprintln!(
            "Loaded {} spots (id '{}', signals '{}' / '{}')",
            table.n_rows(),
            mapping.id_a,
            mapping.sig_smpl,
            mapping.sig_ref
        );

        let mut session = NormalizationSession::from_table(&table, &mapping, &config)?;
        if let Some(path) = &self.probes {
            eprintln!("Applying probe annotations from {:?}...", path);
            let annotations = ProbeAnnotationTable::from_tsv(path)?;
            let updated = session.apply_annotations(&annotations)?;
            eprintln!("  {} probes annotated", updated);
        }
        Ok(session)
    }
}

fn main() {
    let cli = Cli::parse();

    let mut log_builder = env_logger::Builder::from_default_env();
    log_builder
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_module_path(false);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        log_builder.parse_filters(&filters);
    }
    log_builder.init();

    let result = match cli.command {
        Commands::Normalize {
            input,
            output,
            probes_out,
        } => cmd_normalize(&input, &output, probes_out.as_ref()),
        Commands::Summary { input, format } => cmd_summary(&input, format),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Normalize and write results
fn cmd_normalize(input: &InputArgs, output_path: &PathBuf, probes_out: Option<&PathBuf>) -> Result<()> {
    let mut session = input.session()?;

    eprintln!("Normalizing...");
    let table = session.run()?;

    eprintln!("Writing results to {:?}...", output_path);
    table.to_tsv(output_path)?;

    if let Some(path) = probes_out {
        eprintln!("Writing probe annotations to {:?}...", path);
        session.export_annotations().to_tsv(path)?;
    }

    let summary = session.summary()?;
    eprintln!(
        "Done! {} rows written, {} of {} spots normalized",
        table.n_rows(),
        summary.normalized_spots,
        summary.n_spots
    );
    if !summary.diagnostics.is_empty() {
        eprintln!("  {} warnings (see log)", summary.diagnostics.len());
    }

    Ok(())
}

/// Print filter and curve statistics
fn cmd_summary(input: &InputArgs, format: SummaryFormat) -> Result<()> {
    let mut session = input.session()?;
    let summary = session.summary()?;
    match format {
        SummaryFormat::Text => print!("{}", summary.to_text()),
        SummaryFormat::Json => println!("{}", summary.to_json()?),
    }
    Ok(())
}

/// Print the default configuration
fn cmd_config() -> Result<()> {
    println!("{}", NormalizeConfig::default().to_yaml()?);
    Ok(())
}
