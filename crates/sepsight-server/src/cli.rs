use clap::{Args, Parser, Subcommand};
use sepsight_core::{ClinicalField, RangeValidator, RangeViolation, TabularInput};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sepsight")]
#[command(
    author,
    version,
    about = "Sepsis mortality risk from ICU lab values and a clinical note"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server with the web UI
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "sepsight.yaml", env = "SEPSIGHT_CONFIG")]
        config: PathBuf,

        /// Listen address
        #[arg(short, long)]
        address: Option<String>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding the exported ensemble
        #[arg(long, env = "SEPSIGHT_PREDICTOR_DIR")]
        predictor_dir: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the ensemble's models and a model's dependencies
    Inspect {
        /// Configuration file path
        #[arg(short, long, default_value = "sepsight.yaml", env = "SEPSIGHT_CONFIG")]
        config: PathBuf,

        /// Model to describe; the best model when omitted
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Run one assessment and print it as JSON
    Assess {
        /// Configuration file path
        #[arg(short, long, default_value = "sepsight.yaml", env = "SEPSIGHT_CONFIG")]
        config: PathBuf,

        #[command(flatten)]
        labs: LabArgs,

        /// Clinical note, English or Spanish
        #[arg(short, long, default_value = "")]
        note: String,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

/// The five lab values
#[derive(Args, Debug, Clone)]
pub struct LabArgs {
    /// Hemoglobin (g/dL)
    #[arg(long)]
    pub hemoglobin: f64,

    /// Albumin (g/dL)
    #[arg(long)]
    pub albumin: f64,

    /// aPTT (seconds)
    #[arg(long)]
    pub aptt: f64,

    /// Total bilirubin (mg/dL)
    #[arg(long)]
    pub bilirubin: f64,

    /// ICU length of stay (days)
    #[arg(long)]
    pub icu_los_days: f64,
}

impl LabArgs {
    pub fn to_input(&self) -> TabularInput {
        TabularInput::new()
            .with(ClinicalField::Hemoglobin, self.hemoglobin)
            .with(ClinicalField::Albumin, self.albumin)
            .with(ClinicalField::Aptt, self.aptt)
            .with(ClinicalField::Bilirubin, self.bilirubin)
            .with(ClinicalField::IcuLosDays, self.icu_los_days)
    }

    /// Every value outside its training range, in field order
    pub fn range_violations(&self) -> Vec<RangeViolation> {
        RangeValidator::new().validate_all(&self.to_input())
    }
}
