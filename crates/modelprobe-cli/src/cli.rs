use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "modelprobe", version, about = "Inspect saved model artifacts")]
pub struct Cli {
    /// Log filter for stderr output (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "warn")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the input feature names of a joblib-saved estimator
    Features {
        /// Path to the joblib or pickle file
        #[arg(long, default_value = "gbr_best_Y1_compat.joblib")]
        model_path: PathBuf,

        /// Also print the estimator's stored attributes
        #[arg(long)]
        params: bool,
    },

    /// Print inputs, initializers and nodes of an ONNX model
    Graph {
        /// Path to the ONNX model file
        #[arg(long, default_value = "gbr_best_Y1_compat.onnx")]
        model_path: PathBuf,
    },

    /// Inspect any supported artifact, chosen by file extension
    Inspect {
        /// .onnx, .joblib, .pkl or .pickle file
        path: PathBuf,

        /// Also print estimator attributes (joblib/pickle only)
        #[arg(long)]
        params: bool,
    },
}
