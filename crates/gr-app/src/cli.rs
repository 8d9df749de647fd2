use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gr_core::{DecodeErrorPolicy, ExtractConfig, TrainConfig};

/// genre-rnn — MFCC dataset extraction and LSTM genre classification.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fichier de configuration TOML. Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extraire les MFCC d'une arborescence genre/clip vers un fichier JSON.
    Extract(ExtractArgs),
    /// Entraîner le classifieur sur un dataset JSON.
    Train(TrainArgs),
    /// Prédire le genre d'un clip ou d'un échantillon du dataset.
    Predict(PredictArgs),
}

#[derive(Args, Debug, Default)]
pub struct ExtractArgs {
    /// Racine du dataset (un sous-dossier par genre).
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Fichier JSON de sortie.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Nombre de segments par piste.
    #[arg(long)]
    pub segments: Option<usize>,

    /// Ignorer les fichiers indécodables au lieu d'interrompre l'extraction.
    #[arg(long, default_value_t = false)]
    pub skip_undecodable: bool,
}

impl ExtractArgs {
    /// Apply the flags over `config`.
    pub fn apply(&self, config: &mut ExtractConfig) {
        if let Some(ref path) = self.dataset {
            config.dataset_path.clone_from(path);
        }
        if let Some(ref path) = self.output {
            config.json_path.clone_from(path);
        }
        if let Some(n) = self.segments {
            config.num_segments = n;
        }
        if self.skip_undecodable {
            config.on_decode_error = DecodeErrorPolicy::Skip;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// Dataset JSON produit par `extract`.
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Dossier de sortie du modèle.
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    #[arg(long)]
    pub epochs: Option<usize>,

    /// Graine aléatoire (splits, init, dropout, ordre des batches).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Nombre de genres attendu ; vérifié contre le mapping du dataset.
    #[arg(long)]
    pub num_classes: Option<usize>,

    /// Afficher les courbes d'entraînement dans le terminal.
    #[arg(long, default_value_t = false)]
    pub plot: bool,
}

impl TrainArgs {
    /// Apply the flags over `config`.
    pub fn apply(&self, config: &mut TrainConfig) {
        if let Some(ref path) = self.data {
            config.data_path.clone_from(path);
        }
        if let Some(ref path) = self.model_dir {
            config.model_dir.clone_from(path);
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.num_classes.is_some() {
            config.num_classes = self.num_classes;
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Dossier du modèle entraîné. Défaut : train.model_dir.
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Clip audio à classer (moyenne des segments).
    #[arg(long, conflicts_with_all = ["data", "index"], required_unless_present = "data")]
    pub audio: Option<PathBuf>,

    /// Dataset JSON contenant l'échantillon à classer.
    #[arg(long, requires = "index")]
    pub data: Option<PathBuf>,

    /// Index de l'échantillon dans le dataset.
    #[arg(long, requires = "data")]
    pub index: Option<usize>,
}
