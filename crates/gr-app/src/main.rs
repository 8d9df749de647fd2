use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use gr_audio::GenreExtractor;
use gr_audio::extract::SegmentOutcome;
use gr_core::{Config, Dataset, ExtractConfig, TrainConfig};
use gr_train::predict::{self, genre_label};
use gr_train::{Device, GenreRnn, Prediction, Samples};

pub mod cli;

use cli::{Cli, Command, ExtractArgs, PredictArgs, TrainArgs};

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    // 3. Charger la config
    let config = resolve_config(&cli.config)?;

    // 4. Lancer l'étape demandée
    match &cli.command {
        Command::Extract(args) => run_extract(args, config.extract),
        Command::Train(args) => run_train(args, config.train),
        Command::Predict(args) => run_predict(args, &config),
    }
}

/// Missing config file: fall back to defaults.
fn resolve_config(path: &Path) -> Result<Config> {
    if path.exists() {
        gr_core::config::load_config(path)
    } else {
        log::warn!(
            "Config introuvable : {}. Utilisation des défauts.",
            path.display()
        );
        Ok(Config::default())
    }
}

fn run_extract(args: &ExtractArgs, mut config: ExtractConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;
    let report = gr_audio::save_mfcc(&config)?;
    log::info!(
        "Dataset écrit : {} ({} fichiers)",
        config.json_path.display(),
        report.files.len()
    );
    Ok(())
}

fn run_train(args: &TrainArgs, mut config: TrainConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;
    let outcome = gr_train::run_training(&config)?;
    println!(
        "Test accuracy: {:.4} (loss {:.4}, graine {})",
        outcome.test.accuracy, outcome.test.loss, outcome.seed
    );
    if args.plot {
        println!("{}", gr_train::report::render_history(&outcome.history, 60, 12));
    }
    Ok(())
}

fn run_predict(args: &PredictArgs, config: &Config) -> Result<()> {
    let model_dir = args
        .model_dir
        .as_deref()
        .unwrap_or(config.train.model_dir.as_path());
    let (model, mapping) = GenreRnn::load(model_dir, &Device::Cpu)?;

    if let Some(ref audio) = args.audio {
        let prediction = predict_clip(&model, audio, &config.extract)?;
        println!(
            "{} : {} ({:.1} %)",
            audio.display(),
            prediction.display_label(&mapping),
            prediction.confidence() * 100.0
        );
        return Ok(());
    }

    let (Some(data), Some(index)) = (args.data.as_deref(), args.index) else {
        anyhow::bail!("Utilisez --audio, ou --data avec --index.");
    };
    let dataset = Dataset::load_json(data)
        .with_context(|| format!("Chargement de {}", data.display()))?;
    let samples = Samples::from_dataset(&dataset)?;
    let prediction = predict::predict_sample(&model, &samples, index)?;
    let expected = samples.labels()[index] as usize;
    println!(
        "Échantillon {index} : attendu {}, prédit {} ({:.1} %)",
        genre_label(&mapping, expected),
        prediction.display_label(&mapping),
        prediction.confidence() * 100.0
    );
    Ok(())
}

/// Mean prediction over the complete segments of `audio`.
fn predict_clip(model: &GenreRnn, audio: &Path, config: &ExtractConfig) -> Result<Prediction> {
    config.validate()?;
    let extractor = GenreExtractor::new(config.clone())?;
    let signal = gr_audio::decode::load(audio, config.sample_rate)?;
    let segments: Vec<Vec<Vec<f32>>> = extractor
        .process_signal(&signal)
        .into_iter()
        .filter_map(|outcome| match outcome {
            SegmentOutcome::Kept(matrix) => Some(matrix),
            SegmentOutcome::Dropped { .. } => None,
        })
        .collect();
    log::info!("{} segments exploitables dans {}", segments.len(), audio.display());

    predict::classify_segments(model, &segments)?.ok_or_else(|| {
        anyhow::anyhow!(
            "Aucun segment complet dans {} : clip trop court ?",
            audio.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use gr_core::DecodeErrorPolicy;
    use gr_train::ModelSpec;

    use super::*;

    const GENRES: [&str; 3] = ["blues", "jazz", "rock"];

    /// 2 s @ 8 kHz, 4 segments of 4000 samples: 8 frames × 13 coefficients.
    fn small_config(root: &Path) -> Config {
        let extract = ExtractConfig {
            dataset_path: root.join("Data"),
            json_path: root.join("data.json"),
            sample_rate: 8000,
            track_duration_secs: 2.0,
            num_segments: 4,
            n_mfcc: 13,
            n_fft: 1024,
            hop_length: 512,
            n_mels: 40,
            on_decode_error: DecodeErrorPolicy::Abort,
        };
        let train = TrainConfig {
            model_dir: root.join("model"),
            ..TrainConfig::default()
        };
        Config { extract, train }
    }

    fn save_model(dir: &Path) {
        let spec = ModelSpec {
            input_frames: 8,
            input_coeffs: 13,
            lstm_units: 8,
            dense_units: 4,
            dropout: 0.3,
            num_classes: GENRES.len(),
        };
        let model = GenreRnn::new(spec, &Device::Cpu).unwrap();
        let mapping: Vec<String> = GENRES.iter().map(|g| (*g).to_string()).collect();
        model.save(dir, &mapping).unwrap();
    }

    fn write_tone(path: &Path, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let v = (2.0 * std::f32::consts::PI * 330.0 * t).sin() * 0.4;
            writer.write_sample((v * f32::from(i16::MAX)) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn predict_args(config: &Config) -> PredictArgs {
        PredictArgs {
            model_dir: Some(config.train.model_dir.clone()),
            audio: None,
            data: None,
            index: None,
        }
    }

    #[test]
    fn clip_prediction_averages_its_segments() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        save_model(&config.train.model_dir);
        let clip = dir.path().join("clip.wav");
        write_tone(&clip, 8000, 16_000);

        let (model, _) = GenreRnn::load(&config.train.model_dir, &Device::Cpu).unwrap();
        let prediction = predict_clip(&model, &clip, &config.extract).unwrap();
        assert_eq!(prediction.probabilities.len(), GENRES.len());
        let total: f32 = prediction.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);

        let args = PredictArgs {
            audio: Some(clip),
            ..predict_args(&config)
        };
        assert!(run_predict(&args, &config).is_ok());
    }

    #[test]
    fn clip_resampled_to_extraction_rate() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        save_model(&config.train.model_dir);
        let clip = dir.path().join("clip16k.wav");
        write_tone(&clip, 16_000, 32_000);

        let (model, _) = GenreRnn::load(&config.train.model_dir, &Device::Cpu).unwrap();
        assert!(predict_clip(&model, &clip, &config.extract).is_ok());
    }

    #[test]
    fn clip_shorter_than_a_segment_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        save_model(&config.train.model_dir);
        let clip = dir.path().join("short.wav");
        write_tone(&clip, 8000, 3000);

        let (model, _) = GenreRnn::load(&config.train.model_dir, &Device::Cpu).unwrap();
        let err = predict_clip(&model, &clip, &config.extract).unwrap_err();
        assert!(err.to_string().contains("short.wav"));
    }

    #[test]
    fn mismatched_extraction_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        save_model(&config.train.model_dir);
        let clip = dir.path().join("clip.wav");
        write_tone(&clip, 8000, 16_000);
        config.extract.n_mfcc = 20;

        let (model, _) = GenreRnn::load(&config.train.model_dir, &Device::Cpu).unwrap();
        assert!(predict_clip(&model, &clip, &config.extract).is_err());
    }

    #[test]
    fn dataset_sample_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        save_model(&config.train.model_dir);
        let data = dir.path().join("data.json");
        let mut dataset = Dataset::new(GENRES.iter().map(|g| (*g).to_string()).collect());
        for label in 0..3u32 {
            dataset.push(vec![vec![label as f32 * 0.1; 13]; 8], label);
        }
        dataset.save_json(&data).unwrap();

        let args = PredictArgs {
            data: Some(data.clone()),
            index: Some(2),
            ..predict_args(&config)
        };
        assert!(run_predict(&args, &config).is_ok());

        let args = PredictArgs {
            data: Some(data),
            index: Some(3),
            ..predict_args(&config)
        };
        let err = run_predict(&args, &config).unwrap_err();
        assert!(err.to_string().contains("hors limites"));
    }

    #[test]
    fn missing_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let args = PredictArgs {
            audio: Some(PathBuf::from("clip.wav")),
            ..predict_args(&config)
        };
        assert!(run_predict(&args, &config).is_err());
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = resolve_config(Path::new("/nonexistent/genre-rnn.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
