use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gr_core::{CoreError, Dataset, DecodeErrorPolicy, ExtractConfig};
use rayon::prelude::*;

use crate::decode;
use crate::mfcc::MfccExtractor;
use crate::segment::SegmentPlan;

/// Outcome of one segment of one clip.
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentOutcome {
    /// Frame count matched the plan; the matrix goes into the dataset.
    Kept(Vec<Vec<f32>>),
    /// Frame count differed from the plan.
    Dropped {
        /// Frames the segment actually produced.
        frames: usize,
    },
}

/// Bilan d'un fichier audio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub genre: String,
    pub label: u32,
    pub kept: usize,
    pub dropped: usize,
    /// Decode error message when the file was skipped.
    pub skipped: Option<String>,
}

/// Per-file accounting of an extraction run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub files: Vec<FileReport>,
}

impl ExtractionReport {
    /// Segments written to the dataset.
    #[must_use]
    pub fn kept(&self) -> usize {
        self.files.iter().map(|f| f.kept).sum()
    }

    /// Segments discarded for a frame-count mismatch.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.files.iter().map(|f| f.dropped).sum()
    }

    /// Files that could not be decoded (only with `DecodeErrorPolicy::Skip`).
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.files.iter().filter(|f| f.skipped.is_some()).count()
    }

    /// Reports of one genre.
    pub fn for_genre<'a>(&'a self, genre: &'a str) -> impl Iterator<Item = &'a FileReport> + 'a {
        self.files.iter().filter(move |f| f.genre == genre)
    }
}

/// Dataset plus its accounting.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub dataset: Dataset,
    pub report: ExtractionReport,
}

/// Parcourt une arborescence `racine/<genre>/<clip>` et calcule les MFCC.
///
/// # Example
/// ```no_run
/// use gr_audio::GenreExtractor;
/// use gr_core::ExtractConfig;
/// let extractor = GenreExtractor::new(ExtractConfig::default()).unwrap();
/// let extraction = extractor.extract(std::path::Path::new("Data")).unwrap();
/// println!("{} segments", extraction.report.kept());
/// ```
pub struct GenreExtractor {
    config: ExtractConfig,
    plan: SegmentPlan,
    mfcc: MfccExtractor,
}

impl GenreExtractor {
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ExtractConfig) -> Result<Self> {
        config.validate()?;
        let plan = SegmentPlan::from_config(&config);
        let mfcc = MfccExtractor::from_config(&config);
        Ok(Self { config, plan, mfcc })
    }

    #[must_use]
    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }

    /// Immediate subdirectories of `root`, sorted by name, as (genre, path).
    ///
    /// # Errors
    /// Returns an error if `root` is missing or unreadable.
    pub fn discover_genres(root: &Path) -> Result<Vec<(String, PathBuf)>> {
        if !root.is_dir() {
            return Err(CoreError::FileNotFound {
                path: root.display().to_string(),
            }
            .into());
        }

        let mut genres = Vec::new();
        for entry in fs::read_dir(root)
            .with_context(|| format!("Impossible de lire le dossier {}", root.display()))?
        {
            let path = entry?.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                genres.push((name, path));
            } else {
                log::warn!("Fichier ignoré à la racine du dataset : {}", path.display());
            }
        }
        genres.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(genres)
    }

    /// Audio files directly inside a genre directory, sorted by name.
    fn list_clips(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut clips = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("Impossible de lire {}", dir.display()))?
        {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            if hidden || path.is_dir() || !decode::is_audio_file(&path) {
                log::debug!("Ignoré : {}", path.display());
                continue;
            }
            clips.push(path);
        }
        clips.sort();
        Ok(clips)
    }

    /// Walk `root` and build the dataset.
    ///
    /// Each genre's label is its index in the sorted genre list, which is
    /// also its position in `mapping`.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be read, or if a clip cannot be
    /// decoded under `DecodeErrorPolicy::Abort`.
    pub fn extract(&self, root: &Path) -> Result<Extraction> {
        let genres = Self::discover_genres(root)?;
        let mut dataset = Dataset::new(genres.iter().map(|(name, _)| name.clone()).collect());
        let mut report = ExtractionReport::default();

        for (label, (genre, dir)) in genres.iter().enumerate() {
            log::info!("Processing: {genre}");
            let label = u32::try_from(label).context("Trop de genres")?;
            for clip in Self::list_clips(dir)? {
                let file_report = self.process_file(&clip, genre, label, &mut dataset)?;
                report.files.push(file_report);
            }
        }

        log::info!(
            "Extraction terminée : {} segments gardés, {} rejetés, {} fichiers ignorés",
            report.kept(),
            report.dropped(),
            report.skipped()
        );
        if dataset.is_empty() {
            log::warn!("Aucun segment extrait de {}", root.display());
        }
        Ok(Extraction { dataset, report })
    }

    fn process_file(
        &self,
        path: &Path,
        genre: &str,
        label: u32,
        dataset: &mut Dataset,
    ) -> Result<FileReport> {
        let mut file_report = FileReport {
            path: path.to_path_buf(),
            genre: genre.to_string(),
            label,
            kept: 0,
            dropped: 0,
            skipped: None,
        };

        let signal = match decode::load(path, self.config.sample_rate) {
            Ok(s) => s,
            Err(e) => match self.config.on_decode_error {
                DecodeErrorPolicy::Abort => {
                    return Err(e.context(format!("Échec du décodage de {}", path.display())));
                }
                DecodeErrorPolicy::Skip => {
                    log::warn!("Fichier ignoré {} : {e:#}", path.display());
                    file_report.skipped = Some(format!("{e:#}"));
                    return Ok(file_report);
                }
            },
        };

        for (s, outcome) in self.process_signal(&signal).into_iter().enumerate() {
            match outcome {
                SegmentOutcome::Kept(matrix) => {
                    dataset.push(matrix, label);
                    file_report.kept += 1;
                    log::debug!("{}, segment:{}", path.display(), s + 1);
                }
                SegmentOutcome::Dropped { frames } => {
                    file_report.dropped += 1;
                    log::info!(
                        "{}, segment:{} rejeté ({frames} frames, attendu {})",
                        path.display(),
                        s + 1,
                        self.plan.expected_frames
                    );
                }
            }
        }
        Ok(file_report)
    }

    /// Cut `signal` into the planned segments and compute each MFCC matrix.
    ///
    /// Segments are computed in parallel; the result is in segment order.
    #[must_use]
    pub fn process_signal(&self, signal: &[f32]) -> Vec<SegmentOutcome> {
        let plan = self.plan;
        (0..plan.num_segments)
            .into_par_iter()
            .map_with(self.mfcc.clone(), |mfcc, s| {
                let range = plan.bounds(s, signal.len());
                let matrix = mfcc.compute(&signal[range]);
                if matrix.len() == plan.expected_frames {
                    SegmentOutcome::Kept(matrix)
                } else {
                    SegmentOutcome::Dropped {
                        frames: matrix.len(),
                    }
                }
            })
            .collect()
    }
}

/// Extract the dataset under `config.dataset_path` and write it to
/// `config.json_path` in one go.
///
/// # Errors
/// Returns an error if extraction fails or the JSON cannot be written.
pub fn save_mfcc(config: &ExtractConfig) -> Result<ExtractionReport> {
    let extractor = GenreExtractor::new(config.clone())?;
    let Extraction { dataset, report } = extractor.extract(&config.dataset_path)?;
    dataset.save_json(&config.json_path)?;
    Ok(report)
}
