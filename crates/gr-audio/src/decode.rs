use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;

/// Extensions audio reconnues lors du parcours des dossiers de genres.
pub const AUDIO_EXTS: &[&str] = &[
    "wav", "wave", "au", "aif", "aiff", "mp3", "flac", "ogg", "oga", "m4a", "aac", "mp4", "mkv",
    "webm",
];

/// `true` if `path` carries one of the [`AUDIO_EXTS`] extensions (case-insensitive).
///
/// # Example
/// ```
/// use gr_audio::decode::is_audio_file;
/// use std::path::Path;
/// assert!(is_audio_file(Path::new("blues.00000.WAV")));
/// assert!(!is_audio_file(Path::new("notes.txt")));
/// assert!(!is_audio_file(Path::new("README")));
/// ```
#[must_use]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| AUDIO_EXTS.contains(&ext.to_lowercase().as_str()))
}

/// Decode an audio file and return mono samples at `target_rate`.
///
/// Channels are averaged, then the signal is resampled if the file's native
/// rate differs from `target_rate`.
///
/// # Errors
/// Returns an error if the file cannot be opened, probed, decoded, or resampled.
///
/// # Example
/// ```no_run
/// use gr_audio::decode::load;
/// let samples = load(std::path::Path::new("blues.00000.wav"), 22050).unwrap();
/// ```
pub fn load(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let (samples, native_rate) = decode_file(path)?;
    if native_rate == target_rate {
        return Ok(samples);
    }
    let resampled = resample(&samples, native_rate, target_rate)
        .with_context(|| format!("Resampling failed for {}", path.display()))?;
    log::debug!(
        "Resampled {} ({}Hz -> {}Hz): {} -> {} samples",
        path.display(),
        native_rate,
        target_rate,
        samples.len(),
        resampled.len()
    );
    Ok(resampled)
}

/// Decode an audio file into mono f32 samples at its native rate.
///
/// Supports WAV, MP3, FLAC, OGG, AAC via symphonia.
///
/// # Errors
/// Returns an error if the file cannot be opened or decoded, including when
/// every packet of the track fails to decode.
pub fn decode_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file =
        File::open(path).with_context(|| format!("Cannot open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(
        Box::new(file),
        symphonia::core::io::MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::UnsupportedFormat(format!("{}: {e}", path.display())))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::NoTrack(path.display().to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::UnsupportedFormat(format!("{}: sample rate inconnu", path.display())))?;
    let channels = track
        .codec_params
        .channels
        .map_or(1, symphonia::core::audio::Channels::count);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::UnsupportedFormat(format!("{}: {e}", path.display())))?;

    let track_id = track.id;
    let mut all_samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut max_sample_frames: usize = 0;
    let mut frame_errors: usize = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AudioError::DecodeError(format!("{}: {e}", path.display())).into());
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Trame corrompue isolée : on la saute, comme le ferait un lecteur.
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Audio decode frame error in {}: {e}", path.display());
                frame_errors += 1;
                continue;
            }
            Err(e) => {
                return Err(AudioError::DecodeError(format!("{}: {e}", path.display())).into());
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.capacity();
        // Reuse SampleBuffer: only reallocate if this packet is bigger than current capacity
        if sample_buf.is_none() || num_frames > max_sample_frames {
            sample_buf = Some(SampleBuffer::<f32>::new(num_frames as u64, spec));
            max_sample_frames = num_frames;
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        // Downmix to mono
        let channel_count = spec.channels.count().max(1);
        all_samples.extend(
            buf.samples()
                .chunks(channel_count)
                .map(|chunk| chunk.iter().sum::<f32>() / channel_count as f32),
        );
    }

    check_decoded(path, all_samples.len(), frame_errors)?;

    log::debug!(
        "Decoded {} samples @ {}Hz ({} channel(s)) from {}",
        all_samples.len(),
        sample_rate,
        channels,
        path.display()
    );

    Ok((all_samples, sample_rate))
}

/// Aucune trame lisible : le fichier est indécodable, pas silencieux.
fn check_decoded(path: &Path, decoded: usize, frame_errors: usize) -> Result<(), AudioError> {
    if decoded == 0 && frame_errors > 0 {
        return Err(AudioError::DecodeError(format!(
            "{}: aucune trame décodable ({frame_errors} erreurs)",
            path.display()
        )));
    }
    Ok(())
}

/// Resample a mono signal from `from_rate` to `to_rate`.
///
/// Single pass of a rubato `SincFixedIn` over the whole buffer, flushed with
/// empty partial chunks. The filter delay is dropped from the head and the
/// output trimmed to `ceil(len * to_rate / from_rate)` samples.
///
/// # Errors
/// Returns an error if either rate is zero or the resampler fails.
///
/// # Example
/// ```
/// use gr_audio::decode::resample;
/// let same = resample(&[0.1, 0.2, 0.3], 22050, 22050).unwrap();
/// assert_eq!(same, vec![0.1, 0.2, 0.3]);
/// let half = resample(&[0.0; 1001], 44100, 22050).unwrap();
/// assert_eq!(half.len(), 501);
/// ```
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::ResampleError(format!("taux invalide {from_rate} -> {to_rate}")).into());
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .map_err(|e| AudioError::ResampleError(e.to_string()))?;
    let delay = resampler.output_delay();

    let input = vec![samples.to_vec()];
    let mut mono = resampler
        .process(&input, None)
        .map_err(|e| AudioError::ResampleError(e.to_string()))?
        .pop()
        .unwrap_or_default();

    // Vidange de la queue retenue par le filtre sinc.
    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    while mono.len() < delay + expected {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::ResampleError(e.to_string()))?
            .pop()
            .unwrap_or_default();
        if tail.is_empty() {
            break;
        }
        mono.extend(tail);
    }

    let mut aligned = mono.split_off(delay.min(mono.len()));
    aligned.resize(expected, 0.0);
    Ok(aligned)
}
