//! Channel mixing and resampling to the 16 kHz mono `f32` layout Whisper
//! expects.
//!
//! 1. [`stereo_to_mono`]: downmix interleaved channels by averaging.
//! 2. [`resample_to_16k`]: band-limited sinc resampling via `rubato`.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::AudioError;

/// Sample rate required by the Whisper engine.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

const CHUNK_SIZE: usize = 1024;

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// A trailing partial frame is dropped. `channels == 0` yields an empty
/// vector.
///
/// ```rust
/// use voice_scribe_bot::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect(),
    }
}

/// Resample mono `samples` from `source_rate` Hz to 16 000 Hz.
///
/// Already-16 kHz and empty inputs are returned unchanged. The resampler's
/// filter delay is skipped and the output holds exactly
/// `round(samples.len() * 16_000 / source_rate)` frames, aligned with the input.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Result<Vec<f32>, AudioError> {
    if source_rate == TARGET_SAMPLE_RATE || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if source_rate == 0 {
        return Err(AudioError::Resample("source sample rate is 0".into()));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = TARGET_SAMPLE_RATE as f64 / source_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, 1)
        .map_err(|e| AudioError::Resample(format!("init: {e}")))?;

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let wanted = delay + expected_len;
    let mut output = Vec::with_capacity(wanted + CHUNK_SIZE);

    // Zero chunks after the input flush the filter tail.
    let mut chunks = samples.chunks(CHUNK_SIZE);
    while output.len() < wanted {
        let mut input = chunks.next().map(<[f32]>::to_vec).unwrap_or_default();
        input.resize(CHUNK_SIZE, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        match result.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => return Err(AudioError::Resample("resampler produced no output".into())),
        }
    }

    output.drain(..delay);
    output.truncate(expected_len);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_drops_partial_frame() {
        let out = stereo_to_mono(&[0.2_f32, 0.2, 0.9], 2);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn resample_already_16k_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample_to_16k(&input, 16_000).unwrap(), input);
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample_to_16k(&[], 48_000).unwrap().is_empty());
    }

    #[test]
    fn resample_zero_rate_is_an_error() {
        assert!(matches!(
            resample_to_16k(&[0.0; 10], 0),
            Err(AudioError::Resample(_))
        ));
    }

    #[test]
    fn resample_48k_to_16k_output_length() {
        // one second @ 48 kHz → one second @ 16 kHz
        let out = resample_to_16k(&vec![0.0_f32; 48_000], 48_000).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn resample_44k1_length_is_rounded() {
        // 1000 × 16000 / 44100 = 362.8
        let out = resample_to_16k(&vec![0.0_f32; 1_000], 44_100).unwrap();
        assert_eq!(out.len(), 363);
    }

    #[test]
    fn resample_keeps_events_in_place() {
        // 10 ms burst centred at 0.505 s
        let mut input = vec![0.0_f32; 48_000];
        input[24_000..24_480].fill(1.0);

        let out = resample_to_16k(&input, 48_000).unwrap();
        let energy: f64 = out.iter().map(|&x| (x * x) as f64).sum();
        let centroid: f64 = out
            .iter()
            .enumerate()
            .map(|(i, &x)| i as f64 * (x * x) as f64)
            .sum::<f64>()
            / energy;

        assert!((centroid - 8_080.0).abs() < 10.0, "centroid {centroid}");
    }

    #[test]
    fn resample_keeps_the_tail() {
        let mut input = vec![0.0_f32; 48_000];
        input[47_520..].fill(1.0);

        let out = resample_to_16k(&input, 48_000).unwrap();
        let tail: f32 = out[15_900..15_950].iter().sum::<f32>() / 50.0;
        assert!(tail > 0.5, "tail mean {tail}");
    }

    #[test]
    fn resample_8k_to_16k_never_exceeds_expected_length() {
        let out = resample_to_16k(&vec![0.0_f32; 8_000], 8_000).unwrap();
        assert!(out.len() <= 16_000);
        assert!(out.len() > 15_000, "got {}", out.len());
    }
}
