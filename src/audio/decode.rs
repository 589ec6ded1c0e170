//! Container/codec decoding with `symphonia`.
//!
//! Produces 16 kHz mono PCM from whatever the user uploaded (MP3, OGG/Vorbis,
//! FLAC, WAV, AAC/M4A).

use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resample::{resample_to_16k, stereo_to_mono, TARGET_SAMPLE_RATE};
use super::AudioError;

/// Read and decode the file at `path` to 16 kHz mono `f32`.
///
/// The file extension, when present, is passed to the prober as a hint.
pub fn decode_file_to_pcm(path: &Path) -> Result<Vec<f32>, AudioError> {
    let data = std::fs::read(path).map_err(|e| AudioError::Io(format!("{}: {e}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_to_pcm(data, extension)
}

/// Decode an in-memory audio blob to 16 kHz mono `f32`.
pub fn decode_to_pcm(data: Vec<u8>, extension: Option<&str>) -> Result<Vec<f32>, AudioError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(format!("probe: {e}")))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::Decode("no audio track found".into()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Decode("unknown sample rate".into()))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Unsupported(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(AudioError::Decode(format!("packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("audio: skipping corrupt frame: {e}");
                continue;
            }
            Err(e) => return Err(AudioError::Decode(format!("decode: {e}"))),
        };

        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(frames as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    let mono = stereo_to_mono(&interleaved, channels);
    if mono.is_empty() {
        return Err(AudioError::Decode("no audio samples decoded".into()));
    }

    let pcm = resample_to_16k(&mono, source_rate)?;

    log::debug!(
        "audio: decoded {} samples ({:.1} s @ {} Hz, {} ch source)",
        pcm.len(),
        pcm.len() as f32 / TARGET_SAMPLE_RATE as f32,
        source_rate,
        channels
    );

    Ok(pcm)
}
