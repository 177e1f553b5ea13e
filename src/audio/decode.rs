use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_FLAC, CODEC_TYPE_NULL, CODEC_TYPE_PCM_S16LE};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{EngineError, Result};

use super::signal::{Role, Signal};

/// Reject anything but 16-bit PCM or 16-bit FLAC in one or two channels.
fn check_format(params: &CodecParameters) -> Result<(u32, u16)> {
    let sixteen_bit = match params.codec {
        CODEC_TYPE_PCM_S16LE => true,
        CODEC_TYPE_FLAC => params.bits_per_sample == Some(16),
        _ => false,
    };
    if !sixteen_bit {
        return Err(EngineError::FormatUnsupported(format!(
            "only 16-bit PCM or FLAC is supported (bits per sample: {})",
            params
                .bits_per_sample
                .map_or_else(|| "unknown".to_string(), |b| b.to_string())
        )));
    }
    let channels = params.channels.map_or(0, |c| c.count());
    if !(1..=2).contains(&channels) {
        return Err(EngineError::FormatUnsupported(format!(
            "{} channels, only mono or stereo is supported",
            channels
        )));
    }
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| EngineError::FormatUnsupported("unknown sample rate".into()))?;
    Ok((sample_rate, channels as u16))
}

/// Decode a WAV or FLAC recording into an interleaved 16-bit signal.
pub fn decode_signal(path: &Path, role: Role) -> Result<Signal> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EngineError::FormatUnsupported("no audio track".into()))?;
    let track_id = track.id;
    let (sample_rate, channels) = check_format(&track.codec_params)?;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<i16> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let signal = Signal::new(samples, sample_rate, channels, role)?.with_source(path.display().to_string());
    log::info!(
        "Decoded {}: {}Hz, {} channel(s), {:.3}s",
        path.display(),
        sample_rate,
        channels,
        signal.seconds()
    );
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, channels: u16, bits: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample((i % 100) as i32 - 50).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_stereo_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write(&path, 2, 16, 1000);

        let signal = decode_signal(&path, Role::Comparison).unwrap();
        assert_eq!(signal.sample_rate, 44100);
        assert_eq!(signal.channels, 2);
        assert_eq!(signal.role, Role::Comparison);
        assert_eq!(signal.samples.len(), 2000);
        assert_eq!(&signal.samples[..3], &[-50, -49, -48]);
    }

    #[test]
    fn rejects_24_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.wav");
        write(&path, 1, 24, 100);

        assert!(matches!(
            decode_signal(&path, Role::Reference),
            Err(EngineError::FormatUnsupported(_))
        ));
    }

    #[test]
    fn missing_file_is_io() {
        assert!(matches!(
            decode_signal(Path::new("/nonexistent/recording.wav"), Role::Reference),
            Err(EngineError::Io(_))
        ));
    }
}
