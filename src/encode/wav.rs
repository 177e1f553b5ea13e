use std::path::{Path, PathBuf};

use crate::audio::analysis::{Chunk, ChunkSink, ChunkStage};
use crate::audio::signal::Signal;
use crate::error::Result;

fn spec(sample_rate: u32, channels: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write interleaved 16-bit samples to a WAV file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let mut writer = hound::WavWriter::create(path, spec(sample_rate, channels))?;
    let mut samples_writer = writer.get_i16_writer(samples.len() as u32);
    for &sample in samples {
        samples_writer.write_sample(sample);
    }
    samples_writer.flush()?;
    writer.finalize()?;
    Ok(())
}

pub fn write_signal(path: &Path, signal: &Signal) -> Result<()> {
    write_wav(path, &signal.samples, signal.sample_rate, signal.channels)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// `<dir>/<stem>_<label>.wav` for a recording's filtered output.
pub fn output_path(dir: &Path, source: &Path, label: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "signal".to_string());
    dir.join(format!("{}_{}.wav", stem, label))
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Writes every exported block to its own WAV file in `dir`.
pub struct WavChunkWriter {
    dir: PathBuf,
    prefix: String,
    written: usize,
}

impl WavChunkWriter {
    pub fn new(dir: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: file_safe(prefix),
            written: 0,
        })
    }

    pub fn path_for(&self, chunk: &Chunk<'_>) -> PathBuf {
        let stage = match chunk.stage {
            ChunkStage::Source => "source",
            ChunkStage::Processed => "processed",
        };
        self.dir.join(format!(
            "{}_{:03}_{}_{}_{}.wav",
            self.prefix,
            chunk.entry,
            file_safe(chunk.name),
            chunk.sub_index,
            stage
        ))
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl ChunkSink for WavChunkWriter {
    fn write_chunk(&mut self, chunk: &Chunk<'_>) -> Result<()> {
        let path = self.path_for(chunk);
        write_wav(&path, chunk.samples, chunk.sample_rate, chunk.channels)?;
        log::debug!("Wrote chunk {}", path.display());
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signal::Role;

    #[test]
    fn signal_round_trips_through_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<i16> = (0..200).map(|i| (i * 97 % 4000 - 2000) as i16).collect();
        let signal = Signal::new(samples.clone(), 48000, 2, Role::Reference).unwrap();

        write_signal(&path, &signal).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec(), spec(48000, 2));
        let loaded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(loaded, samples);
    }

    #[test]
    fn chunks_get_one_file_each() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        let mut writer = WavChunkWriter::new(&chunks, "take 1").unwrap();
        let samples = [1i16, -1, 2, -2];

        for stage in [ChunkStage::Source, ChunkStage::Processed] {
            writer
                .write_chunk(&Chunk {
                    entry: 7,
                    name: "Square 50%",
                    sub_index: 2,
                    stage,
                    source_offset: 0,
                    sample_rate: 44100,
                    channels: 1,
                    samples: &samples,
                })
                .unwrap();
        }

        assert_eq!(writer.written(), 2);
        assert!(chunks.join("take_1_007_Square_50__2_source.wav").exists());
        let processed = chunks.join("take_1_007_Square_50__2_processed.wav");
        let reader = hound::WavReader::open(processed).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn output_names_follow_the_source() {
        let path = output_path(Path::new("/tmp/out"), Path::new("/data/model1.flac"), "used");
        assert_eq!(path, PathBuf::from("/tmp/out/model1_used.wav"));
    }
}
