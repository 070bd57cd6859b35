use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

use crate::engine::decoder::AudioDecoder;
use crate::error::{EngineError, Result};

pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u32,
    duration: Option<f64>,
}

impl SymphoniaDecoder {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|s| s.to_str()) {
            hint.with_extension(ext);
        }

        let meta_opts = MetadataOptions::default();
        let fmt_opts = FormatOptions::default();
        let dec_opts = DecoderOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)?;

        let reader = probed.format;

        let track = reader.tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::UnsupportedFormat("no supported audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate
            .ok_or_else(|| EngineError::UnsupportedFormat("track has no sample rate".to_string()))?;
        let channels = track.codec_params.channels.map(|c| c.count() as u32).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)?;

        let duration = track.codec_params.n_frames.map(|frames| {
            frames as f64 / sample_rate as f64
        });

        debug!(
            "Opened {}: {}Hz, {}ch, duration {:?}s",
            path_ref.display(),
            sample_rate,
            channels,
            duration
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
        })
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode_next(&mut self) -> Option<Vec<f32>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return None,
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(err) => {
                    warn!("Demux error: {}", err);
                    return None;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    if audio_buf.frames() == 0 {
                        continue;
                    }
                    let spec = *audio_buf.spec();
                    let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(audio_buf);
                    return Some(sample_buf.samples().to_vec());
                }
                Err(Error::DecodeError(err)) => {
                    // A corrupt packet is skipped; the stream continues.
                    debug!("Skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => {
                    warn!("Unexpected decoder error: {}", err);
                    return None;
                }
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u32 {
        self.channels
    }

    fn seek(&mut self, time_secs: f64) -> Result<()> {
        let result = self.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(time_secs.max(0.0)),
                track_id: Some(self.track_id),
            },
        );
        self.decoder.reset();
        result.map(|_| ()).map_err(EngineError::from)
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let v = ((i as f32 * 0.05).sin() * 12000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decodes_wav_metadata_and_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 22050, 1, 22050);

        let mut decoder = SymphoniaDecoder::new(&path).unwrap();
        assert_eq!(decoder.sample_rate(), 22050);
        assert_eq!(decoder.channels(), 1);
        assert!((decoder.duration().unwrap() - 1.0).abs() < 1e-6);

        let mut total = 0;
        while let Some(block) = decoder.decode_next() {
            total += block.len();
        }
        assert_eq!(total, 22050);
    }

    #[test]
    fn test_seek_then_decode_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8000, 2, 16000);

        let mut decoder = SymphoniaDecoder::new(&path).unwrap();
        decoder.seek(1.5).unwrap();
        let mut total = 0;
        while let Some(block) = decoder.decode_next() {
            total += block.len() / 2;
        }
        assert!(total < 8000);
        assert!(total > 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = SymphoniaDecoder::new("/nonexistent/definitely/missing.wav");
        assert!(matches!(result, Err(EngineError::Io(_))));
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, vec![0x5au8; 4096]).unwrap();
        assert!(SymphoniaDecoder::new(&path).is_err());
    }
}
