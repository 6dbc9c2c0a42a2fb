use std::io::Cursor;

use thiserror::Error;

/// Decoded audio ready for the output device: interleaved 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl PcmAudio {
    /// Playback duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed wav buffer: {0}")]
    Malformed(#[from] hound::Error),

    #[error("decoded audio does not contain channel data")]
    NoChannelData,
}

/// Decode a concatenated WAV byte buffer into interleaved 16-bit PCM.
///
/// Integer sources wider than 16 bits are shifted down; float sources are
/// clamped to [-1.0, 1.0] and rescaled.
pub fn decode_wav(bytes: &[u8]) -> Result<PcmAudio, DecodeError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(DecodeError::NoChannelData);
    }

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
            reader.samples::<i16>().collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample - 16;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<_, _>>()?,
    };

    if samples.is_empty() {
        return Err(DecodeError::NoChannelData);
    }

    Ok(PcmAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_i16(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_pcm16() {
        let bytes = wav_i16(22_050, 1, &[0, 1000, -1000, i16::MAX]);
        let audio = decode_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples, vec![0, 1000, -1000, i16::MAX]);
    }

    #[test]
    fn decodes_float_samples() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.0f32, 0.5, -0.5, 2.0] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let audio = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples.len(), 4);
        // out-of-range floats are clamped, not wrapped
        assert_eq!(audio.samples[3], i16::MAX);
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(matches!(
            decode_wav(b"definitely not a riff header"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_wav_without_samples() {
        let bytes = wav_i16(22_050, 1, &[]);
        assert!(matches!(
            decode_wav(&bytes),
            Err(DecodeError::NoChannelData)
        ));
    }

    #[test]
    fn duration_accounts_for_channel_count() {
        let audio = PcmAudio {
            sample_rate: 1000,
            channels: 2,
            samples: vec![0; 4000],
        };
        assert_eq!(audio.duration_ms(), 2000);
    }
}
