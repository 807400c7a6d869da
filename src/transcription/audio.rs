use std::io;
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, trace};

use super::error::TranscriptionError;

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const MAX_DURATION_SECS: u32 = 30;
/// Number of samples the local engine always receives.
pub const WINDOW_SAMPLES: usize = (SAMPLE_RATE_HZ * MAX_DURATION_SECS) as usize;

/// Converts raw little-endian 16-bit mono PCM into a fixed 30 s window of
/// `f32` samples in `[-1.0, 1.0]`.
///
/// No container decoding happens here: OGG/MP3/M4A input is reinterpreted as
/// PCM and yields noise. Short input is zero padded, long input is truncated
/// without notice. A trailing odd byte is ignored.
pub fn normalize(raw: &[u8]) -> Vec<f32> {
    let mut samples = vec![0.0_f32; WINDOW_SAMPLES];
    let decoded = raw.len() / 2;

    for (slot, chunk) in samples.iter_mut().zip(raw.chunks_exact(2)) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        *slot = f32::from(sample) / 32768.0;
    }

    if decoded > WINDOW_SAMPLES {
        debug!(
            "Truncated {} PCM samples to a {}s window",
            decoded, MAX_DURATION_SECS
        );
    } else {
        trace!(
            "Zero padded {} PCM samples to {} samples",
            decoded,
            WINDOW_SAMPLES
        );
    }

    samples
}

/// Reads an audio attachment completely.
///
/// A missing file maps to `NotFound`; a short read (file shrank while being
/// read) is an I/O error.
pub async fn read_audio_file(path: &Path) -> Result<Bytes, TranscriptionError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(TranscriptionError::NotFound(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    if !metadata.is_file() {
        return Err(TranscriptionError::NotFound(path.to_path_buf()));
    }

    let data = tokio::fs::read(path).await?;
    if (data.len() as u64) < metadata.len() {
        return Err(TranscriptionError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "read {} of {} bytes from {}",
                data.len(),
                metadata.len(),
                path.display()
            ),
        )));
    }

    debug!("Read {} bytes of audio from {:?}", data.len(), path);
    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn window_is_sixteen_khz_for_thirty_seconds() {
        assert_eq!(WINDOW_SAMPLES, 480_000);
    }

    #[test]
    fn short_input_is_zero_padded() {
        let raw: Vec<u8> = (0..1500).map(|i| (i % 251) as u8 + 1).collect();
        let samples = normalize(&raw);

        assert_eq!(samples.len(), 480_000);
        for (idx, chunk) in raw.chunks_exact(2).enumerate() {
            let expected = f32::from(i16::from_le_bytes([chunk[0], chunk[1]])) / 32768.0;
            assert_eq!(samples[idx], expected);
        }
        assert!(samples[..750].iter().any(|s| *s != 0.0));
        assert!(samples[750..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn long_input_is_truncated_not_wrapped() {
        let mut values = vec![100_i16; WINDOW_SAMPLES];
        values.extend(std::iter::repeat(-200_i16).take(1000));
        let samples = normalize(&pcm(&values));

        assert_eq!(samples.len(), WINDOW_SAMPLES);
        assert!(samples.iter().all(|s| *s == 100.0 / 32768.0));
    }

    #[test]
    fn extremes_stay_in_unit_range() {
        let samples = normalize(&pcm(&[i16::MIN, i16::MAX, 0]));
        assert_eq!(samples[0], -1.0);
        assert!(samples[1] < 1.0 && samples[1] > 0.999);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn odd_trailing_byte_is_ignored() {
        let samples = normalize(&[0x00, 0x40, 0x7f]);
        assert_eq!(samples[0], 0.5);
        assert_eq!(samples[1], 0.0);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ogg");
        let err = read_audio_file(&path).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::NotFound(p) if p == path));
    }

    #[tokio::test]
    async fn reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.wav");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        let data = read_audio_file(&path).await.unwrap();
        assert_eq!(data.as_ref(), &[1, 2, 3, 4]);
    }
}
