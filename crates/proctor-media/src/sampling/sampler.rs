//! Fixed-rate frame sampling with position-derived timestamps.

use metrics::counter;
use tracing::{debug, warn};

use super::frame::Frame;
use super::source::FrameSource;
use crate::error::{MediaError, MediaResult};

/// Sampling configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Sampled frames per second of video
    pub target_rate: f64,
    /// Rate assumed when the source cannot report one
    pub default_fps: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_rate: 2.0,
            default_fps: 30.0,
        }
    }
}

impl SamplerConfig {
    pub fn with_target_rate(mut self, rate: f64) -> Self {
        self.target_rate = rate;
        self
    }

    pub fn with_default_fps(mut self, fps: f64) -> Self {
        self.default_fps = fps;
        self
    }

    pub fn validate(&self) -> MediaResult<()> {
        if !self.target_rate.is_finite() || self.target_rate <= 0.0 {
            return Err(MediaError::invalid_config(format!(
                "target_rate must be positive, got {}",
                self.target_rate
            )));
        }
        if !self.default_fps.is_finite() || self.default_fps <= 0.0 {
            return Err(MediaError::invalid_config(format!(
                "default_fps must be positive, got {}",
                self.default_fps
            )));
        }
        Ok(())
    }
}

/// Number of decoded frames between two samples.
///
/// Halfway cases round to even, so 25 fps at 2 samples/s gives 12.
pub fn frame_interval(fps: f64, target_rate: f64) -> u64 {
    let raw = (fps / target_rate).round_ties_even();
    if raw.is_finite() && raw >= 1.0 {
        raw as u64
    } else {
        1
    }
}

/// Timestamp of a decoded frame: its position divided by the frame rate.
pub fn timestamp_for(index: u64, fps: f64) -> f64 {
    index as f64 / fps
}

/// Yields every `interval`-th decoded frame of a source.
///
/// The sequence is lazy and cannot be restarted; once `next` returns
/// `Ok(None)` the stream is exhausted.
pub struct FrameSampler<S: FrameSource> {
    source: S,
    fps: f64,
    fps_was_estimated: bool,
    interval: u64,
    frames_decoded: u64,
    frames_emitted: u64,
    exhausted: bool,
}

impl<S: FrameSource> FrameSampler<S> {
    pub fn new(source: S, config: &SamplerConfig) -> MediaResult<Self> {
        config.validate()?;

        let (fps, fps_was_estimated) = match source.fps().filter(|f| f.is_finite() && *f > 0.0) {
            Some(fps) => (fps, false),
            None => {
                warn!(
                    source = source.name(),
                    default_fps = config.default_fps,
                    "Frame rate unavailable, using default"
                );
                (config.default_fps, true)
            }
        };

        let interval = frame_interval(fps, config.target_rate);
        debug!(
            source = source.name(),
            fps,
            target_rate = config.target_rate,
            interval,
            "Frame sampler ready"
        );

        Ok(Self {
            source,
            fps,
            fps_was_estimated,
            interval,
            frames_decoded: 0,
            frames_emitted: 0,
            exhausted: false,
        })
    }

    /// Next sampled frame, `Ok(None)` once the source is exhausted.
    pub async fn next(&mut self) -> MediaResult<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }

        loop {
            let Some(raw) = self.source.next_frame().await? else {
                self.exhausted = true;
                return Ok(None);
            };
            self.frames_decoded += 1;

            if raw.index % self.interval != 0 {
                continue;
            }

            self.frames_emitted += 1;
            counter!("proctor_frames_sampled_total").increment(1);
            let timestamp = timestamp_for(raw.index, self.fps);
            return Ok(Some(Frame::new(raw.index, timestamp, raw.image)));
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// True when the source reported no usable rate and the default was used.
    pub fn fps_was_estimated(&self) -> bool {
        self.fps_was_estimated
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Duration covered by the decoded frames.
    pub fn observed_duration(&self) -> f64 {
        self.frames_decoded as f64 / self.fps
    }

    /// Duration reported by the source container, if any.
    pub fn reported_duration(&self) -> Option<f64> {
        self.source.duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::MemoryFrameSource;
    use image::RgbImage;

    async fn collect_timestamps<S: FrameSource>(sampler: &mut FrameSampler<S>) -> Vec<(u64, f64)> {
        let mut out = Vec::new();
        while let Some(frame) = sampler.next().await.unwrap() {
            out.push((frame.index, frame.timestamp_seconds));
        }
        out
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(30.0, 2.0), 15);
        assert_eq!(frame_interval(25.0, 2.0), 12);
        assert_eq!(frame_interval(29.97, 2.0), 15);
        assert_eq!(frame_interval(1.0, 2.0), 1);
        assert_eq!(frame_interval(f64::NAN, 2.0), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        assert!(SamplerConfig::default().with_target_rate(0.0).validate().is_err());
        assert!(SamplerConfig::default().with_default_fps(f64::NAN).validate().is_err());
    }

    #[tokio::test]
    async fn test_timestamps_stay_inside_duration_at_30fps() {
        let source = MemoryFrameSource::repeat(Some(30.0), 1590, RgbImage::new(2, 2));
        let mut sampler = FrameSampler::new(source, &SamplerConfig::default()).unwrap();
        let stamps = collect_timestamps(&mut sampler).await;

        assert_eq!(stamps.len(), 106);
        assert!(stamps.iter().all(|(_, t)| *t < 53.0));
        assert_eq!(stamps[1], (15, 0.5));
        assert_eq!(sampler.frames_decoded(), 1590);
        assert!((sampler.observed_duration() - 53.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_timestamps_use_decoded_position_at_25fps() {
        // 60 s at 25 fps
        let total = 1500;
        let source = MemoryFrameSource::repeat(Some(25.0), total, RgbImage::new(2, 2));
        let mut sampler = FrameSampler::new(source, &SamplerConfig::default()).unwrap();
        assert_eq!(sampler.interval(), 12);

        let stamps = collect_timestamps(&mut sampler).await;
        let duration = total as f64 / 25.0;
        assert!(stamps.iter().all(|(_, t)| *t < duration));
        assert_eq!(stamps[1].1, 12.0 / 25.0);

        // Counting samples at the nominal rate would run past the end.
        assert!(stamps.len() as f64 * 0.5 > duration);
    }

    #[tokio::test]
    async fn test_missing_fps_uses_default() {
        let source = MemoryFrameSource::repeat(None, 31, RgbImage::new(2, 2));
        let mut sampler = FrameSampler::new(source, &SamplerConfig::default()).unwrap();
        assert!(sampler.fps_was_estimated());
        assert_eq!(sampler.fps(), 30.0);

        let stamps = collect_timestamps(&mut sampler).await;
        assert_eq!(stamps, vec![(0, 0.0), (15, 0.5), (30, 1.0)]);
    }

    #[tokio::test]
    async fn test_decode_error_is_not_end_of_stream() {
        let source =
            MemoryFrameSource::repeat(Some(30.0), 100, RgbImage::new(2, 2)).with_failure_at(40);
        let mut sampler = FrameSampler::new(source, &SamplerConfig::default()).unwrap();

        let mut result = Ok(None);
        for _ in 0..10 {
            result = sampler.next().await;
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(MediaError::DecodeFailed { .. })));
        assert!(!sampler.is_exhausted());
    }

    #[test]
    fn test_not_restartable() {
        let source = MemoryFrameSource::repeat(Some(2.0), 2, RgbImage::new(2, 2));
        let mut sampler = FrameSampler::new(source, &SamplerConfig::default()).unwrap();
        tokio_test::block_on(async {
            assert!(sampler.next().await.unwrap().is_some());
            assert!(sampler.next().await.unwrap().is_some());
            assert!(sampler.next().await.unwrap().is_none());
            assert!(sampler.next().await.unwrap().is_none());
        });
    }
}
