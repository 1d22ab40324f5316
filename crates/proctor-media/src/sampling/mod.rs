//! Frame decoding and sampling.

mod frame;
mod sampler;
mod source;

pub use frame::{Frame, RawFrame};
pub use sampler::{frame_interval, timestamp_for, FrameSampler, SamplerConfig};
pub use source::{
    analysis_dimensions, FfmpegFrameSource, FfmpegSourceConfig, FrameSource, MemoryFrameSource,
};
