#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for slideshow composition.
//!
//! This crate provides:
//! - Process runner for ffmpeg/ffprobe with captured output and progress parsing
//! - Type-safe FFmpeg command building
//! - A typed filter-graph description with validation
//! - Scene timing: aligning narration words to image scenes
//! - Tiered render strategies for slideshows and split-screen merges

pub mod alignment;
pub mod command;
pub mod error;
pub mod graph;
pub mod merge;
pub mod probe;
pub mod progress;
pub mod slideshow;
pub mod tiers;

pub use alignment::{align, attach_image_urls, display_durations};
pub use command::{
    check_ffmpeg, check_ffprobe, run_ffmpeg, FfmpegCommand, FilterArg, InputSpec, ProcessOutput,
    ProcessRunner, SystemRunner,
};
pub use error::{MediaError, MediaResult};
pub use graph::{Filter, FilterChain, FilterGraph, StreamLabel};
pub use merge::{Corner, MergeJob, MergeLayout, PrimaryMerge, RawStackMerge};
pub use probe::{probe, MediaInfo};
pub use progress::FfmpegProgress;
pub use slideshow::{
    build_enhanced_graph, BasicSlideshow, EnhancedSlideshow, KenBurnsDirection, SlideshowJob,
    SlideshowOptions,
};
pub use tiers::{RenderTier, TierChain, TierFailure, TierOutcome};
