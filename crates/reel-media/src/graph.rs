//! Typed filter-graph description.
//!
//! Graphs are assembled from [`Filter`] values carrying numeric fields and
//! rendered to ffmpeg's `-filter_complex` syntax only at the end, after
//! [`FilterGraph::validate`] has checked label wiring.

use std::collections::HashSet;
use std::fmt;

use reel_models::FrameSize;

use crate::error::{MediaError, MediaResult};

/// Kind of an input stream selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}

/// A pad in the graph: either a stream of an ffmpeg input or a named
/// intermediate label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamLabel {
    Input { index: usize, kind: StreamKind },
    Named(String),
}

impl StreamLabel {
    pub fn video(index: usize) -> Self {
        StreamLabel::Input {
            index,
            kind: StreamKind::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        StreamLabel::Input {
            index,
            kind: StreamKind::Audio,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        StreamLabel::Named(name.into())
    }

    /// Form accepted by `-map`: `[outv]` for labels, `1:a` for inputs.
    pub fn map_arg(&self) -> String {
        match self {
            StreamLabel::Input { index, kind } => format!("{}:{}", index, kind.as_str()),
            StreamLabel::Named(name) => format!("[{}]", name),
        }
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamLabel::Input { index, kind } => write!(f, "[{}:{}]", index, kind.as_str()),
            StreamLabel::Named(name) => write!(f, "[{}]", name),
        }
    }
}

/// Fade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeKind {
    In,
    Out,
}

/// A single filter with typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Fit inside the frame, preserving aspect ratio
    ScaleFit { width: u32, height: u32 },
    /// Exact scale; `-2` keeps aspect with an even dimension
    Scale { width: i32, height: i32 },
    /// Center the input on a canvas of the given size
    PadCenter { width: u32, height: u32 },
    /// Square sample aspect ratio
    SetSar,
    Format(String),
    Fps(u32),
    /// Continuous zoom towards `max_zoom`, panned by the x/y expressions
    ZoomPan {
        zoom_increment: f64,
        max_zoom: f64,
        x: String,
        y: String,
        frames: u32,
        size: FrameSize,
        fps: u32,
    },
    Trim { duration_secs: f64 },
    /// Reset timestamps to start at zero
    SetPts,
    Fade {
        kind: FadeKind,
        start_secs: f64,
        duration_secs: f64,
    },
    Concat { segments: usize },
    VStack { inputs: usize },
    HStack { inputs: usize },
    Overlay { x: u32, y: u32 },
}

fn secs(value: f64) -> String {
    format!("{:.3}", value.max(0.0))
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::ScaleFit { width, height } => {
                write!(f, "scale={}:{}:force_original_aspect_ratio=decrease", width, height)
            }
            Filter::Scale { width, height } => write!(f, "scale={}:{}", width, height),
            Filter::PadCenter { width, height } => {
                write!(f, "pad={}:{}:(ow-iw)/2:(oh-ih)/2", width, height)
            }
            Filter::SetSar => write!(f, "setsar=1"),
            Filter::Format(pix_fmt) => write!(f, "format={}", pix_fmt),
            Filter::Fps(fps) => write!(f, "fps={}", fps),
            Filter::ZoomPan {
                zoom_increment,
                max_zoom,
                x,
                y,
                frames,
                size,
                fps,
            } => write!(
                f,
                "zoompan=z='min(zoom+{},{})':x='{}':y='{}':d={}:s={}:fps={}",
                zoom_increment, max_zoom, x, y, frames, size, fps
            ),
            Filter::Trim { duration_secs } => write!(f, "trim=duration={}", secs(*duration_secs)),
            Filter::SetPts => write!(f, "setpts=PTS-STARTPTS"),
            Filter::Fade {
                kind,
                start_secs,
                duration_secs,
            } => {
                let t = match kind {
                    FadeKind::In => "in",
                    FadeKind::Out => "out",
                };
                write!(f, "fade=t={}:st={}:d={}", t, secs(*start_secs), secs(*duration_secs))
            }
            Filter::Concat { segments } => write!(f, "concat=n={}:v=1:a=0", segments),
            Filter::VStack { inputs } => write!(f, "vstack=inputs={}", inputs),
            Filter::HStack { inputs } => write!(f, "hstack=inputs={}", inputs),
            Filter::Overlay { x, y } => write!(f, "overlay={}:{}", x, y),
        }
    }
}

/// Aspect-preserving scale into `frame` followed by a centered pad.
pub fn scale_pad(frame: FrameSize) -> Vec<Filter> {
    vec![
        Filter::ScaleFit {
            width: frame.width,
            height: frame.height,
        },
        Filter::PadCenter {
            width: frame.width,
            height: frame.height,
        },
        Filter::SetSar,
    ]
}

/// `[in]f1,f2,...[out]`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    pub inputs: Vec<StreamLabel>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<StreamLabel>,
}

impl FilterChain {
    pub fn new(inputs: Vec<StreamLabel>, filters: Vec<Filter>, output: StreamLabel) -> Self {
        Self {
            inputs,
            filters,
            outputs: vec![output],
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for input in &self.inputs {
            out.push_str(&input.to_string());
        }
        let filters: Vec<String> = self.filters.iter().map(|f| f.to_string()).collect();
        out.push_str(&filters.join(","));
        for output in &self.outputs {
            out.push_str(&output.to_string());
        }
        out
    }
}

/// Ordered list of chains forming one `-filter_complex`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) -> &mut Self {
        self.chains.push(chain);
        self
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    /// Named labels produced by any chain, in order.
    pub fn produced_labels(&self) -> Vec<&str> {
        self.chains
            .iter()
            .flat_map(|c| c.outputs.iter())
            .filter_map(|l| match l {
                StreamLabel::Named(name) => Some(name.as_str()),
                StreamLabel::Input { .. } => None,
            })
            .collect()
    }

    /// Check label wiring against `input_count` ffmpeg inputs and return the
    /// single terminal label.
    ///
    /// Every named input must be produced by an earlier chain and consumed
    /// once, no label may be produced twice, and exactly one produced label
    /// may remain unconsumed.
    pub fn validate(&self, input_count: usize) -> MediaResult<StreamLabel> {
        if self.chains.is_empty() {
            return Err(MediaError::invalid_graph("graph has no chains"));
        }

        let mut produced: HashSet<&str> = HashSet::new();
        let mut consumed: HashSet<&str> = HashSet::new();
        let mut order: Vec<&str> = Vec::new();

        for (i, chain) in self.chains.iter().enumerate() {
            if chain.filters.is_empty() {
                return Err(MediaError::invalid_graph(format!("chain {} has no filters", i)));
            }
            for input in &chain.inputs {
                match input {
                    StreamLabel::Input { index, .. } => {
                        if *index >= input_count {
                            return Err(MediaError::invalid_graph(format!(
                                "chain {} reads input {} but only {} inputs exist",
                                i, index, input_count
                            )));
                        }
                    }
                    StreamLabel::Named(name) => {
                        if !produced.contains(name.as_str()) {
                            return Err(MediaError::invalid_graph(format!(
                                "label [{}] consumed before it is produced",
                                name
                            )));
                        }
                        if !consumed.insert(name.as_str()) {
                            return Err(MediaError::invalid_graph(format!(
                                "label [{}] consumed twice",
                                name
                            )));
                        }
                    }
                }
            }
            for output in &chain.outputs {
                match output {
                    StreamLabel::Named(name) => {
                        if !produced.insert(name.as_str()) {
                            return Err(MediaError::invalid_graph(format!(
                                "label [{}] produced twice",
                                name
                            )));
                        }
                        order.push(name.as_str());
                    }
                    StreamLabel::Input { .. } => {
                        return Err(MediaError::invalid_graph(format!(
                            "chain {} writes to an input stream",
                            i
                        )));
                    }
                }
            }
        }

        let terminals: Vec<&str> = order.into_iter().filter(|l| !consumed.contains(l)).collect();
        match terminals.as_slice() {
            [only] => Ok(StreamLabel::named(*only)),
            [] => Err(MediaError::invalid_graph("graph has no output label")),
            many => Err(MediaError::invalid_graph(format!(
                "graph has {} unconsumed labels: {}",
                many.len(),
                many.join(", ")
            ))),
        }
    }

    /// Render to `-filter_complex` syntax.
    pub fn render(&self) -> String {
        self.chains
            .iter()
            .map(FilterChain::render)
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
