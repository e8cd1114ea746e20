//! KeyframeSelector - the shot-change state machine
//!
//! The selector walks sampled frames in source order and keeps exactly one
//! piece of state: the fingerprint of the most recently *accepted* frame.
//! Each candidate is compared against that reference; a candidate that is
//! different enough and sharp enough is accepted and becomes the new
//! reference. Rejected candidates never touch the reference, so a blurry
//! transition frame cannot hide the shot change that follows it.

use tracing::{debug, instrument, trace, warn};
use crate::{
    common::{FrameTimecode, KeyframeError, Result},
    fingerprint::Fingerprint,
    frame::Frame,
    params::SelectionParameters,
    sharpness,
};

/// Why a candidate was accepted or rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// First accepted frame of the run
    FirstFrame,
    /// Different enough from the reference and sharp enough
    SceneChange,
    /// Not different enough from the reference
    TooSimilar,
    /// Below the blur threshold
    TooBlurry,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::FirstFrame => "first-frame",
            DecisionReason::SceneChange => "scene-change",
            DecisionReason::TooSimilar => "too-similar",
            DecisionReason::TooBlurry => "too-blurry",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one candidate frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub accept: bool,
    pub reason: DecisionReason,
    /// Change score against the reference, absent for the first candidate
    pub score: Option<f64>,
    /// Laplacian variance, present whenever the blur filter ran
    pub sharpness: Option<f64>,
}

impl Decision {
    fn accepted(reason: DecisionReason, score: Option<f64>, sharpness: Option<f64>) -> Self {
        Self { accept: true, reason, score, sharpness }
    }

    fn rejected(reason: DecisionReason, score: Option<f64>, sharpness: Option<f64>) -> Self {
        Self { accept: false, reason, score, sharpness }
    }
}

/// Fingerprint of the most recently accepted frame
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceState {
    fingerprint: Fingerprint,
    timecode: FrameTimecode,
}

impl ReferenceState {
    pub fn new(fingerprint: Fingerprint, timecode: FrameTimecode) -> Self {
        Self { fingerprint, timecode }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Source position of the frame this reference was taken from
    pub fn timecode(&self) -> FrameTimecode {
        self.timecode
    }
}

/// A frame the selector kept
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedFrame {
    pub frame: Frame,
    pub reason: DecisionReason,
    pub score: Option<f64>,
    pub sharpness: Option<f64>,
}

impl AcceptedFrame {
    pub fn timecode(&self) -> FrameTimecode {
        self.frame.timecode()
    }
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionStats {
    /// Frames offered to the selector, sampled or not
    pub frames_seen: u64,
    /// Candidates actually evaluated
    pub sampled: u64,
    pub accepted: u64,
    pub too_similar: u64,
    pub too_blurry: u64,
    /// Degenerate or repeated frames skipped without evaluation
    pub skipped: u64,
}

/// Stateful keyframe selection over one video
pub struct KeyframeSelector {
    params: SelectionParameters,
    reference: Option<ReferenceState>,
    stride: Option<u64>,
    last_processed: Option<u64>,
    stats: SelectionStats,
}

impl KeyframeSelector {
    /// Create a selector for one run
    ///
    /// # Errors
    /// * `InvalidConfig` - If the parameters fail validation
    #[instrument]
    pub fn new(params: SelectionParameters) -> Result<Self> {
        params.validate()?;

        debug!(
            strategy = params.strategy.name(),
            threshold = params.similarity_threshold,
            blur_threshold = ?params.blur_threshold,
            "Created KeyframeSelector"
        );

        Ok(Self {
            params,
            reference: None,
            stride: None,
            last_processed: None,
            stats: SelectionStats::default(),
        })
    }

    /// Evaluate one sampled candidate
    ///
    /// Sampling is not applied here; use [`push`](Self::push) or
    /// [`run`](Self::run) to evaluate only every Nth frame.
    ///
    /// # Errors
    /// * `DegenerateFrame` / `DuplicateFrame` - Recoverable; the frame is skipped
    /// * `OutOfOrder` - The frame precedes one already processed
    /// * `ShapeMismatch` - The candidate cannot be compared with the reference
    #[instrument(skip(self, frame), fields(frame = frame.frame_number()))]
    pub fn evaluate(&mut self, frame: &Frame) -> Result<Decision> {
        let frame_number = frame.frame_number();

        if let Some(previous) = self.last_processed {
            if frame_number < previous {
                return Err(KeyframeError::OutOfOrder { frame: frame_number, previous });
            }
            if frame_number == previous {
                self.stats.skipped += 1;
                return Err(KeyframeError::DuplicateFrame { frame: frame_number });
            }
        }

        if frame.is_degenerate() {
            self.stats.skipped += 1;
            return Err(KeyframeError::DegenerateFrame {
                frame: frame_number,
                width: frame.width(),
                height: frame.height(),
            });
        }

        let gray = frame.to_gray();
        let fingerprint = self.params.strategy.extract_gray(&gray);
        let sharpness_of = || sharpness::laplacian_variance(&gray);

        let decision = match &self.reference {
            None => {
                if self.params.force_first_frame {
                    Decision::accepted(DecisionReason::FirstFrame, None, None)
                } else {
                    match self.params.blur_threshold {
                        Some(min) => {
                            let sharpness = sharpness_of();
                            if sharpness >= min {
                                Decision::accepted(DecisionReason::FirstFrame, None, Some(sharpness))
                            } else {
                                Decision::rejected(DecisionReason::TooBlurry, None, Some(sharpness))
                            }
                        }
                        None => Decision::accepted(DecisionReason::FirstFrame, None, None),
                    }
                }
            }
            Some(reference) => {
                let score = self.params.strategy.score(&reference.fingerprint, &fingerprint)?;
                trace!(score, reference = reference.timecode.frame_number(), "Compared with reference");

                if !self.params.strategy.is_new_shot(score, self.params.similarity_threshold) {
                    Decision::rejected(DecisionReason::TooSimilar, Some(score), None)
                } else {
                    match self.params.blur_threshold {
                        Some(min) => {
                            let sharpness = sharpness_of();
                            if sharpness >= min {
                                Decision::accepted(DecisionReason::SceneChange, Some(score), Some(sharpness))
                            } else {
                                Decision::rejected(DecisionReason::TooBlurry, Some(score), Some(sharpness))
                            }
                        }
                        None => Decision::accepted(DecisionReason::SceneChange, Some(score), None),
                    }
                }
            }
        };

        self.last_processed = Some(frame_number);
        self.stats.sampled += 1;

        if decision.accept {
            self.stats.accepted += 1;
            self.reference = Some(ReferenceState::new(fingerprint, frame.timecode()));
            debug!(
                frame = frame_number,
                reason = %decision.reason,
                score = ?decision.score,
                sharpness = ?decision.sharpness,
                "Keyframe accepted"
            );
        } else {
            match decision.reason {
                DecisionReason::TooBlurry => self.stats.too_blurry += 1,
                _ => self.stats.too_similar += 1,
            }
            trace!(
                frame = frame_number,
                reason = %decision.reason,
                score = ?decision.score,
                sharpness = ?decision.sharpness,
                "Candidate rejected"
            );
        }

        Ok(decision)
    }

    /// Offer the next decoded frame in source order
    ///
    /// Frames off the sampling stride are counted and dropped. Recoverable
    /// problems skip the frame; fatal ones come back wrapped in `RunAborted`
    /// with the last frame number processed.
    pub fn push(&mut self, frame: Frame) -> Result<Option<AcceptedFrame>> {
        self.stats.frames_seen += 1;

        if !self.is_sampled(&frame) {
            return Ok(None);
        }

        match self.evaluate(&frame) {
            Ok(decision) if decision.accept => Ok(Some(AcceptedFrame {
                frame,
                reason: decision.reason,
                score: decision.score,
                sharpness: decision.sharpness,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.is_recoverable() => {
                warn!("Skipping frame {}: {}", frame.frame_number(), e);
                Ok(None)
            }
            Err(e) => Err(KeyframeError::aborted(self.last_processed, e)),
        }
    }

    /// Lazily select keyframes from a frame source
    ///
    /// The returned iterator pulls frames on demand and yields accepted
    /// frames as they are found. It stops after the first error.
    pub fn run<I>(&mut self, frames: I) -> Keyframes<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Result<Frame>>,
    {
        Keyframes {
            selector: self,
            frames: frames.into_iter(),
            done: false,
        }
    }

    /// Select keyframes from an in-memory sequence of frames
    pub fn select_all<I>(&mut self, frames: I) -> Result<Vec<AcceptedFrame>>
    where
        I: IntoIterator<Item = Frame>,
    {
        self.run(frames.into_iter().map(Ok)).collect()
    }

    fn is_sampled(&mut self, frame: &Frame) -> bool {
        let sampling = self.params.sampling;
        let fps = frame.timecode().fps();
        let stride = *self.stride.get_or_insert_with(|| {
            let stride = sampling.stride(fps);
            debug!("Sampling every {} frame(s) at {:.2}fps", stride, fps);
            stride
        });
        frame.frame_number() % stride == 0
    }

    pub fn params(&self) -> &SelectionParameters {
        &self.params
    }

    /// Current reference, if any frame has been accepted
    pub fn reference(&self) -> Option<&ReferenceState> {
        self.reference.as_ref()
    }

    /// Remove and return the reference, leaving the selector without one
    pub fn take_reference(&mut self) -> Option<ReferenceState> {
        self.reference.take()
    }

    /// Continue a paused run from a saved reference
    pub fn resume_with(&mut self, reference: ReferenceState) {
        debug!("Resuming from reference at frame {}", reference.timecode.frame_number());
        self.last_processed = Some(reference.timecode.frame_number());
        self.reference = Some(reference);
    }

    /// Frame number of the last evaluated candidate
    pub fn last_processed(&self) -> Option<u64> {
        self.last_processed
    }

    pub fn stats(&self) -> SelectionStats {
        self.stats
    }

    /// Reset the selector state (useful for processing multiple videos)
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        debug!("Resetting KeyframeSelector state");
        self.reference = None;
        self.stride = None;
        self.last_processed = None;
        self.stats = SelectionStats::default();
    }
}

// Implement Debug manually to keep fingerprints out of log output
impl std::fmt::Debug for KeyframeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyframeSelector")
            .field("params", &self.params)
            .field("reference_frame", &self.reference.as_ref().map(|r| r.timecode.frame_number()))
            .field("last_processed", &self.last_processed)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Iterator of accepted frames, see [`KeyframeSelector::run`]
pub struct Keyframes<'a, I> {
    selector: &'a mut KeyframeSelector,
    frames: I,
    done: bool,
}

impl<'a, I> Iterator for Keyframes<'a, I>
where
    I: Iterator<Item = Result<Frame>>,
{
    type Item = Result<AcceptedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let frame = match self.frames.next()? {
                Ok(frame) => frame,
                Err(e) => {
                    self.done = true;
                    return Some(Err(KeyframeError::aborted(self.selector.last_processed, e)));
                }
            };

            match self.selector.push(frame) {
                Ok(Some(accepted)) => return Some(Ok(accepted)),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
