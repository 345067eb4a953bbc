//! Sliding-window framer / ring buffer (C3)
//!
//! Maintains a fixed-length window of the latest `N` resampled samples.
//! Emits an analysis frame per input chunk once primed; priming is
//! one-shot per stream.

use log::trace;

/// Fixed-length sliding-window framer at the internal analysis rate.
pub struct FrameRingBuffer {
    window: Vec<f32>,
    filled: usize,
    primed: bool,
}

impl FrameRingBuffer {
    /// Construct a framer with window length `n`, the detector's frame
    /// size.
    pub fn new(n: usize) -> Self {
        Self {
            window: vec![0.0; n],
            filled: 0,
            primed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Reset priming state and zero the window; the next `push` starts a
    /// fresh fill cycle.
    pub fn reset(&mut self) {
        self.window.iter_mut().for_each(|s| *s = 0.0);
        self.filled = 0;
        self.primed = false;
    }

    /// Push a chunk of resampled samples. Returns `Some(frame)` once the
    /// window has been primed (chunks before that only fill the window and
    /// never emit). `chunk` may be longer than the window, in which case
    /// only its tail contributes to the next frame.
    pub fn push(&mut self, chunk: &[f32]) -> Option<&[f32]> {
        let n = self.window.len();
        if n == 0 || chunk.is_empty() {
            return if self.primed { Some(&self.window) } else { None };
        }

        if chunk.len() >= n {
            // The chunk alone re-fills (and overflows) the window.
            self.window.copy_from_slice(&chunk[chunk.len() - n..]);
            self.filled = n;
            self.primed = true;
        } else {
            let shift = chunk.len();
            self.window.copy_within(shift.., 0);
            self.window[n - shift..].copy_from_slice(chunk);
            self.filled = (self.filled + shift).min(n);
            if self.filled >= n {
                self.primed = true;
            }
        }

        if self.primed {
            trace!("framer: emitting frame of {} samples", n);
            Some(&self.window)
        } else {
            None
        }
    }
}
