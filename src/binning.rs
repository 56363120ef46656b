//! Event binning: the decode/accumulate hot loop.
//!
//! # Word Format
//! ```text
//! 31 30 29 28                                  0
//! [ type  ][          bin index (29 bits)        ]
//! ```
//! A negative word (bit 31 set) is a tag and goes to the tag processor.
//! Event type codes with bit 30 set (`0b010`, `0b011`) are prompts; the rest
//! are randoms.
//!
//! The loop itself knows nothing about session states. It decodes words into
//! the accumulator and reports whether a tag switched the frame; [`Session`]
//! turns that into a [`BinResult`].
//!
//! [`Session`]: crate::session::Session

use crate::accumulator::Accumulator;
use crate::acquisition::{Channel, CHANNELS};
use crate::frames::FrameTable;
use crate::layout::{Region, RegionLayout};
use crate::session::state::ScanEndReason;
use crate::tags::{TagOutcome, TagState};
use serde::{Deserialize, Serialize};

/// Upper bound on words decoded by one `feed` call.
pub const MAX_WORDS_PER_FEED: usize = 1 << 20;

/// Mask of the 29-bit bin index.
pub const BIN_INDEX_MASK: u32 = (1 << 29) - 1;

const PROMPT_BIT: u32 = 1 << 30;
const PROMPT_TYPE: u32 = 0b010 << 29;

/// Outcome of one `feed` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinResult {
    /// The given number of words were decoded; more input is expected
    Consumed(usize),
    /// The scan (or frame) ended
    EndOfScan(ScanEndReason),
}

/// Kind of a coincidence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Prompt coincidence
    Prompt,
    /// Delayed-window (random) coincidence
    Random,
}

/// One decoded list-mode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    /// Tag word, passed on unchanged
    Tag(u32),
    /// Coincidence event
    Event {
        /// Prompt or random
        kind: EventKind,
        /// 29-bit bin index
        bin: u32,
    },
}

/// Decode a raw list-mode word.
#[inline]
pub fn decode(word: i32) -> Word {
    let raw = word as u32;
    if word < 0 {
        return Word::Tag(raw);
    }
    let kind = if raw & PROMPT_BIT != 0 {
        EventKind::Prompt
    } else {
        EventKind::Random
    };
    Word::Event {
        kind,
        bin: raw & BIN_INDEX_MASK,
    }
}

/// Encode a prompt event for `bin`.
pub fn prompt_word(bin: u32) -> i32 {
    (PROMPT_TYPE | (bin & BIN_INDEX_MASK)) as i32
}

/// Encode a random event for `bin`.
pub fn random_word(bin: u32) -> i32 {
    (bin & BIN_INDEX_MASK) as i32
}

/// Running prompt and random counts per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    /// Prompts per channel
    pub prompts: [u64; CHANNELS],
    /// Randoms per channel
    pub randoms: [u64; CHANNELS],
}

impl EventCounts {
    /// Net trues of one channel.
    pub fn net_trues(&self, channel: Channel) -> i64 {
        let i = channel.index();
        self.prompts[i] as i64 - self.randoms[i] as i64
    }

    /// Net trues over both channels.
    pub fn total_net_trues(&self) -> i64 {
        Channel::ALL.iter().map(|c| self.net_trues(*c)).sum()
    }

    fn add(&mut self, other: &EventCounts) {
        for i in 0..CHANNELS {
            self.prompts[i] += other.prompts[i];
            self.randoms[i] += other.randoms[i];
        }
    }
}

/// What one pass over a buffer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Words decoded, including the tag that ended the frame
    pub words: usize,
    /// A tick tag pushed the frame past its duration
    pub frame_ended: bool,
    /// Events binned during this pass
    pub counts: EventCounts,
}

/// Borrowed view of the session pieces the hot loop mutates.
pub struct Binner<'a> {
    accumulator: &'a mut Accumulator,
    tags: &'a mut TagState,
    frames: &'a mut FrameTable,
    emission_bound: u32,
    active_bound: u32,
    prompt_base: [usize; CHANNELS],
    random_base: [usize; CHANNELS],
    separates: [bool; CHANNELS],
}

impl<'a> Binner<'a> {
    /// Bind the loop to a planned layout and the session's mutable state.
    pub fn new(
        layout: &RegionLayout,
        accumulator: &'a mut Accumulator,
        tags: &'a mut TagState,
        frames: &'a mut FrameTable,
    ) -> Self {
        let mut prompt_base = [0usize; CHANNELS];
        let mut random_base = [0usize; CHANNELS];
        let mut separates = [false; CHANNELS];
        for channel in Channel::ALL {
            let i = channel.index();
            prompt_base[i] = layout.offset(Region::prompts(channel)) as usize;
            random_base[i] = layout.offset(Region::randoms(channel)) as usize;
            separates[i] = layout.separates_randoms(channel);
        }

        // Both bounds fit the 29-bit bin space, checked by the planner
        Self {
            accumulator,
            tags,
            frames,
            emission_bound: layout.emission_bound() as u32,
            active_bound: layout.active_bound() as u32,
            prompt_base,
            random_base,
            separates,
        }
    }

    /// Decode `words` into the accumulator.
    ///
    /// Decoding stops right after a tick tag that ends the current frame.
    /// The per-frame counters of the current frame are updated before
    /// returning.
    pub fn run(&mut self, words: &[i32]) -> Decoded {
        let mut counts = EventCounts::default();
        let mut processed = 0;
        let mut frame_ended = false;

        for &word in words {
            processed += 1;
            match decode(word) {
                Word::Tag(tag) => {
                    let frame = self.frames.current_mut();
                    if self.tags.process(tag, frame) == TagOutcome::EndOfFrame {
                        frame_ended = true;
                        break;
                    }
                }
                Word::Event { kind, bin } => self.bin_event(kind, bin, &mut counts),
            }
        }

        if let Some(frame) = self.frames.current_mut() {
            for i in 0..CHANNELS {
                frame.prompts[i] += counts.prompts[i];
                frame.randoms[i] += counts.randoms[i];
            }
        }

        Decoded {
            words: processed,
            frame_ended,
            counts,
        }
    }

    #[inline]
    fn bin_event(&mut self, kind: EventKind, bin: u32, counts: &mut EventCounts) {
        if bin >= self.active_bound {
            return;
        }
        let (ch, local) = if bin < self.emission_bound {
            (0, bin)
        } else {
            (1, bin - self.emission_bound)
        };
        let local = local as usize;

        match kind {
            EventKind::Prompt => {
                self.accumulator.increment(self.prompt_base[ch] + local);
                counts.prompts[ch] += 1;
            }
            EventKind::Random => {
                if self.separates[ch] {
                    self.accumulator.increment(self.random_base[ch] + local);
                } else {
                    self.accumulator.decrement(self.prompt_base[ch] + local);
                }
                counts.randoms[ch] += 1;
            }
        }
    }
}

/// Fold a pass's counts into running session totals.
pub fn accumulate_totals(totals: &mut EventCounts, decoded: &Decoded) {
    totals.add(&decoded.counts);
}
