use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PPQ: u16 = 480;
pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_SUBDIVISION: u32 = 16;
pub const MIN_SAMPLES_PER_PIXEL: u32 = 16;
pub const MAX_SAMPLES_PER_PIXEL: u32 = 32_768;
pub const DEFAULT_SAMPLES_PER_PIXEL: u32 = 512;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    #[must_use]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Ticks in one beat of this signature's beat unit (a quarter in 4/4, an eighth in 6/8).
    #[must_use]
    pub fn ticks_per_beat(&self, ppq: u16) -> u64 {
        let denominator = u64::from(self.denominator.max(1));
        (u64::from(ppq) * 4 / denominator).max(1)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<(u32, u32)> for TimeSignature {
    fn from((numerator, denominator): (u32, u32)) -> Self {
        Self::new(numerator, denominator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalPosition {
    pub bar: u64,
    pub beat: u64,
    pub tick: u64,
}

impl fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{:03}", self.bar, self.beat, self.tick)
    }
}

/// Tempo, zoom and playhead state for one project.
///
/// All pixel values are derived from `samples_per_pixel`; the engine only hands this out behind a
/// shared borrow while a gesture is being read, so a single gesture always sees one zoom level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeline {
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub sample_rate: u32,
    pub samples_per_pixel: u32,
    pub position: u64,
    pub snap_to_grid: bool,
    pub subdivision: u32,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            samples_per_pixel: DEFAULT_SAMPLES_PER_PIXEL,
            position: 0,
            snap_to_grid: true,
            subdivision: DEFAULT_SUBDIVISION,
        }
    }
}

impl Timeline {
    #[must_use]
    pub fn new(bpm: u32, sample_rate: u32) -> Self {
        Self {
            bpm: bpm.max(1),
            sample_rate: sample_rate.max(1),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn samples_to_pixels(&self, samples: u64) -> u64 {
        samples / u64::from(self.samples_per_pixel.max(1))
    }

    #[must_use]
    pub fn pixels_to_samples(&self, pixels: u64) -> u64 {
        pixels.saturating_mul(u64::from(self.samples_per_pixel.max(1)))
    }

    /// Values below one beat per minute are ignored.
    pub fn set_bpm(&mut self, bpm: u32) {
        if bpm >= 1 {
            self.bpm = bpm;
        }
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    pub fn zoom_in(&mut self) {
        if self.samples_per_pixel > MIN_SAMPLES_PER_PIXEL {
            self.samples_per_pixel = (self.samples_per_pixel / 2).max(MIN_SAMPLES_PER_PIXEL);
        }
    }

    pub fn zoom_out(&mut self) {
        if self.samples_per_pixel < MAX_SAMPLES_PER_PIXEL {
            self.samples_per_pixel = self
                .samples_per_pixel
                .saturating_mul(2)
                .min(MAX_SAMPLES_PER_PIXEL);
        }
    }

    /// Sets the zoom to the nearest power of two inside the allowed range.
    pub fn set_zoom(&mut self, samples_per_pixel: u32) {
        let clamped = samples_per_pixel.clamp(MIN_SAMPLES_PER_PIXEL, MAX_SAMPLES_PER_PIXEL);
        if clamped.is_power_of_two() {
            self.samples_per_pixel = clamped;
            return;
        }

        let upper = clamped.next_power_of_two();
        let lower = upper / 2;
        self.samples_per_pixel = if upper - clamped < clamped - lower {
            upper
        } else {
            lower
        };
    }

    #[must_use]
    pub fn samples_per_beat(&self) -> f64 {
        f64::from(self.sample_rate) * 60.0 / f64::from(self.bpm.max(1))
    }

    /// Length of one grid cell in samples, never zero.
    #[must_use]
    pub fn grid_samples(&self) -> u64 {
        let whole_note = self.samples_per_beat() * 4.0;
        let cell = whole_note / f64::from(self.subdivision.max(1));
        (cell.round() as u64).max(1)
    }

    #[must_use]
    pub fn quantize(&self, position: u64) -> u64 {
        if !self.snap_to_grid {
            return position;
        }
        let grid = self.grid_samples();
        position.saturating_add(grid / 2) / grid * grid
    }

    #[must_use]
    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / f64::from(self.sample_rate.max(1))
    }

    #[must_use]
    pub fn samples_to_ticks(&self, samples: u64) -> u64 {
        samples_to_ticks(samples, self.bpm, DEFAULT_PPQ, self.sample_rate)
    }

    #[must_use]
    pub fn ticks_to_samples(&self, ticks: u64) -> u64 {
        ticks_to_samples(ticks, self.bpm, DEFAULT_PPQ, self.sample_rate)
    }

    #[must_use]
    pub fn musical_position(&self, samples: u64) -> MusicalPosition {
        let ticks = self.samples_to_ticks(samples);
        let ticks_per_beat = self.time_signature.ticks_per_beat(DEFAULT_PPQ);
        let beats_per_bar = u64::from(self.time_signature.numerator.max(1));
        let total_beats = ticks / ticks_per_beat;

        MusicalPosition {
            bar: total_beats / beats_per_bar + 1,
            beat: total_beats % beats_per_bar + 1,
            tick: ticks % ticks_per_beat,
        }
    }
}

#[must_use]
pub fn ticks_to_seconds(ticks: u64, bpm: u32, ppq: u16) -> f64 {
    if bpm == 0 || ppq == 0 {
        return 0.0;
    }

    let beats = ticks as f64 / f64::from(ppq);
    beats * (60.0 / f64::from(bpm))
}

#[must_use]
pub fn seconds_to_ticks(seconds: f64, bpm: u32, ppq: u16) -> u64 {
    if seconds <= 0.0 || bpm == 0 || ppq == 0 {
        return 0;
    }

    let beats = seconds * (f64::from(bpm) / 60.0);
    (beats * f64::from(ppq)).round() as u64
}

#[must_use]
pub fn ticks_to_samples(ticks: u64, bpm: u32, ppq: u16, sample_rate: u32) -> u64 {
    let seconds = ticks_to_seconds(ticks, bpm, ppq);
    (seconds * f64::from(sample_rate)).round() as u64
}

#[must_use]
pub fn samples_to_ticks(samples: u64, bpm: u32, ppq: u16, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }

    let seconds = samples as f64 / f64::from(sample_rate);
    seconds_to_ticks(seconds, bpm, ppq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_tick_round_trip_is_stable() {
        let ticks = 19_200;
        let samples = ticks_to_samples(ticks, 140, 480, 48_000);
        let restored = samples_to_ticks(samples, 140, 480, 48_000);
        assert_eq!(ticks, restored);
    }

    #[test]
    fn pixel_conversion_floors() {
        let timeline = Timeline::default();
        assert_eq!(timeline.samples_to_pixels(1_023), 1);
        assert_eq!(timeline.samples_to_pixels(1_024), 2);
        assert_eq!(timeline.pixels_to_samples(2), 1_024);
    }

    #[test]
    fn zoom_is_clamped_and_noop_past_bounds() {
        let mut timeline = Timeline::default();
        for _ in 0..32 {
            timeline.zoom_in();
        }
        assert_eq!(timeline.samples_per_pixel, MIN_SAMPLES_PER_PIXEL);
        timeline.zoom_in();
        assert_eq!(timeline.samples_per_pixel, MIN_SAMPLES_PER_PIXEL);

        for _ in 0..32 {
            timeline.zoom_out();
        }
        assert_eq!(timeline.samples_per_pixel, MAX_SAMPLES_PER_PIXEL);
    }

    #[test]
    fn set_zoom_snaps_to_power_of_two() {
        let mut timeline = Timeline::default();
        timeline.set_zoom(700);
        assert_eq!(timeline.samples_per_pixel, 512);
        timeline.set_zoom(800);
        assert_eq!(timeline.samples_per_pixel, 1_024);
        timeline.set_zoom(1);
        assert_eq!(timeline.samples_per_pixel, MIN_SAMPLES_PER_PIXEL);
        timeline.set_zoom(u32::MAX);
        assert_eq!(timeline.samples_per_pixel, MAX_SAMPLES_PER_PIXEL);
    }

    #[test]
    fn bpm_below_one_is_ignored() {
        let mut timeline = Timeline::default();
        timeline.set_bpm(0);
        assert_eq!(timeline.bpm, DEFAULT_BPM);
        timeline.set_bpm(90);
        assert_eq!(timeline.bpm, 90);
    }

    #[test]
    fn quantize_rounds_to_nearest_grid_cell() {
        let mut timeline = Timeline::new(120, 48_000);
        // 120 bpm at 48 kHz: a sixteenth note is 6 000 samples.
        assert_eq!(timeline.grid_samples(), 6_000);
        assert_eq!(timeline.quantize(2_999), 0);
        assert_eq!(timeline.quantize(3_000), 6_000);
        assert_eq!(timeline.quantize(10_000), 12_000);

        timeline.snap_to_grid = false;
        assert_eq!(timeline.quantize(10_000), 10_000);
    }

    #[test]
    fn musical_position_counts_from_one() {
        let timeline = Timeline::new(120, 48_000);
        assert_eq!(timeline.musical_position(0).to_string(), "1.1.000");
        // Five beats in: bar 2, beat 2.
        let position = timeline.musical_position(5 * 24_000);
        assert_eq!((position.bar, position.beat, position.tick), (2, 2, 0));
    }
}
