//! Geometry calibration for the rendering surface.
//!
//! The engine never touches the surface directly. The surface reports its
//! container/content size and one rectangle per rendered word; this module
//! turns that into the constants the engine works with.

use crate::engine_math::ANCHOR_RATIO;
use log::debug;

/// Pixels per word assumed before the surface has been measured.
pub const DEFAULT_PX_PER_WORD: f64 = 2.0;

/// Position of one rendered word, relative to the scrollable content.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WordRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
}

impl WordRect {
    pub fn new(top: f64, left: f64, width: f64) -> Self {
        Self { top, left, width }
    }

    /// Horizontal centre, where a caret marker is drawn.
    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }
}

/// Arena of word rectangles addressed by word index.
#[derive(Debug, Clone, Default)]
pub struct WordLayout {
    rects: Vec<WordRect>,
}

impl WordLayout {
    pub fn new(rects: Vec<WordRect>) -> Self {
        Self { rects }
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WordRect> {
        self.rects.get(index)
    }

    /// Index of the last word whose top edge is at or above `y`.
    ///
    /// Word tops are non-decreasing in reading order. Returns 0 when every
    /// word sits below `y`, `None` for an empty layout.
    pub fn word_at_offset(&self, y: f64) -> Option<usize> {
        if self.rects.is_empty() {
            return None;
        }
        let after = self.rects.partition_point(|r| r.top <= y);
        Some(after.saturating_sub(1))
    }
}

/// Measured surface plus everything derived from it.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub viewport_height: f64,
    pub content_height: f64,
    pub px_per_word: f64,
    pub words: WordLayout,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            viewport_height: 0.0,
            content_height: 0.0,
            px_per_word: DEFAULT_PX_PER_WORD,
            words: WordLayout::default(),
        }
    }
}

impl Geometry {
    /// Nothing can be computed until the viewport has a height.
    pub fn is_measured(&self) -> bool {
        self.viewport_height > 0.0 && self.viewport_height.is_finite()
    }

    /// How many words fit in one viewport.
    pub fn viewport_words(&self) -> f64 {
        if !self.is_measured() {
            return 0.0;
        }
        self.viewport_height / self.px_per_word.max(1.0)
    }

    pub fn max_scroll_offset(&self) -> f64 {
        (self.content_height - self.viewport_height).max(0.0)
    }

    /// Scroll offset that puts word `index` on the anchor line, clamped.
    pub fn anchor_offset_for_word(&self, index: usize) -> Option<f64> {
        let rect = self.words.get(index)?;
        let target = rect.top - self.viewport_height * ANCHOR_RATIO;
        Some(target.clamp(0.0, self.max_scroll_offset()))
    }

    /// Caret x-position for word `index`.
    pub fn caret_left_for_word(&self, index: usize) -> Option<f64> {
        self.words.get(index).map(|r| r.center_x().round())
    }
}

/// Constants measured from the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub px_per_word: f64,
    /// Padding below the content so the last word can reach the anchor line.
    pub bottom_pad_px: f64,
    pub viewport_words: f64,
    pub trailing_buffer_words: f64,
}

/// Derive pixels-per-word and viewport sizes from a measured surface.
///
/// Returns `None` while the surface is unmeasured or the script is empty;
/// callers keep their previous calibration in that case.
pub fn calibrate(
    viewport_height: f64,
    content_height: f64,
    total_words: usize,
    anchor_ratio: f64,
) -> Option<Calibration> {
    if total_words == 0 || !(viewport_height > 0.0) || !content_height.is_finite() {
        return None;
    }

    let usable = content_height - viewport_height;
    let px_per_word = (usable / total_words.max(1) as f64).max(1.0);
    let below_anchor = viewport_height * (1.0 - anchor_ratio);

    let calibration = Calibration {
        px_per_word,
        bottom_pad_px: below_anchor.ceil().max(0.0),
        viewport_words: viewport_height / px_per_word,
        trailing_buffer_words: (below_anchor / px_per_word).ceil().max(0.0),
    };
    debug!(
        "Calibrated surface: {:.2}px/word, {:.1} words per viewport",
        calibration.px_per_word, calibration.viewport_words
    );
    Some(calibration)
}

/// Word-wrapped layout of `words` on a surface `viewport_width` pixels
/// wide, approximating the font with fixed advances. Returns the layout and
/// the height of the text block.
pub fn layout_words(words: &[String], viewport_width: f64, font_size_px: f64) -> (WordLayout, f64) {
    let char_width = font_size_px * 0.55;
    let space = font_size_px * 0.3;
    let line_height = font_size_px * 1.5;

    let mut rects = Vec::with_capacity(words.len());
    let (mut x, mut y) = (0.0, 0.0);
    for word in words {
        let width = word.chars().count() as f64 * char_width;
        if x > 0.0 && x + width > viewport_width {
            x = 0.0;
            y += line_height;
        }
        rects.push(WordRect::new(y, x, width));
        x += width + space;
    }

    let height = if words.is_empty() { 0.0 } else { y + line_height };
    (WordLayout::new(rects), height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_layout(words: usize, per_line: usize, line_height: f64) -> WordLayout {
        WordLayout::new(
            (0..words)
                .map(|i| {
                    let line = i / per_line;
                    let col = i % per_line;
                    WordRect::new(line as f64 * line_height, col as f64 * 50.0, 40.0)
                })
                .collect(),
        )
    }

    #[test]
    fn test_calibrate_derives_px_per_word() {
        let cal = calibrate(400.0, 2400.0, 1000, ANCHOR_RATIO).unwrap();
        assert_eq!(cal.px_per_word, 2.0);
        assert_eq!(cal.viewport_words, 200.0);
        assert_eq!(cal.bottom_pad_px, 260.0);
        assert_eq!(cal.trailing_buffer_words, 130.0);
    }

    #[test]
    fn test_calibrate_floors_px_per_word_at_one() {
        let cal = calibrate(400.0, 450.0, 1000, ANCHOR_RATIO).unwrap();
        assert_eq!(cal.px_per_word, 1.0);
    }

    #[test]
    fn test_calibrate_needs_measurement() {
        assert!(calibrate(0.0, 2000.0, 10, ANCHOR_RATIO).is_none());
        assert!(calibrate(400.0, 2000.0, 0, ANCHOR_RATIO).is_none());
    }

    #[test]
    fn test_word_at_offset_binary_search() {
        let layout = grid_layout(30, 5, 40.0);
        assert_eq!(layout.word_at_offset(-10.0), Some(0));
        assert_eq!(layout.word_at_offset(0.0), Some(4));
        assert_eq!(layout.word_at_offset(39.0), Some(4));
        assert_eq!(layout.word_at_offset(40.0), Some(9));
        assert_eq!(layout.word_at_offset(10_000.0), Some(29));
        assert_eq!(WordLayout::default().word_at_offset(0.0), None);
    }

    #[test]
    fn test_layout_words_wraps_lines() {
        let words: Vec<String> = ["aa", "bb", "cc"].iter().map(|w| w.to_string()).collect();
        let (layout, height) = layout_words(&words, 30.0, 10.0);
        assert_eq!(layout.get(0), Some(&WordRect::new(0.0, 0.0, 11.0)));
        assert_eq!(layout.get(1), Some(&WordRect::new(0.0, 14.0, 11.0)));
        assert_eq!(layout.get(2), Some(&WordRect::new(15.0, 0.0, 11.0)));
        assert_eq!(height, 30.0);
        assert_eq!(layout_words(&[], 30.0, 10.0).1, 0.0);
    }

    #[test]
    fn test_anchor_offset_and_caret() {
        let geometry = Geometry {
            viewport_height: 200.0,
            content_height: 1000.0,
            px_per_word: 8.0,
            words: grid_layout(100, 5, 40.0),
        };
        // word 50 is on line 10 => top 400; 400 - 70 = 330
        assert_eq!(geometry.anchor_offset_for_word(50), Some(330.0));
        assert_eq!(geometry.anchor_offset_for_word(0), Some(0.0));
        assert_eq!(geometry.anchor_offset_for_word(500), None);
        assert_eq!(geometry.caret_left_for_word(7), Some(120.0));
        assert_eq!(geometry.viewport_words(), 25.0);
    }
}
