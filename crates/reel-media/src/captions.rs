//! Caption geometry and word wrapping.

/// Maximum number of caption lines drawn on a frame.
pub const MAX_CAPTION_LINES: usize = 6;

/// Default caption width as a percentage of frame width.
pub const DEFAULT_CAPTION_WIDTH_PCT: u32 = 80;

/// Accepted caption width range after clamping.
pub const CAPTION_WIDTH_PCT_RANGE: (u32, u32) = (40, 95);

/// Lower bound on the per-line character budget.
const MIN_CHARS_PER_LINE: usize = 8;

/// Average glyph width relative to font size.
const GLYPH_WIDTH_RATIO: f64 = 0.55;

/// What happens to wrapped lines beyond [`MAX_CAPTION_LINES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionOverflow {
    /// Keep the first lines and silently drop the rest.
    #[default]
    DropExtra,
}

/// Caption placement for one frame size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionLayout {
    pub frame_width: u32,
    pub frame_height: u32,
    pub font_size: u32,
    pub line_spacing: u32,
    /// Characters per wrapped line
    pub max_chars: usize,
    pub max_lines: usize,
    pub overflow: CaptionOverflow,
}

impl CaptionLayout {
    /// Layout for a frame, deriving the font size from the frame height when
    /// none is given.
    pub fn for_frame(width: u32, height: u32, width_pct: Option<u32>, font_size: Option<u32>) -> Self {
        let (min_pct, max_pct) = CAPTION_WIDTH_PCT_RANGE;
        let pct = width_pct
            .unwrap_or(DEFAULT_CAPTION_WIDTH_PCT)
            .clamp(min_pct, max_pct);
        let font_size = font_size.unwrap_or(height / 28).max(1);

        let usable = f64::from(width) * f64::from(pct) / 100.0;
        let max_chars = (usable / (f64::from(font_size) * GLYPH_WIDTH_RATIO)).floor() as usize;

        Self {
            frame_width: width,
            frame_height: height,
            font_size,
            line_spacing: font_size / 3,
            max_chars: max_chars.max(MIN_CHARS_PER_LINE),
            max_lines: MAX_CAPTION_LINES,
            overflow: CaptionOverflow::default(),
        }
    }

    /// Wrap all caption lines, applying the overflow policy.
    pub fn wrap<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        let wrapped = lines
            .iter()
            .flat_map(|line| wrap_text(line.as_ref(), self.max_chars));
        match self.overflow {
            CaptionOverflow::DropExtra => wrapped.take(self.max_lines).collect(),
        }
    }

    /// Total pixel height of `line_count` lines.
    pub fn block_height(&self, line_count: usize) -> u32 {
        if line_count == 0 {
            return 0;
        }
        let n = line_count as u32;
        n * self.font_size + (n - 1) * self.line_spacing
    }

    /// Top edge of line `index` in a block of `line_count` lines centred at
    /// 70% of the frame height.
    pub fn line_y(&self, index: usize, line_count: usize) -> u32 {
        let centre = self.frame_height * 7 / 10;
        let top = centre.saturating_sub(self.block_height(line_count) / 2);
        top + index as u32 * (self.font_size + self.line_spacing)
    }
}

/// Greedy word wrap. Words longer than the budget are split by characters.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max_chars) {
            let piece_len = piece.len();
            let needed = if current_len == 0 { piece_len } else { current_len + 1 + piece_len };
            if needed > max_chars && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(piece.iter());
            current_len += piece_len;
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_for_portrait() {
        let layout = CaptionLayout::for_frame(1080, 1920, None, None);
        assert_eq!(layout.font_size, 68);
        assert_eq!(layout.line_spacing, 22);
        // 1080 * 0.8 / (68 * 0.55) = 23.1
        assert_eq!(layout.max_chars, 23);
    }

    #[test]
    fn test_width_pct_is_clamped() {
        let narrow = CaptionLayout::for_frame(1080, 1920, Some(1), None);
        let clamped = CaptionLayout::for_frame(1080, 1920, Some(40), None);
        assert_eq!(narrow.max_chars, clamped.max_chars);

        let wide = CaptionLayout::for_frame(1080, 1920, Some(100), None);
        let clamped = CaptionLayout::for_frame(1080, 1920, Some(95), None);
        assert_eq!(wide.max_chars, clamped.max_chars);
    }

    #[test]
    fn test_min_chars_per_line() {
        let layout = CaptionLayout::for_frame(1080, 1920, Some(40), Some(400));
        assert_eq!(layout.max_chars, 8);
    }

    #[test]
    fn test_wrap_text_greedy() {
        assert_eq!(
            wrap_text("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
        assert_eq!(wrap_text("   ", 10), Vec::<String>::new());
    }

    #[test]
    fn test_wrap_splits_long_words() {
        assert_eq!(
            wrap_text("supercalifragilistic ok", 8),
            vec!["supercal", "ifragili", "stic ok"]
        );
    }

    #[test]
    fn test_wrap_counts_chars_not_bytes() {
        assert_eq!(wrap_text("éééé éééé", 9), vec!["éééé éééé"]);
    }

    #[test]
    fn test_overflow_drops_extra_lines() {
        let layout = CaptionLayout::for_frame(1080, 1920, None, None);
        let lines: Vec<String> = (0..10).map(|i| format!("line {}", i)).collect();
        let wrapped = layout.wrap(&lines);

        assert_eq!(wrapped.len(), MAX_CAPTION_LINES);
        assert_eq!(wrapped[0], "line 0");
        assert_eq!(wrapped[5], "line 5");
    }

    #[test]
    fn test_block_is_centred_at_seventy_percent() {
        let layout = CaptionLayout::for_frame(1080, 1920, None, None);
        let height = layout.block_height(2);
        assert_eq!(height, 68 * 2 + 22);

        let top = layout.line_y(0, 2);
        assert_eq!(top, 1344 - height / 2);
        assert_eq!(layout.line_y(1, 2), top + 90);
    }
}
