//! Progress-bar styles.
//!
//! A style consists of an indicator (the part that sweeps back and forth
//! when the size is unknown), an optional tip for the leading edge of
//! the filled region, and an ordered list of filler glyphs where the
//! first entry is empty and the last is full; intermediate entries give
//! sub-cell granularity.  Styles other than plain need a UTF-8 capable
//! terminal.

/// One glyph of a bar, with its display width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarGlyph {
    pub text: &'static str,
    pub width: usize,
}

impl BarGlyph {
    const fn new(text: &'static str, width: usize) -> Self {
        Self { text, width }
    }
}

/// A complete bar style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarStyle {
    pub style_id: u8,
    pub indicator: BarGlyph,
    pub tip: BarGlyph,
    pub fillers: &'static [BarGlyph],
}

impl BarStyle {
    /// Index of the full-cell filler.
    #[must_use]
    pub fn full_index(&self) -> usize {
        self.fillers.len().saturating_sub(1)
    }

    /// Whether the filled region ends in a tip glyph.  Only the simple
    /// two-filler styles use a tip.
    #[must_use]
    pub fn has_tip(&self) -> bool {
        self.fillers.len() == 2 && self.tip.width > 0
    }
}

const PLAIN: BarStyle = BarStyle {
    style_id: 1,
    indicator: BarGlyph::new("<=>", 3),
    tip: BarGlyph::new(">", 1),
    fillers: &[BarGlyph::new(" ", 1), BarGlyph::new("=", 1)],
};

const BLOCK: BarStyle = BarStyle {
    style_id: 2,
    indicator: BarGlyph::new("\u{25c0}\u{25b6}", 2),
    tip: BarGlyph::new("", 0),
    fillers: &[BarGlyph::new(" ", 1), BarGlyph::new("\u{2588}", 1)],
};

const GRANULAR: BarStyle = BarStyle {
    style_id: 3,
    indicator: BarGlyph::new("\u{25c0}\u{25b6}", 2),
    tip: BarGlyph::new("", 0),
    fillers: &[
        BarGlyph::new(" ", 1),
        BarGlyph::new("\u{258f}", 1),
        BarGlyph::new("\u{258e}", 1),
        BarGlyph::new("\u{258d}", 1),
        BarGlyph::new("\u{258c}", 1),
        BarGlyph::new("\u{258b}", 1),
        BarGlyph::new("\u{258a}", 1),
        BarGlyph::new("\u{2589}", 1),
        BarGlyph::new("\u{2588}", 1),
    ],
};

const SHADED: BarStyle = BarStyle {
    style_id: 4,
    indicator: BarGlyph::new("\u{2592}\u{2593}\u{2592}", 3),
    tip: BarGlyph::new("", 0),
    fillers: &[
        BarGlyph::new("\u{2591}", 1),
        BarGlyph::new("\u{2592}", 1),
        BarGlyph::new("\u{2593}", 1),
        BarGlyph::new("\u{2588}", 1),
    ],
};

/// Resolves a style name, falling back to plain for unknown names or
/// terminals without UTF-8.
#[must_use]
pub fn style_by_name(name: &str, utf8_capable: bool) -> BarStyle {
    if utf8_capable {
        match name {
            "block" => return BLOCK,
            "granular" => return GRANULAR,
            "shaded" => return SHADED,
            _ => {}
        }
    }
    PLAIN
}

/// Whether the name refers to a known style at all.
#[must_use]
pub fn is_known_style(name: &str) -> bool {
    matches!(name, "plain" | "block" | "granular" | "shaded")
}

/// The styles loaded for one format, looked up by segment parameter.
/// A template may combine at most four distinct styles; requests beyond
/// that reuse the first slot.
#[derive(Debug, Default)]
pub struct BarStyleSet {
    loaded: Vec<BarStyle>,
}

/// Maximum number of distinct styles in one template.
pub const BARSTYLE_MAX: usize = 4;

impl BarStyleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the 1-based parameter for the named style, loading it on
    /// first use.
    pub fn index_for(&mut self, name: &str, utf8_capable: bool) -> u8 {
        let style = style_by_name(name, utf8_capable);
        if let Some(position) = self
            .loaded
            .iter()
            .position(|loaded| loaded.style_id == style.style_id)
        {
            return (position + 1) as u8;
        }
        if self.loaded.len() >= BARSTYLE_MAX {
            return 1;
        }
        self.loaded.push(style);
        self.loaded.len() as u8
    }

    /// The style behind a segment parameter, defaulting to the first.
    #[must_use]
    pub fn get(&self, parameter: u8) -> BarStyle {
        let index = if parameter >= 1 {
            parameter as usize - 1
        } else {
            0
        };
        self.loaded.get(index).cloned().unwrap_or(PLAIN)
    }

    pub fn clear(&mut self) {
        self.loaded.clear();
    }
}
