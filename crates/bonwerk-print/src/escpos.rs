// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS command stream builder.
//
// Every printer state change is a fixed byte sequence appended to an ordered
// buffer.  A builder lives for exactly one receipt; nothing is shared between
// builds.

use bonwerk_core::config::PrintDefaults;
use bonwerk_core::types::{Alignment, FontSize, PrintOptions};
use chrono::Local;
use tracing::instrument;

use crate::codepage::Codepage;

/// Raw command sequences.
pub mod cmd {
    /// ESC @
    pub const INIT: &[u8] = &[0x1B, 0x40];
    /// ESC a n
    pub const ALIGN_LEFT: &[u8] = &[0x1B, 0x61, 0x00];
    pub const ALIGN_CENTER: &[u8] = &[0x1B, 0x61, 0x01];
    pub const ALIGN_RIGHT: &[u8] = &[0x1B, 0x61, 0x02];
    /// GS ! n
    pub const FONT_NORMAL: &[u8] = &[0x1D, 0x21, 0x00];
    pub const FONT_LARGE: &[u8] = &[0x1D, 0x21, 0x11];
    /// ESC M 1 (font B)
    pub const FONT_SMALL: &[u8] = &[0x1B, 0x4D, 0x01];
    /// ESC E n
    pub const BOLD_ON: &[u8] = &[0x1B, 0x45, 0x01];
    pub const BOLD_OFF: &[u8] = &[0x1B, 0x45, 0x00];
    pub const LF: u8 = 0x0A;
    /// ESC d n
    pub const FEED_PREFIX: &[u8] = &[0x1B, 0x64];
    /// GS V n
    pub const CUT_PARTIAL: &[u8] = &[0x1D, 0x56, 0x01];
    pub const CUT_FULL: &[u8] = &[0x1D, 0x56, 0x00];
}

/// Lines fed before cutting so the last line clears the cutter.
pub const CUT_FEED_LINES: u8 = 3;

/// Character columns of a 58 mm roll in font A.
pub const TEST_PAGE_WIDTH: usize = 32;

/// How far the cutter goes through the paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutMode {
    /// Leave a small bridge.
    Partial,
    Full,
}

/// ESC/POS command builder.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    codepage: Codepage,
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(1024),
            codepage: Codepage::default(),
        }
    }

    // === Printer state ===

    pub fn init(&mut self) -> &mut Self {
        self.buf.extend_from_slice(cmd::INIT);
        self
    }

    /// Select the table text is encoded with. UTF-8 emits no command.
    pub fn codepage(&mut self, codepage: Codepage) -> &mut Self {
        self.codepage = codepage;
        if let Some(select) = codepage.select_command() {
            self.buf.extend_from_slice(select);
        }
        self
    }

    pub fn align(&mut self, alignment: Alignment) -> &mut Self {
        let seq = match alignment {
            Alignment::Left => cmd::ALIGN_LEFT,
            Alignment::Center => cmd::ALIGN_CENTER,
            Alignment::Right => cmd::ALIGN_RIGHT,
        };
        self.buf.extend_from_slice(seq);
        self
    }

    /// Large (`GS !`) and small (`ESC M`) are separate command families and
    /// are never combined.
    pub fn font(&mut self, size: FontSize) -> &mut Self {
        let seq = match size {
            FontSize::Normal => cmd::FONT_NORMAL,
            FontSize::Small => cmd::FONT_SMALL,
            FontSize::Large => cmd::FONT_LARGE,
        };
        self.buf.extend_from_slice(seq);
        self
    }

    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buf
            .extend_from_slice(if on { cmd::BOLD_ON } else { cmd::BOLD_OFF });
        self
    }

    // === Text output ===

    /// Append text encoded with the current codepage.
    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = self.codepage.encode(s);
        self.buf.extend_from_slice(&encoded);
        self
    }

    /// Text followed by a line feed.
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.newline()
    }

    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(cmd::LF);
        self
    }

    /// Print and feed `lines` lines.
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(cmd::FEED_PREFIX);
        self.buf.push(lines);
        self
    }

    /// A full-width line of `ch`.
    pub fn separator(&mut self, ch: char, width: usize) -> &mut Self {
        let rule: String = std::iter::repeat_n(ch, width).collect();
        self.line(&rule)
    }

    // === Paper control ===

    pub fn cut(&mut self, mode: CutMode) -> &mut Self {
        self.buf.extend_from_slice(match mode {
            CutMode::Partial => cmd::CUT_PARTIAL,
            CutMode::Full => cmd::CUT_FULL,
        });
        self
    }

    // === Build ===

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Split on `\r\n` and bare `\n`, keeping order.
pub fn split_lines(content: &str) -> Vec<&str> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

/// Encode a text receipt.
///
/// `options` are merged over `defaults`; the merged encoding applies to every
/// line.  With `cut_paper` (the default) the stream ends with a three-line
/// feed and a partial cut.
#[instrument(skip_all, fields(content_len = content.len()))]
pub fn build_receipt(content: &str, options: &PrintOptions, defaults: &PrintDefaults) -> Vec<u8> {
    let style = options.merge(defaults);

    let mut b = EscPosBuilder::new();
    b.init()
        .codepage(Codepage::resolve(&style.encoding))
        .align(style.alignment)
        .font(style.font_size);
    if style.bold {
        b.bold(true);
    }

    for line in split_lines(content) {
        b.line(line);
    }

    if style.bold {
        b.bold(false);
    }
    if style.cut_paper {
        b.feed(CUT_FEED_LINES).cut(CutMode::Partial);
    }
    b.build()
}

/// Fixed diagnostic page naming the printer and the local time.
pub fn build_test_page(printer_name: &str) -> Vec<u8> {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    build_test_page_at(printer_name, &timestamp)
}

/// [`build_test_page`] with the timestamp supplied by the caller.
pub fn build_test_page_at(printer_name: &str, timestamp: &str) -> Vec<u8> {
    let mut b = EscPosBuilder::new();
    b.init()
        .codepage(Codepage::Cp866)
        .align(Alignment::Left)
        .separator('=', TEST_PAGE_WIDTH)
        .align(Alignment::Center)
        .font(FontSize::Large)
        .line("TEST PAGE")
        .font(FontSize::Normal)
        .align(Alignment::Left)
        .separator('=', TEST_PAGE_WIDTH)
        .line(&format!("Printer: {printer_name}"))
        .line(&format!("Time: {timestamp}"))
        .align(Alignment::Center)
        .line("Hello, world!")
        .line("Привет, мир!")
        .align(Alignment::Left)
        .separator('=', TEST_PAGE_WIDTH)
        .feed(CUT_FEED_LINES)
        .cut(CutMode::Partial);
    b.build()
}
