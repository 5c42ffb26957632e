// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer character tables and text encoding.
//
// Most receipt printers in the field are single-byte devices: the host picks a
// code table with `ESC t n` and then sends bytes from that table.  CP866 is
// the default because it carries Cyrillic alongside ASCII.

use std::borrow::Cow;

use encoding_rs::Encoding;
use tracing::warn;

/// A text encoding the printer can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codepage {
    /// PC866 (Cyrillic #2), `ESC t 17`.
    #[default]
    Cp866,
    /// WPC1251, `ESC t 46`.
    Windows1251,
    /// Bytes are sent as UTF-8 with no table selection.
    Utf8,
}

impl Codepage {
    /// Look up a codepage by one of its accepted names (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cp866" | "ibm866" | "866" | "dos-866" => Some(Self::Cp866),
            "windows-1251" | "cp1251" | "win1251" | "1251" => Some(Self::Windows1251),
            "utf-8" | "utf8" => Some(Self::Utf8),
            _ => None,
        }
    }

    /// Like [`from_name`](Self::from_name) but falls back to the default table.
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(encoding = name, "unknown encoding, falling back to CP866");
            Self::default()
        })
    }

    /// `ESC t n` selecting this table, if any.
    pub fn select_command(&self) -> Option<&'static [u8]> {
        match self {
            Self::Cp866 => Some(&[0x1B, 0x74, 17]),
            Self::Windows1251 => Some(&[0x1B, 0x74, 46]),
            Self::Utf8 => None,
        }
    }

    fn encoding(&self) -> Option<&'static Encoding> {
        match self {
            Self::Cp866 => Some(encoding_rs::IBM866),
            Self::Windows1251 => Some(encoding_rs::WINDOWS_1251),
            Self::Utf8 => None,
        }
    }

    /// Encode `text` for this table. Characters the table lacks become `?`.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        let Some(encoding) = self.encoding() else {
            return Cow::Borrowed(text.as_bytes());
        };
        if text.is_ascii() {
            return Cow::Borrowed(text.as_bytes());
        }

        let mut out = Vec::with_capacity(text.len());
        let mut scratch = [0u8; 4];
        for c in text.chars() {
            if c.is_ascii() {
                out.push(c as u8);
                continue;
            }
            let (bytes, _, had_errors) = encoding.encode(c.encode_utf8(&mut scratch));
            if had_errors {
                out.push(b'?');
            } else {
                out.extend_from_slice(&bytes);
            }
        }
        Cow::Owned(out)
    }
}
