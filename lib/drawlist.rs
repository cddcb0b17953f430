//! Drawlist binary builder (spec §4.6) and wire format (spec §3, §6).
//!
//! Lays the output buffer as `[header(64) | commands | strings-span |
//! strings-bytes | blobs-span | blobs-bytes]`, matching the file layout
//! table in spec §3 byte for byte. Grounded in the teacher's `buffer.rs`
//! double-buffering idiom for the *concept* of a compact frame
//! representation, but the wire format itself has no teacher precedent —
//! it is new surface the spec defines from scratch, so the encode/decode
//! pair here is written directly against spec §3/§4.6/§6 rather than
//! adapted from existing code.

use std::collections::HashMap;

use crate::error::{BuildError, BuildResult};
use crate::style::{Attrs, Blitter, CellStyle, Color, ImageFit, ImageFormat, ImageProtocol, UnderlineStyle};

pub const MAGIC: u32 = 0x4c58_4446; // "FDXL" little-endian
pub const HEADER_SIZE: u32 = 64;

mod opcode {
    pub const CLEAR: u16 = 1;
    pub const FILL_RECT: u16 = 2;
    pub const DRAW_TEXT: u16 = 3;
    pub const DRAW_TEXT_RUN: u16 = 4;
    pub const PUSH_CLIP: u16 = 5;
    pub const POP_CLIP: u16 = 6;
    pub const SET_CURSOR: u16 = 7;
    pub const DRAW_CANVAS: u16 = 8;
    pub const DRAW_IMAGE: u16 = 9;
}

fn align4(n: u32) -> u32 {
    (n + 3) & !3
}

//--------------------------------------------------------------------------------------------------
// Caps
//--------------------------------------------------------------------------------------------------

/// Capacity limits enforced by [`DrawlistBuilder::build`] (spec §4.6
/// "Configuration"). Referenced from [`crate::config::RuntimeConfig`].
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BuilderCaps {
    pub max_drawlist_bytes: u32,
    pub max_cmd_count: u32,
    pub max_blob_bytes: u32,
    pub max_blobs: u32,
    pub max_string_bytes: u32,
    pub max_strings: u32,
}

impl Default for BuilderCaps {
    fn default() -> Self {
        Self {
            max_drawlist_bytes: 16 * 1024 * 1024,
            max_cmd_count: 1_000_000,
            max_blob_bytes: 8 * 1024 * 1024,
            max_blobs: 10_000,
            max_string_bytes: 4 * 1024 * 1024,
            max_strings: 100_000,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Cursor state, encoded by SET_CURSOR
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Hidden,
    Visible { x: u16, y: u16 },
}

//--------------------------------------------------------------------------------------------------
// Parsed view, produced by `parse` and consumed by round-trip tests and
// the renderer's own test harness.
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Clear { cols: u16, rows: u16, style: Option<CellStyle> },
    FillRect { x: u16, y: u16, w: u16, h: u16, style: CellStyle },
    DrawText { x: u16, y: u16, text: String, style: CellStyle },
    DrawTextRun { x: u16, y: u16, segments: Vec<(String, CellStyle)> },
    PushClip { x: u16, y: u16, w: u16, h: u16 },
    PopClip,
    SetCursor(CursorState),
    DrawCanvas { x: u16, y: u16, cols: u16, rows: u16, blitter: Blitter, px_width: u16, px_height: u16, bytes: Vec<u8> },
    DrawImage {
        x: u16,
        y: u16,
        format: ImageFormat,
        protocol: ImageProtocol,
        fit: ImageFit,
        z_layer: i8,
        image_id: Option<u32>,
        px_width: u16,
        px_height: u16,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct Drawlist {
    pub version: u32,
    pub commands: Vec<Command>,
}

//--------------------------------------------------------------------------------------------------
// Builder
//--------------------------------------------------------------------------------------------------

struct PendingCommand {
    opcode: u16,
    payload: Vec<u8>,
}

/// Encodes draw commands, interned strings, and opaque blobs into the
/// drawlist wire format (spec §3, §4.6).
pub struct DrawlistBuilder {
    version: u32,
    caps: BuilderCaps,
    validate: bool,
    reuse_output_buffer: bool,

    commands: Vec<PendingCommand>,
    cmd_count: u32,

    string_bytes: Vec<u8>,
    string_spans: Vec<(u32, u32)>,
    string_index: HashMap<String, u32>,

    blob_bytes: Vec<u8>,
    blob_spans: Vec<(u32, u32)>,

    active_link_ref: u32,

    error: Option<BuildError>,
    output_buffer: Vec<u8>,
}

impl DrawlistBuilder {
    /// `version` must be one of `{3, 4, 5}` (spec §4.6 "Configuration").
    /// Older versions (1, 2) are readable by [`parse`] but never produced
    /// by this builder.
    pub fn new(version: u32, caps: BuilderCaps) -> Self {
        debug_assert!((3..=5).contains(&version), "builder only targets drawlist versions 3-5");
        Self {
            version,
            caps,
            validate: true,
            reuse_output_buffer: false,
            commands: Vec::new(),
            cmd_count: 0,
            string_bytes: Vec::new(),
            string_spans: Vec::new(),
            string_index: HashMap::new(),
            blob_bytes: Vec::new(),
            blob_spans: Vec::new(),
            active_link_ref: 0,
            error: None,
            output_buffer: Vec::new(),
        }
    }

    pub fn with_validate_params(mut self, on: bool) -> Self {
        self.validate = on;
        self
    }

    pub fn with_reuse_output_buffer(mut self, on: bool) -> Self {
        self.reuse_output_buffer = on;
        self
    }

    pub fn supports_canvas(&self) -> bool {
        self.version >= 4
    }

    pub fn supports_image(&self) -> bool {
        self.version >= 5
    }

    pub fn supports_link(&self) -> bool {
        self.version >= 3
    }

    /// Resets the builder to its freshly constructed state, clearing any
    /// sticky error (spec §4.6 "Recoverable encoder limits").
    pub fn reset(&mut self) {
        self.commands.clear();
        self.cmd_count = 0;
        self.string_bytes.clear();
        self.string_spans.clear();
        self.string_index.clear();
        self.blob_bytes.clear();
        self.blob_spans.clear();
        self.active_link_ref = 0;
        self.error = None;
    }

    fn fail(&mut self, err: BuildError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn check_dims(&mut self, vals: &[i64]) -> bool {
        if !self.validate {
            return true;
        }
        for &v in vals {
            if v < 0 || v > u16::MAX as i64 {
                self.fail(BuildError::BadParams(format!("dimension {v} out of u16 range")));
                return false;
            }
        }
        true
    }

    fn push_command(&mut self, opcode: u16, payload: Vec<u8>) {
        if self.error.is_some() {
            return;
        }
        if self.cmd_count + 1 > self.caps.max_cmd_count {
            self.fail(BuildError::TooLarge {
                cap: "maxCmdCount",
                size: (self.cmd_count + 1) as usize,
                limit: self.caps.max_cmd_count as usize,
            });
            return;
        }
        self.cmd_count += 1;
        self.commands.push(PendingCommand { opcode, payload });
    }

    fn intern_string(&mut self, s: &str) -> Option<u32> {
        if let Some(&idx) = self.string_index.get(s) {
            return Some(idx);
        }
        if self.string_spans.len() + 1 > self.caps.max_strings as usize {
            self.fail(BuildError::TooLarge {
                cap: "maxStrings",
                size: self.string_spans.len() + 1,
                limit: self.caps.max_strings as usize,
            });
            return None;
        }
        let bytes = s.as_bytes();
        let new_len = self.string_bytes.len() + bytes.len();
        if new_len > self.caps.max_string_bytes as usize {
            self.fail(BuildError::TooLarge { cap: "maxStringBytes", size: new_len, limit: self.caps.max_string_bytes as usize });
            return None;
        }
        let offset = self.string_bytes.len() as u32;
        self.string_bytes.extend_from_slice(bytes);
        let idx = self.string_spans.len() as u32;
        self.string_spans.push((offset, bytes.len() as u32));
        self.string_index.insert(s.to_string(), idx);
        Some(idx)
    }

    /// Appends raw bytes as a new blob table entry; returns `None` (not an
    /// error) when a cap would be exceeded, per spec §4.6 `addBlob ->
    /// index|null`.
    pub fn add_blob(&mut self, bytes: &[u8]) -> Option<u32> {
        if self.error.is_some() {
            return None;
        }
        if self.blob_spans.len() as u32 + 1 > self.caps.max_blobs {
            return None;
        }
        let new_len = self.blob_bytes.len() as u64 + bytes.len() as u64;
        if new_len > self.caps.max_blob_bytes as u64 {
            return None;
        }
        let offset = self.blob_bytes.len() as u32;
        self.blob_bytes.extend_from_slice(bytes);
        let idx = self.blob_spans.len() as u32;
        self.blob_spans.push((offset, bytes.len() as u32));
        Some(idx)
    }

    /// Encodes a sequence of styled text segments as one blob, for
    /// `DRAW_TEXT_RUN` (spec §4.6 `addTextRunBlob`). Segment layout: a
    /// `u32` count, then per segment `u32 text_len, bytes, style(16)`.
    pub fn add_text_run_blob(&mut self, segments: &[(&str, CellStyle)]) -> Option<u32> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(segments.len() as u32).to_le_bytes());
        for (text, style) in segments {
            let bytes = text.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
            while buf.len() % 4 != 0 {
                buf.push(0);
            }
            buf.extend_from_slice(&encode_style(style));
        }
        self.add_blob(&buf)
    }

    pub fn clear(&mut self) {
        self.clear_to(0, 0, None);
    }

    pub fn clear_to(&mut self, cols: u16, rows: u16, style: Option<CellStyle>) {
        if self.error.is_some() {
            return;
        }
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&cols.to_le_bytes());
        payload.extend_from_slice(&rows.to_le_bytes());
        payload.extend_from_slice(&[if style.is_some() { 1 } else { 0 }, 0]);
        payload.extend_from_slice(&encode_style(&style.unwrap_or_default()));
        self.push_command(opcode::CLEAR, payload);
    }

    pub fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, style: Option<CellStyle>) {
        if !self.check_dims(&[x as i64, y as i64, w as i64, h as i64]) {
            return;
        }
        let mut payload = Vec::with_capacity(24);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.extend_from_slice(&w.to_le_bytes());
        payload.extend_from_slice(&h.to_le_bytes());
        payload.extend_from_slice(&encode_style(&style.unwrap_or_default()));
        self.push_command(opcode::FILL_RECT, payload);
    }

    pub fn draw_text(&mut self, x: u16, y: u16, text: &str, style: Option<CellStyle>) {
        if !self.check_dims(&[x as i64, y as i64]) {
            return;
        }
        let Some(idx) = self.intern_string(text) else { return };
        let mut payload = Vec::with_capacity(24);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.extend_from_slice(&idx.to_le_bytes());
        payload.extend_from_slice(&encode_style(&style.unwrap_or_default()));
        self.push_command(opcode::DRAW_TEXT, payload);
    }

    pub fn draw_text_run(&mut self, x: u16, y: u16, blob_index: u32) {
        if !self.check_dims(&[x as i64, y as i64]) {
            return;
        }
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.extend_from_slice(&blob_index.to_le_bytes());
        self.push_command(opcode::DRAW_TEXT_RUN, payload);
    }

    pub fn push_clip(&mut self, x: u16, y: u16, w: u16, h: u16) {
        if !self.check_dims(&[x as i64, y as i64, w as i64, h as i64]) {
            return;
        }
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.extend_from_slice(&w.to_le_bytes());
        payload.extend_from_slice(&h.to_le_bytes());
        self.push_command(opcode::PUSH_CLIP, payload);
    }

    pub fn pop_clip(&mut self) {
        if self.error.is_some() {
            return;
        }
        self.push_command(opcode::POP_CLIP, Vec::new());
    }

    pub fn set_cursor(&mut self, state: CursorState) {
        if self.error.is_some() {
            return;
        }
        let (visible, x, y) = match state {
            CursorState::Hidden => (0u8, 0u16, 0u16),
            CursorState::Visible { x, y } => (1u8, x, y),
        };
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.extend_from_slice(&[visible, 0, 0, 0]);
        self.push_command(opcode::SET_CURSOR, payload);
    }

    pub fn hide_cursor(&mut self) {
        self.set_cursor(CursorState::Hidden);
    }

    /// Interns `uri` (if any) and stores `index + 1` as the active link
    /// reference, so `0` unambiguously means "no link" (spec §4.6 "String
    /// interning"). Requires drawlist version ≥ 3.
    pub fn set_link(&mut self, uri: Option<&str>, _id: Option<&str>) -> Option<u32> {
        if self.error.is_some() {
            return None;
        }
        if !self.supports_link() {
            self.fail(BuildError::BadParams("setLink requires drawlist version >= 3".into()));
            return None;
        }
        match uri {
            None => {
                self.active_link_ref = 0;
                None
            }
            Some(u) => {
                let idx = self.intern_string(u)?;
                self.active_link_ref = idx + 1;
                Some(idx)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_canvas(&mut self, x: u16, y: u16, cols: u16, rows: u16, blitter: Blitter, px_width: Option<u16>, px_height: Option<u16>, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if !self.supports_canvas() {
            self.fail(BuildError::BadParams("drawCanvas requires drawlist version >= 4".into()));
            return;
        }
        if !self.check_dims(&[x as i64, y as i64, cols as i64, rows as i64]) {
            return;
        }
        let (sub_w, sub_h) = blitter.subcell_resolution();
        let pw = px_width.unwrap_or_else(|| cols.saturating_mul(sub_w));
        let ph = px_height.unwrap_or_else(|| {
            if cols > 0 {
                (bytes.len() as u32 / 4 / cols as u32).min(u16::MAX as u32) as u16
            } else {
                rows.saturating_mul(sub_h)
            }
        });
        let Some(blob_index) = self.add_blob(bytes) else {
            self.fail(BuildError::TooLarge { cap: "maxBlobBytes/maxBlobs", size: bytes.len(), limit: self.caps.max_blob_bytes as usize });
            return;
        };
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.extend_from_slice(&cols.to_le_bytes());
        payload.extend_from_slice(&rows.to_le_bytes());
        payload.push(blitter.code());
        payload.push(0);
        payload.extend_from_slice(&pw.to_le_bytes());
        payload.extend_from_slice(&ph.to_le_bytes());
        payload.extend_from_slice(&blob_index.to_le_bytes());
        self.push_command(opcode::DRAW_CANVAS, payload);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(
        &mut self,
        x: u16,
        y: u16,
        format: ImageFormat,
        protocol: ImageProtocol,
        fit: ImageFit,
        z_layer: i8,
        image_id: Option<u32>,
        px_width: Option<u16>,
        px_height: Option<u16>,
        bytes: &[u8],
    ) {
        if self.error.is_some() {
            return;
        }
        if !self.supports_image() {
            self.fail(BuildError::BadParams("drawImage requires drawlist version >= 5".into()));
            return;
        }
        if !(-1..=1).contains(&z_layer) {
            self.fail(BuildError::BadParams(format!("zLayer {z_layer} out of {{-1,0,1}}")));
            return;
        }
        let (pw, ph) = match (px_width, px_height, format) {
            (Some(w), Some(h), _) => (w, h),
            (Some(w), None, ImageFormat::Rgba) if w > 0 => (w, (bytes.len() as u32 / 4 / w as u32).min(u16::MAX as u32) as u16),
            (None, Some(h), ImageFormat::Rgba) if h > 0 => ((bytes.len() as u32 / 4 / h as u32).min(u16::MAX as u32) as u16, h),
            (_, _, ImageFormat::Png) => {
                self.fail(BuildError::BadParams("PNG images require explicit pixel dimensions".into()));
                return;
            }
            _ => {
                self.fail(BuildError::BadParams("cannot infer image dimensions".into()));
                return;
            }
        };
        if format == ImageFormat::Rgba && bytes.len() as u64 != pw as u64 * ph as u64 * 4 {
            self.fail(BuildError::BadParams(format!("rgba blob length {} != {}*{}*4", bytes.len(), pw, ph)));
            return;
        }
        let Some(blob_index) = self.add_blob(bytes) else {
            self.fail(BuildError::TooLarge { cap: "maxBlobBytes/maxBlobs", size: bytes.len(), limit: self.caps.max_blob_bytes as usize });
            return;
        };
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.push(format.code());
        payload.push(protocol.code());
        payload.push(fit.code());
        payload.push(z_layer as u8);
        payload.extend_from_slice(&image_id.unwrap_or(u32::MAX).to_le_bytes());
        payload.extend_from_slice(&pw.to_le_bytes());
        payload.extend_from_slice(&ph.to_le_bytes());
        payload.extend_from_slice(&blob_index.to_le_bytes());
        self.push_command(opcode::DRAW_IMAGE, payload);
    }

    /// Lays out the final buffer per spec §4.6 "Build" and returns it (or
    /// the sticky error). With `reuse_output_buffer`, the same internal
    /// `Vec` is reused across calls — callers must not retain the slice
    /// past the next `build()`.
    pub fn build(&mut self) -> BuildResult<&[u8]> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let mut cmd_bytes = Vec::new();
        for cmd in &self.commands {
            let size = 8 + align4(cmd.payload.len() as u32);
            cmd_bytes.extend_from_slice(&cmd.opcode.to_le_bytes());
            cmd_bytes.extend_from_slice(&0u16.to_le_bytes());
            cmd_bytes.extend_from_slice(&size.to_le_bytes());
            cmd_bytes.extend_from_slice(&cmd.payload);
            while cmd_bytes.len() % 4 != 0 {
                cmd_bytes.push(0);
            }
        }
        debug_assert_eq!(cmd_bytes.len() % 4, 0);

        let strings_span_bytes = self.string_spans.len() as u32 * 8;
        let strings_bytes_len = align4(self.string_bytes.len() as u32);
        let blobs_span_bytes = self.blob_spans.len() as u32 * 8;
        let blobs_bytes_len = align4(self.blob_bytes.len() as u32);

        let cmd_offset = HEADER_SIZE;
        let strings_span_offset = cmd_offset + cmd_bytes.len() as u32;
        let strings_bytes_offset = strings_span_offset + strings_span_bytes;
        let blobs_span_offset = strings_bytes_offset + strings_bytes_len;
        let blobs_bytes_offset = blobs_span_offset + blobs_span_bytes;
        let total_size = blobs_bytes_offset + blobs_bytes_len;

        if total_size as usize > self.caps.max_drawlist_bytes as usize {
            let err = BuildError::TooLarge {
                cap: "maxDrawlistBytes",
                size: total_size as usize,
                limit: self.caps.max_drawlist_bytes as usize,
            };
            self.error = Some(err.clone());
            return Err(err);
        }

        let mut out = if self.reuse_output_buffer { std::mem::take(&mut self.output_buffer) } else { Vec::new() };
        out.clear();
        out.reserve(total_size as usize);

        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        out.extend_from_slice(&total_size.to_le_bytes());
        out.extend_from_slice(&cmd_offset.to_le_bytes());
        out.extend_from_slice(&(cmd_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.cmd_count.to_le_bytes());
        out.extend_from_slice(&strings_span_offset.to_le_bytes());
        out.extend_from_slice(&(self.string_spans.len() as u32).to_le_bytes());
        out.extend_from_slice(&strings_bytes_offset.to_le_bytes());
        out.extend_from_slice(&strings_bytes_len.to_le_bytes());
        out.extend_from_slice(&blobs_span_offset.to_le_bytes());
        out.extend_from_slice(&(self.blob_spans.len() as u32).to_le_bytes());
        out.extend_from_slice(&blobs_bytes_offset.to_le_bytes());
        out.extend_from_slice(&blobs_bytes_len.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved
        debug_assert_eq!(out.len() as u32, HEADER_SIZE);

        out.extend_from_slice(&cmd_bytes);
        for &(off, len) in &self.string_spans {
            out.extend_from_slice(&off.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
        }
        out.extend_from_slice(&self.string_bytes);
        while out.len() as u32 % 4 != 0 {
            out.push(0);
        }
        for &(off, len) in &self.blob_spans {
            out.extend_from_slice(&off.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
        }
        out.extend_from_slice(&self.blob_bytes);
        while out.len() as u32 % 4 != 0 {
            out.push(0);
        }

        debug_assert_eq!(out.len() as u32, total_size);

        self.output_buffer = out;
        Ok(&self.output_buffer)
    }
}

fn encode_color(c: Option<Color>) -> [u8; 4] {
    match c {
        None => [0, 0, 0, 0],
        Some(Color::Rgb(r, g, b)) => [1, r, g, b],
        Some(named) => [2, named as u8 + 1, 0, 0],
    }
}

fn decode_color(bytes: [u8; 4]) -> Option<Color> {
    match bytes[0] {
        0 => None,
        1 => Some(Color::Rgb(bytes[1], bytes[2], bytes[3])),
        2 => named_color_from_code(bytes[1].wrapping_sub(1)),
        _ => None,
    }
}

fn named_color_from_code(code: u8) -> Option<Color> {
    use Color::*;
    Some(match code {
        0 => Black,
        1 => Red,
        2 => Green,
        3 => Yellow,
        4 => Blue,
        5 => Magenta,
        6 => Cyan,
        7 => White,
        8 => BrightBlack,
        9 => BrightRed,
        10 => BrightGreen,
        11 => BrightYellow,
        12 => BrightBlue,
        13 => BrightMagenta,
        14 => BrightCyan,
        15 => BrightWhite,
        _ => return None,
    })
}

/// Fixed 16-byte style encoding: fg(4) + bg(4) + attrs(1) + underline
/// style(1) + underline color(4) + pad(2).
fn encode_style(style: &CellStyle) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&encode_color(style.fg));
    out[4..8].copy_from_slice(&encode_color(style.bg));
    out[8] = style.attrs.bits();
    out[9] = style.underline_style.code();
    out[10..14].copy_from_slice(&encode_color(style.underline_color));
    out
}

fn decode_style(bytes: &[u8]) -> CellStyle {
    let fg = decode_color([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let bg = decode_color([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let attrs = Attrs::from_bits_truncate(bytes[8]);
    let underline_style = UnderlineStyle::from_code(bytes[9]).unwrap_or_default();
    let underline_color = decode_color([bytes[10], bytes[11], bytes[12], bytes[13]]);
    CellStyle { fg, bg, attrs, underline_style, underline_color }
}

//--------------------------------------------------------------------------------------------------
// Parser
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("buffer shorter than the 64-byte header")]
    TruncatedHeader,
    #[error("bad magic")]
    BadMagic,
    #[error("misaligned offset or length: {0}")]
    Misaligned(&'static str),
    #[error("buffer truncated while reading {0}")]
    Truncated(&'static str),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),
    #[error("blob index {0} out of range")]
    BadBlobIndex(u32),
    #[error("string index {0} out of range")]
    BadStringIndex(u32),
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

/// Parses a buffer produced by [`DrawlistBuilder::build`] back into a
/// `Drawlist` (spec §8 "Encoder round-trip").
pub fn parse(buf: &[u8]) -> Result<Drawlist, ParseError> {
    if buf.len() < HEADER_SIZE as usize {
        return Err(ParseError::TruncatedHeader);
    }
    if u32_at(buf, 0) != MAGIC {
        return Err(ParseError::BadMagic);
    }
    let version = u32_at(buf, 4);
    let total_size = u32_at(buf, 12);
    if total_size as usize > buf.len() {
        return Err(ParseError::Truncated("total_size"));
    }
    let cmd_offset = u32_at(buf, 16) as usize;
    let cmd_bytes_len = u32_at(buf, 20) as usize;
    let cmd_count = u32_at(buf, 24);
    let strings_span_offset = u32_at(buf, 28) as usize;
    let strings_span_count = u32_at(buf, 32);
    let strings_bytes_offset = u32_at(buf, 36) as usize;
    let strings_bytes_len = u32_at(buf, 40) as usize;
    let blobs_span_offset = u32_at(buf, 44) as usize;
    let blobs_span_count = u32_at(buf, 48);
    let blobs_bytes_offset = u32_at(buf, 52) as usize;
    let blobs_bytes_len = u32_at(buf, 56) as usize;

    if cmd_bytes_len % 4 != 0 {
        return Err(ParseError::Misaligned("command-stream"));
    }

    let strings_bytes = buf
        .get(strings_bytes_offset..strings_bytes_offset + strings_bytes_len)
        .ok_or(ParseError::Truncated("strings-bytes"))?;
    let mut strings = Vec::with_capacity(strings_span_count as usize);
    for i in 0..strings_span_count as usize {
        let base = strings_span_offset + i * 8;
        let off = u32_at(buf, base) as usize;
        let len = u32_at(buf, base + 4) as usize;
        let bytes = strings_bytes.get(off..off + len).ok_or(ParseError::Truncated("string span"))?;
        strings.push(String::from_utf8_lossy(bytes).into_owned());
    }

    let blobs_bytes = buf
        .get(blobs_bytes_offset..blobs_bytes_offset + blobs_bytes_len)
        .ok_or(ParseError::Truncated("blobs-bytes"))?;
    let mut blobs = Vec::with_capacity(blobs_span_count as usize);
    for i in 0..blobs_span_count as usize {
        let base = blobs_span_offset + i * 8;
        let off = u32_at(buf, base) as usize;
        let len = u32_at(buf, base + 4) as usize;
        let bytes = blobs_bytes.get(off..off + len).ok_or(ParseError::Truncated("blob span"))?;
        blobs.push(bytes.to_vec());
    }

    let cmd_region = buf.get(cmd_offset..cmd_offset + cmd_bytes_len).ok_or(ParseError::Truncated("command-stream"))?;
    let mut commands = Vec::with_capacity(cmd_count as usize);
    let mut pos = 0usize;
    while pos < cmd_region.len() {
        if pos + 8 > cmd_region.len() {
            return Err(ParseError::Truncated("command record header"));
        }
        let op = u16_at(cmd_region, pos);
        let size = u32_at(cmd_region, pos + 4) as usize;
        if size % 4 != 0 || pos + size > cmd_region.len() {
            return Err(ParseError::Misaligned("command record size"));
        }
        let payload = &cmd_region[pos + 8..pos + size];
        commands.push(decode_command(op, payload, &strings, &blobs)?);
        pos += size;
    }

    Ok(Drawlist { version, commands })
}

fn decode_command(op: u16, p: &[u8], strings: &[String], blobs: &[Vec<u8>]) -> Result<Command, ParseError> {
    match op {
        opcode::CLEAR => {
            let cols = u16_at(p, 0);
            let rows = u16_at(p, 2);
            let has_style = p[4] != 0;
            let style = if has_style { Some(decode_style(&p[6..22])) } else { None };
            Ok(Command::Clear { cols, rows, style })
        }
        opcode::FILL_RECT => Ok(Command::FillRect {
            x: u16_at(p, 0),
            y: u16_at(p, 2),
            w: u16_at(p, 4),
            h: u16_at(p, 6),
            style: decode_style(&p[8..24]),
        }),
        opcode::DRAW_TEXT => {
            let x = u16_at(p, 0);
            let y = u16_at(p, 2);
            let idx = u32_at(p, 4);
            let text = strings.get(idx as usize).cloned().ok_or(ParseError::BadStringIndex(idx))?;
            Ok(Command::DrawText { x, y, text, style: decode_style(&p[8..24]) })
        }
        opcode::DRAW_TEXT_RUN => {
            let x = u16_at(p, 0);
            let y = u16_at(p, 2);
            let idx = u32_at(p, 4);
            let blob = blobs.get(idx as usize).ok_or(ParseError::BadBlobIndex(idx))?;
            Ok(Command::DrawTextRun { x, y, segments: decode_text_run_blob(blob) })
        }
        opcode::PUSH_CLIP => Ok(Command::PushClip { x: u16_at(p, 0), y: u16_at(p, 2), w: u16_at(p, 4), h: u16_at(p, 6) }),
        opcode::POP_CLIP => Ok(Command::PopClip),
        opcode::SET_CURSOR => {
            let x = u16_at(p, 0);
            let y = u16_at(p, 2);
            let state = if p[4] != 0 { CursorState::Visible { x, y } } else { CursorState::Hidden };
            Ok(Command::SetCursor(state))
        }
        opcode::DRAW_CANVAS => {
            let x = u16_at(p, 0);
            let y = u16_at(p, 2);
            let cols = u16_at(p, 4);
            let rows = u16_at(p, 6);
            let blitter = Blitter::from_code(p[8]).unwrap_or_default();
            let px_width = u16_at(p, 10);
            let px_height = u16_at(p, 12);
            let blob_idx = u32_at(p, 14);
            let bytes = blobs.get(blob_idx as usize).cloned().ok_or(ParseError::BadBlobIndex(blob_idx))?;
            Ok(Command::DrawCanvas { x, y, cols, rows, blitter, px_width, px_height, bytes })
        }
        opcode::DRAW_IMAGE => {
            let x = u16_at(p, 0);
            let y = u16_at(p, 2);
            let format = ImageFormat::from_code(p[4]).unwrap_or_default();
            let protocol = ImageProtocol::from_code(p[5]).unwrap_or_default();
            let fit = ImageFit::from_code(p[6]).unwrap_or_default();
            let z_layer = p[7] as i8;
            let image_id_raw = u32_at(p, 8);
            let image_id = if image_id_raw == u32::MAX { None } else { Some(image_id_raw) };
            let px_width = u16_at(p, 12);
            let px_height = u16_at(p, 14);
            let blob_idx = u32_at(p, 16);
            let bytes = blobs.get(blob_idx as usize).cloned().ok_or(ParseError::BadBlobIndex(blob_idx))?;
            Ok(Command::DrawImage { x, y, format, protocol, fit, z_layer, image_id, px_width, px_height, bytes })
        }
        other => Err(ParseError::UnknownOpcode(other)),
    }
}

fn decode_text_run_blob(blob: &[u8]) -> Vec<(String, CellStyle)> {
    let mut out = Vec::new();
    if blob.len() < 4 {
        return out;
    }
    let count = u32_at(blob, 0) as usize;
    let mut pos = 4usize;
    for _ in 0..count {
        if pos + 4 > blob.len() {
            break;
        }
        let len = u32_at(blob, pos) as usize;
        pos += 4;
        let text = String::from_utf8_lossy(&blob[pos..pos + len]).into_owned();
        pos += len;
        while pos % 4 != 0 {
            pos += 1;
        }
        let style = decode_style(&blob[pos..pos + 16]);
        pos += 16;
        out.push((text, style));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_build_has_well_formed_header() {
        let mut b = DrawlistBuilder::new(5, BuilderCaps::default());
        let bytes = b.build().unwrap().to_vec();
        let dl = parse(&bytes).unwrap();
        assert_eq!(dl.version, 5);
        assert!(dl.commands.is_empty());
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn round_trips_fill_rect_and_draw_text() {
        let mut b = DrawlistBuilder::new(5, BuilderCaps::default());
        b.clear();
        let style = CellStyle::default().with_fg(Color::Red);
        b.fill_rect(0, 0, 10, 2, Some(style));
        b.draw_text(1, 1, "hi", Some(style));
        let bytes = b.build().unwrap().to_vec();
        let dl = parse(&bytes).unwrap();
        assert_eq!(dl.commands.len(), 3);
        assert!(matches!(dl.commands[0], Command::Clear { .. }));
        assert!(matches!(&dl.commands[2], Command::DrawText { text, .. } if text == "hi"));
    }

    #[test]
    fn string_interning_dedups_repeated_values() {
        let mut b = DrawlistBuilder::new(5, BuilderCaps::default());
        b.draw_text(0, 0, "same", None);
        b.draw_text(0, 1, "same", None);
        let bytes = b.build().unwrap().to_vec();
        let dl = parse(&bytes).unwrap();
        let (Command::DrawText { text: a, .. }, Command::DrawText { text: b2, .. }) = (&dl.commands[0], &dl.commands[1]) else {
            panic!("expected two DrawText commands");
        };
        assert_eq!(a, b2);
        // Only one string span should have been written; verify via header counts.
        let strings_span_count = u32_at(&bytes, 32);
        assert_eq!(strings_span_count, 1);
    }

    #[test]
    fn draw_canvas_rejected_below_v4() {
        let mut b = DrawlistBuilder::new(3, BuilderCaps::default());
        b.draw_canvas(0, 0, 2, 2, Blitter::Ascii, None, None, &[0u8; 4]);
        assert!(b.build().is_err());
    }

    #[test]
    fn oversize_drawlist_fails_with_too_large() {
        let caps = BuilderCaps { max_drawlist_bytes: 32, ..BuilderCaps::default() };
        let mut b = DrawlistBuilder::new(5, caps);
        b.draw_text(0, 0, "this string alone exceeds the tiny cap", None);
        match b.build() {
            Err(BuildError::TooLarge { cap, .. }) => assert_eq!(cap, "maxDrawlistBytes"),
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[test]
    fn sticky_error_persists_until_reset() {
        let mut b = DrawlistBuilder::new(3, BuilderCaps::default());
        b.draw_image(0, 0, ImageFormat::Rgba, ImageProtocol::Auto, ImageFit::Fill, 0, None, Some(1), Some(1), &[0, 0, 0, 255]);
        assert!(b.build().is_err());
        b.clear();
        assert!(b.build().is_err());
        b.reset();
        b.clear();
        assert!(b.build().is_ok());
    }

    #[test]
    fn set_cursor_round_trips_visible_and_hidden() {
        let mut b = DrawlistBuilder::new(5, BuilderCaps::default());
        b.set_cursor(CursorState::Visible { x: 3, y: 4 });
        let bytes = b.build().unwrap().to_vec();
        let dl = parse(&bytes).unwrap();
        assert_eq!(dl.commands[0], Command::SetCursor(CursorState::Visible { x: 3, y: 4 }));
    }
}
