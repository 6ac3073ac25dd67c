use std::io::Write;

use crate::waveform::WaveformTrace;

/// Where traces and status lines are drawn. Fire-and-forget: a sink that
/// fails to draw must not disturb the session feeding it.
pub trait PreviewSink {
    fn render(&mut self, trace: &WaveformTrace, status: &str);

    /// Like `render`, with the columns that changed since the previous trace
    /// so a display can redraw only those.
    fn render_delta(&mut self, trace: &WaveformTrace, changed: &[usize], status: &str) {
        let _ = changed;
        self.render(trace, status);
    }

    /// A one-off status line, used for errors and session transitions.
    fn report(&mut self, status: &str);
}

const GLYPHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Draws each trace as a single overwritten line of block glyphs.
///
/// Once a full strip is on screen, `render_delta` only rewrites the columns
/// that changed, addressing them with cursor-forward escapes.
pub struct TerminalPreview<W: Write> {
    out: W,
    band_height: u32,
    line: String,
    /// Width of the strip currently on screen, if any.
    drawn: Option<usize>,
}

impl<W: Write> TerminalPreview<W> {
    pub fn new(out: W, band_height: u32) -> Self {
        Self {
            out,
            band_height: band_height.max(1),
            line: String::new(),
            drawn: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn glyph(&self, span: u32) -> char {
        let top = GLYPHS.len() - 1;
        let level = (span as usize * top).div_ceil(self.band_height as usize);
        GLYPHS[level.min(top)]
    }

    fn flush_line(&mut self, line: String) {
        if let Err(e) = self
            .out
            .write_all(line.as_bytes())
            .and_then(|()| self.out.flush())
        {
            tracing::trace!("preview write failed: {e}");
        }
        self.line = line;
    }
}

/// Carriage return, then forward to `col` (0-based).
fn move_to(line: &mut String, col: usize) {
    line.push('\r');
    if col > 0 {
        line.push_str(&format!("\x1b[{col}C"));
    }
}

impl<W: Write> PreviewSink for TerminalPreview<W> {
    fn render(&mut self, trace: &WaveformTrace, status: &str) {
        let mut line = std::mem::take(&mut self.line);
        line.clear();
        line.push('\r');
        line.extend(trace.columns().iter().map(|c| self.glyph(c.high - c.low)));
        line.push(' ');
        line.push_str(status);
        line.push_str("\x1b[K");

        self.drawn = Some(trace.width());
        self.flush_line(line);
    }

    fn render_delta(&mut self, trace: &WaveformTrace, changed: &[usize], status: &str) {
        if self.drawn != Some(trace.width()) {
            self.render(trace, status);
            return;
        }

        let mut line = std::mem::take(&mut self.line);
        line.clear();
        for &col in changed {
            if let Some(c) = trace.columns().get(col) {
                move_to(&mut line, col);
                line.push(self.glyph(c.high - c.low));
            }
        }
        move_to(&mut line, trace.width() + 1);
        line.push_str(status);
        line.push_str("\x1b[K");
        self.flush_line(line);
    }

    fn report(&mut self, status: &str) {
        self.drawn = None;
        if let Err(e) = writeln!(self.out, "\r{status}\x1b[K") {
            tracing::trace!("preview write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::PixelBand;

    const BAND: PixelBand = PixelBand {
        origin: 0,
        height: 64,
    };

    #[test]
    fn silence_renders_as_blank_columns() {
        let mut preview = TerminalPreview::new(Vec::new(), BAND.height);
        preview.render(&WaveformTrace::flat(4, BAND), "REC 00:01");
        let out = String::from_utf8(preview.into_inner()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(out, "\r     REC 00:01\x1b[K");
    }

    #[test]
    fn full_scale_renders_as_full_block() {
        let trace = WaveformTrace::min_max(&[i16::MIN, i16::MAX], 1, BAND);
        let mut preview = TerminalPreview::new(Vec::new(), BAND.height);
        preview.render(&trace, "");
        let out = String::from_utf8(preview.into_inner()).unwrap_or_else(|e| panic!("{e}"));
        assert!(out.starts_with("\r█"));
    }

    #[test]
    fn delta_rewrites_only_changed_columns() {
        let mut preview = TerminalPreview::new(Vec::new(), BAND.height);
        let flat = WaveformTrace::flat(4, BAND);
        preview.render(&flat, "a");

        let loud = WaveformTrace::min_max(&[0, 0, i16::MIN, i16::MAX, 0, 0, 0, 0], 4, BAND);
        preview.render_delta(&loud, &[1], "b");
        let out = String::from_utf8(preview.into_inner()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(out, "\r     a\x1b[K\r\x1b[1C█\r\x1b[5Cb\x1b[K");
    }

    #[test]
    fn delta_without_a_strip_on_screen_draws_in_full() {
        let mut preview = TerminalPreview::new(Vec::new(), BAND.height);
        preview.render(&WaveformTrace::flat(2, BAND), "a");
        preview.report("stopped");
        preview.render_delta(&WaveformTrace::flat(2, BAND), &[], "b");
        let out = String::from_utf8(preview.into_inner()).unwrap_or_else(|e| panic!("{e}"));
        assert!(out.ends_with("\rstopped\x1b[K\n\r   b\x1b[K"), "{out:?}");
    }

    #[test]
    fn report_ends_the_line() {
        let mut preview = TerminalPreview::new(Vec::new(), BAND.height);
        preview.report("stopped");
        let out = String::from_utf8(preview.into_inner()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(out, "\rstopped\x1b[K\n");
    }
}
