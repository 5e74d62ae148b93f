//! Scrolling waterfall buffer: one RGBA row per spectrum snapshot.

/// Bytes per RGBA pixel.
const PIXEL_BYTES: usize = 4;
/// Fixed green channel of the gradient.
const GREEN_LEVEL: u8 = 80;
/// Guard against division by zero on a flat spectrum.
const FLAT_EPSILON: f64 = 1e-6;

/// Fixed-size W×H RGBA framebuffer with scroll-on-push semantics.
///
/// Row 0 always holds the most recently pushed spectrum; each push shifts
/// the history down one row and discards the oldest. Spectra whose length
/// differs from the buffer width are resampled by nearest-index mapping.
pub struct WaterfallBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    rows_pushed: u64,
}

impl WaterfallBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "waterfall dimensions must be non-zero");
        Self {
            width,
            height,
            pixels: vec![0; width * height * PIXEL_BYTES],
            rows_pushed: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Total spectra pushed since construction.
    pub fn rows_pushed(&self) -> u64 {
        self.rows_pushed
    }

    /// Raw RGBA contents, row 0 first.
    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    /// One row of RGBA pixels.
    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.width * PIXEL_BYTES;
        &self.pixels[y * stride..(y + 1) * stride]
    }

    /// Scroll the history down one row and render `spectrum` into row 0.
    ///
    /// An empty spectrum has no defined min/max and is ignored.
    pub fn push_row(&mut self, spectrum: &[f64]) {
        if spectrum.is_empty() {
            return;
        }
        let stride = self.width * PIXEL_BYTES;
        self.pixels.copy_within(0..(self.height - 1) * stride, stride);

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in spectrum {
            min = min.min(v);
            max = max.max(v);
        }
        let range = max - min + FLAT_EPSILON;

        for x in 0..self.width {
            let index = x * spectrum.len() / self.width;
            let normalized = (spectrum[index] - min) / range;
            let level = (normalized * 255.0).floor() as u8;
            let pixel = &mut self.pixels[x * PIXEL_BYTES..(x + 1) * PIXEL_BYTES];
            pixel[0] = level;
            pixel[1] = GREEN_LEVEL;
            pixel[2] = 255 - level;
            pixel[3] = 255;
        }
        self.rows_pushed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Spectrum with a single peak at `peak`, so each rendered row is unique.
    fn peaked_spectrum(len: usize, peak: usize) -> Vec<f64> {
        let mut s = vec![0.0; len];
        s[peak] = 1.0;
        s
    }

    #[test]
    fn newest_row_is_row_zero_and_history_scrolls() {
        let mut wf = WaterfallBuffer::new(8, 4);
        let mut expected_rows: Vec<Vec<u8>> = Vec::new();
        for k in 0..10 {
            wf.push_row(&peaked_spectrum(8, k % 8));
            expected_rows.push(wf.row(0).to_vec());
        }
        // After k pushes, row y must equal the row rendered for push k-1-y.
        for y in 0..wf.height() {
            let pushed_at = expected_rows.len() - 1 - y;
            assert_eq!(wf.row(y), &expected_rows[pushed_at][..], "row {y}");
        }
        assert_eq!(wf.rows_pushed(), 10);
    }

    #[test]
    fn rows_beyond_height_are_discarded() {
        let mut wf = WaterfallBuffer::new(4, 2);
        wf.push_row(&peaked_spectrum(4, 0));
        let oldest = wf.row(0).to_vec();
        wf.push_row(&peaked_spectrum(4, 1));
        wf.push_row(&peaked_spectrum(4, 2));
        assert!(wf.row(0) != &oldest[..] && wf.row(1) != &oldest[..]);
    }

    #[test]
    fn flat_spectrum_renders_single_stable_color() {
        let mut wf = WaterfallBuffer::new(16, 2);
        wf.push_row(&[-87.3; 33]);
        let row = wf.row(0);
        for pixel in row.chunks_exact(4) {
            // Flat spectrum normalizes to 0 via the epsilon guard.
            assert_eq!(pixel, &[0, GREEN_LEVEL, 255, 255]);
        }
    }

    #[test]
    fn nearest_index_resampling() {
        let mut wf = WaterfallBuffer::new(4, 1);
        // len 8 onto width 4: columns sample indices 0, 2, 4, 6.
        let spectrum = [1.0, 0.0, 0.5, 0.0, 0.25, 0.0, 0.75, 0.0];
        wf.push_row(&spectrum);
        let row = wf.row(0);
        let reds: Vec<u8> = row.chunks_exact(4).map(|p| p[0]).collect();
        let expect = |v: f64| ((v - 0.0) / (1.0 - 0.0 + FLAT_EPSILON) * 255.0).floor() as u8;
        assert_eq!(reds, vec![expect(1.0), expect(0.5), expect(0.25), expect(0.75)]);
    }

    #[test]
    fn empty_spectrum_is_ignored() {
        let mut wf = WaterfallBuffer::new(4, 2);
        wf.push_row(&peaked_spectrum(4, 1));
        let before = wf.as_rgba().to_vec();
        wf.push_row(&[]);
        assert_eq!(wf.as_rgba(), &before[..]);
        assert_eq!(wf.rows_pushed(), 1);
    }

    #[test]
    fn gradient_endpoints() {
        let mut wf = WaterfallBuffer::new(2, 1);
        wf.push_row(&[0.0, 100.0]);
        let row = wf.row(0);
        // Min bin: cold (blue); max bin: hot (red).
        assert_eq!(&row[0..4], &[0, GREEN_LEVEL, 255, 255]);
        assert_eq!(row[4], 254);
        assert_eq!(row[6], 1);
        assert_eq!(row[7], 255);
    }
}
