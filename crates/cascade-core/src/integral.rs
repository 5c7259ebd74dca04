//! Integral (cumulative sum) tables and O(1) rectangle sums.
//!
//! Both tables carry one padding row and column, so they are
//! `(height + 1) × (width + 1)` in row-major order and entry `(x, y)` holds the
//! sum over all pixels strictly above and to the left of it.

/// Borrowed view over a sum table and a squared-sum table.
#[derive(Clone, Copy, Debug)]
pub struct IntegralSums<'a> {
    /// Source image width in pixels (the table is one wider).
    pub width: usize,
    /// Source image height in pixels (the table is one taller).
    pub height: usize,
    sum: &'a [u32],
    sq_sum: &'a [f64],
}

impl<'a> IntegralSums<'a> {
    /// Wrap existing tables. Returns `None` if either buffer is not
    /// `(width + 1) * (height + 1)` long.
    pub fn new(width: usize, height: usize, sum: &'a [u32], sq_sum: &'a [f64]) -> Option<Self> {
        let len = (width + 1) * (height + 1);
        if sum.len() != len || sq_sum.len() != len {
            return None;
        }
        Some(Self {
            width,
            height,
            sum,
            sq_sum,
        })
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.width + 1
    }

    /// Linear index of table entry `(x, y)`.
    #[inline]
    pub fn offset(&self, x: usize, y: usize) -> usize {
        y * self.stride() + x
    }

    #[inline]
    pub fn sum_table(&self) -> &'a [u32] {
        self.sum
    }

    /// Pixel sum over `w × h` pixels starting at `(x, y)`.
    #[inline]
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u32 {
        let tl = self.offset(x, y);
        let bl = tl + h * self.stride();
        corner_sum(self.sum, tl, tl + w, bl, bl + w)
    }

    /// Sum of squared pixels over `w × h` pixels starting at `(x, y)`.
    #[inline]
    pub fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let tl = self.offset(x, y);
        let bl = tl + h * self.stride();
        self.sq_sum[tl] - self.sq_sum[tl + w] - self.sq_sum[bl] + self.sq_sum[bl + w]
    }
}

/// Four-corner inclusion–exclusion on an unsigned table.
///
/// Intermediate terms wrap; the final value is exact because the true region
/// sum is non-negative and fits in `u32`.
#[inline]
pub fn corner_sum(table: &[u32], tl: usize, tr: usize, bl: usize, br: usize) -> u32 {
    table[tl]
        .wrapping_sub(table[tr])
        .wrapping_sub(table[bl])
        .wrapping_add(table[br])
}

/// Owned sum and squared-sum tables built from an 8-bit grayscale buffer.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    pub width: usize,
    pub height: usize,
    sum: Vec<u32>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    /// Build both tables from a row-major `w × h` grayscale buffer.
    pub fn from_gray(img: &[u8], w: usize, h: usize) -> Self {
        assert_eq!(img.len(), w * h, "grayscale buffer does not match dimensions");

        let stride = w + 1;
        let mut sum = vec![0u32; stride * (h + 1)];
        let mut sq_sum = vec![0f64; stride * (h + 1)];

        for y in 0..h {
            let mut row_sum = 0u32;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = img[y * w + x] as u32;
                row_sum += v;
                row_sq += (v * v) as u64;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride].wrapping_add(row_sum);
                sq_sum[idx] = sq_sum[idx - stride] + row_sq as f64;
            }
        }

        Self {
            width: w,
            height: h,
            sum,
            sq_sum,
        }
    }

    #[inline]
    pub fn as_sums(&self) -> IntegralSums<'_> {
        IntegralSums {
            width: self.width,
            height: self.height,
            sum: &self.sum,
            sq_sum: &self.sq_sum,
        }
    }
}
