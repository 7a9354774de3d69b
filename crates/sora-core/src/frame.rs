//! Raw planar YUV 4:2:0 video frames.

use std::sync::OnceLock;
use std::time::Instant;

use bytes::Bytes;

// MARK: - Clock

/// Microseconds on a process-wide monotonic clock.
///
/// Used to stamp captured frames; only differences between values are
/// meaningful.
pub fn monotonic_us() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64
}

// MARK: - I420Frame

/// A tightly packed I420 frame: Y plane (`width × height`), then U and V
/// planes (`width/2 × height/2` each).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    width: u32,
    height: u32,
    data: Bytes,
    timestamp_us: u64,
}

impl I420Frame {
    /// Number of bytes [`I420Frame`] needs for the given dimensions, or
    /// `None` if that does not fit in `usize`.
    pub fn packed_size(width: u32, height: u32) -> Option<usize> {
        let (w, h) = (usize::try_from(width).ok()?, usize::try_from(height).ok()?);
        let luma = w.checked_mul(h)?;
        let chroma = (w / 2).checked_mul(h / 2)?;
        chroma.checked_mul(2)?.checked_add(luma)
    }

    /// Copy three planes with arbitrary strides into a packed frame.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_from_planes(
        width: u32,
        height: u32,
        y: &[u8],
        stride_y: usize,
        u: &[u8],
        stride_u: usize,
        v: &[u8],
        stride_v: usize,
        timestamp_us: u64,
    ) -> Self {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w / 2, h / 2);
        let mut out = Vec::with_capacity(Self::packed_size(width, height).unwrap_or_default());
        copy_plane(&mut out, y, stride_y, w, h);
        copy_plane(&mut out, u, stride_u, cw, ch);
        copy_plane(&mut out, v, stride_v, cw, ch);
        Self { width, height, data: Bytes::from(out), timestamp_us }
    }

    /// Wrap a contiguous pipe frame buffer (Y, then U, then V) by copying
    /// its planes with strides `width` and `width / 2`.
    pub fn from_contiguous(width: u32, height: u32, buffer: &[u8], timestamp_us: u64) -> Self {
        let (w, h) = (width as usize, height as usize);
        let y_len = w * h;
        let c_len = (w / 2) * (h / 2);
        let y = &buffer[..y_len];
        let u = &buffer[y_len..y_len + c_len];
        let v = &buffer[y_len + c_len..y_len + 2 * c_len];
        Self::copy_from_planes(width, height, y, w, u, w / 2, v, w / 2, timestamp_us)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// The whole packed buffer.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn stride_y(&self) -> usize {
        self.width as usize
    }

    pub fn stride_uv(&self) -> usize {
        self.width as usize / 2
    }

    pub fn y(&self) -> &[u8] {
        &self.data[..self.y_len()]
    }

    pub fn u(&self) -> &[u8] {
        let start = self.y_len();
        &self.data[start..start + self.chroma_len()]
    }

    pub fn v(&self) -> &[u8] {
        let start = self.y_len() + self.chroma_len();
        &self.data[start..start + self.chroma_len()]
    }

    /// Convert to RGBA8 (BT.601, limited range) for display.
    pub fn to_rgba(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = (w / 2, h / 2);
        let (y_plane, u_plane, v_plane) = (self.y(), self.u(), self.v());
        let mut rgba = Vec::with_capacity(w * h * 4);

        for row in 0..h {
            let crow = (row / 2).min(ch.saturating_sub(1));
            for col in 0..w {
                let ccol = (col / 2).min(cw.saturating_sub(1));
                let luma = i32::from(y_plane[row * w + col]);
                let (cb, cr) = if cw == 0 || ch == 0 {
                    (128, 128)
                } else {
                    (
                        i32::from(u_plane[crow * cw + ccol]),
                        i32::from(v_plane[crow * cw + ccol]),
                    )
                };
                let c = luma - 16;
                let d = cb - 128;
                let e = cr - 128;
                rgba.push(clamp_u8((298 * c + 409 * e + 128) >> 8));
                rgba.push(clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8));
                rgba.push(clamp_u8((298 * c + 516 * d + 128) >> 8));
                rgba.push(u8::MAX);
            }
        }
        rgba
    }

    fn y_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn chroma_len(&self) -> usize {
        (self.width as usize / 2) * (self.height as usize / 2)
    }
}

fn copy_plane(out: &mut Vec<u8>, plane: &[u8], stride: usize, width: usize, rows: usize) {
    for row in 0..rows {
        let start = row * stride;
        out.extend_from_slice(&plane[start..start + width]);
    }
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, y: u8, u: u8, v: u8) -> I420Frame {
        let (w, h) = (width as usize, height as usize);
        let mut buf = vec![y; w * h];
        buf.extend(std::iter::repeat(u).take((w / 2) * (h / 2)));
        buf.extend(std::iter::repeat(v).take((w / 2) * (h / 2)));
        I420Frame::from_contiguous(width, height, &buf, 0)
    }

    #[test]
    fn planes_are_split_in_order() {
        let frame = solid(4, 2, 1, 2, 3);
        assert_eq!(frame.y(), &[1; 8]);
        assert_eq!(frame.u(), &[2; 2]);
        assert_eq!(frame.v(), &[3; 2]);
        assert_eq!(frame.stride_y(), 4);
        assert_eq!(frame.stride_uv(), 2);
    }

    #[test]
    fn strided_planes_are_packed() {
        // 2x2 luma with stride 4, chroma 1x1 with stride 3.
        let y = [10, 11, 0, 0, 12, 13, 0, 0];
        let u = [20, 0, 0];
        let v = [30, 0, 0];
        let frame = I420Frame::copy_from_planes(2, 2, &y, 4, &u, 3, &v, 3, 7);
        assert_eq!(frame.data().as_ref(), &[10, 11, 12, 13, 20, 30]);
        assert_eq!(frame.timestamp_us(), 7);
    }

    #[test]
    fn black_and_white_convert_exactly() {
        let black = solid(2, 2, 16, 128, 128).to_rgba();
        assert_eq!(&black[..4], &[0, 0, 0, 255]);

        let white = solid(2, 2, 235, 128, 128).to_rgba();
        assert_eq!(&white[..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn red_has_dominant_red_channel() {
        // BT.601 limited-range red: Y=81, U=90, V=240.
        let rgba = solid(2, 2, 81, 90, 240).to_rgba();
        assert!(rgba[0] > 240, "r = {}", rgba[0]);
        assert!(rgba[1] < 10, "g = {}", rgba[1]);
        assert!(rgba[2] < 10, "b = {}", rgba[2]);
    }

    #[test]
    fn packed_size_drops_odd_chroma_columns() {
        assert_eq!(I420Frame::packed_size(640, 480), Some(640 * 480 + 2 * (320 * 240)));
        assert_eq!(I420Frame::packed_size(5, 3), Some(15 + 2 * 2));
    }

    #[test]
    fn packed_size_overflow_is_none() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(I420Frame::packed_size(u32::MAX, u32::MAX), None);
        assert_eq!(I420Frame::packed_size(0, u32::MAX), Some(0));
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let a = monotonic_us();
        let b = monotonic_us();
        assert!(b >= a);
    }
}
