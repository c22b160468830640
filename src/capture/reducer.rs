// ROI reducer - collapses a frame into one intensity value and a motion score
//
// The region of interest is split into a grid of blocks. One pass over the
// ROI accumulates per-block sums of the selected channel; the frame value is
// the mean of the block means and the motion score is the mean absolute
// change of the block means since the previous frame. Only the block means
// are kept between frames.

use crate::config::{RegionOfInterest, SampleChannel};
use crate::error::FrameError;

use super::frame::{Frame, PixelFormat};

/// Per-frame reduction result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    /// Mean ROI intensity, 0.0-255.0
    pub value: f64,
    /// Mean absolute block delta against the previous frame (0.0 for the first)
    pub motion: f64,
}

/// Pixel rectangle `[x0, x1) x [y0, y1)` resolved from a fractional ROI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl PixelRect {
    fn resolve(roi: &RegionOfInterest, width: u32, height: u32) -> Option<Self> {
        let w = width as f64;
        let h = height as f64;
        let x0 = (roi.x0 * w).floor().max(0.0) as usize;
        let y0 = (roi.y0 * h).floor().max(0.0) as usize;
        let x1 = ((roi.x1 * w).ceil() as usize).min(width as usize);
        let y1 = ((roi.y1 * h).ceil() as usize).min(height as usize);
        if x1 > x0 && y1 > y0 {
            Some(Self { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    fn width(&self) -> usize {
        self.x1 - self.x0
    }

    fn height(&self) -> usize {
        self.y1 - self.y0
    }
}

/// Stateful ROI reducer; remembers the previous frame's block means
pub struct RoiReducer {
    roi: RegionOfInterest,
    channel: SampleChannel,
    grid: usize,
    block_means: Vec<f64>,
    previous: Option<Vec<f64>>,
}

impl RoiReducer {
    pub fn new(roi: RegionOfInterest, channel: SampleChannel, grid: u32) -> Self {
        let grid = grid.max(1) as usize;
        Self {
            roi,
            channel,
            grid,
            block_means: Vec::with_capacity(grid * grid),
            previous: None,
        }
    }

    /// Forget the previous frame; the next motion score is 0
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Reduce a validated frame
    pub fn reduce(&mut self, frame: &Frame<'_>) -> Result<Reduction, FrameError> {
        let rect = PixelRect::resolve(&self.roi, frame.width, frame.height).ok_or(
            FrameError::InvalidRegion {
                width: frame.width,
                height: frame.height,
            },
        )?;

        // Never more blocks than pixels along an axis
        let grid_x = self.grid.min(rect.width());
        let grid_y = self.grid.min(rect.height());

        self.block_means.clear();
        for by in 0..grid_y {
            let row_start = rect.y0 + by * rect.height() / grid_y;
            let row_end = rect.y0 + (by + 1) * rect.height() / grid_y;
            for bx in 0..grid_x {
                let col_start = rect.x0 + bx * rect.width() / grid_x;
                let col_end = rect.x0 + (bx + 1) * rect.width() / grid_x;
                let sum = self.block_sum(frame, col_start..col_end, row_start..row_end);
                let count = (col_end - col_start) * (row_end - row_start);
                self.block_means.push(sum as f64 / count as f64);
            }
        }

        let value = self.block_means.iter().sum::<f64>() / self.block_means.len() as f64;

        let motion = match self.previous.as_ref() {
            Some(prev) if prev.len() == self.block_means.len() => {
                prev.iter()
                    .zip(&self.block_means)
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f64>()
                    / self.block_means.len() as f64
            }
            _ => 0.0,
        };

        match self.previous.as_mut() {
            Some(prev) => {
                prev.clear();
                prev.extend_from_slice(&self.block_means);
            }
            None => self.previous = Some(self.block_means.clone()),
        }

        Ok(Reduction { value, motion })
    }

    fn block_sum(
        &self,
        frame: &Frame<'_>,
        cols: std::ops::Range<usize>,
        rows: std::ops::Range<usize>,
    ) -> u64 {
        let width = frame.width as usize;
        let stride = frame.format.stride();
        let use_green = self.channel == SampleChannel::Green;

        let mut sum = 0u64;
        for y in rows {
            let row = &frame.data[(y * width + cols.start) * stride..(y * width + cols.end) * stride];
            sum += match frame.format {
                PixelFormat::Gray8 | PixelFormat::Yuv420 => {
                    row.iter().map(|&p| p as u64).sum::<u64>()
                }
                _ if frame.format.is_rgb() && use_green => {
                    row.chunks_exact(stride).map(|px| px[1] as u64).sum::<u64>()
                }
                _ => row
                    .chunks_exact(stride)
                    .map(|px| rec601_luma(px[0], px[1], px[2]) as u64)
                    .sum::<u64>(),
            };
        }
        sum
    }
}

/// Integer Rec.601 luma
#[inline]
fn rec601_luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(data: &[u8], width: u32, height: u32) -> Frame<'_> {
        Frame::new(data, width, height, PixelFormat::Gray8)
    }

    #[test]
    fn test_uniform_gray_value() {
        let data = vec![100u8; 64 * 48];
        let mut reducer = RoiReducer::new(RegionOfInterest::default(), SampleChannel::Green, 8);
        let reduction = reducer.reduce(&gray_frame(&data, 64, 48)).unwrap();
        assert!((reduction.value - 100.0).abs() < 1e-9);
        assert_eq!(reduction.motion, 0.0);
    }

    #[test]
    fn test_roi_ignores_border() {
        // Bright border, dark center
        let (w, h) = (40usize, 40usize);
        let mut data = vec![255u8; w * h];
        for y in 10..30 {
            for x in 10..30 {
                data[y * w + x] = 20;
            }
        }
        let mut reducer = RoiReducer::new(RegionOfInterest::default(), SampleChannel::Luma, 4);
        let reduction = reducer.reduce(&gray_frame(&data, 40, 40)).unwrap();
        assert!((reduction.value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_green_channel_selected_for_rgb() {
        let pixels = 16 * 16;
        let data: Vec<u8> = (0..pixels).flat_map(|_| [10u8, 200, 30]).collect();
        let mut reducer = RoiReducer::new(RegionOfInterest::full(), SampleChannel::Green, 4);
        let frame = Frame::new(&data, 16, 16, PixelFormat::Rgb8);
        let reduction = reducer.reduce(&frame).unwrap();
        assert!((reduction.value - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_luma_channel_for_rgba() {
        let pixels = 8 * 8;
        let data: Vec<u8> = (0..pixels).flat_map(|_| [100u8, 100, 100, 255]).collect();
        let mut reducer = RoiReducer::new(RegionOfInterest::full(), SampleChannel::Luma, 2);
        let frame = Frame::new(&data, 8, 8, PixelFormat::Rgba8);
        let reduction = reducer.reduce(&frame).unwrap();
        // (77 + 150 + 29) * 100 >> 8 == 100
        assert!((reduction.value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_yuv_reads_only_luma_plane() {
        let (w, h) = (8usize, 8usize);
        let len = PixelFormat::Yuv420.frame_len(8, 8).unwrap();
        let mut data = vec![0u8; len];
        data[..w * h].fill(50);
        data[w * h..].fill(255);
        let mut reducer = RoiReducer::new(RegionOfInterest::full(), SampleChannel::Green, 4);
        let frame = Frame::new(&data, 8, 8, PixelFormat::Yuv420);
        let reduction = reducer.reduce(&frame).unwrap();
        assert!((reduction.value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_motion_score_tracks_block_changes() {
        let (w, h) = (32usize, 32usize);
        let still = vec![100u8; w * h];
        let mut moved = still.clone();
        // Brighten the top-left quarter of the full-frame ROI
        for y in 0..16 {
            for x in 0..16 {
                moved[y * w + x] = 180;
            }
        }

        let mut reducer = RoiReducer::new(RegionOfInterest::full(), SampleChannel::Luma, 2);
        reducer.reduce(&gray_frame(&still, 32, 32)).unwrap();
        let reduction = reducer.reduce(&gray_frame(&moved, 32, 32)).unwrap();
        // One of four blocks changed by 80
        assert!((reduction.motion - 20.0).abs() < 1e-9);

        reducer.reset();
        let reduction = reducer.reduce(&gray_frame(&moved, 32, 32)).unwrap();
        assert_eq!(reduction.motion, 0.0);
    }

    #[test]
    fn test_tiny_frame_shrinks_grid() {
        let data = vec![7u8; 2 * 2];
        let mut reducer = RoiReducer::new(RegionOfInterest::default(), SampleChannel::Luma, 8);
        let reduction = reducer.reduce(&gray_frame(&data, 2, 2)).unwrap();
        assert!((reduction.value - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_roi_is_rejected() {
        let data = vec![0u8; 4];
        let roi = RegionOfInterest {
            x0: 0.5,
            y0: 0.0,
            x1: 0.5,
            y1: 1.0,
        };
        let mut reducer = RoiReducer::new(roi, SampleChannel::Luma, 2);
        assert_eq!(
            reducer.reduce(&gray_frame(&data, 2, 2)),
            Err(FrameError::InvalidRegion {
                width: 2,
                height: 2
            })
        );
    }
}
