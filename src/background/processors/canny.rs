//! Canny edge detection over 8-bit images with any number of channels.
//!
//! Stages: 3×3 Sobel gradients per channel, keeping at each pixel the channel
//! with the largest L1 magnitude, non-maximum suppression along the quantized
//! gradient direction, then hysteresis. Pixels above `high` seed edges, which
//! grow through 8-connected pixels above `low`. No smoothing is applied
//! beforehand. Sampling past the border replicates the edge pixels, so edges
//! may touch the border.

use image::{GrayImage, ImageBuffer, Luma, Pixel};

const EDGE: u8 = 255;

// tan(22.5°) and tan(67.5°) scaled by 2^15
const TAN_22_5: i64 = 13573;
const TAN_67_5: i64 = 79109;
const SHIFT: u32 = 15;

struct Gradients {
    gx: Vec<i32>,
    gy: Vec<i32>,
    magnitude: Vec<i32>,
}

pub fn canny<P>(image: &ImageBuffer<P, Vec<u8>>, low: f32, high: f32) -> GrayImage
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let mut output = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return output;
    }
    let (low, high) = if low <= high { (low, high) } else { (high, low) };

    let w = width as usize;
    let h = height as usize;
    let gradients = sobel(image, w, h);

    // 0 = suppressed, 1 = weak candidate, 2 = strong
    let mut class = vec![0u8; w * h];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = gradients.magnitude[i];
            if (m as f32) <= low {
                continue;
            }
            if !is_local_maximum(&gradients, w, h, x, y) {
                continue;
            }
            if (m as f32) > high {
                class[i] = 2;
                stack.push(i);
            } else {
                class[i] = 1;
            }
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = (i % w, i / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if class[n] == 1 {
                    class[n] = 2;
                    stack.push(n);
                }
            }
        }
    }

    for (i, c) in class.iter().enumerate() {
        if *c == 2 {
            output.put_pixel((i % w) as u32, (i / w) as u32, Luma([EDGE]));
        }
    }
    output
}

fn sobel<P>(image: &ImageBuffer<P, Vec<u8>>, w: usize, h: usize) -> Gradients
where
    P: Pixel<Subpixel = u8>,
{
    let channels = P::CHANNEL_COUNT as usize;
    let raw = image.as_raw();
    let px = |x: isize, y: isize, c: usize| {
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        raw[(y * w + x) * channels + c] as i32
    };

    let mut gradients = Gradients {
        gx: vec![0; w * h],
        gy: vec![0; w * h],
        magnitude: vec![0; w * h],
    };
    for y in 0..h as isize {
        for x in 0..w as isize {
            let i = y as usize * w + x as usize;
            for c in 0..channels {
                let gx = (px(x + 1, y - 1, c) + 2 * px(x + 1, y, c) + px(x + 1, y + 1, c))
                    - (px(x - 1, y - 1, c) + 2 * px(x - 1, y, c) + px(x - 1, y + 1, c));
                let gy = (px(x - 1, y + 1, c) + 2 * px(x, y + 1, c) + px(x + 1, y + 1, c))
                    - (px(x - 1, y - 1, c) + 2 * px(x, y - 1, c) + px(x + 1, y - 1, c));
                let m = gx.abs() + gy.abs();
                if c == 0 || m > gradients.magnitude[i] {
                    gradients.gx[i] = gx;
                    gradients.gy[i] = gy;
                    gradients.magnitude[i] = m;
                }
            }
        }
    }
    gradients
}

fn is_local_maximum(gradients: &Gradients, w: usize, h: usize, x: usize, y: usize) -> bool {
    // Neighbours outside the image count as zero magnitude
    let at = |dx: isize, dy: isize| {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
            0
        } else {
            gradients.magnitude[ny as usize * w + nx as usize]
        }
    };

    let i = y * w + x;
    let (gx, gy) = (gradients.gx[i], gradients.gy[i]);
    let m = gradients.magnitude[i];
    let ax = (gx as i64).abs();
    let ay = (gy as i64).abs() << SHIFT;

    let (before, after) = if ay < ax * TAN_22_5 {
        // mostly horizontal gradient: compare left and right
        (at(-1, 0), at(1, 0))
    } else if ay > ax * TAN_67_5 {
        (at(0, -1), at(0, 1))
    } else if (gx < 0) == (gy < 0) {
        (at(-1, -1), at(1, 1))
    } else {
        (at(1, -1), at(-1, 1))
    };
    m > before && m >= after
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn vertical_step(width: u32, height: u32, split: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| if x < split { Luma([0]) } else { Luma([255]) })
    }

    fn edge_columns(edges: &GrayImage) -> Vec<u32> {
        let mut columns: Vec<u32> = edges
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == EDGE)
            .map(|(x, _, _)| x)
            .collect();
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let flat = GrayImage::from_pixel(16, 16, Luma([128]));
        let edges = canny(&flat, 50.0, 150.0);
        assert!(edges.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_vertical_step_gives_thin_vertical_edge() {
        let edges = canny(&vertical_step(16, 12, 8), 50.0, 150.0);
        let columns = edge_columns(&edges);
        assert_eq!(columns.len(), 1, "edge should be one pixel wide: {columns:?}");
        assert!((7..=8).contains(&columns[0]));

        let column = columns[0];
        let rows = (0..12).filter(|&y| edges.get_pixel(column, y).0[0] == EDGE).count();
        assert_eq!(rows, 12);
    }

    #[test]
    fn test_weak_gradient_below_low_threshold_is_dropped() {
        let soft = GrayImage::from_fn(16, 16, |x, _| if x < 8 { Luma([100]) } else { Luma([110]) });
        let edges = canny(&soft, 50.0, 150.0);
        assert!(edges.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_output_is_binary_and_deterministic() {
        let noisy = GrayImage::from_fn(24, 24, |x, y| Luma([((x * 37 + y * 91) % 256) as u8]));
        let first = canny(&noisy, 50.0, 150.0);
        let second = canny(&noisy, 50.0, 150.0);
        assert_eq!(first, second);
        assert!(first.pixels().all(|p| p.0[0] == 0 || p.0[0] == EDGE));
    }

    #[test]
    fn test_tiny_flat_image_is_blank() {
        let tiny = GrayImage::from_pixel(2, 2, Luma([255]));
        assert_eq!(canny(&tiny, 50.0, 150.0).dimensions(), (2, 2));
        assert!(canny(&tiny, 50.0, 150.0).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_edges_touching_the_border_are_kept() {
        let edges = canny(&vertical_step(8, 8, 1), 50.0, 150.0);
        assert_eq!(edge_columns(&edges), vec![0]);
        assert_eq!(edges.get_pixel(0, 0).0[0], EDGE);
        assert_eq!(edges.get_pixel(0, 7).0[0], EDGE);
    }

    #[test]
    fn test_colour_step_with_equal_brightness_is_an_edge() {
        // Red and grey 54 have the same luma, but the red channel jumps by 201
        let image = RgbImage::from_fn(16, 16, |x, _| {
            if x < 8 { Rgb([255, 0, 0]) } else { Rgb([54, 54, 54]) }
        });
        let edges = canny(&image, 50.0, 150.0);
        assert_eq!(edge_columns(&edges), vec![7]);
    }

    #[test]
    fn test_grey_replicated_across_channels_matches_single_channel() {
        let grey = GrayImage::from_fn(20, 20, |x, y| Luma([((x * 23 + y * 7) % 256) as u8]));
        let rgb = RgbImage::from_fn(20, 20, |x, y| {
            let v = grey.get_pixel(x, y).0[0];
            Rgb([v, v, v])
        });
        assert_eq!(canny(&grey, 50.0, 150.0), canny(&rgb, 50.0, 150.0));
    }
}
