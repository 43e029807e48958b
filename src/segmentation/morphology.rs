//! Binary morphology and connected-component selection
//!
//! Masks are `GrayImage`s where any nonzero value is foreground; outputs use
//! 0 and 1. Rectangular kernels are anchored at `k / 2`, so a `k`-wide window
//! covers offsets `-(k/2) ..= k - 1 - k/2`. Pixels outside the image never
//! take part in a window.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Foreground value written by every operation here
pub const FOREGROUND: u8 = 1;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Erode,
    Dilate,
}

/// Window bounds for position `i` in a line of `len` pixels
fn window(i: usize, len: usize, k: usize) -> (usize, usize) {
    let anchor = k / 2;
    let start = i.saturating_sub(anchor);
    let end = (i + (k - 1 - anchor)).min(len - 1);
    (start, end)
}

/// One pass over a line using prefix counts of set pixels
fn filter_line(src: &[u8], dst: &mut [u8], k: usize, op: Op, prefix: &mut Vec<u32>) {
    let len = src.len();
    prefix.clear();
    prefix.push(0);
    let mut running = 0u32;
    for &v in src {
        running += u32::from(v != 0);
        prefix.push(running);
    }
    for (i, out) in dst.iter_mut().enumerate() {
        let (start, end) = window(i, len, k);
        let set = prefix.get(end + 1).copied().unwrap_or(0) - prefix.get(start).copied().unwrap_or(0);
        let hit = match op {
            Op::Dilate => set > 0,
            Op::Erode => set as usize == end - start + 1,
        };
        *out = if hit { FOREGROUND } else { 0 };
    }
}

/// Separable rectangular filter: rows first, then columns
fn rect_filter(mask: &GrayImage, kw: u32, kh: u32, op: Op) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return mask.clone();
    }
    let mut prefix = Vec::with_capacity(w.max(h) + 1);

    let mut rows = vec![0u8; w * h];
    for (src, dst) in mask.as_raw().chunks_exact(w).zip(rows.chunks_exact_mut(w)) {
        filter_line(src, dst, kw.max(1) as usize, op, &mut prefix);
    }

    let mut out = vec![0u8; w * h];
    let mut column = vec![0u8; h];
    let mut filtered = vec![0u8; h];
    for x in 0..w {
        for (y, slot) in column.iter_mut().enumerate() {
            *slot = rows.get(y * w + x).copied().unwrap_or(0);
        }
        filter_line(&column, &mut filtered, kh.max(1) as usize, op, &mut prefix);
        for (y, &v) in filtered.iter().enumerate() {
            if let Some(slot) = out.get_mut(y * w + x) {
                *slot = v;
            }
        }
    }

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}

#[must_use]
pub fn erode(mask: &GrayImage, k: u32) -> GrayImage {
    rect_filter(mask, k, k, Op::Erode)
}

#[must_use]
pub fn dilate(mask: &GrayImage, k: u32) -> GrayImage {
    rect_filter(mask, k, k, Op::Dilate)
}

/// Erosion followed by dilation; removes specks smaller than the kernel
#[must_use]
pub fn open(mask: &GrayImage, k: u32) -> GrayImage {
    dilate(&erode(mask, k), k)
}

/// Dilation followed by erosion; fills gaps smaller than the kernel
#[must_use]
pub fn close(mask: &GrayImage, k: u32) -> GrayImage {
    erode(&dilate(mask, k), k)
}

/// Keep the largest 8-connected component
///
/// Ties go to the component reached first in raster order. An empty mask
/// stays empty.
#[must_use]
pub fn largest_component(mask: &GrayImage) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0);
    if max_label == 0 {
        return GrayImage::new(mask.width(), mask.height());
    }

    let mut areas = vec![0u64; max_label as usize + 1];
    let mut first_seen = vec![usize::MAX; max_label as usize + 1];
    for (i, p) in labels.pixels().enumerate() {
        let label = p[0] as usize;
        if label == 0 {
            continue;
        }
        if let Some(area) = areas.get_mut(label) {
            *area += 1;
        }
        if let Some(seen) = first_seen.get_mut(label) {
            *seen = (*seen).min(i);
        }
    }

    let best = (1..areas.len())
        .max_by_key(|&l| {
            (
                areas.get(l).copied().unwrap_or(0),
                std::cmp::Reverse(first_seen.get(l).copied().unwrap_or(usize::MAX)),
            )
        })
        .unwrap_or(1) as u32;

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if labels.get_pixel(x, y)[0] == best { FOREGROUND } else { 0 }])
    })
}

/// Pixelwise AND of two masks of equal size
#[must_use]
pub fn and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let both = a.get_pixel(x, y)[0] != 0
            && b.get_pixel_checked(x, y).is_some_and(|p| p[0] != 0);
        Luma([if both { FOREGROUND } else { 0 }])
    })
}

#[must_use]
pub fn count_nonzero(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().filter(|&&v| v != 0).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> GrayImage {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        GrayImage::from_fn(w, h, |x, y| {
            Luma([u8::from(rows[y as usize].as_bytes()[x as usize] == b'#')])
        })
    }

    fn render(mask: &GrayImage) -> Vec<String> {
        (0..mask.height())
            .map(|y| {
                (0..mask.width())
                    .map(|x| if mask.get_pixel(x, y)[0] != 0 { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_dilate_3x3() {
        let mask = mask_from(&[".....", ".....", "..#..", ".....", "....."]);
        assert_eq!(
            render(&dilate(&mask, 3)),
            vec![".....", ".###.", ".###.", ".###.", "....."]
        );
    }

    #[test]
    fn test_even_kernel_anchor() {
        // k = 4 covers offsets -2..=1
        let mask = mask_from(&["....#...."]);
        assert_eq!(render(&rect_filter(&mask, 4, 1, Op::Dilate)), vec!["...####.."]);
    }

    #[test]
    fn test_erode_ignores_outside_pixels() {
        let mask = mask_from(&["###", "###", "###"]);
        assert_eq!(render(&erode(&mask, 3)), vec!["###", "###", "###"]);
    }

    #[test]
    fn test_open_removes_specks() {
        let mask = mask_from(&[
            "#.......",
            "........",
            "..####..",
            "..####..",
            "..####..",
            "..####..",
            "........",
            ".......#",
        ]);
        let opened = open(&mask, 3);
        assert_eq!(opened.get_pixel(0, 0)[0], 0);
        assert_eq!(opened.get_pixel(7, 7)[0], 0);
        assert_eq!(count_nonzero(&opened), 16);
    }

    #[test]
    fn test_close_fills_hole() {
        let mask = mask_from(&[
            "#####",
            "#####",
            "##.##",
            "#####",
            "#####",
        ]);
        assert_eq!(count_nonzero(&close(&mask, 3)), 25);
    }

    #[test]
    fn test_largest_component_keeps_biggest() {
        let mask = mask_from(&[
            "##......",
            "##......",
            "....###.",
            "....###.",
            "....###.",
            "........",
        ]);
        let kept = largest_component(&mask);
        assert_eq!(count_nonzero(&kept), 9);
        assert_eq!(kept.get_pixel(0, 0)[0], 0);
        assert_eq!(kept.get_pixel(5, 3)[0], FOREGROUND);
    }

    #[test]
    fn test_largest_component_tie_prefers_first() {
        let mask = mask_from(&["##..##", "##..##"]);
        let kept = largest_component(&mask);
        assert_eq!(render(&kept), vec!["##....", "##...."]);
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mask = mask_from(&["#...", ".#..", "..#.", "...#", "....", "##.."]);
        assert_eq!(count_nonzero(&largest_component(&mask)), 4);
    }

    #[test]
    fn test_empty_mask_stays_empty() {
        let mask = GrayImage::new(6, 4);
        assert_eq!(count_nonzero(&largest_component(&mask)), 0);
        assert_eq!(count_nonzero(&close(&mask, 10)), 0);
    }
}
