//! Preview overlay rendering.

use image::{DynamicImage, Rgba, RgbaImage};

use crate::models::{BitMask, Detection};

/// Fixed palette cycled per rendered instance.
const PALETTE: [[u8; 3]; 8] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
];

/// Tint valid detection masks and outline their boxes over the source image.
pub fn render(image: &DynamicImage, detections: &[Detection], valid: &[usize]) -> RgbaImage {
    let mut out = image.to_rgba8();
    for (slot, &index) in valid.iter().enumerate() {
        let detection = &detections[index];
        let color = PALETTE[slot % PALETTE.len()];
        tint_mask(&mut out, &detection.mask, color);
        draw_box(&mut out, detection.bbox, color);
    }
    out
}

fn tint_mask(out: &mut RgbaImage, mask: &BitMask, color: [u8; 3]) {
    let width = mask.width() as usize;
    for index in mask.set_indices() {
        let x = (index % width) as u32;
        let y = (index / width) as u32;
        if x < out.width() && y < out.height() {
            let pixel = out.get_pixel_mut(x, y);
            for channel in 0..3 {
                let blended = (u16::from(pixel.0[channel]) * 2 + u16::from(color[channel])) / 3;
                pixel.0[channel] = blended as u8;
            }
        }
    }
}

fn draw_box(out: &mut RgbaImage, bbox: [i32; 4], color: [u8; 3]) {
    let max_x = out.width() as i32 - 1;
    let max_y = out.height() as i32 - 1;
    let x0 = bbox[0].clamp(0, max_x);
    let y0 = bbox[1].clamp(0, max_y);
    let x1 = bbox[2].clamp(0, max_x);
    let y1 = bbox[3].clamp(0, max_y);
    let stroke = Rgba([color[0], color[1], color[2], 255]);
    for x in x0..=x1 {
        out.put_pixel(x as u32, y0 as u32, stroke);
        out.put_pixel(x as u32, y1 as u32, stroke);
    }
    for y in y0..=y1 {
        out.put_pixel(x0 as u32, y as u32, stroke);
        out.put_pixel(x1 as u32, y as u32, stroke);
    }
}
