use crate::types::{FrameSize, Landmark};

/// Landmark pairs joined by an edge: four segments per digit from the wrist,
/// then the knuckle line.
pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

pub const VISIBILITY_THRESHOLD: f32 = 0.5;
pub const SKELETON_LINE_THICKNESS: i32 = 2;
pub const POINT_RADIUS: i32 = 5;

const LINE_COLOR: [u8; 4] = [0, 255, 0, 255];
const POINT_COLOR: [u8; 4] = [255, 0, 0, 255];

/// A 2D drawing target in pixel coordinates.
pub trait Canvas {
    fn size(&self) -> FrameSize;
    fn clear(&mut self);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: [u8; 4], thickness: i32);
    fn fill_circle(&mut self, center: (f32, f32), radius: i32, color: [u8; 4]);
}

/// Clears the canvas and draws every visible edge, then every visible point.
pub fn draw_landmarks<C: Canvas>(canvas: &mut C, landmarks: &[Landmark]) {
    canvas.clear();

    let size = canvas.size();
    let (w, h) = (size.width as f32, size.height as f32);
    let to_px = |lm: &Landmark| (lm.x * w, lm.y * h);
    let visible = |lm: &&Landmark| lm.visibility > VISIBILITY_THRESHOLD;

    for &(a, b) in CONNECTIONS {
        if let (Some(pa), Some(pb)) = (
            landmarks.get(a).filter(visible),
            landmarks.get(b).filter(visible),
        ) {
            canvas.stroke_line(to_px(pa), to_px(pb), LINE_COLOR, SKELETON_LINE_THICKNESS);
        }
    }

    for lm in landmarks.iter().filter(visible) {
        canvas.fill_circle(to_px(lm), POINT_RADIUS, POINT_COLOR);
    }
}

/// Transparent RGBA layer drawn over the video frame.
#[derive(Clone, Debug)]
pub struct OverlaySurface {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl OverlaySurface {
    pub fn new(size: FrameSize) -> Self {
        Self {
            rgba: vec![0; size.width as usize * size.height as usize * 4],
            width: size.width,
            height: size.height,
        }
    }

    /// Matches the surface to `size`; resizing drops the previous contents.
    pub fn resize(&mut self, size: FrameSize) {
        if self.width != size.width || self.height != size.height {
            *self = Self::new(size);
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) as usize) * 4;
        self.rgba
            .get(idx..idx + 4)
            .and_then(|px| px.try_into().ok())
    }

    /// Alpha-composites the surface onto an RGBA frame of the same size.
    pub fn composite_onto(&self, frame_rgba: &mut [u8], width: u32, height: u32) {
        if width != self.width || height != self.height {
            return;
        }
        for (dst, src) in frame_rgba.chunks_exact_mut(4).zip(self.rgba.chunks_exact(4)) {
            let alpha = src[3] as u16;
            if alpha == 0 {
                continue;
            }
            for c in 0..3 {
                dst[c] = ((src[c] as u16 * alpha + dst[c] as u16 * (255 - alpha)) / 255) as u8;
            }
        }
    }
}

impl Canvas for OverlaySurface {
    fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    fn clear(&mut self) {
        self.rgba.fill(0);
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: [u8; 4], thickness: i32) {
        let (mut x0, mut y0) = (from.0 as i32, from.1 as i32);
        let (x1, y1) = (to.0 as i32, to.1 as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = thickness.max(1) / 2;

        loop {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if ox.abs() + oy.abs() <= radius {
                        self.put_pixel(x0 + ox, y0 + oy, color);
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: i32, color: [u8; 4]) {
        let (cx, cy) = (center.0 as i32, center.1 as i32);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }
}

impl OverlaySurface {
    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy * self.width + ux) as usize) * 4;
        if let Some(px) = self.rgba.get_mut(idx..idx + 4) {
            px.copy_from_slice(&color);
        }
    }
}
