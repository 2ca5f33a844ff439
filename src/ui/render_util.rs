use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::types::DetectionUpdate;

/// Turns a processed frame plus its overlay into a GPUI image.
pub(super) fn frame_to_image(update: &DetectionUpdate) -> Option<Arc<RenderImage>> {
    let frame = &update.frame;
    let bgra = compose_bgra(update);
    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, bgra)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

/// Composites the overlay onto the frame and reorders channels to the BGRA
/// layout GPUI uploads directly.
fn compose_bgra(update: &DetectionUpdate) -> Vec<u8> {
    let frame = &update.frame;
    let mut pixels = frame.rgba.clone();
    update
        .overlay
        .composite_onto(&mut pixels, frame.width, frame.height);
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    pixels
}
