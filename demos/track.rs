use dptrack::{fill, BBox, FramePrior, Params, Result, SpanBounds, Threaded};
use image::{Rgb, RgbImage};

const W: u32 = 320;
const H: u32 = 240;
const SIDE: i32 = 32;
const FRAMES: usize = 31;

/// Diagonal drift with a knee halfway through the clip.
fn position(t: usize) -> (i32, i32) {
    let t = t as i32;
    if t <= 15 {
        (20 + 4 * t, 40 + 2 * t)
    } else {
        (80 + 2 * (t - 15), 70 + 3 * (t - 15))
    }
}

fn frame_at(t: usize) -> RgbImage {
    let (x, y) = position(t);
    let mut img = RgbImage::from_pixel(W, H, Rgb([24, 30, 36]));

    for dy in 0..SIDE {
        for dx in 0..SIDE {
            let (px, py) = (x + dx, y + dy);
            if px < 0 || py < 0 || px >= W as i32 || py >= H as i32 {
                continue;
            }
            let edge = dx < 3 || dy < 3 || dx >= SIDE - 3 || dy >= SIDE - 3;
            let color = if edge {
                Rgb([235, 235, 235])
            } else {
                Rgb([200, 50, 40])
            };
            img.put_pixel(px as u32, py as u32, color);
        }
    }

    img
}

fn mark(t: usize) -> BBox {
    let (x, y) = position(t);
    BBox::new(x, y, x + SIDE, y + SIDE, t).with_label("target")
}

fn main() -> Result<()> {
    let frames: Vec<RgbImage> = (0..FRAMES).map(frame_at).collect();
    let anchors = vec![mark(0), mark(15), mark(30)];

    let track = fill(
        &anchors,
        frames.as_slice(),
        &Threaded::default(),
        &Params::default(),
        &SpanBounds::default(),
        &FramePrior::None,
    )?;

    println!("solved {} frames from {} anchors", track.len(), anchors.len());
    for b in track.iter() {
        let (tx, ty) = position(b.frame);
        println!(
            "frame {:>2}: ({:>3}, {:>3})  truth ({:>3}, {:>3}){}",
            b.frame,
            b.xtl,
            b.ytl,
            tx,
            ty,
            if b.generated { "" } else { "  [anchor]" }
        );
    }

    Ok(())
}
