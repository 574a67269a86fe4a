use dptrack::{fill, pick, BBox, FramePrior, Params, Result, SpanBounds, Threaded};
use image::{Rgb, RgbImage};

const W: u32 = 320;
const H: u32 = 240;
const SIDE: i32 = 32;
const FRAMES: usize = 31;
const ROUNDS: usize = 3;

/// Same clip as the track demo: a drift that bends halfway through,
/// so a two-anchor straight-line guess is wrong in the middle.
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

fn annotate(t: usize) -> BBox {
    let (x, y) = position(t);
    BBox::new(x, y, x + SIDE, y + SIDE, t).with_label("target")
}

fn mean_center_error(track: &dptrack::Track) -> f32 {
    let mut sum = 0.0;
    for b in track.iter() {
        let (cx, cy) = b.center();
        let (tx, ty) = position(b.frame);
        let (tcx, tcy) = (tx as f32 + SIDE as f32 / 2.0, ty as f32 + SIDE as f32 / 2.0);
        sum += ((cx - tcx).powi(2) + (cy - tcy).powi(2)).sqrt();
    }
    sum / track.len() as f32
}

fn main() -> Result<()> {
    let frames: Vec<RgbImage> = (0..FRAMES).map(frame_at).collect();
    let pool = Threaded::default();
    let params = Params::default();
    let bounds = SpanBounds::default();
    let prior = FramePrior::None;

    let mut anchors = vec![annotate(0), annotate(FRAMES - 1)];

    let first = fill(&anchors, frames.as_slice(), &pool, &params, &bounds, &prior)?;
    println!(
        "with {} anchors: mean center error {:.1} px",
        anchors.len(),
        mean_center_error(&first)
    );

    for round in 1..=ROUNDS {
        let query = pick(&anchors, frames.as_slice(), &pool, &params, &bounds, &prior)?;
        println!(
            "round {}: query frame {} (expected disagreement {:.3})",
            round, query.frame, query.score
        );

        anchors.push(annotate(query.frame));
        anchors.sort_by_key(|b| b.frame);

        let track = fill(&anchors, frames.as_slice(), &pool, &params, &bounds, &prior)?;
        println!(
            "with {} anchors: mean center error {:.1} px",
            anchors.len(),
            mean_center_error(&track)
        );
    }

    Ok(())
}
