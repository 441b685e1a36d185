//! Ball frame rasterizer
//!
//! Produces RGB24 frames: black background, white disc. The buffer fill is
//! O(width * height) per frame and dominates the cost at large resolutions;
//! the disc itself is only rasterized inside its bounding box.

use super::physics::BallState;

pub const BACKGROUND: [u8; 3] = [0, 0, 0];
pub const BALL_COLOR: [u8; 3] = [255, 255, 255];

/// Render a ball state into a freshly allocated RGB24 buffer.
pub fn render(state: &BallState) -> Vec<u8> {
    let mut buf = vec![0u8; state.width as usize * state.height as usize * 3];
    render_into(state, &mut buf);
    buf
}

/// Render a ball state into an existing RGB24 buffer of `width * height * 3` bytes.
pub fn render_into(state: &BallState, buf: &mut [u8]) {
    let width = state.width as i64;
    let height = state.height as i64;
    debug_assert_eq!(buf.len(), (width * height * 3) as usize);

    for px in buf.chunks_exact_mut(3) {
        px.copy_from_slice(&BACKGROUND);
    }

    let cx = state.x.round() as i64;
    let cy = state.y.round() as i64;
    let r = state.radius;
    let r2 = r * r;
    let reach = r.ceil() as i64;

    let x0 = (cx - reach).max(0);
    let x1 = (cx + reach).min(width - 1);
    let y0 = (cy - reach).max(0);
    let y1 = (cy + reach).min(height - 1);

    for j in y0..=y1 {
        let dy = (j - cy) as f64;
        for i in x0..=x1 {
            let dx = (i - cx) as f64;
            if dx * dx + dy * dy <= r2 {
                let idx = ((j * width + i) * 3) as usize;
                buf[idx..idx + 3].copy_from_slice(&BALL_COLOR);
            }
        }
    }
}

/// Read one pixel from an RGB24 buffer.
#[cfg(test)]
pub fn pixel_at(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 3] {
    let idx = (y as usize * width as usize + x as usize) * 3;
    [buf[idx], buf[idx + 1], buf[idx + 2]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::format::Resolution;

    fn ball(x: f64, y: f64, radius: f64, width: u32, height: u32) -> BallState {
        BallState {
            x,
            y,
            dx: 0.0,
            dy: 0.0,
            radius,
            width,
            height,
        }
    }

    #[test]
    fn test_buffer_size() {
        let state = BallState::initial(Resolution::VGA);
        assert_eq!(render(&state).len(), 640 * 480 * 3);
    }

    #[test]
    fn test_disc_matches_distance_rule() {
        let state = ball(20.4, 15.6, 5.0, 40, 30);
        let buf = render(&state);
        // center rounds to (20, 16)
        for y in 0..30u32 {
            for x in 0..40u32 {
                let dx = x as f64 - 20.0;
                let dy = y as f64 - 16.0;
                let expected = if dx * dx + dy * dy <= 25.0 {
                    BALL_COLOR
                } else {
                    BACKGROUND
                };
                assert_eq!(pixel_at(&buf, 40, x, y), expected, "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_boundary_pixels_are_inclusive() {
        let buf = render(&ball(10.0, 10.0, 3.0, 20, 20));
        assert_eq!(pixel_at(&buf, 20, 13, 10), BALL_COLOR);
        assert_eq!(pixel_at(&buf, 20, 10, 7), BALL_COLOR);
        assert_eq!(pixel_at(&buf, 20, 14, 10), BACKGROUND);
        assert_eq!(pixel_at(&buf, 20, 13, 13), BACKGROUND);
    }

    #[test]
    fn test_overshooting_ball_is_clipped() {
        let buf = render(&ball(21.0, 5.0, 4.0, 20, 10));
        assert_eq!(pixel_at(&buf, 20, 19, 5), BALL_COLOR);
        assert_eq!(pixel_at(&buf, 20, 0, 5), BACKGROUND);
    }

    #[test]
    fn test_render_into_clears_previous_frame() {
        let mut buf = render(&ball(5.0, 5.0, 3.0, 20, 10));
        render_into(&ball(15.0, 5.0, 3.0, 20, 10), &mut buf);
        assert_eq!(pixel_at(&buf, 20, 5, 5), BACKGROUND);
        assert_eq!(pixel_at(&buf, 20, 15, 5), BALL_COLOR);
    }
}
