//! Pure frame interpolation helpers.

use crate::frame::{LandmarkFrame, Vec3};

/// Position of an elapsed time within a landmark sequence: the index of the
/// frame at or before it and the blend factor toward the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located {
    pub index: usize,
    pub next: usize,
    pub t: f64,
}

/// Find the frames bracketing `elapsed_ms`.
///
/// Scans forward for the largest index whose timestamp is `<= elapsed_ms`.
/// Times before the first frame resolve to frame 0 and times past the end to
/// the last frame. Equal timestamps blend fully to the later frame.
pub fn locate(frames: &[LandmarkFrame], elapsed_ms: f64) -> Option<Located> {
    let last = frames.len().checked_sub(1)?;

    let mut index = 0;
    for (i, frame) in frames.iter().enumerate() {
        if frame.timestamp_ms <= elapsed_ms {
            index = i;
        } else {
            break;
        }
    }

    let next = (index + 1).min(last);
    let span = frames[next].timestamp_ms - frames[index].timestamp_ms;
    let t = if span == 0.0 {
        1.0
    } else {
        ((elapsed_ms - frames[index].timestamp_ms) / span).clamp(0.0, 1.0)
    };

    Some(Located { index, next, t })
}

/// Blend two frames. Point arrays are interpolated pairwise; when the two
/// sides differ in length, or one side is absent, `a`'s array is used if
/// present, otherwise `b`'s.
pub fn interpolate_frames(a: &LandmarkFrame, b: &LandmarkFrame, t: f64) -> LandmarkFrame {
    LandmarkFrame {
        timestamp_ms: a.timestamp_ms + (b.timestamp_ms - a.timestamp_ms) * t,
        pose: interpolate_points(a.pose.as_deref(), b.pose.as_deref(), t),
        left_hand: interpolate_points(a.left_hand.as_deref(), b.left_hand.as_deref(), t),
        right_hand: interpolate_points(a.right_hand.as_deref(), b.right_hand.as_deref(), t),
        face: interpolate_points(a.face.as_deref(), b.face.as_deref(), t),
    }
}

pub fn interpolate_points(a: Option<&[Vec3]>, b: Option<&[Vec3]>, t: f64) -> Option<Vec<Vec3>> {
    match (a, b) {
        (Some(a), Some(b)) if a.len() == b.len() => {
            Some(a.iter().zip(b).map(|(p, q)| p.lerp(*q, t)).collect())
        }
        (Some(a), _) => Some(a.to_vec()),
        (None, b) => b.map(<[Vec3]>::to_vec),
    }
}

/// Sample a sequence at `elapsed_ms`.
pub fn sample(frames: &[LandmarkFrame], elapsed_ms: f64) -> Option<LandmarkFrame> {
    let located = locate(frames, elapsed_ms)?;
    Some(interpolate_frames(
        &frames[located.index],
        &frames[located.next],
        located.t,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: f64, x: f64) -> LandmarkFrame {
        LandmarkFrame::new(ts).with_pose(vec![Vec3::new(x, x, x); 2])
    }

    #[test]
    fn test_locate_brackets() {
        let frames = vec![frame(0.0, 0.0), frame(100.0, 1.0), frame(300.0, 2.0)];
        assert_eq!(locate(&frames, 50.0), Some(Located { index: 0, next: 1, t: 0.5 }));
        assert_eq!(locate(&frames, 200.0), Some(Located { index: 1, next: 2, t: 0.5 }));
        assert_eq!(locate(&frames, 100.0), Some(Located { index: 1, next: 2, t: 0.0 }));
    }

    #[test]
    fn test_locate_out_of_range() {
        let frames = vec![frame(100.0, 0.0), frame(200.0, 1.0)];
        assert_eq!(locate(&frames, 10.0), Some(Located { index: 0, next: 1, t: 0.0 }));
        assert_eq!(locate(&frames, 900.0), Some(Located { index: 1, next: 1, t: 1.0 }));
        assert_eq!(locate(&[], 0.0), None);
    }

    #[test]
    fn test_equal_timestamps_blend_fully() {
        let frames = vec![frame(0.0, 0.0), frame(0.0, 1.0), frame(50.0, 2.0)];
        let located = locate(&frames, 0.0).unwrap();
        assert_eq!(located.index, 1);
        assert_eq!(located.t, 0.0);

        let frames = vec![frame(10.0, 0.0), frame(10.0, 1.0)];
        let located = locate(&frames, 5.0).unwrap();
        assert_eq!(located.t, 1.0);
    }

    #[test]
    fn test_midpoint() {
        let a = frame(0.0, 0.0);
        let b = frame(1000.0, 1.0);
        let mid = interpolate_frames(&a, &b, 0.5);
        assert_eq!(mid.timestamp_ms, 500.0);
        for point in mid.pose.unwrap() {
            assert_eq!(point, Vec3::new(0.5, 0.5, 0.5));
        }
    }

    #[test]
    fn test_shape_mismatch_passes_through() {
        let a = LandmarkFrame::new(0.0).with_pose(vec![Vec3::new(1.0, 1.0, 1.0); 3]);
        let b = LandmarkFrame::new(10.0).with_pose(vec![Vec3::default(); 2]);
        assert_eq!(interpolate_frames(&a, &b, 0.5).pose, a.pose);

        let a = LandmarkFrame::new(0.0);
        let b = LandmarkFrame::new(10.0).with_hands(Some(vec![Vec3::new(0.2, 0.2, 0.2); 21]), None);
        let blended = interpolate_frames(&a, &b, 0.3);
        assert_eq!(blended.left_hand, b.left_hand);
        assert!(blended.right_hand.is_none());
    }
}
