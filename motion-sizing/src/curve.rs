use glam::Vec2;

/// Cubic bezier easing between two keys, VMD style.
///
/// The curve runs from (0, 0) to (1, 1); `start` and `end` are the two inner control
/// points. The x axis is interval progress, the y axis is interpolation weight.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Curve {
    pub start: Vec2,
    pub end: Vec2,
}

impl Default for Curve {
    fn default() -> Self {
        Self::LINEAR
    }
}

impl Curve {
    pub const LINEAR: Curve = Curve {
        start: Vec2::new(20.0 / 127.0, 20.0 / 127.0),
        end: Vec2::new(107.0 / 127.0, 107.0 / 127.0),
    };

    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self {
            start: start.clamp(Vec2::ZERO, Vec2::ONE),
            end: end.clamp(Vec2::ZERO, Vec2::ONE),
        }
    }

    /// Builds a curve from VMD byte control points (0..=127).
    pub fn from_vmd_bytes(x1: u8, y1: u8, x2: u8, y2: u8) -> Self {
        let scale = |v: u8| f32::from(v.min(127)) / 127.0;
        Self::new(Vec2::new(scale(x1), scale(y1)), Vec2::new(scale(x2), scale(y2)))
    }

    pub fn is_linear(&self) -> bool {
        (self.start.x - self.start.y).abs() <= 1.0e-6 && (self.end.x - self.end.y).abs() <= 1.0e-6
    }

    /// Interpolation weight at `progress` (0..1) through the interval.
    pub fn evaluate(&self, progress: f32) -> f32 {
        if !(progress > 0.0) {
            return 0.0;
        }
        if progress >= 1.0 {
            return 1.0;
        }
        if self.is_linear() {
            return progress;
        }
        let s = self.solve_parameter(progress);
        bezier(s, self.start.y, self.end.y)
    }

    /// Splits the curve at interval `progress` so that the first half governs
    /// `[0, progress]` and the second half `[progress, 1]`, both renormalized.
    pub fn split(&self, progress: f32) -> (Curve, Curve) {
        if self.is_linear() || !(progress > 0.0) || progress >= 1.0 {
            return (*self, *self);
        }

        let s = self.solve_parameter(progress);
        let p0 = Vec2::ZERO;
        let p1 = self.start;
        let p2 = self.end;
        let p3 = Vec2::ONE;

        let p01 = p0.lerp(p1, s);
        let p12 = p1.lerp(p2, s);
        let p23 = p2.lerp(p3, s);
        let p012 = p01.lerp(p12, s);
        let p123 = p12.lerp(p23, s);
        let mid = p012.lerp(p123, s);

        let first = normalize_segment(p0, mid, p01, p012);
        let second = normalize_segment(mid, p3, p123, p23);
        (first, second)
    }

    fn solve_parameter(&self, progress: f32) -> f32 {
        // x(s) is monotonic for control points inside the unit square.
        let mut lo = 0.0f32;
        let mut hi = 1.0f32;
        let mut s = progress;
        for _ in 0..32 {
            let x = bezier(s, self.start.x, self.end.x);
            if (x - progress).abs() <= 1.0e-7 {
                break;
            }
            if x < progress {
                lo = s;
            } else {
                hi = s;
            }
            s = (lo + hi) * 0.5;
        }
        s
    }
}

fn bezier(s: f32, c1: f32, c2: f32) -> f32 {
    let inv = 1.0 - s;
    3.0 * inv * inv * s * c1 + 3.0 * inv * s * s * c2 + s * s * s
}

fn normalize_segment(from: Vec2, to: Vec2, c1: Vec2, c2: Vec2) -> Curve {
    let span = to - from;
    if span.x.abs() <= 1.0e-6 || span.y.abs() <= 1.0e-6 {
        return Curve::LINEAR;
    }
    Curve::new((c1 - from) / span, (c2 - from) / span)
}

/// The four curves of a bone key: translation per axis and rotation.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct BoneCurves {
    pub translate_x: Curve,
    pub translate_y: Curve,
    pub translate_z: Curve,
    pub rotate: Curve,
}

impl BoneCurves {
    pub fn split(&self, progress: f32) -> (BoneCurves, BoneCurves) {
        let (tx0, tx1) = self.translate_x.split(progress);
        let (ty0, ty1) = self.translate_y.split(progress);
        let (tz0, tz1) = self.translate_z.split(progress);
        let (r0, r1) = self.rotate.split(progress);
        (
            BoneCurves {
                translate_x: tx0,
                translate_y: ty0,
                translate_z: tz0,
                rotate: r0,
            },
            BoneCurves {
                translate_x: tx1,
                translate_y: ty1,
                translate_z: tz1,
                rotate: r1,
            },
        )
    }
}
