//! Intrinsic calibration records.

use serde::{Deserialize, Serialize};

/// Focal lengths, principal point and calibrated image size of a sensor.
///
/// Pixel centres sit at integer coordinates, so for an image of `width`
/// columns the valid horizontal range is `[-0.5, width - 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Horizontal focal length (pixels).
    pub fx: f32,
    /// Vertical focal length (pixels).
    pub fy: f32,
    /// Principal point column (pixels).
    pub cx: f32,
    /// Principal point row (pixels).
    pub cy: f32,
    /// Calibrated image width (pixels).
    pub width: u32,
    /// Calibrated image height (pixels).
    pub height: u32,
}

impl Intrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Intrinsics with the principal point at the image centre and square
    /// pixels; handy for synthetic sensors.
    pub fn centred(focal: f32, width: u32, height: u32) -> Self {
        Self::new(
            focal,
            focal,
            (width as f32 - 1.0) * 0.5,
            (height as f32 - 1.0) * 0.5,
            width,
            height,
        )
    }

    /// True when the record can be used for projection at all.
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx != 0.0
            && self.fy != 0.0
            && self.width > 0
            && self.height > 0
    }

    /// Pixel → normalised image-plane coordinates (before distortion removal).
    pub(crate) fn normalise(&self, u: f32, v: f32) -> (f32, f32) {
        ((u - self.cx) / self.fx, (v - self.cy) / self.fy)
    }

    /// Normalised image-plane coordinates → pixel.
    pub(crate) fn denormalise(&self, x: f32, y: f32) -> (f32, f32) {
        (self.fx * x + self.cx, self.fy * y + self.cy)
    }
}

/// Brown–Conrady radial-tangential distortion (OpenCV ordering).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RadialTangential {
    #[serde(default)]
    pub k1: f32,
    #[serde(default)]
    pub k2: f32,
    #[serde(default)]
    pub p1: f32,
    #[serde(default)]
    pub p2: f32,
    #[serde(default)]
    pub k3: f32,
}

impl RadialTangential {
    pub fn is_identity(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }

    /// Apply distortion to undistorted normalised coordinates.
    pub fn distort(&self, x: f32, y: f32) -> (f32, f32) {
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + dx, y * radial + dy)
    }

    /// Invert [`distort`][Self::distort] by fixed-point iteration.
    pub fn undistort(&self, xd: f32, yd: f32) -> (f32, f32) {
        if self.is_identity() {
            return (xd, yd);
        }
        let (mut x, mut y) = (xd, yd);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (xd - dx) / radial;
            y = (yd - dy) / radial;
        }
        (x, y)
    }
}

/// Equidistant fisheye coefficients (Kannala–Brandt, OpenCV `fisheye`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquidistantCoefficients {
    #[serde(default)]
    pub k1: f32,
    #[serde(default)]
    pub k2: f32,
    #[serde(default)]
    pub k3: f32,
    #[serde(default)]
    pub k4: f32,
}

impl EquidistantCoefficients {
    /// θ_d = θ (1 + k1 θ² + k2 θ⁴ + k3 θ⁶ + k4 θ⁸)
    pub fn distort_angle(&self, theta: f32) -> f32 {
        let t2 = theta * theta;
        theta * (1.0 + t2 * (self.k1 + t2 * (self.k2 + t2 * (self.k3 + t2 * self.k4))))
    }

    /// Solve `distort_angle(θ) = theta_d` for θ with Newton's method.
    pub fn undistort_angle(&self, theta_d: f32) -> f32 {
        let mut theta = theta_d;
        for _ in 0..UNDISTORT_ITERATIONS {
            let t2 = theta * theta;
            let f = self.distort_angle(theta) - theta_d;
            let df = 1.0
                + t2 * (3.0 * self.k1 + t2 * (5.0 * self.k2 + t2 * (7.0 * self.k3 + t2 * 9.0 * self.k4)));
            if df.abs() < f32::EPSILON {
                break;
            }
            let step = f / df;
            theta -= step;
            if step.abs() < 1e-7 {
                break;
            }
        }
        theta
    }
}

const UNDISTORT_ITERATIONS: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_intrinsics_put_principal_point_mid_image() {
        let k = Intrinsics::centred(500.0, 640, 480);
        assert!((k.cx - 319.5).abs() < 1e-6);
        assert!((k.cy - 239.5).abs() < 1e-6);
        assert!(k.is_valid());
    }

    #[test]
    fn zero_focal_length_is_invalid() {
        let k = Intrinsics::new(0.0, 500.0, 320.0, 240.0, 640, 480);
        assert!(!k.is_valid());
    }

    #[test]
    fn radial_tangential_undistort_inverts_distort() {
        let d = RadialTangential {
            k1: -0.28,
            k2: 0.07,
            p1: 0.0002,
            p2: -0.0003,
            k3: 0.0,
        };
        let (xd, yd) = d.distort(0.31, -0.22);
        let (x, y) = d.undistort(xd, yd);
        assert!((x - 0.31).abs() < 1e-4, "x={x}");
        assert!((y + 0.22).abs() < 1e-4, "y={y}");
    }

    #[test]
    fn equidistant_undistort_inverts_distort() {
        let k = EquidistantCoefficients {
            k1: 0.02,
            k2: -0.005,
            k3: 0.001,
            k4: 0.0,
        };
        let theta = 1.1;
        let back = k.undistort_angle(k.distort_angle(theta));
        assert!((back - theta).abs() < 1e-4, "theta={back}");
    }
}
