//! A single TSDF sample.

use voxfuse_types::Rgb;

/// Truncated signed distance, confidence weight and optional colour.
///
/// `weight == 0` means never observed; `distance` and `color` carry no
/// meaning in that state. Positive distances lie in front of the surface
/// (free space), negative ones behind it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Voxel {
    pub distance: f32,
    pub weight: f32,
    pub color: Option<Rgb>,
}

impl Voxel {
    pub const UNOBSERVED: Voxel = Voxel {
        distance: 0.0,
        weight: 0.0,
        color: None,
    };

    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }

    /// Fold one signed-distance observation into the running average.
    ///
    /// `sd` is clamped to `[-truncation, truncation]`. The stored weight
    /// saturates at `max_weight` while the divisor keeps using the
    /// unsaturated sum, so a saturated voxel still gives every new sample
    /// the share `increment / (max_weight + increment)`.
    pub fn integrate(
        &mut self,
        sd: f32,
        truncation: f32,
        increment: f32,
        max_weight: f32,
        color: Option<Rgb>,
    ) {
        let sd = sd.clamp(-truncation, truncation);
        let total = self.weight + increment;
        self.distance = (self.distance * self.weight + sd * increment) / total;
        if let Some(sample) = color {
            self.color = Some(match self.color {
                Some(old) if self.weight > 0.0 => old.blend(self.weight, sample, increment),
                _ => sample,
            });
        }
        self.weight = total.min(max_weight);
    }

    /// Forget everything observed so far.
    pub fn carve(&mut self) {
        *self = Voxel::UNOBSERVED;
    }
}
