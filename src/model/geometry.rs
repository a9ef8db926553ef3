/// Affine transform taking world (RAS) coordinates into a volume's voxel
/// (IJK) space. Row-major 4x4 homogeneous matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasToIjk {
    m: [[f64; 4]; 4],
}

impl RasToIjk {
    pub const fn new(m: [[f64; 4]; 4]) -> Self {
        Self { m }
    }

    pub const fn identity() -> Self {
        Self::new([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Applies the transform to a world-space point, dropping the
    /// homogeneous coordinate.
    pub fn apply(&self, ras: [f64; 3]) -> [f64; 3] {
        let h = [ras[0], ras[1], ras[2], 1.0];
        let mut out = [0.0f64; 4];
        for (value, row) in out.iter_mut().zip(self.m.iter()) {
            *value = row.iter().zip(h.iter()).map(|(a, b)| a * b).sum();
        }
        [out[0], out[1], out[2]]
    }
}

impl Default for RasToIjk {
    fn default() -> Self {
        Self::identity()
    }
}
