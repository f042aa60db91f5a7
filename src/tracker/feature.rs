//! Shape histogram descriptor used by the histogram distance term.

use nalgebra::{Point3, Vector3};

/// Computes per-axis occupancy histograms over a point cloud.
pub struct FeatureDescriptor<'a> {
    cloud: &'a [Point3<f64>],
}

impl<'a> FeatureDescriptor<'a> {
    pub fn new(cloud: &'a [Point3<f64>]) -> Self {
        Self { cloud }
    }

    /// Histogram of `bin_size` bins per axis (x, then y, then z), each bin the
    /// fraction of points falling into it.
    ///
    /// Every point is counted, so identical clouds always give identical bins.
    pub fn compute_histogram(&self, bin_size: usize) -> Vec<f64> {
        let mut feature = vec![0.0; 3 * bin_size];
        if self.cloud.is_empty() || bin_size == 0 {
            return feature;
        }

        let (min, max) = self.min_max();
        let step = (max - min) / bin_size as f64 + Vector3::repeat(1e-6);

        for p in self.cloud {
            for axis in 0..3 {
                let offset = (p[axis] - min[axis]) / step[axis];
                let bin = (offset.floor() as usize).min(bin_size - 1);
                feature[axis * bin_size + bin] += 1.0;
            }
        }

        let n = self.cloud.len() as f64;
        feature.iter_mut().for_each(|v| *v /= n);
        feature
    }

    fn min_max(&self) -> (Vector3<f64>, Vector3<f64>) {
        self.cloud.iter().fold(
            (Vector3::repeat(f64::MAX), Vector3::repeat(f64::MIN)),
            |(min, max), p| (min.inf(&p.coords), max.sup(&p.coords)),
        )
    }
}
