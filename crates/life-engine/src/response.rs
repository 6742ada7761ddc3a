// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Per-orientation tensor response of a unit-weight fascicle
//!
//! For a fascicle with unit tangent `t`, the signal attenuation along
//! diffusion direction `g_d` with b-value `b_d` is
//!
//! ```text
//! k_d = exp(-b_d * s * (λ_ax (g_d·t)² + λ_rad (1 - (g_d·t)²)))
//! ```
//!
//! The forward model stores the demeaned kernel `k_d - mean_d k_d` because
//! the fit target is the demeaned signal.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use life_config::ResponseConfig;
use life_structures::{GradientTable, LifeError, Result};

/// Axially symmetric tensor with diffusivities in µm²/ms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorResponse {
    pub axial_diffusivity: f64,
    pub radial_diffusivity: f64,
    /// Converts gradient-table b-values (s/mm²) to ms/µm²
    pub bvalue_scale: f64,
}

impl Default for TensorResponse {
    fn default() -> Self {
        Self {
            axial_diffusivity: 1.0,
            radial_diffusivity: 0.0,
            bvalue_scale: 1e-3,
        }
    }
}

impl TensorResponse {
    pub fn new(axial_diffusivity: f64, radial_diffusivity: f64) -> Self {
        Self {
            axial_diffusivity,
            radial_diffusivity,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ResponseConfig) -> Self {
        Self {
            axial_diffusivity: config.axial_diffusivity,
            radial_diffusivity: config.radial_diffusivity,
            bvalue_scale: config.bvalue_scale,
        }
    }

    /// # Errors
    /// `InvalidInput` for negative or non-finite parameters, or when both
    /// diffusivities are zero.
    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = |x: f64| x.is_finite() && x >= 0.0;
        if !finite_non_negative(self.axial_diffusivity)
            || !finite_non_negative(self.radial_diffusivity)
        {
            return Err(LifeError::InvalidInput(format!(
                "diffusivities must be finite and non-negative (axial {}, radial {})",
                self.axial_diffusivity, self.radial_diffusivity
            )));
        }
        if self.axial_diffusivity == 0.0 && self.radial_diffusivity == 0.0 {
            return Err(LifeError::InvalidInput(
                "axial and radial diffusivity cannot both be zero".to_string(),
            ));
        }
        if !(self.bvalue_scale.is_finite() && self.bvalue_scale > 0.0) {
            return Err(LifeError::InvalidInput(format!(
                "b-value scale must be positive, got {}",
                self.bvalue_scale
            )));
        }
        Ok(())
    }

    /// Precompute unit directions and scaled b-values for one acquisition
    pub fn kernel(&self, gradients: &GradientTable) -> ResponseKernel {
        ResponseKernel {
            response: *self,
            directions: (0..gradients.len()).map(|d| gradients.unit_direction(d)).collect(),
            scaled_bvalues: gradients.bvalues.iter().map(|b| b * self.bvalue_scale).collect(),
        }
    }
}

/// A [`TensorResponse`] bound to a gradient table
#[derive(Debug, Clone)]
pub struct ResponseKernel {
    response: TensorResponse,
    directions: Vec<Vector3<f64>>,
    scaled_bvalues: Vec<f64>,
}

impl ResponseKernel {
    pub fn n_directions(&self) -> usize {
        self.directions.len()
    }

    /// Raw attenuation `k_d` for a unit tangent
    pub fn attenuation(&self, tangent: &Vector3<f64>, d: usize) -> f64 {
        let cos2 = self.directions[d].dot(tangent).powi(2);
        let adc = self.response.axial_diffusivity * cos2
            + self.response.radial_diffusivity * (1.0 - cos2);
        (-self.scaled_bvalues[d] * adc).exp()
    }

    /// Add the demeaned kernel for `tangent` into `acc` (one slot per direction)
    pub fn accumulate_demeaned(&self, tangent: &Vector3<f64>, acc: &mut [f64]) {
        let n = self.directions.len();
        if n == 0 {
            return;
        }
        let mut mean = 0.0;
        for (d, slot) in acc.iter_mut().enumerate().take(n) {
            let k = self.attenuation(tangent, d);
            *slot += k;
            mean += k;
        }
        mean /= n as f64;
        for slot in acc.iter_mut().take(n) {
            *slot -= mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> GradientTable {
        GradientTable::single_shell(
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            1000.0,
        )
    }

    #[test]
    fn test_attenuation_along_and_across() {
        let kernel = TensorResponse::default().kernel(&table());
        let t = Vector3::new(1.0, 0.0, 0.0);
        // b = 1000 s/mm² scaled to 1 ms/µm², λax = 1
        assert_relative_eq!(kernel.attenuation(&t, 0), (-1.0f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(kernel.attenuation(&t, 1), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_demeaned_kernel_sums_to_zero() {
        let kernel = TensorResponse::new(1.7, 0.3).kernel(&table());
        let t = Vector3::new(1.0, 2.0, -0.5).normalize();
        let mut acc = vec![0.0; 3];
        kernel.accumulate_demeaned(&t, &mut acc);
        assert_relative_eq!(acc.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert!(acc.iter().any(|x| x.abs() > 1e-3));
    }

    #[test]
    fn test_isotropic_response_is_flat() {
        let kernel = TensorResponse::new(0.8, 0.8).kernel(&table());
        let mut acc = vec![0.0; 3];
        kernel.accumulate_demeaned(&Vector3::new(0.0, 0.0, 1.0), &mut acc);
        for x in acc {
            assert_relative_eq!(x, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_validate() {
        assert!(TensorResponse::default().validate().is_ok());
        assert!(TensorResponse::new(0.0, 0.0).validate().is_err());
        assert!(TensorResponse::new(-1.0, 0.0).validate().is_err());
    }
}
