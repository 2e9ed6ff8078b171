use crate::models::DiabaticModel;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Single surface harmonic oscillator, H = sum_dof 0.5 k_dof q_dof^2
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Harmonic {
    pub force_constants: Vec<f64>,
}

impl DiabaticModel for Harmonic {
    fn nstates(&self) -> usize {
        1
    }

    fn ndof(&self) -> usize {
        self.force_constants.len()
    }

    fn hamiltonian(&self, q: ArrayView1<f64>) -> Array2<f64> {
        let energy: f64 = self
            .force_constants
            .iter()
            .zip(q.iter())
            .map(|(k, x)| 0.5 * k * x * x)
            .sum();
        Array2::from_elem((1, 1), energy)
    }

    fn gradient(&self, q: ArrayView1<f64>, dof: usize) -> Array2<f64> {
        Array2::from_elem((1, 1), self.force_constants[dof] * q[dof])
    }
}

/// Two shifted parabolas with a constant coupling:
///
/// ```text
///        k x^2              V
/// H =      V        k (x - x0)^2 + D
/// ```
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CrossingParabolas {
    pub k: f64,
    pub x0: f64,
    pub d: f64,
    pub v: f64,
}

impl Default for CrossingParabolas {
    fn default() -> Self {
        CrossingParabolas {
            k: 0.1,
            x0: 1.0,
            d: -0.1,
            v: 0.05,
        }
    }
}

impl DiabaticModel for CrossingParabolas {
    fn nstates(&self) -> usize {
        2
    }

    fn ndof(&self) -> usize {
        1
    }

    fn hamiltonian(&self, q: ArrayView1<f64>) -> Array2<f64> {
        let x: f64 = q[0];
        array![
            [self.k * x * x, self.v],
            [self.v, self.k * (x - self.x0).powi(2) + self.d]
        ]
    }

    fn gradient(&self, q: ArrayView1<f64>, _dof: usize) -> Array2<f64> {
        let x: f64 = q[0];
        array![
            [2.0 * self.k * x, 0.0],
            [0.0, 2.0 * self.k * (x - self.x0)]
        ]
    }
}

/// Periodic two state model:
///
/// ```text
///    k cos(w x)       V
/// H =     V       k sin(w x)
/// ```
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CosineModel {
    pub k: f64,
    pub w: f64,
    pub v: f64,
}

impl Default for CosineModel {
    fn default() -> Self {
        CosineModel {
            k: 0.1,
            w: 0.25,
            v: 0.05,
        }
    }
}

impl DiabaticModel for CosineModel {
    fn nstates(&self) -> usize {
        2
    }

    fn ndof(&self) -> usize {
        1
    }

    fn hamiltonian(&self, q: ArrayView1<f64>) -> Array2<f64> {
        let wx: f64 = self.w * q[0];
        array![
            [self.k * wx.cos(), self.v],
            [self.v, self.k * wx.sin()]
        ]
    }

    fn gradient(&self, q: ArrayView1<f64>, _dof: usize) -> Array2<f64> {
        let wx: f64 = self.w * q[0];
        array![
            [-self.k * self.w * wx.sin(), 0.0],
            [0.0, self.k * self.w * wx.cos()]
        ]
    }
}

/// Geometry independent Hamiltonian. The nuclei feel no force at all.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConstantCoupling {
    pub energies: Vec<f64>,
    pub coupling: f64,
    pub ndof: usize,
}

impl DiabaticModel for ConstantCoupling {
    fn nstates(&self) -> usize {
        self.energies.len()
    }

    fn ndof(&self) -> usize {
        self.ndof
    }

    fn hamiltonian(&self, _q: ArrayView1<f64>) -> Array2<f64> {
        let n: usize = self.energies.len();
        Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j {
                self.energies[i]
            } else {
                self.coupling
            }
        })
    }

    fn gradient(&self, _q: ArrayView1<f64>, _dof: usize) -> Array2<f64> {
        let n: usize = self.energies.len();
        Array2::zeros((n, n))
    }
}
