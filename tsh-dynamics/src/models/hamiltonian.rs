use crate::c64;
use crate::defaults::DEGENERACY_THRESHOLD;
use crate::errors::TshError;
use crate::interface::HamiltonianProvider;
use crate::models::DiabaticModel;
use crate::utils::*;
use ndarray::prelude::*;

/// Electronic structure of one child at its last geometry
struct ModelChild {
    ham_dia: Array2<c64>,
    d1ham_dia: Vec<Array2<c64>>,
    ham_adi: Array2<c64>,
    d1ham_adi: Vec<Array2<c64>>,
    dc1_adi: Vec<Array2<c64>>,
    basis_transform: Array2<c64>,
    time_overlap_adi: Array2<c64>,
    initialized: bool,
}

impl ModelChild {
    fn new(nstates: usize, ndof: usize) -> Self {
        let zeros: Array2<c64> = Array2::zeros((nstates, nstates));
        let eye: Array2<c64> = Array2::eye(nstates);
        ModelChild {
            ham_dia: zeros.clone(),
            d1ham_dia: vec![zeros.clone(); ndof],
            ham_adi: zeros.clone(),
            d1ham_adi: vec![zeros.clone(); ndof],
            dc1_adi: vec![zeros; ndof],
            basis_transform: eye.clone(),
            time_overlap_adi: eye,
            initialized: false,
        }
    }
}

/// [HamiltonianProvider] backed by an analytic [DiabaticModel].
///
/// Every call of `compute` diagonalises the diabatic Hamiltonian of one child and
/// derives all adiabatic quantities from it. The time-overlap refers to the basis
/// of the previous call for the same child (identity on the first call).
pub struct ModelHamiltonian<M: DiabaticModel> {
    pub model: M,
    children: Vec<ModelChild>,
    compute_calls: usize,
}

impl<M: DiabaticModel> ModelHamiltonian<M> {
    pub fn new(model: M, nchildren: usize) -> Self {
        let nstates: usize = model.nstates();
        let ndof: usize = model.ndof();
        let children: Vec<ModelChild> = (0..nchildren.max(1))
            .map(|_| ModelChild::new(nstates, ndof))
            .collect();
        ModelHamiltonian {
            model,
            children,
            compute_calls: 0,
        }
    }

    /// Total number of `compute` calls over all children
    pub fn compute_calls(&self) -> usize {
        self.compute_calls
    }

    fn child(&self, traj: usize) -> &ModelChild {
        &self.children[traj]
    }
}

impl<M: DiabaticModel> HamiltonianProvider for ModelHamiltonian<M> {
    fn ndia(&self) -> usize {
        self.model.nstates()
    }

    fn nadi(&self) -> usize {
        self.model.nstates()
    }

    fn ndof(&self) -> usize {
        self.model.ndof()
    }

    fn nchildren(&self) -> usize {
        self.children.len()
    }

    fn compute(&mut self, traj: usize, q: ArrayView1<f64>) -> Result<(), TshError> {
        let ndof: usize = self.model.ndof();
        if q.len() != ndof {
            return Err(TshError::DimensionMismatch {
                what: "model coordinates",
                expected: ndof,
                found: q.len(),
            });
        }
        if traj >= self.children.len() {
            return Err(TshError::Provider(format!(
                "child {} requested, but only {} children exist",
                traj,
                self.children.len()
            )));
        }
        let ham_dia: Array2<c64> = to_complex(self.model.hamiltonian(q).view());
        if !ham_dia.iter().all(|val| val.re.is_finite()) {
            return Err(TshError::NonFinite {
                stage: "model Hamiltonian",
            });
        }
        let d1ham_dia: Vec<Array2<c64>> = (0..ndof)
            .map(|dof| to_complex(self.model.gradient(q, dof).view()))
            .collect();

        let (energies, basis): (Array1<f64>, Array2<c64>) = eigh(ham_dia.view());
        let basis_h: Array2<c64> = adjoint(basis.view());
        let nstates: usize = energies.len();

        let d1ham_adi: Vec<Array2<c64>> = d1ham_dia
            .iter()
            .map(|dh| basis_h.dot(dh).dot(&basis))
            .collect();
        // <i|d/dq|j> = <i|dH/dq|j> / (E_j - E_i)
        let dc1_adi: Vec<Array2<c64>> = d1ham_adi
            .iter()
            .map(|dh| {
                Array2::from_shape_fn((nstates, nstates), |(i, j)| {
                    let gap: f64 = energies[j] - energies[i];
                    if i != j && gap.abs() > DEGENERACY_THRESHOLD {
                        dh[[i, j]] / gap
                    } else {
                        c64::new(0.0, 0.0)
                    }
                })
            })
            .collect();

        let child: &mut ModelChild = &mut self.children[traj];
        child.time_overlap_adi = if child.initialized {
            adjoint(child.basis_transform.view()).dot(&basis)
        } else {
            Array2::eye(nstates)
        };
        child.ham_dia = ham_dia;
        child.d1ham_dia = d1ham_dia;
        child.ham_adi = Array2::from_diag(&energies.mapv(|val| c64::new(val, 0.0)));
        child.d1ham_adi = d1ham_adi;
        child.dc1_adi = dc1_adi;
        child.basis_transform = basis;
        child.initialized = true;
        self.compute_calls += 1;
        Ok(())
    }

    fn ham_dia(&self, traj: usize) -> ArrayView2<c64> {
        self.child(traj).ham_dia.view()
    }

    fn ham_adi(&self, traj: usize) -> ArrayView2<c64> {
        self.child(traj).ham_adi.view()
    }

    fn d1ham_dia(&self, traj: usize, dof: usize) -> ArrayView2<c64> {
        self.child(traj).d1ham_dia[dof].view()
    }

    fn d1ham_adi(&self, traj: usize, dof: usize) -> ArrayView2<c64> {
        self.child(traj).d1ham_adi[dof].view()
    }

    fn dc1_adi(&self, traj: usize, dof: usize) -> ArrayView2<c64> {
        self.child(traj).dc1_adi[dof].view()
    }

    fn basis_transform(&self, traj: usize) -> ArrayView2<c64> {
        self.child(traj).basis_transform.view()
    }

    fn time_overlap_adi(&self, traj: usize) -> ArrayView2<c64> {
        self.child(traj).time_overlap_adi.view()
    }

    fn set_time_overlap_adi(&mut self, traj: usize, overlap: ArrayView2<c64>) {
        self.children[traj].time_overlap_adi.assign(&overlap);
    }
}
