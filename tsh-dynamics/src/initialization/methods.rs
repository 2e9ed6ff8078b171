//! Integer-coded method selectors of the dynamics configuration.
//!
//! Every selector is serialized as its integer code and can be built from an `i32`
//! with `TryFrom`, which fails with [TshError::UnknownEnumerator] for codes that
//! do not name a method.
use crate::errors::TshError;
use serde_repr::{Deserialize_repr, Serialize_repr};

macro_rules! integer_codes {
    ($name:ident, $label:expr, { $($variant:ident = $code:literal),+ $(,)? }) => {
        #[derive(Serialize_repr, Deserialize_repr, Clone, Copy, Debug, PartialEq, Eq)]
        #[repr(i32)]
        pub enum $name {
            $($variant = $code),+
        }

        impl TryFrom<i32> for $name {
            type Error = TshError;

            fn try_from(code: i32) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err(TshError::UnknownEnumerator { selector: $label, code }),
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                value as i32
            }
        }
    };
}

integer_codes!(Representation, "rep_tdse", {
    Diabatic = 0,
    Adiabatic = 1,
});

integer_codes!(TshMethod, "tsh_method", {
    Adiabatic = -1,
    Fssh = 0,
    Gfsh = 1,
    Mssh = 2,
    Dish = 3,
});

integer_codes!(DecoherenceMethod, "decoherence_algo", {
    None = -1,
    Sdm = 0,
    Instantaneous = 1,
    Afssh = 2,
    Bcsh = 3,
    Mfsd = 4,
});

integer_codes!(DecoherenceTimes, "decoherence_times_type", {
    None = -1,
    Fixed = 0,
    Edc = 1,
    Schwartz1 = 2,
    Schwartz2 = 3,
});

integer_codes!(StateTracking, "state_tracking_algo", {
    None = 0,
    Greedy = 1,
    Stochastic = 2,
});

integer_codes!(TimeOverlapMethod, "time_overlap_method", {
    Recompute = 0,
    Provider = 1,
});

integer_codes!(ForceMethod, "force_method", {
    None = 0,
    ActiveState = 1,
    Ehrenfest = 2,
});

integer_codes!(EnsembleType, "ensemble", {
    Nve = 0,
    Nvt = 1,
});

integer_codes!(EntanglementOption, "entanglement_opt", {
    None = 0,
    Ethd3 = 22,
});

integer_codes!(HopAcceptance, "hop_acceptance_algo", {
    Always = 0,
    Energy = 10,
    Coupling = 11,
    ForceDifference = 12,
    Boltzmann = 20,
});

integer_codes!(MomentumRescaling, "momenta_rescaling_algo", {
    Isotropic = 0,
    None = 100,
    Coupling = 200,
    ForceDifference = 201,
});

integer_codes!(FrustratedHop, "frustrated_hop", {
    Keep = 0,
    Reverse = 1,
    ReverseOnForceSign = 2,
});

integer_codes!(InstantaneousVariant, "instantaneous_decoherence_variant", {
    Accepted = 0,
    Attempted = 1,
    Restricted = 2,
});

integer_codes!(CollapseOption, "collapse_option", {
    KeepPhase = 0,
    ResetPhase = 1,
});

integer_codes!(ThermostatType, "thermostat_type", {
    Berendsen = 0,
    NoseHooverChain = 1,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_convert() {
        assert_eq!(TshMethod::try_from(-1), Ok(TshMethod::Adiabatic));
        assert_eq!(TshMethod::try_from(3), Ok(TshMethod::Dish));
        assert_eq!(DecoherenceMethod::try_from(4), Ok(DecoherenceMethod::Mfsd));
        assert_eq!(EntanglementOption::try_from(22), Ok(EntanglementOption::Ethd3));
        assert_eq!(i32::from(MomentumRescaling::Coupling), 200);
    }

    #[test]
    fn unknown_codes_are_errors() {
        assert_eq!(
            TshMethod::try_from(7),
            Err(TshError::UnknownEnumerator {
                selector: "tsh_method",
                code: 7
            })
        );
        assert!(DecoherenceMethod::try_from(5).is_err());
        assert!(Representation::try_from(2).is_err());
    }
}
