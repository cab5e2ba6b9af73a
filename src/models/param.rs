//! Parameter tables for the Sersic model family.

use serde::{Deserialize, Serialize};

/// Concrete model kind (number of additive components).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// One Sersic component.
    Single,
    /// Sersic bulge + fixed `n = 1` exponential disk.
    Exponential,
    /// Two Sersic components.
    Double,
    /// Three Sersic components.
    Triple,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Single,
        ModelKind::Exponential,
        ModelKind::Double,
        ModelKind::Triple,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Single => "single",
            ModelKind::Exponential => "exponential",
            ModelKind::Double => "double",
            ModelKind::Triple => "triple",
        }
    }

    pub fn component_count(self) -> usize {
        match self {
            ModelKind::Single => 1,
            ModelKind::Exponential | ModelKind::Double => 2,
            ModelKind::Triple => 3,
        }
    }

    /// Tag stored with the fit result (`double`, `double-nowavepower`, ...).
    pub fn modeltype(self, nowavepower: bool) -> String {
        if nowavepower {
            format!("{}-nowavepower", self.name())
        } else {
            self.name().to_string()
        }
    }
}

/// A single named model parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub default: f64,
    /// Inclusive bounds; `None` means unbounded.
    pub bounds: Option<(f64, f64)>,
    /// Fixed parameters keep their value and are excluded from the fit.
    pub fixed: bool,
    /// Index of the parameter this one copies its value from.
    pub tied: Option<usize>,
}

impl ParamSpec {
    fn new(name: impl Into<String>, default: f64, bounds: Option<(f64, f64)>) -> Self {
        Self {
            name: name.into(),
            default,
            bounds,
            fixed: false,
            tied: None,
        }
    }

    /// A parameter the optimizer adjusts directly.
    pub fn is_free(&self) -> bool {
        !self.fixed && self.tied.is_none()
    }

    pub fn in_bounds(&self, value: f64) -> bool {
        match self.bounds {
            Some((lo, hi)) => value >= lo && value <= hi,
            None => true,
        }
    }

    pub fn clip(&self, value: f64) -> f64 {
        match self.bounds {
            Some((lo, hi)) => value.clamp(lo, hi),
            None => value,
        }
    }
}

const N_BOUNDS_WIDE: (f64, f64) = (0.1, 10.0);
const N_BOUNDS: (f64, f64) = (0.1, 8.0);
const R50_BOUNDS: (f64, f64) = (0.1, 100.0);
const SLOPE_BOUNDS: (f64, f64) = (-1.0, 1.0);
const MU50_BOUNDS: (f64, f64) = (0.0, 1e4);

/// Build the parameter table for `kind` with the requested wave-power fixing.
///
/// Parameter order matters: it defines the layout of every value vector and
/// of the reported covariance.
pub fn parameter_table(kind: ModelKind, fix_alpha: bool, fix_beta: bool) -> Vec<ParamSpec> {
    let mut params = match kind {
        ModelKind::Single => vec![
            ParamSpec::new("nref", 4.0, Some(N_BOUNDS_WIDE)),
            ParamSpec::new("r50ref", 10.0, Some(R50_BOUNDS)),
            ParamSpec::new("alpha", 0.0, Some(SLOPE_BOUNDS)),
            ParamSpec::new("beta", 0.0, Some(SLOPE_BOUNDS)),
            ParamSpec::new("mu50_g", 1.0, Some(MU50_BOUNDS)),
            ParamSpec::new("mu50_r", 1.0, Some(MU50_BOUNDS)),
            ParamSpec::new("mu50_z", 1.0, Some(MU50_BOUNDS)),
        ],
        ModelKind::Exponential => {
            let mut p = vec![
                ParamSpec::new("nref1", 3.0, Some(N_BOUNDS_WIDE)),
                ParamSpec::new("nref2", 1.0, None),
                ParamSpec::new("r50ref1", 3.0, Some(R50_BOUNDS)),
                ParamSpec::new("r50ref2", 10.0, Some(R50_BOUNDS)),
                ParamSpec::new("alpha1", 0.0, Some(SLOPE_BOUNDS)),
                ParamSpec::new("beta1", 0.0, Some(SLOPE_BOUNDS)),
                ParamSpec::new("beta2", 0.0, None),
            ];
            p.extend(mu50_params(1, 1.0));
            p.extend(mu50_params(2, 0.1));
            p
        }
        ModelKind::Double => {
            let mut p = vec![
                ParamSpec::new("nref1", 3.0, Some(N_BOUNDS)),
                ParamSpec::new("nref2", 1.0, Some(N_BOUNDS)),
                ParamSpec::new("r50ref1", 3.0, Some(R50_BOUNDS)),
                ParamSpec::new("r50ref2", 10.0, Some(R50_BOUNDS)),
                ParamSpec::new("alpha1", 0.0, Some(SLOPE_BOUNDS)),
                ParamSpec::new("alpha2", 0.0, None),
                ParamSpec::new("beta1", 0.0, Some(SLOPE_BOUNDS)),
                ParamSpec::new("beta2", 0.0, None),
            ];
            p.extend(mu50_params(1, 1.0));
            p.extend(mu50_params(2, 0.1));
            p
        }
        ModelKind::Triple => {
            let mut p = vec![
                ParamSpec::new("nref1", 3.0, Some(N_BOUNDS)),
                ParamSpec::new("nref2", 1.0, Some(N_BOUNDS)),
                ParamSpec::new("nref3", 1.0, Some(N_BOUNDS)),
                ParamSpec::new("r50ref1", 1.0, Some(R50_BOUNDS)),
                ParamSpec::new("r50ref2", 10.0, Some(R50_BOUNDS)),
                ParamSpec::new("r50ref3", 30.0, Some(R50_BOUNDS)),
                ParamSpec::new("alpha1", 0.0, Some(SLOPE_BOUNDS)),
                ParamSpec::new("alpha2", 0.0, None),
                ParamSpec::new("alpha3", 0.0, None),
                ParamSpec::new("beta1", 0.0, Some(SLOPE_BOUNDS)),
                ParamSpec::new("beta2", 0.0, None),
                ParamSpec::new("beta3", 0.0, None),
            ];
            p.extend(mu50_params(1, 1.0));
            p.extend(mu50_params(2, 0.1));
            p.extend(mu50_params(3, 0.05));
            p
        }
    };

    // The exponential disk keeps n = 1 regardless of options.
    if kind == ModelKind::Exponential {
        set_fixed(&mut params, "nref2");
    }

    // Secondary components share the wavelength slopes of the first.
    for (tied, source) in [
        ("alpha2", "alpha1"),
        ("alpha3", "alpha1"),
        ("beta2", "beta1"),
        ("beta3", "beta1"),
    ] {
        if let (Some(t), Some(s)) = (index_of(&params, tied), index_of(&params, source)) {
            params[t].tied = Some(s);
        }
    }

    for p in params.iter_mut() {
        let is_alpha = p.name.starts_with("alpha");
        let is_beta = p.name.starts_with("beta");
        if (fix_alpha && is_alpha) || (fix_beta && is_beta) {
            p.fixed = true;
        }
    }

    params
}

fn mu50_params(component: usize, default: f64) -> Vec<ParamSpec> {
    ["g", "r", "z"]
        .iter()
        .map(|band| ParamSpec::new(format!("mu50_{band}{component}"), default, Some(MU50_BOUNDS)))
        .collect()
}

fn set_fixed(params: &mut [ParamSpec], name: &str) {
    if let Some(i) = index_of(params, name) {
        params[i].fixed = true;
    }
}

pub fn index_of(params: &[ParamSpec], name: &str) -> Option<usize> {
    params.iter().position(|p| p.name == name)
}
