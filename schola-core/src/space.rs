//! Observation and action spaces and the values they contain.
//!
//! [`Space`] and [`Point`] are closed sum types. Every conversion between the
//! wire format and these types is a plain `match` over the variants.
mod batch;
pub use batch::{batch_space, concatenate, unbatch};

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Element type of a [`Space::Box`].
///
/// Values are always carried as `f32`; the dtype only takes part in space equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
        };
        write!(f, "{}", name)
    }
}

/// Observation or action space of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    /// Continuous values bounded element-wise by `low` and `high`.
    Box {
        /// Lower bounds.
        low: ArrayD<f32>,
        /// Upper bounds, same shape as `low`.
        high: ArrayD<f32>,
        /// Element type.
        dtype: DType,
    },

    /// A single integer in `[0, n)`.
    Discrete {
        /// Number of values.
        n: i64,
    },

    /// Integers, each in `[0, nvec[i])`.
    MultiDiscrete {
        /// Number of values per element.
        nvec: ArrayD<i64>,
    },

    /// Binary values of a fixed shape.
    MultiBinary {
        /// Shape of the values.
        shape: Vec<usize>,
    },

    /// Named sub-spaces.
    Dict(BTreeMap<String, Space>),
}

impl Space {
    /// Box space with the same bounds for every element.
    pub fn boxed(low: f32, high: f32, shape: &[usize]) -> Self {
        Self::Box {
            low: ArrayD::from_elem(IxDyn(shape), low),
            high: ArrayD::from_elem(IxDyn(shape), high),
            dtype: DType::Float32,
        }
    }

    /// Discrete space with `n` values.
    pub fn discrete(n: i64) -> Self {
        Self::Discrete { n }
    }

    /// One-dimensional multi-discrete space.
    pub fn multi_discrete(nvec: Vec<i64>) -> Self {
        let len = nvec.len();
        Self::MultiDiscrete {
            nvec: ArrayD::from_shape_vec(IxDyn(&[len]), nvec)
                .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0]))),
        }
    }

    /// One-dimensional multi-binary space.
    pub fn multi_binary(n: usize) -> Self {
        Self::MultiBinary { shape: vec![n] }
    }

    /// Dict space from `(name, space)` pairs.
    pub fn dict<K: Into<String>>(items: impl IntoIterator<Item = (K, Space)>) -> Self {
        Self::Dict(items.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Shape of a single value. Discrete and dict spaces have an empty shape.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Box { low, .. } => low.shape().to_vec(),
            Self::Discrete { .. } => vec![],
            Self::MultiDiscrete { nvec } => nvec.shape().to_vec(),
            Self::MultiBinary { shape } => shape.clone(),
            Self::Dict(_) => vec![],
        }
    }

    /// Returns `true` if `point` is a member of this space.
    pub fn contains(&self, point: &Point) -> bool {
        match (self, point) {
            (Self::Box { low, high, .. }, Point::Box(x)) => {
                x.shape() == low.shape()
                    && x.iter()
                        .zip(low.iter().zip(high.iter()))
                        .all(|(v, (l, h))| *v >= *l && *v <= *h)
            }
            (Self::Discrete { n }, Point::Discrete(x)) => *x >= 0 && *x < *n,
            (Self::MultiDiscrete { nvec }, Point::MultiDiscrete(x)) => {
                x.shape() == nvec.shape()
                    && x.iter().zip(nvec.iter()).all(|(v, n)| *v >= 0 && *v < *n)
            }
            (Self::MultiBinary { shape }, Point::MultiBinary(x)) => {
                x.shape() == shape.as_slice() && x.iter().all(|v| *v == 0 || *v == 1)
            }
            (Self::Dict(spaces), Point::Dict(points)) => {
                spaces.len() == points.len()
                    && spaces
                        .iter()
                        .all(|(k, s)| points.get(k).map_or(false, |p| s.contains(p)))
            }
            _ => false,
        }
    }

    /// Returns `true` if no point is a member of this space: a discrete
    /// element with no values, or a box with a lower bound above its upper one.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Box { low, high, .. } => low.iter().zip(high.iter()).any(|(l, h)| l > h),
            Self::Discrete { n } => *n <= 0,
            Self::MultiDiscrete { nvec } => nvec.iter().any(|n| *n <= 0),
            Self::MultiBinary { .. } => false,
            Self::Dict(spaces) => spaces.values().any(Space::is_empty),
        }
    }

    /// Samples a point uniformly. Unbounded box elements are sampled from `[-1, 1]`.
    ///
    /// Returns `None` for an [empty](Space::is_empty) space.
    pub fn sample(&self, rng: &mut fastrand::Rng) -> Option<Point> {
        if self.is_empty() {
            return None;
        }
        let point = match self {
            Self::Box { low, high, .. } => {
                let mut x = low.clone();
                x.iter_mut().zip(high.iter()).for_each(|(v, h)| {
                    let (l, h) = if v.is_finite() && h.is_finite() {
                        (*v, *h)
                    } else {
                        (-1.0, 1.0)
                    };
                    *v = l + rng.f32() * (h - l);
                });
                Point::Box(x)
            }
            Self::Discrete { n } => Point::Discrete(rng.i64(0..*n)),
            Self::MultiDiscrete { nvec } => {
                Point::MultiDiscrete(nvec.mapv(|n| rng.i64(0..n)))
            }
            Self::MultiBinary { shape } => {
                Point::MultiBinary(ArrayD::from_shape_fn(IxDyn(shape), |_| rng.bool() as i8))
            }
            Self::Dict(spaces) => Point::Dict(
                spaces
                    .iter()
                    .map(|(k, s)| s.sample(rng).map(|p| (k.clone(), p)))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
        };
        Some(point)
    }
}

fn fmt_shape(shape: &[usize]) -> String {
    match shape.len() {
        1 => format!("({},)", shape[0]),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn fmt_bound(a: &ArrayD<f32>) -> String {
    match a.iter().next() {
        Some(first) if a.iter().all(|v| v == first) => format!("{:?}", first),
        _ => format!("{:?}", a.iter().collect::<Vec<_>>()),
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Box { low, high, dtype } => write!(
                f,
                "Box({}, {}, {}, {})",
                fmt_bound(low),
                fmt_bound(high),
                fmt_shape(low.shape()),
                dtype
            ),
            Self::Discrete { n } => write!(f, "Discrete({})", n),
            Self::MultiDiscrete { nvec } => {
                write!(f, "MultiDiscrete({:?})", nvec.iter().collect::<Vec<_>>())
            }
            Self::MultiBinary { shape } => write!(f, "MultiBinary({})", fmt_shape(shape)),
            Self::Dict(spaces) => {
                let items = spaces
                    .iter()
                    .map(|(k, s)| format!("'{}': {}", k, s))
                    .collect::<Vec<_>>();
                write!(f, "Dict({})", items.join(", "))
            }
        }
    }
}

/// A value of a [`Space`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Point {
    /// Value of a box space.
    Box(ArrayD<f32>),

    /// Value of a discrete space.
    Discrete(i64),

    /// Value of a multi-discrete space.
    MultiDiscrete(ArrayD<i64>),

    /// Value of a multi-binary space, elements are 0 or 1.
    MultiBinary(ArrayD<i8>),

    /// Value of a dict space.
    Dict(BTreeMap<String, Point>),
}

impl Point {
    /// One-dimensional box value.
    pub fn box1(values: Vec<f32>) -> Self {
        let len = values.len();
        match ArrayD::from_shape_vec(IxDyn(&[len]), values) {
            Ok(x) => Self::Box(x),
            Err(_) => Self::Box(ArrayD::zeros(IxDyn(&[0]))),
        }
    }

    /// One-dimensional multi-discrete value.
    pub fn multi_discrete(values: Vec<i64>) -> Self {
        let len = values.len();
        match ArrayD::from_shape_vec(IxDyn(&[len]), values) {
            Ok(x) => Self::MultiDiscrete(x),
            Err(_) => Self::MultiDiscrete(ArrayD::zeros(IxDyn(&[0]))),
        }
    }

    /// Returns the value of a discrete point.
    pub fn as_discrete(&self) -> Option<i64> {
        match self {
            Self::Discrete(x) => Some(*x),
            _ => None,
        }
    }

    /// Returns the array of a box point.
    pub fn as_box(&self) -> Option<&ArrayD<f32>> {
        match self {
            Self::Box(x) => Some(x),
            _ => None,
        }
    }

    /// Returns the array of a multi-discrete point.
    pub fn as_multi_discrete(&self) -> Option<&ArrayD<i64>> {
        match self {
            Self::MultiDiscrete(x) => Some(x),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Box(_) => "Box",
            Self::Discrete(_) => "Discrete",
            Self::MultiDiscrete(_) => "MultiDiscrete",
            Self::MultiBinary(_) => "MultiBinary",
            Self::Dict(_) => "Dict",
        }
    }
}

impl From<i64> for Point {
    fn from(x: i64) -> Self {
        Self::Discrete(x)
    }
}

impl From<ArrayD<f32>> for Point {
    fn from(x: ArrayD<f32>) -> Self {
        Self::Box(x)
    }
}
