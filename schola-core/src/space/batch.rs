//! Batching of spaces and points along a leading dimension.
use super::{Point, Space};
use crate::error::ScholaError;
use anyhow::Result;
use ndarray::{ArrayD, Dimension, IxDyn};
use std::collections::BTreeMap;

fn tile<T: Clone>(a: &ArrayD<T>, n: usize) -> ArrayD<T> {
    let mut shape = vec![n];
    shape.extend_from_slice(a.shape());
    ArrayD::from_shape_fn(IxDyn(&shape), |ix| a[&ix.slice()[1..]].clone())
}

fn stack<T: Clone>(shape: &[usize], arrays: &[&ArrayD<T>]) -> Result<ArrayD<T>> {
    let mut data = Vec::with_capacity(arrays.len() * shape.iter().product::<usize>());
    for a in arrays.iter() {
        if a.shape() != shape {
            return Err(ScholaError::Batch(format!(
                "expected shape {:?}, got {:?}",
                shape,
                a.shape()
            ))
            .into());
        }
        data.extend(a.iter().cloned());
    }
    let mut batch_shape = vec![arrays.len()];
    batch_shape.extend_from_slice(shape);
    Ok(ArrayD::from_shape_vec(IxDyn(&batch_shape), data)
        .map_err(|e| ScholaError::Batch(e.to_string()))?)
}

fn unstack<T: Clone>(shape: &[usize], a: &ArrayD<T>) -> Result<Vec<ArrayD<T>>> {
    if a.ndim() != shape.len() + 1 || &a.shape()[1..] != shape {
        return Err(ScholaError::Batch(format!(
            "expected batch of shape {:?}, got {:?}",
            shape,
            a.shape()
        ))
        .into());
    }
    Ok(a.outer_iter().map(|v| v.to_owned()).collect())
}

fn mismatch(space: &Space, point: &Point) -> anyhow::Error {
    ScholaError::Batch(format!("{} value does not belong to {}", point.kind(), space)).into()
}

/// Space of `n` stacked values of `space`.
///
/// A discrete space becomes a multi-discrete space, a dict space is batched
/// per key and every other space gains a leading dimension of size `n`.
pub fn batch_space(space: &Space, n: usize) -> Space {
    match space {
        Space::Box { low, high, dtype } => Space::Box {
            low: tile(low, n),
            high: tile(high, n),
            dtype: *dtype,
        },
        Space::Discrete { n: k } => Space::MultiDiscrete {
            nvec: ArrayD::from_elem(IxDyn(&[n]), *k),
        },
        Space::MultiDiscrete { nvec } => Space::MultiDiscrete {
            nvec: tile(nvec, n),
        },
        Space::MultiBinary { shape } => {
            let mut batch_shape = vec![n];
            batch_shape.extend_from_slice(shape);
            Space::MultiBinary { shape: batch_shape }
        }
        Space::Dict(spaces) => Space::Dict(
            spaces
                .iter()
                .map(|(k, s)| (k.clone(), batch_space(s, n)))
                .collect(),
        ),
    }
}

/// Stacks values of `space` into a single value of `batch_space(space, points.len())`.
pub fn concatenate(space: &Space, points: &[Point]) -> Result<Point> {
    let shape = space.shape();
    match space {
        Space::Box { .. } => {
            let arrays = points
                .iter()
                .map(|p| match p {
                    Point::Box(a) => Ok(a),
                    _ => Err(mismatch(space, p)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Point::Box(stack(&shape, &arrays)?))
        }
        Space::Discrete { .. } => {
            let values = points
                .iter()
                .map(|p| p.as_discrete().ok_or_else(|| mismatch(space, p)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Point::multi_discrete(values))
        }
        Space::MultiDiscrete { .. } => {
            let arrays = points
                .iter()
                .map(|p| match p {
                    Point::MultiDiscrete(a) => Ok(a),
                    _ => Err(mismatch(space, p)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Point::MultiDiscrete(stack(&shape, &arrays)?))
        }
        Space::MultiBinary { .. } => {
            let arrays = points
                .iter()
                .map(|p| match p {
                    Point::MultiBinary(a) => Ok(a),
                    _ => Err(mismatch(space, p)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Point::MultiBinary(stack(&shape, &arrays)?))
        }
        Space::Dict(spaces) => {
            let mut batched = BTreeMap::new();
            for (key, sub_space) in spaces.iter() {
                let values = points
                    .iter()
                    .map(|p| match p {
                        Point::Dict(items) => items.get(key).cloned().ok_or_else(|| {
                            anyhow::Error::from(ScholaError::Batch(format!(
                                "missing key {} in dict value",
                                key
                            )))
                        }),
                        _ => Err(mismatch(space, p)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                batched.insert(key.clone(), concatenate(sub_space, &values)?);
            }
            Ok(Point::Dict(batched))
        }
    }
}

/// Splits a batched value back into values of `space`, inverse of [`concatenate`].
pub fn unbatch(space: &Space, batched: &Point) -> Result<Vec<Point>> {
    let shape = space.shape();
    match (space, batched) {
        (Space::Box { .. }, Point::Box(a)) => {
            Ok(unstack(&shape, a)?.into_iter().map(Point::Box).collect())
        }
        (Space::Discrete { .. }, Point::MultiDiscrete(a)) => {
            Ok(unstack(&shape, a)?
                .into_iter()
                .map(|v| Point::Discrete(v.iter().next().copied().unwrap_or_default()))
                .collect())
        }
        (Space::MultiDiscrete { .. }, Point::MultiDiscrete(a)) => Ok(unstack(&shape, a)?
            .into_iter()
            .map(Point::MultiDiscrete)
            .collect()),
        (Space::MultiBinary { .. }, Point::MultiBinary(a)) => Ok(unstack(&shape, a)?
            .into_iter()
            .map(Point::MultiBinary)
            .collect()),
        (Space::Dict(spaces), Point::Dict(items)) => {
            let mut columns = Vec::with_capacity(spaces.len());
            for (key, sub_space) in spaces.iter() {
                let item = items.get(key).ok_or_else(|| {
                    ScholaError::Batch(format!("missing key {} in batched dict", key))
                })?;
                columns.push((key, unbatch(sub_space, item)?));
            }
            let n = columns.first().map_or(0, |(_, c)| c.len());
            if columns.iter().any(|(_, c)| c.len() != n) {
                return Err(ScholaError::Batch("dict entries differ in batch size".into()).into());
            }
            Ok((0..n)
                .map(|i| {
                    Point::Dict(
                        columns
                            .iter()
                            .map(|(k, c)| ((*k).clone(), c[i].clone()))
                            .collect(),
                    )
                })
                .collect())
        }
        _ => Err(mismatch(&batch_space(space, 0), batched)),
    }
}
