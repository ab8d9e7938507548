//! Flattening of dict action spaces.
//!
//! Stable-Baselines3 algorithms do not act in dict spaces. The parts of a dict
//! action space are merged into one flat space, and flat actions are split
//! back into dicts before they reach the simulator. Parts are laid out in key
//! order.
use anyhow::{bail, Result};
use ndarray::{concatenate, ArrayD, Axis, Slice};
use schola_core::{DType, Point, ScholaError, Space};
use std::collections::BTreeMap;

fn last_axis(shape: &[usize], name: &str) -> Result<usize> {
    match shape.len() {
        0 => bail!("Cannot merge scalar space {}", name),
        n => Ok(n - 1),
    }
}

fn merge_boxes(spaces: &BTreeMap<String, Space>) -> Result<Space> {
    let mut lows = Vec::with_capacity(spaces.len());
    let mut highs = Vec::with_capacity(spaces.len());
    let mut merged_dtype = None;
    for (name, space) in spaces.iter() {
        let (low, high, dtype) = match space {
            Space::Box { low, high, dtype } => (low, high, *dtype),
            _ => bail!("Cannot merge Box space with {} for {}", space, name),
        };
        match merged_dtype {
            Some(d) if d != dtype => bail!(
                "All Box spaces must have the same dtype. Got {} and {}",
                d,
                dtype
            ),
            _ => merged_dtype = Some(dtype),
        }
        lows.push(low.view());
        highs.push(high.view());
    }

    let ndim = lows[0].ndim();
    if let Some(view) = lows.iter().find(|v| v.ndim() != ndim) {
        bail!(
            "All Box spaces must have the same number of dimensions. Got {} and {}",
            ndim,
            view.ndim()
        );
    }
    let axis = Axis(last_axis(lows[0].shape(), "Box")?);
    Ok(Space::Box {
        low: concatenate(axis, &lows)?,
        high: concatenate(axis, &highs)?,
        dtype: merged_dtype.unwrap_or(DType::Float32),
    })
}

fn merge_binaries(spaces: &BTreeMap<String, Space>) -> Result<Space> {
    let mut n = 0;
    for (name, space) in spaces.iter() {
        match space {
            Space::MultiBinary { shape } if shape.len() == 1 => n += shape[0],
            _ => bail!("Cannot merge MultiBinary space with {} for {}", space, name),
        }
    }
    Ok(Space::multi_binary(n))
}

fn merge_discretes(spaces: &BTreeMap<String, Space>) -> Result<Space> {
    let mut nvec = Vec::new();
    for (name, space) in spaces.iter() {
        match space {
            Space::Discrete { n } => nvec.push(*n),
            Space::MultiDiscrete { nvec: parts } if parts.ndim() == 1 => {
                nvec.extend(parts.iter().cloned())
            }
            _ => bail!(
                "Cannot merge Discrete or MultiDiscrete space with {} for {}",
                space,
                name
            ),
        }
    }
    Ok(Space::multi_discrete(nvec))
}

/// Merges the parts of a dict space into a single space.
///
/// Box parts are concatenated along their last axis and must share their
/// dtype and number of dimensions. MultiBinary parts are concatenated into one
/// MultiBinary space. Discrete and MultiDiscrete parts become a single
/// MultiDiscrete space. The kind of the first part decides which rule applies.
pub fn merge_spaces(spaces: &BTreeMap<String, Space>) -> Result<Space> {
    match spaces.values().next() {
        None => bail!("No Action Spaces to merge."),
        Some(Space::Box { .. }) => merge_boxes(spaces),
        Some(Space::MultiBinary { .. }) => merge_binaries(spaces),
        Some(Space::Discrete { .. }) | Some(Space::MultiDiscrete { .. }) => {
            merge_discretes(spaces)
        }
        Some(space) => bail!("Merge not implemented for space type: {}", space),
    }
}

fn split_error(value: &Point, name: &str, space: &Space) -> anyhow::Error {
    ScholaError::Batch(format!(
        "cannot split {} value into {} for {}",
        value.kind(),
        space,
        name
    ))
    .into()
}

fn take<T: Clone>(a: &ArrayD<T>, axis: Axis, start: usize, size: usize) -> Result<ArrayD<T>> {
    if start + size > a.len_of(axis) {
        return Err(ScholaError::Batch(format!(
            "value of length {} is too short for the merged space",
            a.len_of(axis)
        ))
        .into());
    }
    Ok(a.slice_axis(axis, Slice::from(start..start + size)).to_owned())
}

/// Splits a value of the space merged by [`merge_spaces`] back into a
/// [`Point::Dict`] over `spaces`.
pub fn split_value(value: &Point, spaces: &BTreeMap<String, Space>) -> Result<Point> {
    let mut parts = BTreeMap::new();
    let mut start = 0;
    for (name, space) in spaces.iter() {
        let part = match (value, space) {
            (Point::Box(x), Space::Box { low, .. }) => {
                let axis = Axis(last_axis(x.shape(), name)?);
                let size = low.shape().last().cloned().unwrap_or(1);
                let part = take(x, axis, start, size)?;
                start += size;
                Point::Box(part)
            }
            (Point::MultiBinary(x), Space::MultiBinary { shape }) => {
                let size = shape.iter().product();
                let part = take(x, Axis(last_axis(x.shape(), name)?), start, size)?;
                start += size;
                Point::MultiBinary(part)
            }
            (Point::MultiDiscrete(x), Space::Discrete { .. }) => {
                let part = take(x, Axis(last_axis(x.shape(), name)?), start, 1)?;
                start += 1;
                match part.iter().next() {
                    Some(v) => Point::Discrete(*v),
                    None => return Err(split_error(value, name, space)),
                }
            }
            (Point::MultiDiscrete(x), Space::MultiDiscrete { nvec }) => {
                let size = nvec.len();
                let part = take(x, Axis(last_axis(x.shape(), name)?), start, size)?;
                start += size;
                Point::MultiDiscrete(part)
            }
            _ => return Err(split_error(value, name, space)),
        };
        parts.insert(name.clone(), part);
    }
    Ok(Point::Dict(parts))
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::IxDyn;
    use test_log::test;

    #[test]
    fn test_merge_discrete_parts() -> Result<()> {
        let spaces = [
            ("move".to_string(), Space::discrete(3)),
            ("turn".to_string(), Space::multi_discrete(vec![2, 4])),
        ]
        .iter()
        .cloned()
        .collect::<BTreeMap<_, _>>();
        let merged = merge_spaces(&spaces)?;
        assert_eq!(merged, Space::multi_discrete(vec![3, 2, 4]));

        let split = split_value(&Point::multi_discrete(vec![2, 1, 3]), &spaces)?;
        assert!(Space::Dict(spaces.clone()).contains(&split));
        if let Point::Dict(parts) = split {
            assert_eq!(parts["move"], Point::Discrete(2));
            assert_eq!(parts["turn"], Point::multi_discrete(vec![1, 3]));
        }
        Ok(())
    }

    #[test]
    fn test_merge_box_parts() -> Result<()> {
        let spaces = [
            ("a".to_string(), Space::boxed(-1.0, 1.0, &[2])),
            ("b".to_string(), Space::boxed(0.0, 5.0, &[1])),
        ]
        .iter()
        .cloned()
        .collect::<BTreeMap<_, _>>();
        let merged = merge_spaces(&spaces)?;
        assert_eq!(merged.shape(), vec![3]);
        assert!(merged.contains(&Point::box1(vec![-1.0, 1.0, 5.0])));
        assert!(!merged.contains(&Point::box1(vec![0.0, 0.0, -1.0])));

        let split = split_value(&Point::box1(vec![0.5, -0.5, 4.0]), &spaces)?;
        let mut expected = BTreeMap::new();
        expected.insert("a".to_string(), Point::box1(vec![0.5, -0.5]));
        expected.insert("b".to_string(), Point::box1(vec![4.0]));
        assert_eq!(split, Point::Dict(expected));
        Ok(())
    }

    #[test]
    fn test_merge_binary_parts() -> Result<()> {
        let spaces = [
            ("x".to_string(), Space::multi_binary(2)),
            ("y".to_string(), Space::multi_binary(1)),
        ]
        .iter()
        .cloned()
        .collect::<BTreeMap<_, _>>();
        assert_eq!(merge_spaces(&spaces)?, Space::multi_binary(3));

        let value = Point::MultiBinary(ArrayD::from_shape_vec(IxDyn(&[3]), vec![1, 0, 1])?);
        let split = split_value(&value, &spaces)?;
        assert!(Space::Dict(spaces).contains(&split));
        Ok(())
    }

    #[test]
    fn test_incompatible_parts() {
        let mixed = [
            ("a".to_string(), Space::discrete(2)),
            ("b".to_string(), Space::boxed(0.0, 1.0, &[1])),
        ]
        .iter()
        .cloned()
        .collect::<BTreeMap<_, _>>();
        assert!(merge_spaces(&mixed).is_err());
        assert!(merge_spaces(&BTreeMap::new()).is_err());

        let mut dtypes = BTreeMap::new();
        dtypes.insert("a".to_string(), Space::boxed(0.0, 1.0, &[1]));
        dtypes.insert(
            "b".to_string(),
            Space::Box {
                low: ArrayD::zeros(IxDyn(&[1])),
                high: ArrayD::ones(IxDyn(&[1])),
                dtype: DType::Int32,
            },
        );
        assert!(merge_spaces(&dtypes).is_err());
    }

    #[test]
    fn test_split_rejects_short_value() {
        let mut spaces = BTreeMap::new();
        spaces.insert("turn".to_string(), Space::multi_discrete(vec![2, 4]));
        let err = split_value(&Point::multi_discrete(vec![1]), &spaces).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::Batch(_))
        ));
    }
}
