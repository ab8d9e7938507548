//! Infos of a vectorized step, laid out by column.
//!
//! Every key present in at least one slot gets a column of `num_envs`
//! optional values and a mask telling which slots set the key. This is the
//! layout Gymnasium vector environments use for their info dict, where key
//! `k` comes with a boolean array `_k`.
use crate::{Info, Point};
use std::collections::BTreeMap;

/// Values of one info key across the slots of a vectorized environment.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoColumn<T> {
    values: Vec<Option<T>>,
    mask: Vec<bool>,
}

impl<T> InfoColumn<T> {
    /// An empty column for `num_envs` slots.
    pub fn new(num_envs: usize) -> Self {
        Self {
            values: (0..num_envs).map(|_| None).collect(),
            mask: vec![false; num_envs],
        }
    }

    /// Sets the value of slot `env_num`. Out of range slots are ignored.
    pub fn set(&mut self, env_num: usize, value: T) {
        if env_num < self.values.len() {
            self.values[env_num] = Some(value);
            self.mask[env_num] = true;
        }
    }

    /// Value of slot `env_num`, if set.
    pub fn get(&self, env_num: usize) -> Option<&T> {
        self.values.get(env_num).and_then(Option::as_ref)
    }

    /// Values of all slots.
    pub fn values(&self) -> &[Option<T>] {
        &self.values
    }

    /// The `_key` mask: `true` for slots holding a value.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }
}

/// Infos of the sub-environments that were reset within a step.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalInfo {
    info: Box<VecInfo>,
    mask: Vec<bool>,
}

impl FinalInfo {
    /// Terminal infos, by column.
    pub fn info(&self) -> &VecInfo {
        &self.info
    }

    /// The `_final_info` mask.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }
}

/// Infos of a vectorized reset or step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VecInfo {
    num_envs: usize,
    entries: BTreeMap<String, InfoColumn<String>>,
    final_obs: Option<InfoColumn<Point>>,
    final_info: Option<FinalInfo>,
}

impl VecInfo {
    /// Empty infos for `num_envs` slots.
    pub fn new(num_envs: usize) -> Self {
        Self {
            num_envs,
            ..Self::default()
        }
    }

    /// Number of slots.
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// Adds the info of slot `env_num`.
    pub fn add(&mut self, env_num: usize, info: &Info) {
        let num_envs = self.num_envs;
        for (key, value) in info.iter() {
            self.entries
                .entry(key.clone())
                .or_insert_with(|| InfoColumn::new(num_envs))
                .set(env_num, value.clone());
        }
    }

    /// Records the last observation and info of an episode that ended in slot `env_num`.
    pub fn add_final(&mut self, env_num: usize, final_obs: Point, final_info: &Info) {
        let num_envs = self.num_envs;
        self.final_obs
            .get_or_insert_with(|| InfoColumn::new(num_envs))
            .set(env_num, final_obs);
        let final_info_ = self.final_info.get_or_insert_with(|| FinalInfo {
            info: Box::new(VecInfo::new(num_envs)),
            mask: vec![false; num_envs],
        });
        final_info_.info.add(env_num, final_info);
        if env_num < num_envs {
            final_info_.mask[env_num] = true;
        }
    }

    /// Column of `key`.
    pub fn get(&self, key: &str) -> Option<&InfoColumn<String>> {
        self.entries.get(key)
    }

    /// Keys with a column, excluding `final_obs` and `final_info`.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Terminal observations, present if an episode ended within the step.
    pub fn final_obs(&self) -> Option<&InfoColumn<Point>> {
        self.final_obs.as_ref()
    }

    /// Terminal infos, present if an episode ended within the step.
    pub fn final_info(&self) -> Option<&FinalInfo> {
        self.final_info.as_ref()
    }

    /// Returns `true` if no slot added anything.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.final_obs.is_none() && self.final_info.is_none()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn info(items: &[(&str, &str)]) -> Info {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_add() {
        let mut infos = VecInfo::new(3);
        assert!(infos.is_empty());
        infos.add(0, &info(&[("score", "1")]));
        infos.add(2, &info(&[("score", "3"), ("lap", "2")]));

        let score = infos.get("score").map(InfoColumn::mask);
        assert_eq!(score, Some(&[true, false, true][..]));
        assert_eq!(infos.get("lap").and_then(|c| c.get(2)), Some(&"2".to_string()));
        assert_eq!(infos.get("lap").and_then(|c| c.get(0)), None);
        assert_eq!(infos.keys().count(), 2);
        assert!(infos.final_obs().is_none());
    }

    #[test]
    fn test_add_final() {
        let mut infos = VecInfo::new(3);
        infos.add_final(1, Point::Discrete(4), &Info::new());
        let final_obs = infos.final_obs().map(|c| c.values().to_vec());
        assert_eq!(final_obs, Some(vec![None, Some(Point::Discrete(4)), None]));

        let final_info = infos.final_info().map(FinalInfo::mask);
        assert_eq!(final_info, Some(&[false, true, false][..]));
        assert!(infos.final_info().map_or(false, |f| f.info().is_empty()));
        assert!(!infos.is_empty());
    }
}
