//! Mapping between nested `(env_id, agent_id)` ids and flat indices.
//!
//! The flat index of a pair is assigned once, when the [`IdManager`] is built,
//! by enumerating environments in order and, within each environment, agents
//! in the order they were reported. It never changes afterwards, even if agents
//! later disappear from the simulator's reports.
use crate::{error::ScholaError, AgentId, EnvId, Nested};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};

/// Looks up `dct[env_id][agent_id]`, returning `default` when either key is missing.
pub fn nested_get<'a, T>(
    dct: &'a BTreeMap<EnvId, BTreeMap<AgentId, T>>,
    env_id: EnvId,
    agent_id: &str,
    default: &'a T,
) -> &'a T {
    dct.get(&env_id)
        .and_then(|agents| agents.get(agent_id))
        .unwrap_or(default)
}

/// Bidirectional mapping between nested ids and flat indices.
#[derive(Debug, Clone, PartialEq)]
pub struct IdManager {
    ids: Vec<Vec<AgentId>>,
    id_list: Vec<(EnvId, AgentId)>,
    id_map: Vec<HashMap<AgentId, usize>>,
}

impl IdManager {
    /// Builds the mapping for a population, indexed first by environment.
    ///
    /// No validation takes place here: an empty population or an environment
    /// without agents is accepted and must be rejected by the caller.
    pub fn new(ids: Vec<Vec<AgentId>>) -> Self {
        let mut id_list = Vec::with_capacity(ids.iter().map(Vec::len).sum());
        let mut id_map = Vec::with_capacity(ids.len());
        for (env_id, agent_ids) in ids.iter().enumerate() {
            let mut agent_map = HashMap::with_capacity(agent_ids.len());
            for agent_id in agent_ids.iter() {
                agent_map.insert(agent_id.clone(), id_list.len());
                id_list.push((env_id, agent_id.clone()));
            }
            id_map.push(agent_map);
        }

        Self {
            ids,
            id_list,
            id_map,
        }
    }

    /// The population as given at construction.
    pub fn ids(&self) -> &[Vec<AgentId>] {
        &self.ids
    }

    /// Nested ids ordered by flat index.
    pub fn id_list(&self) -> &[(EnvId, AgentId)] {
        &self.id_list
    }

    /// Total number of `(env_id, agent_id)` pairs.
    pub fn num_ids(&self) -> usize {
        self.id_list.len()
    }

    /// Number of environments.
    pub fn num_envs(&self) -> usize {
        self.ids.len()
    }

    /// Flat index of a nested id.
    pub fn to_flat(&self, env_id: EnvId, agent_id: &str) -> Result<usize> {
        self.id_map
            .get(env_id)
            .and_then(|agents| agents.get(agent_id))
            .copied()
            .ok_or_else(|| {
                ScholaError::UnknownId {
                    env_id,
                    agent_id: agent_id.to_string(),
                }
                .into()
            })
    }

    /// Nested id of a flat index.
    pub fn to_nested(&self, uid: usize) -> Result<(EnvId, &str)> {
        self.id_list
            .get(uid)
            .map(|(env_id, agent_id)| (*env_id, agent_id.as_str()))
            .ok_or_else(|| {
                ScholaError::FlatIndexOutOfRange {
                    uid,
                    num_ids: self.num_ids(),
                }
                .into()
            })
    }

    /// Agents of one environment, in definition order, regardless of liveness.
    pub fn partial_get(&self, env_id: EnvId) -> &[AgentId] {
        self.ids.get(env_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Flattens per-environment maps into a vector indexed by flat id.
    ///
    /// Slots whose pair is absent from `nested` are `None`.
    pub fn partial_flatten_list_of_dicts<T: Clone>(
        &self,
        nested: &[BTreeMap<AgentId, T>],
    ) -> Result<Vec<Option<T>>> {
        let mut output = vec![None; self.num_ids()];
        for (env_id, agents) in nested.iter().enumerate() {
            for (agent_id, value) in agents.iter() {
                output[self.to_flat(env_id, agent_id)?] = Some(value.clone());
            }
        }
        Ok(output)
    }

    /// Flattens per-environment maps into a vector indexed by flat id, filling
    /// absent pairs with `default`.
    pub fn flatten_list_of_dicts<T: Clone>(
        &self,
        nested: &[BTreeMap<AgentId, T>],
        default: T,
    ) -> Result<Vec<T>> {
        Ok(self
            .partial_flatten_list_of_dicts(nested)?
            .into_iter()
            .map(|v| v.unwrap_or_else(|| default.clone()))
            .collect())
    }

    /// Same as [`IdManager::partial_flatten_list_of_dicts`] for maps keyed by environment id.
    pub fn partial_flatten_dict_of_dicts<T: Clone>(
        &self,
        nested: &Nested<T>,
    ) -> Result<Vec<Option<T>>> {
        let mut output = vec![None; self.num_ids()];
        for (env_id, agents) in nested.iter() {
            for (agent_id, value) in agents.iter() {
                output[self.to_flat(*env_id, agent_id)?] = Some(value.clone());
            }
        }
        Ok(output)
    }

    /// Same as [`IdManager::flatten_list_of_dicts`] for maps keyed by environment id.
    pub fn flatten_dict_of_dicts<T: Clone>(&self, nested: &Nested<T>, default: T) -> Result<Vec<T>> {
        Ok(self
            .partial_flatten_dict_of_dicts(nested)?
            .into_iter()
            .map(|v| v.unwrap_or_else(|| default.clone()))
            .collect())
    }

    /// Nests a vector indexed by flat id into per-environment maps.
    ///
    /// Every pair of the definition appears in the output; pairs beyond the
    /// end of `flat` hold `default`. Extra elements are an error.
    pub fn nest_list_to_dict_of_dicts<T: Clone>(&self, flat: &[T], default: T) -> Result<Nested<T>> {
        if flat.len() > self.num_ids() {
            return Err(ScholaError::FlatIndexOutOfRange {
                uid: flat.len() - 1,
                num_ids: self.num_ids(),
            }
            .into());
        }
        let mut output: Nested<T> = self
            .ids
            .iter()
            .enumerate()
            .map(|(env_id, agent_ids)| {
                let agents = agent_ids
                    .iter()
                    .map(|agent_id| (agent_id.clone(), default.clone()))
                    .collect();
                (env_id, agents)
            })
            .collect();
        for (uid, value) in flat.iter().enumerate() {
            let (env_id, agent_id) = &self.id_list[uid];
            if let Some(agents) = output.get_mut(env_id) {
                agents.insert(agent_id.clone(), value.clone());
            }
        }
        Ok(output)
    }

    /// Picks, for every environment, the value at the flat index of its first agent.
    ///
    /// Turns per-slot seeds or options into the per-environment lists a
    /// protocol expects. `flat` must hold one value per flat index.
    pub fn first_of_each_env<T: Clone>(&self, flat: &[T]) -> Result<Vec<T>> {
        if flat.len() != self.num_ids() {
            return Err(ScholaError::InvalidSeeds {
                expected: self.num_ids(),
                got: flat.len(),
            }
            .into());
        }
        self.ids
            .iter()
            .enumerate()
            .map(|(env_id, agent_ids)| -> Result<T> {
                match agent_ids.first() {
                    Some(agent_id) => Ok(flat[self.to_flat(env_id, agent_id)?].clone()),
                    None => Err(ScholaError::NoAgents(env_id).into()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ids() -> Vec<Vec<AgentId>> {
        vec![
            vec!["a".into(), "b".into()],
            vec!["c".into()],
            vec!["a".into(), "d".into(), "e".into()],
        ]
    }

    #[test]
    fn test_index_bijection() -> Result<()> {
        let id_manager = IdManager::new(ids());
        assert_eq!(id_manager.num_envs(), 3);
        assert_eq!(id_manager.num_ids(), 6);
        assert_eq!(
            id_manager.num_ids(),
            id_manager.ids().iter().map(Vec::len).sum::<usize>()
        );
        for uid in 0..id_manager.num_ids() {
            let (env_id, agent_id) = id_manager.to_nested(uid)?;
            assert_eq!(id_manager.to_flat(env_id, agent_id)?, uid);
        }
        assert_eq!(id_manager.to_nested(3)?, (2, "a"));
        assert_eq!(id_manager.to_flat(0, "b")?, 1);
        Ok(())
    }

    #[test]
    fn test_unknown_ids() {
        let id_manager = IdManager::new(ids());
        let err = id_manager.to_flat(1, "a").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::UnknownId { env_id: 1, .. })
        ));
        let err = id_manager.to_nested(6).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::FlatIndexOutOfRange { uid: 6, num_ids: 6 })
        ));
        assert!(id_manager.partial_get(7).is_empty());
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let id_manager = IdManager::new(ids());
        let flat = (0..id_manager.num_ids() as i64).collect::<Vec<_>>();
        let nested = id_manager.nest_list_to_dict_of_dicts(&flat, -1)?;
        assert_eq!(nested[&2]["d"], 4);

        let as_list = nested.values().cloned().collect::<Vec<_>>();
        assert_eq!(id_manager.flatten_list_of_dicts(&as_list, -1)?, flat);
        assert_eq!(id_manager.flatten_dict_of_dicts(&nested, -1)?, flat);
        Ok(())
    }

    #[test]
    fn test_flatten_with_missing_entries() -> Result<()> {
        let id_manager = IdManager::new(ids());
        let mut env0 = BTreeMap::new();
        env0.insert("b".to_string(), 1.5f32);
        let mut env2 = BTreeMap::new();
        env2.insert("e".to_string(), 2.5f32);
        let nested = vec![env0, BTreeMap::new(), env2];

        assert_eq!(
            id_manager.flatten_list_of_dicts(&nested, 0.0)?,
            vec![0.0, 1.5, 0.0, 0.0, 0.0, 2.5]
        );
        let partial = id_manager.partial_flatten_list_of_dicts(&nested)?;
        assert_eq!(partial.iter().filter(|v| v.is_some()).count(), 2);

        let mut unknown = BTreeMap::new();
        unknown.insert("z".to_string(), 0.0f32);
        assert!(id_manager.flatten_list_of_dicts(&[unknown], 0.0).is_err());
        Ok(())
    }

    #[test]
    fn test_nest_partial_list() -> Result<()> {
        let id_manager = IdManager::new(ids());
        let nested = id_manager.nest_list_to_dict_of_dicts(&[7, 8], 0)?;
        assert_eq!(nested[&0]["a"], 7);
        assert_eq!(nested[&0]["b"], 8);
        assert_eq!(nested[&2]["e"], 0);
        assert!(id_manager
            .nest_list_to_dict_of_dicts(&[0; 7], 0)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_first_of_each_env() -> Result<()> {
        let id_manager = IdManager::new(ids());
        assert_eq!(
            id_manager.first_of_each_env(&[10, 11, 12, 13, 14, 15])?,
            vec![10, 12, 13]
        );
        assert!(id_manager.first_of_each_env(&[1, 2]).is_err());
        Ok(())
    }

    #[test]
    fn test_nested_get() {
        let id_manager = IdManager::new(ids());
        let nested = id_manager
            .nest_list_to_dict_of_dicts(&[1, 2, 3, 4, 5, 6], 0)
            .unwrap();
        assert_eq!(*nested_get(&nested, 1, "c", &-1), 3);
        assert_eq!(*nested_get(&nested, 1, "a", &-1), -1);
        assert_eq!(*nested_get(&nested, 9, "a", &-1), -1);
    }
}
