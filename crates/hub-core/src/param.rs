//! Typed parameters carried by events and actions

use serde::{Deserialize, Serialize};

use crate::{ParamTypeId, Value};

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub param_type_id: ParamTypeId,
    pub value: Value,
}

impl Param {
    pub fn new(param_type_id: ParamTypeId, value: impl Into<Value>) -> Self {
        Self {
            param_type_id,
            value: value.into(),
        }
    }
}

/// An ordered list of params, unique by param type id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamList(Vec<Param>);

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a param by its type id
    pub fn get(&self, param_type_id: &ParamTypeId) -> Option<&Value> {
        self.0
            .iter()
            .find(|p| &p.param_type_id == param_type_id)
            .map(|p| &p.value)
    }

    /// Set a param, replacing an existing one with the same type id
    pub fn set(&mut self, param: Param) {
        match self
            .0
            .iter_mut()
            .find(|p| p.param_type_id == param.param_type_id)
        {
            Some(existing) => existing.value = param.value,
            None => self.0.push(param),
        }
    }

    /// Builder-style [`ParamList::set`]
    pub fn with(mut self, param_type_id: ParamTypeId, value: impl Into<Value>) -> Self {
        self.set(Param::new(param_type_id, value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Param>> for ParamList {
    fn from(params: Vec<Param>) -> Self {
        let mut list = ParamList::new();
        for param in params {
            list.set(param);
        }
        list
    }
}

impl IntoIterator for ParamList {
    type Item = Param;
    type IntoIter = std::vec::IntoIter<Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces() {
        let id = ParamTypeId::new();
        let mut params = ParamList::new().with(id, 1);
        params.set(Param::new(id, 2));

        assert_eq!(params.len(), 1);
        assert_eq!(params.get(&id), Some(&Value::Int(2)));
    }

    #[test]
    fn test_from_vec_dedupes() {
        let id = ParamTypeId::new();
        let params = ParamList::from(vec![Param::new(id, "a"), Param::new(id, "b")]);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get(&id), Some(&Value::from("b")));
    }
}
