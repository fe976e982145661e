//! Per-invocation variable storage.

use std::collections::HashMap;
use za_types::{Value, ValueMap};

use crate::error::{EvalError, EvalResult};
use crate::ops::{index, key_string, to_index};

/// Name → value bindings for one active invocation.
///
/// Names are interned to slots on first write. `unset` empties the slot but
/// keeps it reserved, so the table never shrinks while the frame is live.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    slots: Vec<Option<Value>>,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            names: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Bind `name`, returning whether it was already bound.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.index.get(name) {
            Some(&slot) => self.slots[slot].replace(value).is_some(),
            None => {
                self.index.insert(name.to_string(), self.slots.len());
                self.names.push(name.to_string());
                self.slots.push(Some(value));
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let slot = *self.index.get(name)?;
        self.slots[slot].as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove the binding for `name`, returning the value it held.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        let slot = *self.index.get(name)?;
        self.slots[slot].take()
    }

    /// `name[key]` without copying the aggregate out first.
    pub fn get_element(&self, name: &str, key: &Value) -> EvalResult<Value> {
        let container = self
            .get(name)
            .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))?;
        index(container, key)
    }

    /// `name[key] = value`, in place.
    ///
    /// An unbound name becomes a map for a string key and a sequence for an
    /// integer key. Writing past the end of a sequence grows it, padding with
    /// `nil`.
    pub fn set_element(&mut self, name: &str, key: &Value, value: Value) -> EvalResult<()> {
        if !self.contains(name) {
            let fresh = match key {
                Value::Str(_) => Value::Map(ValueMap::new()),
                _ => Value::Seq(Vec::new()),
            };
            self.set(name, fresh);
        }
        let slot = self.index[name];
        match self.slots[slot].as_mut() {
            Some(Value::Map(map)) => {
                map.insert(key_string(key), value);
                Ok(())
            }
            Some(Value::Seq(items)) => {
                let i = to_index(key)?;
                let pos = usize::try_from(i)
                    .map_err(|_| EvalError::IndexOutOfRange(format!("index {i}")))?;
                if pos >= items.len() {
                    items.resize(pos + 1, Value::Nil);
                }
                items[pos] = value;
                Ok(())
            }
            Some(other) => Err(EvalError::type_mismatch(format!(
                "cannot assign an element of {}",
                other.kind_name()
            ))),
            None => Err(EvalError::UndefinedVariable(name.to_string())),
        }
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots reserved so far, bound or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live bindings in first-write order.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names
            .iter()
            .zip(&self.slots)
            .filter_map(|(n, v)| Some((n.as_str(), v.as_ref()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_reports_prior_binding() {
        let mut t = VariableTable::new();
        assert!(!t.set("a", Value::Int(1)));
        assert!(t.set("a", Value::Int(2)));
        assert_eq!(t.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_unset_keeps_slot() {
        let mut t = VariableTable::new();
        t.set("a", Value::Int(1));
        t.set("b", Value::Int(2));
        assert_eq!(t.unset("a"), Some(Value::Int(1)));
        assert_eq!(t.get("a"), None);
        assert_eq!(t.capacity(), 2);
        assert_eq!(t.len(), 1);
        assert!(!t.set("a", Value::Int(3)));
        assert_eq!(t.capacity(), 2);
    }

    #[test]
    fn test_table_grows_past_initial_capacity() {
        let mut t = VariableTable::with_capacity(2);
        for i in 0..100 {
            t.set(&format!("v{i}"), Value::Int(i));
        }
        assert_eq!(t.len(), 100);
        assert_eq!(t.get("v99"), Some(&Value::Int(99)));
    }

    #[test]
    fn test_set_element_creates_container() {
        let mut t = VariableTable::new();
        t.set_element("m", &Value::from("k"), Value::Int(1)).unwrap();
        assert_eq!(t.get_element("m", &Value::from("k")).unwrap(), Value::Int(1));
        t.set_element("s", &Value::Int(2), Value::from("x")).unwrap();
        assert_eq!(
            t.get("s"),
            Some(&Value::Seq(vec![Value::Nil, Value::Nil, Value::from("x")]))
        );
    }

    #[test]
    fn test_set_element_in_place() {
        let mut t = VariableTable::new();
        t.set("s", Value::Seq(vec![Value::Int(1), Value::Int(2)]));
        t.set_element("s", &Value::Int(0), Value::Int(9)).unwrap();
        assert_eq!(t.get_element("s", &Value::Int(0)).unwrap(), Value::Int(9));
        t.set("n", Value::Int(1));
        assert!(t.set_element("n", &Value::Int(0), Value::Int(1)).is_err());
    }

    #[test]
    fn test_bindings_in_first_write_order() {
        let mut t = VariableTable::new();
        t.set("z", Value::Int(1));
        t.set("a", Value::Int(2));
        let names: Vec<_> = t.bindings().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
