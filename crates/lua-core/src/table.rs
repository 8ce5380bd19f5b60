use crate::error::LuaError;
use crate::value::LuaValue;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shared, interior-mutable table handle. Metatables are tables too.
pub type TableRef = Arc<RwLock<LuaTable>>;

/// A Lua table: an insertion-ordered map from non-nil keys to non-nil values.
///
/// Iteration (`next`, `pairs`) follows insertion order. Assigning `nil`
/// leaves a dead entry behind, so a traversal may clear the key it is
/// standing on. Dead entries are dropped the next time a new key is added
/// while they outnumber the live ones.
#[derive(Debug, Clone, Default)]
pub struct LuaTable {
    /// A `nil` value marks a dead entry.
    entries: IndexMap<TableKey, LuaValue>,
    live: usize,
    metatable: Option<TableRef>,
}

/// A value usable as a table key: never `nil`, never NaN.
///
/// Numbers hash by bit pattern (with `-0` folded into `0`), strings by
/// content, reference types by identity.
#[derive(Debug, Clone)]
pub struct TableKey(LuaValue);

impl TableKey {
    pub fn new(v: LuaValue) -> Result<Self, LuaError> {
        match &v {
            LuaValue::Nil => Err(LuaError::type_error("table index is nil")),
            LuaValue::Number(n) if n.is_nan() => Err(LuaError::type_error("table index is NaN")),
            _ => Ok(Self(v)),
        }
    }

    pub fn value(&self) -> &LuaValue {
        &self.0
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            LuaValue::Nil => {}
            LuaValue::Boolean(b) => b.hash(state),
            LuaValue::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state);
            }
            LuaValue::LuaString(s) => s.hash(state),
            other => other.identity().hash(state),
        }
    }
}

impl LuaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence `{v1, v2, ...}` with keys `1..=n`. `nil` items are skipped.
    pub fn from_sequence(items: impl IntoIterator<Item = LuaValue>) -> Self {
        let mut t = Self::new();
        for (i, v) in items.into_iter().enumerate() {
            if !v.is_nil() {
                t.entries.insert(TableKey(LuaValue::from(i + 1)), v);
                t.live += 1;
            }
        }
        t
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) {
        self.metatable = mt;
    }

    /// Read `t[key]`. Returns `LuaValue::Nil` for missing (or unusable) keys.
    pub fn get(&self, key: &LuaValue) -> LuaValue {
        match TableKey::new(key.clone()) {
            Ok(k) => self.entries.get(&k).cloned().unwrap_or(LuaValue::Nil),
            Err(_) => LuaValue::Nil,
        }
    }

    /// Read `t[name]` for a string key.
    pub fn get_str(&self, name: &str) -> LuaValue {
        self.get(&LuaValue::from(name))
    }

    pub fn contains_key(&self, key: &LuaValue) -> bool {
        !self.get(key).is_nil()
    }

    /// Write `t[key] = val`. Setting to nil deletes the entry.
    pub fn set(&mut self, key: LuaValue, val: LuaValue) -> Result<(), LuaError> {
        let key = TableKey::new(key)?;
        if let Some(slot) = self.entries.get_mut(&key) {
            match (slot.is_nil(), val.is_nil()) {
                (true, false) => self.live += 1,
                (false, true) => self.live -= 1,
                _ => {}
            }
            *slot = val;
        } else if !val.is_nil() {
            if self.entries.len() - self.live > self.live {
                self.compact();
            }
            self.entries.insert(key, val);
            self.live += 1;
        }
        Ok(())
    }

    fn compact(&mut self) {
        self.entries.retain(|_, v| !v.is_nil());
    }

    /// Raw entry count (not the sequence border).
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// The entry following `key` in insertion order, or the first entry when
    /// `key` is nil. `Ok(None)` after the last key. `key` may have been
    /// cleared since it was returned.
    pub fn next(&self, key: &LuaValue) -> Result<Option<(LuaValue, LuaValue)>, LuaError> {
        let pos = if key.is_nil() {
            0
        } else {
            let k = TableKey::new(key.clone())?;
            match self.entries.get_index_of(&k) {
                Some(i) => i + 1,
                None => return Err(LuaError::type_error("invalid key to 'next'")),
            }
        };
        Ok(self
            .entries
            .iter()
            .skip(pos)
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.0.clone(), v.clone())))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LuaValue, &LuaValue)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (&k.0, v))
    }

    /// Remove every entry; the metatable is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(v: &str) -> LuaValue {
        LuaValue::from(v)
    }

    fn n(v: f64) -> LuaValue {
        LuaValue::Number(v)
    }

    #[test]
    fn missing_key_reads_nil() {
        let t = LuaTable::new();
        assert_eq!(t.get(&s("x")), LuaValue::Nil);
    }

    #[test]
    fn nil_key_is_rejected_on_write() {
        let mut t = LuaTable::new();
        assert!(matches!(t.set(LuaValue::Nil, n(1.0)), Err(LuaError::TypeError(_))));
        assert!(matches!(t.set(n(f64::NAN), n(1.0)), Err(LuaError::TypeError(_))));
    }

    #[test]
    fn nil_value_removes_key_and_keeps_order() {
        let mut t = LuaTable::new();
        t.set(s("a"), n(1.0)).unwrap();
        t.set(s("b"), n(2.0)).unwrap();
        t.set(s("c"), n(3.0)).unwrap();
        t.set(s("b"), LuaValue::Nil).unwrap();
        let keys: Vec<LuaValue> = t.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![s("a"), s("c")]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn clearing_during_traversal_keeps_next_valid() {
        let mut t = LuaTable::new();
        for k in ["a", "b", "c"] {
            t.set(s(k), n(1.0)).unwrap();
        }
        let mut key = LuaValue::Nil;
        let mut visited = Vec::new();
        while let Some((k, _)) = t.next(&key).unwrap() {
            t.set(k.clone(), LuaValue::Nil).unwrap();
            visited.push(k.clone());
            key = k;
        }
        assert_eq!(visited, vec![s("a"), s("b"), s("c")]);
        assert!(t.is_empty());
        assert_eq!(t.next(&LuaValue::Nil).unwrap(), None);
    }

    #[test]
    fn dead_entries_are_dropped_when_keys_are_added() {
        let mut t = LuaTable::new();
        for i in 0..4 {
            t.set(n(f64::from(i)), n(1.0)).unwrap();
        }
        for i in 0..3 {
            t.set(n(f64::from(i)), LuaValue::Nil).unwrap();
        }
        t.set(s("fresh"), n(2.0)).unwrap();
        assert_eq!(t.entries.len(), 2);
        assert_eq!(t.len(), 2);
        let keys: Vec<LuaValue> = t.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![n(3.0), s("fresh")]);
    }

    #[test]
    fn cleared_key_can_be_reassigned_in_place() {
        let mut t = LuaTable::new();
        t.set(s("a"), n(1.0)).unwrap();
        t.set(s("b"), n(2.0)).unwrap();
        t.set(s("a"), LuaValue::Nil).unwrap();
        t.set(s("a"), n(3.0)).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.next(&LuaValue::Nil).unwrap(), Some((s("a"), n(3.0))));
    }

    #[test]
    fn negative_zero_and_zero_are_one_key() {
        let mut t = LuaTable::new();
        t.set(n(0.0), s("zero")).unwrap();
        assert_eq!(t.get(&n(-0.0)), s("zero"));
    }

    #[test]
    fn next_walks_insertion_order() {
        let mut t = LuaTable::new();
        t.set(s("z"), n(1.0)).unwrap();
        t.set(n(10.0), n(2.0)).unwrap();
        t.set(s("a"), n(3.0)).unwrap();

        let mut seen = Vec::new();
        let mut key = LuaValue::Nil;
        while let Some((k, v)) = t.next(&key).unwrap() {
            seen.push((k.clone(), v));
            key = k;
        }
        assert_eq!(
            seen,
            vec![(s("z"), n(1.0)), (n(10.0), n(2.0)), (s("a"), n(3.0))]
        );
    }

    #[test]
    fn next_on_empty_table_is_none() {
        assert_eq!(LuaTable::new().next(&LuaValue::Nil).unwrap(), None);
    }

    #[test]
    fn next_with_unknown_key_fails() {
        let t = LuaTable::from_sequence([n(1.0)]);
        assert!(t.next(&s("missing")).is_err());
    }

    #[test]
    fn reference_keys_use_identity() {
        let k1 = LuaValue::new_table();
        let k2 = LuaValue::new_table();
        let mut t = LuaTable::new();
        t.set(k1.clone(), n(1.0)).unwrap();
        assert_eq!(t.get(&k1), n(1.0));
        assert_eq!(t.get(&k2), LuaValue::Nil);
    }
}
