use crate::value::LuaValue;

static NIL: LuaValue = LuaValue::Nil;

/// Call arguments and call results.
///
/// Reading past the end yields `nil` instead of failing, so missing
/// arguments and missing return values are adjusted to `nil`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LuaArgs(Vec<LuaValue>);

impl LuaArgs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// The `i`-th value (0-based), or `nil` past the end.
    pub fn get(&self, i: usize) -> LuaValue {
        self.0.get(i).cloned().unwrap_or(LuaValue::Nil)
    }

    pub fn first(&self) -> LuaValue {
        self.get(0)
    }

    /// Consume the list and return its first value, or `nil`.
    pub fn into_first(self) -> LuaValue {
        self.0.into_iter().next().unwrap_or(LuaValue::Nil)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, v: LuaValue) {
        self.0.push(v);
    }

    /// Insert `v` before the current first value (used by `__call`).
    pub fn prepend(&mut self, v: LuaValue) {
        self.0.insert(0, v);
    }

    pub fn extend(&mut self, other: LuaArgs) {
        self.0.extend(other.0);
    }

    /// Values from position `start` onward (empty if `start` is past the end).
    pub fn tail(&self, start: usize) -> LuaArgs {
        LuaArgs(self.0.get(start..).map(<[_]>::to_vec).unwrap_or_default())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LuaValue> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[LuaValue] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<LuaValue> {
        self.0
    }
}

impl std::ops::Index<usize> for LuaArgs {
    type Output = LuaValue;

    fn index(&self, i: usize) -> &LuaValue {
        self.0.get(i).unwrap_or(&NIL)
    }
}

impl From<Vec<LuaValue>> for LuaArgs {
    fn from(v: Vec<LuaValue>) -> Self {
        Self(v)
    }
}

impl From<LuaValue> for LuaArgs {
    fn from(v: LuaValue) -> Self {
        Self(vec![v])
    }
}

impl FromIterator<LuaValue> for LuaArgs {
    fn from_iter<I: IntoIterator<Item = LuaValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for LuaArgs {
    type Item = LuaValue;
    type IntoIter = std::vec::IntoIter<LuaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a LuaArgs {
    type Item = &'a LuaValue;
    type IntoIter = std::slice::Iter<'a, LuaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_past_the_end_yields_nil() {
        let args = LuaArgs::from(vec![LuaValue::Number(1.0)]);
        assert_eq!(args.get(0), LuaValue::Number(1.0));
        assert_eq!(args.get(5), LuaValue::Nil);
        assert_eq!(args[3], LuaValue::Nil);
    }

    #[test]
    fn prepend_shifts_values() {
        let mut args = LuaArgs::from(vec![LuaValue::Number(2.0)]);
        args.prepend(LuaValue::Number(1.0));
        assert_eq!(args.into_vec(), vec![LuaValue::Number(1.0), LuaValue::Number(2.0)]);
    }

    #[test]
    fn tail_past_end_is_empty() {
        let args = LuaArgs::from(vec![LuaValue::Nil]);
        assert!(args.tail(4).is_empty());
        assert_eq!(args.tail(0).len(), 1);
    }
}
