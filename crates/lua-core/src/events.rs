//! Metatable event dispatch.
//!
//! Every dynamic operator the compiler emits lands here. Each event first
//! tries the raw operation; only when that is insufficient does it consult
//! the operands' metatables. Binary events use left-operand priority: the
//! handler on operand 1's metatable wins over operand 2's.

use crate::args::LuaArgs;
use crate::error::LuaError;
use crate::value::{format_number, LuaValue};
use std::cmp::Ordering;

/// Longest `__index` / `__newindex` delegation chain followed before giving up.
const MAX_DELEGATION: usize = 100;

// ── Metamethod lookup ─────────────────────────────────────────────────────────

/// `getmetatable(obj)[event]` without triggering any further events.
pub fn get_metamethod(obj: &LuaValue, event: &str) -> LuaValue {
    match obj.metatable() {
        Some(mt) => mt.read().get_str(event),
        None => LuaValue::Nil,
    }
}

/// First non-nil handler for `event`, operand 1 before operand 2.
fn binary_handler(a: &LuaValue, b: &LuaValue, event: &str) -> LuaValue {
    let h = get_metamethod(a, event);
    if h.is_nil() {
        get_metamethod(b, event)
    } else {
        h
    }
}

fn call_handler(handler: &LuaValue, event: &str, args: Vec<LuaValue>) -> Result<LuaValue, LuaError> {
    tracing::trace!(event, "dispatching metamethod");
    Ok(call_event(handler, LuaArgs::from(args))?.into_first())
}

// ── Raw operations ────────────────────────────────────────────────────────────

pub fn raw_get(table: &LuaValue, key: &LuaValue) -> Result<LuaValue, LuaError> {
    Ok(table.as_table()?.read().get(key))
}

pub fn raw_set(table: &LuaValue, key: LuaValue, value: LuaValue) -> Result<(), LuaError> {
    table.as_table()?.write().set(key, value)
}

/// Character count for strings, entry count for tables.
pub fn raw_len(v: &LuaValue) -> Result<usize, LuaError> {
    match v {
        LuaValue::LuaString(s) => Ok(s.chars().count()),
        LuaValue::Table(t) => Ok(t.read().len()),
        other => Err(LuaError::type_error(format!(
            "table or string expected, got {}",
            other.type_name()
        ))),
    }
}

pub fn raw_equal(a: &LuaValue, b: &LuaValue) -> bool {
    a == b
}

// ── Coercion ──────────────────────────────────────────────────────────────────

/// Numbers pass through; strings parse as decimal floats; everything else
/// is not coercible.
pub fn to_number(v: &LuaValue) -> Option<f64> {
    match v {
        LuaValue::Number(n) => Some(*n),
        LuaValue::LuaString(s) => parse_number(s),
        _ => None,
    }
}

/// Parse decimal number text (optional sign, fraction and exponent,
/// surrounding whitespace allowed). Words such as `inf` or `nan` are rejected.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    s.parse::<f64>().ok()
}

// ── Arithmetic ────────────────────────────────────────────────────────────────

/// Binary arithmetic operators and their metamethod names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    pub fn metamethod(self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Div => "__div",
            ArithOp::Mod => "__mod",
            ArithOp::Pow => "__pow",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a - (a / b).floor() * b,
            ArithOp::Pow => a.powf(b),
        }
    }
}

pub fn arith_event(op: ArithOp, a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    if let (Some(x), Some(y)) = (to_number(a), to_number(b)) {
        return Ok(LuaValue::Number(op.apply(x, y)));
    }
    let handler = binary_handler(a, b, op.metamethod());
    if handler.is_nil() {
        let culprit = if to_number(a).is_none() { a } else { b };
        return Err(LuaError::Arithmetic(format!(
            "attempt to perform arithmetic on a {} value",
            culprit.type_name()
        )));
    }
    call_handler(&handler, op.metamethod(), vec![a.clone(), b.clone()])
}

pub fn unm_event(a: &LuaValue) -> Result<LuaValue, LuaError> {
    if let Some(x) = to_number(a) {
        return Ok(LuaValue::Number(-x));
    }
    let handler = get_metamethod(a, "__unm");
    if handler.is_nil() {
        return Err(LuaError::Arithmetic(format!(
            "attempt to perform arithmetic on a {} value",
            a.type_name()
        )));
    }
    call_handler(&handler, "__unm", vec![a.clone()])
}

// ── Indexing ──────────────────────────────────────────────────────────────────

/// `table[key]` with `__index` fallback.
pub fn index_event(table: &LuaValue, key: &LuaValue) -> Result<LuaValue, LuaError> {
    let mut base = table.clone();
    for _ in 0..MAX_DELEGATION {
        let handler = match &base {
            LuaValue::Table(t) => {
                let v = t.read().get(key);
                if !v.is_nil() {
                    return Ok(v);
                }
                let h = get_metamethod(&base, "__index");
                if h.is_nil() {
                    return Ok(LuaValue::Nil);
                }
                h
            }
            other => {
                let h = get_metamethod(other, "__index");
                if h.is_nil() {
                    return Err(LuaError::type_error(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    )));
                }
                h
            }
        };
        if handler.is_function() {
            return call_handler(&handler, "__index", vec![base, key.clone()]);
        }
        base = handler;
    }
    Err(LuaError::type_error("'__index' chain too long; possible loop"))
}

/// `table[key] = value` with `__newindex` fallback for absent keys.
pub fn newindex_event(table: &LuaValue, key: LuaValue, value: LuaValue) -> Result<(), LuaError> {
    let mut base = table.clone();
    for _ in 0..MAX_DELEGATION {
        let handler = match &base {
            LuaValue::Table(t) => {
                // Existing keys are always raw-set; the metamethod only sees new keys.
                let exists = t.read().contains_key(&key);
                let h = if exists {
                    LuaValue::Nil
                } else {
                    get_metamethod(&base, "__newindex")
                };
                if h.is_nil() {
                    return t.write().set(key, value);
                }
                h
            }
            other => {
                let h = get_metamethod(other, "__newindex");
                if h.is_nil() {
                    return Err(LuaError::type_error(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    )));
                }
                h
            }
        };
        if handler.is_function() {
            call_handler(&handler, "__newindex", vec![base, key, value])?;
            return Ok(());
        }
        base = handler;
    }
    Err(LuaError::type_error("'__newindex' chain too long; possible loop"))
}

// ── Call ──────────────────────────────────────────────────────────────────────

pub fn call_event(func: &LuaValue, mut args: LuaArgs) -> Result<LuaArgs, LuaError> {
    if let LuaValue::Function(f) = func {
        return f.call(args);
    }
    match get_metamethod(func, "__call") {
        LuaValue::Function(handler) => {
            tracing::trace!(event = "__call", "dispatching metamethod");
            args.prepend(func.clone());
            handler.call(args)
        }
        _ => Err(LuaError::type_error(format!(
            "cannot call non-function value (a {} value)",
            func.type_name()
        ))),
    }
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// `__eq` applies only to two operands of the same tag (never table vs
/// userdata) that resolve to the same handler.
fn equal_handler(a: &LuaValue, b: &LuaValue) -> LuaValue {
    if a.type_name() != b.type_name() {
        return LuaValue::Nil;
    }
    let h1 = get_metamethod(a, "__eq");
    let h2 = get_metamethod(b, "__eq");
    if h1 == h2 {
        h1
    } else {
        LuaValue::Nil
    }
}

pub fn eq_event(a: &LuaValue, b: &LuaValue) -> Result<bool, LuaError> {
    if raw_equal(a, b) {
        return Ok(true);
    }
    let handler = equal_handler(a, b);
    if handler.is_nil() {
        return Ok(false);
    }
    Ok(call_handler(&handler, "__eq", vec![a.clone(), b.clone()])?.is_truthy())
}

fn compare_event(
    a: &LuaValue,
    b: &LuaValue,
    event: &'static str,
    accept: fn(Ordering) -> bool,
) -> Result<bool, LuaError> {
    match (a, b) {
        (LuaValue::Number(x), LuaValue::Number(y)) => {
            // NaN compares false with everything.
            Ok(x.partial_cmp(y).is_some_and(accept))
        }
        (LuaValue::LuaString(x), LuaValue::LuaString(y)) => Ok(accept(x.cmp(y))),
        _ => {
            let handler = binary_handler(a, b, event);
            if handler.is_nil() {
                return Err(LuaError::Comparison {
                    lhs: a.type_name(),
                    rhs: b.type_name(),
                });
            }
            Ok(call_handler(&handler, event, vec![a.clone(), b.clone()])?.is_truthy())
        }
    }
}

pub fn lt_event(a: &LuaValue, b: &LuaValue) -> Result<bool, LuaError> {
    compare_event(a, b, "__lt", Ordering::is_lt)
}

pub fn le_event(a: &LuaValue, b: &LuaValue) -> Result<bool, LuaError> {
    compare_event(a, b, "__le", Ordering::is_le)
}

// ── Length, concatenation, strings ────────────────────────────────────────────

pub fn len_event(v: &LuaValue) -> Result<LuaValue, LuaError> {
    if let LuaValue::LuaString(s) = v {
        return Ok(LuaValue::from(s.chars().count()));
    }
    let handler = get_metamethod(v, "__len");
    if !handler.is_nil() {
        return call_handler(&handler, "__len", vec![v.clone()]);
    }
    match v {
        LuaValue::Table(t) => Ok(LuaValue::from(t.read().len())),
        other => Err(LuaError::type_error(format!(
            "attempt to get length of a {} value",
            other.type_name()
        ))),
    }
}

fn concat_piece(v: &LuaValue) -> Option<String> {
    match v {
        LuaValue::LuaString(s) => Some(s.to_string()),
        LuaValue::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

pub fn concat_event(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    if let (Some(x), Some(y)) = (concat_piece(a), concat_piece(b)) {
        return Ok(LuaValue::from(x + &y));
    }
    let handler = binary_handler(a, b, "__concat");
    if handler.is_nil() {
        let culprit = if concat_piece(a).is_none() { a } else { b };
        return Err(LuaError::type_error(format!(
            "attempt to concatenate a {} value",
            culprit.type_name()
        )));
    }
    call_handler(&handler, "__concat", vec![a.clone(), b.clone()])
}

/// `__tostring` if present, otherwise the default rendering.
pub fn tostring_event(v: &LuaValue) -> Result<LuaValue, LuaError> {
    let handler = get_metamethod(v, "__tostring");
    if handler.is_nil() {
        return Ok(LuaValue::from(v.to_string()));
    }
    match call_handler(&handler, "__tostring", vec![v.clone()])? {
        s @ LuaValue::LuaString(_) => Ok(s),
        _ => Err(LuaError::type_error("'__tostring' must return a string")),
    }
}

/// Run the `__gc` finalizer of `v`, if it has a callable one.
///
/// Nothing in this crate decides when finalization happens; hosts call this
/// whenever their own resource management releases a value.
pub fn gc_event(v: &LuaValue) -> Result<(), LuaError> {
    if let LuaValue::Function(f) = get_metamethod(v, "__gc") {
        tracing::trace!(event = "__gc", "dispatching metamethod");
        f.call(LuaArgs::from(v.clone()))?;
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::LuaFunction;
    use crate::table::LuaTable;
    use crate::value::UserData;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn n(v: f64) -> LuaValue {
        LuaValue::Number(v)
    }

    fn s(v: &str) -> LuaValue {
        LuaValue::from(v)
    }

    fn func(f: impl Fn(LuaArgs) -> Result<LuaArgs, LuaError> + Send + Sync + 'static) -> LuaValue {
        LuaValue::Function(LuaFunction::new("test", f))
    }

    /// A table whose metatable holds the given `(event, handler)` pairs.
    fn with_meta(pairs: Vec<(&str, LuaValue)>) -> LuaValue {
        let t = LuaValue::new_table();
        let mt = LuaValue::new_table();
        for (k, v) in pairs {
            raw_set(&mt, s(k), v).unwrap();
        }
        if let (LuaValue::Table(t), LuaValue::Table(mt)) = (&t, &mt) {
            t.write().set_metatable(Some(mt.clone()));
        }
        t
    }

    fn constant(v: LuaValue) -> LuaValue {
        func(move |_| Ok(LuaArgs::from(v.clone())))
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    #[test]
    fn numeric_strings_coerce() {
        assert_eq!(arith_event(ArithOp::Add, &s("10"), &n(5.0)).unwrap(), n(15.0));
        assert_eq!(arith_event(ArithOp::Mul, &s(" 2.5 "), &s("2")).unwrap(), n(5.0));
    }

    #[test]
    fn modulo_follows_floor_division() {
        assert_eq!(arith_event(ArithOp::Mod, &n(-7.0), &n(3.0)).unwrap(), n(2.0));
        assert_eq!(arith_event(ArithOp::Mod, &n(7.0), &n(-3.0)).unwrap(), n(-2.0));
    }

    #[test]
    fn non_numeric_without_handler_is_arithmetic_error() {
        let err = arith_event(ArithOp::Add, &LuaValue::new_table(), &n(1.0)).unwrap_err();
        assert!(matches!(err, LuaError::Arithmetic(_)));
        assert!(matches!(arith_event(ArithOp::Sub, &s("abc"), &n(1.0)), Err(LuaError::Arithmetic(_))));
    }

    #[test]
    fn left_operand_handler_wins() {
        let t1 = with_meta(vec![("__add", constant(s("h1")))]);
        let t2 = with_meta(vec![("__add", constant(s("h2")))]);
        assert_eq!(arith_event(ArithOp::Add, &t1, &t2).unwrap(), s("h1"));
        assert_eq!(arith_event(ArithOp::Add, &t2, &t1).unwrap(), s("h2"));
    }

    #[test]
    fn right_operand_handler_used_when_left_has_none() {
        let t = with_meta(vec![("__sub", func(|args| Ok(LuaArgs::from(args.get(0)))))]);
        assert_eq!(arith_event(ArithOp::Sub, &n(4.0), &t).unwrap(), n(4.0));
    }

    #[test]
    fn unary_minus_uses_unm() {
        assert_eq!(unm_event(&s("3")).unwrap(), n(-3.0));
        let t = with_meta(vec![("__unm", constant(s("neg")))]);
        assert_eq!(unm_event(&t).unwrap(), s("neg"));
        assert!(unm_event(&LuaValue::Nil).is_err());
    }

    proptest! {
        #[test]
        fn add_commutes(a in -1e12f64..1e12, b in -1e12f64..1e12) {
            let ab = arith_event(ArithOp::Add, &n(a), &n(b)).unwrap();
            let ba = arith_event(ArithOp::Add, &n(b), &n(a)).unwrap();
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn sub_is_antisymmetric(a in -1e12f64..1e12, b in -1e12f64..1e12) {
            let ab = arith_event(ArithOp::Sub, &n(a), &n(b)).unwrap().as_number().unwrap();
            let ba = arith_event(ArithOp::Sub, &n(b), &n(a)).unwrap().as_number().unwrap();
            prop_assert!((ab + ba).abs() <= 1e-6);
        }

        #[test]
        fn numeric_text_coerces_like_numbers(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let text = s(&a.to_string());
            let via_text = arith_event(ArithOp::Add, &text, &n(b)).unwrap();
            prop_assert_eq!(via_text, n(a + b));
        }
    }

    // ── Indexing ──────────────────────────────────────────────────────────────

    #[test]
    fn absent_key_without_index_is_nil() {
        let t = LuaValue::new_table();
        assert_eq!(raw_get(&t, &s("k")).unwrap(), LuaValue::Nil);
        assert_eq!(index_event(&t, &s("k")).unwrap(), LuaValue::Nil);
    }

    #[test]
    fn index_table_delegates() {
        let fallback = LuaValue::from(LuaTable::from_sequence([n(42.0)]));
        let t = with_meta(vec![("__index", fallback)]);
        assert_eq!(index_event(&t, &n(1.0)).unwrap(), n(42.0));
        assert_eq!(raw_get(&t, &n(1.0)).unwrap(), LuaValue::Nil);
    }

    #[test]
    fn index_function_receives_table_and_key() {
        let t = with_meta(vec![(
            "__index",
            func(|args| Ok(LuaArgs::from(args.get(1)))),
        )]);
        assert_eq!(index_event(&t, &s("echo")).unwrap(), s("echo"));
    }

    #[test]
    fn raw_hit_wins_over_index() {
        let t = with_meta(vec![("__index", constant(s("meta")))]);
        raw_set(&t, s("k"), s("raw")).unwrap();
        assert_eq!(index_event(&t, &s("k")).unwrap(), s("raw"));
    }

    #[test]
    fn indexing_non_table_without_index_is_type_error() {
        assert!(matches!(index_event(&n(1.0), &s("x")), Err(LuaError::TypeError(_))));
        assert!(matches!(index_event(&LuaValue::Nil, &s("x")), Err(LuaError::TypeError(_))));
    }

    #[test]
    fn userdata_index_goes_through_metatable() {
        let ud = Arc::new(UserData::new(7u32));
        let mt = LuaValue::new_table();
        raw_set(&mt, s("__index"), func(|_| Ok(LuaArgs::from(LuaValue::Number(7.0))))).unwrap();
        ud.set_metatable(Some(mt.as_table().unwrap().clone()));
        let v = LuaValue::UserData(ud);
        assert_eq!(index_event(&v, &s("anything")).unwrap(), n(7.0));
    }

    #[test]
    fn self_referential_index_chain_is_bounded() {
        let t = LuaValue::new_table();
        let mt = t.as_table().unwrap().clone();
        raw_set(&t, s("__index"), t.clone()).unwrap();
        mt.write().set_metatable(Some(mt.clone()));
        // `t` has no "missing" key but delegates to itself forever.
        assert!(matches!(index_event(&t, &s("missing")), Err(LuaError::TypeError(_))));
        mt.write().set_metatable(None);
    }

    #[test]
    fn newindex_skips_handler_for_existing_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let t = with_meta(vec![(
            "__newindex",
            func(move |_| {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(LuaArgs::new())
            }),
        )]);
        raw_set(&t, s("x"), n(1.0)).unwrap();
        newindex_event(&t, s("x"), n(2.0)).unwrap();
        assert_eq!(raw_get(&t, &s("x")).unwrap(), n(2.0));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);

        newindex_event(&t, s("y"), n(3.0)).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(raw_get(&t, &s("y")).unwrap(), LuaValue::Nil);
    }

    #[test]
    fn newindex_table_receives_assignment() {
        let sink = LuaValue::new_table();
        let t = with_meta(vec![("__newindex", sink.clone())]);
        newindex_event(&t, s("a"), n(5.0)).unwrap();
        assert_eq!(raw_get(&sink, &s("a")).unwrap(), n(5.0));
        assert_eq!(raw_get(&t, &s("a")).unwrap(), LuaValue::Nil);
    }

    #[test]
    fn newindex_on_non_table_is_type_error() {
        assert!(matches!(
            newindex_event(&s("str"), s("k"), n(1.0)),
            Err(LuaError::TypeError(_))
        ));
    }

    // ── Call ──────────────────────────────────────────────────────────────────

    #[test]
    fn call_metamethod_receives_callee_first() {
        let t = with_meta(vec![("__call", func(|args| Ok(LuaArgs::from(LuaValue::from(args.len())))))]);
        let out = call_event(&t, LuaArgs::from(vec![n(1.0), n(2.0)])).unwrap();
        assert_eq!(out.first(), n(3.0));
    }

    #[test]
    fn calling_non_function_is_type_error() {
        let err = call_event(&LuaValue::Nil, LuaArgs::new()).unwrap_err();
        assert!(matches!(&err, LuaError::TypeError(m) if m.contains("cannot call non-function")));
    }

    // ── Comparison ────────────────────────────────────────────────────────────

    #[test]
    fn eq_without_handler_uses_identity() {
        let a = LuaValue::new_table();
        let b = LuaValue::new_table();
        assert!(eq_event(&a, &a).unwrap());
        assert!(!eq_event(&a, &b).unwrap());
        assert!(!eq_event(&n(1.0), &s("1")).unwrap());
    }

    #[test]
    fn eq_requires_shared_handler() {
        let handler = constant(LuaValue::Boolean(true));
        let a = with_meta(vec![("__eq", handler.clone())]);
        let b = with_meta(vec![("__eq", handler)]);
        assert!(eq_event(&a, &b).unwrap());

        let c = with_meta(vec![("__eq", constant(LuaValue::Boolean(true)))]);
        assert!(!eq_event(&a, &c).unwrap());
    }

    #[test]
    fn eq_never_mixes_table_and_userdata() {
        let handler = constant(LuaValue::Boolean(true));
        let t = with_meta(vec![("__eq", handler.clone())]);
        let mt = LuaValue::new_table();
        raw_set(&mt, s("__eq"), handler).unwrap();
        let ud = Arc::new(UserData::new(()));
        ud.set_metatable(Some(mt.as_table().unwrap().clone()));
        assert!(!eq_event(&t, &LuaValue::UserData(ud)).unwrap());
    }

    #[test]
    fn ordering_of_numbers_and_strings() {
        assert!(lt_event(&n(1.0), &n(2.0)).unwrap());
        assert!(!lt_event(&n(2.0), &n(2.0)).unwrap());
        assert!(le_event(&n(2.0), &n(2.0)).unwrap());
        assert!(lt_event(&s("a"), &s("b")).unwrap());
        assert!(le_event(&s("abc"), &s("abd")).unwrap());
    }

    #[test]
    fn mixed_ordering_is_comparison_error() {
        assert_eq!(
            lt_event(&n(1.0), &s("2")).unwrap_err(),
            LuaError::Comparison { lhs: "number", rhs: "string" }
        );
    }

    #[test]
    fn ordering_metamethods_coerce_to_boolean() {
        let t = with_meta(vec![("__lt", constant(n(0.0))), ("__le", constant(LuaValue::Boolean(false)))]);
        assert!(lt_event(&t, &n(1.0)).unwrap());
        assert!(!le_event(&n(1.0), &t).unwrap());
    }

    // ── Length / concat / tostring / gc ───────────────────────────────────────

    #[test]
    fn length_of_strings_counts_characters() {
        assert_eq!(len_event(&s("héllo")).unwrap(), n(5.0));
    }

    #[test]
    fn length_of_table_is_entry_count_unless_overridden() {
        let t = LuaValue::from(LuaTable::from_sequence([n(1.0), n(2.0)]));
        raw_set(&t, s("k"), n(3.0)).unwrap();
        assert_eq!(len_event(&t).unwrap(), n(3.0));

        let custom = with_meta(vec![("__len", constant(n(99.0)))]);
        assert_eq!(len_event(&custom).unwrap(), n(99.0));
        assert!(len_event(&LuaValue::Boolean(true)).is_err());
    }

    #[test]
    fn concat_formats_numbers() {
        assert_eq!(concat_event(&s("n="), &n(3.0)).unwrap(), s("n=3"));
        assert_eq!(concat_event(&n(1.5), &n(2.0)).unwrap(), s("1.52"));
    }

    #[test]
    fn concat_falls_back_to_metamethod() {
        let t = with_meta(vec![("__concat", constant(s("joined")))]);
        assert_eq!(concat_event(&s("x"), &t).unwrap(), s("joined"));
        assert!(matches!(
            concat_event(&s("x"), &LuaValue::Nil),
            Err(LuaError::TypeError(_))
        ));
    }

    #[test]
    fn tostring_prefers_metamethod() {
        let t = with_meta(vec![("__tostring", constant(s("obj")))]);
        assert_eq!(tostring_event(&t).unwrap(), s("obj"));
        assert_eq!(tostring_event(&n(2.0)).unwrap(), s("2"));
    }

    #[test]
    fn tostring_handler_must_return_a_string() {
        let t = with_meta(vec![("__tostring", constant(n(5.0)))]);
        assert_eq!(
            tostring_event(&t),
            Err(LuaError::TypeError("'__tostring' must return a string".into()))
        );
    }

    #[test]
    fn gc_runs_callable_finalizer_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let t = with_meta(vec![(
            "__gc",
            func(move |_| {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(LuaArgs::new())
            }),
        )]);
        gc_event(&t).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);

        let not_callable = with_meta(vec![("__gc", n(1.0))]);
        gc_event(&not_callable).unwrap();
        gc_event(&LuaValue::Nil).unwrap();
    }

    #[test]
    fn parse_number_rejects_words() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("-1.5e2"), Some(-150.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("nan"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }
}
