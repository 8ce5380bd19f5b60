use crate::error::LuaError;
use crate::function::LuaFunction;
use crate::table::{LuaTable, TableRef};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// All Lua value types. Exactly one tag is active at a time.
#[derive(Clone, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    /// Immutable, cheaply shared string.
    LuaString(Arc<str>),
    /// A script-compiled or host-provided function.
    Function(LuaFunction),
    /// A table (ordered map + optional metatable, shared and interior-mutable).
    Table(TableRef),
    /// Opaque host handle.
    UserData(Arc<UserData>),
    /// Placeholder coroutine handle; never scheduled.
    Thread(Arc<ThreadHandle>),
}

// ── Userdata & thread handles ─────────────────────────────────────────────────

/// A host value exposed to scripts as `userdata`.
///
/// Scripts cannot look inside it; they can only pass it around and trigger
/// the metamethods of its metatable, which the host sets with
/// [`UserData::set_metatable`].
pub struct UserData {
    value: Box<dyn Any + Send + Sync>,
    metatable: RwLock<Option<TableRef>>,
}

impl UserData {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            metatable: RwLock::new(None),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.read().clone()
    }

    pub fn set_metatable(&self, mt: Option<TableRef>) {
        *self.metatable.write() = mt;
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token for the `thread` tag.
#[derive(Debug)]
pub struct ThreadHandle {
    id: u64,
}

impl ThreadHandle {
    pub fn new() -> Self {
        Self {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for ThreadHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ── Predicates, accessors, truthiness ─────────────────────────────────────────

impl LuaValue {
    /// Returns the Lua type name string as per the reference manual.
    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Boolean(_) => "boolean",
            LuaValue::Number(_) => "number",
            LuaValue::LuaString(_) => "string",
            LuaValue::Function(_) => "function",
            LuaValue::Table(_) => "table",
            LuaValue::UserData(_) => "userdata",
            LuaValue::Thread(_) => "thread",
        }
    }

    /// Returns `true` if the value is truthy in Lua's sense
    /// (everything except `nil` and `false` is truthy).
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, LuaValue::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, LuaValue::LuaString(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::Table(_))
    }

    pub fn is_userdata(&self) -> bool {
        matches!(self, LuaValue::UserData(_))
    }

    pub fn is_thread(&self) -> bool {
        matches!(self, LuaValue::Thread(_))
    }

    pub fn as_number(&self) -> Result<f64, LuaError> {
        match self {
            LuaValue::Number(n) => Ok(*n),
            v => Err(mismatch("number", v)),
        }
    }

    pub fn as_str(&self) -> Result<&str, LuaError> {
        match self {
            LuaValue::LuaString(s) => Ok(s),
            v => Err(mismatch("string", v)),
        }
    }

    pub fn as_table(&self) -> Result<&TableRef, LuaError> {
        match self {
            LuaValue::Table(t) => Ok(t),
            v => Err(mismatch("table", v)),
        }
    }

    pub fn as_function(&self) -> Result<&LuaFunction, LuaError> {
        match self {
            LuaValue::Function(f) => Ok(f),
            v => Err(mismatch("function", v)),
        }
    }

    pub fn as_userdata(&self) -> Result<&Arc<UserData>, LuaError> {
        match self {
            LuaValue::UserData(u) => Ok(u),
            v => Err(mismatch("userdata", v)),
        }
    }

    /// Create a new empty table value.
    pub fn new_table() -> Self {
        LuaValue::Table(Arc::new(RwLock::new(LuaTable::new())))
    }

    /// Raw metatable of a table or userdata; every other tag has none.
    pub fn metatable(&self) -> Option<TableRef> {
        match self {
            LuaValue::Table(t) => t.read().metatable(),
            LuaValue::UserData(u) => u.metatable(),
            _ => None,
        }
    }

    /// Address used for identity display and hashing of reference types.
    pub(crate) fn identity(&self) -> usize {
        match self {
            LuaValue::Function(f) => f.addr(),
            LuaValue::Table(t) => Arc::as_ptr(t) as *const () as usize,
            LuaValue::UserData(u) => Arc::as_ptr(u) as *const () as usize,
            LuaValue::Thread(t) => Arc::as_ptr(t) as *const () as usize,
            _ => 0,
        }
    }
}

fn mismatch(expected: &str, got: &LuaValue) -> LuaError {
    LuaError::TypeError(format!("expected {expected}, got {}", got.type_name()))
}

/// Shortest round-trip decimal rendering of a number.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let abs = n.abs();
    if abs != 0.0 && !(1e-5..1e16).contains(&abs) {
        format!("{n:e}")
    } else {
        format!("{n}")
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Number(n)
    }
}

impl From<i32> for LuaValue {
    fn from(n: i32) -> Self {
        LuaValue::Number(f64::from(n))
    }
}

impl From<usize> for LuaValue {
    fn from(n: usize) -> Self {
        LuaValue::Number(n as f64)
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<&str> for LuaValue {
    fn from(s: &str) -> Self {
        LuaValue::LuaString(Arc::from(s))
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::LuaString(Arc::from(s))
    }
}

impl From<LuaFunction> for LuaValue {
    fn from(f: LuaFunction) -> Self {
        LuaValue::Function(f)
    }
}

impl From<TableRef> for LuaValue {
    fn from(t: TableRef) -> Self {
        LuaValue::Table(t)
    }
}

impl From<LuaTable> for LuaValue {
    fn from(t: LuaTable) -> Self {
        LuaValue::Table(Arc::new(RwLock::new(t)))
    }
}

// ── Equality & formatting ─────────────────────────────────────────────────────

/// Raw equality: structural for nil/boolean/number/string, identity for
/// everything else. Numbers and strings never compare equal to each other.
impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::LuaString(a), LuaValue::LuaString(b)) => a == b,
            (LuaValue::Function(a), LuaValue::Function(b)) => a.ptr_eq(b),
            (LuaValue::Table(a), LuaValue::Table(b)) => Arc::ptr_eq(a, b),
            (LuaValue::UserData(a), LuaValue::UserData(b)) => Arc::ptr_eq(a, b),
            (LuaValue::Thread(a), LuaValue::Thread(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "LuaValue::Nil"),
            LuaValue::Boolean(b) => write!(f, "LuaValue::Boolean({b})"),
            LuaValue::Number(n) => write!(f, "LuaValue::Number({n})"),
            LuaValue::LuaString(s) => write!(f, "LuaValue::LuaString({s:?})"),
            LuaValue::Function(func) => write!(f, "LuaValue::Function({func:?})"),
            LuaValue::Table(t) => write!(f, "LuaValue::Table({:p})", Arc::as_ptr(t)),
            LuaValue::UserData(u) => write!(f, "LuaValue::UserData({:p})", Arc::as_ptr(u)),
            LuaValue::Thread(t) => write!(f, "LuaValue::Thread({})", t.id()),
        }
    }
}

/// Default `tostring` rendering (no `__tostring` lookup).
impl std::fmt::Display for LuaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{b}"),
            LuaValue::Number(n) => write!(f, "{}", format_number(*n)),
            LuaValue::LuaString(s) => write!(f, "{s}"),
            other => write!(f, "{}: {:#x}", other.type_name(), other.identity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_falsy() {
        assert!(!LuaValue::Nil.is_truthy());
    }

    #[test]
    fn false_is_falsy() {
        assert!(!LuaValue::Boolean(false).is_truthy());
    }

    #[test]
    fn zero_is_truthy() {
        // In Lua, 0 is truthy!
        assert!(LuaValue::Number(0.0).is_truthy());
        assert!(LuaValue::from("").is_truthy());
    }

    #[test]
    fn type_names() {
        assert_eq!(LuaValue::Nil.type_name(), "nil");
        assert_eq!(LuaValue::Boolean(true).type_name(), "boolean");
        assert_eq!(LuaValue::Number(1.5).type_name(), "number");
        assert_eq!(LuaValue::from("hi").type_name(), "string");
        assert_eq!(LuaValue::new_table().type_name(), "table");
        assert_eq!(
            LuaValue::UserData(Arc::new(UserData::new(3u8))).type_name(),
            "userdata"
        );
        assert_eq!(
            LuaValue::Thread(Arc::new(ThreadHandle::new())).type_name(),
            "thread"
        );
    }

    #[test]
    fn table_reference_equality() {
        let t1 = LuaValue::new_table();
        let t2 = LuaValue::new_table();
        assert_eq!(t1, t1.clone()); // same Arc → equal
        assert_ne!(t1, t2); // different Arcs → not equal
    }

    #[test]
    fn number_and_string_never_equal() {
        assert_ne!(LuaValue::Number(1.0), LuaValue::from("1"));
    }

    #[test]
    fn narrowing_mismatch_is_type_error() {
        let err = LuaValue::Nil.as_table().unwrap_err();
        assert_eq!(err, LuaError::TypeError("expected table, got nil".into()));
        assert_eq!(LuaValue::Number(2.0).as_number(), Ok(2.0));
    }

    #[test]
    fn numbers_render_shortest() {
        assert_eq!(LuaValue::Number(3.0).to_string(), "3");
        assert_eq!(LuaValue::Number(0.1).to_string(), "0.1");
        assert_eq!(LuaValue::Number(-2.5).to_string(), "-2.5");
        assert_eq!(LuaValue::Number(1e300).to_string(), "1e300");
        assert_eq!(LuaValue::Number(f64::INFINITY).to_string(), "inf");
    }

    #[test]
    fn reference_types_render_tag_and_address() {
        let t = LuaValue::new_table();
        assert!(t.to_string().starts_with("table: 0x"));
    }

    #[test]
    fn userdata_downcasts_to_payload() {
        let u = UserData::new(String::from("handle"));
        assert_eq!(u.downcast_ref::<String>().map(String::as_str), Some("handle"));
        assert!(u.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn userdata_value_narrows_to_handle() {
        let v = LuaValue::UserData(Arc::new(UserData::new(7u32)));
        let u = v.as_userdata().unwrap();
        assert_eq!(u.downcast_ref::<u32>(), Some(&7));
        assert!(LuaValue::new_table().as_userdata().is_err());
    }
}
