//! The base library: the global functions every context starts with.

use crate::lua::{run_file_in, LuaConfig};
use lua_core::events;
use lua_core::{LuaArgs, LuaError, LuaFunction, LuaValue, Scope};
use std::path::Path;

/// Install the base library into `globals`.
pub fn register(globals: &Scope, config: &LuaConfig) {
    let next = LuaFunction::new("next", lua_next);
    let ipairs_iter = LuaFunction::new("ipairs_iterator", lua_ipairs_iter);

    let natives: [(&str, LuaFunction); 13] = [
        ("assert", LuaFunction::new("assert", lua_assert)),
        ("error", LuaFunction::new("error", lua_error)),
        ("rawget", LuaFunction::new("rawget", lua_rawget)),
        ("rawset", LuaFunction::new("rawset", lua_rawset)),
        ("rawlen", LuaFunction::new("rawlen", lua_rawlen)),
        ("rawequal", LuaFunction::new("rawequal", lua_rawequal)),
        ("tonumber", LuaFunction::new("tonumber", lua_tonumber)),
        ("tostring", LuaFunction::new("tostring", lua_tostring)),
        ("type", LuaFunction::new("type", lua_type)),
        ("getmetatable", LuaFunction::new("getmetatable", lua_getmetatable)),
        ("setmetatable", LuaFunction::new("setmetatable", lua_setmetatable)),
        ("pairs", {
            let next = next.clone();
            LuaFunction::new("pairs", move |args| lua_pairs(&next, args))
        }),
        ("ipairs", LuaFunction::new("ipairs", move |args| lua_ipairs(&ipairs_iter, args))),
    ];
    for (name, func) in natives {
        globals.declare(name, LuaValue::Function(func));
    }
    globals.declare("next", LuaValue::Function(next));

    // `dofile` runs in the same context, so it captures the global scope. The
    // resulting cycle is released when the owning `Lua` clears its globals.
    let dofile = {
        let globals = globals.clone();
        let config = config.clone();
        LuaFunction::new("dofile", move |args: LuaArgs| {
            let path = check_string(&args, 1, "dofile")?;
            run_file_in(&globals, &config, Path::new(&path))
        })
    };
    globals.declare("dofile", LuaValue::Function(dofile));
}

// ── Argument helpers ─────────────────────────────────────────────────────────

fn check_table(args: &LuaArgs, pos: usize, fname: &str) -> Result<LuaValue, LuaError> {
    let v = args.get(pos - 1);
    if v.is_table() {
        Ok(v)
    } else {
        Err(LuaError::bad_argument(pos, fname, "table", &v))
    }
}

fn check_string(args: &LuaArgs, pos: usize, fname: &str) -> Result<String, LuaError> {
    match args.get(pos - 1) {
        LuaValue::LuaString(s) => Ok(s.to_string()),
        other => Err(LuaError::bad_argument(pos, fname, "string", &other)),
    }
}

fn ret(v: impl Into<LuaValue>) -> Result<LuaArgs, LuaError> {
    Ok(LuaArgs::from(v.into()))
}

// ── Functions ────────────────────────────────────────────────────────────────

/// Returns all of its arguments when the first is truthy.
fn lua_assert(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    if args.first().is_truthy() {
        return Ok(args);
    }
    let message = match args.get(1) {
        LuaValue::Nil => "Assertion failed".to_string(),
        msg => msg.to_string(),
    };
    Err(LuaError::Assertion(message))
}

fn lua_error(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    Err(LuaError::User(args.into_first()))
}

fn lua_rawget(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let t = check_table(&args, 1, "rawget")?;
    ret(events::raw_get(&t, &args.get(1))?)
}

fn lua_rawset(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let t = check_table(&args, 1, "rawset")?;
    events::raw_set(&t, args.get(1), args.get(2))?;
    ret(t)
}

fn lua_rawlen(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    ret(events::raw_len(&args.first())?)
}

fn lua_rawequal(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    ret(events::raw_equal(&args.get(0), &args.get(1)))
}

/// Only base 10 is supported.
fn lua_tonumber(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    match args.get(1) {
        LuaValue::Nil => {}
        LuaValue::Number(base) if base == 10.0 => {}
        other => {
            return Err(LuaError::Unsupported(format!(
                "tonumber with base {other}"
            )))
        }
    }
    ret(match events::to_number(&args.first()) {
        Some(n) => LuaValue::Number(n),
        None => LuaValue::Nil,
    })
}

fn lua_tostring(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    ret(events::tostring_event(&args.first())?)
}

fn lua_type(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    if args.is_empty() {
        return Err(LuaError::type_error("bad argument #1 to 'type' (value expected)"));
    }
    ret(args.first().type_name())
}

/// Insertion-order successor of the key; nothing after the last key.
fn lua_next(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let t = check_table(&args, 1, "next")?;
    let entry = t.as_table()?.read().next(&args.get(1))?;
    Ok(match entry {
        Some((k, v)) => LuaArgs::from(vec![k, v]),
        None => LuaArgs::new(),
    })
}

fn lua_pairs(next: &LuaFunction, args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let handler = events::get_metamethod(&args.first(), "__pairs");
    if !handler.is_nil() {
        return events::call_event(&handler, args);
    }
    let t = check_table(&args, 1, "pairs")?;
    Ok(LuaArgs::from(vec![
        LuaValue::Function(next.clone()),
        t,
        LuaValue::Nil,
    ]))
}

fn lua_ipairs(iter: &LuaFunction, args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let handler = events::get_metamethod(&args.first(), "__ipairs");
    if !handler.is_nil() {
        return events::call_event(&handler, args);
    }
    let t = check_table(&args, 1, "ipairs")?;
    Ok(LuaArgs::from(vec![
        LuaValue::Function(iter.clone()),
        t,
        LuaValue::Number(0.0),
    ]))
}

/// `(t, i) -> i + 1, t[i + 1]` with raw indexing; stops at the first nil.
fn lua_ipairs_iter(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let t = check_table(&args, 1, "ipairs")?;
    let i = args.get(1).as_number()? + 1.0;
    let v = events::raw_get(&t, &LuaValue::Number(i))?;
    Ok(if v.is_nil() {
        LuaArgs::new()
    } else {
        LuaArgs::from(vec![LuaValue::Number(i), v])
    })
}

fn lua_getmetatable(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    ret(match args.first().metatable() {
        Some(mt) => LuaValue::Table(mt),
        None => LuaValue::Nil,
    })
}

fn lua_setmetatable(args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let t = check_table(&args, 1, "setmetatable")?;
    let mt = match args.get(1) {
        LuaValue::Nil => None,
        LuaValue::Table(mt) => Some(mt),
        other => return Err(LuaError::bad_argument(2, "setmetatable", "nil or table", &other)),
    };
    t.as_table()?.write().set_metatable(mt);
    ret(t)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::Lua;
    use lua_core::{LuaError, LuaValue};
    use pretty_assertions::assert_eq;

    fn run(src: &str) -> Result<Vec<LuaValue>, LuaError> {
        Ok(Lua::new().run_string(src)?.into_vec())
    }

    fn eval(src: &str) -> Vec<LuaValue> {
        run(src).unwrap()
    }

    fn n(v: f64) -> LuaValue {
        LuaValue::Number(v)
    }

    fn s(v: &str) -> LuaValue {
        LuaValue::from(v)
    }

    #[test]
    fn assert_returns_its_arguments() {
        assert_eq!(eval("return assert(1, 'msg', 3)"), vec![n(1.0), s("msg"), n(3.0)]);
    }

    #[test]
    fn assert_failure_messages() {
        assert_eq!(run("assert(false)"), Err(LuaError::Assertion("Assertion failed".into())));
        assert_eq!(run("assert(nil, 'boom')"), Err(LuaError::Assertion("boom".into())));
    }

    #[test]
    fn error_carries_payload_unchanged() {
        assert_eq!(run("error('x')"), Err(LuaError::User(s("x"))));
        let Err(LuaError::User(payload)) = run("error({code = 42})") else {
            panic!("expected user error");
        };
        let code = payload.as_table().unwrap().read().get_str("code");
        assert_eq!(code, n(42.0));
    }

    #[test]
    fn raw_access_bypasses_metamethods() {
        let src = "
            local log = {}
            local t = setmetatable({}, {
                __index = function() return 'meta' end,
                __newindex = function(t, k, v) log[k] = v end,
            })
            rawset(t, 'a', 1)
            t.b = 2
            return rawget(t, 'a'), rawget(t, 'b'), t.zzz, log.b";
        assert_eq!(eval(src), vec![n(1.0), LuaValue::Nil, s("meta"), n(2.0)]);
    }

    #[test]
    fn rawlen_and_rawequal() {
        assert_eq!(eval("return rawlen({1, 2, 3}), rawlen('héllo')"), vec![n(3.0), n(5.0)]);
        assert!(matches!(run("return rawlen(1)"), Err(LuaError::TypeError(_))));
        assert_eq!(
            eval("local t = {} return rawequal(t, t), rawequal(t, {}), rawequal(1, '1')"),
            vec![LuaValue::Boolean(true), LuaValue::Boolean(false), LuaValue::Boolean(false)]
        );
    }

    #[test]
    fn tonumber_conversions() {
        assert_eq!(
            eval("return tonumber('10'), tonumber(' 2.5 '), tonumber('abc'), tonumber({}), tonumber(5)"),
            vec![n(10.0), n(2.5), LuaValue::Nil, LuaValue::Nil, n(5.0)]
        );
        assert_eq!(eval("return tonumber('10', 10)"), vec![n(10.0)]);
        assert!(matches!(run("return tonumber('ff', 16)"), Err(LuaError::Unsupported(_))));
    }

    #[test]
    fn tostring_and_type() {
        assert_eq!(
            eval("return tostring(12), tostring(nil), tostring(setmetatable({}, {__tostring = function() return 'obj' end}))"),
            vec![s("12"), s("nil"), s("obj")]
        );
        assert_eq!(
            eval("return type(nil), type(true), type(1), type('s'), type({}), type(print or type)"),
            vec![s("nil"), s("boolean"), s("number"), s("string"), s("table"), s("function")]
        );
        assert!(matches!(run("return type()"), Err(LuaError::TypeError(_))));
    }

    #[test]
    fn next_follows_insertion_order() {
        let src = "
            local t = {}
            t.z = 1 t.a = 2 t[10] = 3
            local k1 = next(t)
            local k2 = next(t, k1)
            local k3 = next(t, k2)
            return k1, k2, k3, next(t, k3)";
        assert_eq!(eval(src), vec![s("z"), s("a"), n(10.0)]);
    }

    #[test]
    fn next_edge_cases() {
        assert_eq!(eval("return next({})"), Vec::<LuaValue>::new());
        assert!(matches!(run("return next({}, 'missing')"), Err(LuaError::TypeError(_))));
        assert!(matches!(run("return next(1)"), Err(LuaError::TypeError(_))));
    }

    #[test]
    fn pairs_visits_every_entry_in_order() {
        let src = "
            local t = {} t.z = 1 t.a = 2 t[10] = 3
            local out = ''
            for k, v in pairs(t) do out = out .. k .. '=' .. v .. ';' end
            return out";
        assert_eq!(eval(src), vec![s("z=1;a=2;10=3;")]);
    }

    #[test]
    fn pairs_allows_clearing_visited_fields() {
        let src = "
            local t = {a = 1, b = 2, c = 3}
            local n = 0
            for k in pairs(t) do t[k] = nil n = n + 1 end
            return n, next(t)";
        assert_eq!(eval(src), vec![n(3.0)]);
    }

    #[test]
    fn pairs_and_ipairs_honour_overrides() {
        let src = "
            local t = setmetatable({}, {
                __pairs = function(t) return function(_, k) if not k then return 1, 'p' end end, t, nil end,
                __ipairs = function(t) return function(_, i) if i < 2 then return i + 1, 'i' end end, t, 0 end,
            })
            local p, i = '', ''
            for _, v in pairs(t) do p = p .. v end
            for _, v in ipairs(t) do i = i .. v end
            return p, i";
        assert_eq!(eval(src), vec![s("p"), s("ii")]);
    }

    #[test]
    fn ipairs_stops_at_first_nil_and_ignores_index() {
        let src = "
            local t = setmetatable({1, 2, nil, 4}, {__index = function() return 99 end})
            local sum = 0
            for i, v in ipairs(t) do sum = sum + v end
            return sum";
        assert_eq!(eval(src), vec![n(3.0)]);
    }

    #[test]
    fn metatable_accessors() {
        let src = "
            local mt = {}
            local t = {}
            local same = setmetatable(t, mt) == t
            return same, getmetatable(t) == mt, getmetatable(1), getmetatable(setmetatable(t, nil))";
        assert_eq!(
            eval(src),
            vec![LuaValue::Boolean(true), LuaValue::Boolean(true), LuaValue::Nil, LuaValue::Nil]
        );
        assert!(matches!(run("setmetatable({}, 5)"), Err(LuaError::TypeError(_))));
        assert!(matches!(run("setmetatable(1, {})"), Err(LuaError::TypeError(_))));
    }

    #[test]
    fn dofile_runs_in_the_same_context() {
        let path = std::env::temp_dir().join(format!("lua-runtime-dofile-{}.lua", std::process::id()));
        std::fs::write(&path, "shared = (shared or 0) + 1 return shared, ...").unwrap();
        let lua = Lua::new();
        lua.set_global("path", path.display().to_string());
        let out = lua.run_string("dofile(path) return dofile(path)").unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(out.into_vec(), vec![n(2.0)]);
        assert_eq!(lua.get_global("shared"), n(2.0));
    }

    #[test]
    fn dofile_missing_file_is_io_error() {
        assert!(matches!(
            run("dofile('/definitely/not/here.lua')"),
            Err(LuaError::Io { .. })
        ));
        assert!(matches!(run("dofile(1)"), Err(LuaError::TypeError(_))));
    }
}
