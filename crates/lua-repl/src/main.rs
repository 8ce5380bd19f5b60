use rustyline::{error::ReadlineError, DefaultEditor};

use lua_core::events::tostring_event;
use lua_core::{LuaArgs, LuaError};
use lua_runtime::Lua;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Silent unless RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

/// A parse error that only means "keep typing".
fn is_incomplete(err: &LuaError) -> bool {
    matches!(err, LuaError::Parse { message, .. } if message.contains("<eof>"))
}

/// Render results the way `print` would: tostring'd and tab-separated.
fn render(values: &LuaArgs) -> Result<String, LuaError> {
    let parts = values
        .iter()
        .map(|v| tostring_event(v).map(|s| s.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("\t"))
}

fn report(values: LuaArgs) {
    if values.is_empty() {
        return;
    }
    match render(&values) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("error: {e}"),
    }
}

// ── Script runner ─────────────────────────────────────────────────────────────

fn run_file(path: &str) -> i32 {
    tracing::debug!(path, "running script");
    let lua = Lua::new();
    match lua.run_file(path) {
        Ok(values) => {
            report(values);
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

// ── Interactive REPL ──────────────────────────────────────────────────────────

fn repl() -> i32 {
    println!("lua {}  (type 'exit' or Ctrl-D to quit)", env!("CARGO_PKG_VERSION"));

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("error: cannot start line editor: {e}");
            return 1;
        }
    };
    let lua = Lua::new();
    let mut buf = String::new();

    loop {
        let prompt = if buf.is_empty() { "> " } else { ">> " };

        match rl.readline(prompt) {
            Ok(line) => {
                if buf.is_empty() {
                    if line.trim() == "exit" {
                        break;
                    }
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                } else {
                    buf.push('\n');
                }
                buf.push_str(&line);

                // An expression first, so `1 + 2` echoes its value; then the
                // buffer as a statement list. Each REPL line is its own chunk,
                // so a leading `local` is dropped to keep the binding around.
                let chunk = lua
                    .load(&format!("return {buf}"), "=stdin")
                    .or_else(|_| lua.load(&hoist_local(&buf), "=stdin"));

                match chunk {
                    Ok(chunk) => {
                        buf.clear();
                        match chunk.call(LuaArgs::new()) {
                            Ok(values) => report(values),
                            Err(e) => eprintln!("error: {e}"),
                        }
                    }
                    Err(e) if is_incomplete(&e) => {
                        tracing::trace!(pending = buf.len(), "awaiting more input");
                        continue;
                    }
                    Err(e) => {
                        eprintln!("{e}");
                        buf.clear();
                    }
                }
            }

            // Ctrl-D
            Err(ReadlineError::Eof) => {
                if !buf.is_empty() {
                    eprintln!("<incomplete input>");
                }
                println!();
                break;
            }

            // Ctrl-C drops the pending buffer
            Err(ReadlineError::Interrupted) => buf.clear(),

            Err(e) => {
                eprintln!("read error: {e}");
                return 1;
            }
        }
    }
    0
}

/// `local x = 1` → `x = 1`, `local function f` → `function f`.
fn hoist_local(src: &str) -> String {
    let s = src.trim_start();
    match s.strip_prefix("local") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start().to_string(),
        _ => src.to_string(),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    let code = match args.as_slice() {
        [_] => repl(),
        [_, path] => run_file(path),
        _ => {
            eprintln!("usage: lua [script.lua]");
            2
        }
    };
    std::process::exit(code);
}
