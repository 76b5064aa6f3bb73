//! User-facing console lines (not logs).
//! Used for `--print-config`, template creation notices, fatal startup errors
//! and the final run summary. Colors only when stdout is a TTY.

use owo_colors::OwoColorize;

#[derive(Clone, Copy)]
enum Tone {
    Info,
    Warn,
    Error,
    Success,
}

fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

fn emit(tone: Tone, msg: &str) {
    let label = match tone {
        Tone::Info => "info:",
        Tone::Warn => "warn:",
        Tone::Error => "error:",
        Tone::Success => "ok:",
    };
    let colored = is_tty();
    let prefix = match (tone, colored) {
        (_, false) => label.to_string(),
        (Tone::Info, true) => label.cyan().bold().to_string(),
        (Tone::Warn, true) => label.yellow().bold().to_string(),
        (Tone::Error, true) => label.red().bold().to_string(),
        (Tone::Success, true) => label.green().bold().to_string(),
    };
    match tone {
        Tone::Warn | Tone::Error => eprintln!("{prefix} {msg}"),
        Tone::Info | Tone::Success => println!("{prefix} {msg}"),
    }
}

pub fn print_info(msg: &str) {
    emit(Tone::Info, msg);
}

pub fn print_warn(msg: &str) {
    emit(Tone::Warn, msg);
}

pub fn print_error(msg: &str) {
    emit(Tone::Error, msg);
}

pub fn print_success(msg: &str) {
    emit(Tone::Success, msg);
}

/// One-line run summary printed when the mover exits (scriptable, no prefix).
pub fn print_summary(moved: u64, failed: u64) {
    println!("moved {moved} file(s), {failed} failed");
}
