use std::fmt::Display;

#[cfg(feature = "emoji")]
pub mod status {
    pub const FAIL: &'static str = "💩";
    pub const OK: &'static str = "🚀";
    pub const MEH: &'static str = "😒";
}

#[cfg(not(feature = "emoji"))]
pub mod status {
    pub const FAIL: &'static str = "Fail";
    pub const OK: &'static str = "Ok";
    pub const MEH: &'static str = "Meh";
}

#[cfg(feature = "unicode")]
static LINE_CHARACTER: &'static str = "⎯";

#[cfg(not(feature = "unicode"))]
static LINE_CHARACTER: &'static str = "=";

pub fn separator(width: usize) -> String {
    LINE_CHARACTER.repeat(width)
}

/// Print a titled, numbered list of remediation steps to stderr
pub fn print_remediation<T: Display>(title: T, steps: &[String]) {
    if steps.is_empty() {
        return;
    }
    eprintln!("{}", title);
    for s in steps {
        eprintln!("    {}", s);
    }
}

/// Pretty JSON to stdout
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
