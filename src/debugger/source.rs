use std::fs;

/// Renders the lines around `line` in `file`, marking `line` itself.
///
/// The window is clamped to the file. A file that cannot be read yields a
/// single message line instead of an error; a missing listing never stops
/// the session.
pub fn render(file: &str, line: u32, radius: usize) -> Vec<String> {
    let text = match fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => return vec![format!("cannot read source '{file}': {e}")],
    };
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return vec![format!("source '{file}' is empty")];
    }

    let target = line as usize;
    let first = target.saturating_sub(radius).max(1);
    let last = target.saturating_add(radius).min(lines.len());
    if first > last {
        return vec![format!(
            "line {line} is past the end of '{file}' ({} lines)",
            lines.len()
        )];
    }

    let width = last.to_string().len();
    (first..=last)
        .map(|n| {
            let marker = if n == target { "=>" } else { "  " };
            format!("{marker} {n:>width$}  {}", lines[n - 1])
        })
        .collect()
}
