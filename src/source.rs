//! Prints a context window of source lines around a target line.
//! The only component that touches source files.

use std::fs;

/// Print lines `[max(1, target-n), target+n]` of `path`, right-aligning
/// line numbers to width 3 and marking `target` with `->` (others with two
/// spaces). Missing files produce no output — callers are not expected to
/// treat that as an error.
pub fn print_window(path: &str, target: usize, n: usize) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    let start = target.saturating_sub(n).max(1);
    let end = target + n;

    for (i, text) in contents.lines().enumerate() {
        let line_no = i + 1;
        if line_no < start {
            continue;
        }
        if line_no > end {
            break;
        }
        let marker = if line_no == target { "->" } else { "  " };
        println!("{} {:>3} {}", marker, line_no, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut path = std::env::temp_dir();
        path.push(format!("bdb-source-printer-test-{}-{}", std::process::id(), id));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn window_clamps_at_file_start() {
        let contents = "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n";
        let path = write_temp(contents);
        // target=2, n=4 => clamp start to 1, end=6
        print_window(path.to_str().unwrap(), 2, 4);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_silent() {
        // Must not panic.
        print_window("/nonexistent/path/does-not-exist.c", 7, 4);
    }

    #[test]
    fn start_and_end_bounds_are_computed_correctly() {
        let target: usize = 7;
        let n: usize = 4;
        let start = target.saturating_sub(n).max(1);
        let end = target + n;
        assert_eq!(start, 3);
        assert_eq!(end, 11);

        // Clamped case: target near the top of the file.
        let target = 2usize;
        let start = target.saturating_sub(n).max(1);
        assert_eq!(start, 1);
    }
}
