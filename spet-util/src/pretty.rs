// Copyright (c) Facebook, Inc. and its affiliates.
//
// Human readable formatting used by the report tables.
use log::error;

const BYTE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
const BPS_UNITS: [&str; 6] = ["B/s", "KB/s", "MB/s", "GB/s", "TB/s", "PB/s"];
const TIME_UNITS: [&str; 3] = ["s", "min", "h"];
const SMALL_TIME_UNITS: [&str; 2] = ["us", "ms"];
const FLOPS_UNITS: [&str; 6] = ["FLOPS", "KFLOPS", "MFLOPS", "GFLOPS", "TFLOPS", "PFLOPS"];

fn trim_number(val: f64) -> String {
    let formatted = format!("{:.2}", val);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Scale `val`, given in `unit`, up through `units` by `step` until it
/// drops below `step` or the largest unit is reached.
fn scale(val: f64, unit: &str, units: &[&str], step: f64) -> String {
    let start = units.iter().position(|u| *u == unit).unwrap_or(0);
    let mut val = val * step.powi(start as i32);
    let mut idx = 0;
    while val >= step && idx < units.len() - 1 {
        val /= step;
        idx += 1;
    }
    format!("{} {}", trim_number(val), units[idx])
        .trim_end()
        .to_string()
}

pub fn pretty_byte_size(val: f64, unit: &str) -> String {
    scale(val, unit, &BYTE_UNITS, 1024.0)
}

pub fn pretty_byte_per_sec(val: f64, unit: &str) -> String {
    scale(val, unit, &BPS_UNITS, 1024.0)
}

pub fn pretty_time_elapsed(val: f64, unit: &str) -> String {
    scale(val, unit, &TIME_UNITS, 60.0)
}

pub fn pretty_small_time(val: f64, unit: &str) -> String {
    scale(val, unit, &SMALL_TIME_UNITS, 1000.0)
}

pub fn pretty_flops(val: f64, unit: &str) -> String {
    scale(val, unit, &FLOPS_UNITS, 1000.0)
}

/// Turn free text such as a processor name into something usable as a
/// file name.
pub fn uglify_filename(text: &str) -> String {
    lazy_static::lazy_static! {
        static ref PARENS_RE: regex::Regex = regex::Regex::new(r"\([^)]*\)").unwrap();
        static ref INVALID_RE: regex::Regex = regex::Regex::new(r"[^-_. a-zA-Z0-9]+").unwrap();
        static ref SPACES_RE: regex::Regex = regex::Regex::new(r"\s+").unwrap();
    }
    let text = text.to_lowercase();
    let text = PARENS_RE.replace_all(&text, "");
    let text = INVALID_RE.replace_all(&text, "");
    let text = SPACES_RE.replace_all(&text, " ");
    text.trim().replace(' ', "_")
}

/// Center `text` in `width` columns. The extra column of odd padding goes
/// to the left only when `width` is odd as well.
pub fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let pad = width - len;
    let left = pad / 2 + (pad & width & 1);
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(pad - left))
}

/// Greedy word wrap. Words longer than `width` are kept whole and lines
/// after the first are prefixed with `indent`.
pub fn wrap(text: &str, width: usize, indent: &str) -> Vec<String> {
    let mut lines = vec![];
    let mut line = String::new();
    for word in text.split_whitespace() {
        let prefix_len = if lines.is_empty() { 0 } else { indent.len() };
        if line.is_empty() {
            line = word.to_string();
        } else if prefix_len + line.chars().count() + 1 + word.chars().count() <= width {
            line += " ";
            line += word;
        } else {
            let prefix = if lines.is_empty() { "" } else { indent };
            lines.push(format!("{}{}", prefix, line));
            line = word.to_string();
        }
    }
    if !line.is_empty() {
        let prefix = if lines.is_empty() { "" } else { indent };
        lines.push(format!("{}{}", prefix, line));
    }
    lines
}

pub fn fill(text: &str, width: usize, indent: &str) -> String {
    wrap(text, width, indent).join("\n")
}

/// Print a red "Error" line wrapped at 80 columns and log the message.
/// Returns the wrapped text without the color codes.
pub fn error_message(text: &str) -> String {
    let msg = fill(&format!("\x1b[31mError\x1b[0m: {}", text), 80, "");
    eprintln!("{}", &msg);
    error!("{}", text);
    super::remove_ansi(&msg)
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_byte_size() {
        for pair in &[
            ((1.0, "B"), "1 B"),
            ((10000.0, "B"), "9.77 KB"),
            ((10000000.0, "B"), "9.54 MB"),
            ((10000000000.0, "B"), "9.31 GB"),
            ((1000000000000000.0, "B"), "909.49 TB"),
            ((10000000000000000000000.0, "B"), "8881784.2 PB"),
            ((10000.0, "KB"), "9.77 MB"),
        ] {
            let result = super::pretty_byte_size((pair.0).0, (pair.0).1);
            assert_eq!(&result, pair.1);
            println!("{:?} -> {} ({})", pair.0, &result, pair.1);
        }
    }

    #[test]
    fn test_other_units() {
        assert_eq!(super::pretty_byte_per_sec(5e9, "B/s"), "4.66 GB/s");
        assert_eq!(super::pretty_time_elapsed(90.0, "s"), "1.5 min");
        assert_eq!(super::pretty_time_elapsed(7200.0, "s"), "2 h");
        assert_eq!(super::pretty_small_time(1500.0, "us"), "1.5 ms");
        assert_eq!(super::pretty_small_time(850.0, "us"), "850 us");
        assert_eq!(super::pretty_flops(1234.0, "GFLOPS"), "1.23 TFLOPS");
    }

    #[test]
    fn test_uglify_filename() {
        for pair in &[
            ("Intel Core(TM) i7-7700 CPU", "intel_core_i7-7700_cpu"),
            (
                "Intel(R) Xeon(R) Platinum 8180 CPU @ 2.50GHz",
                "intel_xeon_platinum_8180_cpu_2.50ghz",
            ),
            ("AMD EPYC 7601 32-Core Processor", "amd_epyc_7601_32-core_processor"),
        ] {
            assert_eq!(super::uglify_filename(pair.0), pair.1);
        }
    }

    #[test]
    fn test_center() {
        assert_eq!(super::center("ab", 5), "  ab ");
        assert_eq!(super::center("ab", 6), "  ab  ");
        assert_eq!(super::center("abc", 6), " abc  ");
        assert_eq!(super::center("abcdef", 4), "abcdef");
    }

    #[test]
    fn test_wrap() {
        let text = "Memory bandwidth using STREAM and OpenMPI. Higher throughput is better.";
        assert_eq!(
            super::wrap(text, 40, ""),
            vec![
                "Memory bandwidth using STREAM and".to_string(),
                "OpenMPI. Higher throughput is better.".to_string(),
            ]
        );
        assert_eq!(
            super::fill("make -s -j 8 a-very-long-argument-that-stays-whole", 10, "        "),
            "make -s -j\n        8\n        a-very-long-argument-that-stays-whole"
        );
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            super::error_message("my error mesage"),
            "Error: my error mesage"
        );
        let msg = super::error_message(&"failed ".repeat(20));
        assert!(msg.lines().count() > 1);
        assert!(!msg.contains('\x1b'));
    }
}
