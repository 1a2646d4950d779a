//! Value rendering.
//!
//! Numbers print with five significant digits through a fixed
//! powers-of-ten table, switching to scientific notation outside a narrow
//! range. Rows truncate at the display width with a `..` marker.

use itertools::Itertools;
use tacit_types::{Atom, Sym, Tag, Value};

use crate::consts::PRINT_WIDTH;
use crate::interpreter::Interpreter;

/// Powers of ten bracketing the single-precision range.
static POW10: [f64; 40] = [
    1e-20, 1e-19, 1e-18, 1e-17, 1e-16, 1e-15, 1e-14, 1e-13, 1e-12, 1e-11, 1e-10, 1e-9, 1e-8,
    1e-7, 1e-6, 1e-5, 1e-4, 1e-3, 1e-2, 1e-1, 1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9,
    1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16, 1e17, 1e18, 1e19,
];

const POW10_BIAS: i32 = 20;
const SIG_DIGITS: u32 = 5;

/// Render a value for the read loop.
pub(crate) fn render(vm: &Interpreter, value: Value) -> String {
    render_value(vm, value)
}

fn render_value(vm: &Interpreter, value: Value) -> String {
    if let Some(atom) = value.atom() {
        return render_atom(atom);
    }
    if value.is_matrix() {
        let cols = value.cols();
        let stride = 1usize << value.stride_log();
        return (0..value.rows())
            .map(|row| {
                let start = row * stride;
                truncate(render_span(vm, value, start, cols))
            })
            .join("\n");
    }
    truncate(render_span(vm, value, 0, value.count()))
}

fn render_span(vm: &Interpreter, value: Value, start: usize, len: usize) -> String {
    match value.tag() {
        Tag::Byte => {
            let bytes = &vm.heap.u8s(value)[start..start + len];
            if bytes.iter().all(|&b| (0x20..0x7f).contains(&b)) {
                bytes.iter().map(|&b| b as char).collect()
            } else {
                bytes.iter().map(|&b| b.to_string()).join(" ")
            }
        }
        Tag::Bit => {
            let words = vm.heap.words(value);
            (start..start + len)
                .map(|i| ((words[i >> 6] >> (i & 63)) & 1).to_string())
                .join(" ")
        }
        Tag::Int => vm.heap.i32s(value)[start..start + len]
            .iter()
            .map(|i| i.to_string())
            .join(" "),
        Tag::Float => vm.heap.f32s(value)[start..start + len]
            .iter()
            .map(|&f| fmt_f32(f))
            .join(" "),
        Tag::Sym => vm.heap.u32s(value)[start..start + len]
            .iter()
            .map(|&bits| format!("`{}", Sym::from_bits(bits)))
            .join(" "),
        Tag::Mixed => vm.heap.words(value)[start..start + len]
            .iter()
            .map(|&bits| {
                let element = Value::from_bits(bits);
                if element.is_boxed() {
                    format!("({})", render_value(vm, element))
                } else {
                    render_value(vm, element)
                }
            })
            .join(" "),
    }
}

fn render_atom(atom: Atom) -> String {
    match atom {
        Atom::Bit(b) => u8::from(b).to_string(),
        Atom::Byte(b) => {
            if (0x20..0x7f).contains(&b) {
                (b as char).to_string()
            } else {
                b.to_string()
            }
        }
        Atom::Int(i) => i.to_string(),
        Atom::Sym(s) => format!("`{s}"),
        Atom::Float(f) => fmt_f32(f),
    }
}

/// Five significant digits; scientific notation outside [1e-5, 1e10).
pub(crate) fn fmt_f32(x: f32) -> String {
    if x.is_nan() {
        return "0n".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "0w".into() } else { "-0w".into() };
    }
    if x == 0.0 {
        return "0".into();
    }
    let negative = x < 0.0;
    let magnitude = f64::from(x.abs());

    let mut exponent = i32::MIN;
    for (i, &power) in POW10.iter().enumerate() {
        if power <= magnitude {
            exponent = i as i32 - POW10_BIAS;
        }
    }
    if exponent == i32::MIN {
        // Below the table: subnormal territory, scientific from the log.
        exponent = magnitude.log10().floor() as i32;
    }

    // Scale to a five-digit integer mantissa.
    let scale = if (-POW10_BIAS..POW10_BIAS).contains(&(exponent - (SIG_DIGITS as i32 - 1))) {
        POW10[(exponent - (SIG_DIGITS as i32 - 1) + POW10_BIAS) as usize]
    } else {
        10f64.powi(exponent - (SIG_DIGITS as i32 - 1))
    };
    let mut digits = (magnitude / scale).round() as u64;
    if digits >= 10u64.pow(SIG_DIGITS) {
        digits /= 10;
        exponent += 1;
    }

    let body = if exponent >= 10 || exponent <= -6 {
        let mantissa = place_point(digits, 1);
        format!("{mantissa}e{exponent}")
    } else if exponent >= 0 {
        let int_digits = (exponent + 1) as u32;
        if int_digits >= SIG_DIGITS {
            let mut text = digits.to_string();
            text.extend(core::iter::repeat('0').take((int_digits - SIG_DIGITS) as usize));
            text
        } else {
            place_point(digits, int_digits)
        }
    } else {
        let zeros = (-exponent - 1) as usize;
        let trimmed = trim_zeros(digits);
        format!("0.{}{}", "0".repeat(zeros), trimmed)
    };
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

/// Lay out five significant digits with the decimal point after
/// `int_digits` of them, trimming trailing fraction zeros.
fn place_point(digits: u64, int_digits: u32) -> String {
    let text = format!("{digits:05}");
    let (int_part, frac_part) = text.split_at(int_digits as usize);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Digits with all trailing zeros removed (fraction-only layout).
fn trim_zeros(digits: u64) -> String {
    let text = format!("{digits:05}");
    text.trim_end_matches('0').to_string()
}

/// Truncate one display row, marking the cut with `..`.
fn truncate(mut text: String) -> String {
    if text.len() > PRINT_WIDTH {
        text.truncate(PRINT_WIDTH - 2);
        text.push_str("..");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.0, "0")]
    #[test_case(2.5, "2.5")]
    #[test_case(14.0, "14"; "positive_14")]
    #[test_case(-14.0, "-14"; "negative_14")]
    #[test_case(0.5, "0.5")]
    #[test_case(45.0, "45")]
    #[test_case(0.0001, "0.0001")]
    #[test_case(123456.0, "123460")]
    #[test_case(1e10, "1e10")]
    #[test_case(2e-7, "2e-7")]
    #[test_case(1.5e12, "1.5e12")]
    #[test_case(f32::INFINITY, "0w")]
    #[test_case(f32::NEG_INFINITY, "-0w")]
    fn float_formatting(x: f32, want: &str) {
        assert_eq!(fmt_f32(x), want);
    }

    #[test]
    fn nan_prints_as_null() {
        assert_eq!(fmt_f32(f32::NAN), "0n");
    }

    #[test]
    fn five_significant_digits_round() {
        assert_eq!(fmt_f32(3.14159265), "3.1416");
        assert_eq!(fmt_f32(99999.9), "100000");
    }

    #[test]
    fn truncation_marks_the_cut() {
        let long = "x".repeat(400);
        let cut = truncate(long);
        assert_eq!(cut.len(), PRINT_WIDTH);
        assert!(cut.ends_with(".."));
    }
}
