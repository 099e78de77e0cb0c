//! printf-style rendering for the `print` instruction.

use crate::virtual_machine::errors::VMError;

/// Operand popped by `print`, typed by the arithmetic mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum PrintValue {
    Char(i8),
    Int(i32),
    Float(f32),
}

impl PrintValue {
    fn as_int(self) -> i32 {
        match self {
            PrintValue::Char(c) => c as i32,
            PrintValue::Int(i) => i,
            PrintValue::Float(f) => f as i32,
        }
    }

    fn as_float(self) -> f64 {
        match self {
            PrintValue::Char(c) => c as f64,
            PrintValue::Int(i) => i as f64,
            PrintValue::Float(f) => f as f64,
        }
    }
}

/// Renders `value` with the conversion character `spec`.
///
/// Supported: `d i u x X o c f F e E`. Values of another kind than the
/// conversion expects are converted numerically.
pub(super) fn format_value(spec: u8, value: PrintValue) -> Result<Vec<u8>, VMError> {
    let int = value.as_int();
    let text = match spec {
        b'd' | b'i' => int.to_string(),
        b'u' => (int as u32).to_string(),
        b'x' => format!("{:x}", int as u32),
        b'X' => format!("{:X}", int as u32),
        b'o' => format!("{:o}", int as u32),
        b'c' => return Ok(vec![int as u8]),
        b'f' => fixed(value.as_float(), false),
        b'F' => fixed(value.as_float(), true),
        b'e' => exponent(value.as_float(), false),
        b'E' => exponent(value.as_float(), true),
        other => {
            return Err(VMError::InvalidFormat {
                spec: other as char,
            });
        }
    };
    Ok(text.into_bytes())
}

fn non_finite(v: f64, upper: bool) -> Option<String> {
    let text = match (v.is_nan(), v.is_infinite(), v.is_sign_negative()) {
        (true, _, false) => "nan",
        (true, _, true) => "-nan",
        (_, true, false) => "inf",
        (_, true, true) => "-inf",
        _ => return None,
    };
    Some(if upper {
        text.to_uppercase()
    } else {
        text.to_string()
    })
}

fn fixed(v: f64, upper: bool) -> String {
    non_finite(v, upper).unwrap_or_else(|| format!("{v:.6}"))
}

/// `d.dddddde±XX`, at least two exponent digits.
fn exponent(v: f64, upper: bool) -> String {
    if let Some(text) = non_finite(v, upper) {
        return text;
    }
    let rendered = format!("{v:.6e}");
    let (mantissa, exp) = rendered.split_once('e').unwrap_or((&rendered, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{mantissa}{marker}{sign}{:02}", exp.abs())
}
