//! printf 风格的 `%` 消息插值
//!
//! 支持 `%[(key)][flags][width][.precision]conversion`：
//! flags 为 `-` `+` ` ` `#` `0`，width/precision 可用 `*` 从参数中读取，
//! 转换符为 `s r a c d i u o x X e E f F g G` 以及 `%%`。
//! 唯一的参数是对象时，`%(key)s` 按键取值。

use crate::error::EmitError;
use crate::record::display_value;
use serde_json::{Map, Value};
use std::slice::Iter;

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
}

#[derive(Debug, Clone, Copy)]
enum Count {
    Fixed(usize),
    Next,
}

#[derive(Debug)]
struct Directive<'a> {
    key: Option<&'a str>,
    flags: Flags,
    width: Option<Count>,
    precision: Option<Count>,
    conversion: char,
}

#[derive(Debug)]
struct Conversion {
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

struct Args<'a> {
    positional: Iter<'a, Value>,
    mapping: Option<&'a Map<String, Value>>,
}

impl<'a> Args<'a> {
    fn next(&mut self) -> Result<&'a Value, EmitError> {
        self.positional
            .next()
            .ok_or_else(|| format_error("not enough arguments for format string"))
    }

    fn get(&self, key: &str) -> Result<&'a Value, EmitError> {
        let mapping = self
            .mapping
            .ok_or_else(|| format_error("format requires a mapping"))?;
        mapping
            .get(key)
            .ok_or_else(|| format_error(format!("missing mapping key '{}'", key)))
    }

    fn count(&mut self, count: Option<Count>, flags: &mut Flags) -> Result<Option<usize>, EmitError> {
        match count {
            None => Ok(None),
            Some(Count::Fixed(n)) => Ok(Some(n)),
            Some(Count::Next) => {
                let n = self
                    .next()?
                    .as_i64()
                    .ok_or_else(|| format_error("* wants int"))?;
                // 负宽度等价于左对齐
                if n < 0 {
                    flags.left = true;
                }
                Ok(Some(n.unsigned_abs() as usize))
            }
        }
    }
}

fn format_error(message: impl Into<String>) -> EmitError {
    EmitError::Format(message.into())
}

pub(crate) fn interpolate(template: &str, args: &[Value]) -> Result<String, EmitError> {
    let mapping = match args {
        [Value::Object(map)] => Some(map),
        _ => None,
    };
    let mut args = Args {
        positional: args.iter(),
        mapping,
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let (directive, tail) = parse_directive(&rest[pos + 1..])?;
        rest = tail;

        if directive.conversion == '%' {
            out.push('%');
            continue;
        }

        let mut flags = directive.flags;
        let width = args.count(directive.width, &mut flags)?;
        // `.*` 取到负数时按 0 处理
        let precision = match directive.precision {
            Some(Count::Next) => {
                let mut ignored = Flags::default();
                args.count(Some(Count::Next), &mut ignored)
                    .map(|p| if ignored.left { Some(0) } else { p })?
            }
            other => args.count(other, &mut flags)?,
        };
        let value = match directive.key {
            Some(key) => args.get(key)?,
            None => args.next()?,
        };

        let conv = Conversion {
            flags,
            width,
            precision,
            conversion: directive.conversion,
        };
        out.push_str(&render(&conv, value)?);
    }
    out.push_str(rest);

    if args.mapping.is_none() && args.positional.next().is_some() {
        return Err(format_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

fn parse_directive(input: &str) -> Result<(Directive<'_>, &str), EmitError> {
    let mut rest = input;

    let mut key = None;
    if let Some(after) = rest.strip_prefix('(') {
        let end = after
            .find(')')
            .ok_or_else(|| format_error("incomplete format key"))?;
        key = Some(&after[..end]);
        rest = &after[end + 1..];
    }

    let mut flags = Flags::default();
    loop {
        match rest.chars().next() {
            Some('-') => flags.left = true,
            Some('+') => flags.plus = true,
            Some(' ') => flags.space = true,
            Some('#') => flags.alternate = true,
            Some('0') => flags.zero = true,
            _ => break,
        }
        rest = &rest[1..];
    }

    let (width, tail) = parse_count(rest);
    rest = tail;

    let mut precision = None;
    if let Some(after) = rest.strip_prefix('.') {
        let (count, tail) = parse_count(after);
        precision = Some(count.unwrap_or(Count::Fixed(0)));
        rest = tail;
    }

    // 长度修饰符没有意义，跳过
    rest = rest.trim_start_matches(|c: char| matches!(c, 'h' | 'l' | 'L'));

    let conversion = rest
        .chars()
        .next()
        .ok_or_else(|| format_error("incomplete format"))?;

    Ok((
        Directive {
            key,
            flags,
            width,
            precision,
            conversion,
        },
        &rest[conversion.len_utf8()..],
    ))
}

fn parse_count(input: &str) -> (Option<Count>, &str) {
    if let Some(rest) = input.strip_prefix('*') {
        return (Some(Count::Next), rest);
    }
    let digits = input.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, input);
    }
    (input[..digits].parse().ok().map(Count::Fixed), &input[digits..])
}

fn render(conv: &Conversion, value: &Value) -> Result<String, EmitError> {
    match conv.conversion {
        's' => Ok(pad_text(&display_value(value), conv)),
        'r' | 'a' => Ok(pad_text(&value.to_string(), conv)),
        'c' => Ok(pad_text(&to_char(value)?.to_string(), conv)),
        'd' | 'i' | 'u' | 'o' | 'x' | 'X' => {
            let n = to_integer(value, conv.conversion)?;
            Ok(format_integer(n, conv))
        }
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
            let x = to_float(value, conv.conversion)?;
            Ok(format_float(x, conv))
        }
        other => Err(format_error(format!(
            "unsupported format character '{}'",
            other
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn to_integer(value: &Value, conversion: char) -> Result<i128, EmitError> {
    let truncates = matches!(conversion, 'd' | 'i' | 'u');
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i128::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(i128::from(u))
            } else if truncates {
                let f = n.as_f64().unwrap_or_default();
                Ok(f.trunc() as i128)
            } else {
                Err(format_error(format!(
                    "%{} format: an integer is required, not float",
                    conversion
                )))
            }
        }
        Value::Bool(b) => Ok(i128::from(u8::from(*b))),
        other => Err(format_error(format!(
            "%{} format: a number is required, not {}",
            conversion,
            type_name(other)
        ))),
    }
}

fn to_float(value: &Value, conversion: char) -> Result<f64, EmitError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format_error(format!("%{} format: number out of range", conversion))),
        Value::Bool(b) => Ok(f64::from(u8::from(*b))),
        other => Err(format_error(format!(
            "%{} format: a real number is required, not {}",
            conversion,
            type_name(other)
        ))),
    }
}

fn to_char(value: &Value) -> Result<char, EmitError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|code| u32::try_from(code).ok())
            .and_then(char::from_u32)
            .ok_or_else(|| format_error("%c arg not in range")),
        Value::String(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format_error("%c requires an int or a single character")),
            }
        }
        other => Err(format_error(format!(
            "%c requires an int or a single character, not {}",
            type_name(other)
        ))),
    }
}

fn sign(negative: bool, flags: &Flags) -> &'static str {
    if negative {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    }
}

fn format_integer(n: i128, conv: &Conversion) -> String {
    let magnitude = n.unsigned_abs();
    let mut digits = match conv.conversion {
        'o' => format!("{:o}", magnitude),
        'x' => format!("{:x}", magnitude),
        'X' => format!("{:X}", magnitude),
        _ => magnitude.to_string(),
    };
    if let Some(precision) = conv.precision {
        if digits.len() < precision {
            digits.insert_str(0, &"0".repeat(precision - digits.len()));
        }
    }

    let radix = match (conv.flags.alternate, conv.conversion) {
        (true, 'o') => "0o",
        (true, 'x') => "0x",
        (true, 'X') => "0X",
        _ => "",
    };
    let prefix = format!("{}{}", sign(n < 0, &conv.flags), radix);
    pad(&prefix, &digits, conv, conv.flags.zero)
}

fn format_float(x: f64, conv: &Conversion) -> String {
    let precision = conv.precision.unwrap_or(6);
    let magnitude = x.abs();

    let body = if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        "inf".to_string()
    } else {
        match conv.conversion.to_ascii_lowercase() {
            'f' => {
                let mut body = format!("{:.*}", precision, magnitude);
                if conv.flags.alternate && precision == 0 {
                    body.push('.');
                }
                body
            }
            'e' => exponent(magnitude, precision),
            _ => general(magnitude, precision, conv.flags.alternate),
        }
    };
    let body = if conv.conversion.is_ascii_uppercase() {
        body.to_uppercase()
    } else {
        body
    };

    let negative = x.is_sign_negative() && !x.is_nan();
    let prefix = sign(negative, &conv.flags);
    pad(prefix, &body, conv, conv.flags.zero && x.is_finite())
}

/// 指数形式，指数至少两位并带符号，如 `1.500000e+00`
fn exponent(magnitude: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, magnitude);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or_default();
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => raw,
    }
}

fn general(magnitude: f64, precision: usize, alternate: bool) -> String {
    let precision = precision.max(1);
    let exp = if magnitude == 0.0 {
        0
    } else {
        format!("{:.*e}", precision - 1, magnitude)
            .split_once('e')
            .and_then(|(_, exp)| exp.parse::<i32>().ok())
            .unwrap_or_default()
    };

    let body = if exp < -4 || exp >= precision as i32 {
        exponent(magnitude, precision - 1)
    } else {
        format!("{:.*}", (precision as i32 - 1 - exp) as usize, magnitude)
    };

    if alternate {
        body
    } else {
        strip_trailing_zeros(&body)
    }
}

fn strip_trailing_zeros(body: &str) -> String {
    let (mantissa, exp) = match body.find('e') {
        Some(i) => body.split_at(i),
        None => (body, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{}{}", mantissa, exp)
}

fn pad_text(text: &str, conv: &Conversion) -> String {
    let text: String = match conv.precision {
        Some(precision) => text.chars().take(precision).collect(),
        None => text.to_string(),
    };
    pad("", &text, conv, false)
}

fn pad(prefix: &str, body: &str, conv: &Conversion, zero: bool) -> String {
    let len = prefix.chars().count() + body.chars().count();
    let fill = match conv.width {
        Some(width) if width > len => width - len,
        _ => return format!("{}{}", prefix, body),
    };

    if conv.flags.left {
        format!("{}{}{}", prefix, body, " ".repeat(fill))
    } else if zero {
        format!("{}{}{}", prefix, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), prefix, body)
    }
}
