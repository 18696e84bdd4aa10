// Number format patterns
//
// A pattern is an optional literal prefix, a number part and an optional
// literal suffix: `#,##0.00`, `0%`, `[$$]#,##0.00`, `0.0" kg"`. The number
// part controls decimals and thousands grouping; `%` scales by 100.

use crate::formula::value::Value;
use crate::settings::Locale;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NumberFormat {
    pub prefix: String,
    pub suffix: String,
    pub decimals: usize,
    pub thousands: bool,
    pub percent: bool,
}

impl NumberFormat {
    /// Parse a pattern. Returns `None` for patterns without a number part.
    pub fn parse(pattern: &str) -> Option<Self> {
        let mut format = NumberFormat::default();
        let mut chars = pattern.chars().peekable();
        let mut seen_number = false;
        let mut in_decimals = false;

        while let Some(c) = chars.next() {
            match c {
                '[' if chars.peek() == Some(&'$') => {
                    chars.next();
                    let literal: String = chars.by_ref().take_while(|&c| c != ']').collect();
                    format.literal_mut(seen_number).push_str(&literal);
                }
                '"' => {
                    let literal: String = chars.by_ref().take_while(|&c| c != '"').collect();
                    format.literal_mut(seen_number).push_str(&literal);
                }
                '0' | '#' => {
                    seen_number = true;
                    if in_decimals {
                        format.decimals += 1;
                    }
                }
                ',' if seen_number && !in_decimals => format.thousands = true,
                '.' if seen_number || chars.peek().is_some_and(|c| *c == '0' || *c == '#') => {
                    seen_number = true;
                    in_decimals = true;
                }
                '%' => {
                    format.percent = true;
                    format.suffix.push('%');
                }
                other => format.literal_mut(seen_number).push(other),
            }
        }
        seen_number.then_some(format)
    }

    fn literal_mut(&mut self, after_number: bool) -> &mut String {
        if after_number {
            &mut self.suffix
        } else {
            &mut self.prefix
        }
    }

    pub fn format(&self, n: f64, locale: &Locale) -> String {
        let scaled = if self.percent { n * 100.0 } else { n };
        let fixed = format!("{:.*}", self.decimals, scaled.abs());
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i.to_string(), Some(f.to_string())),
            None => (fixed.clone(), None),
        };
        let int_part = if self.thousands {
            group_thousands(&int_part, locale.thousands_separator)
        } else {
            int_part
        };
        let mut out = String::new();
        // -0.00 displays as 0.00
        if scaled < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
            out.push('-');
        }
        out.push_str(&self.prefix);
        out.push_str(&int_part);
        if let Some(frac) = frac_part {
            out.push(locale.decimal_separator);
            out.push_str(&frac);
        }
        out.push_str(&self.suffix);
        out
    }
}

fn group_thousands(digits: &str, separator: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Display text of a value under an optional format pattern.
pub fn format_value(value: &Value, pattern: Option<&str>, locale: &Locale) -> String {
    match value {
        Value::Number(n) => match pattern.and_then(NumberFormat::parse) {
            Some(format) => format.format(*n, locale),
            None => {
                let general = value.display_text();
                if locale.decimal_separator == '.' {
                    general
                } else {
                    general.replace('.', &locale.decimal_separator.to_string())
                }
            }
        },
        other => other.display_text(),
    }
}
