// Formula tokenizer - converts formula text into a flat, positioned token stream
// Whitespace is kept as Space tokens so formulas can be re-rendered verbatim

use crate::error::ParseError;
use crate::settings::Locale;

/// Placeholder reference written for references whose target was deleted.
pub const INVALID_REFERENCE: &str = "#REF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Operator,
    Number,
    String,
    Boolean,
    Symbol,
    Reference,
    Space,
    LeftParen,
    RightParen,
    Comma,
}

/// A token with its byte span in the source text.
///
/// `value` is always the exact source slice `text[start..end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Text of the token in the canonical locale (`.` decimals, `,` separators).
    pub fn canonical_text(&self) -> String {
        match self.kind {
            TokenKind::Number => self.value.replace(',', "."),
            TokenKind::Comma => ",".to_string(),
            _ => self.value.clone(),
        }
    }
}

const OPERATORS_2: [&str; 3] = ["<>", "<=", ">="];
const OPERATORS_1: [char; 11] = ['+', '-', '*', '/', ':', '^', '&', '=', '<', '>', '%'];

/// Tokenize formula (or plain literal) text.
///
/// Mismatched full-row/column shapes such as `A:1` are not an error: they
/// come out as separate symbol/operator/number tokens.
pub fn tokenize(text: &str, locale: &Locale) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    // Byte offset of each char, plus the end of the text
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());

    let mut tokens = Vec::new();
    let mut i = 0;
    let push = |tokens: &mut Vec<Token>, kind: TokenKind, from: usize, to: usize| {
        tokens.push(Token {
            kind,
            value: text[offsets[from]..offsets[to]].to_string(),
            start: offsets[from],
            end: offsets[to],
        });
    };

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            push(&mut tokens, TokenKind::Space, i, j);
            i = j;
            continue;
        }

        if c == '\'' {
            // Quoted sheet name ('My ''Sheet'''!A1) or single-quoted string
            if let Some(end) = match_quoted_sheet_reference(&chars, i) {
                push(&mut tokens, TokenKind::Reference, i, end);
                i = end;
                continue;
            }
            let end = scan_string(&chars, i).ok_or_else(|| {
                ParseError::new("Unterminated string literal", offsets[i])
            })?;
            push(&mut tokens, TokenKind::String, i, end);
            i = end;
            continue;
        }

        if c == '"' {
            let end = scan_string(&chars, i).ok_or_else(|| {
                ParseError::new("Unterminated string literal", offsets[i])
            })?;
            push(&mut tokens, TokenKind::String, i, end);
            i = end;
            continue;
        }

        if c == '#' {
            let end = i + INVALID_REFERENCE.len();
            let candidate: String = chars[i..end.min(chars.len())].iter().collect();
            if candidate.eq_ignore_ascii_case(INVALID_REFERENCE) && is_boundary(&chars, end) {
                push(&mut tokens, TokenKind::Reference, i, end);
                i = end;
                continue;
            }
            return Err(ParseError::new(
                format!("Unexpected character '{}'", c),
                offsets[i],
            ));
        }

        if c.is_ascii_alphanumeric() || c == '$' || c == '_' {
            if let Some(end) = match_reference(&chars, i) {
                push(&mut tokens, TokenKind::Reference, i, end);
                i = end;
                continue;
            }
        }

        if c.is_ascii_digit()
            || (c == locale.decimal_separator && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let end = scan_number(&chars, i, locale.decimal_separator);
            push(&mut tokens, TokenKind::Number, i, end);
            i = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                j += 1;
            }
            let word: String = chars[i..j].iter().collect();
            let upper = word.to_ascii_uppercase();
            let kind = if (upper == "TRUE" || upper == "FALSE") && !next_non_space_is(&chars, j, '(') {
                TokenKind::Boolean
            } else {
                TokenKind::Symbol
            };
            push(&mut tokens, kind, i, j);
            i = j;
            continue;
        }

        if c == '$' {
            return Err(ParseError::new("Invalid reference", offsets[i]));
        }

        if c == '(' {
            push(&mut tokens, TokenKind::LeftParen, i, i + 1);
            i += 1;
            continue;
        }
        if c == ')' {
            push(&mut tokens, TokenKind::RightParen, i, i + 1);
            i += 1;
            continue;
        }
        if c == locale.argument_separator {
            push(&mut tokens, TokenKind::Comma, i, i + 1);
            i += 1;
            continue;
        }

        if i + 1 < chars.len() {
            let pair: String = chars[i..i + 2].iter().collect();
            if OPERATORS_2.contains(&pair.as_str()) {
                push(&mut tokens, TokenKind::Operator, i, i + 2);
                i += 2;
                continue;
            }
        }
        if OPERATORS_1.contains(&c) {
            push(&mut tokens, TokenKind::Operator, i, i + 1);
            i += 1;
            continue;
        }

        return Err(ParseError::new(
            format!("Unexpected character '{}'", c),
            offsets[i],
        ));
    }

    Ok(tokens)
}

/// Scan a quoted string starting at `start` (the quote). Backslash escapes
/// the next character. Returns the index after the closing quote.
fn scan_string(chars: &[char], start: usize) -> Option<usize> {
    let quote = chars[start];
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            ch if ch == quote => return Some(j + 1),
            _ => j += 1,
        }
    }
    None
}

fn scan_number(chars: &[char], start: usize, decimal: char) -> usize {
    let mut j = start;
    while j < chars.len() && chars[j].is_ascii_digit() {
        j += 1;
    }
    if j < chars.len() && chars[j] == decimal {
        j += 1;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
    }
    // Exponent only when digits follow (1e5, 1E-3)
    if j < chars.len() && (chars[j] == 'e' || chars[j] == 'E') {
        let mut k = j + 1;
        if k < chars.len() && (chars[k] == '+' || chars[k] == '-') {
            k += 1;
        }
        if k < chars.len() && chars[k].is_ascii_digit() {
            while k < chars.len() && chars[k].is_ascii_digit() {
                k += 1;
            }
            j = k;
        }
    }
    j
}

fn next_non_space_is(chars: &[char], from: usize, expected: char) -> bool {
    chars[from..]
        .iter()
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| *c == expected)
}

/// A reference may not run straight into another identifier-like char.
fn is_boundary(chars: &[char], at: usize) -> bool {
    match chars.get(at) {
        None => true,
        Some(c) => !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '(' | '$' | '!')),
    }
}

/// `'Quoted ''name'''!<body>`. Returns the end of the whole reference.
fn match_quoted_sheet_reference(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    loop {
        match chars.get(j) {
            None => return None,
            Some('\'') if chars.get(j + 1) == Some(&'\'') => j += 2,
            Some('\'') => break,
            Some(_) => j += 1,
        }
    }
    // j is the closing quote
    if j == start + 1 || chars.get(j + 1) != Some(&'!') {
        return None;
    }
    match_reference_body(chars, j + 2)
}

/// Optional unquoted `Sheet!` prefix followed by a reference body.
fn match_reference(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
        j += 1;
    }
    if j > start && chars.get(j) == Some(&'!') {
        return match_reference_body(chars, j + 1);
    }
    match_reference_body(chars, start)
}

/// `A1`, `A1:B2`, `A:B` or `1:2` (each part optionally `$`-anchored).
fn match_reference_body(chars: &[char], start: usize) -> Option<usize> {
    if let Some(end) = scan_cell(chars, start) {
        if chars.get(end) == Some(&':') {
            if let Some(end2) = scan_cell(chars, end + 1) {
                if is_boundary(chars, end2) {
                    return Some(end2);
                }
            }
        }
        return is_boundary(chars, end).then_some(end);
    }
    if let Some(end) = scan_col(chars, start) {
        if chars.get(end) == Some(&':') {
            if let Some(end2) = scan_col(chars, end + 1) {
                if is_boundary(chars, end2) {
                    return Some(end2);
                }
            }
        }
    }
    if let Some(end) = scan_row(chars, start) {
        if chars.get(end) == Some(&':') {
            if let Some(end2) = scan_row(chars, end + 1) {
                if is_boundary(chars, end2) {
                    return Some(end2);
                }
            }
        }
    }
    None
}

fn scan_letters(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if chars.get(j) == Some(&'$') {
        j += 1;
    }
    let letters_start = j;
    while j < chars.len() && chars[j].is_ascii_alphabetic() {
        j += 1;
    }
    let count = j - letters_start;
    (1..=3).contains(&count).then_some(j)
}

fn scan_digits(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if chars.get(j) == Some(&'$') {
        j += 1;
    }
    let digits_start = j;
    while j < chars.len() && chars[j].is_ascii_digit() {
        j += 1;
    }
    if j == digits_start {
        return None;
    }
    // Rows are 1-based
    let row: String = chars[digits_start..j].iter().collect();
    match row.parse::<usize>() {
        Ok(n) if n > 0 => Some(j),
        _ => None,
    }
}

fn scan_cell(chars: &[char], start: usize) -> Option<usize> {
    let after_col = scan_letters(chars, start)?;
    scan_digits(chars, after_col)
}

fn scan_col(chars: &[char], start: usize) -> Option<usize> {
    let end = scan_letters(chars, start)?;
    // A column part must not continue into a row number
    match chars.get(end) {
        Some(c) if c.is_ascii_digit() || *c == '$' => None,
        _ => Some(end),
    }
}

fn scan_row(chars: &[char], start: usize) -> Option<usize> {
    scan_digits(chars, start)
}

/// Translate formula text typed in `locale` to the canonical locale in
/// which formulas are stored. Non-formula text is returned unchanged.
pub fn canonicalize_formula(text: &str, locale: &Locale) -> String {
    if locale.is_canonical() || !text.starts_with('=') {
        return text.to_string();
    }
    match tokenize(text, locale) {
        Ok(tokens) => tokens.iter().map(|t| t.canonical_text()).collect(),
        Err(_) => text.to_string(),
    }
}

/// Translate canonical formula text for display in `locale`.
pub fn localize_formula(text: &str, locale: &Locale) -> String {
    if locale.is_canonical() || !text.starts_with('=') {
        return text.to_string();
    }
    match tokenize(text, &Locale::canonical()) {
        Ok(tokens) => tokens
            .iter()
            .map(|t| match t.kind {
                TokenKind::Number => t.value.replace('.', &locale.decimal_separator.to_string()),
                TokenKind::Comma => locale.argument_separator.to_string(),
                _ => t.value.clone(),
            })
            .collect(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(TokenKind, String)> {
        tokenize(text, &Locale::default())
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.value))
            .collect()
    }

    fn non_space(text: &str) -> Vec<(TokenKind, String)> {
        kinds(text)
            .into_iter()
            .filter(|(k, _)| *k != TokenKind::Space)
            .collect()
    }

    #[test]
    fn test_simple_formula() {
        use TokenKind::*;
        assert_eq!(
            kinds("=A1+2"),
            vec![
                (Operator, "=".into()),
                (Reference, "A1".into()),
                (Operator, "+".into()),
                (Number, "2".into()),
            ]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = tokenize("=\"é\" & B2", &Locale::default()).unwrap();
        let b2 = tokens.iter().find(|t| t.kind == TokenKind::Reference).unwrap();
        assert_eq!(&"=\"é\" & B2"[b2.start..b2.end], "B2");
    }

    #[test]
    fn test_spaces_preserved() {
        let tokens = kinds("= SUM( A1 )");
        assert_eq!(tokens.iter().filter(|(k, _)| *k == TokenKind::Space).count(), 3);
    }

    #[test]
    fn test_ranges_and_anchors() {
        use TokenKind::*;
        assert_eq!(non_space("=$A$1:b2")[1], (Reference, "$A$1:b2".into()));
        assert_eq!(non_space("=SUM(A:C)")[3], (Reference, "A:C".into()));
        assert_eq!(non_space("=SUM($2:3)")[3], (Reference, "$2:3".into()));
    }

    #[test]
    fn test_sheet_prefixes() {
        use TokenKind::*;
        assert_eq!(non_space("=Sheet2!A1")[1], (Reference, "Sheet2!A1".into()));
        assert_eq!(
            non_space("='Bob''s Sheet'!A1:B2")[1],
            (Reference, "'Bob''s Sheet'!A1:B2".into())
        );
    }

    #[test]
    fn test_mismatched_full_reference_falls_back() {
        use TokenKind::*;
        assert_eq!(
            non_space("=A:1"),
            vec![
                (Operator, "=".into()),
                (Symbol, "A".into()),
                (Operator, ":".into()),
                (Number, "1".into()),
            ]
        );
    }

    #[test]
    fn test_cell_then_column_is_not_fused() {
        use TokenKind::*;
        assert_eq!(
            non_space("=A1:B"),
            vec![
                (Operator, "=".into()),
                (Reference, "A1".into()),
                (Operator, ":".into()),
                (Symbol, "B".into()),
            ]
        );
    }

    #[test]
    fn test_function_name_that_looks_like_cell() {
        use TokenKind::*;
        assert_eq!(non_space("=LOG10(100)")[1], (Symbol, "LOG10".into()));
    }

    #[test]
    fn test_booleans() {
        use TokenKind::*;
        assert_eq!(non_space("=true")[1], (Boolean, "true".into()));
        assert_eq!(non_space("=TRUE()")[1], (Symbol, "TRUE".into()));
    }

    #[test]
    fn test_strings_with_escapes() {
        use TokenKind::*;
        assert_eq!(non_space(r#"="a\"b""#)[1], (String, r#""a\"b""#.into()));
        assert_eq!(non_space("='hello'")[1], (String, "'hello'".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("=\"abc", &Locale::default()).unwrap_err();
        assert_eq!(err.position, 1);
    }

    #[test]
    fn test_unexpected_character() {
        assert!(tokenize("=A1 @ 2", &Locale::default()).is_err());
        assert!(tokenize("=1;2", &Locale::default()).is_err());
    }

    #[test]
    fn test_numbers() {
        use TokenKind::*;
        assert_eq!(non_space("=1.5e3")[1], (Number, "1.5e3".into()));
        assert_eq!(non_space("=.5")[1], (Number, ".5".into()));
    }

    #[test]
    fn test_comma_decimal_locale() {
        use TokenKind::*;
        let tokens: Vec<_> = tokenize("=SUM(1,5;A1)", &Locale::comma_decimal())
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.canonical_text()))
            .collect();
        assert_eq!(
            tokens,
            vec![
                (Operator, "=".into()),
                (Symbol, "SUM".into()),
                (LeftParen, "(".into()),
                (Number, "1.5".into()),
                (Comma, ",".into()),
                (Reference, "A1".into()),
                (RightParen, ")".into()),
            ]
        );
    }

    #[test]
    fn test_invalid_reference_literal() {
        use TokenKind::*;
        assert_eq!(non_space("=#REF+1")[1], (Reference, "#REF".into()));
    }

    #[test]
    fn test_dotted_function_name() {
        use TokenKind::*;
        assert_eq!(non_space("=CURRENCY.RATE(\"EUR\",\"USD\")")[1], (Symbol, "CURRENCY.RATE".into()));
    }

    #[test]
    fn test_comparison_operators() {
        use TokenKind::*;
        let ops: Vec<_> = non_space("=1<>2<=3>=4")
            .into_iter()
            .filter(|(k, _)| *k == Operator)
            .map(|(_, v)| v)
            .collect();
        assert_eq!(ops, vec!["=", "<>", "<=", ">="]);
    }

    #[test]
    fn test_locale_round_trip() {
        let locale = Locale::comma_decimal();
        let canonical = canonicalize_formula("=SUM(1,5; A1)", &locale);
        assert_eq!(canonical, "=SUM(1.5, A1)");
        assert_eq!(localize_formula(&canonical, &locale), "=SUM(1,5; A1)");
        assert_eq!(canonicalize_formula("1,5", &locale), "1,5");
    }
}
