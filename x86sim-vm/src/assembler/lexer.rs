//! Line tokenization: split on whitespace/commas, strip comments, keep
//! single-quoted literals intact as one token.

/// One parsed line: an optional label, an optional mnemonic/directive, and
/// its operand tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    pub label: Option<String>,
    pub mnemonic: Option<String>,
    pub operands: Vec<String>,
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Split a line into raw tokens on whitespace and commas, keeping a
/// single-quoted run together as one token (quotes included).
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        if ch == '\'' {
            in_quotes = !in_quotes;
            current.push(ch);
            continue;
        }
        if !in_quotes && (ch.is_whitespace() || ch == ',') {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse one line of assembly text into its label/mnemonic/operand parts.
/// Blank and comment-only lines parse to an all-`None`/empty [`Line`].
pub fn parse_line(raw: &str) -> Line {
    let without_comment = strip_comment(raw);
    let mut tokens = tokenize(without_comment);
    if tokens.is_empty() {
        return Line::default();
    }

    let mut label = None;
    if tokens[0].ends_with(':') {
        let mut name = tokens.remove(0);
        name.pop();
        label = Some(name.to_lowercase());
    }

    if tokens.is_empty() {
        return Line { label, mnemonic: None, operands: vec![] };
    }

    let mnemonic = Some(tokens.remove(0).to_lowercase());
    Line { label, mnemonic, operands: tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_label_mnemonic_and_operands() {
        let line = parse_line("loop: mov ecx, 0 ; start the counter");
        assert_eq!(line.label.as_deref(), Some("loop"));
        assert_eq!(line.mnemonic.as_deref(), Some("mov"));
        assert_eq!(line.operands, vec!["ecx".to_string(), "0".to_string()]);
    }

    #[test]
    fn blank_and_comment_only_lines_are_empty() {
        assert_eq!(parse_line("   "), Line::default());
        assert_eq!(parse_line("; just a comment"), Line::default());
    }

    #[test]
    fn label_only_line_has_no_mnemonic() {
        let line = parse_line("_start:");
        assert_eq!(line.label.as_deref(), Some("_start"));
        assert_eq!(line.mnemonic, None);
    }

    #[test]
    fn quoted_literal_stays_one_token() {
        let line = parse_line("db 'hi there', 0");
        assert_eq!(line.mnemonic.as_deref(), Some("db"));
        assert_eq!(line.operands, vec!["'hi there'".to_string(), "0".to_string()]);
    }
}
