//! The sandboxed string-mangling mini-language used by watch-file option
//! lists (`uversionmangle`, `filenamemangle`, `downloadurlmangle`, ...):
//! `s<sep>REGEX<sep>REPL<sep>FLAGS` and `tr<sep>SRC<sep>DST<sep>FLAGS` (`y`
//! is accepted as a `tr` alias), in either symmetric-delimiter or
//! balanced-bracket form.

use regex::Regex;

const BRACKETS: [(char, char); 4] = [('{', '}'), ('[', ']'), ('(', ')'), ('<', '>')];

#[derive(Debug, Clone)]
enum Rule {
    Subst { regex: String, repl: String, global: bool, ignore_case: bool, extended: bool },
    Tr { src: String, dst: String, complement: bool, delete: bool, squeeze: bool },
}

/// Apply a single rule. On any malformed input the original string is
/// returned unchanged and a warning is logged, matching the "reject and
/// leave input unchanged" contract.
pub fn apply(rule_text: &str, input: &str) -> String {
    match parse_rule(rule_text) {
        Some(rule) => run_rule(&rule, input),
        None => {
            log::warn!("[mangle] malformed or unsafe rule, ignoring: {}", rule_text);
            input.to_string()
        }
    }
}

/// Apply a whitespace-separated list of rules in order, left to right.
pub fn apply_list(rules: &str, input: &str) -> String {
    let mut value = input.to_string();
    for rule in rules.split_whitespace() {
        value = apply(rule, &value);
    }
    value
}

fn parse_rule(text: &str) -> Option<Rule> {
    let text = text.trim();
    let (op, rest) = if let Some(rest) = text.strip_prefix('s') {
        ("s", rest)
    } else if let Some(rest) = text.strip_prefix("tr") {
        ("tr", rest)
    } else if let Some(rest) = text.strip_prefix('y') {
        ("tr", rest)
    } else {
        return None;
    };

    let rest = rest.trim_start();
    let mut chars = rest.chars();
    let opener = chars.next()?;

    if let Some(&(_, closer)) = BRACKETS.iter().find(|(o, _)| *o == opener) {
        return parse_balanced(op, rest, opener, closer);
    }

    if opener.is_alphanumeric() || opener == '\\' {
        return None;
    }

    parse_symmetric(op, rest, opener)
}

fn parse_symmetric(op: &str, rest: &str, sep: char) -> Option<Rule> {
    // rest begins with `sep`; split on the remaining occurrences of `sep`.
    let body = &rest[sep.len_utf8()..];
    let parts: Vec<&str> = split_unescaped(body, sep);
    if parts.len() != 3 {
        return None;
    }
    build_rule(op, parts[0], parts[1], parts[2])
}

fn parse_balanced(op: &str, rest: &str, opener: char, closer: char) -> Option<Rule> {
    let (first, after_first) = take_balanced(rest, opener, closer)?;
    let after_first = after_first.trim_start();
    let mut chars = after_first.chars();
    let opener2 = chars.next()?;
    if let Some(&(_, closer2)) = BRACKETS.iter().find(|(o, _)| *o == opener2) {
        let (second, after_second) = take_balanced(after_first, opener2, closer2)?;
        let flags = after_second.trim();
        if flags.chars().any(|c| !is_allowed_flag(op, c)) {
            return None;
        }
        if op == "s" && second.is_empty() {
            return None;
        }
        build_rule(op, &first, &second, flags)
    } else {
        None
    }
}

fn take_balanced(text: &str, opener: char, closer: char) -> Option<(String, &str)> {
    let mut chars = text.char_indices();
    let (i0, c0) = chars.next()?;
    if c0 != opener {
        return None;
    }
    let mut depth = 1usize;
    for (i, c) in chars {
        if c == opener && opener != closer {
            depth += 1;
        } else if c == closer {
            depth -= 1;
            if depth == 0 {
                let body = &text[i0 + opener.len_utf8()..i];
                return Some((body.to_string(), &text[i + closer.len_utf8()..]));
            }
        }
    }
    None
}

fn split_unescaped(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == sep {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_allowed_flag(op: &str, c: char) -> bool {
    match op {
        "s" => matches!(c, 'g' | 'i' | 'x'),
        "tr" => matches!(c, 'c' | 'd' | 's'),
        _ => false,
    }
}

fn build_rule(op: &str, a: &str, b: &str, flags: &str) -> Option<Rule> {
    if flags.chars().any(|c| !is_allowed_flag(op, c)) {
        return None;
    }
    match op {
        "s" => Some(Rule::Subst {
            regex: a.to_string(),
            repl: b.to_string(),
            global: flags.contains('g'),
            ignore_case: flags.contains('i'),
            extended: flags.contains('x'),
        }),
        "tr" => Some(Rule::Tr {
            src: expand_ranges(a),
            dst: expand_ranges(b),
            complement: flags.contains('c'),
            delete: flags.contains('d'),
            squeeze: flags.contains('s'),
        }),
        _ => None,
    }
}

fn expand_ranges(set: &str) -> String {
    let chars: Vec<char> = set.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if i + 2 < chars.len() && chars[i + 1] == '-' && chars[i] <= chars[i + 2] {
            let (start, end) = (chars[i] as u32, chars[i + 2] as u32);
            for code in start..=end {
                if let Some(c) = char::from_u32(code) {
                    out.push(c);
                }
            }
            i += 3;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn run_rule(rule: &Rule, input: &str) -> String {
    match rule {
        Rule::Subst { regex, repl, global, ignore_case, extended } => {
            let mut pattern = String::new();
            if *ignore_case {
                pattern.push_str("(?i)");
            }
            if *extended {
                pattern.push_str("(?x)");
            }
            pattern.push_str(regex);
            match Regex::new(&pattern) {
                Ok(re) => {
                    let repl = translate_backrefs(repl);
                    if *global {
                        re.replace_all(input, repl.as_str()).into_owned()
                    } else {
                        re.replace(input, repl.as_str()).into_owned()
                    }
                }
                Err(e) => {
                    log::warn!("[mangle] invalid regex {:?}: {}", regex, e);
                    input.to_string()
                }
            }
        }
        Rule::Tr { src, dst, complement, delete, squeeze } => {
            transliterate(input, src, dst, *complement, *delete, *squeeze)
        }
    }
}

/// Perl-style `$1`/`\1` backreferences become the `regex` crate's `${1}`.
fn translate_backrefs(repl: &str) -> String {
    let mut out = String::new();
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        if (c == '$' || c == '\\') && matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
            let mut num = String::new();
            while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                num.push(chars.next().unwrap());
            }
            out.push_str(&format!("${{{}}}", num));
        } else {
            out.push(c);
        }
    }
    out
}

fn transliterate(input: &str, src: &str, dst: &str, complement: bool, delete: bool, squeeze: bool) -> String {
    let src_chars: Vec<char> = src.chars().collect();
    let dst_chars: Vec<char> = dst.chars().collect();

    let map_char = |c: char| -> Option<char> {
        let in_set = src_chars.contains(&c);
        let matched = in_set != complement;
        if !matched {
            return Some(c);
        }
        if dst_chars.is_empty() {
            return if delete { None } else { Some(c) };
        }
        let idx = if complement {
            dst_chars.len() - 1
        } else {
            src_chars.iter().position(|&s| s == c).unwrap_or(0).min(dst_chars.len() - 1)
        };
        Some(dst_chars[idx])
    };

    let mut out = String::new();
    let mut last: Option<char> = None;
    for c in input.chars() {
        match map_char(c) {
            Some(mapped) => {
                if squeeze && last == Some(mapped) {
                    continue;
                }
                out.push(mapped);
                last = Some(mapped);
            }
            None => {
                last = None;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_substitution() {
        assert_eq!(apply("s/foo/bar/", "foobaz"), "barbaz");
    }

    #[test]
    fn global_flag_replaces_all() {
        assert_eq!(apply("s/a/b/g", "banana"), "bbnbnb");
    }

    #[test]
    fn balanced_bracket_form() {
        assert_eq!(apply("s{v(\\d+)}{$1}", "v123"), "123");
    }

    #[test]
    fn unknown_flag_rejects_and_leaves_input() {
        assert_eq!(apply("s/a/b/z", "abc"), "abc");
    }

    #[test]
    fn unbalanced_brackets_reject() {
        assert_eq!(apply("s{foo}{bar", "foo"), "foo");
    }

    #[test]
    fn transliteration_basic_range() {
        assert_eq!(apply("tr/A-Z/a-z/", "HELLO"), "hello");
    }

    #[test]
    fn transliteration_delete() {
        assert_eq!(apply("tr/0-9//d", "v1.2.3"), "v..");
    }

    #[test]
    fn transliteration_squeeze() {
        assert_eq!(apply("tr/a/a/s", "baaanaaana"), "banana");
    }

    #[test]
    fn apply_list_chains_rules() {
        assert_eq!(apply_list("s/^v//  s/-/./g", "v1-2-3"), "1.2.3");
    }
}
