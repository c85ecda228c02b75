//! Text to token conversion.
//!
//! Two rules live here. Queries are lower-cased and split on whitespace,
//! nothing else. Corpus text goes through the stricter dump rule, which
//! splits on ASCII punctuation and digits and drops very short or very long
//! tokens. Raw wiki text is passed through `strip_markup` first.

/// Shortest corpus token kept, in bytes.
pub const MIN_TOKEN_BYTES: usize = 2;
/// Corpus tokens must be shorter than this, in bytes.
pub const MAX_TOKEN_BYTES: usize = 16;

/// Query tokenizer: lower-case, whitespace split.
///
/// # Examples
/// ```
/// use lsi_search::vectorizer::analyzer::tokenize_query;
/// assert_eq!(tokenize_query("Cat  CAT\tdog"), vec!["cat", "cat", "dog"]);
/// ```
pub fn tokenize_query(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Delimiter bytes of the corpus rule
/// 0..=64 (controls, space, punctuation, digits), `[\]^`, backtick, `{|}~`
/// `_` and every byte >= 127 are word bytes
#[inline]
fn is_corpus_delimiter(b: u8) -> bool {
    b <= 64 || (91..=94).contains(&b) || b == 96 || (123..=126).contains(&b)
}

/// Corpus tokenizer
/// Tokens keep `MIN_TOKEN_BYTES <= len < MAX_TOKEN_BYTES` and are ASCII lower-cased.
///
/// Delimiters are all ASCII, so every cut falls on a UTF-8 boundary.
pub fn tokenize_corpus(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;
    for (pos, &b) in bytes.iter().enumerate() {
        if is_corpus_delimiter(b) {
            push_corpus_token(&text[start..pos], &mut tokens);
            start = pos + 1;
        }
    }
    push_corpus_token(&text[start..], &mut tokens);
    tokens
}

#[inline]
fn push_corpus_token(token: &str, tokens: &mut Vec<String>) {
    let len = token.len();
    if (MIN_TOKEN_BYTES..MAX_TOKEN_BYTES).contains(&len) {
        tokens.push(token.to_ascii_lowercase());
    }
}

/// Remove wiki markup from an article body, in this order:
/// `<!-- comments -->`, `{{templates}}` (nested), `[[links]]`,
/// `[http://url description]` and `<tags>` (`<math>` with its content).
///
/// Links keep the text after their last `|`; a link whose target has a
/// namespace (`[[Category:...]]`) and no `|` is dropped. External links keep
/// their description. Unterminated markup drops the rest of the text.
///
/// # Examples
/// ```
/// use lsi_search::vectorizer::analyzer::strip_markup;
/// let text = "A [[Felis catus|cat]] {{cite web|url=x}}<ref>pet</ref>";
/// assert_eq!(strip_markup(text), "A cat pet");
/// ```
pub fn strip_markup(text: &str) -> String {
    let text = strip_comments(text);
    let text = strip_templates(&text);
    let text = strip_wiki_links(&text);
    let text = strip_external_links(&text);
    strip_html_tags(&text)
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("<!--") {
        out.push_str(&rest[..open]);
        match rest[open + 4..].find("-->") {
            Some(close) => rest = &rest[open + 4 + close + 3..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn strip_templates(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if depth == 0 && rest.starts_with("{{") {
            depth = 2;
            rest = &rest[2..];
            continue;
        }
        rest = &rest[c.len_utf8()..];
        match (depth, c) {
            (0, _) => out.push(c),
            (_, '{') => depth += 1,
            (_, '}') => depth -= 1,
            _ => {}
        }
    }
    out
}

#[derive(Default)]
struct WikiLink {
    text: String,
    piped: bool,
    ignore: bool,
}

fn strip_wiki_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut open: Vec<WikiLink> = Vec::new();
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if rest.starts_with("[[") {
            open.push(WikiLink::default());
            rest = &rest[2..];
            continue;
        }
        if rest.starts_with("]]") {
            if let Some(link) = open.pop() {
                let kept = if link.ignore { "" } else { link.text.as_str() };
                match open.last_mut() {
                    Some(outer) => outer.text.push_str(kept),
                    None => out.push_str(kept),
                }
                rest = &rest[2..];
                continue;
            }
        }
        rest = &rest[c.len_utf8()..];
        match open.last_mut() {
            None => out.push(c),
            Some(link) if c == '|' => {
                link.text.clear();
                link.piped = true;
                link.ignore = false;
            }
            Some(link) => {
                if c == ':' && !link.piped {
                    link.ignore = true;
                }
                link.text.push(c);
            }
        }
    }
    out
}

fn strip_external_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else {
            return out;
        };
        if let Some((_, description)) = rest[..close].split_once(' ') {
            out.push_str(description);
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn strip_html_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let is_math = rest
            .get(..4)
            .is_some_and(|name| name.eq_ignore_ascii_case("math"));
        let Some(close) = rest.find('>') else {
            return out;
        };
        rest = &rest[close + 1..];
        if is_math {
            match rest.find("</math>") {
                Some(end) => rest = &rest[end + "</math>".len()..],
                None => return out,
            }
        }
    }
    out.push_str(rest);
    out
}
