//! Minimal XML helpers for SOAP envelopes and package manifests.
//!
//! The Metadata API responses are flat enough that tag scanning is
//! sufficient; these helpers never build a DOM.

/// Escape a string for safe inclusion in XML content.
///
/// This escapes the five predefined XML entities.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 16);
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Reverse of [`escape`].
#[must_use]
pub fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Opening tag candidates, with the namespace prefixes the API uses.
fn open_tags(tag: &str) -> [String; 4] {
    [
        format!("<{}>", tag),
        format!("<sf:{}>", tag),
        format!("<met:{}>", tag),
        format!("<tns:{}>", tag),
    ]
}

fn close_tag_at(haystack: &str, tag: &str) -> Option<(usize, usize)> {
    let plain = format!("</{}>", tag);
    let mut best: Option<(usize, usize)> = haystack.find(&plain).map(|idx| (idx, plain.len()));
    for prefix in ["sf", "met", "tns"] {
        let prefixed = format!("</{}:{}>", prefix, tag);
        if let Some(idx) = haystack.find(&prefixed) {
            if best.map_or(true, |(b, _)| idx < b) {
                best = Some((idx, prefixed.len()));
            }
        }
    }
    best
}

/// Extract the text of the first element named `tag`.
pub fn extract_element(xml: &str, tag: &str) -> Option<String> {
    let mut first: Option<(usize, usize)> = None;
    for open in open_tags(tag).iter() {
        if let Some(idx) = xml.find(open.as_str()) {
            if first.map_or(true, |(f, _)| idx < f) {
                first = Some((idx, open.len()));
            }
        }
    }
    let (start, len) = first?;
    let content = &xml[start + len..];
    let (end, _) = close_tag_at(content, tag)?;
    Some(unescape(content[..end].trim()))
}

/// Extract the text of every element named `tag`, in document order.
pub fn extract_elements(xml: &str, tag: &str) -> Vec<String> {
    extract_blocks(xml, tag)
        .into_iter()
        .map(|block| unescape(block.trim()))
        .collect()
}

/// Return the raw inner content of every `tag` element, in document order.
pub fn extract_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let mut blocks = Vec::new();
    let mut search_from = xml;

    while let Some(start) = search_from.find(&open) {
        let remaining = &search_from[start + open.len()..];
        match close_tag_at(remaining, tag) {
            Some((end, close_len)) => {
                blocks.push(&remaining[..end]);
                search_from = &remaining[end + close_len..];
            }
            None => break,
        }
    }
    blocks
}

/// Remove every `tag` element so scalar lookups only see the remaining fields.
pub fn strip_blocks(xml: &str, tag: &str) -> String {
    let open = format!("<{}>", tag);
    let mut out = String::with_capacity(xml.len());
    let mut search_from = xml;

    while let Some(start) = search_from.find(&open) {
        out.push_str(&search_from[..start]);
        let remaining = &search_from[start + open.len()..];
        match close_tag_at(remaining, tag) {
            Some((end, close_len)) => search_from = &remaining[end + close_len..],
            None => {
                search_from = &search_from[start..];
                break;
            }
        }
    }
    out.push_str(search_from);
    out
}

/// Parse an `xsd:boolean` element, defaulting to false.
pub fn extract_bool(xml: &str, tag: &str) -> bool {
    extract_element(xml, tag)
        .map(|s| s == "true")
        .unwrap_or(false)
}

/// Parse a numeric element, defaulting to zero.
pub fn extract_u32(xml: &str, tag: &str) -> u32 {
    extract_element(xml, tag)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
