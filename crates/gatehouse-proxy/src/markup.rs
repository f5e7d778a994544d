//! Inline markup rewriting and origin discovery for HTML responses

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::csp::{AllowList, ResourceClass};
use crate::nonce::Nonces;

/// Attribute run of an opening tag: empty, or starting with whitespace or `/`.
/// Quoted values may contain `>`.
const TAG_ATTRIBUTES: &str = r#"((?:[\s/](?:[^>"']|"[^"]*"|'[^']*')*)?)"#;

/// Comments, then whole `<script>` / `<style>` elements. Element contents are
/// raw text, so tag-like strings inside a script body are never matched.
static INLINE_ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)<!--.*?-->|<(script){attrs}>.*?</script\s*>|<(style){attrs}>.*?</style\s*>",
        attrs = TAG_ATTRIBUTES
    ))
    .expect("inline element pattern is valid")
});

static RESOURCE_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)<!--.*?-->|<(script|link|img|source|iframe|frame){attrs}>",
        attrs = TAG_ATTRIBUTES
    ))
    .expect("resource tag pattern is valid")
});

static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

/// Attributes of a tag as `(lower-cased name, value)`; boolean attributes get an empty value
fn attributes(source: &str) -> Vec<(String, String)> {
    ATTRIBUTE_RE
        .captures_iter(source)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), value)
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Add `nonce` attributes to inline `<script>` and `<style>` elements.
///
/// Scripts with a `src` and any element that already declares a nonce are
/// left as written, as is everything inside HTML comments.
pub fn apply_nonces(html: &str, nonces: &Nonces) -> String {
    INLINE_ELEMENT_RE
        .replace_all(html, |caps: &Captures| {
            let whole = &caps[0];
            let (tag, raw_attrs, nonce) = match (caps.get(1), caps.get(3)) {
                (Some(tag), _) => (tag.as_str(), &caps[2], &nonces.script),
                (None, Some(tag)) => (tag.as_str(), &caps[4], &nonces.style),
                // Comment
                (None, None) => return whole.to_string(),
            };

            let attrs = attributes(raw_attrs);
            let is_script = tag.eq_ignore_ascii_case("script");
            if attribute(&attrs, "nonce").is_some()
                || (is_script && attribute(&attrs, "src").is_some())
            {
                return whole.to_string();
            }

            format!("<{} nonce=\"{}\"{}", tag, nonce, &whole[1 + tag.len()..])
        })
        .into_owned()
}

/// Absolute http(s) origin of a URL; relative references are covered by `'self'`
pub fn origin_of(reference: &str) -> Option<String> {
    let reference = reference.trim();
    let absolute = if reference.starts_with("//") {
        format!("https:{}", reference)
    } else {
        reference.to_string()
    };

    let url = Url::parse(&absolute).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url.origin().ascii_serialization()),
        _ => None,
    }
}

fn srcset_origins(srcset: &str) -> impl Iterator<Item = String> + '_ {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .filter_map(origin_of)
}

/// Collect the origins referenced by resource-loading elements
pub fn scan_origins(html: &str) -> AllowList {
    let mut found = AllowList::default();

    for caps in RESOURCE_TAG_RE.captures_iter(html) {
        let Some(tag) = caps.get(1) else {
            continue;
        };
        let tag = tag.as_str().to_ascii_lowercase();
        let attrs = attributes(&caps[2]);
        let src = attribute(&attrs, "src").and_then(origin_of);

        match tag.as_str() {
            "script" => {
                if let Some(origin) = src {
                    found.add(ResourceClass::Script, origin);
                }
            }
            "img" | "source" => {
                if let Some(origin) = src {
                    found.add(ResourceClass::Image, origin);
                }
                if let Some(srcset) = attribute(&attrs, "srcset") {
                    for origin in srcset_origins(srcset) {
                        found.add(ResourceClass::Image, origin);
                    }
                }
            }
            "iframe" | "frame" => {
                if let Some(origin) = src {
                    found.add(ResourceClass::Frame, origin);
                }
            }
            "link" => {
                let Some(origin) = attribute(&attrs, "href").and_then(origin_of) else {
                    continue;
                };
                if let Some(class) = link_class(&attrs) {
                    found.add(class, origin);
                }
            }
            _ => {}
        }
    }

    found
}

fn link_class(attrs: &[(String, String)]) -> Option<ResourceClass> {
    let rel = attribute(attrs, "rel").unwrap_or_default().to_ascii_lowercase();
    let rels: Vec<&str> = rel.split_whitespace().collect();
    let has = |value: &str| rels.contains(&value);

    if has("stylesheet") {
        return Some(ResourceClass::Style);
    }
    if has("preconnect") || has("dns-prefetch") {
        return Some(ResourceClass::Connect);
    }
    if has("modulepreload") {
        return Some(ResourceClass::Script);
    }
    if has("icon") || has("apple-touch-icon") {
        return Some(ResourceClass::Image);
    }
    if has("preload") {
        let destination = attribute(attrs, "as").unwrap_or_default().to_ascii_lowercase();
        return match destination.as_str() {
            "script" => Some(ResourceClass::Script),
            "style" => Some(ResourceClass::Style),
            "font" => Some(ResourceClass::Font),
            "image" => Some(ResourceClass::Image),
            "fetch" => Some(ResourceClass::Connect),
            _ => None,
        };
    }
    None
}
