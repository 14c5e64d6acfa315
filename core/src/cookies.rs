//! `Cookie` header parsing.

use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;

/// Parse a `Cookie` header into a name → value mapping.
///
/// Names are trimmed but not decoded. Values lose surrounding double quotes
/// and are percent-decoded, keeping the raw text when the decoded bytes are
/// not UTF-8. The first occurrence of a name wins and pairs without `=` are
/// skipped. A missing header yields an empty mapping.
#[must_use]
pub fn parse(header: Option<&str>) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    let Some(header) = header else {
        return cookies;
    };

    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || cookies.contains_key(name) {
            continue;
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .unwrap_or(value);

        cookies.insert(name.to_owned(), decode(value));
    }

    cookies
}

fn decode(value: &str) -> String {
    if !value.contains('%') {
        return value.to_owned();
    }
    percent_decode_str(value)
        .decode_utf8()
        .map_or_else(|_| value.to_owned(), |decoded| decoded.into_owned())
}
