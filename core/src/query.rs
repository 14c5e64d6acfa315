//! Querystring parsing with nested keys.
//!
//! Follows the widely used `qs` conventions:
//!
//! ```text
//! a=1&a=2          → { "a": ["1", "2"] }
//! a[]=1&a[]=2      → { "a": ["1", "2"] }
//! a[1]=y&a[0]=x    → { "a": ["x", "y"] }
//! a[b][c]=1        → { "a": { "b": { "c": "1" } } }
//! a.b=1            → { "a": { "b": "1" } }          (allow_dots)
//! ```
//!
//! Parsing never fails. Malformed pairs degrade to whatever can be read
//! from them, and percent-decoding is lossy.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Limits and switches for [`parse`].
///
/// # Default Values
///
/// - `depth`: 5
/// - `array_limit`: 20
/// - `parameter_limit`: 1000
/// - `allow_dots`: true
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of bracket segments split off a key. Anything deeper
    /// stays attached to the last segment as one literal key.
    pub depth: usize,
    /// Highest explicit index (`a[20]`) still read as a list position.
    pub array_limit: usize,
    /// Maximum number of `key=value` pairs read from one querystring.
    pub parameter_limit: usize,
    /// Whether `a.b` nests like `a[b]`.
    pub allow_dots: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            depth: 5,
            array_limit: 20,
            parameter_limit: 1000,
            allow_dots: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Append,
    Index(usize),
    Key(String),
}

/// Intermediate tree; `Indexed` keeps explicit positions until the end so
/// that `a[1]=y&a[0]=x` compacts in index order.
#[derive(Debug, Clone)]
enum Node {
    Leaf(String),
    Flag,
    List(Vec<Node>),
    Indexed(BTreeMap<usize, Node>),
    Map(Vec<(String, Node)>),
}

/// Parse a raw querystring (without the leading `?`) into a nested mapping.
#[must_use]
pub fn parse(raw: &str, options: &QueryOptions) -> Map<String, Value> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let mut root: Vec<(String, Node)> = Vec::new();

    for (key, value) in form_urlencoded::parse(raw.as_bytes()).take(options.parameter_limit) {
        if key.is_empty() {
            continue;
        }

        let mut segments = split_key(&key, options);
        let Some(Segment::Key(parent)) = segments.first().cloned() else {
            continue;
        };
        segments.remove(0);

        let node = build(&segments, value.into_owned());
        insert(&mut root, parent, node);
    }

    root.into_iter()
        .map(|(key, node)| (key, finish(node)))
        .collect()
}

/// Encode a mapping back into a querystring using bracket notation and
/// explicit list indices. `parse(&stringify(&m), ..)` yields `m` again for
/// mappings built only from strings, non-empty lists and non-empty maps.
#[must_use]
pub fn stringify(query: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in query {
        encode_into(&mut pairs, key.clone(), value);
    }
    pairs.join("&")
}

fn encode_into(pairs: &mut Vec<String>, prefix: String, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                encode_into(pairs, format!("{prefix}[{key}]"), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                encode_into(pairs, format!("{prefix}[{index}]"), child);
            }
        }
        Value::String(text) => pairs.push(format!("{}={}", encode(&prefix), encode(text))),
        Value::Null => pairs.push(format!("{}=", encode(&prefix))),
        other => pairs.push(format!("{}={}", encode(&prefix), encode(&other.to_string()))),
    }
}

fn encode(text: &str) -> String {
    form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

/// Split a decoded key into its parent and child segments.
fn split_key(key: &str, options: &QueryOptions) -> Vec<Segment> {
    let (head, mut rest) = match key.find('[') {
        Some(0) | None => (key, ""),
        Some(at) => key.split_at(at),
    };

    let mut segments: Vec<Segment> = Vec::new();
    if options.allow_dots {
        let mut parts = dotted(head).into_iter();
        if let Some(first) = parts.next() {
            segments.push(Segment::Key(first));
        }
        segments.extend(parts.map(|part| child_segment(part, options)));
    } else {
        segments.push(Segment::Key(head.to_owned()));
    }

    let mut children = segments.len() - 1;
    while !rest.is_empty() {
        if children >= options.depth {
            segments.push(Segment::Key(rest.to_owned()));
            break;
        }
        let closed = rest.strip_prefix('[').and_then(|inner| {
            inner
                .find(']')
                .filter(|&end| !inner[..end].contains('['))
                .map(|end| (&inner[..end], &inner[end + 1..]))
        });
        match closed {
            Some((name, tail)) => {
                segments.push(child_segment(name.to_owned(), options));
                children += 1;
                rest = tail;
            }
            None => {
                segments.push(Segment::Key(rest.to_owned()));
                break;
            }
        }
    }

    segments
}

/// `a.b.c` → `["a", "b", "c"]`; a dot only splits when a name follows it.
fn dotted(head: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = head.chars().peekable();
    while let Some(ch) = chars.next() {
        let splits = ch == '.' && chars.peek().is_some_and(|next| *next != '.' && *next != '[');
        if splits {
            parts.push(String::new());
        } else if let Some(last) = parts.last_mut() {
            last.push(ch);
        }
    }
    parts
}

fn child_segment(name: String, options: &QueryOptions) -> Segment {
    if name.is_empty() {
        return Segment::Append;
    }
    match name.parse::<usize>() {
        Ok(index) if index <= options.array_limit && index.to_string() == name => {
            Segment::Index(index)
        }
        _ => Segment::Key(name),
    }
}

fn build(segments: &[Segment], value: String) -> Node {
    let Some((first, rest)) = segments.split_first() else {
        return Node::Leaf(value);
    };
    let child = build(rest, value);
    match first {
        Segment::Append => Node::List(vec![child]),
        Segment::Index(index) => Node::Indexed(BTreeMap::from([(*index, child)])),
        Segment::Key(key) => Node::Map(vec![(key.clone(), child)]),
    }
}

fn insert(entries: &mut Vec<(String, Node)>, key: String, node: Node) {
    if let Some(slot) = entries.iter_mut().find(|(existing, _)| *existing == key) {
        let current = std::mem::replace(&mut slot.1, Node::Flag);
        slot.1 = merge(current, node);
    } else {
        entries.push((key, node));
    }
}

fn merge(target: Node, source: Node) -> Node {
    match (target, source) {
        (Node::Map(mut entries), Node::Map(more)) => {
            for (key, node) in more {
                insert(&mut entries, key, node);
            }
            Node::Map(entries)
        }
        (Node::Map(mut entries), Node::Indexed(more)) => {
            for (index, node) in more {
                insert(&mut entries, index.to_string(), node);
            }
            Node::Map(entries)
        }
        (Node::Map(mut entries), Node::Leaf(flag)) => {
            insert(&mut entries, flag, Node::Flag);
            Node::Map(entries)
        }
        (Node::Indexed(mut slots), Node::Indexed(more)) => {
            for (index, node) in more {
                let merged = match slots.remove(&index) {
                    Some(existing) => merge(existing, node),
                    None => node,
                };
                slots.insert(index, merged);
            }
            Node::Indexed(slots)
        }
        (Node::Indexed(slots), Node::Map(more)) => {
            let entries = slots
                .into_iter()
                .map(|(index, node)| (index.to_string(), node))
                .collect();
            merge(Node::Map(entries), Node::Map(more))
        }
        (Node::Indexed(slots), other) => merge(Node::List(slots.into_values().collect()), other),
        (Node::List(mut items), Node::List(more)) => {
            items.extend(more);
            Node::List(items)
        }
        (Node::List(mut items), Node::Indexed(more)) => {
            items.extend(more.into_values());
            Node::List(items)
        }
        (Node::List(mut items), other) => {
            items.push(other);
            Node::List(items)
        }
        (scalar, Node::List(more)) => {
            let mut items = vec![scalar];
            items.extend(more);
            Node::List(items)
        }
        (scalar, Node::Indexed(more)) => {
            let mut items = vec![scalar];
            items.extend(more.into_values());
            Node::List(items)
        }
        (scalar, other) => Node::List(vec![scalar, other]),
    }
}

fn finish(node: Node) -> Value {
    match node {
        Node::Leaf(text) => Value::String(text),
        Node::Flag => Value::Bool(true),
        Node::List(items) => Value::Array(items.into_iter().map(finish).collect()),
        Node::Indexed(slots) => Value::Array(slots.into_values().map(finish).collect()),
        Node::Map(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(key, node)| (key, finish(node)))
                .collect(),
        ),
    }
}
