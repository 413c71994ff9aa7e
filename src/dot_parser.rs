//! Minimal DOT reader for pipeline graphs.
//!
//! Supported subset:
//!
//! ```text
//! digraph name {
//!   graph [channel_capacity=1000, failure_policy=isolate_branch];
//!   node [copies=2];                        // defaults for nodes declared after
//!   gen  [type=generate_rows, config="{\"limit\": 10}"];
//!   load [type=dimension_key, config="{\"keys\": [\"id\"]}", cache_size=100];
//!   gen -> load -> sink [distribution=keyed, keys="id"];
//!   load -> rejects [error=true];
//! }
//! ```
//!
//! Node attributes other than `type`, `copies`, `fan_out`/`distribute` and `config` are
//! merged into the node's JSON config; unquoted values that parse as JSON (numbers,
//! booleans) keep their JSON type. `label`, `shape`, `color` and `style` are ignored.

use crate::error::GraphError;
use crate::types::{Distribution, EdgeRecord, FanOut, GraphDescription, NodeRecord};
use tracing::instrument;

const COSMETIC_ATTRS: &[&str] = &["label", "shape", "color", "style", "fillcolor"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttrValue {
  pub(crate) text: String,
  pub(crate) quoted: bool,
}

type AttrList = Vec<(String, AttrValue)>;

struct Builder {
  desc: GraphDescription,
  /// Node declarations in first-seen order; repeated declarations merge.
  nodes: Vec<(String, AttrList)>,
  node_defaults: AttrList,
  edge_defaults: AttrList,
  edges: Vec<(String, String, AttrList)>,
}

/// Parses DOT source into a graph description. The result is not validated; see
/// [`crate::validate::validate`].
#[instrument(level = "trace", skip(source))]
pub fn parse_dot(source: &str) -> Result<GraphDescription, GraphError> {
  parse(source).map_err(GraphError::Parse)
}

fn parse(source: &str) -> Result<GraphDescription, String> {
  let source = strip_comments(source);
  let source = source.trim();
  let rest = source
    .strip_prefix("digraph")
    .ok_or("expected 'digraph' at start")?
    .trim_start();

  let (name, rest) = if rest.starts_with('{') {
    (None, rest)
  } else {
    let (name, rest) = parse_id(rest).ok_or("expected graph name")?;
    (Some(name), rest.trim_start())
  };
  let mut remaining = rest
    .strip_prefix('{')
    .ok_or("expected '{' after graph name")?
    .trim_start();

  let mut builder = Builder {
    desc: GraphDescription::new(name.as_deref().unwrap_or("pipeline")),
    nodes: Vec::new(),
    node_defaults: Vec::new(),
    edge_defaults: Vec::new(),
    edges: Vec::new(),
  };
  while !remaining.is_empty() && !remaining.starts_with('}') {
    remaining = parse_statement(remaining, &mut builder)?.trim_start();
  }
  if !remaining.starts_with('}') {
    return Err("expected '}' at end of graph".to_string());
  }
  builder.finish()
}

/// Strips `//`, `#` line comments and `/* */` block comments outside quoted strings.
pub(crate) fn strip_comments(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut chars = s.chars().peekable();
  let mut in_string = false;
  while let Some(c) = chars.next() {
    if in_string {
      out.push(c);
      if c == '\\' {
        if let Some(next) = chars.next() {
          out.push(next);
        }
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }
    match c {
      '"' => {
        in_string = true;
        out.push(c);
      }
      '/' if chars.peek() == Some(&'/') => {
        for next in chars.by_ref() {
          if next == '\n' {
            out.push('\n');
            break;
          }
        }
      }
      '#' => {
        for next in chars.by_ref() {
          if next == '\n' {
            out.push('\n');
            break;
          }
        }
      }
      '/' if chars.peek() == Some(&'*') => {
        chars.next();
        let mut prev = ' ';
        for next in chars.by_ref() {
          if prev == '*' && next == '/' {
            break;
          }
          prev = next;
        }
        out.push(' ');
      }
      _ => out.push(c),
    }
  }
  out
}

fn is_id_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Parses a bare identifier (letters, digits, `_`, `.`) or a quoted string.
pub(crate) fn parse_id(s: &str) -> Option<(String, &str)> {
  let s = s.trim_start();
  if s.starts_with('"') {
    return parse_quoted(s).ok();
  }
  let end = s.find(|c: char| !is_id_char(c)).unwrap_or(s.len());
  if end == 0 {
    return None;
  }
  Some((s[..end].to_string(), &s[end..]))
}

/// Parses `"..."` with `\"`, `\\`, `\n` and `\t` escapes.
fn parse_quoted(s: &str) -> Result<(String, &str), String> {
  let body = s.strip_prefix('"').ok_or("expected '\"'")?;
  let mut out = String::new();
  let mut chars = body.char_indices();
  while let Some((i, c)) = chars.next() {
    match c {
      '"' => return Ok((out, &body[i + 1..])),
      '\\' => match chars.next() {
        Some((_, 'n')) => out.push('\n'),
        Some((_, 't')) => out.push('\t'),
        Some((_, other)) => out.push(other),
        None => break,
      },
      _ => out.push(c),
    }
  }
  Err("unterminated string".to_string())
}

/// Parses an attribute value: quoted string, number or identifier.
pub(crate) fn parse_value(s: &str) -> Result<(AttrValue, &str), String> {
  let s = s.trim_start();
  if s.starts_with('"') {
    let (text, rest) = parse_quoted(s)?;
    return Ok((AttrValue { text, quoted: true }, rest));
  }
  let end = s
    .find(|c: char| !(is_id_char(c) || c == '-' || c == '+'))
    .unwrap_or(s.len());
  if end == 0 {
    return Err(format!("expected value at '{}'", preview(s)));
  }
  Ok((
    AttrValue {
      text: s[..end].to_string(),
      quoted: false,
    },
    &s[end..],
  ))
}

fn preview(s: &str) -> String {
  s.chars().take(20).collect()
}

fn end_statement(s: &str) -> &str {
  s.trim_start().trim_start_matches(';')
}

/// Parses `[key=value, ...]` (`,` or `;` separated).
fn parse_attr_block(s: &str) -> Result<(AttrList, &str), String> {
  let mut remaining = s
    .trim_start()
    .strip_prefix('[')
    .ok_or("expected '['")?
    .trim_start();
  let mut attrs = Vec::new();
  while !remaining.starts_with(']') {
    if remaining.is_empty() {
      return Err("unclosed attribute block".to_string());
    }
    let (key, rest) = parse_id(remaining).ok_or_else(|| {
      format!("expected attribute key at '{}'", preview(remaining))
    })?;
    let rest = rest
      .trim_start()
      .strip_prefix('=')
      .ok_or_else(|| format!("expected '=' after attribute '{}'", key))?;
    let (value, rest) = parse_value(rest)?;
    attrs.push((key, value));
    remaining = rest.trim_start().trim_start_matches([',', ';']).trim_start();
  }
  Ok((attrs, &remaining[1..]))
}

fn parse_statement<'a>(s: &'a str, builder: &mut Builder) -> Result<&'a str, String> {
  let (id, rest) =
    parse_id(s).ok_or_else(|| format!("expected statement at '{}'", preview(s)))?;
  let rest = rest.trim_start();
  match id.as_str() {
    "graph" if rest.starts_with('[') => {
      let (attrs, rest) = parse_attr_block(rest)?;
      for (k, v) in &attrs {
        builder.graph_attr(k, &v.text)?;
      }
      return Ok(end_statement(rest));
    }
    "node" if rest.starts_with('[') => {
      let (attrs, rest) = parse_attr_block(rest)?;
      builder.node_defaults.extend(attrs);
      return Ok(end_statement(rest));
    }
    "edge" if rest.starts_with('[') => {
      let (attrs, rest) = parse_attr_block(rest)?;
      builder.edge_defaults.extend(attrs);
      return Ok(end_statement(rest));
    }
    "subgraph" => return Err("subgraphs are not supported".to_string()),
    _ => {}
  }

  if let Some(value) = rest.strip_prefix('=') {
    let (value, rest) = parse_value(value)?;
    builder.graph_attr(&id, &value.text)?;
    return Ok(end_statement(rest));
  }
  if rest.starts_with("->") {
    return parse_edge_chain(id, rest, builder);
  }
  let (attrs, rest) = if rest.starts_with('[') {
    parse_attr_block(rest)?
  } else {
    (Vec::new(), rest)
  };
  builder.declare_node(&id, attrs);
  Ok(end_statement(rest))
}

/// `a -> b -> c [attrs]`: one edge per consecutive pair, all with the same attributes.
fn parse_edge_chain<'a>(
  first: String,
  mut s: &'a str,
  builder: &mut Builder,
) -> Result<&'a str, String> {
  let mut chain = vec![first];
  while let Some(rest) = s.strip_prefix("->") {
    let (to, rest) = parse_id(rest).ok_or("expected target node after '->'")?;
    chain.push(to);
    s = rest.trim_start();
  }
  let (attrs, rest) = if s.starts_with('[') {
    parse_attr_block(s)?
  } else {
    (Vec::new(), s)
  };
  let mut merged = builder.edge_defaults.clone();
  merged.extend(attrs);
  for pair in chain.windows(2) {
    builder
      .edges
      .push((pair[0].clone(), pair[1].clone(), merged.clone()));
  }
  Ok(end_statement(rest))
}

fn parse_bool(value: &str) -> Result<bool, String> {
  crate::config::parse_bool(value).ok_or_else(|| format!("expected a boolean, got '{}'", value))
}

fn attr_to_json(value: &AttrValue) -> serde_json::Value {
  if value.quoted {
    return serde_json::Value::String(value.text.clone());
  }
  serde_json::from_str(&value.text).unwrap_or_else(|_| serde_json::Value::String(value.text.clone()))
}

impl Builder {
  fn graph_attr(&mut self, key: &str, value: &str) -> Result<(), String> {
    let desc = &mut self.desc;
    match key {
      "name" => desc.name = value.to_string(),
      "label" | "rankdir" => {}
      _ => {
        if !desc.engine.set(key, value)? {
          return Err(format!("unknown graph attribute '{}'", key));
        }
      }
    }
    Ok(())
  }

  fn declare_node(&mut self, id: &str, attrs: AttrList) {
    match self.nodes.iter_mut().find(|(n, _)| n == id) {
      Some((_, existing)) => existing.extend(attrs),
      None => {
        let mut merged = self.node_defaults.clone();
        merged.extend(attrs);
        self.nodes.push((id.to_string(), merged));
      }
    }
  }

  fn finish(self) -> Result<GraphDescription, String> {
    let mut desc = self.desc;
    for (id, attrs) in &self.nodes {
      desc.nodes.push(build_node(id, attrs)?);
    }
    for (from, to, attrs) in &self.edges {
      desc.edges.push(build_edge(from, to, attrs)?);
    }
    Ok(desc)
  }
}

fn build_node(id: &str, attrs: &[(String, AttrValue)]) -> Result<NodeRecord, String> {
  let mut step_type = None;
  let mut node = NodeRecord::new(id, "");
  let mut config = serde_json::Map::new();
  for (k, v) in attrs {
    match k.as_str() {
      "type" => step_type = Some(v.text.clone()),
      "copies" => {
        node.copies = v
          .text
          .parse()
          .map_err(|_| format!("node '{}': copies must be a number, got '{}'", id, v.text))?;
      }
      "fan_out" => {
        node.fan_out = v
          .text
          .parse::<FanOut>()
          .map_err(|e| format!("node '{}': {}", id, e))?;
      }
      "distribute" => {
        node.fan_out = if parse_bool(&v.text).map_err(|e| format!("node '{}': {}", id, e))? {
          FanOut::Distribute
        } else {
          FanOut::Copy
        };
      }
      "config" => {
        let parsed: serde_json::Value = serde_json::from_str(&v.text)
          .map_err(|e| format!("node '{}': invalid config JSON: {}", id, e))?;
        let serde_json::Value::Object(map) = parsed else {
          return Err(format!("node '{}': config must be a JSON object", id));
        };
        config.extend(map);
      }
      k if COSMETIC_ATTRS.contains(&k) => {}
      _ => {
        config.insert(k.clone(), attr_to_json(v));
      }
    }
  }
  node.step_type = step_type.ok_or_else(|| format!("node '{}' has no type", id))?;
  if !config.is_empty() {
    node.config = serde_json::Value::Object(config);
  }
  Ok(node)
}

fn build_edge(from: &str, to: &str, attrs: &[(String, AttrValue)]) -> Result<EdgeRecord, String> {
  let mut edge = EdgeRecord::new(from, to);
  let mut policy = None;
  let mut keys = None;
  for (k, v) in attrs {
    match k.as_str() {
      "distribution" => policy = Some(v.text.clone()),
      "keys" => keys = Some(v.text.clone()),
      "error" => {
        edge.error = parse_bool(&v.text).map_err(|e| format!("edge {} -> {}: {}", from, to, e))?
      }
      k if COSMETIC_ATTRS.contains(&k) => {}
      other => return Err(format!("edge {} -> {}: unknown attribute '{}'", from, to, other)),
    }
  }
  if let Some(policy) = policy {
    edge.distribution = Distribution::parse(&policy, keys.as_deref())
      .map_err(|e| format!("edge {} -> {}: {}", from, to, e))?;
  } else if keys.is_some() {
    return Err(format!(
      "edge {} -> {}: keys need distribution=keyed",
      from, to
    ));
  }
  Ok(edge)
}
