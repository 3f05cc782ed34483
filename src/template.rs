//! # Argument Templates
//!
//! Renders command-line argument templates such as
//! `--listen-client-urls={{ .URL }}` against a read-only [`TemplateContext`].
//!
//! Supported syntax:
//!
//! - `{{ .Field }}` and `{{ .Field.Method }}` (URL methods: `String`, `Host`,
//!   `Hostname`, `Port`, `Scheme`, `Path`)
//! - `{{ if .Field }} ... {{ else }} ... {{ end }}`
//! - `{{-` / `-}}` to trim whitespace around an action
//!
//! Only exported (uppercase) context fields can be referenced. Rendering is
//! all-or-nothing: the first template that fails aborts the whole call.
//!
//! ```rust
//! use k8s_testing_framework::template::{render, TemplateContext};
//! use url::Url;
//!
//! let url = Url::parse("http://127.0.0.1:2379").unwrap();
//! let context = TemplateContext::new().with("URL", &url).with("DataDir", "/tmp/etcd");
//! let args = render(["--listen-client-urls={{ .URL }}", "--data-dir={{ .DataDir }}"], &context).unwrap();
//! assert_eq!(args, vec!["--listen-client-urls=http://127.0.0.1:2379", "--data-dir=/tmp/etcd"]);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template {template:?}: {reason}")]
    Syntax { template: String, reason: String },

    #[error("template {template:?}: can't evaluate field {field}")]
    UnknownField { template: String, field: String },

    #[error("template {template:?}: {field} is an unexported field of the template context")]
    UnexportedField { template: String, field: String },

    #[error("template {template:?}: can't evaluate {method} on {field} of kind {kind}")]
    InvalidMethod {
        template: String,
        field: String,
        method: String,
        kind: &'static str,
    },
}

/// A value a template can reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Nil,
    Bool(bool),
    Str(String),
    Url(Url),
}

impl TemplateValue {
    fn kind(&self) -> &'static str {
        match self {
            TemplateValue::Nil => "nil",
            TemplateValue::Bool(_) => "bool",
            TemplateValue::Str(_) => "string",
            TemplateValue::Url(_) => "url",
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Nil => false,
            TemplateValue::Bool(b) => *b,
            TemplateValue::Str(s) => !s.is_empty(),
            TemplateValue::Url(_) => true,
        }
    }

    fn render(&self) -> String {
        match self {
            TemplateValue::Nil => String::new(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Str(s) => s.clone(),
            TemplateValue::Url(url) => url_to_string(url),
        }
    }

    fn method(&self, name: &str) -> Option<TemplateValue> {
        let TemplateValue::Url(url) = self else {
            return None;
        };
        let value = match name {
            "String" => url_to_string(url),
            "Host" => url_host(url),
            "Hostname" => url_hostname(url),
            "Port" => url.port().map(|p| p.to_string()).unwrap_or_default(),
            "Scheme" => url.scheme().to_string(),
            "Path" => url.path().to_string(),
            _ => return None,
        };
        Some(TemplateValue::Str(value))
    }
}

impl From<Url> for TemplateValue {
    fn from(url: Url) -> Self {
        TemplateValue::Url(url)
    }
}

impl From<&Url> for TemplateValue {
    fn from(url: &Url) -> Self {
        TemplateValue::Url(url.clone())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::Str(s)
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::Str(s.to_string())
    }
}

impl From<&Path> for TemplateValue {
    fn from(path: &Path) -> Self {
        TemplateValue::Str(path.display().to_string())
    }
}

impl From<PathBuf> for TemplateValue {
    fn from(path: PathBuf) -> Self {
        TemplateValue::from(path.as_path())
    }
}

impl From<&PathBuf> for TemplateValue {
    fn from(path: &PathBuf) -> Self {
        TemplateValue::from(path.as_path())
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TemplateValue::Nil, Into::into)
    }
}

/// Read-only set of named values templates are rendered against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    fields: BTreeMap<String, TemplateValue>,
}

impl TemplateContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a field
    ///
    /// Names starting with a lowercase letter or `_` are unexported: they are
    /// stored but any template referencing them fails to render.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) {
        self.fields.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.fields.get(name)
    }
}

/// Render every template against `context`
///
/// # Errors
///
/// Returns the first [`TemplateError`]; no partial output is produced.
pub fn render<I, S>(templates: I, context: &TemplateContext) -> Result<Vec<String>, TemplateError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    templates
        .into_iter()
        .map(|template| render_one(template.as_ref(), context))
        .collect()
}

/// URL as a string, without the trailing `/` the `url` crate adds to bare origins
///
/// `http://127.0.0.1:2379/` is rejected by etcd as a listen URL, so
/// `http://127.0.0.1:2379` is produced instead.
#[must_use]
pub fn url_to_string(url: &Url) -> String {
    let s = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        s.strip_suffix('/').unwrap_or(s).to_string()
    } else {
        s.to_string()
    }
}

/// `host:port` (port omitted when not explicit)
fn url_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Host without port or IPv6 brackets
fn url_hostname(url: &Url) -> String {
    match url.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => String::new(),
    }
}

#[derive(Debug)]
enum Token {
    Text(String),
    Action(String),
}

#[derive(Debug)]
enum Node {
    Text(String),
    Field(Vec<String>),
    If {
        condition: Vec<String>,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Terminator {
    Eof,
    Else,
    End,
}

fn render_one(template: &str, context: &TemplateContext) -> Result<String, TemplateError> {
    let syntax = |reason: String| TemplateError::Syntax {
        template: template.to_string(),
        reason,
    };

    let tokens = lex(template).map_err(syntax)?;
    let mut pos = 0;
    let (nodes, terminator) = parse(&tokens, &mut pos).map_err(syntax)?;
    match terminator {
        Terminator::Eof => {}
        Terminator::Else => return Err(syntax("unexpected {{ else }}".to_string())),
        Terminator::End => return Err(syntax("unexpected {{ end }}".to_string())),
    }

    let mut out = String::new();
    execute(&nodes, context, template, &mut out)?;
    Ok(out)
}

fn lex(template: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut rest = template;
    let mut trim_next_text = false;

    while let Some(open) = rest.find("{{") {
        let mut text = rest[..open].to_string();
        if trim_next_text {
            text = text.trim_start().to_string();
        }

        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or_else(|| "unclosed action".to_string())?;
        let mut inner = &after_open[..close];

        let trim_left = inner.starts_with('-') && inner[1..].starts_with(char::is_whitespace);
        if trim_left {
            inner = &inner[1..];
            text = text.trim_end().to_string();
        }
        let trim_right = inner.ends_with('-') && inner[..inner.len() - 1].ends_with(char::is_whitespace);
        if trim_right {
            inner = &inner[..inner.len() - 1];
        }

        if !text.is_empty() {
            tokens.push(Token::Text(text));
        }
        tokens.push(Token::Action(inner.trim().to_string()));

        trim_next_text = trim_right;
        rest = &after_open[close + 2..];
    }

    let text = if trim_next_text { rest.trim_start() } else { rest };
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_string()));
    }
    Ok(tokens)
}

fn parse(tokens: &[Token], pos: &mut usize) -> Result<(Vec<Node>, Terminator), String> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.get(*pos) {
        *pos += 1;
        let body = match token {
            Token::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                continue;
            }
            Token::Action(body) => body.as_str(),
        };

        match body {
            "end" => return Ok((nodes, Terminator::End)),
            "else" => return Ok((nodes, Terminator::Else)),
            "" => return Err("missing value for command".to_string()),
            _ => {}
        }

        if let Some(condition) = body.strip_prefix("if ") {
            let condition = parse_field_path(condition.trim())?;
            let (then, terminator) = parse(tokens, pos)?;
            let otherwise = match terminator {
                Terminator::End => Vec::new(),
                Terminator::Else => match parse(tokens, pos)? {
                    (otherwise, Terminator::End) => otherwise,
                    (_, Terminator::Else) => return Err("unexpected {{ else }}".to_string()),
                    (_, Terminator::Eof) => return Err("unexpected EOF, missing {{ end }}".to_string()),
                },
                Terminator::Eof => return Err("unexpected EOF, missing {{ end }}".to_string()),
            };
            nodes.push(Node::If {
                condition,
                then,
                otherwise,
            });
            continue;
        }

        nodes.push(Node::Field(parse_field_path(body)?));
    }

    Ok((nodes, Terminator::Eof))
}

fn parse_field_path(body: &str) -> Result<Vec<String>, String> {
    let Some(path) = body.strip_prefix('.') else {
        return Err(format!("unsupported action {body:?}"));
    };
    if path.is_empty() {
        return Err("the whole context cannot be rendered; reference a field".to_string());
    }

    path.split('.')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Ok(segment.to_string())
            } else {
                Err(format!("bad field reference {body:?}"))
            }
        })
        .collect()
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn evaluate(
    path: &[String],
    context: &TemplateContext,
    template: &str,
) -> Result<TemplateValue, TemplateError> {
    let Some((field, methods)) = path.split_first() else {
        return Ok(TemplateValue::Nil);
    };

    let Some(mut value) = context.get(field).cloned() else {
        return Err(TemplateError::UnknownField {
            template: template.to_string(),
            field: field.clone(),
        });
    };
    if !is_exported(field) {
        return Err(TemplateError::UnexportedField {
            template: template.to_string(),
            field: field.clone(),
        });
    }

    for method in methods {
        value = value
            .method(method)
            .ok_or_else(|| TemplateError::InvalidMethod {
                template: template.to_string(),
                field: field.clone(),
                method: method.clone(),
                kind: value.kind(),
            })?;
    }
    Ok(value)
}

fn execute(
    nodes: &[Node],
    context: &TemplateContext,
    template: &str,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Field(path) => out.push_str(&evaluate(path, context, template)?.render()),
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                let branch = if evaluate(condition, context, template)?.is_truthy() {
                    then
                } else {
                    otherwise
                };
                execute(branch, context, template, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some_url() -> Url {
        Url::parse("https://the.host.name:3456").unwrap()
    }

    #[test]
    fn test_templates_urls() {
        let templates = [
            "plain URL: {{ .SomeURL }}",
            "method on URL: {{ .SomeURL.Hostname }}",
            "host and port: {{ .SomeURL.Host }}",
            "port: {{ .SomeURL.Port }}",
            "empty URL: {{ .EmptyURL }}",
            "handled empty URL: {{- if .EmptyURL }}{{ .EmptyURL }}{{ end }}",
        ];
        let context = TemplateContext::new()
            .with("SomeURL", some_url())
            .with("EmptyURL", None::<Url>);

        let out = render(templates, &context).unwrap();
        assert_eq!(
            out,
            vec![
                "plain URL: https://the.host.name:3456",
                "method on URL: the.host.name",
                "host and port: the.host.name:3456",
                "port: 3456",
                "empty URL: ",
                "handled empty URL:",
            ]
        );
    }

    #[test]
    fn test_templates_strings() {
        let templates = [
            "a string: {{ .SomeString }}",
            "empty string: {{- .EmptyString }}",
        ];
        let context = TemplateContext::new()
            .with("SomeString", "this is some random string")
            .with("EmptyString", "");

        let out = render(templates, &context).unwrap();
        assert_eq!(
            out,
            vec!["a string: this is some random string", "empty string:"]
        );
    }

    #[test]
    fn test_if_else_branches() {
        let context = TemplateContext::new()
            .with("Rbac", true)
            .with("Insecure", false);
        let out = render(
            [
                "--authorization-mode={{ if .Rbac }}RBAC{{ else }}AlwaysAllow{{ end }}",
                "{{ if .Insecure }}--insecure{{ else }}--secure{{ end }}",
            ],
            &context,
        )
        .unwrap();
        assert_eq!(out, vec!["--authorization-mode=RBAC", "--secure"]);
    }

    #[test]
    fn test_right_trim_marker() {
        let context = TemplateContext::new().with("A", "a");
        let out = render(["{{ .A -}}   tail"], &context).unwrap();
        assert_eq!(out, vec!["atail"]);
    }

    #[test]
    fn test_no_access_to_unexported_fields() {
        let templates = ["this is just a string", "this blows up {{ .test }}"];
        let context = TemplateContext::new().with("test", "ooops private");

        let err = render(templates, &context).unwrap_err();
        assert!(err.to_string().contains("is an unexported field"));
        assert!(matches!(err, TemplateError::UnexportedField { ref field, .. } if field == "test"));
    }

    #[test]
    fn test_unknown_field_errors_without_partial_output() {
        let templates = ["fine", "this does {{ .NotExist }}"];
        let context = TemplateContext::new().with("Unused", "unused");

        let result = render(templates, &context);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("can't evaluate field NotExist"));
        assert!(err.to_string().contains("this does {{ .NotExist }}"));
    }

    #[test]
    fn test_method_on_string_fails() {
        let context = TemplateContext::new().with("Dir", "/tmp");
        let err = render(["{{ .Dir.Port }}"], &context).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidMethod { kind: "string", .. }));
    }

    #[test]
    fn test_syntax_errors() {
        let context = TemplateContext::new().with("A", "a");
        for broken in [
            "{{ .A",
            "{{ if .A }}never closed",
            "{{ end }}",
            "{{ }}",
            "{{ A }}",
            "{{ . }}",
        ] {
            let err = render([broken], &context).unwrap_err();
            assert!(
                matches!(err, TemplateError::Syntax { .. }),
                "expected syntax error for {broken:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let context = TemplateContext::new()
            .with("URL", some_url())
            .with("Dir", "/data");
        let templates = ["--url={{ .URL }}", "--dir={{ .Dir }}", "--port={{ .URL.Port }}"];

        let first = render(templates, &context).unwrap();
        for _ in 0..10 {
            assert_eq!(render(templates, &context).unwrap(), first);
        }
    }

    #[test]
    fn test_url_to_string_drops_root_slash_only() {
        let origin = Url::parse("http://127.0.0.1:2379").unwrap();
        assert_eq!(url_to_string(&origin), "http://127.0.0.1:2379");

        let with_path = Url::parse("http://127.0.0.1:2379/some/path/").unwrap();
        assert_eq!(url_to_string(&with_path), "http://127.0.0.1:2379/some/path/");
    }

    #[test]
    fn test_ipv6_hostname_has_no_brackets() {
        let url = Url::parse("http://[::1]:8080").unwrap();
        let context = TemplateContext::new().with("URL", url);
        let out = render(["{{ .URL.Hostname }}", "{{ .URL.Host }}"], &context).unwrap();
        assert_eq!(out, vec!["::1", "[::1]:8080"]);
    }
}
