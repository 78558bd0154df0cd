//! Resource template rendering
//!
//! Templates use minijinja syntax (`{{ var }}`, `{% if %}`) with strict
//! undefined handling: referencing a key that is not in the data bag fails
//! the render. Variable references written with a leading dot (`{{.name}}`)
//! are accepted and treated as `{{ name }}`.

pub mod error;
pub mod functions;

use std::collections::BTreeMap;
use std::path::Path;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use tracing::{error, info};

pub use error::TemplateError;

/// Renders resource templates with the helper function set
pub struct Renderer {
    env: Environment<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    /// Create a renderer with strict undefined handling and all helpers registered
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);

        env.add_function("publicKey", functions::public_key);
        env.add_function("privateKey", functions::private_key);
        env.add_function("getPEM", functions::get_pem);
        env.add_function("cert", functions::cert);
        env.add_function("base64Encode", functions::base64_encode);
        env.add_function("readFile", functions::read_file);
        env.add_function("elasticFileshares", functions::elastic_fileshares);
        env.add_function("unmarshallEFS", functions::elastic_fileshares);
        env.add_function("join", functions::join);
        env.add_function("trim", functions::trim);
        env.add_filter("base64Encode", functions::base64_encode);

        Self { env }
    }

    /// Render `template` for the named resource with `data`
    pub fn render(
        &self,
        name: &str,
        template: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let normalized = strip_leading_dots(template);
        self.env
            .render_named_str(name, &normalized, data)
            .map_err(TemplateError::from)
    }

    /// Render and optionally save the output to `export`.
    ///
    /// A failed write is logged; the rendered content is still returned.
    pub fn render_to(
        &self,
        name: &str,
        template: &str,
        data: &BTreeMap<String, String>,
        export: Option<&Path>,
    ) -> Result<String, TemplateError> {
        let rendered = self.render(name, template, data)?;
        if let Some(path) = export {
            info!(resource = %name, path = %path.display(), "saving manifest");
            if let Err(e) = std::fs::write(path, &rendered) {
                error!(resource = %name, path = %path.display(), error = %e, "failed to save manifest");
            }
        }
        Ok(rendered)
    }
}

/// Drop the leading dot of `.ident` references inside `{{ }}` and `{% %}`.
///
/// Dots that follow an identifier, a closing bracket or a digit are
/// attribute access or decimals and are kept; quoted strings are untouched.
fn strip_leading_dots(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = find_open(remaining) {
        let (open, close) = if remaining[start..].starts_with("{{") {
            ("{{", "}}")
        } else {
            ("{%", "%}")
        };
        result.push_str(&remaining[..start + open.len()]);
        remaining = &remaining[start + open.len()..];

        match remaining.find(close) {
            Some(end) => {
                result.push_str(&strip_expression_dots(&remaining[..end]));
                result.push_str(close);
                remaining = &remaining[end + close.len()..];
            }
            None => {
                result.push_str(remaining);
                remaining = "";
            }
        }
    }

    result.push_str(remaining);
    result
}

fn find_open(s: &str) -> Option<usize> {
    match (s.find("{{"), s.find("{%")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn strip_expression_dots(expr: &str) -> String {
    let mut result = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        match (ch, quote) {
            ('\'' | '"', None) => {
                quote = Some(ch);
                result.push(ch);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                result.push(ch);
            }
            ('.', None) => {
                let prev_is_value = result
                    .chars()
                    .last()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == ')' || c == ']');
                let next_is_ident = chars
                    .peek()
                    .is_some_and(|c| c.is_alphabetic() || *c == '_');
                if !(next_is_ident && !prev_is_value) {
                    result.push('.');
                }
            }
            _ => result.push(ch),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_dotted_references() {
        let renderer = Renderer::new();
        let out = renderer
            .render("opa", "cluster: {{.clusterName}}", &data(&[("clusterName", "demo01")]))
            .unwrap();
        assert_eq!(out, "cluster: demo01");
    }

    #[test]
    fn missing_key_fails_the_render() {
        let renderer = Renderer::new();
        let err = renderer
            .render("opa", "cluster: {{.clusterName}}", &data(&[]))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Render(_)));
        assert!(err.to_string().contains("undefined"));
    }

    #[rstest]
    #[case("{{ .a }}", "{{ a }}")]
    #[case("{{.a.b}}", "{{a.b}}")]
    #[case("{{ x | default('.hidden') }}", "{{ x | default('.hidden') }}")]
    #[case("{{ 1.5 }}", "{{ 1.5 }}")]
    #[case("{% if .enabled %}on{% endif %}", "{% if enabled %}on{% endif %}")]
    #[case("plain .text {{ join(.items, ',') }}", "plain .text {{ join(items, ',') }}")]
    #[case("{{ f(x).y }}", "{{ f(x).y }}")]
    fn normalizes_leading_dots(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_leading_dots(input), expected);
    }

    #[test]
    fn helpers_are_available() {
        let renderer = Renderer::new();
        let out = renderer
            .render(
                "helpers",
                "{{ base64Encode(name) }} {{ name | base64Encode }} [{{ trim(padded) }}]",
                &data(&[("name", "demo01"), ("padded", "  x  ")]),
            )
            .unwrap();
        assert_eq!(out, "ZGVtbzAx ZGVtbzAx [x]");
    }

    #[rstest]
    #[case("elasticFileshares")]
    #[case("unmarshallEFS")]
    fn elastic_fileshares_iterate(#[case] helper: &str) {
        let renderer = Renderer::new();
        let template = format!(
            "{{% for share in {}(shares) %}}{{{{ share.efs_id }}}};{{% endfor %}}",
            helper
        );
        let shares = r#"[{"efs_name":"a","efs_id":"fs-1","efs_region":"r","efs_dns":"d"},{"efs_name":"b","efs_id":"fs-2","efs_region":"r","efs_dns":"d"}]"#;
        let out = renderer
            .render("efs", &template, &data(&[("shares", shares)]))
            .unwrap();
        assert_eq!(out, "fs-1;fs-2;");
    }

    #[test]
    fn missing_certificate_fails_the_render() {
        let renderer = Renderer::new();
        let err = renderer
            .render(
                "certs",
                "{{ cert(certsPath, platform, 'ca') }}",
                &data(&[("certsPath", "/nonexistent"), ("platform", "eks")]),
            )
            .unwrap_err();
        let err = err.into_error("certs");
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn export_failure_still_returns_the_content() {
        let renderer = Renderer::new();
        let out = renderer
            .render_to(
                "opa",
                "name: {{ clusterName }}\n",
                &data(&[("clusterName", "demo01")]),
                Some(Path::new("/nonexistent/dir/opa.yaml")),
            )
            .unwrap();
        assert_eq!(out, "name: demo01\n");
    }

    #[test]
    fn export_writes_the_rendered_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opa.yaml");
        Renderer::new()
            .render_to(
                "opa",
                "name: {{ clusterName }}\n",
                &data(&[("clusterName", "demo01")]),
                Some(&path),
            )
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "name: demo01\n");
    }
}
