//! Filter-graph intermediate representation.
//!
//! Pipelines are assembled as [`FilterGraph`] values and rendered to the
//! engine's textual `-filter_complex` syntax only at the end. All quoting
//! happens in [`FilterValue::render`] so callers never build filter strings
//! by hand.

use std::fmt;

/// A filter argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    /// Free text (captions). Escaped at both option and graph level.
    Text(String),
    /// Expression or bare token evaluated by the filter itself
    /// (`(w-text_w)/2`, `cline`, `black`). Escaped at graph level only.
    Expr(String),
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        FilterValue::Text(value.into())
    }

    pub fn expr(value: impl Into<String>) -> Self {
        FilterValue::Expr(value.into())
    }

    /// Render to filter-graph syntax.
    pub fn render(&self) -> String {
        match self {
            FilterValue::Int(v) => v.to_string(),
            FilterValue::Float(v) => format_float(*v),
            FilterValue::Text(v) => escape_filter_value(v),
            FilterValue::Expr(v) => escape_graph(v),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        FilterValue::Int(i64::from(v))
    }
}

impl From<usize> for FilterValue {
    fn from(v: usize) -> Self {
        FilterValue::Int(v as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Expr(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Expr(v)
    }
}

/// Floats are rendered with at most three decimals, trailing zeros trimmed.
fn format_float(v: f64) -> String {
    let v = if v.is_finite() { v } else { 0.0 };
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Escape free text for embedding as a filter option value inside a
/// filter graph.
///
/// Two levels apply: option-value escaping (`\ ' : = %`) then graph
/// escaping (`\ ' [ ] , ;`). Newlines are flattened to spaces.
pub fn escape_filter_value(value: &str) -> String {
    let mut option_level = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' | '\'' | ':' | '=' | '%' => {
                option_level.push('\\');
                option_level.push(c);
            }
            '\n' | '\r' | '\t' => option_level.push(' '),
            c if c.is_control() => {}
            c => option_level.push(c),
        }
    }
    escape_graph(&option_level)
}

fn escape_graph(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// One filter with ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<(Option<String>, FilterValue)>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Add a `key=value` argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.args.push((Some(key.into()), value.into()));
        self
    }

    /// Add an optional `key=value` argument.
    pub fn arg_opt<V: Into<FilterValue>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.arg(key, v),
            None => self,
        }
    }

    /// Add a positional argument.
    pub fn positional(mut self, value: impl Into<FilterValue>) -> Self {
        self.args.push((None, value.into()));
        self
    }

    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.name.clone();
        }
        let args: Vec<String> = self
            .args
            .iter()
            .map(|(key, value)| match key {
                Some(k) => format!("{}={}", k, value.render()),
                None => value.render(),
            })
            .collect();
        format!("{}={}", self.name, args.join(":"))
    }
}

/// A linear chain of filters between labelled pads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn inputs<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for label in &self.inputs {
            out.push_str(&format!("[{}]", label));
        }
        let filters: Vec<String> = self.filters.iter().map(Filter::render).collect();
        out.push_str(&filters.join(","));
        for label in &self.outputs {
            out.push_str(&format!("[{}]", label));
        }
        out
    }
}

/// A complete `-filter_complex` graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn render(&self) -> String {
        self.chains
            .iter()
            .map(FilterChain::render)
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_text() {
        assert_eq!(escape_filter_value("Hello world"), "Hello world");
    }

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(escape_filter_value("a:b"), "a\\\\:b");
        assert_eq!(escape_filter_value("it's"), "it\\\\\\'s");
        assert_eq!(escape_filter_value("a,b;c"), "a\\,b\\;c");
        assert_eq!(escape_filter_value("[x]"), "\\[x\\]");
        assert_eq!(escape_filter_value("100%"), "100\\\\%");
        assert_eq!(escape_filter_value("two\nlines"), "two lines");
    }

    #[test]
    fn test_escape_backslash() {
        // One backslash survives both unescaping passes
        assert_eq!(escape_filter_value("a\\b"), "a\\\\\\\\b");
    }

    #[test]
    fn test_injection_stays_inside_value() {
        let hostile = "x';[0:v]nullsink;[a]";
        let rendered = Filter::new("drawtext").arg("text", FilterValue::text(hostile)).render();
        // No unescaped graph separators survive
        let unescaped: Vec<char> = {
            let mut out = Vec::new();
            let mut chars = rendered.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    chars.next();
                } else {
                    out.push(c);
                }
            }
            out
        };
        assert!(!unescaped.contains(&';'));
        assert!(!unescaped.contains(&'['));
        assert!(!unescaped.contains(&'\''));
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(FilterValue::from(20.0).render(), "20");
        assert_eq!(FilterValue::from(0.25).render(), "0.25");
        assert_eq!(FilterValue::from(-1.5).render(), "-1.5");
        assert_eq!(FilterValue::from(1.0 / 3.0).render(), "0.333");
        assert_eq!(FilterValue::from(-0.0001).render(), "0");
    }

    #[test]
    fn test_render_graph() {
        let mut graph = FilterGraph::new();
        graph.push(
            FilterChain::new()
                .input("0:v")
                .filter(Filter::new("scale").positional(1080u32).positional(1920u32))
                .filter(Filter::new("setsar").positional(1u32))
                .output("bg"),
        );
        graph.push(
            FilterChain::new()
                .inputs(["1:a", "2:a"])
                .filter(Filter::new("amix").arg("inputs", 2u32).arg("duration", "first"))
                .output("aout"),
        );

        assert_eq!(
            graph.render(),
            "[0:v]scale=1080:1920,setsar=1[bg];[1:a][2:a]amix=inputs=2:duration=first[aout]"
        );
    }

    #[test]
    fn test_expr_escapes_commas() {
        let filter = Filter::new("crop").arg("x", "max((iw-ow)/2,0)");
        assert_eq!(filter.render(), "crop=x=max((iw-ow)/2\\,0)");
        assert_eq!(Filter::new("anull").render(), "anull");
    }
}
