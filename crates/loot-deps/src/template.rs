//! Placeholder expansion for URLs, archive member globs and path prefixes.
//!
//! Supports the `{{.Version}}`, `{{.OS}}` and `{{.Arch}}` actions (inner
//! whitespace allowed). Templates are parsed once, when a dependency is
//! registered, so a broken manifest fails before anything is downloaded.

use crate::platform::Platform;
use crate::{DepsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Version,
    Os,
    Arch,
}

impl Field {
    fn from_action(action: &str) -> Option<Self> {
        match action {
            ".Version" => Some(Field::Version),
            ".OS" => Some(Field::Os),
            ".Arch" => Some(Field::Arch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Values substituted into a template
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub version: &'a str,
    pub platform: &'a Platform,
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or_else(|| DepsError::Template {
                template: source.to_string(),
                reason: "unclosed action".to_string(),
            })?;

            let action = after_open[..end].trim();
            if action.is_empty() {
                return Err(DepsError::Template {
                    template: source.to_string(),
                    reason: "missing value for action".to_string(),
                });
            }

            let field = Field::from_action(action).ok_or_else(|| DepsError::Template {
                template: source.to_string(),
                reason: format!("unknown field '{}'", action),
            })?;
            segments.push(Segment::Field(field));

            rest = &after_open[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Version) => out.push_str(ctx.version),
                Segment::Field(Field::Os) => out.push_str(ctx.platform.os()),
                Segment::Field(Field::Arch) => out.push_str(ctx.platform.arch()),
            }
        }
        out
    }

    /// True if the template contains no actions
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }
}

/// Parse and render a template in one step
pub fn expand_template(pattern: &str, version: &str, platform: &Platform) -> Result<String> {
    let template = Template::parse(pattern)?;
    Ok(template.render(&TemplateContext { version, platform }))
}

/// Expand every pattern in a list, failing on the first malformed one
pub fn expand_all(patterns: &[String], version: &str, platform: &Platform) -> Result<Vec<String>> {
    patterns
        .iter()
        .map(|p| expand_template(p, version, platform))
        .collect()
}
