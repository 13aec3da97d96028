use std::cmp::Ordering;
use std::fmt;

/// A media type (`type/subtype; params`).
///
/// Equality ignores parameters: `application/json; charset=utf-8` and
/// `application/json` are the same type for negotiation purposes.
#[derive(Debug, Clone, Eq)]
pub struct MediaType {
    type_: String,
    subtype: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// `application/json`
    #[must_use]
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    /// `application/problem+json`
    #[must_use]
    pub fn problem_json() -> Self {
        Self::new("application", "problem+json")
    }

    /// `text/event-stream`
    #[must_use]
    pub fn event_stream() -> Self {
        Self::new("text", "event-stream")
    }

    /// `text/plain`
    #[must_use]
    pub fn plain_text() -> Self {
        Self::new("text", "plain")
    }

    /// Parse a media type, dropping any `q` parameter.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(';');
        let (type_, subtype) = parts.next()?.trim().split_once('/')?;
        let (type_, subtype) = (type_.trim(), subtype.trim());
        if type_.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut media = Self::new(type_, subtype);
        for param in parts {
            if let Some((key, value)) = param.trim().split_once('=') {
                let key = key.trim();
                if !key.eq_ignore_ascii_case("q") {
                    media = media.with_param(key, value.trim().trim_matches('"'));
                }
            }
        }
        Some(media)
    }

    #[must_use]
    pub fn type_(&self) -> &str {
        &self.type_
    }

    #[must_use]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.type_ == "*" || self.subtype == "*"
    }

    /// `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.type_ == other.type_ && self.subtype == other.subtype
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (key, value) in &self.params {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}

/// Parse an `Accept` header into media types ordered by quality, highest first.
///
/// Entries with equal quality keep their header order.
#[must_use]
pub fn parse_accept(header: &str) -> Vec<MediaType> {
    let mut weighted: Vec<(MediaType, f32)> = header
        .split(',')
        .filter_map(|part| {
            let quality = part
                .split(';')
                .skip(1)
                .filter_map(|p| p.trim().split_once('='))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
                .and_then(|(_, v)| v.trim().parse::<f32>().ok())
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            MediaType::parse(part).map(|mt| (mt, quality))
        })
        .filter(|(_, q)| *q > 0.0)
        .collect();

    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    weighted.into_iter().map(|(mt, _)| mt).collect()
}
