use std::fmt;

/// Request method as it appeared on the wire.
///
/// Only GET, HEAD and POST are servable; anything else parses fine but is
/// answered with 405 when no extension claims it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Other(s) => s.as_str(),
        }
    }

    /// True for the methods the engine is willing to serve at all.
    pub fn is_servable(&self) -> bool {
        !matches!(self, Method::Other(_))
    }

    /// True for methods that may carry a request body.
    pub fn may_have_body(&self) -> bool {
        matches!(self, Method::Post)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// Parses a `HTTP/x.y` token.
    ///
    /// Returns `Ok` for 1.0 and 1.1, `Err(Some(version))` for a well-formed
    /// but unsupported version, and `Err(None)` for garbage.
    pub fn parse(token: &str) -> Result<Self, Option<String>> {
        match token {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            other if other.starts_with("HTTP/") => Err(Some(other.to_string())),
            _ => Err(None),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_methods() {
        assert_eq!(Method::parse("GET"), Method::Get);
        assert_eq!(Method::parse("HEAD"), Method::Head);
        assert_eq!(Method::parse("POST"), Method::Post);
        assert_eq!(Method::parse("DELETE"), Method::Other("DELETE".to_string()));
        assert!(!Method::parse("PUT").is_servable());
    }

    #[test]
    fn parse_versions() {
        assert_eq!(Version::parse("HTTP/1.1"), Ok(Version::Http11));
        assert_eq!(Version::parse("HTTP/1.0"), Ok(Version::Http10));
        assert_eq!(Version::parse("HTTP/2.0"), Err(Some("HTTP/2.0".to_string())));
        assert_eq!(Version::parse("ICY/1.0"), Err(None));
    }
}
