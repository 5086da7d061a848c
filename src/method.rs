//! HTTP method as a typed enum.
//!
//! Covers RFC 9110 standard methods, WebDAV extensions (RFC 4918 / 4791 / 3253 / 5323),
//! and `PURGE` used by caching proxies for cache invalidation. Any other
//! well-formed method token is carried as [`Method::Extension`], so it still
//! runs through the middleware chain; the router answers it with `405`
//! unless a route was registered for it.

use std::fmt;
use std::str::FromStr;

/// An HTTP method.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    // RFC 9110
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
    // WebDAV RFC 4918
    Copy,
    Lock,
    Mkcol,
    Move,
    Propfind,
    Proppatch,
    Unlock,
    // WebDAV extensions
    Mkcalendar, // RFC 4791
    Report,     // RFC 3253
    Search,     // RFC 5323
    // Cache invalidation
    Purge,
    /// Any other method token, verbatim.
    Extension(Box<str>),
}

impl Method {
    /// Returns the wire representation (e.g. `"GET"`).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect      => "CONNECT",
            Self::Copy         => "COPY",
            Self::Delete       => "DELETE",
            Self::Get          => "GET",
            Self::Head         => "HEAD",
            Self::Lock         => "LOCK",
            Self::Mkcalendar   => "MKCALENDAR",
            Self::Mkcol        => "MKCOL",
            Self::Move         => "MOVE",
            Self::Options      => "OPTIONS",
            Self::Patch        => "PATCH",
            Self::Post         => "POST",
            Self::Propfind     => "PROPFIND",
            Self::Proppatch    => "PROPPATCH",
            Self::Purge        => "PURGE",
            Self::Put          => "PUT",
            Self::Report       => "REPORT",
            Self::Search       => "SEARCH",
            Self::Trace        => "TRACE",
            Self::Unlock       => "UNLOCK",
            Self::Extension(m) => m,
        }
    }
}

/// Returned when a string is not a valid method token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid method `{}`", self.0)
    }
}

impl std::error::Error for UnknownMethod {}

/// RFC 9110 §5.6.2 `tchar`.
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Parses a method token. Case-sensitive per RFC 9110 §9.1, so `"get"` is
/// an extension method, not `GET`.
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT"    => Self::Connect,
            "COPY"       => Self::Copy,
            "DELETE"     => Self::Delete,
            "GET"        => Self::Get,
            "HEAD"       => Self::Head,
            "LOCK"       => Self::Lock,
            "MKCALENDAR" => Self::Mkcalendar,
            "MKCOL"      => Self::Mkcol,
            "MOVE"       => Self::Move,
            "OPTIONS"    => Self::Options,
            "PATCH"      => Self::Patch,
            "POST"       => Self::Post,
            "PROPFIND"   => Self::Propfind,
            "PROPPATCH"  => Self::Proppatch,
            "PURGE"      => Self::Purge,
            "PUT"        => Self::Put,
            "REPORT"     => Self::Report,
            "SEARCH"     => Self::Search,
            "TRACE"      => Self::Trace,
            "UNLOCK"     => Self::Unlock,
            other if !other.is_empty() && other.bytes().all(is_tchar) => {
                Self::Extension(other.into())
            }
            other => return Err(UnknownMethod(other.to_owned())),
        })
    }
}

impl From<&http::Method> for Method {
    fn from(m: &http::Method) -> Self {
        // http only constructs valid tokens.
        m.as_str().parse().unwrap_or_else(|_| Self::Extension(m.as_str().into()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods_case_sensitively() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert_eq!("PURGE".parse::<Method>(), Ok(Method::Purge));
        assert_eq!("PROPFIND".parse::<Method>(), Ok(Method::Propfind));
        assert_eq!("get".parse::<Method>(), Ok(Method::Extension("get".into())));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!("".parse::<Method>().is_err());
        assert!("GET /".parse::<Method>().is_err());
    }

    #[test]
    fn converts_from_http_method() {
        assert_eq!(Method::from(&http::Method::POST), Method::Post);
        let brew = http::Method::from_bytes(b"BREW").unwrap();
        assert_eq!(Method::from(&brew), Method::Extension("BREW".into()));
        assert_eq!(Method::from(&brew).as_str(), "BREW");
    }
}
