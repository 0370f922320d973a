use anyhow::{anyhow, bail};
use std::fmt::{Display, Formatter};

const DEFAULT_PORT: u16 = 80;

/// An absolute `http://host[:port][/path][?query]` URL. Nothing beyond that is supported.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Url {
    pub host: String,
    pub port: u16,
    /// path plus query string, always starting with `/`
    pub request_uri: String,
}

impl Display for Url {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.request_uri)
    }
}

impl Url {
    pub fn parse(raw: &str) -> anyhow::Result<Url> {
        let rest = raw.trim();
        let rest = match rest.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => rest,
            Some((scheme, _)) => bail!("unsupported URL scheme {:?} in {:?}", scheme, raw),
            None => bail!("not an absolute URL: {:?}", raw),
        };

        let (authority, request_uri) = match rest.find(['/', '?']) {
            Some(idx) if rest.as_bytes()[idx] == b'/' => (&rest[..idx], rest[idx..].to_string()),
            Some(idx) => (&rest[..idx], format!("/{}", &rest[idx..])),
            None => (rest, "/".to_string()),
        };
        let request_uri = match request_uri.find('#') {
            Some(idx) => request_uri[..idx].to_string(),
            None => request_uri,
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>()
                    .map_err(|_| anyhow!("invalid port {:?} in URL {:?}", port, raw))?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            bail!("URL without host: {:?}", raw);
        }

        Ok(Url {
            host: host.to_string(),
            port,
            request_uri,
        })
    }

    /// Resolve a redirect target: either an absolute URL, or an absolute path on the same host
    pub fn join(&self, location: &str) -> anyhow::Result<Url> {
        let location = location.trim();
        if location.starts_with('/') {
            return Ok(Url {
                request_uri: location.to_string(),
                ..self.clone()
            });
        }
        Url::parse(location)
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("http://localhost", "localhost", 80, "/")]
    #[case::port("http://127.0.0.1:8080", "127.0.0.1", 8080, "/")]
    #[case::path("http://127.0.0.1:8080/hello.txt", "127.0.0.1", 8080, "/hello.txt")]
    #[case::query("http://httpbin.org/get?course=networking&assignment=1", "httpbin.org", 80, "/get?course=networking&assignment=1")]
    #[case::query_without_path("http://example.com?a=b", "example.com", 80, "/?a=b")]
    #[case::fragment("http://example.com/a#top", "example.com", 80, "/a")]
    #[case::uppercase_scheme("HTTP://example.com/", "example.com", 80, "/")]
    fn test_parse(#[case] raw: &str, #[case] host: &str, #[case] port: u16, #[case] request_uri: &str) {
        let url = Url::parse(raw).unwrap();
        assert_eq!(url.host, host);
        assert_eq!(url.port, port);
        assert_eq!(url.request_uri, request_uri);
    }

    #[rstest]
    #[case::no_scheme("localhost:8080/x")]
    #[case::https("https://localhost/")]
    #[case::no_host("http:///x")]
    #[case::bad_port("http://localhost:abc/")]
    #[case::port_overflow("http://localhost:70000/")]
    #[case::empty("")]
    fn test_parse_malformed(#[case] raw: &str) {
        assert!(Url::parse(raw).is_err());
    }

    #[rstest]
    #[case::absolute_path("/other", "http://a.b:81/other")]
    #[case::absolute_url("http://c.d/e", "http://c.d:80/e")]
    fn test_join(#[case] location: &str, #[case] expected: &str) {
        let base = Url::parse("http://a.b:81/x").unwrap();
        assert_eq!(base.join(location).unwrap().to_string(), expected);
    }
}
