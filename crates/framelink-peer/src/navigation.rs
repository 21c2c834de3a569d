use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which application a path names a route in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    /// A route of the host application.
    Host,
    /// A route inside the embedded application.
    #[default]
    #[serde(alias = "europaui")]
    Guest,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKind::Host => f.write_str("host"),
            PathKind::Guest => f.write_str("guest"),
        }
    }
}

/// A location expressed independently of either side's URL scheme.
///
/// Parameters are kept sorted, so equality ignores the order they were
/// supplied in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NavigationPath {
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub kind: PathKind,
}

impl NavigationPath {
    /// A guest route. The path is normalized.
    pub fn guest(path: &str) -> Self {
        Self::new(path, PathKind::Guest)
    }

    /// A host route. The path is normalized.
    pub fn host(path: &str) -> Self {
        Self::new(path, PathKind::Host)
    }

    pub fn new(path: &str, kind: PathKind) -> Self {
        Self {
            path: normalize_path(path),
            params: BTreeMap::new(),
            kind,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn is_guest(&self) -> bool {
        self.kind == PathKind::Guest
    }

    /// Same path and parameters, ignoring kind.
    pub fn same_location(&self, other: &NavigationPath) -> bool {
        self.path == other.path && self.params == other.params
    }
}

impl fmt::Display for NavigationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.kind, self.path)?;
        if !self.params.is_empty() {
            write!(f, "?{}", encode_query(&self.params))?;
        }
        Ok(())
    }
}

/// Where to go once an in-flight authentication event resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextRequest {
    pub path: NavigationPath,
    pub label: Option<String>,
}

impl NextRequest {
    pub fn new(path: NavigationPath) -> Self {
        Self { path, label: None }
    }
}

/// Strip empty segments: `"/foo//bar/"` becomes `"foo/bar"`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive the guest path from a host location under `prefix`.
///
/// `"/legacy/foo/bar?x=1"` with prefix `"/legacy"` yields guest path
/// `foo/bar` with `x=1`. Locations outside the prefix yield `None`.
pub fn guest_path_from_host(location: &str, prefix: &str) -> Option<NavigationPath> {
    let (path, query) = match location.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (location, None),
    };
    let path = path.split_once('#').map_or(path, |(path, _)| path);

    let prefix = normalize_path(prefix);
    let path = normalize_path(path);
    let rest = if prefix.is_empty() {
        path.as_str()
    } else if path == prefix {
        ""
    } else {
        path.strip_prefix(prefix.as_str())?.strip_prefix('/')?
    };

    let mut guest = NavigationPath::guest(rest);
    if let Some(query) = query {
        let query = query.split_once('#').map_or(query, |(query, _)| query);
        guest.params = decode_query(query);
    }
    Some(guest)
}

/// Host location for a navigation path.
///
/// Guest routes live under `prefix`; host routes are rooted at `/`.
pub fn host_location_for(path: &NavigationPath, prefix: &str) -> String {
    let mut location = match path.kind {
        PathKind::Guest => {
            let prefix = normalize_path(prefix);
            match (prefix.is_empty(), path.path.is_empty()) {
                (true, _) => format!("/{}", path.path),
                (false, true) => format!("/{prefix}"),
                (false, false) => format!("/{prefix}/{}", path.path),
            }
        }
        PathKind::Host => format!("/{}", path.path),
    };
    if !path.params.is_empty() {
        location.push('?');
        location.push_str(&encode_query(&path.params));
    }
    location
}

fn encode_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_empty_segments() {
        assert_eq!(normalize_path("foo/bar"), "foo/bar");
        assert_eq!(normalize_path("/foo//bar/"), "foo/bar");
        assert_eq!(normalize_path("///"), "");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn params_compare_order_insensitively() {
        let left = NavigationPath::guest("search").with_params([("q", "dna"), ("page", "2")]);
        let right = NavigationPath::guest("search").with_params([("page", "2"), ("q", "dna")]);
        assert_eq!(left, right);
        assert!(left.same_location(&NavigationPath {
            kind: PathKind::Host,
            ..right
        }));
    }

    #[test]
    fn kind_wire_names() {
        let kind: PathKind = serde_json::from_str("\"europaui\"").unwrap();
        assert_eq!(kind, PathKind::Guest);
        let kind: PathKind = serde_json::from_str("\"host\"").unwrap();
        assert_eq!(kind, PathKind::Host);
        assert_eq!(serde_json::to_string(&PathKind::Guest).unwrap(), "\"guest\"");
    }

    #[test]
    fn guest_path_from_prefixed_location() {
        let guest = guest_path_from_host("/legacy/foo/bar?x=1&y=two%20words", "/legacy").unwrap();
        assert_eq!(guest.path, "foo/bar");
        assert_eq!(guest.kind, PathKind::Guest);
        assert_eq!(guest.params.get("x").map(String::as_str), Some("1"));
        assert_eq!(guest.params.get("y").map(String::as_str), Some("two words"));

        let root = guest_path_from_host("/legacy", "/legacy").unwrap();
        assert_eq!(root.path, "");

        assert!(guest_path_from_host("/legacyish/foo", "/legacy").is_none());
        assert!(guest_path_from_host("/dashboard", "/legacy").is_none());
    }

    #[test]
    fn host_location_round_trips_guest_paths() {
        let path = NavigationPath::guest("orgs/view").with_params([("id", "a&b"), ("tab", "x y")]);
        let location = host_location_for(&path, "/legacy");
        assert_eq!(location, "/legacy/orgs/view?id=a%26b&tab=x%20y");
        assert_eq!(guest_path_from_host(&location, "/legacy"), Some(path));
    }

    #[test]
    fn host_routes_are_rooted() {
        assert_eq!(host_location_for(&NavigationPath::host("dashboard"), "/legacy"), "/dashboard");
        assert_eq!(host_location_for(&NavigationPath::guest("foo/bar"), "/legacy"), "/legacy/foo/bar");
        assert_eq!(host_location_for(&NavigationPath::guest(""), "/legacy"), "/legacy");
    }
}
