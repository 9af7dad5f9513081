//! The segment trie.

use std::collections::HashMap;

use regex::Regex;

use super::error::{RouterError, RouterResult};
use super::segment::{is_regex_segment, sort_segments, split_path};
use crate::modules::masking::FieldRule;

/// A terminal route: the payload installed at a path plus the field-to-rule
/// map consulted when masking responses matched by this route.
#[derive(Debug, Clone)]
pub struct Route<T> {
    path: String,
    /// Caller-defined payload (the proxy layer stores its route metadata here).
    pub meta: T,
    /// Field name → rule, route-scoped rules shadowing service-scoped ones.
    pub fields: HashMap<String, FieldRule>,
}

impl<T> Route<T> {
    /// The full path this route was registered under.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One node per path segment.
#[derive(Debug)]
struct TrieNode<T> {
    route: Option<Route<T>>,
    /// Compiled pattern when this node's segment is a `{...}` token.
    regex: Option<Regex>,
    children: HashMap<String, TrieNode<T>>,
    /// Child segments in match order: literals, regexes, wildcard.
    order: Vec<String>,
}

/// Check that every `{...}` segment of a path compiles, without touching any
/// routing state. Mutation paths call this before taking side effects so an
/// invalid pattern is rejected whole.
///
/// # Errors
///
/// Returns an error naming the first segment whose pattern does not compile.
pub fn validate_path(path: &str) -> RouterResult<()> {
    for segment in split_path(path) {
        if is_regex_segment(&segment) {
            let pattern = &segment[1..segment.len() - 1];
            Regex::new(pattern).map_err(|source| RouterError::InvalidRegex {
                segment: segment.clone(),
                source,
            })?;
        }
    }
    Ok(())
}

impl<T> TrieNode<T> {
    fn new(segment: &str) -> RouterResult<Self> {
        let regex = if is_regex_segment(segment) {
            let pattern = &segment[1..segment.len() - 1];
            Some(
                Regex::new(pattern).map_err(|source| RouterError::InvalidRegex {
                    segment: segment.to_string(),
                    source,
                })?,
            )
        } else {
            None
        };
        Ok(Self {
            route: None,
            regex,
            children: HashMap::new(),
            order: Vec::new(),
        })
    }

    fn add(&mut self, segments: &[String], route: Route<T>) -> RouterResult<()> {
        let Some(segment) = segments.first() else {
            self.route = Some(route);
            return Ok(());
        };
        if !self.children.contains_key(segment) {
            let child = TrieNode::new(segment)?;
            self.children.insert(segment.clone(), child);
            self.order.push(segment.clone());
            sort_segments(&mut self.order);
        }
        match self.children.get_mut(segment) {
            Some(child) => child.add(&segments[1..], route),
            None => Ok(()),
        }
    }

    fn matches(&self, segment: &str, own_segment: &str) -> bool {
        if own_segment == "*" {
            return true;
        }
        if let Some(ref regex) = self.regex {
            return regex.is_match(segment);
        }
        own_segment == segment
    }

    fn find(&self, segments: &[String]) -> Option<&Route<T>> {
        let Some(segment) = segments.first() else {
            return self.route.as_ref();
        };
        // First matching sibling wins and its result is final: a deeper miss
        // under a matched child does not fall through to later siblings.
        for s in &self.order {
            let child = &self.children[s];
            if child.matches(segment, s) {
                return child.find(&segments[1..]);
            }
        }
        // No child matched: closest-enclosing-route semantics.
        self.route.as_ref()
    }

    /// Remove the route at `segments`. Returns whether this node is now
    /// empty (no terminal route, no children) and should be pruned.
    fn remove(&mut self, segments: &[String]) -> bool {
        match segments.first() {
            None => {
                self.route = None;
                self.children.clear();
                self.order.clear();
            }
            Some(segment) => {
                if let Some(child) = self.children.get_mut(segment) {
                    if child.remove(&segments[1..]) {
                        self.children.remove(segment);
                        self.order.retain(|s| s != segment);
                    }
                }
            }
        }
        self.route.is_none() && self.children.is_empty()
    }

    fn get_mut(&mut self, segments: &[String]) -> Option<&mut Route<T>> {
        match segments.first() {
            None => self.route.as_mut(),
            Some(segment) => self.children.get_mut(segment)?.get_mut(&segments[1..]),
        }
    }

    fn for_each_route_mut(&mut self, f: &mut impl FnMut(&mut Route<T>)) {
        if let Some(ref mut route) = self.route {
            f(route);
        }
        for child in self.children.values_mut() {
            child.for_each_route_mut(f);
        }
    }
}

/// Segment trie router for one (port, domain).
///
/// Maps paths containing literal, `*`-wildcard, and `{regex}` segments to a
/// terminal [`Route`]. Lookups fall back to the closest enclosing route when
/// no deeper match exists; sibling precedence is literal, then regex (in
/// lexical order of the raw pattern), then wildcard.
#[derive(Debug)]
pub struct Router<T> {
    root: TrieNode<T>,
}

impl<T> Router<T> {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: TrieNode {
                route: None,
                regex: None,
                children: HashMap::new(),
                order: Vec::new(),
            },
        }
    }

    /// Register (or replace) the route at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when a `{...}` segment fails to compile; the trie is
    /// left with at most empty intermediate nodes, never a partial route.
    pub fn add_route(
        &mut self,
        path: &str,
        meta: T,
        fields: HashMap<String, FieldRule>,
    ) -> RouterResult<()> {
        let segments = split_path(path);
        let route = Route {
            path: path.to_string(),
            meta,
            fields,
        };
        self.root.add(&segments, route)
    }

    /// Find the route matching `path`, if any terminal route exists on the
    /// matched chain.
    #[must_use]
    pub fn find_route(&self, path: &str) -> Option<&Route<T>> {
        self.root.find(&split_path(path))
    }

    /// Remove the route at `path`, pruning empty nodes. Returns `true` when
    /// the router has become observably empty (the caller decommissions it).
    pub fn remove_route(&mut self, path: &str) -> bool {
        self.root.remove(&split_path(path))
    }

    /// Whether no routes remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.route.is_none() && self.root.children.is_empty()
    }

    /// Insert or replace a field rule on the route at `path`.
    pub fn update_route_field(&mut self, path: &str, rule: FieldRule) {
        if let Some(route) = self.root.get_mut(&split_path(path)) {
            route.fields.insert(rule.name.clone(), rule);
        }
    }

    /// Remove a route-scoped field rule, reinstating the service-scoped rule
    /// of the same name when one exists.
    pub fn remove_route_field(
        &mut self,
        path: &str,
        name: &str,
        service_fallback: Option<FieldRule>,
    ) {
        if let Some(route) = self.root.get_mut(&split_path(path)) {
            route.fields.remove(name);
            if let Some(fallback) = service_fallback {
                route.fields.insert(fallback.name.clone(), fallback);
            }
        }
    }

    /// Set a service-scoped rule on every route where it is not shadowed by
    /// a route-scoped rule of the same name.
    pub fn update_service_field(&mut self, rule: &FieldRule) {
        use crate::modules::masking::FieldScope;
        self.root.for_each_route_mut(&mut |route| {
            match route.fields.get(&rule.name) {
                Some(existing) if existing.scope == FieldScope::Route => {}
                _ => {
                    route.fields.insert(rule.name.clone(), rule.clone());
                }
            }
        });
    }

    /// Remove a service-scoped rule from every route carrying it.
    pub fn remove_service_field(&mut self, name: &str) {
        use crate::modules::masking::FieldScope;
        self.root.for_each_route_mut(&mut |route| {
            if route
                .fields
                .get(name)
                .is_some_and(|f| f.scope == FieldScope::Service)
            {
                route.fields.remove(name);
            }
        });
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::masking::FieldScope;

    fn add(router: &mut Router<&'static str>, path: &'static str) {
        router.add_route(path, path, HashMap::new()).unwrap();
    }

    fn build() -> Router<&'static str> {
        let mut router = Router::new();
        add(&mut router, "/a");
        add(&mut router, "/a/b");
        add(&mut router, "/a/b/c");
        add(&mut router, "/a/*/c");
        add(&mut router, "/a/{\\d+}/c");
        router
    }

    #[test]
    fn test_literal_beats_regex_and_wildcard() {
        let router = build();
        assert_eq!(router.find_route("/a/b/c").unwrap().meta, "/a/b/c");
    }

    #[test]
    fn test_regex_segment_matches_digits() {
        let router = build();
        assert_eq!(router.find_route("/a/1/c").unwrap().meta, "/a/{\\d+}/c");
    }

    #[test]
    fn test_enclosing_route_fallback() {
        let router = build();
        assert_eq!(router.find_route("/a").unwrap().meta, "/a");
        assert_eq!(router.find_route("/a/b").unwrap().meta, "/a/b");
        // Deeper than any registered path: closest enclosing route wins.
        assert_eq!(router.find_route("/a/1/c/1").unwrap().meta, "/a/{\\d+}/c");
    }

    #[test]
    fn test_matched_child_miss_does_not_fall_back() {
        let router = build();
        // "/a/1" matches the regex child which has no terminal route there.
        assert!(router.find_route("/a/1").is_none());
    }

    #[test]
    fn test_remove_reveals_shallower_routes() {
        let mut router = build();
        assert!(!router.remove_route("/a/b/c"));
        assert_eq!(router.find_route("/a/b/c").unwrap().meta, "/a/b");

        assert!(!router.remove_route("/a/b"));
        assert_eq!(router.find_route("/a/b/c").unwrap().meta, "/a/*/c");
        assert!(router.find_route("/a/b").is_none());
    }

    #[test]
    fn test_add_remove_symmetry() {
        let mut router: Router<()> = Router::new();
        router.add_route("/x/y/z", (), HashMap::new()).unwrap();
        assert!(!router.is_empty());
        assert!(router.remove_route("/x/y/z"));
        assert!(router.is_empty());
    }

    #[test]
    fn test_root_route() {
        let mut router: Router<u32> = Router::new();
        router.add_route("/", 7, HashMap::new()).unwrap();
        assert_eq!(router.find_route("/").unwrap().meta, 7);
        assert_eq!(router.find_route("/anything").unwrap().meta, 7);
        assert!(router.remove_route("/"));
        assert!(router.is_empty());
    }

    #[test]
    fn test_regex_tie_break_is_lexical() {
        let mut router = Router::new();
        add(&mut router, "/v/{[0-9]+}");
        add(&mut router, "/v/{\\d+}");
        // Both match "7"; '[' sorts before '\' so the bracket form wins.
        assert_eq!(router.find_route("/v/7").unwrap().meta, "/v/{[0-9]+}");
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let mut router: Router<()> = Router::new();
        let err = router.add_route("/a/{[}/c", (), HashMap::new());
        assert!(matches!(err, Err(RouterError::InvalidRegex { .. })));
    }

    #[test]
    fn test_service_field_shadowing() {
        let mut router: Router<()> = Router::new();
        let route_rule = FieldRule::new("name", FieldScope::Route, ["all-*", "-", "-", "-"]);
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), route_rule);
        router.add_route("/u", (), fields).unwrap();
        router.add_route("/v", (), HashMap::new()).unwrap();

        let service_rule = FieldRule::new("name", FieldScope::Service, ["each-*", "-", "-", "-"]);
        router.update_service_field(&service_rule);

        // Route-scoped rule on /u shadows; /v takes the service rule.
        assert_eq!(
            router.find_route("/u").unwrap().fields["name"].scope,
            FieldScope::Route
        );
        assert_eq!(
            router.find_route("/v").unwrap().fields["name"].scope,
            FieldScope::Service
        );

        // Removing the service field leaves the route-scoped rule alone.
        router.remove_service_field("name");
        assert!(router.find_route("/u").unwrap().fields.contains_key("name"));
        assert!(!router.find_route("/v").unwrap().fields.contains_key("name"));
    }

    #[test]
    fn test_route_field_removal_falls_back_to_service_rule() {
        let mut router: Router<()> = Router::new();
        let mut fields = HashMap::new();
        fields.insert(
            "ssn".to_string(),
            FieldRule::new("ssn", FieldScope::Route, ["all-*", "-", "-", "-"]),
        );
        router.add_route("/p", (), fields).unwrap();

        let fallback = FieldRule::new("ssn", FieldScope::Service, ["end-**", "-", "-", "-"]);
        router.remove_route_field("/p", "ssn", Some(fallback));

        let rule = &router.find_route("/p").unwrap().fields["ssn"];
        assert_eq!(rule.scope, FieldScope::Service);
        assert_eq!(rule.pattern_for(1), "end-**");

        router.remove_route_field("/p", "ssn", None);
        assert!(router.find_route("/p").unwrap().fields.is_empty());
    }

    #[test]
    fn test_validate_path_checks_regex_segments() {
        assert!(validate_path("/a/b").is_ok());
        assert!(validate_path("/a/{\\d+}/c").is_ok());
        assert!(validate_path("/").is_ok());
        assert!(matches!(
            validate_path("/a/{[}/c"),
            Err(RouterError::InvalidRegex { .. })
        ));
    }
}
