//! ferry-router: segment trie HTTP router
//!
//! Single Source of Truth for the route pattern grammar and method codes
//! shared by registration (across the foreign boundary) and matching.
//!
//! ## Path Syntax
//! - `:name` - Named parameter (captures one segment)
//! - `*` or `*name` - Wildcard (captures remaining path, final segment only)
//!
//! ## Priority
//! Evaluated per segment, left to right, with backtracking:
//! 1. Exact literal match (highest)
//! 2. Parameter match
//! 3. Wildcard match (lowest)
//!
//! Routes of equal specificity are tried in registration order.
//!
//! ## Example
//! ```
//! use ferry_router::{Method, RouteTable};
//!
//! let mut table = RouteTable::new();
//! table.insert(Method::Get, "/users", 0).unwrap();
//! table.insert(Method::Get, "/users/:id", 1).unwrap();
//! table.insert(Method::Get, "/files/*path", 2).unwrap();
//!
//! let m = table.find(Method::Get, "/users/123").unwrap();
//! assert_eq!(m.handler_id, 1);
//! assert_eq!(m.params, vec![("id".to_string(), "123".to_string())]);
//! ```

mod method;
mod pattern;

pub use method::Method;
pub use pattern::{Pattern, PatternFault, RouteError, Segment};

use std::collections::HashMap;

/// Opaque key correlating a route with foreign-side dispatch logic
pub type HandlerId = u64;

/// Route match result
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// The matched handler ID
    pub handler_id: HandlerId,
    /// Captured path parameters as (name, value) pairs, in pattern order
    pub params: Vec<(String, String)>,
}

impl Match {
    /// Get params as HashMap for convenient access
    pub fn params_map(&self) -> HashMap<String, String> {
        self.params.iter().cloned().collect()
    }

    /// Get a single captured parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A registered route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub pattern: Pattern,
    pub handler_id: HandlerId,
}

/// Trie node for path segment matching
#[derive(Debug, Default, Clone)]
struct Node {
    /// Literal children (key = path segment)
    children: HashMap<String, Node>,
    /// Parameter children, in registration order
    params: Vec<ParamNode>,
    /// Wildcard leaves, in registration order
    wildcards: Vec<WildcardLeaf>,
    /// Handler ID if a pattern ends here
    handler_id: Option<HandlerId>,
}

#[derive(Debug, Clone)]
struct ParamNode {
    name: String,
    node: Node,
}

#[derive(Debug, Clone)]
struct WildcardLeaf {
    name: String,
    handler_id: HandlerId,
}

/// Route table: per-method tries plus the registration-ordered route list
///
/// Built once, then shared read-only. `find` takes `&self` and never
/// allocates beyond the returned params.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    /// Method -> Trie root
    trees: HashMap<Method, Node>,
    /// Every route, in registration order
    routes: Vec<Route>,
}

impl RouteTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route
    ///
    /// Fails with [`RouteError::InvalidPattern`] for malformed patterns and
    /// [`RouteError::DuplicateRoute`] when the same method and pattern are
    /// already registered. A failed insert leaves the table untouched.
    ///
    /// ```
    /// use ferry_router::{Method, RouteError, RouteTable};
    ///
    /// let mut table = RouteTable::new();
    /// table.insert(Method::Get, "/users/:id", 0).unwrap();
    /// let err = table.insert(Method::Get, "/users/:id/", 1).unwrap_err();
    /// assert!(matches!(err, RouteError::DuplicateRoute { .. }));
    /// ```
    pub fn insert(
        &mut self,
        method: Method,
        pattern: &str,
        handler_id: HandlerId,
    ) -> Result<(), RouteError> {
        let pattern = Pattern::parse(pattern)?;

        if self.contains(method, &pattern) {
            return Err(RouteError::DuplicateRoute {
                method,
                pattern: pattern.to_string(),
            });
        }

        let tree = self.trees.entry(method).or_default();
        Self::insert_node(tree, pattern.segments(), handler_id);
        self.routes.push(Route {
            method,
            pattern,
            handler_id,
        });
        Ok(())
    }

    fn insert_node(node: &mut Node, segments: &[Segment], handler_id: HandlerId) {
        let Some((segment, rest)) = segments.split_first() else {
            node.handler_id = Some(handler_id);
            return;
        };

        match segment {
            Segment::Literal(literal) => {
                let child = node.children.entry(literal.clone()).or_default();
                Self::insert_node(child, rest, handler_id);
            }
            Segment::Param(name) => {
                let index = match node.params.iter().position(|p| &p.name == name) {
                    Some(index) => index,
                    None => {
                        node.params.push(ParamNode {
                            name: name.clone(),
                            node: Node::default(),
                        });
                        node.params.len() - 1
                    }
                };
                Self::insert_node(&mut node.params[index].node, rest, handler_id);
            }
            Segment::Wildcard(name) => {
                // The grammar guarantees `rest` is empty here
                node.wildcards.push(WildcardLeaf {
                    name: name.clone(),
                    handler_id,
                });
            }
        }
    }

    /// Check whether a method and pattern pair is registered
    pub fn contains(&self, method: Method, pattern: &Pattern) -> bool {
        self.routes
            .iter()
            .any(|r| r.method == method && &r.pattern == pattern)
    }

    /// Find a matching route
    ///
    /// No method fallback: a path registered only for GET does not match a
    /// HEAD request.
    ///
    /// ```
    /// use ferry_router::{Method, RouteTable};
    ///
    /// let mut table = RouteTable::new();
    /// table.insert(Method::Get, "/users/:id", 0).unwrap();
    ///
    /// let m = table.find(Method::Get, "/users/42").unwrap();
    /// assert_eq!(m.handler_id, 0);
    /// assert!(table.find(Method::Head, "/users/42").is_none());
    /// ```
    pub fn find(&self, method: Method, path: &str) -> Option<Match> {
        let tree = self.trees.get(&method)?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Vec::new();
        Self::find_node(tree, &segments, &mut params)
    }

    fn find_node(
        node: &Node,
        segments: &[&str],
        params: &mut Vec<(String, String)>,
    ) -> Option<Match> {
        let Some((&segment, rest)) = segments.split_first() else {
            return node.handler_id.map(|id| Match {
                handler_id: id,
                params: params.clone(),
            });
        };

        // Priority 1: exact literal match
        if let Some(child) = node.children.get(segment) {
            if let Some(m) = Self::find_node(child, rest, params) {
                return Some(m);
            }
        }

        // Priority 2: parameter match, first registered first
        for param in &node.params {
            params.push((param.name.clone(), segment.to_string()));
            if let Some(m) = Self::find_node(&param.node, rest, params) {
                return Some(m);
            }
            params.pop();
        }

        // Priority 3: wildcard, captures everything that is left
        if let Some(wildcard) = node.wildcards.first() {
            params.push((wildcard.name.clone(), segments.join("/")));
            return Some(Match {
                handler_id: wildcard.handler_id,
                params: params.clone(),
            });
        }

        None
    }

    /// Registered routes in registration order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Check if a method has any routes registered
    pub fn has_method(&self, method: Method) -> bool {
        self.trees.contains_key(&method)
    }

    /// Get all registered methods, in code order
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.trees.keys().copied().collect();
        methods.sort();
        methods
    }
}
