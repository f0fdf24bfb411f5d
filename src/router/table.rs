//! Ordered route table with Django-style `include`s and reverse lookups.
//!
//! A [`RouteTable`] is built once at startup and never mutated afterwards,
//! so resolving a path is a plain read that is safe to share between every
//! request handling task.

use std::{
    collections::HashSet,
    convert::Infallible,
    fmt,
    sync::{Arc, Mutex},
};

use axum::{body::Body, http::Request, response::Response};
use futures::future::BoxFuture;
use thiserror::Error;
use tower::{Service, ServiceExt};

/// Anything that can turn a request into a response.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Request<Body>) -> BoxFuture<'static, Response>;
}

/// Tower services are usually `Send` but not `Sync` (axum's `MethodRouter`
/// among them), so they are shared behind a lock and cloned per request.
impl<S> RequestHandler for Mutex<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    fn handle(&self, request: Request<Body>) -> BoxFuture<'static, Response> {
        let service = match self.lock() {
            Ok(service) => service.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        Box::pin(async move {
            match service.oneshot(request).await {
                Ok(response) => response,
                Err(infallible) => match infallible {},
            }
        })
    }
}

/// A type erased, cheaply clonable [`RequestHandler`]
#[derive(Clone)]
pub struct Endpoint(Arc<dyn RequestHandler>);

impl Endpoint {
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Request<Body>, Response = Response, Error = Infallible>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Self::from_handler(Mutex::new(service))
    }

    pub fn from_handler(handler: impl RequestHandler) -> Self {
        Self(Arc::new(handler))
    }

    pub fn handle(&self, request: Request<Body>) -> BoxFuture<'static, Response> {
        self.0.handle(request)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Endpoint")
    }
}

#[derive(Debug, Clone)]
pub enum Target {
    /// Leaf endpoint, matched when the remaining path equals the pattern
    View(Endpoint),
    /// Leaf endpoint, matched when the remaining path starts with the pattern
    Prefix(Endpoint),
    /// Nested table, matched when the remaining path starts with the pattern
    Include {
        namespace: Option<&'static str>,
        table: Arc<RouteTable>,
    },
}

#[derive(Debug, Clone)]
pub struct Route {
    pattern: &'static str,
    target: Target,
    name: Option<&'static str>,
}

impl Route {
    pub fn view(pattern: &'static str, endpoint: Endpoint) -> Self {
        Self {
            pattern,
            target: Target::View(endpoint),
            name: None,
        }
    }

    /// A view serving every path under `pattern`, usually placed last as a
    /// catch-all
    pub fn prefix(pattern: &'static str, endpoint: Endpoint) -> Self {
        Self {
            pattern,
            target: Target::Prefix(endpoint),
            name: None,
        }
    }

    pub fn include(pattern: &'static str, table: RouteTable) -> Self {
        Self {
            pattern,
            target: Target::Include {
                namespace: None,
                table: Arc::new(table),
            },
            name: None,
        }
    }

    /// Name a view for reverse lookups. Names on includes are ignored.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Namespace an include, making its views reversible as `namespace:name`
    pub fn namespace(mut self, name: &'static str) -> Self {
        if let Target::Include { namespace, .. } = &mut self.target {
            *namespace = Some(name);
        }
        self
    }

    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTableError {
    #[error("route pattern `{0}` should not start with a slash")]
    LeadingSlash(&'static str),
    #[error("route pattern `{0}` is declared more than once for the same kind of match")]
    DuplicatePattern(&'static str),
    #[error("route name `{0}` is declared more than once")]
    DuplicateName(&'static str),
    #[error("namespace `{0}` is declared more than once")]
    DuplicateNamespace(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no route matches `{path}`")]
pub struct NotFound {
    pub path: String,
}

/// A successful resolution
#[derive(Debug, Clone)]
pub struct ResolverMatch {
    pub endpoint: Endpoint,
    /// Full pattern that matched, across every include level
    pub route: String,
    pub url_name: Option<&'static str>,
    /// Matched by a prefix view rather than exactly
    pub partial: bool,
    /// Namespaces of the includes that were traversed, outermost first
    pub namespaces: Vec<&'static str>,
}

impl ResolverMatch {
    pub fn namespace(&self) -> String {
        self.namespaces.join(":")
    }

    /// The name this match can be reversed with, if any
    pub fn view_name(&self) -> Option<String> {
        self.url_name.map(|name| qualify(&self.namespaces, name))
    }
}

/// A leaf route as listed by [`RouteTable::patterns`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    pub pattern: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Result<Self, RouteTableError> {
        let mut patterns = HashSet::new();
        let mut names = HashSet::new();
        let mut namespaces = HashSet::new();

        for route in &routes {
            if route.pattern.starts_with('/') {
                return Err(RouteTableError::LeadingSlash(route.pattern));
            }

            // An exact view and a prefix match may share a pattern
            let exact = matches!(route.target, Target::View(_));
            if !patterns.insert((route.pattern, exact)) {
                return Err(RouteTableError::DuplicatePattern(route.pattern));
            }

            match (&route.target, route.name) {
                (Target::View(_) | Target::Prefix(_), Some(name)) if !names.insert(name) => {
                    return Err(RouteTableError::DuplicateName(name));
                }
                (
                    Target::Include {
                        namespace: Some(namespace),
                        ..
                    },
                    _,
                ) if !namespaces.insert(*namespace) => {
                    return Err(RouteTableError::DuplicateNamespace(*namespace));
                }
                _ => {}
            }
        }

        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First matching route in declaration order. A single leading slash on
    /// `path` is ignored.
    pub fn resolve(&self, path: &str) -> Result<ResolverMatch, NotFound> {
        let relative = path.strip_prefix('/').unwrap_or(path);

        self.resolve_relative(relative).ok_or_else(|| NotFound {
            path: path.to_string(),
        })
    }

    fn resolve_relative(&self, path: &str) -> Option<ResolverMatch> {
        self.routes.iter().find_map(|route| match &route.target {
            Target::View(endpoint) => (path == route.pattern).then(|| ResolverMatch {
                endpoint: endpoint.clone(),
                route: route.pattern.to_string(),
                url_name: route.name,
                partial: false,
                namespaces: Vec::new(),
            }),
            Target::Prefix(endpoint) => path.starts_with(route.pattern).then(|| ResolverMatch {
                endpoint: endpoint.clone(),
                route: route.pattern.to_string(),
                url_name: route.name,
                partial: true,
                namespaces: Vec::new(),
            }),
            Target::Include { namespace, table } => {
                let rest = path.strip_prefix(route.pattern)?;
                let mut matched = table.resolve_relative(rest)?;

                matched.route.insert_str(0, route.pattern);
                if let Some(namespace) = namespace {
                    matched.namespaces.insert(0, *namespace);
                }

                Some(matched)
            }
        })
    }

    /// Absolute path of the view called `name`, which may be qualified with
    /// `:` separated namespaces.
    pub fn reverse(&self, name: &str) -> Option<String> {
        let mut segments: Vec<&str> = name.split(':').collect();
        let view = segments.pop()?;

        self.reverse_in(&segments, view).map(|path| format!("/{path}"))
    }

    fn reverse_in(&self, namespaces: &[&str], view: &str) -> Option<String> {
        self.routes.iter().find_map(|route| match &route.target {
            Target::View(_) | Target::Prefix(_) => (namespaces.is_empty()
                && route.name == Some(view))
                .then(|| route.pattern.to_string()),
            Target::Include { namespace, table } => {
                let nested = match (namespace, namespaces.split_first()) {
                    (Some(namespace), Some((first, rest))) if namespace == first => {
                        table.reverse_in(rest, view)
                    }
                    (None, _) => table.reverse_in(namespaces, view),
                    _ => None,
                }?;

                Some(format!("{}{}", route.pattern, nested))
            }
        })
    }

    /// Every leaf route in declaration order
    pub fn patterns(&self) -> Vec<RoutePattern> {
        let mut patterns = Vec::new();
        self.collect_patterns("", &[], &mut patterns);
        patterns
    }

    fn collect_patterns(
        &self,
        prefix: &str,
        namespaces: &[&'static str],
        patterns: &mut Vec<RoutePattern>,
    ) {
        for route in &self.routes {
            let pattern = format!("{prefix}{}", route.pattern);

            match &route.target {
                Target::View(_) => patterns.push(RoutePattern {
                    pattern,
                    name: route.name.map(|name| qualify(namespaces, name)),
                }),
                Target::Prefix(_) => patterns.push(RoutePattern {
                    pattern: format!("{pattern}<path>"),
                    name: route.name.map(|name| qualify(namespaces, name)),
                }),
                Target::Include { namespace, table } => {
                    let mut namespaces = namespaces.to_vec();
                    namespaces.extend(namespace);

                    table.collect_patterns(&pattern, &namespaces, patterns);
                }
            }
        }
    }
}

fn qualify(namespaces: &[&str], name: &str) -> String {
    namespaces
        .iter()
        .copied()
        .chain([name])
        .collect::<Vec<_>>()
        .join(":")
}
