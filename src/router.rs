//! Route groups over one shared radix-tree path table.
//!
//! One tree per HTTP method, O(path-length) lookup. Every group registers
//! into the same table; what a group adds is its own middleware list and its
//! own configuration. Groups live in an arena next to the table and a
//! [`Router`] is just a handle to one of them, so handles are cheap to clone
//! and dropping one never unregisters anything.
//!
//! Middleware is resolved at dispatch time, not at registration time: a
//! layer added with [`Router::use_middleware`] applies to every route of the
//! group and its subgroups, including routes registered before the call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use flate2::Compression;
use http::Method;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::handler::{Endpoint, Handler, RawHandler};
use crate::middleware::Middleware;
use crate::response::IntoResponse;

// ── Options ───────────────────────────────────────────────────────────────────

/// A configuration step for a router or group.
///
/// Options are applied in order and later ones win. A group starts by
/// replaying its parent's options, then applies its own.
#[derive(Clone)]
pub enum RouteOption {
    /// Replaces the default `404 not_found` answer for unmatched requests.
    /// The handler writes its own response; no middleware runs.
    NotFound(RawHandler),
    /// Compact single-line JSON instead of two-space indentation.
    DisableIndent,
    /// Gzip responses for clients that accept it. Only the router that
    /// serves (normally the root) decides.
    Compression(Compression),
    /// Expose internal error details in `500` responses. Debugging only.
    DumpErrors(bool),
    /// Largest request body, in bytes, a route accepts. Bigger bodies are
    /// answered with `413 payload_too_large` before the endpoint runs.
    MaxBodySize(usize),
}

impl RouteOption {
    pub fn not_found<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(crate::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        Self::NotFound(RawHandler::new(handler))
    }

    /// Gzip at `level`, from 0 (store only) to 9 (best compression).
    ///
    /// # Panics
    ///
    /// Panics if `level` is greater than 9.
    pub fn compression(level: u32) -> Self {
        assert!(level <= 9, "invalid gzip compression level {level}, expected 0..=9");
        Self::Compression(Compression::new(level))
    }
}

/// Request body limit when no [`RouteOption::MaxBodySize`] is given: 4 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 4 << 20;

/// The settings a group's options fold into.
#[derive(Clone)]
pub(crate) struct Config {
    pub(crate) dump_errors: bool,
    pub(crate) indent: bool,
    pub(crate) compression: Option<Compression>,
    pub(crate) not_found: Option<RawHandler>,
    pub(crate) max_body_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dump_errors: false,
            indent: true,
            compression: None,
            not_found: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl Config {
    fn from_options<'a>(options: impl IntoIterator<Item = &'a RouteOption>) -> Self {
        let mut config = Self::default();
        for option in options {
            match option {
                RouteOption::NotFound(handler) => config.not_found = Some(handler.clone()),
                RouteOption::DisableIndent => config.indent = false,
                RouteOption::Compression(level) => config.compression = Some(*level),
                RouteOption::DumpErrors(on) => config.dump_errors = *on,
                RouteOption::MaxBodySize(limit) => config.max_body_size = *limit,
            }
        }
        config
    }
}

// ── Shared table ──────────────────────────────────────────────────────────────

struct Table {
    routes: HashMap<Method, MatchitRouter<Route>>,
    groups: Vec<Group>,
}

struct Group {
    parent: Option<usize>,
    middleware: Vec<Middleware>,
    options: Vec<RouteOption>,
    config: Arc<Config>,
}

#[derive(Clone)]
struct Route {
    endpoint: Endpoint,
    group: usize,
    pattern: Arc<str>,
}

/// What the table says about one request.
pub(crate) enum Resolution {
    Matched {
        endpoint: Endpoint,
        /// Outermost layer first: root middleware, then each subgroup's.
        chain: Vec<Middleware>,
        config: Arc<Config>,
        params: Vec<(String, String)>,
        pattern: Arc<str>,
    },
    /// No route; carries the root configuration.
    Missing { config: Arc<Config> },
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router, and every group created from it.
///
/// Build it once at startup, register routes, then hand it to
/// [`Server::serve`](crate::Server::serve) or call
/// [`dispatch`](Router::dispatch) yourself.
///
/// ```rust
/// use jsonrest::{middleware, Error, Json, Request, RouteOption, Router};
/// use serde_json::{json, Value};
///
/// async fn get_user(req: Request) -> Result<Json<Value>, Error> {
///     Ok(Json(json!({"id": req.param("id")})))
/// }
///
/// let router = Router::with_options([RouteOption::compression(6)]);
/// router.use_middleware(middleware::trace());
///
/// let api = router.group_with([RouteOption::DisableIndent]);
/// api.get("/users/{id}", get_user);
/// ```
#[derive(Clone)]
pub struct Router {
    table: Arc<RwLock<Table>>,
    group: usize,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options([])
    }

    /// A root router configured by `options`, applied in order.
    pub fn with_options(options: impl IntoIterator<Item = RouteOption>) -> Self {
        let options: Vec<RouteOption> = options.into_iter().collect();
        let root = Group {
            parent: None,
            middleware: Vec::new(),
            config: Arc::new(Config::from_options(&options)),
            options,
        };
        Self {
            table: Arc::new(RwLock::new(Table { routes: HashMap::new(), groups: vec![root] })),
            group: 0,
        }
    }

    /// A subgroup inheriting this group's options and middleware.
    pub fn group(&self) -> Router {
        self.group_with([])
    }

    /// A subgroup that replays this group's options, then applies `options`.
    pub fn group_with(&self, options: impl IntoIterator<Item = RouteOption>) -> Router {
        let options: Vec<RouteOption> = options.into_iter().collect();
        let mut table = self.write();
        let mut inherited = table.groups[self.group].options.clone();
        inherited.extend(options);
        let config = Arc::new(Config::from_options(&inherited));
        table.groups.push(Group {
            parent: Some(self.group),
            middleware: Vec::new(),
            options: inherited,
            config,
        });
        Router { table: Arc::clone(&self.table), group: table.groups.len() - 1 }
    }

    /// Appends a middleware to this group.
    pub fn use_middleware<M>(&self, middleware: M) -> &Self
    where
        M: Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
    {
        self.write().groups[self.group].middleware.push(Arc::new(middleware));
        self
    }

    /// Appends several middleware to this group, in order.
    pub fn use_all(&self, middleware: impl IntoIterator<Item = Middleware>) -> &Self {
        let middleware: Vec<Middleware> = middleware.into_iter().collect();
        self.write().groups[self.group].middleware.extend(middleware);
        self
    }

    pub fn get(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::GET, path, handler)
    }

    pub fn head(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::HEAD, path, handler)
    }

    pub fn post(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::POST, path, handler)
    }

    pub fn put(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PUT, path, handler)
    }

    pub fn patch(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PATCH, path, handler)
    }

    pub fn delete(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::DELETE, path, handler)
    }

    pub fn options(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::OPTIONS, path, handler)
    }

    /// Registers `handler` for `method` + `path` in this group.
    ///
    /// Path parameters use `{name}` syntax, catch-alls `{*name}`.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is invalid or conflicts with a registered route.
    pub fn handle(&self, method: Method, path: &str, handler: impl Handler) -> &Self {
        self.insert(method, path, handler.into_endpoint())
    }

    /// Registers every `"METHOD PATH"` entry of `routes`.
    ///
    /// ```rust
    /// use jsonrest::{Endpoint, Error, Request, Router};
    ///
    /// async fn ping(_req: Request) -> Result<(), Error> { Ok(()) }
    ///
    /// Router::new().routes([
    ///     ("GET  /ping", Endpoint::new(ping)),
    ///     ("HEAD /ping", Endpoint::new(ping)),
    /// ]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on a key that is not exactly two whitespace-separated tokens,
    /// on an invalid method token, and wherever [`handle`](Self::handle) does.
    pub fn routes<K: AsRef<str>>(&self, routes: impl IntoIterator<Item = (K, Endpoint)>) -> &Self {
        for (key, endpoint) in routes {
            let key = key.as_ref();
            let tokens: Vec<&str> = key.split_whitespace().collect();
            let [method, path] = tokens.as_slice() else {
                panic!("invalid route map key {key:?}: expected \"METHOD PATH\"");
            };
            let method = Method::from_bytes(method.as_bytes())
                .unwrap_or_else(|e| panic!("invalid route map key {key:?}: {e}"));
            self.insert(method, path, endpoint);
        }
        self
    }

    fn insert(&self, method: Method, path: &str, endpoint: Endpoint) -> &Self {
        let route = Route { endpoint, group: self.group, pattern: Arc::from(path) };
        // The guard is released before panicking so the table stays usable.
        let inserted = self.write().routes.entry(method.clone()).or_default().insert(path, route);
        if let Err(e) = inserted {
            panic!("invalid route `{method} {path}`: {e}");
        }
        self
    }

    /// The configuration of this group.
    pub(crate) fn config(&self) -> Arc<Config> {
        Arc::clone(&self.read().groups[self.group].config)
    }

    /// Looks up `method` + `path` and collects everything dispatch needs,
    /// so no lock is held while the request runs.
    pub(crate) fn resolve(&self, method: &Method, path: &str) -> Resolution {
        let table = self.read();
        let Some(matched) = table.routes.get(method).and_then(|tree| tree.at(path).ok()) else {
            return Resolution::Missing { config: Arc::clone(&table.groups[0].config) };
        };

        let route = matched.value;
        // Matching runs on the raw path; values are handed out decoded.
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();

        let mut lineage = Vec::new();
        let mut group = Some(route.group);
        while let Some(index) = group {
            lineage.push(index);
            group = table.groups[index].parent;
        }
        let groups = &table.groups;
        let chain = lineage.iter().rev()
            .flat_map(move |&index| groups[index].middleware.iter().cloned())
            .collect();

        Resolution::Matched {
            endpoint: route.endpoint.clone(),
            chain,
            config: Arc::clone(&table.groups[route.group].config),
            params,
            pattern: Arc::clone(&route.pattern),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::request::Request;

    async fn ok(_req: Request) -> Result<(), Error> {
        Ok(())
    }

    fn noop(next: Endpoint) -> Endpoint {
        next
    }

    #[test]
    fn later_options_win() {
        let config = Config::from_options(&[
            RouteOption::DumpErrors(true),
            RouteOption::DisableIndent,
            RouteOption::DumpErrors(false),
        ]);
        assert!(!config.dump_errors);
        assert!(!config.indent);
    }

    #[test]
    fn groups_replay_parent_options_first() {
        let router = Router::with_options([RouteOption::DisableIndent]);
        let child = router.group_with([RouteOption::DumpErrors(true)]);
        let grandchild = child.group();
        let config = grandchild.config();
        assert!(!config.indent);
        assert!(config.dump_errors);
        assert!(!router.config().dump_errors);
    }

    #[test]
    fn resolve_extracts_params_and_pattern() {
        let router = Router::new();
        router.get("/users/{id}", ok);
        let Resolution::Matched { params, pattern, .. } = router.resolve(&Method::GET, "/users/42") else {
            panic!("route not matched");
        };
        assert_eq!(params, [("id".to_owned(), "42".to_owned())]);
        assert_eq!(&*pattern, "/users/{id}");
        assert!(matches!(router.resolve(&Method::POST, "/users/42"), Resolution::Missing { .. }));
    }

    #[test]
    fn params_are_percent_decoded() {
        let router = Router::new();
        router.get("/users/{name}/{*rest}", ok);
        let Resolution::Matched { params, .. } = router.resolve(&Method::GET, "/users/john%20doe/a%2Fb/c") else {
            panic!("route not matched");
        };
        assert_eq!(
            params,
            [("name".to_owned(), "john doe".to_owned()), ("rest".to_owned(), "a/b/c".to_owned())]
        );
    }

    #[test]
    fn body_limit_is_inherited_and_overridable() {
        let router = Router::new();
        assert_eq!(router.config().max_body_size, DEFAULT_MAX_BODY_SIZE);
        let uploads = router.group_with([RouteOption::MaxBodySize(64 << 20)]);
        assert_eq!(uploads.group().config().max_body_size, 64 << 20);
        assert_eq!(router.config().max_body_size, DEFAULT_MAX_BODY_SIZE);
    }

    #[test]
    fn chain_runs_root_to_leaf() {
        let router = Router::new();
        router.use_middleware(noop).use_middleware(noop);
        let child = router.group();
        child.use_middleware(noop);
        child.get("/child", ok);
        router.get("/root", ok);

        let chain_len = |path| match router.resolve(&Method::GET, path) {
            Resolution::Matched { chain, .. } => chain.len(),
            Resolution::Missing { .. } => panic!("{path} not matched"),
        };
        assert_eq!(chain_len("/child"), 3);
        assert_eq!(chain_len("/root"), 2);

        // Added after registration, still picked up.
        child.use_middleware(noop);
        assert_eq!(chain_len("/child"), 4);
    }

    #[test]
    fn groups_share_one_table() {
        let router = Router::new();
        router.group().group().get("/deep", ok);
        assert!(matches!(router.resolve(&Method::GET, "/deep"), Resolution::Matched { .. }));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn duplicate_route_panics() {
        let router = Router::new();
        router.get("/dup", ok);
        router.group().get("/dup", ok);
    }

    #[test]
    #[should_panic(expected = "invalid route map key")]
    fn malformed_route_map_key_panics() {
        Router::new().routes([("GET/oops", Endpoint::new(ok))]);
    }

    #[test]
    #[should_panic(expected = "invalid route map key")]
    fn route_map_key_with_extra_tokens_panics() {
        Router::new().routes([("GET /a /b", Endpoint::new(ok))]);
    }

    #[test]
    fn route_map_registers_each_entry() {
        let router = Router::new();
        router.routes([
            ("GET  /ping", Endpoint::new(ok)),
            ("POST\t/api/update", Endpoint::new(ok)),
        ]);
        assert!(matches!(router.resolve(&Method::GET, "/ping"), Resolution::Matched { .. }));
        assert!(matches!(router.resolve(&Method::POST, "/api/update"), Resolution::Matched { .. }));
    }

    #[test]
    #[should_panic(expected = "invalid gzip compression level")]
    fn compression_level_is_validated() {
        RouteOption::compression(10);
    }
}
