use crate::error::DispatchError;
use crate::response::Response;
use crate::session::Session;
use tracing::debug;

/// Values a predicate extracted from the line, handed to the matching handler so it does
/// not have to parse the line again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    groups: Vec<Option<String>>,
}

impl Captures {
    /// A match with nothing captured.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_regex(caps: &regex::Captures<'_>) -> Self {
        Self {
            groups: caps
                .iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    pub fn with(mut self, value: impl Into<String>) -> Self {
        self.groups.push(Some(value.into()));
        self
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        self.groups.get(i).and_then(|g| g.as_deref())
    }
}

/// One route of the table: a side-effect free predicate and the handler it guards.
pub trait Handler {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// `Some` when this handler claims the line. Must not change anything.
    fn matches(&self, line: &str, session: &Session) -> Option<Captures>;

    fn handle(&self, line: &str, captures: Captures, session: &mut Session) -> Response;
}

/// The handler that runs when no route claims a line.
pub trait Fallback {
    fn handle(&self, line: &str, session: &mut Session) -> Response;
}

/// Ordered routes plus a mandatory fallback. Built once, then read-only.
///
/// Example
/// ```
/// use kidshell::dispatch::{Fallback, HandlerTable};
/// use kidshell::response::Response;
/// use kidshell::session::Session;
///
/// struct Echo;
/// impl Fallback for Echo {
///     fn handle(&self, line: &str, _session: &mut Session) -> Response {
///         Response::text(line)
///     }
/// }
///
/// let table = HandlerTable::builder().fallback(Echo).build().unwrap();
/// assert_eq!(table.route_names().len(), 0);
/// ```
pub struct HandlerTable {
    routes: Vec<Box<dyn Handler + Send + Sync>>,
    fallback: Box<dyn Fallback + Send + Sync>,
}

impl HandlerTable {
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// Run exactly one handler for `line`: the first route whose predicate matches, or the
    /// fallback.
    pub fn dispatch(&self, line: &str, session: &mut Session) -> Response {
        for route in &self.routes {
            if let Some(captures) = route.matches(line, session) {
                debug!(handler = route.name(), "dispatch");
                return route.handle(line, captures, session);
            }
        }
        debug!(handler = "fallback", "dispatch");
        self.fallback.handle(line, session)
    }

    pub fn route_names(&self) -> Vec<&'static str> {
        self.routes.iter().map(|r| r.name()).collect()
    }
}

#[derive(Default)]
pub struct HandlerTableBuilder {
    routes: Vec<Box<dyn Handler + Send + Sync>>,
    fallback: Option<Box<dyn Fallback + Send + Sync>>,
}

impl HandlerTableBuilder {
    /// Append a route; earlier routes take precedence.
    pub fn route(mut self, handler: impl Handler + Send + Sync + 'static) -> Self {
        self.routes.push(Box::new(handler));
        self
    }

    pub fn fallback(mut self, fallback: impl Fallback + Send + Sync + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn build(self) -> Result<HandlerTable, DispatchError> {
        let fallback = self.fallback.ok_or(DispatchError::MissingFallback)?;
        Ok(HandlerTable {
            routes: self.routes,
            fallback,
        })
    }
}
