//! Request classification and route matching
//!
//! A request is reduced to a method set and a stack of path segments. The
//! router pops segments off the stack while walking an endpoint family and
//! records whether the resource and the method matched.

use std::fmt;

use crate::error::{GatewayError, GatewayResult};

/// Bitmask over the HTTP methods the gateway understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodSet(u8);

impl MethodSet {
    pub const EMPTY: MethodSet = MethodSet(0);
    pub const GET: MethodSet = MethodSet(1);
    pub const POST: MethodSet = MethodSet(1 << 1);
    pub const PUT: MethodSet = MethodSet(1 << 2);
    pub const DELETE: MethodSet = MethodSet(1 << 3);

    /// Exact, case-sensitive match; anything unrecognised is the empty set
    pub fn from_method(method: &str) -> Self {
        match method {
            "GET" => Self::GET,
            "POST" => Self::POST,
            "PUT" => Self::PUT,
            "DELETE" => Self::DELETE,
            _ => Self::EMPTY,
        }
    }

    pub fn contains(self, other: MethodSet) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: MethodSet) -> Self {
        MethodSet(self.0 | other.0)
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::GET, "GET"),
            (Self::POST, "POST"),
            (Self::PUT, "PUT"),
            (Self::DELETE, "DELETE"),
        ]
        .iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Path segments in order, consumed from the front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStack {
    segments: Vec<String>,
    pos: usize,
}

impl SegmentStack {
    pub fn parse(path: &str) -> Self {
        let path = path.split('?').next().unwrap_or_default();
        let path = path.strip_prefix('/').unwrap_or(path);
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments, pos: 0 }
    }

    pub fn top(&self) -> Option<&str> {
        self.segments.get(self.pos).map(String::as_str)
    }

    pub fn pop(&mut self) -> Option<String> {
        let segment = self.segments.get(self.pos).cloned()?;
        self.pos += 1;
        Some(segment)
    }

    /// Segments not yet popped
    pub fn remaining(&self) -> &[String] {
        &self.segments[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.segments.len()
    }
}

/// A request reduced to what routing needs
#[derive(Debug, Clone)]
pub struct ClassifiedRequest {
    pub methods: MethodSet,
    pub segments: SegmentStack,
}

pub fn classify(method: &str, path: &str) -> ClassifiedRequest {
    ClassifiedRequest {
        methods: MethodSet::from_method(method),
        segments: SegmentStack::parse(path),
    }
}

/// Match flags, both unset at the start of every request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteState {
    pub match_uri: bool,
    pub match_method: bool,
}

/// Where a request is dispatched once both flags are set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/api/<command>[/extra...]`
    Api { command: String, extra: Vec<String> },
    /// `POST /rpc`
    Rpc,
}

impl ClassifiedRequest {
    /// Walk the endpoint families and decide the route
    pub fn route(&mut self) -> GatewayResult<Route> {
        let mut state = RouteState::default();

        let family = self.segments.top().map(str::to_string);
        let route = match family.as_deref() {
            Some("api") => {
                self.segments.pop();
                let command = self.segments.pop();
                if command.is_some() {
                    state.match_uri = true;
                }
                if !self.methods.is_empty() {
                    state.match_method = true;
                }
                command.map(|command| Route::Api {
                    command,
                    extra: self.segments.remaining().to_vec(),
                })
            }
            Some("rpc") => {
                self.segments.pop();
                if self.segments.is_empty() {
                    state.match_uri = true;
                }
                if self.methods.contains(MethodSet::POST) {
                    state.match_method = true;
                }
                Some(Route::Rpc)
            }
            other => {
                return Err(GatewayError::Forbidden(format!(
                    "unknown endpoint family: {}",
                    other.unwrap_or("/")
                )));
            }
        };

        match (state.match_uri, state.match_method, route) {
            (true, true, Some(route)) => Ok(route),
            (true, false, _) => Err(GatewayError::MethodNotAllowed(format!(
                "method {} not allowed",
                self.methods
            ))),
            _ => Err(GatewayError::NotFound("no such resource".to_string())),
        }
    }
}
