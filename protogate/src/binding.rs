//! Transport bindings read from method options, and request-object
//! resolution for the JSON/REST transport.

use std::collections::BTreeMap;
use std::fmt;

use protogate_core::RpcError;
use serde_json::{Map, Value};

/// HTTP methods a method can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Order in which the option keys are consulted; the first one set wins.
    pub const PRIORITY: [HttpMethod; 4] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
    ];

    /// Lowercase name, as used in option keys and OpenAPI documents.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
        }
    }

    pub fn to_method(self) -> http::Method {
        match self {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
        }
    }

    fn option_name(self) -> &'static str {
        match self {
            HttpMethod::Get => "http.get",
            HttpMethod::Post => "http.post",
            HttpMethod::Put => "http.put",
            HttpMethod::Delete => "http.delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_method().as_str())
    }
}

/// Where the request body goes in the request object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BodyPolicy {
    /// `"*"`: merge the body's top-level fields.
    Merge,
    /// `""`: ignore the body.
    #[default]
    Ignore,
    /// Any other value: store the whole body under this field.
    Field(String),
}

impl BodyPolicy {
    pub fn parse(value: &str) -> Self {
        match value {
            "*" => BodyPolicy::Merge,
            "" => BodyPolicy::Ignore,
            field => BodyPolicy::Field(field.to_string()),
        }
    }

    /// Whether the transport needs to read the body at all.
    pub fn reads_body(&self) -> bool {
        !matches!(self, BodyPolicy::Ignore)
    }
}

/// The HTTP binding of one method: verb, path template and body policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportBinding {
    pub method: HttpMethod,
    /// Path template as declared, e.g. `/v1/action/:random`.
    pub path: String,
    pub body: BodyPolicy,
}

impl TransportBinding {
    /// Read the binding from a method's option map.
    ///
    /// Keys are matched by suffix (`google.api.http.get`,
    /// `(google.api.http).get`, `http.get`, ...). Values that are not
    /// non-empty strings are treated as absent. When several verbs are set
    /// the first in [`HttpMethod::PRIORITY`] wins. Returns `None` when the
    /// method is not exposed over HTTP.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use protogate::{BodyPolicy, HttpMethod, TransportBinding};
    ///
    /// let mut options = BTreeMap::new();
    /// options.insert("google.api.http.post".to_string(), "/v1/action".into());
    /// options.insert("google.api.http.body".to_string(), "*".into());
    ///
    /// let binding = TransportBinding::resolve(&options).unwrap();
    /// assert_eq!(binding.method, HttpMethod::Post);
    /// assert_eq!(binding.body, BodyPolicy::Merge);
    /// ```
    pub fn resolve(options: &BTreeMap<String, Value>) -> Option<Self> {
        let (method, path) = Self::declared_methods(options).into_iter().next()?;
        let body = option_str(options, "http.body")
            .map(BodyPolicy::parse)
            .unwrap_or_default();
        Some(Self {
            method,
            path: path.to_string(),
            body,
        })
    }

    /// Every verb set in `options`, in priority order.
    pub fn declared_methods(options: &BTreeMap<String, Value>) -> Vec<(HttpMethod, &str)> {
        HttpMethod::PRIORITY
            .into_iter()
            .filter_map(|method| {
                option_str(options, method.option_name()).map(|path| (method, path))
            })
            .collect()
    }

    /// Names of the path parameters in the template.
    pub fn path_params(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter_map(|segment| match parse_segment(segment) {
                Segment::Param(name) => Some(name),
                Segment::Static(_) => None,
            })
            .collect()
    }
}

fn option_str<'a>(options: &'a BTreeMap<String, Value>, name: &str) -> Option<&'a str> {
    options
        .iter()
        .filter(|(key, _)| key_matches(key, name))
        .find_map(|(_, value)| value.as_str().filter(|s| !s.is_empty()))
}

fn key_matches(key: &str, name: &str) -> bool {
    let key: String = key.chars().filter(|c| !matches!(c, '(' | ')')).collect();
    key == name
        || key
            .strip_suffix(name)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
}

fn parse_segment(segment: &str) -> Segment<'_> {
    if let Some(name) = segment.strip_prefix(':') {
        return Segment::Param(name);
    }
    if let Some(inner) = segment
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        let name = inner.split('=').next().unwrap_or(inner);
        return Segment::Param(name);
    }
    Segment::Static(segment)
}

/// Join `prefix` and a path template into an axum route path.
///
/// `:name` and `{name=pattern}` segments become `{name}`.
pub(crate) fn route_path(prefix: &str, template: &str) -> String {
    let mut path = String::new();
    let prefix = prefix.trim_end_matches('/');
    if !prefix.is_empty() && !prefix.starts_with('/') {
        path.push('/');
    }
    path.push_str(prefix);

    let template = template.trim_start_matches('/');
    for segment in template.split('/') {
        path.push('/');
        match parse_segment(segment) {
            Segment::Param(name) => {
                path.push('{');
                path.push_str(name);
                path.push('}');
            }
            Segment::Static(text) => path.push_str(text),
        }
    }
    path
}

/// Whether two axum route paths cannot be registered side by side because
/// they capture different parameter names at the same position.
pub(crate) fn params_conflict(a: &str, b: &str) -> bool {
    for (left, right) in a.split('/').zip(b.split('/')) {
        match (parse_segment(left), parse_segment(right)) {
            (Segment::Static(l), Segment::Static(r)) if l == r => continue,
            (Segment::Param(l), Segment::Param(r)) if l == r => continue,
            (Segment::Param(_), Segment::Param(_)) => return true,
            _ => return false,
        }
    }
    false
}

/// Merge path parameters, query-string parameters and the body into one
/// plain request object.
///
/// Later sources win on key collisions. The body is applied according to
/// `policy`; with [`BodyPolicy::Merge`] it must be a JSON object.
pub fn resolve_request_object<I>(
    path_params: I,
    query: Option<&str>,
    body: Option<Value>,
    policy: &BodyPolicy,
) -> Result<Value, RpcError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut object: Map<String, Value> = path_params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        let params: Map<String, Value> = serde_qs::from_str(query)
            .map_err(|err| RpcError::invalid_argument(format!("invalid query string: {err}")))?;
        object.extend(params);
    }

    match policy {
        BodyPolicy::Ignore => {}
        BodyPolicy::Merge => match body {
            None | Some(Value::Null) => {}
            Some(Value::Object(fields)) => object.extend(fields),
            Some(_) => {
                return Err(RpcError::invalid_argument(
                    "request body must be a JSON object",
                ));
            }
        },
        BodyPolicy::Field(field) => {
            if let Some(body) = body {
                object.insert(field.clone(), body);
            }
        }
    }

    Ok(Value::Object(object))
}
