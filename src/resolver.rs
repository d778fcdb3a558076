//! Pluggable resolvers for the fields a middleware cannot know on its own.
//!
//! Common Log Format reserves three columns that depend on the deployment: the
//! RFC 931 identity of the client, the authenticated user and the number of
//! bytes sent. Each of them is produced by a [`Resolver`]; unset resolvers
//! render the `-` placeholder.

use std::{fmt, net::SocketAddr, rc::Rc};

use actix_web::body::BodySize;
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::http::header::HeaderName;
use actix_web::{HttpRequest, HttpResponse};

/// Placeholder rendered for any value that is unknown.
pub const PLACEHOLDER: &str = "-";

/// Fields whose value is computed by a user supplied [`Resolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionField {
    /// RFC 931 identity of the client.
    Rfc931,
    /// Authenticated user name.
    AuthUser,
    /// Size of the response body in bytes.
    Bytes,
}

/// Function computing one field of the log line from a finished exchange.
pub type Resolver = Rc<dyn Fn(&Exchange<'_>) -> String>;

/// Read-only view of a request and its response handed to resolvers.
pub struct Exchange<'a> {
    res: &'a ServiceResponse,
    body_size: BodySize,
}

impl<'a> Exchange<'a> {
    pub(crate) fn new(res: &'a ServiceResponse, body_size: BodySize) -> Self {
        Exchange { res, body_size }
    }

    /// Inbound request.
    pub fn request(&self) -> &HttpRequest {
        self.res.request()
    }

    /// Response head. The body is not available to resolvers, see [`Exchange::body_size`].
    pub fn response(&self) -> &HttpResponse {
        self.res.response()
    }

    pub fn status(&self) -> StatusCode {
        self.res.status()
    }

    /// Remote address of the connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.res.request().peer_addr()
    }

    /// Size of the response body as declared by the body type.
    pub fn body_size(&self) -> BodySize {
        self.body_size
    }
}

/// Resolver that always renders the `-` placeholder.
pub fn placeholder() -> Resolver {
    Rc::new(|_: &Exchange<'_>| PLACEHOLDER.to_string())
}

/// Resolver that renders the declared response body size.
///
/// Streaming bodies have no size known up front and render as `-`.
pub fn body_size() -> Resolver {
    Rc::new(|exchange: &Exchange<'_>| match exchange.body_size() {
        BodySize::Sized(size) => size.to_string(),
        BodySize::None | BodySize::Stream => PLACEHOLDER.to_string(),
    })
}

/// Resolver that renders the raw value of a request header, e.g. a user name
/// set by an authenticating reverse proxy.
///
/// # Panics
/// Panics if `header` is not a valid header name.
pub fn request_header(header: &str) -> Resolver {
    let header = HeaderName::try_from(header).unwrap();
    Rc::new(move |exchange: &Exchange<'_>| {
        exchange
            .request()
            .headers()
            .get(&header)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(PLACEHOLDER)
            .to_string()
    })
}

/// One resolver per [`ResolutionField`].
pub(crate) struct Resolvers {
    rfc931: Resolver,
    auth_user: Resolver,
    bytes: Resolver,
}

impl Default for Resolvers {
    fn default() -> Self {
        Resolvers {
            rfc931: placeholder(),
            auth_user: placeholder(),
            bytes: placeholder(),
        }
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvers").finish_non_exhaustive()
    }
}

impl Resolvers {
    fn slot(&mut self, field: ResolutionField) -> &mut Resolver {
        match field {
            ResolutionField::Rfc931 => &mut self.rfc931,
            ResolutionField::AuthUser => &mut self.auth_user,
            ResolutionField::Bytes => &mut self.bytes,
        }
    }

    pub(crate) fn set(&mut self, field: ResolutionField, resolver: Resolver) {
        *self.slot(field) = resolver;
    }

    /// Runs the resolver for `field`. Empty results are replaced by `-`.
    pub(crate) fn resolve(&self, field: ResolutionField, exchange: &Exchange<'_>) -> String {
        let resolver = match field {
            ResolutionField::Rfc931 => &self.rfc931,
            ResolutionField::AuthUser => &self.auth_user,
            ResolutionField::Bytes => &self.bytes,
        };
        let value = resolver(exchange);
        if value.is_empty() {
            PLACEHOLDER.to_string()
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;
    use actix_web::test::TestRequest;

    fn exchange_parts(req: HttpRequest, body: &'static str) -> (ServiceResponse, BodySize) {
        let size = body.size();
        (ServiceResponse::new(req, HttpResponse::Ok().finish()), size)
    }

    #[test]
    fn test_default_resolvers_render_placeholder() {
        let (res, size) = exchange_parts(TestRequest::default().to_http_request(), "hello");
        let exchange = Exchange::new(&res, size);
        let resolvers = Resolvers::default();

        for field in [
            ResolutionField::Rfc931,
            ResolutionField::AuthUser,
            ResolutionField::Bytes,
        ] {
            assert_eq!(resolvers.resolve(field, &exchange), "-");
        }
    }

    #[test]
    fn test_set_replaces_single_slot() {
        let (res, size) = exchange_parts(TestRequest::default().to_http_request(), "hello");
        let exchange = Exchange::new(&res, size);
        let mut resolvers = Resolvers::default();
        resolvers.set(
            ResolutionField::AuthUser,
            Rc::new(|_: &Exchange<'_>| "frank".to_string()),
        );

        assert_eq!(resolvers.resolve(ResolutionField::AuthUser, &exchange), "frank");
        assert_eq!(resolvers.resolve(ResolutionField::Rfc931, &exchange), "-");
        assert_eq!(resolvers.resolve(ResolutionField::Bytes, &exchange), "-");
    }

    #[test]
    fn test_empty_result_becomes_placeholder() {
        let (res, size) = exchange_parts(TestRequest::default().to_http_request(), "");
        let exchange = Exchange::new(&res, size);
        let mut resolvers = Resolvers::default();
        resolvers.set(ResolutionField::Rfc931, Rc::new(|_: &Exchange<'_>| String::new()));

        assert_eq!(resolvers.resolve(ResolutionField::Rfc931, &exchange), "-");
    }

    #[test]
    fn test_body_size_resolver() {
        let (res, size) = exchange_parts(TestRequest::default().to_http_request(), "hello");
        assert_eq!(body_size()(&Exchange::new(&res, size)), "5");
        assert_eq!(body_size()(&Exchange::new(&res, BodySize::Stream)), "-");
    }

    #[test]
    fn test_request_header_resolver() {
        let req = TestRequest::default()
            .insert_header(("x-remote-user", "alice"))
            .to_http_request();
        let (res, size) = exchange_parts(req, "");
        let exchange = Exchange::new(&res, size);

        assert_eq!(request_header("x-remote-user")(&exchange), "alice");
        assert_eq!(request_header("x-missing")(&exchange), "-");
    }

    #[test]
    fn test_exchange_accessors() {
        let req = TestRequest::default()
            .peer_addr("203.0.113.5:4000".parse().unwrap())
            .to_http_request();
        let (res, size) = exchange_parts(req, "abc");
        let exchange = Exchange::new(&res, size);

        assert_eq!(exchange.status(), StatusCode::OK);
        assert_eq!(exchange.peer_addr(), Some("203.0.113.5:4000".parse().unwrap()));
        assert_eq!(exchange.body_size(), BodySize::Sized(3));
        assert_eq!(exchange.request().path(), "/");
        assert_eq!(exchange.response().status(), StatusCode::OK);
    }
}
