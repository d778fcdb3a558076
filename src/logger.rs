use std::{
    borrow::Cow,
    collections::HashSet,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Instant,
};

use futures_core::ready;
use pin_project_lite::pin_project;
use regex::Regex;
use time::{OffsetDateTime, UtcOffset};

use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, Result};

use crate::format::{ListFields, LogFormat, format_millis, local_offset};
use crate::resolver::{Exchange, ResolutionField, Resolvers};
use crate::sink::Sink;

/// Middleware writing one Common or Apache Combined Log Format line per request.
///
/// # Default Format
/// The [`default`](AccessLogger::default) logger uses [`LogFormat::Common`], local time,
/// measures handler duration and writes through the `log` crate.
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_accesslog::{AccessLogger, LogFormat};
///
/// let app = App::new()
///     .wrap(AccessLogger::new(LogFormat::ApacheCombined).utc(true));
/// ```
pub struct AccessLogger(Rc<Inner>);

type Clock = Rc<dyn Fn() -> OffsetDateTime>;

struct Inner {
    /// `None` turns the middleware into a pass-through.
    format: Option<LogFormat>,
    offset: UtcOffset,
    include_duration: bool,
    resolvers: Resolvers,
    combined_headers: (HeaderName, HeaderName),
    sink: Sink,
    clock: Clock,
    exclude: HashSet<String>,
    exclude_regex: Vec<Regex>,
}

impl AccessLogger {
    /// Create `AccessLogger` middleware writing lines in `format`.
    pub fn new(format: LogFormat) -> AccessLogger {
        AccessLogger(Rc::new(Inner {
            format: Some(format),
            offset: local_offset(),
            include_duration: true,
            resolvers: Resolvers::default(),
            combined_headers: (
                HeaderName::from_static("referer"),
                HeaderName::from_static("user-agent"),
            ),
            sink: Sink::default(),
            clock: Rc::new(OffsetDateTime::now_utc),
            exclude: HashSet::new(),
            exclude_regex: Vec::new(),
        }))
    }

    /// Create `AccessLogger` middleware from a format name such as `"common"` or `"combined"`.
    ///
    /// An unknown name yields a middleware that passes every request through untouched and
    /// writes nothing.
    pub fn from_name(name: &str) -> AccessLogger {
        match name.parse::<LogFormat>() {
            Ok(format) => AccessLogger::new(format),
            Err(err) => {
                log::debug!("{err}, access logging disabled");
                let mut logger = AccessLogger::default();
                Rc::get_mut(&mut logger.0).unwrap().format = None;
                logger
            }
        }
    }

    /// Render timestamps in UTC instead of the local offset.
    pub fn utc(mut self, utc: bool) -> Self {
        let inner = Rc::get_mut(&mut self.0).unwrap();
        inner.offset = if utc { UtcOffset::UTC } else { local_offset() };
        self
    }

    /// Measure handler duration, append it to the line and set the `Server-Timing` header.
    pub fn include_duration(mut self, include: bool) -> Self {
        Rc::get_mut(&mut self.0).unwrap().include_duration = include;
        self
    }

    /// Set the resolver for one of the deployment specific fields.
    ///
    /// # Examples
    /// ```rust
    /// use actix_web_middleware_accesslog::{AccessLogger, ResolutionField, resolver};
    ///
    /// let logger = AccessLogger::default()
    ///     .resolver(ResolutionField::AuthUser, |ex| {
    ///         ex.request()
    ///             .headers()
    ///             .get("x-user")
    ///             .and_then(|v| v.to_str().ok())
    ///             .unwrap_or("-")
    ///             .to_string()
    ///     })
    ///     .resolver_rc(ResolutionField::Bytes, resolver::body_size());
    /// ```
    pub fn resolver<F>(self, field: ResolutionField, resolver: F) -> Self
    where
        F: Fn(&Exchange<'_>) -> String + 'static,
    {
        self.resolver_rc(field, Rc::new(resolver))
    }

    /// Same as [`resolver`](AccessLogger::resolver) for an already shared resolver.
    pub fn resolver_rc(mut self, field: ResolutionField, resolver: crate::Resolver) -> Self {
        Rc::get_mut(&mut self.0)
            .unwrap()
            .resolvers
            .set(field, resolver);
        self
    }

    /// Request headers appended in [`LogFormat::ApacheCombined`]. Defaults to
    /// `Referer` and `User-Agent`.
    ///
    /// # Panics
    /// Panics if either name is not a valid header name.
    pub fn combined_headers(mut self, first: &str, second: &str) -> Self {
        Rc::get_mut(&mut self.0).unwrap().combined_headers = (
            HeaderName::try_from(first).unwrap(),
            HeaderName::try_from(second).unwrap(),
        );
        self
    }

    /// Send finished lines to `sink`.
    pub fn sink(mut self, sink: Sink) -> Self {
        Rc::get_mut(&mut self.0).unwrap().sink = sink;
        self
    }

    /// Write through the `log` crate with `target`.
    ///
    /// By default, the log target is `actix_web_middleware_accesslog::logger`.
    ///
    /// # Examples
    /// Using `.log_target("http_access")` would have this effect on request logs:
    /// ```diff
    /// - [2015-10-21T07:28:00Z INFO  actix_web_middleware_accesslog::logger] 127.0.0.1 - - [21/Oct/2015:07:28:00 +0000] "GET http://localhost/" 200 - 0.4ms
    /// + [2015-10-21T07:28:00Z INFO  http_access] 127.0.0.1 - - [21/Oct/2015:07:28:00 +0000] "GET http://localhost/" 200 - 0.4ms
    ///                               ^^^^^^^^^^^
    /// ```
    pub fn log_target(self, target: impl Into<Cow<'static, str>>) -> Self {
        self.sink(Sink::Log {
            target: target.into(),
        })
    }

    /// Replace the wall clock used for the request timestamp.
    pub fn clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> OffsetDateTime + 'static,
    {
        Rc::get_mut(&mut self.0).unwrap().clock = Rc::new(clock);
        self
    }

    /// Ignore and do not log access info for specified path.
    pub fn exclude<T: Into<String>>(mut self, path: T) -> Self {
        Rc::get_mut(&mut self.0)
            .unwrap()
            .exclude
            .insert(path.into());
        self
    }

    /// Ignore and do not log access info for paths that match regex.
    ///
    /// # Panics
    /// Panics if `path` is not a valid regular expression.
    pub fn exclude_regex<T: Into<String>>(mut self, path: T) -> Self {
        let inner = Rc::get_mut(&mut self.0).unwrap();
        inner.exclude_regex.push(Regex::new(&path.into()).unwrap());
        self
    }
}

impl Default for AccessLogger {
    /// Create `AccessLogger` middleware with:
    /// - Common Log Format
    /// - local time
    /// - handler duration
    /// - `-` for rfc931, authuser and bytes
    fn default() -> Self {
        AccessLogger::new(LogFormat::default())
    }
}

impl Inner {
    fn excluded(&self, path: &str) -> bool {
        self.exclude.contains(path) || self.exclude_regex.iter().any(|r| r.is_match(path))
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AccessLoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLoggerMiddlewareService {
            service,
            inner: Rc::clone(&self.0),
        }))
    }
}

/// Access logger middleware service.
pub struct AccessLoggerMiddlewareService<S> {
    inner: Rc<Inner>,
    service: S,
}

impl<S, B> Service<ServiceRequest> for AccessLoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = AccessLoggerResponse<S, B>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let fields = match self.inner.format {
            Some(format) if !self.inner.excluded(req.path()) => {
                let now = (self.inner.clock)().to_offset(self.inner.offset);
                let mut fields =
                    format.fields(&self.inner.combined_headers, self.inner.include_duration);
                fields.render_request(now, &req);
                Some(fields)
            }
            _ => None,
        };

        AccessLoggerResponse {
            inner: Rc::clone(&self.inner),
            fields,
            start: Instant::now(),
            fut: self.service.call(req),
            _phantom: PhantomData,
        }
    }
}

pin_project! {
    pub struct AccessLoggerResponse<S, B>
    where
        B: MessageBody,
        S: Service<ServiceRequest>,
    {
        #[pin]
        fut: S::Future,
        start: Instant,
        fields: Option<ListFields>,
        inner: Rc<Inner>,
        _phantom: PhantomData<B>,
    }
}

impl<S, B> Future for AccessLoggerResponse<S, B>
where
    B: MessageBody,
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Output = Result<ServiceResponse<B>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        // a failed continuation propagates without a log line
        let mut res = ready!(this.fut.poll(cx))?;
        let elapsed = this.start.elapsed();

        let Some(mut fields) = this.fields.take() else {
            return Poll::Ready(Ok(res));
        };
        let inner = &**this.inner;

        if inner.include_duration {
            let timing = format!("handler;dur={}", format_millis(elapsed));
            if let Ok(value) = HeaderValue::from_str(&timing) {
                res.headers_mut()
                    .insert(HeaderName::from_static("server-timing"), value);
            }
        }

        // swap the body out so resolvers see a non-generic response
        let (req, res) = res.into_parts();
        let (res, body) = res.into_parts();
        let body_size = body.size();

        let temp_res = ServiceResponse::new(req, res.map_into_boxed_body());
        fields.render_response(&Exchange::new(&temp_res, body_size), &inner.resolvers);
        fields.render_duration(elapsed);

        inner.sink.emit(&fields.line());

        let (req, res) = temp_res.into_parts();
        Poll::Ready(Ok(ServiceResponse::new(req, res.set_body(body))))
    }
}
