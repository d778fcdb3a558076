use std::{str::FromStr, time::Duration};

use time::{OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};

use actix_web::dev::ServiceRequest;
use actix_web::http::header::HeaderName;

use crate::resolver::{Exchange, PLACEHOLDER, ResolutionField, Resolvers};

/// `10/Oct/2000:13:55:36 -0700`
const TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!(
    "[day]/[month repr:short]/[year]:[hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
);

/// Layout of the access log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// `host rfc931 authuser [date] "method url" status bytes`
    #[default]
    Common,
    /// Common Log Format followed by the quoted `Referer` and `User-Agent` headers.
    ApacheCombined,
}

/// Returned when a log format name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown access log format: {0:?}")]
pub struct UnknownFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "common" | "clf" => Ok(LogFormat::Common),
            "combined" | "apache-combined" | "apache_combined" => Ok(LogFormat::ApacheCombined),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl LogFormat {
    /// Ordered fields of one log line in this format.
    pub(crate) fn fields(
        self,
        combined_headers: &(HeaderName, HeaderName),
        include_duration: bool,
    ) -> ListFields {
        let mut fields = vec![
            Field::RemoteHost,
            Field::Resolved(ResolutionField::Rfc931),
            Field::Resolved(ResolutionField::AuthUser),
            Field::Timestamp,
            Field::RequestLine,
            Field::Status,
            Field::Resolved(ResolutionField::Bytes),
        ];

        if self == LogFormat::ApacheCombined {
            fields.push(Field::Header(combined_headers.0.clone()));
            fields.push(Field::Header(combined_headers.1.clone()));
        }

        if include_duration {
            fields.push(Field::Duration);
        }

        ListFields(fields)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ListFields(pub(crate) Vec<Field>);

impl ListFields {
    pub(crate) fn render_request(&mut self, now: OffsetDateTime, req: &ServiceRequest) {
        for unit in &mut self.0 {
            unit.render_request(now, req);
        }
    }

    pub(crate) fn render_response(&mut self, exchange: &Exchange<'_>, resolvers: &Resolvers) {
        for unit in &mut self.0 {
            unit.render_response(exchange, resolvers);
        }
    }

    pub(crate) fn render_duration(&mut self, elapsed: Duration) {
        for unit in &mut self.0 {
            unit.render_duration(elapsed);
        }
    }

    /// Joins every field with a single space. No trailing newline.
    pub(crate) fn line(&self) -> String {
        self.0.iter().map(Field::value).collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Field {
    /// Rendered value.
    Value(String),
    /// IP address of the peer. Example: 203.0.113.5
    RemoteHost,
    /// Value produced by a resolver.
    Resolved(ResolutionField),
    /// Request time. Example: [10/Oct/2000:13:55:36 +0000]
    Timestamp,
    /// Quoted method and absolute URL. Example: "GET http://localhost/index.html"
    RequestLine,
    /// Numeric status code. Example: 200
    Status,
    /// Quoted request header value or `-`.
    Header(HeaderName),
    /// Handler duration. Example: 12.3ms
    Duration,
}

impl Field {
    fn value(&self) -> &str {
        match self {
            Field::Value(value) if !value.is_empty() => value,
            _ => PLACEHOLDER,
        }
    }

    fn render_request(&mut self, now: OffsetDateTime, req: &ServiceRequest) {
        match self {
            Field::RemoteHost => {
                *self = Field::Value(
                    req.peer_addr()
                        .map(|addr| addr.ip().to_string())
                        .unwrap_or_else(|| PLACEHOLDER.to_string()),
                );
            }

            Field::Timestamp => {
                *self = Field::Value(format_timestamp(now));
            }

            Field::RequestLine => {
                *self = Field::Value(format!("\"{} {}\"", req.method(), absolute_url(req)));
            }

            Field::Header(header) => {
                *self = Field::Value(match req.headers().get(&*header) {
                    Some(val) => match val.to_str() {
                        Ok(val) => format!("\"{val}\""),
                        Err(_) => PLACEHOLDER.to_string(),
                    },
                    None => PLACEHOLDER.to_string(),
                });
            }

            _ => {}
        }
    }

    fn render_response(&mut self, exchange: &Exchange<'_>, resolvers: &Resolvers) {
        match self {
            Field::Status => {
                *self = Field::Value(exchange.status().as_u16().to_string());
            }

            Field::Resolved(field) => {
                *self = Field::Value(resolvers.resolve(*field, exchange));
            }

            _ => {}
        }
    }

    fn render_duration(&mut self, elapsed: Duration) {
        if let Field::Duration = self {
            *self = Field::Value(format!("{}ms", format_millis(elapsed)));
        }
    }
}

/// Renders `now` as a bracketed Common Log Format timestamp in its own offset.
pub(crate) fn format_timestamp(now: OffsetDateTime) -> String {
    match now.format(TIMESTAMP) {
        Ok(ts) => format!("[{ts}]"),
        Err(_) => PLACEHOLDER.to_string(),
    }
}

/// Fractional milliseconds with one decimal place. Example: 12.3
pub(crate) fn format_millis(elapsed: Duration) -> String {
    format!("{:.1}", elapsed.as_secs_f64() * 1000.0)
}

/// Local offset of the host, falling back to UTC when it cannot be determined.
pub(crate) fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn absolute_url(req: &ServiceRequest) -> String {
    let uri = req.uri();
    if uri.scheme().is_some() {
        return uri.to_string();
    }

    let conn = req.connection_info();
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}://{}{}", conn.scheme(), conn.host(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use time::macros::datetime;

    fn default_headers() -> (HeaderName, HeaderName) {
        (
            HeaderName::from_static("referer"),
            HeaderName::from_static("user-agent"),
        )
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("common".parse::<LogFormat>(), Ok(LogFormat::Common));
        assert_eq!("CLF".parse::<LogFormat>(), Ok(LogFormat::Common));
        assert_eq!("combined".parse::<LogFormat>(), Ok(LogFormat::ApacheCombined));
        assert_eq!("Apache-Combined".parse::<LogFormat>(), Ok(LogFormat::ApacheCombined));
        assert_eq!(
            "json".parse::<LogFormat>(),
            Err(UnknownFormat("json".to_string()))
        );
    }

    #[test]
    fn test_field_layout() {
        let common = LogFormat::Common.fields(&default_headers(), false);
        assert_eq!(common.0.len(), 7);
        assert_eq!(common.0[0], Field::RemoteHost);
        assert_eq!(common.0[6], Field::Resolved(ResolutionField::Bytes));

        let common = LogFormat::Common.fields(&default_headers(), true);
        assert_eq!(common.0.last(), Some(&Field::Duration));

        let combined = LogFormat::ApacheCombined.fields(&default_headers(), true);
        assert_eq!(combined.0.len(), 10);
        assert_eq!(
            combined.0[7],
            Field::Header(HeaderName::from_static("referer"))
        );
        assert_eq!(
            combined.0[8],
            Field::Header(HeaderName::from_static("user-agent"))
        );
        assert_eq!(combined.0[9], Field::Duration);
    }

    #[test]
    fn test_format_timestamp() {
        let utc = datetime!(2000-10-10 13:55:36 UTC);
        assert_eq!(format_timestamp(utc), "[10/Oct/2000:13:55:36 +0000]");

        let local = datetime!(2000-10-10 13:55:36 -7);
        assert_eq!(format_timestamp(local), "[10/Oct/2000:13:55:36 -0700]");

        let half_hour = datetime!(2024-01-05 08:01:02 +5:30);
        assert_eq!(format_timestamp(half_hour), "[05/Jan/2024:08:01:02 +0530]");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(Duration::from_micros(12_345)), "12.3");
        assert_eq!(format_millis(Duration::ZERO), "0.0");
        assert_eq!(format_millis(Duration::from_secs(2)), "2000.0");
    }

    #[test]
    fn test_render_request_fields() {
        let req = TestRequest::get()
            .uri("/foo?bar=1")
            .peer_addr("203.0.113.5:4000".parse().unwrap())
            .insert_header(("referer", "http://example.com"))
            .to_srv_request();
        let now = datetime!(2000-10-10 13:55:36 UTC);

        let mut fields = LogFormat::ApacheCombined.fields(&default_headers(), false);
        fields.render_request(now, &req);

        assert_eq!(fields.0[0], Field::Value("203.0.113.5".to_string()));
        assert_eq!(
            fields.0[3],
            Field::Value("[10/Oct/2000:13:55:36 +0000]".to_string())
        );
        assert_eq!(
            fields.0[4],
            Field::Value("\"GET http://localhost:8080/foo?bar=1\"".to_string())
        );
        assert_eq!(
            fields.0[7],
            Field::Value("\"http://example.com\"".to_string())
        );
        assert_eq!(fields.0[8], Field::Value("-".to_string()));
        // response side fields untouched
        assert_eq!(fields.0[5], Field::Status);
    }

    #[test]
    fn test_absolute_form_uri_kept_verbatim() {
        let req = TestRequest::get()
            .uri("https://example.org/abs?x=y")
            .to_srv_request();
        assert_eq!(absolute_url(&req), "https://example.org/abs?x=y");
    }

    #[test]
    fn test_line_uses_placeholders() {
        let mut fields = LogFormat::Common.fields(&default_headers(), true);
        assert_eq!(fields.line(), "- - - - - - - -");

        fields.render_duration(Duration::from_micros(1_500));
        assert_eq!(fields.line(), "- - - - - - - 1.5ms");
    }
}
