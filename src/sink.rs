use std::{
    borrow::Cow,
    fmt,
    io::{self, Write},
    rc::Rc,
};

pub(crate) const DEFAULT_TARGET: &str = "actix_web_middleware_accesslog::logger";

/// Destination of finished access log lines.
#[derive(Clone)]
pub enum Sink {
    /// Emit each line as an `Info` record of the `log` crate under `target`.
    Log { target: Cow<'static, str> },
    /// Write each line, newline terminated, to standard output.
    Stdout,
    /// Hand each line to a caller supplied function.
    Custom(Rc<dyn Fn(&str) -> io::Result<()>>),
}

impl Sink {
    /// Wraps a function as a sink.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> io::Result<()> + 'static,
    {
        Sink::Custom(Rc::new(f))
    }

    pub(crate) fn write(&self, line: &str) -> io::Result<()> {
        match self {
            Sink::Log { target } => {
                rust_log::log(log::Level::Info, target, line);
                Ok(())
            }
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{line}")
            }
            Sink::Custom(f) => f(line),
        }
    }

    /// Writes `line`, reporting failures through `log` instead of returning them.
    pub(crate) fn emit(&self, line: &str) {
        if let Err(err) = self.write(line) {
            log::warn!("failed to write access log line: {err}");
        }
    }
}

impl Default for Sink {
    fn default() -> Self {
        #[cfg(feature = "log")]
        {
            Sink::Log {
                target: Cow::Borrowed(DEFAULT_TARGET),
            }
        }
        #[cfg(not(feature = "log"))]
        {
            Sink::Stdout
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Log { target } => f.debug_struct("Log").field("target", target).finish(),
            Sink::Stdout => f.write_str("Stdout"),
            Sink::Custom(_) => f.write_str("Custom"),
        }
    }
}

pub(crate) mod rust_log {
    pub(crate) fn log(level: log::Level, target: &str, line: &str) {
        log::logger().log(
            &log::Record::builder()
                .args(format_args!("{line}"))
                .level(level)
                .target(target)
                .module_path_static(Some(module_path!()))
                .file_static(Some(file!()))
                .line(Some(line!()))
                .build(),
        );
    }
}
