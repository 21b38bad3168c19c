use std::fmt;
use std::fmt::Write;
use std::path::PathBuf;

use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{format::FmtSpan, Layer as FmtLayer};
use tracing_subscriber::{prelude::*, registry::Registry, reload, EnvFilter};

mod combined;

use super::app_config::config;
use super::error::Result;

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
    pub use tracing::{debug_span, error_span, info_span, trace_span, warn_span};
    pub use tracing::{event, field::Empty, instrument, span};
}

pub fn setup() -> Result<GlobalLoggingContext> {
    GlobalLoggingContext::new()
}

/// Keeps the log writers alive. Hold it in `main` until exit so buffered lines get flushed.
pub struct GlobalLoggingContext {
    worker_guards: Vec<WorkerGuard>,
    reload_handle: reload::Handle<combined::Layer<Registry>, Registry>,
}

impl GlobalLoggingContext {
    /// Install the global subscriber with the built-in logging config.
    ///
    /// The layers can be swapped later by [`reconfigure`](Self::reconfigure), once the
    /// user's config is loaded.
    pub fn new() -> Result<Self> {
        let (layer, handle) = reload::Layer::new(combined::Layer::empty());
        Registry::default().with(layer).try_init()?;

        let mut ctx = GlobalLoggingContext {
            worker_guards: vec![],
            reload_handle: handle,
        };
        ctx.reconfigure_with(Default::default(), false)?;

        Ok(ctx)
    }

    /// Rebuild all outputs from the `logging` section of the app config.
    ///
    /// `produces_output` tells terminal outputs with `auto_switch` to move off stdout,
    /// which then belongs to the command's result.
    pub fn reconfigure(&mut self, produces_output: bool) -> Result<()> {
        let cfg: LoggingConfig = config().get("logging")?;
        self.reconfigure_with(cfg, produces_output)
    }

    fn reconfigure_with(&mut self, cfg: LoggingConfig, produces_output: bool) -> Result<()> {
        // writers of the old layers are dropped together with them
        let mut guards = vec![];
        let mut layer = combined::Layer::empty();
        for output in cfg.outputs.iter().filter(|o| o.enabled) {
            let (writer, guard) = output.target.to_writer(produces_output);
            guards.push(guard);
            layer.add(output_layer(output, writer, &cfg.filter));
        }
        self.reload_handle.reload(layer)?;
        self.worker_guards = guards;

        Ok(())
    }
}

/// An env filter followed by a formatter, for one configured output
fn output_layer(output: &LoggingOutput, writer: NonBlocking, global: &FilterConfig) -> combined::Layer<Registry> {
    let span_events = output
        .span_events
        .iter()
        .fold(FmtSpan::NONE, |f, e| f | FmtSpan::from(*e));

    let mut layer = combined::Layer::empty();
    layer.add(output.filter.with_default(global).to_env_filter());
    layer.add(
        FmtLayer::default()
            .with_ansi(output.target.supports_color())
            .with_target(false)
            .with_span_events(span_events)
            .with_timer(LocalTime)
            .with_writer(writer),
    );
    layer
}

/// Local wall clock with milliseconds
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut dyn Write) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

// ====== Config to Layer ======

impl FilterConfig {
    pub fn to_env_filter(&self) -> EnvFilter {
        let filter = match &self.from_env {
            Some(env) => EnvFilter::from_env(env),
            None => EnvFilter::default(),
        };

        match &self.directives {
            Some(dirs) => dirs
                .split(',')
                .filter_map(|s| match s.parse() {
                    Ok(d) => Some(d),
                    Err(err) => {
                        eprintln!("ignoring `{}`: {}", s, err);
                        None
                    }
                })
                .fold(filter, |f, dir| f.add_directive(dir)),
            None => filter,
        }
    }

    /// Fill unset fields from `default`
    pub fn with_default(&self, default: &FilterConfig) -> FilterConfig {
        Self {
            directives: self
                .directives
                .clone()
                .or_else(|| default.directives.clone()),
            from_env: self
                .from_env
                .clone()
                .or_else(|| default.from_env.clone()),
        }
    }
}

impl LoggingTarget {
    pub fn supports_color(&self) -> bool {
        matches!(self, LoggingTarget::Term(_))
    }

    pub fn to_writer(&self, produces_output: bool) -> (NonBlocking, WorkerGuard) {
        let builder = NonBlockingBuilder::default().lossy(false);
        match self {
            LoggingTarget::Term(term) => match term.name {
                TermTarget::Stdout if !(term.auto_switch && produces_output) => builder.finish(std::io::stdout()),
                _ => builder.finish(std::io::stderr()),
            },
            LoggingTarget::File(file) => {
                builder.finish(RollingFileAppender::new(Rotation::NEVER, &file.directory, &file.name))
            }
        }
    }
}

impl From<SpanEvent> for FmtSpan {
    fn from(e: SpanEvent) -> Self {
        match e {
            SpanEvent::New => FmtSpan::NEW,
            SpanEvent::Enter => FmtSpan::ENTER,
            SpanEvent::Exit => FmtSpan::EXIT,
            SpanEvent::Close => FmtSpan::CLOSE,
            SpanEvent::Active => FmtSpan::ACTIVE,
            SpanEvent::Full => FmtSpan::FULL,
        }
    }
}

// ====== Logging Config ======

#[derive(Debug, serde::Deserialize)]
struct LoggingConfig {
    filter: FilterConfig,
    #[serde(default)]
    outputs: Vec<LoggingOutput>,
}

#[derive(Debug, serde::Deserialize)]
struct FilterConfig {
    #[serde(default)]
    directives: Option<String>,
    #[serde(default, deserialize_with = "deserialize_filter_from_env")]
    from_env: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct LoggingOutput {
    enabled: bool,
    #[serde(default)]
    span_events: Vec<SpanEvent>,
    #[serde(default = "FilterConfig::empty")]
    filter: FilterConfig,
    target: LoggingTarget,
}

#[derive(Copy, Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum SpanEvent {
    New,
    Enter,
    Exit,
    Close,
    Active,
    Full,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
enum LoggingTarget {
    Term(TermOutput),
    File(FileOutput),
}

#[derive(Debug, serde::Deserialize)]
struct TermOutput {
    name: TermTarget,
    /// log to stderr instead when the command writes its result to stdout
    #[serde(default)]
    auto_switch: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum TermTarget {
    Stdout,
    Stderr,
}

#[derive(Debug, serde::Deserialize)]
struct FileOutput {
    directory: PathBuf,
    name: PathBuf,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            directives: Some("info".into()),
            from_env: Some("RUST_LOG".into()),
        }
    }
}

impl FilterConfig {
    pub fn empty() -> Self {
        Self {
            directives: None,
            from_env: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: Default::default(),
            outputs: vec![LoggingOutput {
                enabled: true,
                span_events: vec![],
                filter: FilterConfig::empty(),
                target: LoggingTarget::Term(TermOutput {
                    name: TermTarget::Stderr,
                    auto_switch: false,
                }),
            }],
        }
    }
}

// ====== serde helpers ======

/// Deserialize `false` to `None`, `true` to `Some("RUST_LOG")`, and string to `Some(xxx)`
fn deserialize_filter_from_env<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct VisitFromEnv;

    impl<'de> serde::de::Visitor<'de> for VisitFromEnv {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("bool or string")
        }

        fn visit_bool<E>(self, value: bool) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(if value { Some("RUST_LOG".into()) } else { None })
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_owned()))
        }
    }

    deserializer.deserialize_any(VisitFromEnv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_filter_falls_back_to_global() {
        let global = FilterConfig::default();
        let merged = FilterConfig::empty().with_default(&global);
        assert_eq!(merged.directives.as_deref(), Some("info"));
        assert_eq!(merged.from_env.as_deref(), Some("RUST_LOG"));

        let own = FilterConfig {
            directives: Some("debug".into()),
            from_env: None,
        };
        let merged = own.with_default(&global);
        assert_eq!(merged.directives.as_deref(), Some("debug"));
        assert_eq!(merged.from_env.as_deref(), Some("RUST_LOG"));
    }

    #[test]
    fn built_in_logging_section_parses() {
        let mut cfg = super::super::app_config::config_mut();
        cfg.setup().unwrap();
        let logging: LoggingConfig = cfg.get("logging").unwrap();
        assert_eq!(logging.outputs.len(), 1);
        assert!(matches!(
            logging.outputs[0].target,
            LoggingTarget::Term(TermOutput {
                name: TermTarget::Stdout,
                auto_switch: true
            })
        ));
        assert_eq!(logging.filter.from_env.as_deref(), Some("RUST_LOG"));
    }
}
