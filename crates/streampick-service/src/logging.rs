use std::env;

use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// The default filter directives for a configured log level.
///
/// HTTP client internals are noisy on `DEBUG` and above, so they are capped at `INFO`.
fn default_directives(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "",
        LevelFilter::ERROR => "ERROR",
        LevelFilter::WARN => "WARN",
        LevelFilter::INFO => "INFO,hyper=WARN,reqwest=WARN",
        LevelFilter::DEBUG => {
            "INFO,\
             hyper=WARN,\
             streampick=DEBUG,\
             streampick_service=DEBUG"
        }
        LevelFilter::TRACE => {
            "INFO,\
             hyper=WARN,\
             streampick=TRACE,\
             streampick_service=TRACE"
        }
    }
}

/// Returns the filter directives to log with.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn rust_log(level: LevelFilter) -> String {
    env::var("RUST_LOG").unwrap_or_else(|_| default_directives(level).to_owned())
}

/// A formatting layer writing one flattened JSON object per event.
pub fn json_layer<S, W>(make_writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(make_writer)
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(LevelFilter::OFF), "");
        assert!(default_directives(LevelFilter::DEBUG).contains("streampick_service=DEBUG"));
    }
}
