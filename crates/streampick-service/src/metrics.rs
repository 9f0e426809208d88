//! Statsd reporting behind the [`metric!`](crate::metric) macro.
//!
//! Until [`configure_statsd`] is called, all metrics are discarded.
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use cadence::{Metric, MetricBuilder, StatsdClient, UdpMetricSink};

static REPORTER: OnceLock<Reporter> = OnceLock::new();

#[doc(hidden)]
pub mod prelude {
    pub use cadence::prelude::*;
}

/// A statsd client together with the tags attached to every metric.
#[derive(Debug)]
pub struct Reporter {
    pub statsd: StatsdClient,
    global_tags: BTreeMap<String, String>,
}

impl Reporter {
    #[doc(hidden)]
    pub fn send<'a, T>(&'a self, metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        self.global_tags
            .iter()
            .fold(metric, |metric, (tag, value)| metric.with_tag(tag, value))
            .send()
    }
}

/// Reports all following metrics to the statsd server at `host`, prefixed with `prefix`.
///
/// Only the first call takes effect.
pub fn configure_statsd<A: ToSocketAddrs>(
    prefix: &str,
    host: A,
    global_tags: BTreeMap<String, String>,
) -> Result<()> {
    let addrs: Vec<_> = host
        .to_socket_addrs()
        .context("failed to resolve statsd host")?
        .collect();
    let Some(addr) = addrs.first() else {
        anyhow::bail!("statsd host did not resolve to any address");
    };
    tracing::info!("Reporting metrics to statsd at {addr}");

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    let sink = UdpMetricSink::from(&addrs[..], socket)?;

    let reporter = Reporter {
        statsd: StatsdClient::from_sink(prefix, sink),
        global_tags,
    };
    if REPORTER.set(reporter).is_err() {
        tracing::warn!("statsd was already configured");
    }

    Ok(())
}

#[doc(hidden)]
#[inline(always)]
pub fn with_reporter<F: FnOnce(&Reporter)>(f: F) {
    if let Some(reporter) = REPORTER.get() {
        f(reporter);
    }
}

/// Emits a counter, gauge or timer with optional `"tag" => value` pairs.
///
/// ```ignore
/// metric!(counter("queue.full") += 1);
/// metric!(timer("futures.done") = elapsed, "task_name" => name);
/// ```
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send count_with_tags($id, $value) $(, $k => $v)*)
    };
    (gauge($id:expr) = $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send gauge_with_tags($id, $value) $(, $k => $v)*)
    };
    (timer($id:expr) = $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send time_with_tags($id, $value) $(, $k => $v)*)
    };
    (@send $method:ident($id:expr, $value:expr) $(, $k:expr => $v:expr)*) => {{
        use $crate::metrics::prelude::*;
        $crate::metrics::with_reporter(|reporter| {
            reporter.send(reporter.statsd.$method($id, $value)$(.with_tag($k, $v))*);
        })
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_unconfigured_metrics_are_discarded() {
        let mut called = false;
        with_reporter(|_| called = true);
        assert!(!called);

        crate::metric!(counter("test.counter") += 1, "tag" => "value");
        crate::metric!(timer("test.timer") = Duration::from_millis(5));
    }
}
