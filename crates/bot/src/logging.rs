use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _,
};

pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("RUST_LOG_MODE").as_deref() {
            Ok("json") => Self::Json,
            _ => Self::Pretty,
        }
    }

    pub fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        for<'a> S: Subscriber + LookupSpan<'a>,
    {
        let fmt = tracing_subscriber::fmt::layer().with_thread_names(true);

        match self {
            Self::Json => Box::new(fmt.json().with_target(false)),
            Self::Pretty => Box::new(
                fmt.pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
        }
    }
}

/// `RUST_LOG` picks levels (default `info`), `RUST_LOG_MODE=json` switches
/// to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(LogFormat::from_env().layer())
        .init();
}
