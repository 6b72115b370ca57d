use std::future::Future;

use tokio::net::TcpListener;

use crate::action::ActionRegistry;
use crate::config::Config;
use crate::metrics::setup_metrics_recorder;
use crate::router;
use crate::sink::{PrintSinkFactory, SegmentSinkFactory};
use crate::time::SystemTime;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    // Don't install metrics unless asked to
    let metrics = if config.export_prometheus {
        Some(setup_metrics_recorder()?)
    } else {
        None
    };

    let registry = ActionRegistry::default();
    let context = config.event_context();

    let app = if config.print_sink {
        router::router(
            registry,
            PrintSinkFactory::default(),
            context,
            config.max_body_size,
            metrics,
        )
    } else {
        let sinks = SegmentSinkFactory::new(
            &config.segment_endpoint,
            config.segment_max_batch_size,
            config.request_timeout.0,
            SystemTime {},
        )?;
        router::router(registry, sinks, context, config.max_body_size, metrics)
    };

    tracing::info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
