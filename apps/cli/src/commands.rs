use axum::Router;
use notify::{Config as WatchConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use webloom::{BuildReport, Builder, Config, WebloomError};

const DEBOUNCE_DURATION: Duration = Duration::from_millis(300);

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn summarize(report: &BuildReport) -> CliResult {
    if report.cancelled {
        return Err(WebloomError::Cancelled.into());
    }
    let failed = report.failures.len() + report.collisions.len();
    if failed > 0 {
        for failure in &report.failures {
            tracing::error!("{}: {}", failure.path.display(), failure.error);
        }
        return Err(format!("build finished with {failed} failed resources").into());
    }
    Ok(())
}

pub fn build_site(root: &Path, rebuild: bool) -> CliResult {
    let builder = Builder::open(root)?;
    let start = Instant::now();
    let report = builder.run(rebuild)?;
    tracing::info!(
        "done in {:.2?}, output in {}",
        start.elapsed(),
        builder.config().output_dir.display()
    );
    summarize(&report)
}

pub fn create_page(root: &Path, page: &Path, template: Option<&str>) -> CliResult {
    let builder = Builder::open(root)?;
    let template = match template {
        Some(name) => Some(builder.find_template(name).ok_or_else(|| {
            format!(
                "no template named '{}' in {}",
                name,
                builder.config().template_dir.display()
            )
        })?),
        None => None,
    };

    let created = builder.create(page, template.as_deref())?;
    println!("Created {}", created.display());
    Ok(())
}

fn watched_paths(config: &Config) -> Vec<PathBuf> {
    [&config.layout_dir, &config.content_dir]
        .into_iter()
        .filter(|path| path.is_dir())
        .cloned()
        .collect()
}

fn is_source_change(event: &Event, output_dir: &Path) -> bool {
    event.paths.iter().any(|path| !path.starts_with(output_dir))
}

pub async fn autobuild(root: &Path, port: u16, open_browser: bool) -> CliResult {
    let builder = Arc::new(Builder::open(root)?);
    if let Err(error) = summarize(&builder.run(false)?) {
        tracing::warn!("{error}");
    }

    let output_dir = builder.config().output_dir.clone();
    let (reload_tx, _) = broadcast::channel::<()>(16);
    let reload_tx = Arc::new(reload_tx);
    let reload_tx_clone = reload_tx.clone();

    let (notify_tx, notify_rx) = channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(
        notify_tx,
        WatchConfig::default().with_poll_interval(Duration::from_millis(200)),
    )?;
    for path in watched_paths(builder.config()) {
        tracing::debug!("watching {}", path.display());
        watcher.watch(&path, RecursiveMode::Recursive)?;
    }

    let watch_builder = builder.clone();
    let watch_output = output_dir.clone();
    std::thread::spawn(move || {
        loop {
            let mut relevant = match notify_rx.recv() {
                Ok(Ok(event)) => is_source_change(&event, &watch_output),
                Ok(Err(error)) => {
                    tracing::warn!("watch error: {error}");
                    false
                }
                Err(_) => return,
            };

            loop {
                match notify_rx.recv_timeout(DEBOUNCE_DURATION) {
                    Ok(Ok(event)) => relevant |= is_source_change(&event, &watch_output),
                    Ok(Err(_)) => continue,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            if !relevant {
                continue;
            }

            tracing::info!("changes detected, rebuilding");
            match watch_builder.run(false) {
                Ok(report) => {
                    if let Err(error) = summarize(&report) {
                        tracing::warn!("{error}");
                    }
                    let _ = reload_tx_clone.send(());
                }
                Err(error) => tracing::error!("rebuild failed: {error}"),
            }
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("serving {} at http://{addr}", output_dir.display());
    tracing::info!("press Ctrl+C to stop");

    if open_browser {
        let url = format!("http://localhost:{port}");
        if let Err(error) = open::that(&url) {
            tracing::warn!("failed to open browser: {error}");
        }
    }

    let livereload = tower_livereload::LiveReloadLayer::new();
    let reloader = livereload.reloader();

    let mut reload_rx = reload_tx.subscribe();
    tokio::spawn(async move {
        loop {
            match reload_rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => reloader.reload(),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let serve_dir = ServeDir::new(&output_dir).append_index_html_on_directories(true);
    let app = Router::new().fallback_service(serve_dir).layer(livereload);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    drop(watcher);
    Ok(())
}
