// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Watches one or more resource keys against a simulated catalog backend that changes
//! every `--tick-ms`. Several observers share each key, a late observer shows the
//! replay, and closing everything shows the cache flush.
//!
//! ```text
//! cargo run --bin watch_source -- dc1/service/* dc1/node/web --observers 3
//! cargo run --bin watch_source -- dc1/service/* --no-autorefresh --log-level debug
//! ```

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use clap::Parser;
use miette::IntoDiagnostic;
use r3bl_data_source::{AutorefreshSetting, DataSourceConfig, DisplayPreference,
                       FetchError, FetchRouter, ObserverId, ResourceSpec, RetryPolicy, Selector,
                       SourceEvent, SourceRegistry, Subscription, TickingBackend,
                       TracingConfig, TransportMonitor, fetch_fn, resolve_first,
                       setup_default_miette_global_report_handler,
                       try_initialize_logging_global};
use tokio::task::JoinSet;
use tracing_core::LevelFilter;

const ISSUES_URL: &str = "https://github.com/r3bl-org/r3bl-open-core/issues/new";

type Items = Vec<String>;

#[derive(Debug, Parser)]
#[command(bin_name = "watch_source")]
#[command(about = "Multiplex blocking queries for several observers onto one loop per key")]
#[command(version)]
#[command(next_line_help = true)]
/// More info: <https://docs.rs/clap/latest/clap/_derive/#overview>
pub struct CLIArg {
    #[arg(
        value_name = "KEY",
        default_value = "dc1/service/*",
        help = "Resource keys to watch, eg: `dc1/service/*` or `dc1/node/web`"
    )]
    pub keys: Vec<String>,

    #[arg(long, short = 'o', default_value_t = 2, help = "Observers per key")]
    pub observers: usize,

    #[arg(long, help = "Fetch once per key and then wait, instead of streaming")]
    pub no_autorefresh: bool,

    #[arg(long, help = "Overrides `cache_capacity` from the config file")]
    pub cache_capacity: Option<usize>,

    #[arg(long, default_value_t = 200, help = "How often the simulated backend changes")]
    pub tick_ms: u64,

    #[arg(long, default_value_t = 1_000, help = "How long to watch before closing")]
    pub duration_ms: u64,

    #[arg(long, short = 'c', help = "JSON config file, see `DataSourceConfig`")]
    pub config: Option<String>,

    #[arg(
        long,
        default_value = "warn",
        help = "One of `off`, `error`, `warn`, `info`, `debug`, `trace`"
    )]
    pub log_level: String,

    #[arg(long, help = "Also write logs to this file")]
    pub log_file: Option<String>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    setup_default_miette_global_report_handler(ISSUES_URL);

    let cli_arg = CLIArg::parse();

    let level_filter = cli_arg.log_level.parse::<LevelFilter>().into_diagnostic()?;
    let tracing_config = match &cli_arg.log_file {
        Some(path) => TracingConfig::new_file_and_display(
            Some(path.clone()),
            DisplayPreference::Stderr,
        ),
        None => TracingConfig::new_display(DisplayPreference::Stderr),
    }
    .with_level_filter(level_filter);
    try_initialize_logging_global(tracing_config)?;

    // % is Display, ? is Debug.
    tracing::debug!(message = "Start watch_source", cli_arg = ?cli_arg);

    let mut config = match &cli_arg.config {
        Some(path) => DataSourceConfig::try_load_from_json_file(path)?,
        None => DataSourceConfig::default(),
    };
    if let Some(cache_capacity) = cli_arg.cache_capacity {
        config.cache_capacity = cache_capacity;
    }

    let autorefresh = AutorefreshSetting::new(!cli_arg.no_autorefresh);
    let policy = RetryPolicy::new(
        Arc::new(TransportMonitor::default()),
        Arc::new(autorefresh),
    )
    .with_backoff(config.abort_backoff());
    let registry = SourceRegistry::<Items>::new(config, policy);

    let specs = cli_arg
        .keys
        .iter()
        .map(|key| key.parse::<ResourceSpec>())
        .collect::<Result<Vec<_>, _>>()?;

    let (router, backends) = create_router(&specs);
    let tick = Duration::from_millis(cli_arg.tick_ms.max(1));
    let tickers: Vec<_> = backends
        .iter()
        .map(|(kind, backend)| backend.spawn_ticker(kind.clone(), tick))
        .collect();

    // Every observer of a key shares one loop.
    let mut printers = JoinSet::new();
    let mut opened = Vec::new();
    for spec in &specs {
        let route = router.resolve(spec)?;
        for _ in 0..cli_arg.observers.max(1) {
            let observer = ObserverId::new();
            let subscription = registry.open_route(&route, observer)?;
            printers.spawn(print_events(subscription));
            opened.push((route.key.clone(), observer));
        }
        println!(
            "{}: {} observer(s), loop generation {}",
            route.key,
            registry.observer_count(&route.key),
            registry.handle(&route.key).map_or(0, |it| it.generation())
        );
    }

    tokio::time::sleep(Duration::from_millis(cli_arg.duration_ms) / 2).await;

    // A late observer gets the current value immediately, without a new request.
    if let Some(spec) = specs.first() {
        let route = router.resolve(spec)?;
        let late = ObserverId::new();
        let subscription = registry.open_route(&route, late)?;
        println!(
            "[{late}] {} replay: {:?}",
            route.key,
            subscription.replay()
        );
        printers.spawn(print_events(subscription));
        opened.push((route.key.clone(), late));
    }

    tokio::time::sleep(Duration::from_millis(cli_arg.duration_ms) / 2).await;

    for (key, observer) in &opened {
        registry.close(key, *observer);
    }
    while printers.join_next().await.is_some() {}

    for spec in &specs {
        let key = spec.to_key();
        match registry.cache_snapshot(&key) {
            Some(cached) => println!(
                "{key}: cached cursor {} with {} item(s)",
                cached.cursor,
                cached.value.as_ref().map_or(0, Vec::len)
            ),
            None => println!("{key}: nothing cached"),
        }
    }

    // Reopening is seeded from the cache, so a cached value is returned as the replay
    // without waiting on the backend.
    if let Some(spec) = specs.first() {
        let route = router.resolve(spec)?;
        let first = resolve_first(&registry, route.key.clone(), route.fetch.clone()).await?;
        println!("{}: resolved {} item(s) after reopening", route.key, first.len());
    }

    for ticker in tickers {
        ticker.abort();
    }
    registry.close_all();

    tracing::debug!(message = "Stop watch_source");
    Ok(())
}

/// One backend per resource type, registered for both selectors. A slug selects the
/// matching items from the same backend.
fn create_router(specs: &[ResourceSpec]) -> (FetchRouter<Items>, Vec<(String, TickingBackend)>) {
    let kinds: BTreeSet<&str> = specs.iter().map(|spec| spec.kind.as_str()).collect();
    let mut router = FetchRouter::default();
    let mut backends = Vec::new();

    for kind in kinds {
        let backend = TickingBackend::new(vec![format!("{kind}-0")]);

        let all_backend = backend.clone();
        router.register_all(kind, move |_spec: &ResourceSpec| all_backend.fetch_fn());

        let one_backend = backend.clone();
        router.register_one(kind, move |spec: &ResourceSpec| {
            let fetch = one_backend.fetch_fn();
            let slug = match &spec.selector {
                Selector::One(slug) => slug.clone(),
                Selector::All => String::new(),
            };
            fetch_fn(move |cursor| {
                let fetch = fetch.clone();
                let slug = slug.clone();
                async move {
                    let mut fetched = fetch(cursor).await?;
                    fetched.value.retain(|item| item.contains(&slug));
                    Ok::<_, FetchError>(fetched)
                }
            })
        });

        backends.push((kind.to_string(), backend));
    }

    (router, backends)
}

async fn print_events(mut subscription: Subscription<Items>) {
    let observer = subscription.observer();
    let key = subscription.key().clone();
    while let Some(event) = subscription.recv().await {
        match event {
            SourceEvent::Message(items) => println!("[{observer}] {key} -> {items:?}"),
            SourceEvent::Error(error) => println!("[{observer}] {key} !! {error}"),
        }
    }
    println!("[{observer}] {key} closed");
}
