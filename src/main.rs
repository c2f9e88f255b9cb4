use std::{process, sync::Arc};

use likefeed::{
    application::{
        error::AppError,
        feed::{FeedService, FeedView},
        likes::LikeService,
        pagination::PageNumber,
        repos::FeedSource,
    },
    cache::{CacheConfig, MutationOutcome, QueryCache},
    config::{self, ActorArgs, Command, MutateArgs, Settings},
    domain::entities::{Actor, FeedPage},
    infra::{
        memory::{InMemoryFeed, MemoryOptions},
        telemetry,
    },
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        eprintln!("{}", error.presentation_message());
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    let feed = Arc::new(
        InMemoryFeed::from_fixture(
            &settings.feed.fixture,
            MemoryOptions {
                latency: settings.remote.latency,
                fail_mutations: settings.remote.fail_mutations,
            },
        )
        .await?,
    );
    let source: Arc<dyn FeedSource> = feed.clone();
    let cache = Arc::new(QueryCache::new());
    let feed_service = FeedService::new(Arc::clone(&cache), source, settings.feed.posts_per_page);

    match cli_args.command {
        Command::Show(args) => {
            let view = feed_service
                .page(PageNumber::coerce(args.page.as_deref()))
                .await?;
            print_json(&view)
        }
        Command::Like(args) => {
            run_mutation(MutationKind::Like, args, &settings, feed, cache, feed_service).await
        }
        Command::Unlike(args) => {
            run_mutation(MutationKind::Unlike, args, &settings, feed, cache, feed_service).await
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MutationKind {
    Like,
    Unlike,
}

#[derive(Serialize)]
struct MutationReport<'a> {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    feed: &'a FeedView,
}

async fn run_mutation(
    kind: MutationKind,
    args: MutateArgs,
    settings: &Settings,
    feed: Arc<InMemoryFeed>,
    cache: Arc<QueryCache<FeedPage>>,
    feed_service: FeedService,
) -> Result<(), AppError> {
    let page = PageNumber::coerce(args.page.as_deref());
    let actor = resolve_actor(&args.actor)?;

    // The page is on screen before anyone can click "like" on it.
    feed_service.page(page).await?;

    let likes = LikeService::new(
        cache,
        Arc::new(feed.session(actor.clone())),
        CacheConfig::from(&settings.cache),
        settings.feed.posts_per_page,
    );

    let outcome = match kind {
        MutationKind::Like => likes.like(page, &args.post_id, actor.as_ref()).await?,
        MutationKind::Unlike => likes.unlike(page, &args.post_id, actor.as_ref()).await?,
    };
    info!(?kind, post_id = %args.post_id, state = ?outcome.state(), "mutation settled");

    let view = feed_service.page(page).await?;
    let (outcome, error) = match outcome {
        MutationOutcome::Committed => ("committed", None),
        MutationOutcome::RolledBack { error } => ("rolled_back", Some(error.to_string())),
    };
    print_json(&MutationReport {
        outcome,
        error,
        feed: &view,
    })
}

fn resolve_actor(args: &ActorArgs) -> Result<Option<Actor>, AppError> {
    let Some(user_id) = args.user_id.as_deref() else {
        return Ok(None);
    };
    let user_name = args.user_name.as_deref().unwrap_or(user_id);
    Ok(Some(Actor::new(user_id, user_name)?))
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
