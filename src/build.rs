use std::path::PathBuf;

use anyhow::Context as _;

use crate::cache::{self, Throttle};
use crate::cli::{
    BuildArgs, FetchArgs, ImagesDownloadArgs, ImagesRewriteArgs, SegmentArgs, SiteArgs,
};
use crate::error::Error;
use crate::store::StoryPaths;

/// Run the whole pipeline for one story: fetch, segment, rewrite images, emit
/// the site, then download images. HTML is emitted before image downloads so a
/// flaky image host never blocks a readable site.
pub async fn run(args: BuildArgs) -> anyhow::Result<()> {
    let workspace_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&workspace_dir)
        .with_context(|| format!("create workspace dir: {}", workspace_dir.display()))?;

    let paths = StoryPaths::new(&workspace_dir, &args.story);
    let client = cache::client().context("build http client")?;
    let throttle = Throttle::new(args.delay_ms, args.jitter_ms);

    tracing::info!(story = %args.story, node_id = %args.node_id, "build: fetch");
    let fetch_args = FetchArgs {
        story: args.story.clone(),
        node_id: args.node_id.clone(),
        out: args.out.clone(),
        api_base: args.api_base.clone(),
        force_refresh_manifest: args.force_refresh_manifest,
        force_refresh_latest_chapter: args.force_refresh_latest_chapter,
        force_refresh_appendices: args.force_refresh_appendices,
        delay_ms: args.delay_ms,
        jitter_ms: args.jitter_ms,
    };
    match crate::fetch::retrieve_story(&client, &paths, &fetch_args, &throttle).await {
        Ok(()) => {}
        Err(Error::ManifestIncomplete { story }) => {
            tracing::warn!(story = %story, "manifest carries no bookmark list; skipping story");
            return Ok(());
        }
        Err(err) => return Err(err).context("fetch"),
    }

    tracing::info!("build: segment");
    crate::segment::run(SegmentArgs {
        story: args.story.clone(),
        out: args.out.clone(),
        include_polls: args.include_polls,
        include_writeins: args.include_writeins,
    })
    .context("segment")?;

    tracing::info!("build: images rewrite");
    crate::images::run_rewrite(ImagesRewriteArgs {
        story: args.story.clone(),
        out: args.out.clone(),
    })
    .context("images rewrite")?;

    tracing::info!("build: site");
    crate::site::run(SiteArgs {
        story: args.story.clone(),
        out: args.out.clone(),
    })
    .context("site")?;

    tracing::info!("build: images download");
    crate::images::run_download(ImagesDownloadArgs {
        story: args.story.clone(),
        out: args.out.clone(),
        force_redownload: args.force_redownload_images,
        delay_ms: args.delay_ms,
        jitter_ms: args.jitter_ms,
    })
    .await
    .context("images download")?;

    Ok(())
}
