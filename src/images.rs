use std::path::Path;

use anyhow::Context as _;
use regex::Regex;
use url::Url;

use crate::cache::{self, Throttle};
use crate::cli::{ImagesDownloadArgs, ImagesRewriteArgs};
use crate::error::Result;
use crate::formats::{ImageRecord, StoryArchive, StoryData};
use crate::store::{self, StoryPaths};

/// Anything at or below this size is a truncated or failed download.
const IMAGE_SIZE_FLOOR_BYTES: u64 = 24;

pub fn run_rewrite(args: ImagesRewriteArgs) -> anyhow::Result<()> {
    let paths = StoryPaths::new(Path::new(&args.out), &args.story);
    let rewriter = Rewriter::new().context("compile image url patterns")?;
    rewrite_story(&paths, &args.story, &rewriter).context("rewrite images")?;
    Ok(())
}

pub async fn run_download(args: ImagesDownloadArgs) -> anyhow::Result<()> {
    let paths = StoryPaths::new(Path::new(&args.out), &args.story);
    let client = cache::client().context("build http client")?;
    let throttle = Throttle::new(args.delay_ms, args.jitter_ms);
    download_story_images(&client, &paths, args.force_redownload, &throttle)
        .await
        .context("download images")?;
    Ok(())
}

/// Rewrite every fragment's image references to stable local filenames and
/// persist the final archive. Filenames recorded by a previous run are reused;
/// the image set only ever grows.
pub fn rewrite_story(paths: &StoryPaths, story: &str, rewriter: &Rewriter) -> Result<()> {
    let previous: Vec<ImageRecord> = if paths.archive.exists() {
        store::read_json::<StoryArchive>(&paths.archive)?.images
    } else {
        Vec::new()
    };

    let segmented: StoryData = store::read_json(&paths.segmented)?;
    tracing::info!(story = %story, known_images = previous.len(), "rewrite image references");

    let mut images: Vec<ImageRecord> = Vec::new();
    let mut chapters = Vec::with_capacity(segmented.chapters.len());
    for mut chapter in segmented.chapters {
        let fragments = std::mem::take(&mut chapter.fragments);
        chapter.fragments = fragments
            .iter()
            .map(|fragment| rewriter.rewrite_fragment(fragment, &mut images, &previous))
            .collect();
        chapters.push(chapter);
    }

    let archive = StoryArchive {
        title: segmented.title,
        chapters,
        images,
    };

    store::delete_if_exists(&paths.archive)?;
    store::write_json(&paths.archive, &archive)?;
    Ok(())
}

pub struct Rewriter {
    image_src: Regex,
    host_rules: Vec<(Regex, &'static str)>,
}

impl Rewriter {
    pub fn new() -> std::result::Result<Self, regex::Error> {
        // Ordered oldest-hosting-scheme first; the first matching rule wins.
        let host_rules = vec![
            (
                Regex::new(r"https://www\.filepicker\.io/api/file/([a-zA-Z0-9]*)")?,
                "https://cdn6.fiction.live/file/fictionlive/fp/",
            ),
            (
                Regex::new(r"https://[a-z0-9]*\.cloudfront\.net/images/([a-zA-Z0-9._-]*)")?,
                "https://cdn6.fiction.live/file/fictionlive/images/",
            ),
            (
                Regex::new(r"https://cdn\d\.fiction\.live/images/([a-zA-Z0-9._-]*)")?,
                "https://cdn6.fiction.live/file/fictionlive/images/",
            ),
        ];
        Ok(Self {
            image_src: Regex::new(r#"<img src="([^"]*)""#)?,
            host_rules,
        })
    }

    fn rewrite_fragment(
        &self,
        fragment: &str,
        images: &mut Vec<ImageRecord>,
        previous: &[ImageRecord],
    ) -> String {
        self.image_src
            .replace_all(fragment, |caps: &regex::Captures<'_>| {
                let raw_url = &caps[1];
                let canonical = self.normalize(raw_url);
                let filename = assign_filename(raw_url, &canonical, images, previous);
                format!("<img src=\"images/{filename}\"")
            })
            .into_owned()
    }

    fn normalize(&self, url: &str) -> String {
        for (pattern, canonical_prefix) in &self.host_rules {
            if let Some(caps) = pattern.captures(url) {
                return format!("{canonical_prefix}{}", &caps[1]);
            }
        }
        url.to_owned()
    }
}

/// First match wins: a record already emitted this run, then a record from the
/// previous archive, then a freshly minted filename. A filename is never
/// reassigned once a canonical URL owns it.
fn assign_filename(
    raw_url: &str,
    canonical: &str,
    images: &mut Vec<ImageRecord>,
    previous: &[ImageRecord],
) -> String {
    if let Some(record) = images
        .iter_mut()
        .find(|r| r.original_urls.iter().any(|u| u == raw_url) || r.url == canonical)
    {
        if !record.original_urls.iter().any(|u| u == raw_url) {
            record.original_urls.push(raw_url.to_owned());
        }
        tracing::debug!(url = %canonical, filename = %record.filename, "image already assigned this run");
        return record.filename.clone();
    }

    if let Some(record) = previous.iter().find(|r| {
        r.original_urls.iter().any(|u| u == raw_url) || r.url == canonical || r.url == raw_url
    }) {
        tracing::debug!(url = %canonical, filename = %record.filename, "reusing image filename from previous run");
        let filename = record.filename.clone();
        images.push(ImageRecord {
            original_urls: vec![raw_url.to_owned()],
            url: canonical.to_owned(),
            filename: filename.clone(),
        });
        return filename;
    }

    let filename = format!("{}{}", uuid::Uuid::new_v4(), infer_extension(raw_url));
    tracing::info!(url = %canonical, filename = %filename, "assigning new image filename");
    images.push(ImageRecord {
        original_urls: vec![raw_url.to_owned()],
        url: canonical.to_owned(),
        filename: filename.clone(),
    });
    filename
}

/// The extension counts only when the last dot sits within the trailing six
/// characters; query-like tails fall back to `.png`.
fn infer_extension(url: &str) -> &str {
    match url.rfind('.') {
        Some(index) if index + 6 >= url.len() => &url[index..],
        _ => ".png",
    }
}

/// Download every recorded image that is missing or below the size floor.
/// A single broken remote image never aborts the batch.
pub async fn download_story_images(
    client: &reqwest::Client,
    paths: &StoryPaths,
    force_redownload: bool,
    throttle: &Throttle,
) -> Result<()> {
    let archive: StoryArchive = store::read_json(&paths.archive)?;
    store::ensure_dir(&paths.images_dir)?;

    for record in &archive.images {
        let target = paths.image(&record.filename);

        if !force_redownload && let Ok(metadata) = std::fs::metadata(&target) {
            if metadata.len() > IMAGE_SIZE_FLOOR_BYTES {
                tracing::debug!(filename = %record.filename, bytes = metadata.len(), "image already downloaded");
                continue;
            }
            tracing::info!(filename = %record.filename, bytes = metadata.len(), "image below size floor; downloading again");
        }

        let url = match Url::parse(&record.url) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(url = %record.url, filename = %record.filename, %err, "skipping image with unparseable url");
                continue;
            }
        };

        tracing::info!(url = %record.url, filename = %record.filename, "download image");
        if let Err(err) = cache::download_to(client, &url, &target).await {
            tracing::warn!(url = %record.url, filename = %record.filename, %err, "image download failed; continuing");
        }
        throttle.pause().await;
    }

    Ok(())
}
