use std::path::Path;

use anyhow::Context as _;

use crate::cache::{self, Throttle};
use crate::cli::FetchArgs;
use crate::error::{Error, Result};
use crate::formats::{Bookmark, StoryNode};
use crate::store::{self, StoryPaths};

/// End-of-window timestamp used when a regular chapter has no successor yet.
const FUTURE_TIMESTAMP: u64 = 999_999_999_999_998;

pub async fn run(args: FetchArgs) -> anyhow::Result<()> {
    let paths = StoryPaths::new(Path::new(&args.out), &args.story);
    let client = cache::client().context("build http client")?;
    let throttle = Throttle::new(args.delay_ms, args.jitter_ms);

    match retrieve_story(&client, &paths, &args, &throttle).await {
        Ok(()) => Ok(()),
        Err(Error::ManifestIncomplete { story }) => {
            tracing::warn!(story = %story, "manifest carries no bookmark list; skipping story");
            Ok(())
        }
        Err(err) => Err(err).context("fetch story"),
    }
}

/// Fetch the manifest and every chapter window for one story, strictly in
/// bookmark order, reusing durable blobs where they exist.
pub async fn retrieve_story(
    client: &reqwest::Client,
    paths: &StoryPaths,
    args: &FetchArgs,
    throttle: &Throttle,
) -> Result<()> {
    store::ensure_dir(&paths.raw_dir)?;

    if args.force_refresh_manifest {
        tracing::info!(story = %args.story, "refresh manifest");
        store::delete_if_exists(&paths.manifest)?;
    }

    let url = node_url(&args.api_base, &args.node_id);
    tracing::info!(story = %args.story, url = %url, "fetch manifest");
    let payload = cache::get_or_fetch(&paths.manifest, throttle, || {
        cache::fetch_json(client, &url)
    })
    .await?;
    let node: StoryNode = serde_json::from_value(payload)?;

    let Some(bookmarks) = node.bookmarks.as_deref().filter(|bms| !bms.is_empty()) else {
        return Err(Error::ManifestIncomplete {
            story: args.story.clone(),
        });
    };

    if args.force_refresh_appendices {
        invalidate_appendices(paths, bookmarks)?;
    }
    if args.force_refresh_latest_chapter {
        invalidate_latest_chapter(paths, bookmarks)?;
    }

    for (index, bookmark) in bookmarks.iter().enumerate() {
        let next_regular_ct = bookmarks[index + 1..]
            .iter()
            .find(|bm| !bm.is_special())
            .map(|bm| bm.created_at);
        let url = chapter_url(&args.api_base, &args.node_id, bookmark, next_regular_ct);
        tracing::info!(story = %args.story, title = %bookmark.title, url = %url, "fetch chapter");
        let chapter_path = paths.chapter(&bookmark.id);
        cache::get_or_fetch(&chapter_path, throttle, || cache::fetch_json(client, &url)).await?;
    }

    Ok(())
}

pub fn node_url(api_base: &str, node_id: &str) -> String {
    format!("{api_base}/api/node/{node_id}")
}

/// A regular chapter's content window runs from its own timestamp to one unit
/// before its next regular sibling (or far future at the tail). A special
/// chapter is a single snapshot: its own timestamp plus one unit.
pub fn chapter_url(
    api_base: &str,
    node_id: &str,
    bookmark: &Bookmark,
    next_regular_ct: Option<u64>,
) -> String {
    let end = if bookmark.is_special() {
        bookmark.created_at + 1
    } else {
        match next_regular_ct {
            Some(ct) => ct - 1,
            None => FUTURE_TIMESTAMP,
        }
    };
    format!(
        "{api_base}/api/anonkun/chapters/{node_id}/{}/{end}",
        bookmark.created_at
    )
}

fn invalidate_appendices(paths: &StoryPaths, bookmarks: &[Bookmark]) -> Result<()> {
    for bookmark in bookmarks.iter().filter(|bm| bm.is_special()) {
        let path = paths.chapter(&bookmark.id);
        if path.exists() {
            tracing::info!(title = %bookmark.title, "refresh appendix chapter");
            store::delete_if_exists(&path)?;
        }
    }
    Ok(())
}

/// Drop the cached blob of the newest regular chapter present in cache: it is
/// the only one the remote source may still be editing. Everything older is
/// treated as immutable.
fn invalidate_latest_chapter(paths: &StoryPaths, bookmarks: &[Bookmark]) -> Result<()> {
    let latest_cached = bookmarks
        .iter()
        .filter(|bm| !bm.is_special())
        .filter(|bm| paths.chapter(&bm.id).exists())
        .last();

    if let Some(bookmark) = latest_cached {
        tracing::info!(title = %bookmark.title, "refresh latest chapter");
        store::delete_if_exists(&paths.chapter(&bookmark.id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark(id: &str, title: &str, created_at: u64) -> Bookmark {
        Bookmark {
            id: id.to_owned(),
            title: title.to_owned(),
            created_at,
        }
    }

    #[test]
    fn chapter_url_spans_to_one_before_the_next_regular_bookmark() {
        let url = chapter_url(
            "https://fiction.live",
            "n1",
            &bookmark("a", "One", 100),
            Some(200),
        );
        assert_eq!(url, "https://fiction.live/api/anonkun/chapters/n1/100/199");
    }

    #[test]
    fn chapter_url_spans_to_far_future_for_the_tail_chapter() {
        let url = chapter_url(
            "https://fiction.live",
            "n1",
            &bookmark("c", "Two", 200),
            None,
        );
        assert_eq!(
            url,
            "https://fiction.live/api/anonkun/chapters/n1/200/999999999999998"
        );
    }

    #[test]
    fn chapter_url_uses_a_single_snapshot_for_special_bookmarks() {
        let url = chapter_url(
            "https://fiction.live",
            "n1",
            &bookmark("b", "#special Bonus", 150),
            Some(200),
        );
        assert_eq!(url, "https://fiction.live/api/anonkun/chapters/n1/150/151");
    }

    #[test]
    fn latest_chapter_invalidation_deletes_only_the_newest_cached_regular_blob()
    -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths = StoryPaths::new(dir.path(), "story");
        std::fs::create_dir_all(&paths.raw_dir)?;

        let bookmarks = vec![
            bookmark("a", "One", 100),
            bookmark("b", "#special Bonus", 150),
            bookmark("c", "Two", 200),
            bookmark("d", "Three", 300),
        ];
        // Chapters a and c are cached; d is not yet, so c is the tail.
        std::fs::write(paths.chapter("a"), "[]")?;
        std::fs::write(paths.chapter("b"), "[]")?;
        std::fs::write(paths.chapter("c"), "[]")?;

        invalidate_latest_chapter(&paths, &bookmarks)?;

        assert!(paths.chapter("a").exists(), "history must stay cached");
        assert!(paths.chapter("b").exists(), "specials are not eligible");
        assert!(!paths.chapter("c").exists(), "tail chapter must be dropped");
        Ok(())
    }

    #[test]
    fn appendix_invalidation_deletes_only_special_blobs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths = StoryPaths::new(dir.path(), "story");
        std::fs::create_dir_all(&paths.raw_dir)?;

        let bookmarks = vec![bookmark("a", "One", 100), bookmark("b", "#special Bonus", 150)];
        std::fs::write(paths.chapter("a"), "[]")?;
        std::fs::write(paths.chapter("b"), "[]")?;

        invalidate_appendices(&paths, &bookmarks)?;

        assert!(paths.chapter("a").exists());
        assert!(!paths.chapter("b").exists());
        Ok(())
    }
}
