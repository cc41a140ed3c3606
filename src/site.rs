use std::path::Path;

use anyhow::Context as _;

use crate::cli::SiteArgs;
use crate::error::Result;
use crate::formats::{ChapterData, StoryArchive};
use crate::store::{self, StoryPaths};

pub fn run(args: SiteArgs) -> anyhow::Result<()> {
    let paths = StoryPaths::new(Path::new(&args.out), &args.story);
    emit_site(&paths, &args.story).context("emit site")?;
    Ok(())
}

/// Write the browsable site for one story: an index page plus one page per
/// chapter, each regenerated from the final archive.
pub fn emit_site(paths: &StoryPaths, story: &str) -> Result<()> {
    let archive: StoryArchive = store::read_json(&paths.archive)?;
    store::ensure_dir(&paths.site_dir)?;

    let index_path = paths.site_dir.join("index.html");
    tracing::info!(story = %story, path = %index_path.display(), "write index page");
    store::delete_if_exists(&index_path)?;
    store::write_text(&index_path, &index_html(&archive))?;

    for chapter in &archive.chapters {
        let path = paths.site_dir.join(format!("{}.html", chapter.output_key));
        tracing::debug!(story = %story, path = %path.display(), "write chapter page");
        store::delete_if_exists(&path)?;
        store::write_text(&path, &chapter_html(chapter))?;
    }

    Ok(())
}

fn chapter_links(archive: &StoryArchive, appendix: bool) -> String {
    archive
        .chapters
        .iter()
        .filter(|chapter| chapter.is_appendix == appendix)
        .map(|chapter| format!("<a href=\"{}.html\">{}</a>", chapter.output_key, chapter.title))
        .collect::<Vec<_>>()
        .join("<br />")
}

fn index_html(archive: &StoryArchive) -> String {
    let chapters = chapter_links(archive, false);
    let appendices = chapter_links(archive, true);
    format!(
        r#"<!DOCTYPE html>
<html>
    <head>
        <title>{title}</title>
        <meta charset="utf-8">
        <style>
            body {{
                color: #ddd;
                background-color: #222;
                font-size: 22px;
            }}
            body > article {{
                margin: 20px auto;
                max-width: 750px;
            }}
            a, a:visited {{
                color: #ddd;
            }}
        </style>
    </head>
    <body>
        <article>
            <h1>{title}</h1>
            <h2>Chapters</h2>
            {chapters}
            <hr>
            <h2>Appendices</h2>
            {appendices}
        </article>
    </body>
</html>"#,
        title = archive.title,
        chapters = chapters,
        appendices = appendices,
    )
}

fn chapter_html(chapter: &ChapterData) -> String {
    let sections = chapter
        .fragments
        .iter()
        .map(|fragment| format!("<section>{fragment}</section>"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"<!DOCTYPE html>
<html>
    <head>
        <title>{title}</title>
        <meta charset="utf-8">
        <style>
            body {{
                color: #ddd;
                background-color: #111;
                font-size: 22px;
            }}
            body > article {{
                margin: 20px auto;
                max-width: 750px;
                text-align: justify;
                line-height: 1.6;
            }}
            nav.chapter_navigation {{
                display: flex;
                align-content: center;
                justify-content: center;
            }}
            nav.chapter_navigation a {{
                border-color: #555;
                background-color: #444;
                flex-grow: 1;
                flex-shrink: 0;
                max-width: 200px;
                border-style: solid;
                border-width: 2px;
                text-align: center;
            }}
            .chapter-footer {{
                display: none;
            }}
            a, a:visited {{
                color: #ddd;
            }}
        </style>
    </head>
    <body>
        <nav class="chapter_navigation">
        <a href="{previous}.html">&lt; Previous</a>
        <a href="index.html">Index</a>
        <a href="{next}.html">Next &gt;</a>
        </nav>
        <article>
            <h2>{title}</h2>
            {sections}
        </article>
        <nav class="chapter_navigation">
            <a href="{previous}.html">&lt; Previous</a>
            <a href="{next}.html">Next &gt;</a>
        </nav>
    </body>
</html>"#,
        title = chapter.title,
        previous = chapter.previous_key,
        next = chapter.next_key,
        sections = sections,
    )
}
