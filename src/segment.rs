use std::collections::HashMap;
use std::path::Path;

use anyhow::Context as _;
use serde_json::Value;

use crate::cli::SegmentArgs;
use crate::error::Result;
use crate::formats::{
    ChapterData, RawEntry, SPECIAL_MARKER, SPECIAL_TITLE_PREFIX, StoryData, StoryNode,
    VoteSelection,
};
use crate::store::{self, StoryPaths};

/// Output key both ends of the previous/next chain point at.
pub const INDEX_KEY: &str = "index";

/// Choice text denoting an option the remote source removed outright.
const REMOVED_CHOICE_SENTINEL: &str = "permanentlyRemoved";

#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentOptions {
    pub include_polls: bool,
    pub include_writeins: bool,
}

pub fn run(args: SegmentArgs) -> anyhow::Result<()> {
    let paths = StoryPaths::new(Path::new(&args.out), &args.story);
    let options = FragmentOptions {
        include_polls: args.include_polls,
        include_writeins: args.include_writeins,
    };
    segment_story(&paths, &args.story, &options).context("segment story")?;
    Ok(())
}

/// Turn the cached manifest and chapter windows into the segmented archive:
/// classified, numbered, linked chapters with rendered fragments.
pub fn segment_story(paths: &StoryPaths, story: &str, options: &FragmentOptions) -> Result<()> {
    let node: StoryNode = store::read_json(&paths.manifest)?;
    let outline = outline_from_node(&node);
    tracing::info!(story = %story, chapters = outline.len(), "segment story");

    let mut fragments = Vec::with_capacity(outline.len());
    for entry in &outline {
        let raw: Vec<RawEntry> = store::read_json(&paths.raw_blob(&entry.raw_key))?;
        let rendered = render_fragments(&raw, options);
        tracing::debug!(story = %story, title = %entry.title, fragments = rendered.len(), "rendered chapter");
        fragments.push(rendered);
    }

    let data = StoryData {
        title: node.title.clone().unwrap_or_default(),
        chapters: assemble_chapters(outline, fragments),
    };

    store::delete_if_exists(&paths.segmented)?;
    store::write_json(&paths.segmented, &data)?;
    Ok(())
}

#[derive(Debug, Clone)]
struct OutlineEntry {
    title: String,
    raw_key: String,
    output_key: String,
    is_appendix: bool,
}

/// Regular chapters are numbered `ch1..`, appendices `appendix1..` in their
/// own discovery order, appended after all regular chapters.
fn outline_from_node(node: &StoryNode) -> Vec<OutlineEntry> {
    let mut chapters = Vec::new();
    let mut appendices = Vec::new();

    for bookmark in node.bookmarks.as_deref().unwrap_or_default() {
        let (is_appendix, title) = match bookmark.title.strip_prefix(SPECIAL_TITLE_PREFIX) {
            Some(rest) => (true, rest.to_owned()),
            None => (false, bookmark.title.clone()),
        };
        let output_key = if is_appendix {
            format!("appendix{}", appendices.len() + 1)
        } else {
            format!("ch{}", chapters.len() + 1)
        };
        let entry = OutlineEntry {
            title,
            raw_key: format!("chapter_{}", bookmark.id),
            output_key,
            is_appendix,
        };
        if is_appendix {
            appendices.push(entry);
        } else {
            chapters.push(entry);
        }
    }

    chapters.append(&mut appendices);
    chapters
}

fn assemble_chapters(outline: Vec<OutlineEntry>, fragments: Vec<Vec<String>>) -> Vec<ChapterData> {
    let keys: Vec<String> = outline.iter().map(|e| e.output_key.clone()).collect();

    outline
        .into_iter()
        .zip(fragments)
        .enumerate()
        .map(|(index, (entry, fragments))| {
            let previous_key = match index {
                0 => INDEX_KEY.to_owned(),
                _ => keys[index - 1].clone(),
            };
            let next_key = keys
                .get(index + 1)
                .cloned()
                .unwrap_or_else(|| INDEX_KEY.to_owned());
            ChapterData {
                title: entry.title,
                is_appendix: entry.is_appendix,
                raw_key: entry.raw_key,
                output_key: entry.output_key,
                previous_key,
                next_key,
                fragments,
            }
        })
        .collect()
}

fn render_fragments(entries: &[RawEntry], options: &FragmentOptions) -> Vec<String> {
    let mut fragments = Vec::new();
    for entry in entries {
        // A reposted finished chapter carries its own closing marker as a
        // stray entry; a single-entry stream is the marker chapter itself.
        if entries.len() > 1
            && entry
                .title()
                .is_some_and(|title| title.starts_with(SPECIAL_MARKER))
        {
            continue;
        }

        match entry {
            RawEntry::Chapter { body, .. } => fragments.push(body.clone()),
            RawEntry::ReaderPost {
                votes: Some(votes), ..
            } if options.include_writeins => {
                fragments.push(render_reader_posts(votes));
            }
            RawEntry::Choice {
                choices,
                votes: Some(votes),
                user_votes,
                crossed_out,
                ..
            } if options.include_polls => {
                fragments.push(render_poll(
                    choices,
                    votes,
                    user_votes.as_ref(),
                    crossed_out.as_deref(),
                ));
            }
            _ => {}
        }
    }
    fragments
}

fn render_reader_posts(votes: &serde_json::Map<String, Value>) -> String {
    let mut html = String::from("<h3>Reader Posts</h3>");
    for vote in votes.values() {
        if let Some(text) = vote.as_str() {
            html.push_str(text);
        }
        html.push_str("<hr>\n");
    }
    html.push_str("<hr>\n");
    html
}

/// Tally one counter per choice, combining `votes` and `userVotes`, then list
/// choices by descending count. The sort is stable, so ties keep definition
/// order. Crossed-out choices stay counted but render struck through.
fn render_poll(
    choices: &[String],
    votes: &HashMap<String, VoteSelection>,
    user_votes: Option<&HashMap<String, VoteSelection>>,
    crossed_out: Option<&[String]>,
) -> String {
    let mut counts = vec![0u64; choices.len()];
    let all_votes = votes
        .values()
        .chain(user_votes.into_iter().flat_map(|map| map.values()));
    for selection in all_votes {
        match selection {
            VoteSelection::One(index) => bump(&mut counts, *index),
            VoteSelection::Many(indices) => {
                for index in indices {
                    bump(&mut counts, *index);
                }
            }
        }
    }

    let mut ranked: Vec<(usize, &str)> = choices
        .iter()
        .enumerate()
        .map(|(index, text)| (index, text.as_str()))
        .collect();
    ranked.sort_by(|a, b| counts[b.0].cmp(&counts[a.0]));

    let mut html = String::from("<h3>Poll:</h3>\n<ul>\n");
    for (index, text) in ranked {
        if text == REMOVED_CHOICE_SENTINEL {
            continue;
        }
        let count = counts[index];
        let struck = crossed_out
            .is_some_and(|indices| indices.iter().any(|x| x == &index.to_string()));
        if struck {
            html.push_str(&format!(
                "<li><span style=\"text-decoration: line-through;\">{text}</span> ({count} votes)</li>\n"
            ));
        } else {
            html.push_str(&format!("<li>{text} ({count} votes)</li>\n"));
        }
    }
    html.push_str("</ul>\n");
    html
}

fn bump(counts: &mut [u64], index: usize) {
    if let Some(count) = counts.get_mut(index) {
        *count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Bookmark;

    fn node_with(bookmarks: Vec<Bookmark>) -> StoryNode {
        StoryNode {
            title: Some("Test Quest".to_owned()),
            bookmarks: Some(bookmarks),
        }
    }

    fn bookmark(id: &str, title: &str, created_at: u64) -> Bookmark {
        Bookmark {
            id: id.to_owned(),
            title: title.to_owned(),
            created_at,
        }
    }

    fn votes_of(pairs: &[(&str, VoteSelection)]) -> HashMap<String, VoteSelection> {
        pairs
            .iter()
            .map(|(id, selection)| (id.to_string(), selection.clone()))
            .collect()
    }

    fn render_all(entries: &[RawEntry]) -> Vec<String> {
        render_fragments(
            entries,
            &FragmentOptions {
                include_polls: true,
                include_writeins: true,
            },
        )
    }

    #[test]
    fn outline_numbers_regular_and_appendix_chapters_separately() {
        let node = node_with(vec![
            bookmark("a", "One", 100),
            bookmark("b", "#special Bonus", 150),
            bookmark("c", "Two", 200),
        ]);

        let chapters = assemble_chapters(
            outline_from_node(&node),
            vec![Vec::new(), Vec::new(), Vec::new()],
        );

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].output_key, "ch1");
        assert_eq!(chapters[0].title, "One");
        assert_eq!(chapters[1].output_key, "ch2");
        assert_eq!(chapters[1].title, "Two");
        assert_eq!(chapters[2].output_key, "appendix1");
        assert_eq!(chapters[2].title, "Bonus");
        assert!(chapters[2].is_appendix);
    }

    #[test]
    fn chapter_links_traverse_regulars_then_appendices_with_index_sentinels() {
        let node = node_with(vec![
            bookmark("a", "One", 100),
            bookmark("b", "#special Bonus", 150),
            bookmark("c", "Two", 200),
        ]);

        let chapters = assemble_chapters(
            outline_from_node(&node),
            vec![Vec::new(), Vec::new(), Vec::new()],
        );

        assert_eq!(chapters[0].previous_key, INDEX_KEY);
        assert_eq!(chapters[0].next_key, "ch2");
        assert_eq!(chapters[1].previous_key, "ch1");
        assert_eq!(chapters[1].next_key, "appendix1");
        assert_eq!(chapters[2].previous_key, "ch2");
        assert_eq!(chapters[2].next_key, INDEX_KEY);
    }

    #[test]
    fn single_select_poll_orders_choices_by_descending_tally() {
        let html = render_poll(
            &["A".to_owned(), "B".to_owned()],
            &votes_of(&[
                ("u1", VoteSelection::One(0)),
                ("u2", VoteSelection::One(1)),
                ("u3", VoteSelection::One(0)),
            ]),
            None,
            None,
        );

        let a = html.find("A (2 votes)").expect("A listed with 2 votes");
        let b = html.find("B (1 votes)").expect("B listed with 1 vote");
        assert!(a < b, "higher tally must come first: {html}");
    }

    #[test]
    fn multi_select_poll_counts_every_selection_and_user_votes_additively() {
        let html = render_poll(
            &["A".to_owned(), "B".to_owned(), "C".to_owned()],
            &votes_of(&[
                ("u1", VoteSelection::Many(vec![0, 2])),
                ("u2", VoteSelection::Many(vec![2])),
            ]),
            Some(&votes_of(&[("u3", VoteSelection::Many(vec![2]))])),
            None,
        );

        assert!(html.contains("C (3 votes)"), "{html}");
        assert!(html.contains("A (1 votes)"), "{html}");
        assert!(html.contains("B (0 votes)"), "{html}");
        let c = html.find("C (3 votes)").unwrap();
        let a = html.find("A (1 votes)").unwrap();
        assert!(c < a);
    }

    #[test]
    fn tied_choices_keep_definition_order() {
        let html = render_poll(
            &["First".to_owned(), "Second".to_owned(), "Third".to_owned()],
            &votes_of(&[
                ("u1", VoteSelection::One(1)),
                ("u2", VoteSelection::One(2)),
            ]),
            None,
            None,
        );

        let second = html.find("Second (1 votes)").unwrap();
        let third = html.find("Third (1 votes)").unwrap();
        let first = html.find("First (0 votes)").unwrap();
        assert!(second < third, "ties keep definition order: {html}");
        assert!(third < first);
    }

    #[test]
    fn removed_choices_are_not_listed() {
        let html = render_poll(
            &["A".to_owned(), REMOVED_CHOICE_SENTINEL.to_owned()],
            &votes_of(&[("u1", VoteSelection::One(1))]),
            None,
            None,
        );

        assert!(!html.contains(REMOVED_CHOICE_SENTINEL));
        assert!(html.contains("A (0 votes)"));
    }

    #[test]
    fn crossed_out_choices_render_struck_through_but_stay_counted() {
        let html = render_poll(
            &["A".to_owned(), "B".to_owned()],
            &votes_of(&[
                ("u1", VoteSelection::One(0)),
                ("u2", VoteSelection::One(0)),
            ]),
            None,
            Some(&["0".to_owned()]),
        );

        assert!(
            html.contains("<span style=\"text-decoration: line-through;\">A</span> (2 votes)"),
            "{html}"
        );
        assert!(html.contains("B (0 votes)"));
    }

    #[test]
    fn out_of_range_vote_indices_are_ignored() {
        let html = render_poll(
            &["A".to_owned()],
            &votes_of(&[
                ("u1", VoteSelection::One(5)),
                ("u2", VoteSelection::One(0)),
            ]),
            None,
            None,
        );

        assert!(html.contains("A (1 votes)"), "{html}");
    }

    #[test]
    fn reader_posts_render_in_insertion_order_with_dividers() {
        let votes = serde_json::json!({
            "z9": "Second text",
            "a1": "First text"
        });
        let html = render_reader_posts(votes.as_object().unwrap());

        assert!(html.starts_with("<h3>Reader Posts</h3>"));
        let second = html.find("Second text").unwrap();
        let first = html.find("First text").unwrap();
        assert!(second < first, "insertion order, not key order: {html}");
        assert_eq!(html.matches("<hr>\n").count(), 3, "{html}");
    }

    #[test]
    fn terminal_marker_entry_is_dropped_only_in_multi_entry_streams() {
        let marker = RawEntry::Chapter {
            title: Some("#special Finished".to_owned()),
            body: "<p>marker body</p>".to_owned(),
        };
        let regular = RawEntry::Chapter {
            title: None,
            body: "<p>real body</p>".to_owned(),
        };

        let multi = render_all(&[regular.clone(), marker.clone()]);
        assert_eq!(multi, vec!["<p>real body</p>".to_owned()]);

        let single = render_all(&[marker]);
        assert_eq!(single, vec!["<p>marker body</p>".to_owned()]);
    }

    #[test]
    fn chat_and_story_entries_render_nothing() {
        let fragments = render_all(&[
            RawEntry::Chat { title: None },
            RawEntry::Story { title: None },
            RawEntry::Chapter {
                title: None,
                body: "<p>x</p>".to_owned(),
            },
        ]);

        assert_eq!(fragments, vec!["<p>x</p>".to_owned()]);
    }

    #[test]
    fn polls_and_writeins_are_skipped_when_disabled() {
        let entries = vec![
            RawEntry::Choice {
                title: None,
                choices: vec!["A".to_owned()],
                multiple: false,
                votes: Some(votes_of(&[("u1", VoteSelection::One(0))])),
                user_votes: None,
                crossed_out: None,
            },
            RawEntry::ReaderPost {
                title: None,
                votes: serde_json::json!({"u1": "text"}).as_object().cloned(),
            },
        ];

        let fragments = render_fragments(&entries, &FragmentOptions::default());
        assert!(fragments.is_empty());
    }

    #[test]
    fn poll_without_votes_renders_nothing() {
        let entries = vec![RawEntry::Choice {
            title: None,
            choices: vec!["A".to_owned()],
            multiple: false,
            votes: None,
            user_votes: None,
            crossed_out: None,
        }];

        let fragments = render_all(&entries);
        assert!(fragments.is_empty());
    }
}
