use std::path::Path;

use anyhow::Context as _;
use regex::Regex;

use crate::cli::StatsArgs;
use crate::formats::StoryData;
use crate::store::{self, StoryPaths};

pub fn run(args: StatsArgs) -> anyhow::Result<()> {
    let paths = StoryPaths::new(Path::new(&args.out), &args.story);
    let data: StoryData = store::read_json(&paths.segmented).context("read segmented archive")?;

    let counter = WordCounter::new().context("compile word count patterns")?;
    let mut total = 0usize;
    let mut total_without_appendix = 0usize;

    for chapter in &data.chapters {
        let words: usize = chapter
            .fragments
            .iter()
            .map(|fragment| counter.count(fragment))
            .sum();
        println!("Chapter {} - word count: {}", chapter.title, words);
        if !chapter.is_appendix {
            total_without_appendix += words;
        }
        total += words;
    }

    println!("Total without appendix: {total_without_appendix}");
    println!("Total with appendix: {total}");
    Ok(())
}

struct WordCounter {
    tags: Regex,
    whitespace: Regex,
}

impl WordCounter {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            tags: Regex::new(r"<[^>]*>")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    fn count(&self, fragment: &str) -> usize {
        let text = self.tags.replace_all(fragment, " ");
        let text = self.whitespace.replace_all(&text, " ");
        let text = text.trim();
        if text.is_empty() {
            return 0;
        }
        text.split(' ').count()
    }
}
